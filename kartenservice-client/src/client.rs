//! Card service HTTP client implementation

use crate::credentials::{ApiCredentials, fetch_api_credentials};
use crate::error::{CardServiceError, CredentialKind};
use crate::location::{UrlSet, append_segments};
use crate::model::{Record, Transaction, TransactionPosition};
use crate::range::DateRange;
use crate::session::{AuthSession, CardCredentials, LoginRequest, Session};
use chrono::NaiveDate;
use reqwest::Method;
use reqwest::blocking::RequestBuilder;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default User-Agent sent with every request
const USER_AGENT: &str = concat!("kartenservice-client/", env!("CARGO_PKG_VERSION"));

/// Endpoints of the card service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    ClientReg,
    TextRes,
    Login,
    Card,
    Transactions,
    TransactionPositions,
}

impl Endpoint {
    /// Path segment below the endpoint's base
    fn name(self) -> &'static str {
        match self {
            Endpoint::ClientReg => "ClientReg",
            Endpoint::TextRes => "TEXTRES",
            Endpoint::Login => "LOGIN",
            Endpoint::Card => "KARTE",
            Endpoint::Transactions => "TRANS",
            Endpoint::TransactionPositions => "TRANSPOS",
        }
    }

    fn method(self) -> Method {
        match self {
            Endpoint::ClientReg | Endpoint::Login => Method::POST,
            _ => Method::GET,
        }
    }

    /// Whether the request also carries `datenformat=JSON`
    fn sends_data_format(self) -> bool {
        matches!(self, Endpoint::ClientReg | Endpoint::Login)
    }

    fn url(self, urls: &UrlSet) -> Result<Url, CardServiceError> {
        let base = match self {
            Endpoint::ClientReg => &urls.tla,
            _ => &urls.kasvc,
        };
        append_segments(base, &[self.name()])
    }

    /// Map a non-success response to the endpoint's error
    fn failure(self, status: reqwest::StatusCode, body: String) -> CardServiceError {
        match self {
            Endpoint::Login => CardServiceError::AuthService { status, body },
            _ => CardServiceError::Api {
                endpoint: self.name(),
                status,
                body,
            },
        }
    }
}

/// Client for one deployment of the card service
///
/// Holds the deployment's URLs, the application credentials, the card
/// holder's credentials and the session. Operations needing a token log in
/// on first use and reuse the token afterwards; they take `&mut self`
/// because they may replace the session.
///
/// # Example
///
/// ```no_run
/// use kartenservice_client::CardServiceClient;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut client = CardServiceClient::builder()
///     .location("Dresden")
///     .card_number("1234567")
///     .card_password("secret")
///     .build()?;
///
/// let card = client.get_card_info()?;
/// println!("Card: {:?}", card);
///
/// // Defaults to the whole retention window up to today
/// for transaction in client.get_transactions(None, None)? {
///     println!("{:?} {:?}", transaction.timestamp(), transaction.amount());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CardServiceClient {
    http: reqwest::blocking::Client,
    urls: UrlSet,
    api_credentials: ApiCredentials,
    card: CardCredentials,
    session: Session,
}

impl CardServiceClient {
    /// Create a client for a registered institution without card credentials
    ///
    /// Only operations that need no login will work until
    /// [`set_card_credentials`](Self::set_card_credentials) is called.
    ///
    /// # Errors
    ///
    /// * `CardServiceError::UnsupportedLocation` - Unknown institution
    /// * `CardServiceError::Fetch` / `CredentialParse` - Credential scraping failed
    pub fn new(location: &str) -> Result<Self, CardServiceError> {
        Self::builder().location(location).build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> CardServiceClientBuilder {
        CardServiceClientBuilder::new()
    }

    /// URLs of the deployment
    pub fn urls(&self) -> &UrlSet {
        &self.urls
    }

    /// Application credentials in use
    ///
    /// Store these and pass them to
    /// [`CardServiceClientBuilder::api_credentials`] to skip scraping next time.
    pub fn api_credentials(&self) -> &ApiCredentials {
        &self.api_credentials
    }

    /// Current session state
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Retention window reported by the last login, if logged in
    pub fn retention_days(&self) -> Option<i64> {
        self.session.auth().map(AuthSession::retention_days)
    }

    /// Replace the card holder's credentials and drop any session
    pub fn set_card_credentials(&mut self, number: impl Into<String>, password: impl Into<String>) {
        self.card = CardCredentials::new(number, password);
        self.session = Session::Unauthenticated;
    }

    /// Forget the session locally; the next authenticated call logs in again
    pub fn logout(&mut self) {
        self.session = Session::Unauthenticated;
    }

    /// Scrape the application credentials from the deployment again
    ///
    /// The client keeps using the credentials it was built with.
    pub fn get_api_credentials(&self) -> Result<ApiCredentials, CardServiceError> {
        fetch_api_credentials(&self.http, &self.urls)
    }

    /* -------- shared request path -------- */

    /// Build a request with format parameters and application basic auth
    fn request(
        &self,
        endpoint: Endpoint,
        query: &[(&str, &str)],
    ) -> Result<RequestBuilder, CardServiceError> {
        let url = endpoint.url(&self.urls)?;

        let mut params: Vec<(&str, &str)> = Vec::with_capacity(query.len() + 2);
        params.extend_from_slice(query);
        params.push(("format", "JSON"));
        if endpoint.sends_data_format() {
            params.push(("datenformat", "JSON"));
        }

        Ok(self
            .http
            .request(endpoint.method(), url)
            .query(&params)
            .basic_auth(
                &self.api_credentials.user,
                Some(self.api_credentials.password.as_str()),
            ))
    }

    /// Send a request and return the body of a successful response
    ///
    /// The service reports failures as 500 (599 on some deployments) with
    /// the detail in the body, so the body is kept on every failure.
    fn send(&self, endpoint: Endpoint, request: RequestBuilder) -> Result<String, CardServiceError> {
        let response = request.send()?;
        let status = response.status();
        debug!(
            method = %endpoint.method(),
            endpoint = endpoint.name(),
            %status,
            "card service response"
        );

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(endpoint.failure(status, body));
        }
        Ok(response.text()?)
    }

    /// Send a request and decode a JSON array response
    fn fetch_array<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        request: RequestBuilder,
    ) -> Result<Vec<T>, CardServiceError> {
        let body = self.send(endpoint, request)?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Log in unless a session exists, returning the active session
    pub fn ensure_authenticated(&mut self) -> Result<&AuthSession, CardServiceError> {
        if !self.session.is_authenticated() {
            self.login()?;
        }
        self.session.auth().ok_or_else(|| {
            CardServiceError::UnexpectedResponse("login did not establish a session".to_string())
        })
    }

    /// Send an authenticated GET and decode its JSON array response
    fn authenticated_array<T: DeserializeOwned>(
        &mut self,
        endpoint: Endpoint,
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>, CardServiceError> {
        let token = self.ensure_authenticated()?.token().to_string();
        let card_number = self
            .card
            .number()
            .ok_or(CardServiceError::MissingCredentials(CredentialKind::CardNumber))?;

        let mut query = vec![("authToken", token.as_str()), ("karteNr", card_number)];
        query.extend_from_slice(extra);

        let request = self.request(endpoint, &query)?;
        self.fetch_array(endpoint, request)
    }

    /// Resolve a date range, logging in first whenever the default needs the retention window
    fn resolve_range(
        &mut self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<DateRange, CardServiceError> {
        let today = chrono::Local::now().date_naive();
        // only the `from` default reads the retention window
        let retention_days = match from {
            Some(_) => 0,
            None => self.ensure_authenticated()?.retention_days(),
        };
        DateRange::resolve(from, to, today, retention_days)
    }

    /* -------- operations -------- */

    /// Register the application as a client of the token-auth service
    ///
    /// The web app does this before logging in, but login works without it.
    /// Needs no login.
    pub fn register_client(&self) -> Result<(), CardServiceError> {
        let request = self.request(
            Endpoint::ClientReg,
            &[
                ("ClientID", self.api_credentials.client_id.as_str()),
                ("RegKey", self.api_credentials.reg_key.as_str()),
            ],
        )?;
        self.send(Endpoint::ClientReg, request)?;
        Ok(())
    }

    /// Fetch the German UI texts of the web app, each with keys `id` and `text`
    ///
    /// Needs no login.
    pub fn get_texts(&self) -> Result<Vec<Record>, CardServiceError> {
        let request = self.request(Endpoint::TextRes, &[("LangId", "de")])?;
        self.fetch_array(Endpoint::TextRes, request)
    }

    /// Log in with the card number and password
    ///
    /// Calling this is optional: authenticated operations log in on first use.
    /// The session is replaced only once both token and retention window have
    /// been read from the response.
    ///
    /// # Returns
    ///
    /// The first element of the login response as sent by the service.
    ///
    /// # Errors
    ///
    /// * `CardServiceError::MissingCredentials` - Card number or password not set
    /// * `CardServiceError::AuthService` - Service rejected the login (body included)
    /// * `CardServiceError::UnexpectedResponse` - Token or retention window missing
    pub fn login(&mut self) -> Result<Record, CardServiceError> {
        let number = self
            .card
            .number()
            .ok_or(CardServiceError::MissingCredentials(CredentialKind::CardNumber))?;
        let password = self
            .card
            .password()
            .ok_or(CardServiceError::MissingCredentials(CredentialKind::CardPassword))?;

        let body = LoginRequest {
            user_id: number,
            password,
        };
        let request = self.request(Endpoint::Login, &[("karteNr", number)])?.json(&body);
        let record = first(Endpoint::Login, self.fetch_array(Endpoint::Login, request)?)?;

        let auth = AuthSession::from_login_record(&record)?;
        info!(retention_days = auth.retention_days(), "logged in to card service");
        self.session = Session::Authenticated(auth);
        Ok(record)
    }

    /// Fetch card info such as balance and card status
    pub fn get_card_info(&mut self) -> Result<Record, CardServiceError> {
        let cards = self.authenticated_array(Endpoint::Card, &[])?;
        first(Endpoint::Card, cards)
    }

    /// Fetch transactions between two days (inclusive)
    ///
    /// # Arguments
    ///
    /// * `from` - First day; defaults to the oldest day the service retains
    /// * `to` - Last day; defaults to today
    pub fn get_transactions(
        &mut self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>, CardServiceError> {
        let range = self.resolve_range(from, to)?;
        let [(from_key, from_value), (to_key, to_value)] = range.query_params();
        self.authenticated_array(
            Endpoint::Transactions,
            &[(from_key, from_value.as_str()), (to_key, to_value.as_str())],
        )
    }

    /// Fetch transaction positions between two days (inclusive)
    ///
    /// Positions carry no timestamp; see [`link_positions`](crate::link_positions).
    /// Date defaults match [`get_transactions`](Self::get_transactions).
    pub fn get_transaction_positions(
        &mut self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TransactionPosition>, CardServiceError> {
        let range = self.resolve_range(from, to)?;
        let [(from_key, from_value), (to_key, to_value)] = range.query_params();
        self.authenticated_array(
            Endpoint::TransactionPositions,
            &[(from_key, from_value.as_str()), (to_key, to_value.as_str())],
        )
    }
}

/// Take the first element of an array response
fn first(endpoint: Endpoint, items: Vec<Record>) -> Result<Record, CardServiceError> {
    items.into_iter().next().ok_or_else(|| {
        CardServiceError::UnexpectedResponse(format!("{} returned an empty array", endpoint.name()))
    })
}

/// Builder for configuring a card service client
///
/// Either a registered location or an explicit [`UrlSet`] is required. Unless
/// application credentials are supplied, `build` scrapes them from the
/// deployment, which costs one request.
///
/// # Example
///
/// ```no_run
/// use kartenservice_client::{CardServiceClient, UrlSet};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Registered institution with a request timeout
/// let client = CardServiceClient::builder()
///     .location("Leipzig")
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// // Reuse scraped credentials for a second client
/// let cached = client.api_credentials().clone();
/// let _again = CardServiceClient::builder()
///     .location("Leipzig")
///     .api_credentials(cached)
///     .build()?;
///
/// // Unregistered deployment with the standard layout
/// let _custom = CardServiceClient::builder()
///     .urls(UrlSet::templated("https://kartenservice.example.org/")?)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CardServiceClientBuilder {
    location: Option<String>,
    urls: Option<UrlSet>,
    card: CardCredentials,
    api_credentials: Option<ApiCredentials>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    client_builder: Option<reqwest::blocking::ClientBuilder>,
}

impl CardServiceClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Institution name from the location registry, e.g. `"Dresden"`
    pub fn location(mut self, name: impl Into<String>) -> Self {
        self.location = Some(name.into());
        self
    }

    /// Explicit deployment URLs; takes precedence over `location`
    pub fn urls(mut self, urls: UrlSet) -> Self {
        self.urls = Some(urls);
        self
    }

    /// Card number of the card holder; an empty string counts as unset
    pub fn card_number(mut self, number: impl Into<String>) -> Self {
        self.card.set_number(number.into());
        self
    }

    /// Password belonging to the card; an empty string counts as unset
    pub fn card_password(mut self, password: impl Into<String>) -> Self {
        self.card.set_password(password.into());
        self
    }

    /// Known application credentials; skips scraping them
    pub fn api_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.api_credentials = Some(credentials);
        self
    }

    /// Override the User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set a total request timeout. Default: reqwest's blocking default (30s).
    pub fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(dur);
        self
    }

    /// Set a connect timeout. Default: none.
    pub fn connect_timeout(mut self, dur: Duration) -> Self {
        self.connect_timeout = Some(dur);
        self
    }

    /// Set a custom HTTP client builder (proxies, certificates, ...)
    ///
    /// User-Agent and timeouts set on this builder are applied on top.
    pub fn client_builder(mut self, builder: reqwest::blocking::ClientBuilder) -> Self {
        self.client_builder = Some(builder);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// * `CardServiceError::ClientInit` - Neither location nor URLs given, or
    ///   the HTTP client cannot be initialized
    /// * `CardServiceError::UnsupportedLocation` - Unknown institution
    /// * `CardServiceError::Fetch` / `CredentialParse` - Credential scraping failed
    pub fn build(self) -> Result<CardServiceClient, CardServiceError> {
        let urls = match (self.urls, self.location) {
            (Some(urls), _) => urls,
            (None, Some(name)) => UrlSet::for_location(&name)?,
            (None, None) => {
                return Err(CardServiceError::ClientInit(
                    "either a location or a URL set is required".to_string(),
                ));
            }
        };

        let mut builder = self
            .client_builder
            .unwrap_or_else(|| reqwest::blocking::Client::builder().use_rustls_tls())
            .user_agent(self.user_agent.as_deref().unwrap_or(USER_AGENT));
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }
        if let Some(ct) = self.connect_timeout {
            builder = builder.connect_timeout(ct);
        }
        let http = builder
            .build()
            .map_err(|e| CardServiceError::ClientInit(e.to_string()))?;

        let api_credentials = match self.api_credentials {
            Some(credentials) => credentials,
            None => fetch_api_credentials(&http, &urls)?,
        };

        Ok(CardServiceClient {
            http,
            urls,
            api_credentials,
            card: self.card,
            session: Session::Unauthenticated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use proptest::prelude::*;
    use serde_json::json;

    const BASIC_AUTH: &str = "Basic YXBwdXNlcjphcHBwYXNz";
    const KASVC: &str = "/TL1/TLM/KASVC";

    fn app_credentials() -> ApiCredentials {
        ApiCredentials::new("42", "Reg0Key1", BASIC_AUTH, "appuser", "apppass")
    }

    fn client_for(server: &mockito::Server) -> CardServiceClient {
        CardServiceClient::builder()
            .urls(UrlSet::templated(&server.url()).unwrap())
            .api_credentials(app_credentials())
            .card_number("1234567")
            .card_password("secret")
            .build()
            .unwrap()
    }

    fn mock_login(server: &mut mockito::Server, retention: i64, hits: usize) -> mockito::Mock {
        server
            .mock("POST", format!("{KASVC}/LOGIN").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("karteNr".into(), "1234567".into()),
                Matcher::UrlEncoded("format".into(), "JSON".into()),
                Matcher::UrlEncoded("datenformat".into(), "JSON".into()),
            ]))
            .match_header("authorization", BASIC_AUTH)
            .match_body(Matcher::Json(json!({
                "BenutzerID": "1234567",
                "Passwort": "secret"
            })))
            .with_status(200)
            .with_body(
                json!([{ "lTransTage": retention, "authToken": "TOKEN123" }]).to_string(),
            )
            .expect(hits)
            .create()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_build_requires_location_or_urls() {
        let err = CardServiceClient::builder().build().unwrap_err();
        assert!(matches!(err, CardServiceError::ClientInit(_)));
    }

    #[test]
    fn test_unknown_location_fails_at_construction() {
        let err = CardServiceClient::new("Atlantis").unwrap_err();
        assert!(matches!(err, CardServiceError::UnsupportedLocation(_)));
    }

    #[test]
    fn test_build_scrapes_credentials() {
        let mut server = mockito::Server::new();
        let script = server
            .mock("GET", "/KartenService/scripts/dataprovider.js")
            .with_status(200)
            .with_body(format!(
                r#"cfg = {{ authClientId: 42, authRegKey: "Reg0Key1", authHeader: "{BASIC_AUTH}", authUsername: "appuser", authPassword: "apppass" }};"#
            ))
            .expect(1)
            .create();

        let client = CardServiceClient::builder()
            .urls(UrlSet::templated(&server.url()).unwrap())
            .build()
            .unwrap();

        assert_eq!(client.api_credentials(), &app_credentials());
        assert!(!client.session().is_authenticated());
        script.assert();
    }

    #[test]
    fn test_script_fetch_failure() {
        let mut server = mockito::Server::new();
        let script = server
            .mock("GET", "/KartenService/scripts/dataprovider.js")
            .with_status(404)
            .expect(1)
            .create();

        let err = CardServiceClient::builder()
            .urls(UrlSet::templated(&server.url()).unwrap())
            .build()
            .unwrap_err();

        match err {
            CardServiceError::Fetch { url, status } => {
                assert!(url.ends_with("/KartenService/scripts/dataprovider.js"));
                assert_eq!(status.as_u16(), 404);
            }
            other => panic!("Expected Fetch, got {other:?}"),
        }
        script.assert();
    }

    #[test]
    fn test_login_without_card_credentials() {
        let server = mockito::Server::new();
        let mut client = CardServiceClient::builder()
            .urls(UrlSet::templated(&server.url()).unwrap())
            .api_credentials(app_credentials())
            .build()
            .unwrap();

        let err = client.login().unwrap_err();
        assert!(matches!(
            err,
            CardServiceError::MissingCredentials(CredentialKind::CardNumber)
        ));

        let mut client = CardServiceClient::builder()
            .urls(UrlSet::templated(&server.url()).unwrap())
            .api_credentials(app_credentials())
            .card_number("1234567")
            .build()
            .unwrap();
        let err = client.get_card_info().unwrap_err();
        assert!(matches!(
            err,
            CardServiceError::MissingCredentials(CredentialKind::CardPassword)
        ));
    }

    #[test]
    fn test_empty_card_credentials_count_as_missing() {
        let mut server = mockito::Server::new();
        let login = mock_login(&mut server, 90, 0);

        for (number, password, missing) in [
            ("", "secret", CredentialKind::CardNumber),
            ("1234567", "", CredentialKind::CardPassword),
            ("", "", CredentialKind::CardNumber),
        ] {
            let mut client = client_for(&server);
            client.set_card_credentials(number, password);

            match client.login().unwrap_err() {
                CardServiceError::MissingCredentials(kind) => assert_eq!(kind, missing),
                other => panic!("Expected MissingCredentials, got {other:?}"),
            }
            assert!(matches!(
                client.get_card_info().unwrap_err(),
                CardServiceError::MissingCredentials(_)
            ));
        }

        login.assert();
    }

    #[test]
    fn test_error_status_with_empty_body() {
        let mut server = mockito::Server::new();
        let _login = mock_login(&mut server, 90, 1);
        let card = server
            .mock("GET", format!("{KASVC}/KARTE").as_str())
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(1)
            .create();
        let mut client = client_for(&server);

        match client.get_card_info().unwrap_err() {
            CardServiceError::Api { endpoint, status, body } => {
                assert_eq!(endpoint, "KARTE");
                assert_eq!(status.as_u16(), 500);
                assert!(body.is_empty());
            }
            other => panic!("Expected Api, got {other:?}"),
        }
        card.assert();
    }

    #[test]
    fn test_login_sets_session() {
        let mut server = mockito::Server::new();
        let login = mock_login(&mut server, 90, 1);
        let mut client = client_for(&server);

        let record = client.login().unwrap();

        assert_eq!(record.get("authToken"), Some(&json!("TOKEN123")));
        assert_eq!(client.retention_days(), Some(90));
        assert_eq!(
            client.session().auth().map(AuthSession::token),
            Some("TOKEN123")
        );
        login.assert();
    }

    // **Feature: session, Property 1: Login sets token and retention together or neither**
    #[test]
    fn test_partial_login_response_leaves_session_untouched() {
        let mut server = mockito::Server::new();
        let login = server
            .mock("POST", format!("{KASVC}/LOGIN").as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "lTransTage": 90 }]).to_string())
            .expect(1)
            .create();
        let mut client = client_for(&server);

        let err = client.login().unwrap_err();

        assert!(matches!(err, CardServiceError::UnexpectedResponse(_)));
        assert!(!client.session().is_authenticated());
        assert_eq!(client.retention_days(), None);
        login.assert();
    }

    #[test]
    fn test_login_rejected_keeps_body() {
        let mut server = mockito::Server::new();
        let login = server
            .mock("POST", format!("{KASVC}/LOGIN").as_str())
            .match_query(Matcher::Any)
            .with_status(599)
            .with_body("Kartennummer oder Passwort falsch")
            .expect(1)
            .create();
        let mut client = client_for(&server);

        match client.login().unwrap_err() {
            CardServiceError::AuthService { status, body } => {
                assert_eq!(status.as_u16(), 599);
                assert_eq!(body, "Kartennummer oder Passwort falsch");
            }
            other => panic!("Expected AuthService, got {other:?}"),
        }
        assert!(!client.session().is_authenticated());
        login.assert();
    }

    #[test]
    fn test_register_client() {
        let mut server = mockito::Server::new();
        let reg = server
            .mock("POST", "/TL1/TLA/ClientReg")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("ClientID".into(), "42".into()),
                Matcher::UrlEncoded("RegKey".into(), "Reg0Key1".into()),
                Matcher::UrlEncoded("format".into(), "JSON".into()),
                Matcher::UrlEncoded("datenformat".into(), "JSON".into()),
            ]))
            .match_header("authorization", BASIC_AUTH)
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create();
        let client = client_for(&server);

        client.register_client().unwrap();

        assert!(!client.session().is_authenticated());
        reg.assert();
    }

    #[test]
    fn test_get_texts_needs_no_login() {
        let mut server = mockito::Server::new();
        let login = mock_login(&mut server, 90, 0);
        let texts = server
            .mock("GET", format!("{KASVC}/TEXTRES").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("LangId".into(), "de".into()),
                Matcher::UrlEncoded("format".into(), "JSON".into()),
            ]))
            .match_header("authorization", BASIC_AUTH)
            .with_status(200)
            .with_body(json!([{ "id": "T1", "text": "Guthaben" }]).to_string())
            .expect(1)
            .create();
        let client = client_for(&server);

        let result = client.get_texts().unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("text"), Some(&json!("Guthaben")));
        texts.assert();
        login.assert();
    }

    #[test]
    fn test_get_card_info_returns_first_element() {
        let mut server = mockito::Server::new();
        let login = mock_login(&mut server, 90, 1);
        let card = server
            .mock("GET", format!("{KASVC}/KARTE").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("format".into(), "JSON".into()),
                Matcher::UrlEncoded("authToken".into(), "TOKEN123".into()),
                Matcher::UrlEncoded("karteNr".into(), "1234567".into()),
            ]))
            .match_header("authorization", BASIC_AUTH)
            .with_status(200)
            .with_body(json!([{ "betrag": 12.5 }, { "betrag": 0 }]).to_string())
            .expect(1)
            .create();
        let mut client = client_for(&server);

        let info = client.get_card_info().unwrap();

        assert_eq!(info.get("betrag"), Some(&json!(12.5)));
        login.assert();
        card.assert();
    }

    #[test]
    fn test_empty_card_info() {
        let mut server = mockito::Server::new();
        let _login = mock_login(&mut server, 90, 1);
        let _card = server
            .mock("GET", format!("{KASVC}/KARTE").as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create();
        let mut client = client_for(&server);

        let err = client.get_card_info().unwrap_err();
        assert!(matches!(err, CardServiceError::UnexpectedResponse(_)));
    }

    #[test]
    fn test_non_json_body() {
        let mut server = mockito::Server::new();
        let _login = mock_login(&mut server, 90, 1);
        let _card = server
            .mock("GET", format!("{KASVC}/KARTE").as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create();
        let mut client = client_for(&server);

        let err = client.get_card_info().unwrap_err();
        assert!(matches!(err, CardServiceError::Decode(_)));
    }

    #[test]
    fn test_transactions_default_range_from_retention() {
        let mut server = mockito::Server::new();
        let login = mock_login(&mut server, 30, 1);
        let trans = server
            .mock("GET", format!("{KASVC}/TRANS").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("authToken".into(), "TOKEN123".into()),
                Matcher::UrlEncoded("karteNr".into(), "1234567".into()),
                Matcher::UrlEncoded("datumVon".into(), "15.02.2024".into()),
                Matcher::UrlEncoded("datumBis".into(), "15.03.2024".into()),
            ]))
            .with_status(200)
            .with_body(
                json!([{ "transFullId": "A", "datum": "15.03.2024 12:00", "zahlBetrag": -2.5 }])
                    .to_string(),
            )
            .expect(1)
            .create();
        let mut client = client_for(&server);

        let result = client
            .get_transactions(None, Some(date(2024, 3, 15)))
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].amount(), Some(-2.5));
        login.assert();
        trans.assert();
    }

    #[test]
    fn test_transactions_to_defaults_to_today() {
        let mut server = mockito::Server::new();
        let _login = mock_login(&mut server, 90, 1);
        let today = chrono::Local::now()
            .date_naive()
            .format(crate::range::DATE_FORMAT)
            .to_string();
        let trans = server
            .mock("GET", format!("{KASVC}/TRANS").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("datumVon".into(), "01.01.2024".into()),
                Matcher::UrlEncoded("datumBis".into(), today),
            ]))
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create();
        let mut client = client_for(&server);

        let result = client.get_transactions(Some(date(2024, 1, 1)), None).unwrap();

        assert!(result.is_empty());
        trans.assert();
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let server = mockito::Server::new();
        let mut client = client_for(&server);

        let err = client
            .get_transaction_positions(Some(date(2024, 3, 2)), Some(date(2024, 3, 1)))
            .unwrap_err();
        assert!(matches!(err, CardServiceError::InvalidDates));
    }

    #[test]
    fn test_transaction_positions() {
        let mut server = mockito::Server::new();
        let _login = mock_login(&mut server, 90, 1);
        let pos = server
            .mock("GET", format!("{KASVC}/TRANSPOS").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("format".into(), "JSON".into()),
                Matcher::UrlEncoded("authToken".into(), "TOKEN123".into()),
                Matcher::UrlEncoded("karteNr".into(), "1234567".into()),
                Matcher::UrlEncoded("datumVon".into(), "01.03.2024".into()),
                Matcher::UrlEncoded("datumBis".into(), "02.03.2024".into()),
            ]))
            .with_status(200)
            .with_body(json!([{ "transFullId": "A", "posId": 1, "name": "Kaffee" }]).to_string())
            .expect(1)
            .create();
        let mut client = client_for(&server);

        let result = client
            .get_transaction_positions(Some(date(2024, 3, 1)), Some(date(2024, 3, 2)))
            .unwrap();

        assert_eq!(result[0].name(), Some("Kaffee"));
        pos.assert();
    }

    #[test]
    fn test_logout_forces_new_login() {
        let mut server = mockito::Server::new();
        let login = mock_login(&mut server, 90, 2);
        let mut client = client_for(&server);

        client.ensure_authenticated().unwrap();
        client.ensure_authenticated().unwrap();
        client.logout();
        assert!(!client.session().is_authenticated());
        client.ensure_authenticated().unwrap();

        login.assert();
    }

    #[test]
    fn test_set_card_credentials_resets_session() {
        let mut server = mockito::Server::new();
        let _login = mock_login(&mut server, 90, 1);
        let mut client = client_for(&server);

        client.login().unwrap();
        client.set_card_credentials("7654321", "other");

        assert!(!client.session().is_authenticated());
    }

    // **Feature: api-operations, Property 1: Failure bodies are surfaced verbatim**
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        #[test]
        fn prop_error_body_is_surfaced(
            status_code in prop::sample::select(vec![400usize, 401, 403, 404, 500, 502, 599]),
            detail in "[a-zA-Z0-9 .,:!]{1,80}",
            endpoint in prop::sample::select(vec!["KARTE", "TRANS", "TRANSPOS"]),
        ) {
            let mut server = mockito::Server::new();
            let _login = mock_login(&mut server, 90, 1);
            let failing = server
                .mock("GET", format!("{KASVC}/{endpoint}").as_str())
                .match_query(Matcher::Any)
                .with_status(status_code)
                .with_body(&detail)
                .expect(1)
                .create();
            let mut client = client_for(&server);

            let err = match endpoint {
                "KARTE" => client.get_card_info().map(|_| ()),
                "TRANS" => client.get_transactions(None, None).map(|_| ()),
                _ => client.get_transaction_positions(None, None).map(|_| ()),
            }
            .unwrap_err();

            prop_assert!(
                err.to_string().contains(&detail),
                "error message {:?} should contain body {:?}",
                err.to_string(),
                detail
            );
            match err {
                CardServiceError::Api { endpoint: name, status, body } => {
                    prop_assert_eq!(name, endpoint);
                    prop_assert_eq!(status.as_u16() as usize, status_code);
                    prop_assert_eq!(body, detail);
                }
                other => prop_assert!(false, "Expected Api error, got {:?}", other),
            }
            failing.assert();
        }
    }
}
