//! Application credential scraping from the web app's `dataprovider.js`

use crate::error::{CardServiceError, CredentialField, ParseFailure};
use crate::location::UrlSet;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::cell::OnceCell;
use std::fmt;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

/// Credentials identifying the web app itself, not a card holder
///
/// Every deployment embeds these in its client-side script. They are the
/// basic auth principal of every API request.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    /// Client ID of the card service app
    pub client_id: String,
    /// Registration key of the card service app
    pub reg_key: String,
    /// Preformatted basic auth header value (`Basic <base64>`)
    pub header: String,
    /// Application username
    pub user: String,
    /// Application password
    pub password: Zeroizing<String>,
}

impl ApiCredentials {
    /// Create credentials from known values, e.g. cached from an earlier run
    pub fn new(
        client_id: impl Into<String>,
        reg_key: impl Into<String>,
        header: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            reg_key: reg_key.into(),
            header: header.into(),
            user: user.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// The header value implied by `user` and `password`
    pub fn expected_header(&self) -> String {
        let mut pair = format!("{}:{}", self.user, self.password.as_str());
        let header = format!("Basic {}", STANDARD.encode(pair.as_bytes()));
        pair.zeroize();
        header
    }

    /// Whether the scraped header agrees with the scraped username and password
    ///
    /// A mismatch means the script format changed or a rule grabbed the wrong value.
    pub fn header_is_consistent(&self) -> bool {
        self.header == self.expected_header()
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("client_id", &self.client_id)
            .field("reg_key", &self.reg_key)
            .field("header", &"<redacted>")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Extraction rule patterns, one per field, in `CredentialField::ALL` order
const PATTERNS: [(CredentialField, &str); 5] = [
    (CredentialField::ClientId, r"authClientId:\s*([0-9]+),"),
    (CredentialField::RegKey, r#"authRegKey:\s*"([a-zA-Z0-9]+)""#),
    (CredentialField::Header, r#"authHeader:\s*"(Basic\s[a-zA-Z0-9=+/]+)""#),
    (CredentialField::User, r#"authUsername:\s*"([a-zA-Z0-9]+)""#),
    (CredentialField::Password, r#"authPassword:\s*"([a-zA-Z0-9]+)""#),
];

/// One named rule that pulls a single field out of the script source
#[derive(Clone, Debug)]
struct ExtractionRule {
    field: CredentialField,
    regex: Regex,
}

impl ExtractionRule {
    /// Apply the rule; repeated identical matches count as one
    fn apply(&self, source: &str) -> Result<String, CardServiceError> {
        let mut values = self
            .regex
            .captures_iter(source)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str());

        let first = values.next().ok_or(CardServiceError::CredentialParse {
            field: self.field,
            reason: ParseFailure::Missing,
        })?;

        if values.any(|other| other != first) {
            return Err(CardServiceError::CredentialParse {
                field: self.field,
                reason: ParseFailure::Ambiguous,
            });
        }

        Ok(first.to_string())
    }
}

/// Extractor for the credentials embedded in `dataprovider.js`, with cached rules
#[derive(Clone, Debug, Default)]
pub struct CredentialExtractor {
    rules: OnceCell<Vec<ExtractionRule>>,
}

impl CredentialExtractor {
    /// Create a new extractor with uncompiled rules
    pub fn new() -> Self {
        Self {
            rules: OnceCell::new(),
        }
    }

    /// Get or compile the extraction rules
    fn rules(&self) -> &[ExtractionRule] {
        self.rules.get_or_init(|| {
            PATTERNS
                .iter()
                .map(|(field, pattern)| ExtractionRule {
                    field: *field,
                    regex: Regex::new(pattern).unwrap(),
                })
                .collect()
        })
    }

    /// Run a single field's rule against the source
    pub fn extract_field(
        &self,
        source: &str,
        field: CredentialField,
    ) -> Result<String, CardServiceError> {
        self.rules()[field as usize].apply(source)
    }

    /// Extract all five credential fields from the script source
    ///
    /// # Errors
    ///
    /// Returns `CardServiceError::CredentialParse` naming the first field
    /// whose rule did not match exactly one value.
    pub fn extract(&self, source: &str) -> Result<ApiCredentials, CardServiceError> {
        let credentials = ApiCredentials {
            client_id: self.extract_field(source, CredentialField::ClientId)?,
            reg_key: self.extract_field(source, CredentialField::RegKey)?,
            header: self.extract_field(source, CredentialField::Header)?,
            user: self.extract_field(source, CredentialField::User)?,
            password: Zeroizing::new(self.extract_field(source, CredentialField::Password)?),
        };

        if !credentials.header_is_consistent() {
            warn!(
                user = %credentials.user,
                "scraped auth header does not match scraped username and password"
            );
        }

        Ok(credentials)
    }
}

/// Download the credential script of a deployment and extract its credentials
pub(crate) fn fetch_api_credentials(
    http: &reqwest::blocking::Client,
    urls: &UrlSet,
) -> Result<ApiCredentials, CardServiceError> {
    let url = urls.script_url()?;
    debug!(%url, "fetching credential script");

    let response = http.get(url.clone()).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(CardServiceError::Fetch {
            url: url.to_string(),
            status,
        });
    }

    let source = response.text()?;
    let credentials = CredentialExtractor::new().extract(&source)?;
    info!(client_id = %credentials.client_id, "extracted application credentials");
    Ok(credentials)
}
