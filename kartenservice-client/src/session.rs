//! Personal card credentials and the authenticated session state

use crate::error::CardServiceError;
use crate::model::Record;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use zeroize::Zeroizing;

/// Card number and password of a card holder
///
/// Either may be absent; operations that need a login fail until both are set.
#[derive(Clone, Default)]
pub struct CardCredentials {
    number: Option<String>,
    password: Option<Zeroizing<String>>,
}

impl CardCredentials {
    /// Create credentials from a card number and its password
    pub fn new(number: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            number: Some(number.into()),
            password: Some(Zeroizing::new(password.into())),
        }
    }

    /// The card number, if set and non-empty
    pub fn number(&self) -> Option<&str> {
        self.number.as_deref().filter(|n| !n.is_empty())
    }

    /// The card password, if set and non-empty
    pub fn password(&self) -> Option<&str> {
        self.password
            .as_ref()
            .map(|p| p.as_str())
            .filter(|p| !p.is_empty())
    }

    pub(crate) fn set_number(&mut self, number: String) {
        self.number = Some(number);
    }

    pub(crate) fn set_password(&mut self, password: String) {
        self.password = Some(Zeroizing::new(password));
    }
}

impl fmt::Debug for CardCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardCredentials")
            .field("number", &self.number)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Body of the `LOGIN` request
#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "BenutzerID")]
    pub user_id: &'a str,
    #[serde(rename = "Passwort")]
    pub password: &'a str,
}

/// Token and retention window obtained from a successful login
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    token: String,
    retention_days: i64,
}

impl AuthSession {
    /// Create a session from known values
    pub fn new(token: impl Into<String>, retention_days: i64) -> Self {
        Self {
            token: token.into(),
            retention_days,
        }
    }

    /// Parse the first element of a `LOGIN` response
    ///
    /// Both fields are read before anything is returned, so a response lacking
    /// either one never yields a half-filled session.
    pub(crate) fn from_login_record(record: &Record) -> Result<Self, CardServiceError> {
        let retention_days = record
            .get("lTransTage")
            .and_then(parse_days)
            .ok_or_else(|| {
                CardServiceError::UnexpectedResponse(
                    "LOGIN response lacks a numeric lTransTage".to_string(),
                )
            })?;
        let token = record
            .get("authToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CardServiceError::UnexpectedResponse("LOGIN response lacks an authToken".to_string())
            })?;

        Ok(Self::new(token, retention_days))
    }

    /// The personal auth token attached to authenticated requests
    pub fn token(&self) -> &str {
        &self.token
    }

    /// How many days of transactions the service retains
    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("retention_days", &self.retention_days)
            .finish()
    }
}

fn parse_days(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Login state of a client
///
/// Moves to `Authenticated` only through a login, and is replaced as a whole.
/// There is no expiry: a token stays in use until the client is dropped or
/// [`logout`](crate::CardServiceClient::logout) is called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    /// No token yet
    #[default]
    Unauthenticated,
    /// Logged in
    Authenticated(AuthSession),
}

impl Session {
    /// The active session, if logged in
    pub fn auth(&self) -> Option<&AuthSession> {
        match self {
            Session::Authenticated(auth) => Some(auth),
            Session::Unauthenticated => None,
        }
    }

    /// Whether a token is present
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }
}
