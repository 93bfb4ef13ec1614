//! Error types for the card service client

use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

/// A field scraped from the deployment's `dataprovider.js`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    /// Numeric application client identifier (`authClientId`)
    ClientId,
    /// Alphanumeric registration key (`authRegKey`)
    RegKey,
    /// Preformatted basic auth header (`authHeader`)
    Header,
    /// Application username (`authUsername`)
    User,
    /// Application password (`authPassword`)
    Password,
}

impl CredentialField {
    /// All fields in extraction order
    pub const ALL: [CredentialField; 5] = [
        CredentialField::ClientId,
        CredentialField::RegKey,
        CredentialField::Header,
        CredentialField::User,
        CredentialField::Password,
    ];

    /// The key tag that precedes the value in the script source
    pub fn key_tag(self) -> &'static str {
        match self {
            CredentialField::ClientId => "authClientId",
            CredentialField::RegKey => "authRegKey",
            CredentialField::Header => "authHeader",
            CredentialField::User => "authUsername",
            CredentialField::Password => "authPassword",
        }
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_tag())
    }
}

/// Why an extraction rule failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// The key tag with a well-formed value was not found
    Missing,
    /// The key tag matched several different values
    Ambiguous,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailure::Missing => f.write_str("not found in script source"),
            ParseFailure::Ambiguous => f.write_str("matched several different values"),
        }
    }
}

/// Personal credential required for login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// The payment card number
    CardNumber,
    /// The password belonging to the card
    CardPassword,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::CardNumber => f.write_str("card number"),
            CredentialKind::CardPassword => f.write_str("card password"),
        }
    }
}

/// Errors that can occur when using the card service client
#[derive(Error, Debug)]
pub enum CardServiceError {
    /// The institution name is not in the location registry
    #[error("Unsupported location: {0}")]
    UnsupportedLocation(String),

    /// Downloading the credential script failed
    #[error("Failed to fetch credential script from {url}: HTTP {status}")]
    Fetch {
        /// The script URL
        url: String,
        /// The status code that was received
        status: StatusCode,
    },

    /// A credential field could not be extracted from the script
    #[error("Failed to extract credential {field}: {reason}")]
    CredentialParse {
        /// The field whose rule failed
        field: CredentialField,
        /// Why it failed
        reason: ParseFailure,
    },

    /// Login was attempted without card credentials
    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(CredentialKind),

    /// The login endpoint rejected the request
    #[error("Login failed with HTTP {status}: {body}")]
    AuthService {
        /// The status code that was received
        status: StatusCode,
        /// Raw response body, which carries the service's error detail
        body: String,
    },

    /// Any other endpoint answered with a non-success status
    #[error("{endpoint} request failed with HTTP {status}: {body}")]
    Api {
        /// Endpoint name, e.g. `KARTE`
        endpoint: &'static str,
        /// The status code that was received
        status: StatusCode,
        /// Raw response body, which carries the service's error detail
        body: String,
    },

    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response body was not valid JSON of the expected shape
    #[error("Failed to decode JSON response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Response was JSON but lacked required content
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Start date lies after end date
    #[error("Invalid date range: start must not be after end")]
    InvalidDates,

    /// A URL could not be parsed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A base URL cannot have path segments appended
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// Client initialization failed
    #[error("Client initialization failed: {0}")]
    ClientInit(String),
}
