//! KartenService HTTP Client Library
//!
//! This library provides a blocking client for the "KartenService" web service
//! that many German student unions (Studierendenwerke) run for their canteen
//! payment cards: card balance, transactions and transaction positions.
//!
//! # Features
//!
//! - Registry of supported institutions and their deployment URLs
//! - Automatic scraping of the web app's application credentials
//! - Lazy login: the first call needing a token logs in, later calls reuse it
//! - Error bodies from the service are kept, never discarded
//! - Secure TLS using rustls (no OpenSSL dependencies)
//! - Blocking synchronous API
//! - Well-typed errors using thiserror
//!
//! # Example
//!
//! ```no_run
//! use kartenservice_client::{CardServiceClient, link_positions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = CardServiceClient::builder()
//!     .location("Dresden")
//!     .card_number("1234567")
//!     .card_password("secret")
//!     .build()?;
//!
//! // Logs in on first use
//! let card = client.get_card_info()?;
//! println!("Card: {:?}", card);
//!
//! let today = chrono::Local::now().date_naive();
//! let from = today - chrono::Duration::days(2);
//! let transactions = client.get_transactions(Some(from), Some(today))?;
//! let positions = client.get_transaction_positions(Some(from), Some(today))?;
//!
//! for linked in link_positions(&transactions, &positions).transactions {
//!     println!(
//!         "{:?}: {} positions",
//!         linked.transaction.timestamp(),
//!         linked.positions.len()
//!     );
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod credentials;
mod error;
mod location;
mod model;
mod range;
mod session;

pub use client::{CardServiceClient, CardServiceClientBuilder};
pub use credentials::{ApiCredentials, CredentialExtractor};
pub use error::{CardServiceError, CredentialField, CredentialKind, ParseFailure};
pub use location::{UrlSet, supported_locations};
pub use model::{
    LinkedTransaction, LinkedTransactions, Record, TIMESTAMP_FORMAT, Transaction,
    TransactionPosition, link_positions,
};
pub use range::{DATE_FORMAT, DateRange};
pub use session::{AuthSession, CardCredentials, Session};
