//! Records returned by the card service
//!
//! The service's records are passed through unchanged. `Transaction` and
//! `TransactionPosition` keep every field and only add typed accessors for the
//! fields the web app itself reads; none of them are validated.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A JSON object as returned by the service
pub type Record = Map<String, Value>;

/// Format of a transaction's `datum` field
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M";

/// A single card transaction (payment or top-up)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction(Record);

impl Transaction {
    /// All fields as returned by the service
    pub fn fields(&self) -> &Record {
        &self.0
    }

    /// Consume the wrapper, returning the raw record
    pub fn into_record(self) -> Record {
        self.0
    }

    /// Identifier shared with the transaction's positions (`transFullId`)
    pub fn id(&self) -> Option<&Value> {
        self.0.get("transFullId")
    }

    /// Local time of the transaction (`datum`)
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        let raw = self.0.get("datum")?.as_str()?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
    }

    /// Paid amount (`zahlBetrag`)
    pub fn amount(&self) -> Option<f64> {
        self.0.get("zahlBetrag").and_then(number)
    }

    /// Name of the site, e.g. a canteen (`ortName`)
    pub fn location_name(&self) -> Option<&str> {
        self.0.get("ortName")?.as_str()
    }

    /// Transaction type (`typName`)
    pub fn type_name(&self) -> Option<&str> {
        self.0.get("typName")?.as_str()
    }

    /// Point of sale (`kaName`)
    pub fn point_of_sale(&self) -> Option<&str> {
        self.0.get("kaName")?.as_str()
    }
}

/// One line of a transaction
///
/// Positions carry no timestamp; join them to their transaction via
/// [`link_positions`] to recover it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionPosition(Record);

impl TransactionPosition {
    /// All fields as returned by the service
    pub fn fields(&self) -> &Record {
        &self.0
    }

    /// Consume the wrapper, returning the raw record
    pub fn into_record(self) -> Record {
        self.0
    }

    /// Identifier of the parent transaction (`transFullId`)
    pub fn transaction_id(&self) -> Option<&Value> {
        self.0.get("transFullId")
    }

    /// Position number within the transaction (`posId`)
    pub fn position(&self) -> Option<i64> {
        match self.0.get("posId")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Article name (`name`)
    pub fn name(&self) -> Option<&str> {
        self.0.get("name")?.as_str()
    }

    /// Quantity (`menge`)
    pub fn quantity(&self) -> Option<f64> {
        self.0.get("menge").and_then(number)
    }

    /// Price per unit (`epreis`)
    pub fn unit_price(&self) -> Option<f64> {
        self.0.get("epreis").and_then(number)
    }

    /// Price of the whole line (`gpreis`)
    pub fn total_price(&self) -> Option<f64> {
        self.0.get("gpreis").and_then(number)
    }

    /// Discount, present only on discounted lines (`rabatt`)
    pub fn discount(&self) -> Option<f64> {
        self.0.get("rabatt").and_then(number)
    }

    /// Rating given in the web app (`bewertung`)
    pub fn rating(&self) -> Option<&Value> {
        self.0.get("bewertung")
    }
}

/// Numbers arrive either as JSON numbers or as strings with a decimal comma
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Key used to match a position to its transaction
fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A transaction with the positions that reference it
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedTransaction<'a> {
    /// The parent transaction
    pub transaction: &'a Transaction,
    /// Its positions, in input order
    pub positions: Vec<&'a TransactionPosition>,
}

/// Result of [`link_positions`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkedTransactions<'a> {
    /// Transactions in input order
    pub transactions: Vec<LinkedTransaction<'a>>,
    /// Positions whose transaction was not among the inputs
    pub orphans: Vec<&'a TransactionPosition>,
}

/// Group positions under their parent transaction via `transFullId`
///
/// Positions keep their input order within each transaction.
pub fn link_positions<'a>(
    transactions: &'a [Transaction],
    positions: &'a [TransactionPosition],
) -> LinkedTransactions<'a> {
    let mut linked = LinkedTransactions {
        transactions: transactions
            .iter()
            .map(|transaction| LinkedTransaction {
                transaction,
                positions: Vec::new(),
            })
            .collect(),
        orphans: Vec::new(),
    };

    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, transaction) in transactions.iter().enumerate() {
        if let Some(key) = transaction.id().and_then(id_key) {
            index.entry(key).or_insert(i);
        }
    }

    for position in positions {
        match position
            .transaction_id()
            .and_then(id_key)
            .and_then(|key| index.get(&key))
        {
            Some(&i) => linked.transactions[i].positions.push(position),
            None => linked.orphans.push(position),
        }
    }

    linked
}
