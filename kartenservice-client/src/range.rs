//! Date ranges for transaction queries

use crate::error::CardServiceError;
use chrono::{Days, NaiveDate};

/// Date format expected by `datumVon` / `datumBis`
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Inclusive range of days to query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First day
    pub from: NaiveDate,
    /// Last day
    pub to: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `from > to`
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, CardServiceError> {
        if from > to {
            return Err(CardServiceError::InvalidDates);
        }
        Ok(Self { from, to })
    }

    /// Fill in omitted bounds
    ///
    /// `to` defaults to `today`; `from` defaults to the oldest day still
    /// retained, `to - (retention_days - 1)`. A retention below one day yields
    /// a single-day range.
    pub fn resolve(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        today: NaiveDate,
        retention_days: i64,
    ) -> Result<Self, CardServiceError> {
        let to = to.unwrap_or(today);
        let from = from.unwrap_or_else(|| {
            let back = u64::try_from(retention_days.saturating_sub(1)).unwrap_or(0);
            to.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
        });
        Self::new(from, to)
    }

    /// `datumVon` / `datumBis` query parameters
    pub fn query_params(&self) -> [(&'static str, String); 2] {
        [
            ("datumVon", self.from.format(DATE_FORMAT).to_string()),
            ("datumBis", self.to.format(DATE_FORMAT).to_string()),
        ]
    }
}
