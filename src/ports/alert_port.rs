//! Alert rule and event persistence port.

use chrono::NaiveDate;

use crate::domain::alert::{AlertEvent, AlertRule, NewAlertEvent};
use crate::domain::error::MarketLensError;

pub trait AlertPort {
    /// Enabled rules owned by `owner`.
    fn enabled_rules(&self, owner: &str) -> Result<Vec<AlertRule>, MarketLensError>;

    /// Record an event. Returns `false` when an event for the same
    /// `(rule, bar date)` already exists; that is not an error.
    fn insert_event(&self, event: &NewAlertEvent) -> Result<bool, MarketLensError>;

    fn mark_triggered(&self, rule_id: i64, bar_date: NaiveDate) -> Result<(), MarketLensError>;

    /// Newest events first.
    fn latest_events(&self, owner: &str, limit: usize) -> Result<Vec<AlertEvent>, MarketLensError>;
}
