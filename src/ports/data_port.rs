//! Read-only bar store and universe metadata port.
//!
//! Stores hold daily bars only; coarser resolutions are derived by the
//! engine. Absence of data is `Ok(None)` / an empty vector, never an error.

use chrono::{Days, NaiveDate};

use crate::domain::bar::Bar;
use crate::domain::error::MarketLensError;
use crate::domain::instrument::{Instrument, InstrumentKind};
use crate::domain::metrics::{LatestMetrics, METRICS_LOOKBACK_DAYS};
use crate::domain::universe::MembershipSnapshot;

pub trait DataPort {
    fn find_instrument(&self, symbol: &str) -> Result<Option<Instrument>, MarketLensError>;

    fn list_instruments(&self, kind: InstrumentKind) -> Result<Vec<Instrument>, MarketLensError>;

    /// Daily bars in `[start, end]`, ascending by date.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, MarketLensError>;

    /// First date, last date and bar count.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, MarketLensError>;

    /// Roster attached to the latest as-of date on or before `as_of`.
    fn latest_membership_as_of(
        &self,
        index: &str,
        as_of: NaiveDate,
    ) -> Result<Option<MembershipSnapshot>, MarketLensError>;

    /// Point-in-time metrics at the symbol's newest bar.
    fn latest_metrics(&self, symbol: &str) -> Result<Option<LatestMetrics>, MarketLensError> {
        let Some((_, last, _)) = self.get_data_range(symbol)? else {
            return Ok(None);
        };
        let start = last
            .checked_sub_days(Days::new(METRICS_LOOKBACK_DAYS))
            .unwrap_or(NaiveDate::MIN);
        let bars = self.fetch_bars(symbol, start, last)?;
        Ok(LatestMetrics::from_bars(&bars))
    }
}
