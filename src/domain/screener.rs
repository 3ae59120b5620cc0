//! Screener presets over a universe at its effective as-of date.
//!
//! `trend` keeps members closing above their 50-bar average, `breakout`
//! members closing at their 252-bar high. Both rank by the close-to-close
//! return over `lookback` bars, best first.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::cmp::Ordering;

use crate::domain::error::MarketLensError;
use crate::domain::instrument_bars::{effective_end_date, load_universe_bars, InstrumentBars};
use crate::domain::numeric::{round6, round6_opt};
use crate::domain::query::{Resolution, ScreenerPreset};
use crate::domain::snapshot::MemberSnapshot;
use crate::domain::universe::{resolve_universe, UniverseSpec};
use crate::ports::data_port::DataPort;

/// Calendar days fetched before the as-of date to fill 252-bar windows.
pub const SCREENER_BUFFER_DAYS: u64 = 450;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenerItem {
    pub symbol: String,
    pub name: Option<String>,
    pub as_of_date: NaiveDate,
    pub close: Option<f64>,
    pub return_pct: Option<f64>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub volume: Option<i64>,
}

impl ScreenerItem {
    pub fn from_snapshot(set: &InstrumentBars, snap: &MemberSnapshot) -> Self {
        Self {
            symbol: set.symbol().to_string(),
            name: set.name(),
            as_of_date: snap.date,
            close: round6_opt(snap.close),
            return_pct: snap.lookback_return().and_then(round6),
            ma50: round6_opt(snap.ma50),
            ma200: round6_opt(snap.ma200),
            volume: snap.volume,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenerQuery {
    pub universe: UniverseSpec,
    pub preset: ScreenerPreset,
    pub as_of: NaiveDate,
    pub lookback: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenerResult {
    pub preset: ScreenerPreset,
    pub universe: String,
    pub as_of_date: Option<NaiveDate>,
    pub items: Vec<ScreenerItem>,
}

fn passes(preset: ScreenerPreset, snap: &MemberSnapshot) -> bool {
    match preset {
        ScreenerPreset::Trend => snap.above_ma50(),
        ScreenerPreset::Breakout => snap.at_high252(),
    }
}

/// Screen loaded daily bars at `as_of`.
pub fn screen(
    sets: &[InstrumentBars],
    preset: ScreenerPreset,
    as_of: NaiveDate,
    lookback: usize,
    limit: usize,
) -> Vec<ScreenerItem> {
    let mut items: Vec<ScreenerItem> = sets
        .iter()
        .filter_map(|set| {
            let snap = MemberSnapshot::at(set, as_of, Some(lookback))?;
            passes(preset, &snap).then(|| ScreenerItem::from_snapshot(set, &snap))
        })
        .collect();

    items.sort_by(|a, b| {
        match (a.return_pct, b.return_pct) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.symbol.cmp(&b.symbol))
    });
    items.truncate(limit);
    items
}

pub fn run_screener(
    port: &dyn DataPort,
    query: &ScreenerQuery,
) -> Result<ScreenerResult, MarketLensError> {
    let universe = resolve_universe(port, &query.universe, query.as_of)?;
    let start = query
        .as_of
        .checked_sub_days(Days::new(SCREENER_BUFFER_DAYS))
        .unwrap_or(NaiveDate::MIN);
    let sets = load_universe_bars(port, &universe, start, query.as_of, Resolution::Daily);

    let Some(as_of_bar) = effective_end_date(&sets, query.as_of) else {
        return Ok(ScreenerResult {
            preset: query.preset,
            universe: query.universe.to_string(),
            as_of_date: None,
            items: Vec::new(),
        });
    };

    let items = screen(&sets, query.preset, as_of_bar, query.lookback, query.limit);
    tracing::info!(
        universe = %query.universe,
        preset = ?query.preset,
        %as_of_bar,
        matched = items.len(),
        "screener"
    );
    Ok(ScreenerResult {
        preset: query.preset,
        universe: query.universe.to_string(),
        as_of_date: Some(as_of_bar),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::instrument::Instrument;

    fn d0() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn set(symbol: &str, closes: &[f64]) -> InstrumentBars {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(d0() + Days::new(i as u64), c, c, c, c, 100))
            .collect();
        InstrumentBars::new(Instrument::stock(symbol, None), bars)
    }

    fn ramp(from: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| from + step * i as f64).collect()
    }

    #[test]
    fn trend_keeps_members_above_ma50_ranked_by_return() {
        let fast = set("FAST", &ramp(10.0, 2.0, 60));
        let slow = set("SLOW", &ramp(10.0, 0.5, 60));
        let falling = set("FALL", &ramp(100.0, -1.0, 60));
        let as_of = d0() + Days::new(59);

        let items = screen(&[slow, falling, fast], ScreenerPreset::Trend, as_of, 5, 10);
        let order: Vec<&str> = items.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(order, vec!["FAST", "SLOW"]);
        // FAST: 128 / 118 - 1
        assert_eq!(items[0].return_pct, round6(128.0 / 118.0 - 1.0));
    }

    #[test]
    fn breakout_requires_close_at_252_high() {
        let mut closes = ramp(10.0, 1.0, 30);
        let at_high = set("HIGH", &closes);
        closes.push(5.0);
        let pulled_back = set("PULL", &closes[1..]);
        let as_of = d0() + Days::new(29);
        let items = screen(&[at_high, pulled_back], ScreenerPreset::Breakout, as_of, 5, 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].symbol, "HIGH");
    }

    #[test]
    fn members_without_a_bar_on_as_of_are_skipped() {
        let stale = set("OLD", &ramp(10.0, 1.0, 10));
        let items = screen(&[stale], ScreenerPreset::Trend, d0() + Days::new(20), 5, 10);
        assert!(items.is_empty());
    }

    #[test]
    fn missing_lookback_return_sorts_last() {
        let long = set("LONG", &ramp(10.0, 0.1, 30));
        let short = set("SHORT", &ramp(10.0, 5.0, 30)[27..]);
        let as_of = d0() + Days::new(29);
        // SHORT dates must line up with as_of
        let short = InstrumentBars::new(
            short.instrument.clone(),
            short
                .bars
                .iter()
                .enumerate()
                .map(|(i, b)| Bar { date: d0() + Days::new(27 + i as u64), ..b.clone() })
                .collect(),
        );
        let items = screen(&[short, long], ScreenerPreset::Trend, as_of, 10, 10);
        assert_eq!(items[0].symbol, "LONG");
        assert_eq!(items[1].return_pct, None);
    }
}
