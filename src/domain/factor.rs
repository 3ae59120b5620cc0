//! Factor rankings: drawdown / run-up extremes and new-high / new-low counts.

use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

use crate::domain::error::MarketLensError;
use crate::domain::instrument_bars::{load_universe_bars, InstrumentBars};
use crate::domain::numeric::{preceding_max, preceding_min, ratio_change, round6, running_max, running_min};
use crate::domain::query::{DrawdownMode, FactorMetric, Resolution};
use crate::domain::universe::{resolve_universe, UniverseSpec};
use crate::ports::data_port::DataPort;

/// A series-wide extreme and the latest date it was reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extreme {
    pub value: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakoutCount {
    pub count: usize,
    pub evaluated: usize,
    pub last_date: NaiveDate,
}

impl BreakoutCount {
    pub fn rate(&self) -> Option<f64> {
        (self.evaluated > 0).then(|| self.count as f64 / self.evaluated as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorItem {
    pub symbol: String,
    pub name: Option<String>,
    pub metric: &'static str,
    pub value: Option<f64>,
    /// Extremum date for drawdown/run-up, last bar date for counts.
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FactorQuery {
    pub universe: UniverseSpec,
    pub resolution: Resolution,
    pub metric: FactorMetric,
    pub mode: DrawdownMode,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub lookback: usize,
    pub limit: usize,
}

/// Min (or max) of `series`, reported at its most recent occurrence.
fn latest_extreme(dates: &[NaiveDate], series: &[Option<f64>], want_min: bool) -> Option<Extreme> {
    let mut best: Option<Extreme> = None;
    for (date, value) in dates.iter().zip(series) {
        let Some(v) = *value else { continue };
        let better = match best {
            None => true,
            Some(b) if want_min => v <= b.value,
            Some(b) => v >= b.value,
        };
        if better {
            best = Some(Extreme { value: v, date: *date });
        }
    }
    best
}

/// Deepest `close / running max - 1` over the series (always <= 0).
pub fn max_drawdown(dates: &[NaiveDate], closes: &[Option<f64>]) -> Option<Extreme> {
    let peaks = running_max(closes);
    let dd: Vec<Option<f64>> = closes
        .iter()
        .zip(&peaks)
        .map(|(&c, &p)| ratio_change(c, p))
        .collect();
    latest_extreme(dates, &dd, true)
}

/// Largest `close / running min - 1` over the series (always >= 0).
pub fn max_runup(dates: &[NaiveDate], closes: &[Option<f64>]) -> Option<Extreme> {
    let troughs = running_min(closes);
    let ru: Vec<Option<f64>> = closes
        .iter()
        .zip(&troughs)
        .map(|(&c, &t)| ratio_change(c, t))
        .collect();
    latest_extreme(dates, &ru, false)
}

/// Count closes beyond the max (or min) of the preceding `lookback - 1`
/// closes. Only bars with such a window are evaluated.
pub fn count_breakouts(
    dates: &[NaiveDate],
    closes: &[Option<f64>],
    lookback: usize,
    highs: bool,
) -> Option<BreakoutCount> {
    let last_date = *dates.last()?;
    let window = lookback.saturating_sub(1).max(1);
    let reference = if highs {
        preceding_max(closes, window)
    } else {
        preceding_min(closes, window)
    };

    let mut count = 0;
    let mut evaluated = 0;
    for (close, reference) in closes.iter().zip(&reference) {
        let (Some(c), Some(r)) = (close, reference) else { continue };
        evaluated += 1;
        if (highs && c > r) || (!highs && c < r) {
            count += 1;
        }
    }
    Some(BreakoutCount {
        count,
        evaluated,
        last_date,
    })
}

fn item(set: &InstrumentBars, metric: FactorMetric) -> FactorItem {
    FactorItem {
        symbol: set.symbol().to_string(),
        name: set.name(),
        metric: metric.label(),
        value: None,
        date: None,
        count: None,
        evaluated: None,
        rate: None,
    }
}

fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn asc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => desc_nulls_last(a, b),
    }
}

/// Rank a loaded universe by `metric`.
pub fn rank_factor(
    sets: &[InstrumentBars],
    metric: FactorMetric,
    mode: DrawdownMode,
    lookback: usize,
    limit: usize,
) -> Vec<FactorItem> {
    let mut items: Vec<FactorItem> = sets
        .iter()
        .map(InstrumentBars::with_closes_only)
        .filter(|set| set.bar_count() > 0)
        .map(|set| {
            let dates: Vec<NaiveDate> = set.bars.iter().map(|b| b.date).collect();
            let closes = set.closes();
            let mut out = item(&set, metric);
            match metric {
                FactorMetric::MaxDrawdown | FactorMetric::MaxRundown => {
                    if let Some(e) = max_drawdown(&dates, &closes) {
                        out.value = round6(e.value);
                        out.date = Some(e.date);
                    }
                }
                FactorMetric::MaxRunup => {
                    if let Some(e) = max_runup(&dates, &closes) {
                        out.value = round6(e.value);
                        out.date = Some(e.date);
                    }
                }
                FactorMetric::NewHighCount | FactorMetric::NewLowCount => {
                    let highs = metric == FactorMetric::NewHighCount;
                    if let Some(c) = count_breakouts(&dates, &closes, lookback, highs) {
                        out.value = Some(c.count as f64);
                        out.date = Some(c.last_date);
                        out.count = Some(c.count);
                        out.evaluated = Some(c.evaluated);
                        out.rate = c.rate().and_then(round6);
                    }
                }
            }
            out
        })
        .collect();

    let worst_first = match metric {
        FactorMetric::MaxDrawdown => mode == DrawdownMode::Worst,
        FactorMetric::MaxRundown => true,
        _ => false,
    };

    items.sort_by(|a, b| {
        let primary = if worst_first {
            asc_nulls_last(a.value, b.value)
        } else {
            desc_nulls_last(a.value, b.value)
        };
        primary
            .then_with(|| desc_nulls_last(a.rate, b.rate))
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    items.truncate(limit);
    items
}

pub fn factor_ranking(
    port: &dyn DataPort,
    query: &FactorQuery,
) -> Result<Vec<FactorItem>, MarketLensError> {
    if query.start > query.end {
        return Err(MarketLensError::InvalidDateRange {
            start: query.start,
            end: query.end,
        });
    }
    let universe = resolve_universe(port, &query.universe, query.end)?;
    let sets = load_universe_bars(port, &universe, query.start, query.end, query.resolution);
    let items = rank_factor(&sets, query.metric, query.mode, query.lookback, query.limit);
    tracing::info!(
        universe = %query.universe,
        metric = query.metric.label(),
        ranked = items.len(),
        "factor ranking"
    );
    Ok(items)
}
