//! Directional streak ranking.
//!
//! Each bar is classified against the previous close as up (+1), down (-1)
//! or flat (0). Flat also covers bars that fail the optional volume filter
//! (volume below `multiple` x trailing-20 average) or whose move is smaller
//! than the optional flat threshold. Runs of equal classification are
//! measured in bars; an instrument's streak is its longest run in the
//! requested direction, ties going to the most recent run.

use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

use crate::domain::bar::Bar;
use crate::domain::error::MarketLensError;
use crate::domain::instrument_bars::{load_instrument_bars, load_universe_bars, InstrumentBars};
use crate::domain::numeric::rolling_mean;
use crate::domain::query::{Direction, Resolution};
use crate::domain::universe::{resolve_universe, UniverseSpec};
use crate::ports::data_port::DataPort;

const VOLUME_AVERAGE_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreakFilters {
    /// Volume must reach this multiple of the trailing average to count.
    pub volume_multiple: Option<f64>,
    /// Absolute close-to-close change ratio below which a bar is flat.
    pub flat_threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakRun {
    pub length: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreakItem {
    pub symbol: String,
    pub name: Option<String>,
    pub direction: Direction,
    pub streak: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct StreakQuery {
    pub universe: UniverseSpec,
    pub resolution: Resolution,
    pub direction: Direction,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub filters: StreakFilters,
    pub limit: usize,
}

/// Classification per bar; `None` for a bar with no previous close.
/// Bars must all carry a close.
pub fn classify(bars: &[Bar], filters: StreakFilters) -> Vec<Option<i8>> {
    let vol_avg = filters.volume_multiple.map(|_| {
        let volumes: Vec<Option<f64>> = bars.iter().map(Bar::volume_f64).collect();
        rolling_mean(&volumes, VOLUME_AVERAGE_WINDOW)
    });

    (0..bars.len())
        .map(|i| {
            let close = bars[i].close?;
            let prev = if i > 0 { bars[i - 1].close? } else { return None };

            if let (Some(multiple), Some(avg)) = (filters.volume_multiple, vol_avg.as_ref()) {
                let quiet = match (bars[i].volume_f64(), avg[i]) {
                    (Some(v), Some(a)) if a != 0.0 => v < a * multiple,
                    _ => true,
                };
                if quiet {
                    return Some(0);
                }
            }

            if let Some(threshold) = filters.flat_threshold {
                if prev != 0.0 && (close / prev - 1.0).abs() < threshold {
                    return Some(0);
                }
            }

            Some(match close.partial_cmp(&prev) {
                Some(Ordering::Greater) => 1,
                Some(Ordering::Less) => -1,
                _ => 0,
            })
        })
        .collect()
}

/// Longest run of bars classified in `direction`, latest run on ties.
pub fn longest_run(bars: &[Bar], direction: Direction, filters: StreakFilters) -> Option<StreakRun> {
    let with_close: Vec<Bar> = bars.iter().filter(|b| b.close.is_some()).cloned().collect();
    let classes = classify(&with_close, filters);
    let wanted = Some(direction.sign());

    let mut best: Option<StreakRun> = None;
    let mut i = 0;
    while i < classes.len() {
        if classes[i] != wanted {
            i += 1;
            continue;
        }
        let begin = i;
        while i < classes.len() && classes[i] == wanted {
            i += 1;
        }
        let run = StreakRun {
            length: i - begin,
            start_date: with_close[begin].date,
            end_date: with_close[i - 1].date,
        };
        // later runs win ties since runs are visited in date order
        if best.is_none_or(|b| run.length >= b.length) {
            best = Some(run);
        }
    }
    best
}

/// Rank instruments by streak length, then by most recent end date.
pub fn rank_streaks(
    sets: &[InstrumentBars],
    direction: Direction,
    filters: StreakFilters,
    limit: usize,
) -> Vec<StreakItem> {
    let mut items: Vec<StreakItem> = sets
        .iter()
        .filter_map(|set| {
            let run = longest_run(&set.bars, direction, filters)?;
            Some(StreakItem {
                symbol: set.symbol().to_string(),
                name: set.name(),
                direction,
                streak: run.length,
                start_date: Some(run.start_date),
                end_date: Some(run.end_date),
            })
        })
        .collect();

    items.sort_by(|a, b| {
        b.streak
            .cmp(&a.streak)
            .then_with(|| b.end_date.cmp(&a.end_date))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    items.truncate(limit);
    items
}

pub fn streak_ranking(
    port: &dyn DataPort,
    query: &StreakQuery,
) -> Result<Vec<StreakItem>, MarketLensError> {
    if query.start > query.end {
        return Err(MarketLensError::InvalidDateRange {
            start: query.start,
            end: query.end,
        });
    }
    let universe = resolve_universe(port, &query.universe, query.end)?;
    let sets = load_universe_bars(port, &universe, query.start, query.end, query.resolution);
    let items = rank_streaks(&sets, query.direction, query.filters, query.limit);
    tracing::info!(
        universe = %query.universe,
        direction = ?query.direction,
        ranked = items.len(),
        "streak ranking"
    );
    Ok(items)
}

/// Best run for one symbol; a symbol without a qualifying run reports a
/// zero-length streak with no dates.
pub fn symbol_streak(
    port: &dyn DataPort,
    symbol: &str,
    resolution: Resolution,
    direction: Direction,
    start: NaiveDate,
    end: NaiveDate,
    filters: StreakFilters,
) -> Result<StreakItem, MarketLensError> {
    if start > end {
        return Err(MarketLensError::InvalidDateRange { start, end });
    }
    let set = load_instrument_bars(port, symbol, start, end, resolution)?;
    let run = longest_run(&set.bars, direction, filters);
    Ok(StreakItem {
        symbol: set.symbol().to_string(),
        name: set.name(),
        direction,
        streak: run.map_or(0, |r| r.length),
        start_date: run.map(|r| r.start_date),
        end_date: run.map(|r| r.end_date),
    })
}
