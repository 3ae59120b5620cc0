//! Daily-to-coarser bar resampling.
//!
//! Periods are ISO weeks, calendar months, calendar quarters or calendar
//! years. An output bar is dated on the last daily bar of its period.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use crate::domain::bar::Bar;
use crate::domain::query::Resolution;

fn period_key(date: NaiveDate, resolution: Resolution) -> (i32, u32) {
    match resolution {
        Resolution::Daily => (date.year(), date.ordinal()),
        Resolution::Weekly => {
            let week = date.iso_week();
            (week.year(), week.week())
        }
        Resolution::Monthly => (date.year(), date.month()),
        Resolution::Quarterly => (date.year(), (date.month() - 1) / 3 + 1),
        Resolution::Yearly => (date.year(), 0),
    }
}

fn fold_group(group: &[&Bar]) -> Option<Bar> {
    let first = group.first()?;
    let last = group.last()?;

    let high = group
        .iter()
        .filter_map(|b| b.high)
        .reduce(f64::max);
    let low = group
        .iter()
        .filter_map(|b| b.low)
        .reduce(f64::min);
    let volume = group
        .iter()
        .filter_map(|b| b.volume)
        .reduce(|a, b| a + b);

    Some(Bar {
        date: last.date,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
    })
}

/// Roll an ascending daily series up to `resolution`.
///
/// Daily resolution returns the input unchanged. Output is ascending by the
/// period's last trading date.
pub fn aggregate(daily: &[Bar], resolution: Resolution) -> Vec<Bar> {
    if resolution == Resolution::Daily {
        return daily.to_vec();
    }

    let mut groups: BTreeMap<(i32, u32), Vec<&Bar>> = BTreeMap::new();
    for bar in daily {
        groups
            .entry(period_key(bar.date, resolution))
            .or_default()
            .push(bar);
    }

    let mut out: Vec<Bar> = groups
        .values_mut()
        .filter_map(|group| {
            group.sort_by_key(|b| b.date);
            fold_group(group)
        })
        .collect();
    out.sort_by_key(|b| b.date);
    out
}
