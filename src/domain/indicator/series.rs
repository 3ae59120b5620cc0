//! Indicator request pipeline: warm-up fetch, resample, compute, truncate.
//!
//! EMA and KDJ carry unbounded memory, so values at the start of a requested
//! window depend on history before it. History is fetched from
//! `start - max(1200, 3 * longest MA)` days, indicators run over the full
//! extended series, and only then is the output cut to `[start, end]`.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::bar::{self, Bar};
use crate::domain::error::MarketLensError;
use crate::domain::indicator::{kdj, macd, sma, IndicatorPoint, IndicatorType, KdjValue, MacdValue};
use crate::domain::instrument_bars::load_instrument_bars;
use crate::domain::numeric::round6_opt;
use crate::domain::query::Resolution;
use crate::ports::data_port::DataPort;

pub const MIN_WARMUP_DAYS: u64 = 1200;
const WARMUP_MA_MULTIPLE: u64 = 3;

#[derive(Debug, Clone)]
pub struct IndicatorRequest {
    pub symbol: String,
    pub resolution: Resolution,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub ma_periods: Vec<usize>,
    pub include: Vec<IndicatorType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSeries {
    pub symbol: String,
    pub interval: Resolution,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub points: Vec<IndicatorPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BarSeries {
    pub symbol: String,
    pub interval: Resolution,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bars: Vec<Bar>,
}

/// First date of history needed before `start`.
pub fn warmup_start(start: NaiveDate, ma_periods: &[usize]) -> NaiveDate {
    let longest = u64::try_from(ma_periods.iter().copied().max().unwrap_or(0)).unwrap_or(u64::MAX);
    let days = MIN_WARMUP_DAYS.max(WARMUP_MA_MULTIPLE.saturating_mul(longest));
    start.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

fn round_macd(v: MacdValue) -> MacdValue {
    MacdValue {
        dif: round6_opt(v.dif),
        dea: round6_opt(v.dea),
        hist: round6_opt(v.hist),
    }
}

fn round_kdj(v: KdjValue) -> KdjValue {
    KdjValue {
        k: round6_opt(v.k),
        d: round6_opt(v.d),
        j: round6_opt(v.j),
    }
}

/// Compute rounded indicator points for every bar of `bars`.
pub fn compute_points(
    bars: &[Bar],
    ma_periods: &[usize],
    include: &[IndicatorType],
) -> Vec<IndicatorPoint> {
    let closes = bar::closes(bars);

    let ma_columns: Vec<(usize, Vec<Option<f64>>)> = ma_periods
        .iter()
        .map(|&p| (p, sma(&closes, p)))
        .collect();

    let mut macd_column = None;
    let mut kdj_column = None;
    for ty in include {
        tracing::trace!(indicator = %ty, bars = bars.len(), "computing");
        match *ty {
            IndicatorType::Macd { fast, slow, signal } => {
                macd_column = Some(macd(&closes, fast, slow, signal));
            }
            IndicatorType::Kdj {
                period,
                k_smooth,
                d_smooth,
            } => {
                let highs: Vec<Option<f64>> = bars.iter().map(|b| b.high).collect();
                let lows: Vec<Option<f64>> = bars.iter().map(|b| b.low).collect();
                kdj_column = Some(kdj(&highs, &lows, &closes, period, k_smooth, d_smooth));
            }
        }
    }

    bars.iter()
        .enumerate()
        .map(|(i, b)| IndicatorPoint {
            date: b.date,
            ma: (!ma_columns.is_empty()).then(|| {
                ma_columns
                    .iter()
                    .map(|(p, col)| (*p, round6_opt(col[i])))
                    .collect::<BTreeMap<_, _>>()
            }),
            macd: macd_column.as_ref().map(|c| round_macd(c[i])),
            kdj: kdj_column.as_ref().map(|c| round_kdj(c[i])),
        })
        .collect()
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), MarketLensError> {
    if start > end {
        return Err(MarketLensError::InvalidDateRange { start, end });
    }
    Ok(())
}

pub fn indicator_series(
    port: &dyn DataPort,
    request: &IndicatorRequest,
) -> Result<IndicatorSeries, MarketLensError> {
    check_range(request.start, request.end)?;
    let fetch_start = warmup_start(request.start, &request.ma_periods);
    let loaded = load_instrument_bars(
        port,
        &request.symbol,
        fetch_start,
        request.end,
        request.resolution,
    )?;

    tracing::debug!(
        symbol = %loaded.symbol(),
        %fetch_start,
        bars = loaded.bar_count(),
        "indicator warm-up fetch"
    );

    let points = compute_points(&loaded.bars, &request.ma_periods, &request.include)
        .into_iter()
        .filter(|p| p.date >= request.start && p.date <= request.end)
        .collect();

    Ok(IndicatorSeries {
        symbol: loaded.instrument.symbol,
        interval: request.resolution,
        start: request.start,
        end: request.end,
        points,
    })
}

/// Plain bar retrieval at any resolution.
pub fn bar_series(
    port: &dyn DataPort,
    symbol: &str,
    resolution: Resolution,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BarSeries, MarketLensError> {
    check_range(start, end)?;
    let loaded = load_instrument_bars(port, symbol, start, end, resolution)?;
    Ok(BarSeries {
        symbol: loaded.instrument.symbol,
        interval: resolution,
        start,
        end,
        bars: loaded.bars,
    })
}
