//! Relative strength of instruments against an index.
//!
//! The series variant joins one stock with the index on common dates and
//! normalises the close ratio to 1.0 at the first joined date. The ranking
//! variant compares each member's return over a fixed bar lookback with the
//! index's return over the same number of index bars.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::bar::Bar;
use crate::domain::error::MarketLensError;
use crate::domain::instrument::canonical_index;
use crate::domain::instrument_bars::{load_instrument_bars, load_universe_bars, InstrumentBars};
use crate::domain::numeric::{finite, lag, ratio_change, rolling_mean, round6, round6_opt};
use crate::domain::query::Resolution;
use crate::domain::universe::{require_index, resolve_universe, UniverseSpec};
use crate::ports::data_port::DataPort;

/// Calendar days fetched before the index's latest bar for lookback and MA50.
pub const RS_RANK_BUFFER_DAYS: u64 = 500;
const MA_WINDOW: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RsPoint {
    pub date: NaiveDate,
    pub stock_close: Option<f64>,
    pub index_close: Option<f64>,
    pub rs: Option<f64>,
    pub rs_norm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RsSeries {
    pub symbol: String,
    pub index: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub stock_return: Option<f64>,
    pub index_return: Option<f64>,
    pub rs_return: Option<f64>,
    pub points: Vec<RsPoint>,
}

/// `(1 + stock) / (1 + index) - 1`.
pub fn relative_return(stock: Option<f64>, index: Option<f64>) -> Option<f64> {
    match (stock, index) {
        (Some(s), Some(i)) if 1.0 + i != 0.0 => finite((1.0 + s) / (1.0 + i) - 1.0),
        _ => None,
    }
}

/// Join on dates where both closes exist and the index close is non-zero.
fn join(stock: &[Bar], index: &[Bar]) -> Vec<(NaiveDate, f64, f64)> {
    let index_closes: BTreeMap<NaiveDate, f64> = index
        .iter()
        .filter_map(|b| b.close.filter(|c| *c != 0.0).map(|c| (b.date, c)))
        .collect();
    stock
        .iter()
        .filter_map(|b| {
            let s = b.close?;
            let i = index_closes.get(&b.date)?;
            Some((b.date, s, *i))
        })
        .collect()
}

pub fn compute_rs_series(
    symbol: &str,
    index: &str,
    start: NaiveDate,
    end: NaiveDate,
    stock: &[Bar],
    index_bars: &[Bar],
) -> RsSeries {
    let joined = join(stock, index_bars);

    let (stock_return, index_return, first_rs) = match (joined.first(), joined.last()) {
        (Some(&(_, s0, i0)), Some(&(_, s1, i1))) => {
            let first_rs = finite(s0 / i0);
            (ratio_change(Some(s1), Some(s0)), ratio_change(Some(i1), Some(i0)), first_rs)
        }
        _ => (None, None, None),
    };

    let points = joined
        .iter()
        .map(|&(date, s, i)| {
            let rs = finite(s / i);
            let rs_norm = match (rs, first_rs) {
                (Some(r), Some(f)) if f != 0.0 => finite(r / f),
                _ => None,
            };
            RsPoint {
                date,
                stock_close: round6(s),
                index_close: round6(i),
                rs: round6_opt(rs),
                rs_norm: round6_opt(rs_norm),
            }
        })
        .collect();

    RsSeries {
        symbol: symbol.to_string(),
        index: index.to_string(),
        start,
        end,
        stock_return: round6_opt(stock_return),
        index_return: round6_opt(index_return),
        rs_return: round6_opt(relative_return(stock_return, index_return)),
        points,
    }
}

pub fn rs_series(
    port: &dyn DataPort,
    symbol: &str,
    index: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RsSeries, MarketLensError> {
    if start > end {
        return Err(MarketLensError::InvalidDateRange { start, end });
    }
    let index = canonical_index(index);
    let stock = load_instrument_bars(port, symbol, start, end, Resolution::Daily)?;
    let bench = load_instrument_bars(port, &index, start, end, Resolution::Daily)?;
    Ok(compute_rs_series(
        stock.symbol(),
        &index,
        start,
        end,
        &stock.bars,
        &bench.bars,
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RsRankItem {
    pub symbol: String,
    pub name: Option<String>,
    pub as_of_date: NaiveDate,
    pub close: Option<f64>,
    pub ma50: Option<f64>,
    pub stock_return: Option<f64>,
    pub index_return: Option<f64>,
    pub rs_return: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RsRankQuery {
    pub universe: UniverseSpec,
    pub index: String,
    pub as_of: NaiveDate,
    pub lookback: usize,
    pub require_above_ma50: bool,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RsRanking {
    pub index: String,
    pub as_of_date: Option<NaiveDate>,
    pub index_return: Option<f64>,
    pub items: Vec<RsRankItem>,
}

/// Index close at its latest bar and `lookback` bars earlier.
pub fn index_anchor(index_bars: &[Bar], lookback: usize) -> Option<(NaiveDate, f64, f64)> {
    let with_close: Vec<&Bar> = index_bars.iter().filter(|b| b.close.is_some()).collect();
    let latest = with_close.last()?;
    let earlier = with_close.len().checked_sub(lookback + 1).map(|i| with_close[i])?;
    Some((latest.date, latest.close?, earlier.close?))
}

/// Rank members by return relative to the index over `lookback` bars.
pub fn rank_relative_strength(
    sets: &[InstrumentBars],
    as_of: NaiveDate,
    index_return: f64,
    lookback: usize,
    require_above_ma50: bool,
    limit: usize,
) -> Vec<RsRankItem> {
    let mut items: Vec<RsRankItem> = sets
        .iter()
        .filter_map(|set| {
            let i = set.get_bar_index(as_of)?;
            let closes = set.closes();
            let close = closes[i]?;
            let close_lb = lag(&closes, lookback)[i];
            let ma50 = rolling_mean(&closes, MA_WINDOW)[i];
            if require_above_ma50 && !matches!(ma50, Some(m) if close > m) {
                return None;
            }
            let stock_return = ratio_change(Some(close), close_lb);
            Some(RsRankItem {
                symbol: set.symbol().to_string(),
                name: set.name(),
                as_of_date: as_of,
                close: round6(close),
                ma50: round6_opt(ma50),
                stock_return: round6_opt(stock_return),
                index_return: round6(index_return),
                rs_return: round6_opt(relative_return(stock_return, Some(index_return))),
            })
        })
        .collect();

    items.sort_by(|a, b| {
        match (a.rs_return, b.rs_return) {
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

pub fn rs_ranking(port: &dyn DataPort, query: &RsRankQuery) -> Result<RsRanking, MarketLensError> {
    let index = canonical_index(&query.index);
    require_index(port, &index)?;
    let empty = |as_of_date| RsRanking {
        index: index.clone(),
        as_of_date,
        index_return: None,
        items: Vec::new(),
    };

    let window_start = |d: NaiveDate| {
        d.checked_sub_days(Days::new(RS_RANK_BUFFER_DAYS))
            .unwrap_or(NaiveDate::MIN)
    };
    let index_bars = port.fetch_bars(&index, window_start(query.as_of), query.as_of)?;
    let Some((as_of_bar, index_close, index_close_lb)) = index_anchor(&index_bars, query.lookback)
    else {
        tracing::info!(%index, lookback = query.lookback, "index lacks lookback history");
        return Ok(empty(index_bars.last().map(|b| b.date)));
    };
    let Some(index_return) = ratio_change(Some(index_close), Some(index_close_lb)) else {
        return Ok(empty(Some(as_of_bar)));
    };

    let universe = resolve_universe(port, &query.universe, as_of_bar)?;
    let sets = load_universe_bars(
        port,
        &universe,
        window_start(as_of_bar),
        as_of_bar,
        Resolution::Daily,
    );
    let items = rank_relative_strength(
        &sets,
        as_of_bar,
        index_return,
        query.lookback,
        query.require_above_ma50,
        query.limit,
    );
    tracing::info!(%index, %as_of_bar, ranked = items.len(), "relative strength ranking");
    Ok(RsRanking {
        index,
        as_of_date: Some(as_of_bar),
        index_return: round6(index_return),
        items,
    })
}
