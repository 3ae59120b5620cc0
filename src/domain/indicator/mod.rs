//! Technical indicators over a single instrument's bar series.
//!
//! Calculators work on index-aligned `Option<f64>` arrays and return raw,
//! unrounded values; [`series`] assembles them into dated, rounded points.
//! - `sma`: strict-window simple moving average
//! - `ema`: exponential moving average with hold-last-value on gaps
//! - `macd`: DIF/DEA/histogram built on `ema`
//! - `kdj`: stochastic K/D/J with 1/3 smoothing

pub mod sma;
pub mod ema;
pub mod macd;
pub mod kdj;
pub mod series;

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::MarketLensError;

pub use ema::ema;
pub use kdj::{kdj, KdjValue};
pub use macd::{macd, MacdValue};
pub use sma::sma;

/// One dated output row. Sub-objects are present only when requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ma: Option<BTreeMap<usize, Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<MacdValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdj: Option<KdjValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Kdj {
        period: usize,
        k_smooth: usize,
        d_smooth: usize,
    },
}

impl IndicatorType {
    pub const MACD: IndicatorType = IndicatorType::Macd {
        fast: macd::DEFAULT_FAST,
        slow: macd::DEFAULT_SLOW,
        signal: macd::DEFAULT_SIGNAL,
    };

    pub const KDJ: IndicatorType = IndicatorType::Kdj {
        period: kdj::DEFAULT_PERIOD,
        k_smooth: kdj::DEFAULT_SMOOTH,
        d_smooth: kdj::DEFAULT_SMOOTH,
    };
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Kdj {
                period,
                k_smooth,
                d_smooth,
            } => write!(f, "KDJ({},{},{})", period, k_smooth, d_smooth),
        }
    }
}

impl FromStr for IndicatorType {
    type Err = MarketLensError;

    /// Include-list tokens: `macd` and `kdj` with their standard parameters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "macd" => Ok(IndicatorType::MACD),
            "kdj" => Ok(IndicatorType::KDJ),
            other => Err(MarketLensError::invalid(format!(
                "unknown indicator '{other}', expected macd or kdj"
            ))),
        }
    }
}

/// Parse a comma-separated include list such as `"macd,kdj"`.
pub fn parse_include(raw: &str) -> Result<Vec<IndicatorType>, MarketLensError> {
    let mut out = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let ty: IndicatorType = token.parse()?;
        if !out.contains(&ty) {
            out.push(ty);
        }
    }
    Ok(out)
}
