//! MACD: DIF = EMA(fast) - EMA(slow), DEA = EMA(signal) of DIF,
//! histogram = 2 * (DIF - DEA).
//!
//! Default parameters: fast=12, slow=26, signal=9.

use serde::Serialize;

use crate::domain::indicator::ema;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacdValue {
    pub dif: Option<f64>,
    pub dea: Option<f64>,
    pub hist: Option<f64>,
}

pub fn macd(closes: &[Option<f64>], fast: usize, slow: usize, signal: usize) -> Vec<MacdValue> {
    let ema_fast = ema(closes, fast);
    let ema_slow = ema(closes, slow);

    let dif: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    let dea = ema(&dif, signal);

    dif.iter()
        .zip(&dea)
        .map(|(&dif, &dea)| MacdValue {
            dif,
            dea,
            hist: match (dif, dea) {
                (Some(a), Some(b)) => Some(2.0 * (a - b)),
                _ => None,
            },
        })
        .collect()
}
