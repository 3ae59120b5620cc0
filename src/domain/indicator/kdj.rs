//! KDJ stochastic oscillator.
//!
//! llv/hhv are the min low / max high over the trailing `period` bars, with
//! the window clipped at series start. RSV is 50 when the window has no
//! range or data is missing. K and D both start from 50:
//! K = (1 - 1/s)K' + RSV/s, D = (1 - 1/s)D' + K/s, J = 3K - 2D.

use serde::Serialize;

use crate::domain::numeric::{rolling_max, rolling_min};

pub const DEFAULT_PERIOD: usize = 9;
pub const DEFAULT_SMOOTH: usize = 3;
const NEUTRAL: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KdjValue {
    pub k: Option<f64>,
    pub d: Option<f64>,
    pub j: Option<f64>,
}

fn rsv(close: Option<f64>, llv: Option<f64>, hhv: Option<f64>) -> f64 {
    match (close, llv, hhv) {
        (Some(c), Some(lo), Some(hi)) if hi - lo > 0.0 => (c - lo) / (hi - lo) * 100.0,
        _ => NEUTRAL,
    }
}

pub fn kdj(
    highs: &[Option<f64>],
    lows: &[Option<f64>],
    closes: &[Option<f64>],
    period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> Vec<KdjValue> {
    let hhv = rolling_max(highs, period);
    let llv = rolling_min(lows, period);
    let k_alpha = 1.0 / k_smooth.max(1) as f64;
    let d_alpha = 1.0 / d_smooth.max(1) as f64;

    let mut k = NEUTRAL;
    let mut d = NEUTRAL;
    let mut out = Vec::with_capacity(closes.len());

    for i in 0..closes.len() {
        let r = rsv(closes[i], llv[i], hhv[i]);
        k = (1.0 - k_alpha) * k + k_alpha * r;
        d = (1.0 - d_alpha) * d + d_alpha * k;
        let j = 3.0 * k - 2.0 * d;
        out.push(KdjValue {
            k: Some(k),
            d: Some(d),
            j: Some(j),
        });
    }

    out
}
