//! Simple moving average with strict windows.
//!
//! A value exists only when all `period` values in the trailing window are
//! present. A gap keeps the average undefined until it ages out of the window.

use std::collections::VecDeque;

pub fn sma(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut window: VecDeque<Option<f64>> = VecDeque::with_capacity(period.min(values.len()));
    let mut sum = 0.0;
    let mut present = 0usize;
    let mut out = Vec::with_capacity(values.len());

    for &v in values {
        if window.len() == period {
            if let Some(Some(old)) = window.pop_front() {
                sum -= old;
                present -= 1;
            }
        }
        if let Some(x) = v {
            sum += x;
            present += 1;
        }
        window.push_back(v);
        out.push((present == period).then(|| sum / period as f64));
    }

    out
}
