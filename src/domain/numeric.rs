//! Shared numeric helpers: output rounding and single-pass rolling windows.
//!
//! Rolling windows here are *clipped*: at the start of a series the window
//! simply holds fewer observations, and missing values are ignored. A window
//! yields a value as soon as it holds one observation. This is the
//! semantics of the cross-sectional scans and alert metrics; the indicator
//! SMA uses the strict variant in [`crate::domain::indicator::sma`].

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::VecDeque;
use std::str::FromStr;

pub const OUTPUT_DECIMALS: u32 = 6;

/// Finite value or nothing.
pub fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Round to six decimals, half away from zero. Non-finite input is undefined.
pub fn round6(v: f64) -> Option<f64> {
    if !v.is_finite() {
        return None;
    }
    let decimal = Decimal::from_str(&v.to_string()).ok().or_else(|| Decimal::from_f64(v));
    match decimal {
        Some(d) => d
            .round_dp_with_strategy(OUTPUT_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
            .to_string()
            .parse()
            .ok(),
        // Out of Decimal range: magnitudes this large carry no fractional digits.
        None => Some(v),
    }
}

pub fn round6_opt(v: Option<f64>) -> Option<f64> {
    v.and_then(round6)
}

/// Value `k` positions earlier, or nothing.
pub fn lag(values: &[Option<f64>], k: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if i >= k { values[i - k] } else { None })
        .collect()
}

/// Monotonic deque over a sliding window of indices. Keeps candidates for
/// the window extremum so each value is pushed and popped at most once.
struct MonotonicWindow {
    window: usize,
    deque: VecDeque<(usize, f64)>,
    keep_max: bool,
}

impl MonotonicWindow {
    fn new(window: usize, keep_max: bool) -> Self {
        Self {
            window,
            deque: VecDeque::new(),
            keep_max,
        }
    }

    fn dominated(&self, existing: f64, incoming: f64) -> bool {
        if self.keep_max {
            existing <= incoming
        } else {
            existing >= incoming
        }
    }

    fn push(&mut self, i: usize, value: Option<f64>) -> Option<f64> {
        if let Some(v) = value {
            while let Some(&(_, back)) = self.deque.back() {
                if self.dominated(back, v) {
                    self.deque.pop_back();
                } else {
                    break;
                }
            }
            self.deque.push_back((i, v));
        }
        while let Some(&(front_i, _)) = self.deque.front() {
            if front_i + self.window <= i {
                self.deque.pop_front();
            } else {
                break;
            }
        }
        self.deque.front().map(|&(_, v)| v)
    }
}

fn rolling_extreme(values: &[Option<f64>], window: usize, keep_max: bool) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    let mut w = MonotonicWindow::new(window, keep_max);
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| w.push(i, v))
        .collect()
}

/// Max over the trailing `window` values including the current one.
pub fn rolling_max(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_extreme(values, window, true)
}

/// Min over the trailing `window` values including the current one.
pub fn rolling_min(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_extreme(values, window, false)
}

/// Max over the `window` values strictly before the current one.
pub fn preceding_max(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = rolling_max(values, window);
    out.rotate_right(1);
    if let Some(first) = out.first_mut() {
        *first = None;
    }
    out
}

/// Min over the `window` values strictly before the current one.
pub fn preceding_min(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = rolling_min(values, window);
    out.rotate_right(1);
    if let Some(first) = out.first_mut() {
        *first = None;
    }
    out
}

/// Mean of the non-missing values among the trailing `window` values
/// (current included), kept with a running sum over a ring buffer.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    let mut ring: VecDeque<Option<f64>> = VecDeque::with_capacity(window);
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut out = Vec::with_capacity(values.len());
    for &v in values {
        if ring.len() == window {
            if let Some(Some(old)) = ring.pop_front() {
                sum -= old;
                count -= 1;
            }
        }
        if let Some(x) = v {
            sum += x;
            count += 1;
        }
        ring.push_back(v);
        out.push(if count > 0 { Some(sum / count as f64) } else { None });
    }
    out
}

/// Running maximum from the start of the series.
pub fn running_max(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut acc: Option<f64> = None;
    values
        .iter()
        .map(|&v| {
            if let Some(x) = v {
                acc = Some(acc.map_or(x, |a| a.max(x)));
            }
            acc
        })
        .collect()
}

/// Running minimum from the start of the series.
pub fn running_min(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut acc: Option<f64> = None;
    values
        .iter()
        .map(|&v| {
            if let Some(x) = v {
                acc = Some(acc.map_or(x, |a| a.min(x)));
            }
            acc
        })
        .collect()
}

/// `a / b - 1`, undefined on a missing side or a zero denominator.
pub fn ratio_change(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) if y != 0.0 => finite(x / y - 1.0),
        _ => None,
    }
}
