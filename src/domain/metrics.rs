//! Latest bar-level metrics for alert evaluation.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::bar::{self, Bar};
use crate::domain::numeric::rolling_mean;

/// Calendar days of history needed to fill a 200-bar average.
pub const METRICS_LOOKBACK_DAYS: u64 = 400;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestMetrics {
    pub bar_date: NaiveDate,
    pub close: Option<f64>,
    pub prev_close: Option<f64>,
    pub ma20: Option<f64>,
    pub ma20_prev: Option<f64>,
    pub ma50: Option<f64>,
    pub ma50_prev: Option<f64>,
    pub ma200: Option<f64>,
    pub ma200_prev: Option<f64>,
    pub volume: Option<i64>,
    pub vol_ma50: Option<f64>,
}

fn last_two(values: &[Option<f64>]) -> (Option<f64>, Option<f64>) {
    let n = values.len();
    let last = values.last().copied().flatten();
    let prev = if n >= 2 { values[n - 2] } else { None };
    (last, prev)
}

impl LatestMetrics {
    /// Metrics at the newest bar of an ascending daily series.
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        let latest = bars.last()?;
        let closes = bar::closes(bars);

        let (ma20, ma20_prev) = last_two(&rolling_mean(&closes, 20));
        let (ma50, ma50_prev) = last_two(&rolling_mean(&closes, 50));
        let (ma200, ma200_prev) = last_two(&rolling_mean(&closes, 200));
        let (_, prev_close) = last_two(&closes);
        let vol_ma50 = rolling_mean(&bar::volumes(bars), 50)
            .last()
            .copied()
            .flatten();

        Some(Self {
            bar_date: latest.date,
            close: latest.close,
            prev_close,
            ma20,
            ma20_prev,
            ma50,
            ma50_prev,
            ma200,
            ma200_prev,
            volume: latest.volume,
            vol_ma50,
        })
    }

    /// Current and previous value of the moving average for `period`
    /// (20, 50 or 200).
    pub fn moving_average(&self, period: u32) -> Option<(Option<f64>, Option<f64>)> {
        match period {
            20 => Some((self.ma20, self.ma20_prev)),
            50 => Some((self.ma50, self.ma50_prev)),
            200 => Some((self.ma200, self.ma200_prev)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn series(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(start + chrono::Days::new(i as u64), c, c, c, c, 100 * (i as i64 + 1)))
            .collect()
    }

    #[test]
    fn empty_series_has_no_metrics() {
        assert!(LatestMetrics::from_bars(&[]).is_none());
    }

    #[test]
    fn single_bar_has_no_previous_values() {
        let m = LatestMetrics::from_bars(&series(&[10.0])).unwrap();
        assert_eq!(m.close, Some(10.0));
        assert_eq!(m.prev_close, None);
        assert_eq!(m.ma20, Some(10.0));
        assert_eq!(m.ma20_prev, None);
    }

    #[test]
    fn averages_use_available_history() {
        let closes: Vec<f64> = (1..=30).map(f64::from).collect();
        let m = LatestMetrics::from_bars(&series(&closes)).unwrap();
        assert_eq!(m.close, Some(30.0));
        assert_eq!(m.prev_close, Some(29.0));
        // last 20 of 1..=30 -> 11..=30
        assert_abs_diff_eq!(m.ma20.unwrap(), 20.5, epsilon = 1e-9);
        assert_abs_diff_eq!(m.ma20_prev.unwrap(), 19.5, epsilon = 1e-9);
        // clipped: all 30 bars
        assert_abs_diff_eq!(m.ma50.unwrap(), 15.5, epsilon = 1e-9);
        assert_eq!(m.volume, Some(3000));
        assert_abs_diff_eq!(m.vol_ma50.unwrap(), 1550.0, epsilon = 1e-9);
    }

    #[test]
    fn moving_average_selector() {
        let m = LatestMetrics::from_bars(&series(&[1.0, 2.0])).unwrap();
        assert_eq!(m.moving_average(20), Some((Some(1.5), Some(1.0))));
        assert!(m.moving_average(30).is_none());
    }
}
