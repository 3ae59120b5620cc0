//! Price/volume bar representation.
//!
//! Every price field is optional: vendors occasionally deliver rows with a
//! missing high or close, and the engine carries those gaps through rather
//! than inventing values.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl Bar {
    /// A fully populated bar.
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Self {
            date,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }

    /// close / prev_close - 1, undefined when either side is missing or the
    /// previous close is zero.
    pub fn change_from(&self, prev_close: Option<f64>) -> Option<f64> {
        match (self.close, prev_close) {
            (Some(c), Some(p)) if p != 0.0 => Some(c / p - 1.0),
            _ => None,
        }
    }

    pub fn volume_f64(&self) -> Option<f64> {
        self.volume.map(|v| v as f64)
    }
}

/// Closes of a bar slice, index-aligned.
pub fn closes(bars: &[Bar]) -> Vec<Option<f64>> {
    bars.iter().map(|b| b.close).collect()
}

pub fn volumes(bars: &[Bar]) -> Vec<Option<f64>> {
    bars.iter().map(Bar::volume_f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            100.0,
            110.0,
            90.0,
            105.0,
            50_000,
        )
    }

    #[test]
    fn change_from_previous_close() {
        let bar = sample_bar();
        let change = bar.change_from(Some(100.0)).unwrap();
        assert!((change - 0.05).abs() < 1e-12);
    }

    #[test]
    fn change_undefined_on_zero_previous() {
        assert_eq!(sample_bar().change_from(Some(0.0)), None);
        assert_eq!(sample_bar().change_from(None), None);
    }

    #[test]
    fn change_undefined_on_missing_close() {
        let mut bar = sample_bar();
        bar.close = None;
        assert_eq!(bar.change_from(Some(100.0)), None);
    }

    #[test]
    fn serializes_date_as_iso() {
        let json = serde_json::to_string(&sample_bar()).unwrap();
        assert!(json.contains("\"date\":\"2024-01-15\""));
        assert!(json.contains("\"volume\":50000"));
    }
}
