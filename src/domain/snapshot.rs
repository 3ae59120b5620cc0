//! Rolling values at an instrument's latest bar, shared by breadth and the
//! screener.

use chrono::NaiveDate;

use crate::domain::instrument_bars::InstrumentBars;
use crate::domain::numeric::{lag, rolling_max, rolling_mean, rolling_min};

pub const HIGH_LOW_WINDOW: usize = 252;
pub const VOLUME_AVERAGE_WINDOW: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSnapshot {
    pub date: NaiveDate,
    pub close: Option<f64>,
    pub prev_close: Option<f64>,
    pub ma20: Option<f64>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub high252: Option<f64>,
    pub low252: Option<f64>,
    pub volume: Option<i64>,
    pub vol_ma50: Option<f64>,
    /// Close `lookback` bars earlier, when requested.
    pub close_lookback: Option<f64>,
}

fn at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

impl MemberSnapshot {
    /// Snapshot at the last bar of `set`, or `None` if the last bar isn't
    /// dated `as_of`.
    pub fn at(set: &InstrumentBars, as_of: NaiveDate, lookback: Option<usize>) -> Option<Self> {
        let last = set.bars.last()?;
        if last.date != as_of {
            return None;
        }
        let i = set.bars.len() - 1;
        let closes = set.closes();
        let volumes = set.volumes();

        Some(Self {
            date: last.date,
            close: last.close,
            prev_close: at(&lag(&closes, 1), i),
            ma20: at(&rolling_mean(&closes, 20), i),
            ma50: at(&rolling_mean(&closes, 50), i),
            ma200: at(&rolling_mean(&closes, 200), i),
            high252: at(&rolling_max(&closes, HIGH_LOW_WINDOW), i),
            low252: at(&rolling_min(&closes, HIGH_LOW_WINDOW), i),
            volume: last.volume,
            vol_ma50: at(&rolling_mean(&volumes, VOLUME_AVERAGE_WINDOW), i),
            close_lookback: lookback.and_then(|k| at(&lag(&closes, k), i)),
        })
    }

    fn above(value: Option<f64>, reference: Option<f64>) -> bool {
        matches!((value, reference), (Some(v), Some(r)) if v > r)
    }

    pub fn is_up(&self) -> bool {
        Self::above(self.close, self.prev_close)
    }

    pub fn is_down(&self) -> bool {
        Self::above(self.prev_close, self.close)
    }

    pub fn is_unchanged(&self) -> bool {
        matches!((self.close, self.prev_close), (Some(c), Some(p)) if c == p)
    }

    pub fn above_ma20(&self) -> bool {
        Self::above(self.close, self.ma20)
    }

    pub fn above_ma50(&self) -> bool {
        Self::above(self.close, self.ma50)
    }

    pub fn above_ma200(&self) -> bool {
        Self::above(self.close, self.ma200)
    }

    pub fn at_high252(&self) -> bool {
        matches!((self.close, self.high252), (Some(c), Some(h)) if c >= h)
    }

    pub fn at_low252(&self) -> bool {
        matches!((self.close, self.low252), (Some(c), Some(l)) if c <= l)
    }

    pub fn volume_surge(&self, multiple: f64) -> bool {
        matches!((self.volume, self.vol_ma50), (Some(v), Some(a)) if v as f64 >= a * multiple)
    }

    /// close / close `lookback` bars ago - 1.
    pub fn lookback_return(&self) -> Option<f64> {
        crate::domain::numeric::ratio_change(self.close, self.close_lookback)
    }
}
