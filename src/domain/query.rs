//! Request vocabulary: resolution/direction/metric tokens, numeric clamps and
//! default date windows.
//!
//! Tokens are case-insensitive and accept the aliases users actually type.
//! A blank token means "use the default"; anything unrecognised is an
//! invalid-argument error, never a silent fallback.

use chrono::{Days, Months, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::MarketLensError;

fn normalize(token: &str) -> String {
    token.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Resolution {
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1w")]
    Weekly,
    #[serde(rename = "1m")]
    Monthly,
    #[serde(rename = "1q")]
    Quarterly,
    #[serde(rename = "1y")]
    Yearly,
}

impl Resolution {
    pub fn token(self) -> &'static str {
        match self {
            Resolution::Daily => "1d",
            Resolution::Weekly => "1w",
            Resolution::Monthly => "1m",
            Resolution::Quarterly => "1q",
            Resolution::Yearly => "1y",
        }
    }

    /// Parse a resolution accepted by cross-sectional scans (1d/1w/1m only).
    pub fn parse_for_scan(token: &str) -> Result<Self, MarketLensError> {
        match token.parse::<Resolution>() {
            Ok(r @ (Resolution::Daily | Resolution::Weekly | Resolution::Monthly)) => Ok(r),
            _ => Err(MarketLensError::invalid(
                "interval must be one of: 1d, 1w, 1m",
            )),
        }
    }

    /// Default factor lookback in bars for this resolution.
    pub fn default_factor_lookback(self) -> usize {
        match self {
            Resolution::Daily => 252,
            Resolution::Weekly => 52,
            Resolution::Monthly => 24,
            Resolution::Quarterly => 8,
            Resolution::Yearly => 2,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Resolution {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "" | "1d" | "d" | "day" | "daily" => Ok(Resolution::Daily),
            "1w" | "w" | "week" | "weekly" => Ok(Resolution::Weekly),
            "1m" | "m" | "month" | "monthly" => Ok(Resolution::Monthly),
            "1q" | "q" | "quarter" | "quarterly" => Ok(Resolution::Quarterly),
            "1y" | "y" | "year" | "yearly" => Ok(Resolution::Yearly),
            _ => Err(MarketLensError::invalid(
                "interval must be one of: 1d, 1w, 1m, 1q, 1y",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Sign of a classified bar that belongs to this direction.
    pub fn sign(self) -> i8 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

impl FromStr for Direction {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "" | "up" | "rise" | "rising" | "inc" | "increase" => Ok(Direction::Up),
            "down" | "fall" | "falling" | "dec" | "decrease" => Ok(Direction::Down),
            _ => Err(MarketLensError::invalid("direction must be one of: up, down")),
        }
    }
}

/// Side of a level crossing used by alert rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cross {
    Above,
    Below,
}

impl FromStr for Cross {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "above" | "up" => Ok(Cross::Above),
            "below" | "down" => Ok(Cross::Below),
            _ => Err(MarketLensError::invalid("cross direction must be ABOVE or BELOW")),
        }
    }
}

impl fmt::Display for Cross {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cross::Above => f.write_str("ABOVE"),
            Cross::Below => f.write_str("BELOW"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorMetric {
    MaxDrawdown,
    MaxRunup,
    MaxRundown,
    NewHighCount,
    NewLowCount,
}

impl FactorMetric {
    pub fn label(self) -> &'static str {
        match self {
            FactorMetric::MaxDrawdown => "max_drawdown",
            FactorMetric::MaxRunup => "max_runup",
            FactorMetric::MaxRundown => "max_rundown",
            FactorMetric::NewHighCount => "new_high_count",
            FactorMetric::NewLowCount => "new_low_count",
        }
    }
}

impl FromStr for FactorMetric {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "" | "max_drawdown" | "drawdown" | "mdd" => Ok(FactorMetric::MaxDrawdown),
            "max_runup" | "runup" | "up_swing" | "max_swing_up" => Ok(FactorMetric::MaxRunup),
            "max_rundown" | "rundown" | "down_swing" | "max_swing_down" => {
                Ok(FactorMetric::MaxRundown)
            }
            "new_high_count" | "new_high" | "high_count" => Ok(FactorMetric::NewHighCount),
            "new_low_count" | "new_low" | "low_count" => Ok(FactorMetric::NewLowCount),
            _ => Err(MarketLensError::invalid(
                "metric must be one of: max_drawdown, max_runup, max_rundown, new_high_count, new_low_count",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawdownMode {
    /// Deepest drawdown first.
    Worst,
    /// Shallowest drawdown first.
    Best,
}

impl FromStr for DrawdownMode {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "" | "worst" => Ok(DrawdownMode::Worst),
            "best" | "resilient" => Ok(DrawdownMode::Best),
            _ => Err(MarketLensError::invalid("mode must be one of: worst, best")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenerPreset {
    Trend,
    Breakout,
}

impl FromStr for ScreenerPreset {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "" | "trend" => Ok(ScreenerPreset::Trend),
            "breakout" => Ok(ScreenerPreset::Breakout),
            _ => Err(MarketLensError::invalid("preset must be one of: trend, breakout")),
        }
    }
}

/// Clamp an optional integer request parameter into `[min, max]`.
pub fn clamp_count(value: Option<i64>, default: usize, min: usize, max: usize) -> usize {
    match value {
        None => default,
        Some(v) if v < min as i64 => min,
        Some(v) if v > max as i64 => max,
        Some(v) => v as usize,
    }
}

pub fn clamp_limit(value: Option<i64>) -> usize {
    clamp_count(value, 20, 5, 200)
}

pub fn clamp_event_limit(value: Option<i64>) -> usize {
    clamp_count(value, 50, 1, 200)
}

pub fn clamp_factor_lookback(value: Option<i64>, resolution: Resolution) -> usize {
    clamp_count(value, resolution.default_factor_lookback(), 2, 2000)
}

/// Screener and relative-strength ranking lookback.
pub fn clamp_return_lookback(value: Option<i64>) -> usize {
    clamp_count(value, 126, 5, 252)
}

/// Streak volume filter multiple; `None` means the filter is off.
pub fn clamp_streak_volume_multiple(value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() && v > 1.0 => Some(v.min(20.0)),
        _ => None,
    }
}

/// Flat-change threshold given in percent, returned as a ratio; `None` means off.
pub fn clamp_flat_threshold_pct(value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Some(v.min(5.0) / 100.0),
        _ => None,
    }
}

pub fn clamp_breadth_multiple(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(1.0, 20.0),
        _ => 2.0,
    }
}

/// Default span used when the caller omits a start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultSpan {
    OneYear,
    TwoYears,
}

impl DefaultSpan {
    fn months(self) -> u32 {
        match self {
            DefaultSpan::OneYear => 12,
            DefaultSpan::TwoYears => 24,
        }
    }
}

/// Resolve an optional `[start, end]` request window against `today`.
///
/// End defaults to yesterday, start to `end - span`.
pub fn resolve_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
    span: DefaultSpan,
) -> Result<(NaiveDate, NaiveDate), MarketLensError> {
    let end = end.unwrap_or_else(|| today.checked_sub_days(Days::new(1)).unwrap_or(today));
    let start = start.unwrap_or_else(|| {
        end.checked_sub_months(Months::new(span.months()))
            .unwrap_or(end)
    });
    if start > end {
        return Err(MarketLensError::InvalidDateRange { start, end });
    }
    Ok((start, end))
}

pub const MAX_MA_PERIOD: usize = 1000;

/// Comma-separated MA periods, e.g. `"5,20,60"`. Blank means none. Each
/// period must lie in `1..=MAX_MA_PERIOD`.
pub fn parse_ma_periods(raw: &str) -> Result<Vec<usize>, MarketLensError> {
    let mut periods = Vec::new();
    for token in raw.split(',') {
        let t = token.trim();
        if t.is_empty() {
            continue;
        }
        let p: usize = t
            .parse()
            .map_err(|_| MarketLensError::invalid(format!("ma period '{t}' is not a number")))?;
        if !(1..=MAX_MA_PERIOD).contains(&p) {
            return Err(MarketLensError::invalid(format!(
                "ma period {p} is outside 1..={MAX_MA_PERIOD}"
            )));
        }
        if !periods.contains(&p) {
            periods.push(p);
        }
    }
    periods.sort_unstable();
    Ok(periods)
}
