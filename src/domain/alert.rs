//! Rule-based alert evaluation.
//!
//! Each enabled rule is checked against its instrument's latest metrics. An
//! event is recorded at most once per (rule, bar date): the store's insert is
//! the only gate for advancing `last_triggered_date`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::MarketLensError;
use crate::domain::metrics::LatestMetrics;
use crate::domain::query::Cross;
use crate::ports::alert_port::AlertPort;
use crate::ports::data_port::DataPort;

pub const DEFAULT_MA_PERIOD: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKindTag {
    PriceBreakout,
    MaCross,
    VolumeSurge,
}

impl fmt::Display for AlertKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKindTag::PriceBreakout => "PRICE_BREAKOUT",
            AlertKindTag::MaCross => "MA_CROSS",
            AlertKindTag::VolumeSurge => "VOLUME_SURGE",
        };
        f.write_str(s)
    }
}

impl FromStr for AlertKindTag {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PRICE_BREAKOUT" | "PRICE" => Ok(AlertKindTag::PriceBreakout),
            "MA_CROSS" | "MA" => Ok(AlertKindTag::MaCross),
            "VOLUME_SURGE" | "VOLUME" => Ok(AlertKindTag::VolumeSurge),
            _ => Err(MarketLensError::invalid(
                "alert type must be one of: PRICE_BREAKOUT, MA_CROSS, VOLUME_SURGE",
            )),
        }
    }
}

/// Type-specific rule parameters. Any of them may be missing; an incomplete
/// rule never fires.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertRuleKind {
    PriceBreakout {
        level: Option<f64>,
        direction: Option<Cross>,
    },
    MaCross {
        period: Option<u32>,
        direction: Option<Cross>,
    },
    VolumeSurge {
        multiple: Option<f64>,
    },
}

impl AlertRuleKind {
    /// Build from the flat column layout used by stores.
    pub fn from_parts(
        tag: AlertKindTag,
        level: Option<f64>,
        period: Option<u32>,
        direction: Option<Cross>,
        multiple: Option<f64>,
    ) -> Self {
        match tag {
            AlertKindTag::PriceBreakout => AlertRuleKind::PriceBreakout { level, direction },
            AlertKindTag::MaCross => AlertRuleKind::MaCross { period, direction },
            AlertKindTag::VolumeSurge => AlertRuleKind::VolumeSurge { multiple },
        }
    }

    pub fn tag(&self) -> AlertKindTag {
        match self {
            AlertRuleKind::PriceBreakout { .. } => AlertKindTag::PriceBreakout,
            AlertRuleKind::MaCross { .. } => AlertKindTag::MaCross,
            AlertRuleKind::VolumeSurge { .. } => AlertKindTag::VolumeSurge,
        }
    }

    pub fn level(&self) -> Option<f64> {
        match self {
            AlertRuleKind::PriceBreakout { level, .. } => *level,
            _ => None,
        }
    }

    pub fn period(&self) -> Option<u32> {
        match self {
            AlertRuleKind::MaCross { period, .. } => *period,
            _ => None,
        }
    }

    pub fn direction(&self) -> Option<Cross> {
        match self {
            AlertRuleKind::PriceBreakout { direction, .. }
            | AlertRuleKind::MaCross { direction, .. } => *direction,
            AlertRuleKind::VolumeSurge { .. } => None,
        }
    }

    pub fn multiple(&self) -> Option<f64> {
        match self {
            AlertRuleKind::VolumeSurge { multiple } => *multiple,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    pub id: i64,
    pub owner: String,
    pub symbol: String,
    #[serde(flatten)]
    pub kind: AlertRuleKind,
    pub enabled: bool,
    pub last_triggered_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlertRule {
    pub owner: String,
    pub symbol: String,
    pub kind: AlertRuleKind,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlertEvent {
    pub rule_id: i64,
    pub bar_date: NaiveDate,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub id: i64,
    pub rule_id: i64,
    pub symbol: String,
    pub bar_date: NaiveDate,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertEvaluation {
    pub triggered_count: usize,
    pub latest_events: Vec<AlertEvent>,
}

/// Did `value` cross `level` between the previous and current bar?
fn crossed(
    direction: Cross,
    prev_value: f64,
    prev_level: f64,
    value: f64,
    level: f64,
) -> bool {
    match direction {
        Cross::Above => prev_value <= prev_level && value > level,
        Cross::Below => prev_value >= prev_level && value < level,
    }
}

fn fmt_num(v: f64) -> String {
    let s = format!("{v:.4}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Check one rule against metrics; returns the event message when it fires.
pub fn check_rule(rule: &AlertRule, m: &LatestMetrics) -> Option<String> {
    let detail = match &rule.kind {
        AlertRuleKind::PriceBreakout { level, direction } => {
            let (level, direction) = ((*level)?, (*direction)?);
            let (close, prev) = (m.close?, m.prev_close?);
            crossed(direction, prev, level, close, level).then(|| {
                format!(
                    "price crossed {} {} (close {})",
                    direction.to_string().to_lowercase(),
                    fmt_num(level),
                    fmt_num(close)
                )
            })?
        }
        AlertRuleKind::MaCross { period, direction } => {
            let direction = (*direction)?;
            let period = period
                .filter(|p| matches!(p, 20 | 50 | 200))
                .unwrap_or(DEFAULT_MA_PERIOD);
            let (ma, ma_prev) = m.moving_average(period)?;
            let (close, prev, ma, ma_prev) = (m.close?, m.prev_close?, ma?, ma_prev?);
            crossed(direction, prev, ma_prev, close, ma).then(|| {
                format!(
                    "close crossed {} MA{period} ({} vs {})",
                    direction.to_string().to_lowercase(),
                    fmt_num(close),
                    fmt_num(ma)
                )
            })?
        }
        AlertRuleKind::VolumeSurge { multiple } => {
            let multiple = (*multiple)?;
            let (volume, avg) = (m.volume?, m.vol_ma50?);
            (volume as f64 >= multiple * avg).then(|| {
                format!(
                    "volume {volume} >= {}x 50-day average ({})",
                    fmt_num(multiple),
                    fmt_num(avg)
                )
            })?
        }
    };
    Some(format!("{} {}", rule.symbol, detail))
}

/// Evaluate every enabled rule of `owner` once.
pub fn evaluate_alerts(
    data: &dyn DataPort,
    alerts: &dyn AlertPort,
    owner: &str,
    latest_limit: usize,
    now: DateTime<Utc>,
) -> Result<AlertEvaluation, MarketLensError> {
    let rules = alerts.enabled_rules(owner)?;
    let mut triggered_count = 0;

    for rule in &rules {
        let metrics = match data.latest_metrics(&rule.symbol) {
            Ok(Some(m)) => m,
            Ok(None) => {
                tracing::debug!(rule = rule.id, symbol = %rule.symbol, "no bar data");
                continue;
            }
            Err(e) => {
                tracing::warn!(rule = rule.id, symbol = %rule.symbol, error = %e, "metrics unavailable");
                continue;
            }
        };
        if rule.last_triggered_date == Some(metrics.bar_date) {
            continue;
        }
        let Some(message) = check_rule(rule, &metrics) else {
            continue;
        };

        let event = NewAlertEvent {
            rule_id: rule.id,
            bar_date: metrics.bar_date,
            message,
            created_at: now,
        };
        if alerts.insert_event(&event)? {
            alerts.mark_triggered(rule.id, metrics.bar_date)?;
            triggered_count += 1;
            tracing::info!(rule = rule.id, bar_date = %metrics.bar_date, "{}", event.message);
        }
    }

    Ok(AlertEvaluation {
        triggered_count,
        latest_events: alerts.latest_events(owner, latest_limit)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> LatestMetrics {
        LatestMetrics {
            bar_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            close: Some(105.0),
            prev_close: Some(99.0),
            ma20: Some(101.0),
            ma20_prev: Some(100.0),
            ma50: Some(102.0),
            ma50_prev: Some(101.5),
            ma200: Some(110.0),
            ma200_prev: Some(110.0),
            volume: Some(3_000),
            vol_ma50: Some(1_000.0),
        }
    }

    fn rule(kind: AlertRuleKind) -> AlertRule {
        AlertRule {
            id: 1,
            owner: "alice".to_string(),
            symbol: "AAPL".to_string(),
            kind,
            enabled: true,
            last_triggered_date: None,
        }
    }

    #[test]
    fn price_breakout_above_level() {
        let r = rule(AlertRuleKind::PriceBreakout {
            level: Some(100.0),
            direction: Some(Cross::Above),
        });
        let msg = check_rule(&r, &metrics()).unwrap();
        assert!(msg.starts_with("AAPL "));
        assert!(msg.contains("above 100"));
    }

    #[test]
    fn price_breakout_level_equal_to_close_does_not_fire() {
        let r = rule(AlertRuleKind::PriceBreakout {
            level: Some(105.0),
            direction: Some(Cross::Above),
        });
        assert!(check_rule(&r, &metrics()).is_none());
    }

    #[test]
    fn price_breakout_below() {
        let mut m = metrics();
        m.prev_close = Some(101.0);
        m.close = Some(97.0);
        let r = rule(AlertRuleKind::PriceBreakout {
            level: Some(100.0),
            direction: Some(Cross::Below),
        });
        assert!(check_rule(&r, &m).is_some());
    }

    #[test]
    fn ma_cross_uses_previous_average() {
        let r = rule(AlertRuleKind::MaCross {
            period: Some(20),
            direction: Some(Cross::Above),
        });
        assert!(check_rule(&r, &metrics()).unwrap().contains("MA20"));

        let r200 = rule(AlertRuleKind::MaCross {
            period: Some(200),
            direction: Some(Cross::Above),
        });
        assert!(check_rule(&r200, &metrics()).is_none());
    }

    #[test]
    fn ma_cross_unsupported_period_falls_back_to_50() {
        let r = rule(AlertRuleKind::MaCross {
            period: Some(13),
            direction: Some(Cross::Above),
        });
        assert!(check_rule(&r, &metrics()).unwrap().contains("MA50"));
    }

    #[test]
    fn volume_surge_threshold_inclusive() {
        let fires = rule(AlertRuleKind::VolumeSurge { multiple: Some(3.0) });
        let quiet = rule(AlertRuleKind::VolumeSurge { multiple: Some(3.5) });
        assert!(check_rule(&fires, &metrics()).is_some());
        assert!(check_rule(&quiet, &metrics()).is_none());
    }

    #[test]
    fn incomplete_rules_never_fire() {
        for kind in [
            AlertRuleKind::PriceBreakout { level: None, direction: Some(Cross::Above) },
            AlertRuleKind::PriceBreakout { level: Some(100.0), direction: None },
            AlertRuleKind::MaCross { period: Some(20), direction: None },
            AlertRuleKind::VolumeSurge { multiple: None },
        ] {
            assert!(check_rule(&rule(kind), &metrics()).is_none());
        }
    }

    #[test]
    fn missing_previous_close_does_not_fire() {
        let mut m = metrics();
        m.prev_close = None;
        let r = rule(AlertRuleKind::PriceBreakout {
            level: Some(100.0),
            direction: Some(Cross::Above),
        });
        assert!(check_rule(&r, &m).is_none());
    }

    #[test]
    fn kind_tags_round_trip_through_parts() {
        let kind = AlertRuleKind::from_parts(AlertKindTag::MaCross, Some(9.0), Some(200), Some(Cross::Below), None);
        assert_eq!(kind.tag(), AlertKindTag::MaCross);
        assert_eq!(kind.period(), Some(200));
        assert_eq!(kind.level(), None);
        assert_eq!("ma-cross".parse::<AlertKindTag>().unwrap(), AlertKindTag::MaCross);
        assert!("rsi".parse::<AlertKindTag>().is_err());
    }

    #[test]
    fn numbers_are_trimmed_in_messages() {
        assert_eq!(fmt_num(100.0), "100");
        assert_eq!(fmt_num(1.25), "1.25");
    }
}
