//! Universe analysis strategies.
//!
//! Each strategy is a pure function over the loaded universe, selected by tag
//! from a fixed table. Tags: TREND, WIN_RATE, VOLUME_SPIKE, MAX_DRAWDOWN,
//! ALPHA_BETA.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::domain::bar::Bar;
use crate::domain::error::MarketLensError;
use crate::domain::instrument::DEFAULT_INDEX;
use crate::domain::instrument_bars::{load_universe_bars, InstrumentBars};
use crate::domain::query::Resolution;
use crate::domain::universe::{resolve_universe, UniverseSpec};
use crate::ports::data_port::DataPort;

pub const MIN_BARS: usize = 10;
pub const VOLUME_BASELINE_DAYS: u64 = 30;
pub const DEFAULT_ANALYSIS_LIMIT: usize = 20;

pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub name: Option<String>,
    pub score: f64,
    pub details: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub results: Vec<AnalysisResult>,
}

/// Inputs shared by every strategy.
pub struct AnalysisInput<'a> {
    /// Daily bars from `start - 30 days` to `end`.
    pub members: &'a [InstrumentBars],
    /// Benchmark daily bars in `[start, end]`.
    pub benchmark: &'a [Bar],
    pub benchmark_symbol: &'a str,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub params: &'a Params,
}

impl AnalysisInput<'_> {
    fn in_range<'b>(&self, set: &'b InstrumentBars) -> Vec<&'b Bar> {
        set.bars
            .iter()
            .filter(|b| b.date >= self.start && b.date <= self.end && b.close.is_some())
            .collect()
    }
}

pub type StrategyFn = fn(&AnalysisInput<'_>) -> Vec<AnalysisResult>;

const STRATEGIES: &[(&str, StrategyFn)] = &[
    ("TREND", trend),
    ("WIN_RATE", win_rate),
    ("VOLUME_SPIKE", volume_spike),
    ("MAX_DRAWDOWN", max_drawdown),
    ("ALPHA_BETA", alpha_beta),
];

pub struct StrategyRegistry {
    strategies: HashMap<&'static str, StrategyFn>,
}

impl StrategyRegistry {
    pub fn standard() -> Self {
        Self {
            strategies: STRATEGIES.iter().copied().collect(),
        }
    }

    pub fn get(&self, tag: &str) -> Result<StrategyFn, MarketLensError> {
        let key = tag.trim().to_ascii_uppercase();
        self.strategies
            .get(key.as_str())
            .copied()
            .ok_or_else(|| MarketLensError::invalid(format!("unsupported analysis type: {tag}")))
    }

    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.strategies.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Ordinary least squares of `y` on `x`. Undefined for fewer than two points
/// or no spread in `x` or `y`.
pub fn regress(points: &[(f64, f64)]) -> Option<Regression> {
    let n = points.len() as f64;
    if points.len() < 2 {
        return None;
    }
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        sxx += (x - mean_x) * (x - mean_x);
        syy += (y - mean_y) * (y - mean_y);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some(Regression {
        slope,
        intercept: mean_y - slope * mean_x,
        r_squared: sxy * sxy / (sxx * syy),
    })
}

fn result(set: &InstrumentBars, score: f64, details: BTreeMap<String, Value>) -> Option<AnalysisResult> {
    score.is_finite().then(|| AnalysisResult {
        symbol: set.symbol().to_string(),
        name: set.name(),
        score,
        details,
    })
}

fn details<const N: usize>(pairs: [(&str, Value); N]) -> BTreeMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn trend(input: &AnalysisInput<'_>) -> Vec<AnalysisResult> {
    input
        .members
        .iter()
        .filter_map(|set| {
            let bars = input.in_range(set);
            if bars.len() < MIN_BARS {
                return None;
            }
            let points: Vec<(f64, f64)> = bars
                .iter()
                .enumerate()
                .filter_map(|(i, b)| Some((i as f64, b.close?)))
                .collect();
            let start_price = points.first()?.1;
            let reg = regress(&points)?;
            let normalized = reg.slope / start_price;
            result(
                set,
                normalized * reg.r_squared,
                details([
                    ("slope", json!(reg.slope)),
                    ("normalizedSlope", json!(normalized)),
                    ("rSquared", json!(reg.r_squared)),
                    ("totalDays", json!(bars.len())),
                ]),
            )
        })
        .collect()
}

fn win_rate(input: &AnalysisInput<'_>) -> Vec<AnalysisResult> {
    let threshold = input
        .params
        .get("threshold")
        .and_then(|t| t.parse::<f64>().ok())
        .unwrap_or(0.0);
    input
        .members
        .iter()
        .filter_map(|set| {
            let bars = input.in_range(set);
            if bars.len() < MIN_BARS {
                return None;
            }
            let up_days = bars
                .iter()
                .filter(|b| matches!((b.close, b.open), (Some(c), Some(o)) if c > o))
                .count();
            let rate = up_days as f64 / bars.len() as f64;
            if rate < threshold {
                return None;
            }
            result(
                set,
                rate,
                details([
                    ("winRate", json!(rate)),
                    ("upDays", json!(up_days)),
                    ("totalDays", json!(bars.len())),
                ]),
            )
        })
        .collect()
}

fn volume_spike(input: &AnalysisInput<'_>) -> Vec<AnalysisResult> {
    input
        .members
        .iter()
        .filter_map(|set| {
            let (baseline, target): (Vec<&Bar>, Vec<&Bar>) = set
                .bars
                .iter()
                .filter(|b| b.date <= input.end)
                .partition(|b| b.date < input.start);
            if target.is_empty() {
                return None;
            }
            let mean_volume = |bars: &[&Bar]| {
                bars.iter().map(|b| b.volume.unwrap_or(0) as f64).sum::<f64>() / bars.len() as f64
            };
            let avg = if baseline.is_empty() {
                mean_volume(&target)
            } else {
                mean_volume(&baseline)
            };
            if avg <= 0.0 {
                return None;
            }
            let max_volume = target.iter().map(|b| b.volume.unwrap_or(0)).max().unwrap_or(0) as f64;
            let spike = max_volume / avg;
            result(
                set,
                spike,
                details([
                    ("spikeMultiplier", json!(spike)),
                    ("avgBaselineVolume", json!(avg)),
                    ("maxVolume", json!(max_volume)),
                ]),
            )
        })
        .collect()
}

fn max_drawdown(input: &AnalysisInput<'_>) -> Vec<AnalysisResult> {
    input
        .members
        .iter()
        .filter_map(|set| {
            let bars = input.in_range(set);
            if bars.len() < 2 {
                return None;
            }
            let mut peak = f64::NEG_INFINITY;
            let mut worst = 0.0_f64;
            for close in bars.iter().filter_map(|b| b.close) {
                peak = peak.max(close);
                let dd = (close - peak) / peak;
                if dd < worst {
                    worst = dd;
                }
            }
            result(
                set,
                worst,
                details([
                    ("maxDrawdown", json!(worst)),
                    ("peak", json!(peak)),
                    ("totalDays", json!(bars.len())),
                ]),
            )
        })
        .collect()
}

/// Close-to-close returns keyed by date, skipping non-positive previous closes.
fn daily_returns<'b>(bars: impl IntoIterator<Item = &'b Bar>) -> BTreeMap<NaiveDate, f64> {
    let with_close: Vec<(NaiveDate, f64)> = bars
        .into_iter()
        .filter_map(|b| Some((b.date, b.close?)))
        .collect();
    with_close
        .windows(2)
        .filter(|w| w[0].1 > 0.0)
        .map(|w| (w[1].0, (w[1].1 - w[0].1) / w[0].1))
        .collect()
}

fn alpha_beta(input: &AnalysisInput<'_>) -> Vec<AnalysisResult> {
    if input.benchmark.len() < MIN_BARS {
        return Vec::new();
    }
    let bench = daily_returns(input.benchmark);
    input
        .members
        .iter()
        .filter_map(|set| {
            let bars = input.in_range(set);
            if bars.len() < MIN_BARS {
                return None;
            }
            let stock = daily_returns(bars.iter().copied());
            let points: Vec<(f64, f64)> = bench
                .iter()
                .filter_map(|(date, b)| stock.get(date).map(|s| (*b, *s)))
                .collect();
            if points.len() < MIN_BARS {
                return None;
            }
            let reg = regress(&points)?;
            result(
                set,
                reg.intercept,
                details([
                    ("alpha", json!(reg.intercept)),
                    ("beta", json!(reg.slope)),
                    ("rSquare", json!(reg.r_squared)),
                    ("benchmark", json!(input.benchmark_symbol)),
                ]),
            )
        })
        .collect()
}

fn sort_key(tag: &str, params: &Params, r: &AnalysisResult) -> f64 {
    if tag == "ALPHA_BETA" && params.get("sort_type").map(String::as_str) == Some("beta") {
        return r.details.get("beta").and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
    }
    r.score
}

/// Run a strategy over loaded data and order/truncate its results.
pub fn run_strategy(
    registry: &StrategyRegistry,
    tag: &str,
    input: &AnalysisInput<'_>,
    limit: usize,
) -> Result<Vec<AnalysisResult>, MarketLensError> {
    let strategy = registry.get(tag)?;
    let tag = tag.trim().to_ascii_uppercase();
    let mut results = strategy(input);

    let ascending = tag == "TREND" && input.params.get("trend_type").map(String::as_str) == Some("weak");
    results.sort_by(|a, b| {
        let (ka, kb) = (sort_key(&tag, input.params, a), sort_key(&tag, input.params, b));
        let primary = if ascending {
            ka.partial_cmp(&kb)
        } else {
            kb.partial_cmp(&ka)
        };
        primary
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    results.truncate(limit);
    Ok(results)
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub kind: String,
    pub universe: UniverseSpec,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub limit: Option<usize>,
    pub params: Params,
}

pub fn analyze(
    port: &dyn DataPort,
    registry: &StrategyRegistry,
    request: &AnalysisRequest,
) -> Result<AnalysisResponse, MarketLensError> {
    registry.get(&request.kind)?;
    if request.start > request.end {
        return Err(MarketLensError::InvalidDateRange {
            start: request.start,
            end: request.end,
        });
    }

    let universe = resolve_universe(port, &request.universe, request.end)?;
    let fetch_start = request
        .start
        .checked_sub_days(Days::new(VOLUME_BASELINE_DAYS))
        .unwrap_or(NaiveDate::MIN);
    let members = load_universe_bars(port, &universe, fetch_start, request.end, Resolution::Daily);

    let benchmark_symbol = match &request.universe {
        UniverseSpec::AllStocks => DEFAULT_INDEX.to_string(),
        UniverseSpec::Index(index) => index.clone(),
    };
    let benchmark = port.fetch_bars(&benchmark_symbol, request.start, request.end)?;

    let input = AnalysisInput {
        members: &members,
        benchmark: &benchmark,
        benchmark_symbol: &benchmark_symbol,
        start: request.start,
        end: request.end,
        params: &request.params,
    };
    let results = run_strategy(
        registry,
        &request.kind,
        &input,
        request.limit.unwrap_or(DEFAULT_ANALYSIS_LIMIT),
    )?;
    tracing::info!(kind = %request.kind, universe = %request.universe, results = results.len(), "analysis");
    Ok(AnalysisResponse {
        kind: request.kind.trim().to_ascii_uppercase(),
        results,
    })
}
