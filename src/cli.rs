//! CLI definition and dispatch.
//!
//! Every command prints one JSON document to stdout. Diagnostics go to
//! stderr through `tracing`.

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::analysis::{analyze, AnalysisRequest, Params, StrategyRegistry};
use crate::domain::breadth::{breadth_detail, breadth_snapshot, BreadthCondition};
use crate::domain::config_validation::{
    data_source, default_index, validate_engine_config, DataSource, DEFAULT_LIMIT,
};
use crate::domain::error::MarketLensError;
use crate::domain::factor::{factor_ranking, FactorQuery};
use crate::domain::indicator::parse_include;
use crate::domain::indicator::series::{bar_series, indicator_series, IndicatorRequest};
use crate::domain::instrument::{canonical_index, canonical_symbol, InstrumentKind};
use crate::domain::query::{
    clamp_breadth_multiple, clamp_factor_lookback, clamp_flat_threshold_pct, clamp_limit,
    clamp_return_lookback, clamp_streak_volume_multiple, parse_ma_periods, resolve_window,
    DefaultSpan, Direction, Resolution,
};
use crate::domain::relative_strength::{rs_ranking, rs_series, RsRankQuery};
use crate::domain::screener::{run_screener, ScreenerQuery};
use crate::domain::streak::{streak_ranking, symbol_streak, StreakFilters, StreakQuery};
use crate::domain::universe::UniverseSpec;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "marketlens", about = "Market time-series analytics engine")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true, default_value = "marketlens.ini")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Optional request window.
#[derive(Args, Debug, Clone, Default)]
pub struct Window {
    /// First date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,
    /// Last date (YYYY-MM-DD), defaults to yesterday
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Daily bars, optionally resampled
    Bars {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "1d")]
        interval: String,
        #[command(flatten)]
        window: Window,
    },
    /// Moving averages, MACD and KDJ series
    Indicators(IndicatorArgs),
    /// Rank a universe by longest directional streak
    Streaks(StreakScanArgs),
    /// Longest directional streak for one symbol
    Streak {
        #[arg(long)]
        symbol: String,
        #[command(flatten)]
        opts: StreakOpts,
    },
    /// Rank a universe by drawdown, run-up or new-high/low counts
    Factors(FactorArgs),
    /// Breadth counts for a universe
    Breadth(BreadthArgs),
    /// Members behind one breadth count
    BreadthDetail {
        #[arg(long)]
        metric: String,
        #[command(flatten)]
        breadth: BreadthArgs,
    },
    /// Screener presets: trend, breakout
    Screener(ScreenerArgs),
    /// Relative strength of one symbol against an index
    Rs {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        index: Option<String>,
        #[command(flatten)]
        window: Window,
    },
    /// Rank a universe by relative strength
    RsRank(RsRankArgs),
    /// Run an analysis strategy: TREND, WIN_RATE, VOLUME_SPIKE, MAX_DRAWDOWN, ALPHA_BETA
    Analyze {
        #[arg(long = "type")]
        kind: String,
        #[arg(long, default_value = "ALL")]
        universe: String,
        #[arg(long)]
        limit: Option<i64>,
        /// Strategy parameter as key=value, repeatable
        #[arg(long = "param")]
        params: Vec<String>,
        #[command(flatten)]
        window: Window,
    },
    /// Alert rules and events
    Alerts {
        #[command(subcommand)]
        action: AlertAction,
    },
    /// Copy a CSV directory into the SQLite store
    Import {
        #[arg(long)]
        from: PathBuf,
    },
    /// Stored data range for a symbol
    Info {
        #[arg(long)]
        symbol: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct StreakOpts {
    #[arg(long, default_value = "1d")]
    pub interval: String,
    #[arg(long, default_value = "up")]
    pub direction: String,
    /// Count a bar only if its volume is at least this multiple of its 20-bar average
    #[arg(long)]
    pub volume_multiple: Option<f64>,
    /// Moves smaller than this percentage are flat
    #[arg(long)]
    pub flat_threshold: Option<f64>,
    #[command(flatten)]
    pub window: Window,
}

#[derive(Args, Debug, Clone)]
pub struct IndicatorArgs {
    #[arg(long)]
    pub symbol: String,
    #[arg(long, default_value = "1d")]
    pub interval: String,
    /// Comma-separated MA periods
    #[arg(long, default_value = "")]
    pub ma: String,
    /// Comma-separated extras: macd, kdj
    #[arg(long, default_value = "")]
    pub include: String,
    #[command(flatten)]
    pub window: Window,
}

impl IndicatorArgs {
    fn request(&self) -> Result<IndicatorRequest, MarketLensError> {
        let (start, end) = window(&self.window, DefaultSpan::TwoYears)?;
        Ok(IndicatorRequest {
            symbol: canonical_symbol(&self.symbol),
            resolution: self.interval.parse()?,
            start,
            end,
            ma_periods: parse_ma_periods(&self.ma)?,
            include: parse_include(&self.include)?,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct StreakScanArgs {
    #[arg(long, default_value = "ALL")]
    pub universe: String,
    #[command(flatten)]
    pub opts: StreakOpts,
    #[arg(long)]
    pub limit: Option<i64>,
}

impl StreakScanArgs {
    fn query(&self, config: &dyn ConfigPort) -> Result<StreakQuery, MarketLensError> {
        let (start, end) = window(&self.opts.window, DefaultSpan::OneYear)?;
        Ok(StreakQuery {
            universe: self.universe.parse()?,
            resolution: Resolution::parse_for_scan(&self.opts.interval)?,
            direction: self.opts.direction.parse()?,
            start,
            end,
            filters: streak_filters(&self.opts),
            limit: limit_or_default(self.limit, config),
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct FactorArgs {
    #[arg(long, default_value = "ALL")]
    pub universe: String,
    #[arg(long, default_value = "max_drawdown")]
    pub metric: String,
    #[arg(long, default_value = "worst")]
    pub mode: String,
    #[arg(long, default_value = "1d")]
    pub interval: String,
    #[arg(long)]
    pub lookback: Option<i64>,
    #[arg(long)]
    pub limit: Option<i64>,
    #[command(flatten)]
    pub window: Window,
}

impl FactorArgs {
    fn query(&self, config: &dyn ConfigPort) -> Result<FactorQuery, MarketLensError> {
        let (start, end) = window(&self.window, DefaultSpan::OneYear)?;
        let resolution = Resolution::parse_for_scan(&self.interval)?;
        Ok(FactorQuery {
            universe: self.universe.parse()?,
            resolution,
            metric: self.metric.parse()?,
            mode: self.mode.parse()?,
            start,
            end,
            lookback: clamp_factor_lookback(self.lookback, resolution),
            limit: limit_or_default(self.limit, config),
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct BreadthArgs {
    #[arg(long)]
    pub universe: Option<String>,
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
    #[arg(long)]
    pub volume_multiple: Option<f64>,
}

impl BreadthArgs {
    /// Universe, as-of date and clamped volume-surge multiple.
    fn resolve(&self, config: &dyn ConfigPort) -> Result<(UniverseSpec, NaiveDate, f64), MarketLensError> {
        Ok((
            index_universe(self.universe.as_deref(), config)?,
            self.as_of.unwrap_or_else(today),
            clamp_breadth_multiple(self.volume_multiple),
        ))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScreenerArgs {
    #[arg(long, default_value = "trend")]
    pub preset: String,
    #[arg(long)]
    pub universe: Option<String>,
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
    #[arg(long)]
    pub lookback: Option<i64>,
    #[arg(long)]
    pub limit: Option<i64>,
}

impl ScreenerArgs {
    fn query(&self, config: &dyn ConfigPort) -> Result<ScreenerQuery, MarketLensError> {
        Ok(ScreenerQuery {
            universe: index_universe(self.universe.as_deref(), config)?,
            preset: self.preset.parse()?,
            as_of: self.as_of.unwrap_or_else(today),
            lookback: clamp_return_lookback(self.lookback),
            limit: limit_or_default(self.limit, config),
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct RsRankArgs {
    #[arg(long)]
    pub universe: Option<String>,
    #[arg(long)]
    pub index: Option<String>,
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
    #[arg(long)]
    pub lookback: Option<i64>,
    /// Only members closing above their 50-day average
    #[arg(long)]
    pub above_ma50: bool,
    #[arg(long)]
    pub limit: Option<i64>,
}

impl RsRankArgs {
    fn query(&self, config: &dyn ConfigPort) -> Result<RsRankQuery, MarketLensError> {
        let index = self.index.clone().unwrap_or_else(|| default_index(config));
        Ok(RsRankQuery {
            universe: index_universe(self.universe.as_deref(), config)?,
            index: canonical_index(&index),
            as_of: self.as_of.unwrap_or_else(today),
            lookback: clamp_return_lookback(self.lookback),
            require_above_ma50: self.above_ma50,
            limit: limit_or_default(self.limit, config),
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum AlertAction {
    /// Evaluate every enabled rule once
    Evaluate {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Create a rule
    Add {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        symbol: String,
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        level: Option<f64>,
        #[arg(long)]
        period: Option<u32>,
        #[arg(long)]
        direction: Option<String>,
        #[arg(long)]
        multiple: Option<f64>,
        #[arg(long)]
        disabled: bool,
    },
    /// List rules of an owner
    List {
        #[arg(long)]
        owner: String,
    },
    /// Most recent events of an owner
    Events {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        limit: Option<i64>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, MarketLensError> {
    let config = FileConfigAdapter::from_file(path)?;
    validate_engine_config(&config)?;
    Ok(config)
}

/// Bar store selected by `[data] source`.
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, MarketLensError> {
    match data_source(config)? {
        DataSource::Csv => Ok(Box::new(CsvAdapter::from_config(config)?)),
        #[cfg(feature = "sqlite")]
        DataSource::Sqlite => Ok(Box::new(
            crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?,
        )),
        #[cfg(not(feature = "sqlite"))]
        DataSource::Sqlite => Err(MarketLensError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: "built without the sqlite feature".into(),
        }),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), MarketLensError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn window(w: &Window, span: DefaultSpan) -> Result<(NaiveDate, NaiveDate), MarketLensError> {
    resolve_window(w.start, w.end, today(), span)
}

fn limit_or_default(limit: Option<i64>, config: &dyn ConfigPort) -> usize {
    clamp_limit(limit.or(Some(config.get_int("analytics", "default_limit", DEFAULT_LIMIT))))
}

/// `--universe` when given, else the configured default index.
fn index_universe(raw: Option<&str>, config: &dyn ConfigPort) -> Result<UniverseSpec, MarketLensError> {
    match raw {
        Some(u) => u.parse(),
        None => Ok(UniverseSpec::Index(canonical_index(&default_index(config)))),
    }
}

fn parse_params(raw: &[String]) -> Result<Params, MarketLensError> {
    raw.iter()
        .map(|kv| {
            let (k, v) = kv
                .split_once('=')
                .ok_or_else(|| MarketLensError::invalid(format!("param '{kv}' is not key=value")))?;
            Ok((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn streak_filters(opts: &StreakOpts) -> StreakFilters {
    StreakFilters {
        volume_multiple: clamp_streak_volume_multiple(opts.volume_multiple),
        flat_threshold: clamp_flat_threshold_pct(opts.flat_threshold),
    }
}

#[derive(Debug, Serialize)]
struct DataInfo {
    symbol: String,
    name: Option<String>,
    kind: InstrumentKind,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    bars: usize,
}

#[cfg(feature = "sqlite")]
#[derive(Debug, Default, Serialize)]
struct ImportSummary {
    instruments: usize,
    bars: usize,
    snapshots: usize,
}

fn execute(cli: Cli) -> Result<(), MarketLensError> {
    let config = load_config(&cli.config)?;

    if let Command::Alerts { action } = &cli.command {
        return run_alerts(&config, action);
    }
    if let Command::Import { from } = &cli.command {
        return run_import(&config, from);
    }

    let port = open_data_port(&config)?;
    let port = port.as_ref();

    match cli.command {
        Command::Bars {
            symbol,
            interval,
            window: w,
        } => {
            let (start, end) = window(&w, DefaultSpan::TwoYears)?;
            let resolution: Resolution = interval.parse()?;
            print_json(&bar_series(port, &canonical_symbol(&symbol), resolution, start, end)?)
        }
        Command::Indicators(args) => print_json(&indicator_series(port, &args.request()?)?),
        Command::Streaks(args) => print_json(&streak_ranking(port, &args.query(&config)?)?),
        Command::Streak { symbol, opts } => {
            let (start, end) = window(&opts.window, DefaultSpan::TwoYears)?;
            let direction: Direction = opts.direction.parse()?;
            let item = symbol_streak(
                port,
                &canonical_symbol(&symbol),
                Resolution::parse_for_scan(&opts.interval)?,
                direction,
                start,
                end,
                streak_filters(&opts),
            )?;
            print_json(&item)
        }
        Command::Factors(args) => print_json(&factor_ranking(port, &args.query(&config)?)?),
        Command::Breadth(args) => {
            let (universe, as_of, multiple) = args.resolve(&config)?;
            print_json(&breadth_snapshot(port, &universe, as_of, multiple)?)
        }
        Command::BreadthDetail { metric, breadth } => {
            let condition: BreadthCondition = metric.parse()?;
            let (universe, as_of, multiple) = breadth.resolve(&config)?;
            print_json(&breadth_detail(port, &universe, condition, as_of, multiple)?)
        }
        Command::Screener(args) => print_json(&run_screener(port, &args.query(&config)?)?),
        Command::Rs {
            symbol,
            index,
            window: w,
        } => {
            let (start, end) = window(&w, DefaultSpan::TwoYears)?;
            let index = index.unwrap_or_else(|| default_index(&config));
            print_json(&rs_series(port, &canonical_symbol(&symbol), &index, start, end)?)
        }
        Command::RsRank(args) => print_json(&rs_ranking(port, &args.query(&config)?)?),
        Command::Analyze {
            kind,
            universe,
            limit,
            params,
            window: w,
        } => {
            let (start, end) = window(&w, DefaultSpan::OneYear)?;
            let request = AnalysisRequest {
                kind,
                universe: universe.parse()?,
                start,
                end,
                limit: Some(limit_or_default(limit, &config)),
                params: parse_params(&params)?,
            };
            print_json(&analyze(port, &StrategyRegistry::standard(), &request)?)
        }
        Command::Info { symbol } => {
            let symbol = canonical_symbol(&symbol);
            let instrument = port
                .find_instrument(&symbol)?
                .ok_or_else(|| MarketLensError::UnknownSymbol {
                    symbol: symbol.clone(),
                })?;
            let range = port.get_data_range(&symbol)?;
            print_json(&DataInfo {
                symbol,
                name: instrument.name,
                kind: instrument.kind,
                first_date: range.map(|r| r.0),
                last_date: range.map(|r| r.1),
                bars: range.map(|r| r.2).unwrap_or(0),
            })
        }
        Command::Alerts { .. } | Command::Import { .. } => Ok(()),
    }
}

#[cfg(feature = "sqlite")]
fn run_alerts(config: &dyn ConfigPort, action: &AlertAction) -> Result<(), MarketLensError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    use crate::domain::alert::{evaluate_alerts, AlertKindTag, AlertRuleKind, NewAlertRule};
    use crate::domain::query::{clamp_event_limit, Cross};
    use crate::ports::alert_port::AlertPort;
    use chrono::Utc;

    let store = SqliteAdapter::from_config(config)?;
    match action {
        AlertAction::Evaluate { owner, limit } => {
            let data = open_data_port(config)?;
            let result = evaluate_alerts(
                data.as_ref(),
                &store,
                owner,
                clamp_event_limit(*limit),
                Utc::now(),
            )?;
            print_json(&result)
        }
        AlertAction::Add {
            owner,
            symbol,
            kind,
            level,
            period,
            direction,
            multiple,
            disabled,
        } => {
            let tag: AlertKindTag = kind.parse()?;
            let direction = direction.as_deref().map(str::parse::<Cross>).transpose()?;
            let rule = NewAlertRule {
                owner: owner.clone(),
                symbol: canonical_symbol(symbol),
                kind: AlertRuleKind::from_parts(tag, *level, *period, direction, *multiple),
                enabled: !disabled,
            };
            let id = store.create_rule(&rule)?;
            tracing::info!(id, owner = %rule.owner, symbol = %rule.symbol, "alert rule created");
            print_json(&serde_json::json!({ "id": id }))
        }
        AlertAction::List { owner } => print_json(&store.list_rules(owner)?),
        AlertAction::Events { owner, limit } => {
            print_json(&store.latest_events(owner, clamp_event_limit(*limit))?)
        }
    }
}

#[cfg(not(feature = "sqlite"))]
fn run_alerts(_config: &dyn ConfigPort, _action: &AlertAction) -> Result<(), MarketLensError> {
    Err(MarketLensError::invalid("alerts require the sqlite feature"))
}

#[cfg(feature = "sqlite")]
fn run_import(config: &dyn ConfigPort, from: &Path) -> Result<(), MarketLensError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let source = CsvAdapter::open(from)?;
    let store = SqliteAdapter::from_config(config)?;
    let mut summary = ImportSummary::default();

    for instrument in source.instruments() {
        store.upsert_instrument(instrument)?;
        summary.instruments += 1;
        let bars = source.all_bars(&instrument.symbol)?;
        summary.bars += store.insert_bars(&instrument.symbol, &bars)?;
    }
    for snapshot in source.membership_snapshots() {
        store.replace_membership(&snapshot.index, snapshot.as_of, snapshot.members)?;
        summary.snapshots += 1;
    }
    tracing::info!(
        instruments = summary.instruments,
        bars = summary.bars,
        snapshots = summary.snapshots,
        "import complete"
    );
    print_json(&summary)
}

#[cfg(not(feature = "sqlite"))]
fn run_import(_config: &dyn ConfigPort, _from: &Path) -> Result<(), MarketLensError> {
    Err(MarketLensError::invalid("import requires the sqlite feature"))
}
