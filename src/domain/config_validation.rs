//! Configuration validation, run before any command touches data.

use crate::domain::error::MarketLensError;
use crate::domain::instrument::DEFAULT_INDEX;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_POOL_SIZE: i64 = 4;
pub const DEFAULT_LIMIT: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Sqlite,
    Csv,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> MarketLensError {
    MarketLensError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> MarketLensError {
    MarketLensError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// `[data] source`, defaulting to sqlite.
pub fn data_source(config: &dyn ConfigPort) -> Result<DataSource, MarketLensError> {
    match config
        .get_string("data", "source")
        .map(|s| s.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("sqlite") => Ok(DataSource::Sqlite),
        Some("csv") => Ok(DataSource::Csv),
        Some(other) => Err(invalid(
            "data",
            "source",
            format!("unknown data source '{other}', expected sqlite or csv"),
        )),
    }
}

/// `[analytics] default_index`, defaulting to `^SPX`.
pub fn default_index(config: &dyn ConfigPort) -> String {
    config
        .get_string("analytics", "default_index")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| DEFAULT_INDEX.to_string())
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), MarketLensError> {
    match data_source(config)? {
        DataSource::Sqlite => validate_sqlite(config)?,
        DataSource::Csv => validate_csv(config)?,
    }
    validate_analytics(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_sqlite(config: &dyn ConfigPort) -> Result<(), MarketLensError> {
    if config.get_string("sqlite", "path").is_none() {
        return Err(missing("sqlite", "path"));
    }
    if config.get_int("sqlite", "pool_size", DEFAULT_POOL_SIZE) < 1 {
        return Err(invalid("sqlite", "pool_size", "pool_size must be at least 1"));
    }
    Ok(())
}

fn validate_csv(config: &dyn ConfigPort) -> Result<(), MarketLensError> {
    match config.get_string("csv", "path") {
        Some(_) => Ok(()),
        None => Err(missing("csv", "path")),
    }
}

fn validate_analytics(config: &dyn ConfigPort) -> Result<(), MarketLensError> {
    let index = default_index(config);
    if !index.starts_with('^') || index.len() < 2 {
        return Err(invalid(
            "analytics",
            "default_index",
            "default_index must be an index symbol such as ^SPX",
        ));
    }
    let limit = config.get_int("analytics", "default_limit", DEFAULT_LIMIT);
    if !(5..=200).contains(&limit) {
        return Err(invalid(
            "analytics",
            "default_limit",
            "default_limit must be between 5 and 200",
        ));
    }
    Ok(())
}

fn validate_logging(config: &dyn ConfigPort) -> Result<(), MarketLensError> {
    match config.get_string("logging", "format").as_deref() {
        None | Some("text") | Some("json") => Ok(()),
        Some(_) => Err(invalid("logging", "format", "format must be text or json")),
    }
}
