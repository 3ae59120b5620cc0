//! Domain error types.

/// Top-level error type for marketlens.
///
/// Missing data is not an error anywhere in the engine: scans return empty
/// results instead. Only malformed requests and infrastructure failures land here.
#[derive(Debug, thiserror::Error)]
pub enum MarketLensError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("unknown symbol: {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MarketLensError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        MarketLensError::InvalidArgument {
            reason: reason.into(),
        }
    }
}

impl From<&MarketLensError> for std::process::ExitCode {
    fn from(err: &MarketLensError) -> Self {
        let code: u8 = match err {
            MarketLensError::Io(_) | MarketLensError::Serialization(_) => 1,
            MarketLensError::ConfigParse { .. }
            | MarketLensError::ConfigMissing { .. }
            | MarketLensError::ConfigInvalid { .. } => 2,
            MarketLensError::Database { .. } | MarketLensError::DatabaseQuery { .. } => 3,
            MarketLensError::InvalidArgument { .. }
            | MarketLensError::UnknownSymbol { .. }
            | MarketLensError::InvalidDateRange { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
