//! Instruments and symbol canonicalization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::MarketLensError;

pub const DEFAULT_INDEX: &str = "^SPX";
const INDEX_MARKER: char = '^';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentKind {
    Stock,
    Index,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKind::Stock => write!(f, "STOCK"),
            InstrumentKind::Index => write!(f, "INDEX"),
        }
    }
}

impl FromStr for InstrumentKind {
    type Err = MarketLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOCK" => Ok(InstrumentKind::Stock),
            "INDEX" => Ok(InstrumentKind::Index),
            other => Err(MarketLensError::invalid(format!(
                "instrument kind must be STOCK or INDEX, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub name: Option<String>,
    pub kind: InstrumentKind,
}

impl Instrument {
    pub fn stock(symbol: &str, name: Option<&str>) -> Self {
        Self {
            symbol: canonical_symbol(symbol),
            name: name.map(str::to_string),
            kind: InstrumentKind::Stock,
        }
    }

    pub fn index(symbol: &str, name: Option<&str>) -> Self {
        Self {
            symbol: canonical_index(symbol),
            name: name.map(str::to_string),
            kind: InstrumentKind::Index,
        }
    }
}

/// Trimmed, upper-cased symbol.
pub fn canonical_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Index symbols carry a leading `^`; `SP500` is an alias of `^SPX`.
/// Blank input falls back to the default benchmark.
pub fn canonical_index(raw: &str) -> String {
    let s = canonical_symbol(raw);
    if s.is_empty() {
        return DEFAULT_INDEX.to_string();
    }
    if s == "SP500" || s == "^SP500" {
        return DEFAULT_INDEX.to_string();
    }
    if s.starts_with(INDEX_MARKER) {
        s
    } else {
        format!("{INDEX_MARKER}{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_uppercased() {
        assert_eq!(canonical_symbol("  aapl "), "AAPL");
    }

    #[test]
    fn index_gets_marker() {
        assert_eq!(canonical_index("ndx"), "^NDX");
        assert_eq!(canonical_index("^spx"), "^SPX");
    }

    #[test]
    fn sp500_alias_and_blank_default() {
        assert_eq!(canonical_index("sp500"), "^SPX");
        assert_eq!(canonical_index(""), "^SPX");
    }

    #[test]
    fn kind_parses_case_insensitive() {
        assert_eq!("stock".parse::<InstrumentKind>().unwrap(), InstrumentKind::Stock);
        assert_eq!("INDEX".parse::<InstrumentKind>().unwrap(), InstrumentKind::Index);
        assert!("etf".parse::<InstrumentKind>().is_err());
    }

    #[test]
    fn constructors_canonicalize() {
        assert_eq!(Instrument::stock("msft", None).symbol, "MSFT");
        assert_eq!(Instrument::index("spx", Some("S&P 500")).symbol, "^SPX");
    }
}
