//! Core domain types and analytics.

pub mod error;
pub mod bar;
pub mod instrument;
pub mod query;
pub mod numeric;
pub mod aggregate;
pub mod indicator;
pub mod universe;
pub mod instrument_bars;
pub mod metrics;
pub mod snapshot;
pub mod streak;
pub mod factor;
pub mod screener;
pub mod breadth;
pub mod relative_strength;
pub mod analysis;
pub mod alert;
pub mod config_validation;
