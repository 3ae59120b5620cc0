//! marketlens: market time-series analytics engine.
//!
//! Hexagonal architecture: bar resampling, indicators, cross-sectional scans
//! and alert evaluation live in [`domain`], the read/write contracts they
//! consume in [`ports`], and storage/config implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
