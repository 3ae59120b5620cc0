//! Configuration access port trait.

/// Typed lookups into the engine's INI configuration.
///
/// Sections in use: `[data] source` (`sqlite` or `csv`), `[sqlite] path` and
/// `pool_size`, `[csv] path`, `[analytics] default_index` and
/// `default_limit`, `[logging] level` and `format`. A missing or malformed
/// value yields `None` or the supplied default; required keys are checked
/// once at startup by `validate_engine_config`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
