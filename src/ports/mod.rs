//! Port traits the domain consumes; adapters implement them.

pub mod config_port;
pub mod data_port;
pub mod alert_port;
