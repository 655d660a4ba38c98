//! journalship reads the systemd journal, batches entries per source and
//! uploads them to a Sumo Logic HTTP collector.

pub mod config;
pub mod forwarder;
pub mod signals;

pub use config::{Args, Config, ConfigError, PodSource};
pub use forwarder::{Forwarder, ForwarderError, ForwarderStats, StatsSnapshot};
