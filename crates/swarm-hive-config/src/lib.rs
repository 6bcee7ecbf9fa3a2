//! Configuration management for swarm-hive.
//!
//! Holds the run configuration ([`HiveConfig`]), the enumerated options it
//! is built from, and the setup-time errors raised when a configuration is
//! unusable.

pub mod config;
pub mod error;
pub mod options;

pub use config::{HiveConfig, ENV_PREFIX};
pub use error::ConfigError;
pub use options::{
    ConsensusMechanism, FailurePolicy, Methodology, RejectionPolicy, Strategy, Topology,
};
