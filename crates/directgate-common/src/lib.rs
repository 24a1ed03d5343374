//! DirectGate Common - Shared types and utilities
//!
//! This crate provides common types, configuration, and utilities
//! shared across all DirectGate components.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::GatewayConfig;
pub use error::{Error, Result};
