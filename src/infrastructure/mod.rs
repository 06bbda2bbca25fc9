//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `database`: Connection pool lifecycle, sessions and request scopes
//! - `error`: Unified HTTP error type
//! - `metrics`: Prometheus metrics helpers

pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
