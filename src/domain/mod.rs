//! Domain layer modules
//!
//! This module contains business domain logic:
//! - `user`: User records and their service

pub mod user;
