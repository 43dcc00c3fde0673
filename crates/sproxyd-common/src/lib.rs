//! Sproxyd Common - Shared types and utilities
//!
//! This crate provides the storage policy types, the error type and the
//! object server configuration shared by every other crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use types::*;
