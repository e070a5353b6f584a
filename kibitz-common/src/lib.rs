//! # Kibitz Common Library
//!
//! Shared code for Kibitz services including:
//! - Error types
//! - Configuration loading (CLI → ENV → TOML → defaults)
//! - Identity, ownership and request signing

pub mod api;
pub mod config;
pub mod error;

pub use api::identity::{Identity, Owner};
pub use error::{Error, Result};
