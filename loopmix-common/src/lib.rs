//! # loopmix Common Library
//!
//! Shared code for the loopmix crates:
//! - Error type and Result alias
//! - Event types (MixerEvent enum) and the EventBus
//! - TOML configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
