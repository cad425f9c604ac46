//! Configuration module for tidyhost.
//!
//! Manages formatter settings stored as JSON and shared across tasks.

mod settings;
mod store;

pub use settings::{parse_extensions, ConfigError, Settings, DEFAULT_EXTENSIONS, DEFAULT_RUNTIME};
pub use store::ConfigStore;
