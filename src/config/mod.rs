//! Configuration loading and management.

mod loader;

pub use loader::{
    Config, ConfigError, MIN_REFRESH_MS, Settings, example_config, generate_config,
};
