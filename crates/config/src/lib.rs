//! Configuration loading, validation, env substitution, and legacy import.
//!
//! Config files: `ferry.toml`, `ferry.yaml`, `ferry.yml`, or `ferry.json`.
//! Searched in `./` then `~/.config/ferry/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in all
//! string values. A flat-key JSON file (`TOKEN_DC`, `SOURCE_CHANNEL_ID_1`,
//! ...) is recognised and imported as well.

pub mod env_subst;
pub mod error;
pub mod legacy;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, find_config_file, load_config, load_validated},
    schema::{
        DashboardConfig, FerryConfig, MetricsConfig, RelayConfig, RouteConfig, SourceConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
