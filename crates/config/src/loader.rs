use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    Error, Result,
    env_subst::substitute_env,
    legacy,
    schema::FerryConfig,
    validate::{Severity, validate},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["ferry.toml", "ferry.yaml", "ferry.yml", "ferry.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<FerryConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Locate, load, and validate the config.
///
/// `explicit` wins over discovery. Validation errors are fatal; warnings are
/// logged and the config is returned.
pub fn load_validated(explicit: Option<&Path>) -> Result<(PathBuf, FerryConfig)> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => find_config_file().ok_or_else(|| Error::NotFound {
            searched: searched_locations().join(", "),
        })?,
    };
    debug!(path = %path.display(), "loading config");

    let config = load_config(&path)?;
    let result = validate(&config);
    for diag in &result.diagnostics {
        match diag.severity {
            Severity::Error => {},
            Severity::Warning => warn!(path = %diag.path, "{}", diag.message),
            Severity::Info => debug!(path = %diag.path, "{}", diag.message),
        }
    }
    if result.has_errors() {
        let message = result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| format!("{}: {}", d.path, d.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::invalid(message));
    }
    Ok((path, config))
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./ferry.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/ferry/ferry.{toml,yaml,yml,json}` (user-global)
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/ferry/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ferry").map(|d| d.config_dir().to_path_buf())
}

fn searched_locations() -> Vec<String> {
    let mut out: Vec<String> = CONFIG_FILENAMES.iter().map(|n| format!("./{n}")).collect();
    if let Some(dir) = config_dir() {
        out.extend(
            CONFIG_FILENAMES
                .iter()
                .map(|n| dir.join(n).display().to_string()),
        );
    }
    out
}

fn parse_config(raw: &str, path: &Path) -> Result<FerryConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => {
            let value: serde_json::Value =
                serde_json::from_str(raw).map_err(|e| Error::parse(path, e))?;
            match value.as_object() {
                Some(obj) if legacy::is_flat_keys(&value) => legacy::from_flat_keys(obj),
                _ => serde_json::from_value(value).map_err(|e| Error::parse(path, e)),
            }
        },
        _ => Err(Error::UnsupportedFormat { ext: ext.into() }),
    }
}
