/// Config schema types (source credentials, relay routes, dashboard, metrics).
use std::path::PathBuf;

use {
    secrecy::Secret,
    serde::{Deserialize, Deserializer, de},
};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
/// The source API caps a single history page at this many messages.
pub const MAX_BATCH_LIMIT: u32 = 100;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub source: SourceConfig,
    pub relay: RelayConfig,
    pub dashboard: DashboardConfig,
    pub metrics: MetricsConfig,
}

/// Credentials and transport settings for the source platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Bot token used for the `Authorization` header.
    pub token: Secret<String>,
    /// REST API base URL.
    pub api_base: String,
    /// Per-request timeout for history and attachment fetches.
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            api_base: DEFAULT_API_BASE.into(),
            request_timeout_secs: 30,
        }
    }
}

/// Polling, persistence, and delivery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Sleep between poll cycles.
    pub poll_interval_secs: u64,
    /// Maximum messages fetched per channel per cycle.
    pub batch_limit: u32,
    /// Cursor state file.
    pub state_path: PathBuf,
    /// Per-call timeout for webhook delivery.
    pub dispatch_timeout_secs: u64,
    /// Extra delivery attempts after a failed dispatch. `0` means each
    /// target is attempted exactly once per message.
    pub dispatch_retries: u32,
    /// Fixed delay between delivery attempts.
    pub retry_delay_ms: u64,
    /// Channel → webhook routes, in polling order.
    pub routes: Vec<RouteConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 120,
            batch_limit: MAX_BATCH_LIMIT,
            state_path: PathBuf::from("ferry-state.json"),
            dispatch_timeout_secs: 30,
            dispatch_retries: 0,
            retry_delay_ms: 1_000,
            routes: Vec::new(),
        }
    }
}

/// One source channel → sink target pairing.
///
/// Several routes may share a `channel_id`; each adds a target.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    #[serde(deserialize_with = "deserialize_snowflake")]
    pub channel_id: u64,
    pub webhook_url: Secret<String>,
    pub display_name: String,
    pub avatar_url: String,
}

/// Dashboard collaborator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Where the relay pushes event records. Unset disables pushing.
    pub ingest_url: Option<String>,
    /// Address the dashboard binds to.
    pub bind: String,
    pub port: u16,
    /// Events retained in memory per channel (and globally).
    pub history_capacity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            ingest_url: None,
            bind: "127.0.0.1".into(),
            port: 3000,
            history_capacity: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

/// Accept a snowflake either as a JSON/TOML integer or as a decimal string.
pub(crate) fn deserialize_snowflake<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Str(s) => s
            .trim()
            .parse()
            .map_err(|e| de::Error::custom(format!("invalid snowflake {s:?}: {e}"))),
    }
}
