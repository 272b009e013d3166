//! Import of the flat-key JSON layout.
//!
//! ```json
//! {
//!   "TOKEN_DC": "...",
//!   "SOURCE_CHANNEL_ID_1": 1181234567890123456,
//!   "WEBHOOK_1": "https://discord.com/api/webhooks/...",
//!   "CALLER_NAME_1": "Mirror",
//!   "PFP_1": "https://cdn.example/avatar.png"
//! }
//! ```
//!
//! Groups are numbered from 1 and read until a group is entirely absent.
//! A partially present group is an error.
//!
//! `TOKEN_DC` must be a bot token. It is imported as-is and sent as
//! `Authorization: Bot <token>`, so a user-account token from older
//! deployments is rejected by the API with 401.

use {
    secrecy::Secret,
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::{
    Error, Result,
    schema::{FerryConfig, RouteConfig},
};

const TOKEN_KEY: &str = "TOKEN_DC";

/// Returns `true` when `value` looks like the flat-key layout.
pub fn is_flat_keys(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.contains_key(TOKEN_KEY))
}

/// Build a [`FerryConfig`] from a flat-key object. Settings not expressible
/// in that layout keep their defaults.
pub fn from_flat_keys(raw: &Map<String, Value>) -> Result<FerryConfig> {
    let token = raw
        .get(TOKEN_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid(format!("{TOKEN_KEY} missing from config")))?;

    let mut config = FerryConfig::default();
    config.source.token = Secret::new(token.to_string());

    for index in 1.. {
        let keys = [
            format!("SOURCE_CHANNEL_ID_{index}"),
            format!("WEBHOOK_{index}"),
            format!("CALLER_NAME_{index}"),
            format!("PFP_{index}"),
        ];
        let present: Vec<Option<&Value>> = keys.iter().map(|k| raw.get(k)).collect();

        if present.iter().all(Option::is_none) {
            break;
        }
        let [Some(channel), Some(webhook), Some(caller), Some(pfp)] = &present[..] else {
            return Err(Error::IncompleteRoute {
                key: keys.join(" / "),
            });
        };

        let channel_id = parse_channel(channel)
            .ok_or_else(|| Error::invalid(format!("{} is not a channel id", keys[0])))?;

        config.relay.routes.push(RouteConfig {
            channel_id,
            webhook_url: Secret::new(scalar_string(webhook)),
            display_name: scalar_string(caller).trim().to_string(),
            avatar_url: scalar_string(pfp).trim().to_string(),
        });
    }

    debug!(
        routes = config.relay.routes.len(),
        "imported flat-key configuration"
    );
    Ok(config)
}

fn parse_channel(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
