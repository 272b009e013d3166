use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake_id!(
    /// Opaque numeric channel identifier.
    ChannelId
);
snowflake_id!(
    /// Source-assigned message id. Monotonically increasing within a channel.
    MessageId
);
snowflake_id!(
    /// Source-assigned user id.
    UserId
);

/// Message author as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
}

/// Attachment metadata. Bytes are fetched lazily from `source_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub source_url: String,
}

/// Structured embed document, passed through to sinks untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embed(pub serde_json::Value);

/// A fetched message. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: Author,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        let mut ids = vec![MessageId(9), MessageId(5), MessageId(7)];
        ids.sort();
        assert_eq!(ids, vec![MessageId(5), MessageId(7), MessageId(9)]);
    }

    #[test]
    fn ids_parse_from_snowflake_strings() {
        let id: ChannelId = " 1181234567890123456 ".parse().unwrap();
        assert_eq!(id.get(), 1_181_234_567_890_123_456);
        assert!("12ab".parse::<ChannelId>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&MessageId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn embeds_round_trip_untouched() {
        let raw = serde_json::json!({
            "title": "Patch notes",
            "fields": [{"name": "a", "value": "b", "inline": true}],
            "color": 5814783
        });
        let embed: Embed = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&embed).unwrap(), raw);
    }
}
