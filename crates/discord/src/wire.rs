//! Discord REST response shapes. Snowflakes arrive as decimal strings.

use {
    chrono::{DateTime, Utc},
    serde::Deserialize,
};

use ferry_channels::{Attachment, Author, Embed, Error, Message, Result, SourceIdentity};

#[derive(Debug, Deserialize)]
pub(crate) struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiscordAttachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<DiscordAttachment>,
    #[serde(default)]
    pub embeds: Vec<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<DiscordUser> for SourceIdentity {
    type Error = Error;

    fn try_from(user: DiscordUser) -> Result<Self> {
        Ok(Self {
            user_id: user.id.parse()?,
            username: user.username,
        })
    }
}

impl TryFrom<DiscordMessage> for Message {
    type Error = Error;

    fn try_from(raw: DiscordMessage) -> Result<Self> {
        Ok(Self {
            id: raw.id.parse()?,
            channel_id: raw.channel_id.parse()?,
            author: Author {
                id: raw.author.id.parse()?,
                username: raw.author.username,
                display_name: raw.author.global_name,
            },
            content: raw.content,
            attachments: raw
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    filename: a.filename,
                    content_type: a.content_type,
                    size: a.size,
                    source_url: a.url,
                })
                .collect(),
            embeds: raw.embeds.into_iter().map(Embed).collect(),
            created_at: raw.timestamp,
        })
    }
}
