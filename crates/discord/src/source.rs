use std::time::Duration;

use {
    async_trait::async_trait,
    bytes::Bytes,
    reqwest::{Client, RequestBuilder, Response, StatusCode},
    secrecy::{ExposeSecret, Secret},
    serde::de::DeserializeOwned,
    tracing::debug,
};

use {
    ferry_channels::{
        ChannelId, Error, Message, MessageId, MessageSource, Result, SourceIdentity,
    },
    ferry_config::SourceConfig,
};

use crate::wire::{DiscordMessage, DiscordUser};

/// Polls Discord channel history with a bot token.
#[derive(Clone)]
pub struct DiscordSource {
    client: Client,
    token: Secret<String>,
    api_base: String,
}

impl std::fmt::Debug for DiscordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSource")
            .field("token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl DiscordSource {
    pub fn new(
        token: Secret<String>,
        api_base: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::external("building discord http client", e))?;
        Ok(Self {
            client,
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(
            config.token.clone(),
            config.api_base.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.api_base))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.token.expose_secret()),
            )
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        channel: Option<ChannelId>,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::external("discord request failed", e))?;
        let response = check_status(response, channel).await?;
        response
            .json()
            .await
            .map_err(|e| Error::external("decoding discord response", e))
    }

    async fn channel_messages(
        &self,
        channel: ChannelId,
        query: &[(&str, String)],
    ) -> Result<Vec<Message>> {
        let request = self
            .get(&format!("/channels/{channel}/messages"))
            .query(query);
        let raw: Vec<DiscordMessage> = self.send_json(request, Some(channel)).await?;
        raw.into_iter().map(Message::try_from).collect()
    }
}

async fn check_status(response: Response, channel: Option<ChannelId>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match (status, channel) {
        (StatusCode::UNAUTHORIZED, _) => Error::unauthorized(body),
        (StatusCode::NOT_FOUND, Some(channel)) => Error::unknown_channel(channel),
        _ => Error::status(status.as_u16(), body),
    })
}

#[async_trait]
impl MessageSource for DiscordSource {
    fn id(&self) -> &str {
        "discord"
    }

    async fn identity(&self) -> Result<SourceIdentity> {
        let user: DiscordUser = self.send_json(self.get("/users/@me"), None).await?;
        SourceIdentity::try_from(user)
    }

    async fn fetch_latest(&self, channel: ChannelId) -> Result<Option<Message>> {
        let mut messages = self
            .channel_messages(channel, &[("limit", "1".to_string())])
            .await?;
        Ok(messages.pop())
    }

    async fn fetch_since(
        &self,
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let after = after.map_or(0, MessageId::get);
        let mut messages = self
            .channel_messages(channel, &[
                ("after", after.to_string()),
                ("limit", limit.to_string()),
            ])
            .await?;
        // The API returns newest first.
        messages.sort_by_key(|m| m.id);
        debug!(%channel, after, count = messages.len(), "fetched channel history");
        Ok(messages)
    }

    async fn fetch_attachment_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::external("attachment download failed", e))?;
        let response = check_status(response, None).await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::external("reading attachment body", e))
    }
}
