use {
    ferry_channels::ChannelId,
    ferry_common::redact_url,
    ferry_config::RouteConfig,
    secrecy::{ExposeSecret, Secret},
};

use crate::error::{Error, Result};

/// One delivery endpoint plus the identity messages are posted under.
#[derive(Clone)]
pub struct SinkTarget {
    pub endpoint_url: Secret<String>,
    pub display_name: String,
    pub avatar_url: String,
}

impl SinkTarget {
    pub fn new(
        endpoint_url: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url: Secret::new(endpoint_url.into()),
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
        }
    }

    /// Endpoint safe to log: the token segment and query are elided.
    #[must_use]
    pub fn redacted_endpoint(&self) -> String {
        redact_url(self.endpoint_url.expose_secret())
    }
}

impl std::fmt::Debug for SinkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkTarget")
            .field("endpoint_url", &self.redacted_endpoint())
            .field("display_name", &self.display_name)
            .field("avatar_url", &self.avatar_url)
            .finish()
    }
}

impl From<&RouteConfig> for SinkTarget {
    fn from(route: &RouteConfig) -> Self {
        Self {
            endpoint_url: route.webhook_url.clone(),
            display_name: route.display_name.trim().to_string(),
            avatar_url: route.avatar_url.trim().to_string(),
        }
    }
}

/// Channel → targets, fixed for the process lifetime.
///
/// Channels keep the order in which they first appear; targets keep the
/// order they were configured in. Never empty, and no channel is without a
/// target.
#[derive(Debug, Clone)]
pub struct RelayMapping {
    channels: Vec<(ChannelId, Vec<SinkTarget>)>,
}

impl RelayMapping {
    pub fn new(entries: impl IntoIterator<Item = (ChannelId, SinkTarget)>) -> Result<Self> {
        let mut channels: Vec<(ChannelId, Vec<SinkTarget>)> = Vec::new();
        for (channel, target) in entries {
            match channels.iter_mut().find(|(c, _)| *c == channel) {
                Some((_, targets)) => targets.push(target),
                None => channels.push((channel, vec![target])),
            }
        }
        if channels.is_empty() {
            return Err(Error::config("relay mapping has no routes"));
        }
        Ok(Self { channels })
    }

    pub fn from_routes(routes: &[RouteConfig]) -> Result<Self> {
        Self::new(
            routes
                .iter()
                .map(|r| (ChannelId(r.channel_id), SinkTarget::from(r))),
        )
    }

    /// Channels in polling order.
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().map(|(c, _)| *c)
    }

    /// Targets for `channel`, empty if the channel is not mapped.
    #[must_use]
    pub fn targets(&self, channel: ChannelId) -> &[SinkTarget] {
        self.channels
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, t)| t.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &[SinkTarget])> {
        self.channels.iter().map(|(c, t)| (*c, t.as_slice()))
    }

    #[must_use]
    pub fn first_channel(&self) -> Option<ChannelId> {
        self.channels.first().map(|(c, _)| *c)
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn target_count(&self) -> usize {
        self.channels.iter().map(|(_, t)| t.len()).sum()
    }
}
