use {async_trait::async_trait, bytes::Bytes};

use crate::{
    Result,
    message::{ChannelId, Message, MessageId, UserId},
};

/// Identity the relay is authenticated as on the source.
///
/// Resolved once at startup; messages authored by `user_id` are never
/// relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub user_id: UserId,
    pub username: String,
}

/// Read-side capability of a chat platform.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Short platform identifier used in logs (e.g. "discord").
    fn id(&self) -> &str;

    /// Resolve the authenticated identity.
    async fn identity(&self) -> Result<SourceIdentity>;

    /// The newest message in `channel`, if the channel has any.
    async fn fetch_latest(&self, channel: ChannelId) -> Result<Option<Message>>;

    /// Up to `limit` messages with id greater than `after`, oldest first.
    ///
    /// With `after == None` the oldest messages of the channel are returned.
    async fn fetch_since(
        &self,
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>>;

    /// Download the bytes behind an attachment URL.
    async fn fetch_attachment_bytes(&self, url: &str) -> Result<Bytes>;
}
