//! Source message → sink payload.

use std::sync::Arc;

use {
    bytes::Bytes,
    ferry_channels::{Embed, Message, MessageSource, UserId},
    serde::Serialize,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use ferry_metrics::{attachments as attachment_metrics, counter, histogram, labels};

use crate::{attachment::eligible, mapping::SinkTarget};

/// Mention handling for outgoing posts. Always empty: relayed messages never
/// ping anyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
}

/// Index → filename entry describing one binary part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentManifest {
    pub id: usize,
    pub filename: String,
}

/// The structured part of a sink post.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebhookBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub allowed_mentions: AllowedMentions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentManifest>,
}

/// One attachment carried as a binary part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Position of the attachment in the source message.
    pub source_index: usize,
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A transformed message, encoding decided once here.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayPayload {
    /// Sent as a single JSON document.
    Plain(WebhookBody),
    /// Sent as multipart: `payload_json` plus one part per file.
    WithFiles(WebhookBody, Vec<FilePart>),
}

impl RelayPayload {
    fn new(content: &str, embeds: Vec<Embed>, files: Vec<FilePart>) -> Self {
        let mut body = WebhookBody {
            content: (!content.is_empty()).then(|| content.to_string()),
            embeds,
            ..WebhookBody::default()
        };
        if files.is_empty() {
            return Self::Plain(body);
        }
        body.attachments = files
            .iter()
            .enumerate()
            .map(|(id, f)| AttachmentManifest {
                id,
                filename: f.filename.clone(),
            })
            .collect();
        Self::WithFiles(body, files)
    }

    #[must_use]
    pub fn body(&self) -> &WebhookBody {
        match self {
            Self::Plain(body) | Self::WithFiles(body, _) => body,
        }
    }

    #[must_use]
    pub fn files(&self) -> &[FilePart] {
        match self {
            Self::Plain(_) => &[],
            Self::WithFiles(_, files) => files,
        }
    }

    /// Nothing left to post: no text, no embeds, no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let body = self.body();
        body.content.is_none() && body.embeds.is_empty() && self.files().is_empty()
    }

    #[must_use]
    pub fn encoding(&self) -> &'static str {
        match self {
            Self::Plain(_) => "json",
            Self::WithFiles(..) => "multipart",
        }
    }

    /// The body as posted to `target`, carrying its name and avatar.
    #[must_use]
    pub fn body_for(&self, target: &SinkTarget) -> WebhookBody {
        WebhookBody {
            username: Some(target.display_name.clone()),
            avatar_url: Some(target.avatar_url.clone()),
            ..self.body().clone()
        }
    }
}

/// Builds payloads from source messages, downloading eligible attachments.
#[derive(Clone)]
pub struct MessageTransformer {
    source: Arc<dyn MessageSource>,
    self_id: UserId,
}

impl MessageTransformer {
    pub fn new(source: Arc<dyn MessageSource>, self_id: UserId) -> Self {
        Self { source, self_id }
    }

    /// Whether `message` was posted by the relay's own account.
    #[must_use]
    pub fn is_own(&self, message: &Message) -> bool {
        message.author.id == self.self_id
    }

    /// Build the payload for `message`.
    ///
    /// Ineligible attachments are dropped. A failed download drops that
    /// attachment only.
    pub async fn transform(&self, message: &Message) -> RelayPayload {
        let mut files = Vec::new();
        for (index, attachment) in message.attachments.iter().enumerate() {
            if !eligible(attachment) {
                debug!(
                    message_id = %message.id,
                    filename = %attachment.filename,
                    content_type = ?attachment.content_type,
                    "skipping attachment, not a supported image"
                );
                #[cfg(feature = "metrics")]
                counter!(attachment_metrics::DROPPED_TOTAL, labels::REASON => "ineligible")
                    .increment(1);
                continue;
            }

            match self.source.fetch_attachment_bytes(&attachment.source_url).await {
                Ok(bytes) => {
                    #[cfg(feature = "metrics")]
                    {
                        counter!(attachment_metrics::FORWARDED_TOTAL).increment(1);
                        histogram!(attachment_metrics::SIZE_BYTES).record(bytes.len() as f64);
                    }
                    files.push(FilePart {
                        source_index: index,
                        filename: attachment.filename.clone(),
                        content_type: attachment.content_type.clone(),
                        bytes,
                    });
                },
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        filename = %attachment.filename,
                        error = %e,
                        "failed to download attachment, dropping it"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(attachment_metrics::DROPPED_TOTAL, labels::REASON => "fetch_failed")
                        .increment(1);
                },
            }
        }

        RelayPayload::new(&message.content, message.embeds.clone(), files)
    }
}
