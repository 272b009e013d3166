//! Event records pushed to the dashboard after each processed message.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    ferry_channels::Message,
    reqwest::Client,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc::{self, error::TrySendError},
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

pub const MESSAGE_RELAY_EVENT: &str = "message_relay";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAuthor {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub forwarded: bool,
}

/// Outcome for one target. `error` is set when delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: String,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One processed message as seen by the dashboard.
///
/// Ids are strings so that browser clients keep full snowflake precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub channel_id: String,
    pub message_id: String,
    pub author: EventAuthor,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<EventAttachment>,
    pub embeds: usize,
    pub targets: Vec<TargetOutcome>,
}

impl RelayEvent {
    /// `forwarded` holds the positions in `message.attachments` that were
    /// re-uploaded.
    pub fn new(message: &Message, forwarded: &[usize], targets: Vec<TargetOutcome>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: MESSAGE_RELAY_EVENT.into(),
            channel_id: message.channel_id.to_string(),
            message_id: message.id.to_string(),
            author: EventAuthor {
                id: message.author.id.to_string(),
                username: message.author.username.clone(),
                display_name: message.author.display_name.clone(),
            },
            content: message.content.clone(),
            created_at: message.created_at,
            attachments: message
                .attachments
                .iter()
                .enumerate()
                .map(|(index, a)| EventAttachment {
                    filename: a.filename.clone(),
                    content_type: a.content_type.clone(),
                    size: a.size,
                    forwarded: forwarded.contains(&index),
                })
                .collect(),
            embeds: message.embeds.len(),
            targets,
        }
    }
}

/// Receives event records. Failures never affect relaying.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &RelayEvent) -> Result<()>;
}

/// POSTs events as JSON to the dashboard ingest endpoint.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    client: Client,
    ingest_url: String,
}

impl HttpEventSink {
    pub const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(ingest_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Self::TIMEOUT).build()?;
        Ok(Self {
            client,
            ingest_url: ingest_url.into(),
        })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn emit(&self, event: &RelayEvent) -> Result<()> {
        let response = self.client.post(&self.ingest_url).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(message_id = %event.message_id, "event pushed to dashboard");
        Ok(())
    }
}

/// Emit to `sink`, logging instead of failing.
async fn emit_logged(sink: &dyn EventSink, event: &RelayEvent) {
    if let Err(e) = sink.emit(event).await {
        warn!(
            channel_id = %event.channel_id,
            message_id = %event.message_id,
            error = %e,
            "failed to push event to dashboard"
        );
    }
}

/// Bounded queue in front of an [`EventSink`], drained by a spawned task.
///
/// [`EventForwarder::send`] never waits: when the queue is full the event is
/// dropped with a warning.
#[derive(Debug, Clone)]
pub struct EventForwarder {
    tx: mpsc::Sender<RelayEvent>,
}

impl EventForwarder {
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Start the draining task. It exits once every forwarder clone is
    /// dropped and the queue is empty. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(sink: Arc<dyn EventSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RelayEvent>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                emit_logged(sink.as_ref(), &event).await;
            }
            debug!("event forwarder stopped");
        });
        Self { tx }
    }

    /// Queue `event`; returns whether it was accepted.
    pub fn send(&self, event: RelayEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    channel_id = %event.channel_id,
                    message_id = %event.message_id,
                    "dashboard event queue full, dropping event"
                );
                false
            },
            Err(TrySendError::Closed(event)) => {
                warn!(
                    channel_id = %event.channel_id,
                    message_id = %event.message_id,
                    "dashboard event forwarder stopped, dropping event"
                );
                false
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        ferry_channels::{Attachment, Author, ChannelId, MessageId, UserId},
        std::sync::Mutex,
        tokio::sync::Notify,
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{method, path},
        },
    };

    fn message(attachments: &[&str]) -> Message {
        Message {
            id: MessageId(1_181_234_567_890_123_457),
            channel_id: ChannelId(42),
            author: Author {
                id: UserId(7),
                username: "alice".into(),
                display_name: Some("Alice".into()),
            },
            content: "hi".into(),
            attachments: attachments
                .iter()
                .map(|name| Attachment {
                    filename: (*name).into(),
                    content_type: None,
                    size: 10,
                    source_url: format!("https://cdn.example/{name}"),
                })
                .collect(),
            embeds: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn event() -> RelayEvent {
        RelayEvent::new(&message(&["a.png", "b.gif"]), &[0], vec![TargetOutcome {
            target: "Mirror".into(),
            delivered: true,
            error: None,
        }])
    }

    /// Records events; blocks every emit while `gate` is closed.
    #[derive(Default)]
    struct GatedSink {
        events: Mutex<Vec<RelayEvent>>,
        gate: Notify,
        closed: bool,
    }

    #[async_trait]
    impl EventSink for GatedSink {
        async fn emit(&self, event: &RelayEvent) -> Result<()> {
            if self.closed {
                self.gate.notified().await;
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn ids_are_strings() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["message_id"], "1181234567890123457");
        assert_eq!(json["channel_id"], "42");
        assert_eq!(json["event_type"], MESSAGE_RELAY_EVENT);
        assert_eq!(json["attachments"][0]["forwarded"], true);
        assert_eq!(json["attachments"][1]["forwarded"], false);
        assert!(json["targets"][0].get("error").is_none());
    }

    #[test]
    fn duplicate_filenames_are_flagged_by_position() {
        let message = message(&["image.png", "image.png"]);
        let flags = |forwarded: &[usize]| -> Vec<bool> {
            RelayEvent::new(&message, forwarded, Vec::new())
                .attachments
                .iter()
                .map(|a| a.forwarded)
                .collect()
        };
        assert_eq!(flags(&[1]), vec![false, true]);
        assert_eq!(flags(&[0]), vec![true, false]);
        assert_eq!(flags(&[0, 1]), vec![true, true]);
    }

    #[tokio::test]
    async fn forwarder_delivers_in_order() {
        let sink = Arc::new(GatedSink::default());
        let forwarder = EventForwarder::spawn(sink.clone(), 8);
        let mut first = event();
        first.message_id = "1".into();
        let mut second = event();
        second.message_id = "2".into();
        assert!(forwarder.send(first));
        assert!(forwarder.send(second));

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.events.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let ids: Vec<String> = sink
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message_id.clone())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_waiting() {
        let sink = Arc::new(GatedSink {
            closed: true,
            ..GatedSink::default()
        });
        let forwarder = EventForwarder::spawn(sink.clone(), 1);

        assert!(forwarder.send(event()));
        assert!(!forwarder.send(event()));
        assert!(!forwarder.send(event()));

        sink.gate.notify_one();
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.events.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn http_sink_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/discord-message"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpEventSink::new(format!("{}/discord-message", server.uri())).unwrap();
        sink.emit(&event()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["author"]["username"], "alice");
    }

    #[tokio::test]
    async fn http_sink_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let sink = HttpEventSink::new(server.uri()).unwrap();
        let err = sink.emit(&event()).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));
    }
}
