//! Bounded in-memory event history.
//!
//! Every accepted event lands in a global ring buffer and in the ring buffer
//! of its channel. Both evict the oldest entry once `capacity` is reached.
//! New events are also broadcast to live subscribers.
//!
//! Channels first seen through events are registered up to
//! [`MAX_DISCOVERED_CHANNELS`]. Past that, events from further unknown
//! channels are kept in the global ring only.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, PoisonError, RwLock},
};

use {
    chrono::{SecondsFormat, Utc},
    serde::Serialize,
    serde_json::Value,
    tokio::sync::broadcast,
    tracing::debug,
};

use crate::error::{Error, Result};

/// Entries returned by a history query.
pub const HISTORY_PAGE: usize = 100;
/// Channel key for events that carry no `channel_id`.
pub const UNKNOWN_CHANNEL: &str = "unknown";

/// Upper bound on channels registered from ingested events.
pub const MAX_DISCOVERED_CHANNELS: usize = 256;

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub guild_name: String,
    pub key: String,
}

impl ChannelInfo {
    /// A channel taken from the relay routes.
    #[must_use]
    pub fn configured(id: u64, name: impl Into<String>, index: usize) -> Self {
        Self {
            id: id.to_string(),
            name: name.into(),
            guild_name: "Discord".into(),
            key: format!("ROUTE_{index}"),
        }
    }

    /// A channel first seen through an ingested event.
    fn discovered(id: &str, event: &serde_json::Map<String, Value>) -> Self {
        let text = |field: &str| event.get(field).and_then(Value::as_str).map(str::to_string);
        Self {
            id: id.to_string(),
            name: text("channel_name").unwrap_or_else(|| format!("Channel {id}")),
            guild_name: text("guild_name").unwrap_or_else(|| "Discord".into()),
            key: format!("CHANNEL_AUTO_{id}"),
        }
    }
}

/// Counts reported by `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub messages_count: usize,
    pub channels_monitored: usize,
    pub channels_with_messages: usize,
}

#[derive(Default)]
struct Inner {
    all: VecDeque<Value>,
    by_channel: HashMap<String, VecDeque<Value>>,
    channels: Vec<ChannelInfo>,
    discovered: usize,
}

impl Inner {
    /// Whether events for `info` get a ring of their own. Registers the
    /// channel if it is new and the discovery limit allows it.
    fn track(&mut self, info: ChannelInfo) -> bool {
        if self.channels.iter().any(|c| c.id == info.id) {
            return true;
        }
        if self.discovered >= MAX_DISCOVERED_CHANNELS {
            debug!(channel_id = %info.id, "discovered channel limit reached");
            return false;
        }
        debug!(channel_id = %info.id, "registered channel from event");
        self.discovered += 1;
        self.channels.push(info);
        true
    }
}

#[derive(Clone)]
pub struct EventHistory {
    inner: Arc<RwLock<Inner>>,
    capacity: usize,
    tx: broadcast::Sender<Value>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            capacity: capacity.max(1),
            tx,
        }
    }

    /// History sized by the dashboard settings, with every routed channel
    /// registered in route order.
    pub fn from_config(config: &ferry_config::FerryConfig) -> Self {
        let history = Self::new(config.dashboard.history_capacity);
        for (index, route) in config.relay.routes.iter().enumerate() {
            history.register(ChannelInfo::configured(
                route.channel_id,
                route.display_name.trim(),
                index + 1,
            ));
        }
        history
    }

    /// Register a channel up front. Already known ids are ignored.
    pub fn register(&self, channel: ChannelInfo) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.channels.iter().any(|c| c.id == channel.id) {
            inner.channels.push(channel);
        }
    }

    /// Record one event and return the timestamp it was stored with.
    ///
    /// Non-object events are rejected. A missing `timestamp` is filled in.
    pub fn ingest(&self, event: Value) -> Result<Value> {
        let Value::Object(mut fields) = event else {
            return Err(Error::invalid_event("expected a JSON object"));
        };

        let timestamp = fields
            .entry("timestamp")
            .or_insert_with(|| {
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
            })
            .clone();
        let channel = channel_key(&fields);
        let discovered =
            (channel != UNKNOWN_CHANNEL).then(|| ChannelInfo::discovered(&channel, &fields));
        let event = Value::Object(fields);

        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            push_bounded(&mut inner.all, event.clone(), self.capacity);
            let tracked = discovered.is_none_or(|info| inner.track(info));
            if tracked {
                let ring = inner.by_channel.entry(channel).or_default();
                push_bounded(ring, event.clone(), self.capacity);
            }
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
        Ok(timestamp)
    }

    /// The newest `limit` events across all channels, oldest first, plus the
    /// number retained.
    #[must_use]
    pub fn recent(&self, limit: usize) -> (Vec<Value>, usize) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        (tail(&inner.all, limit), inner.all.len())
    }

    #[must_use]
    pub fn channel_recent(&self, channel: &str, limit: usize) -> (Vec<Value>, usize) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_channel
            .get(channel)
            .map(|ring| (tail(ring, limit), ring.len()))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .channels
            .clone()
    }

    #[must_use]
    pub fn stats(&self) -> HistoryStats {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        HistoryStats {
            messages_count: inner.all.len(),
            channels_monitored: inner.channels.len(),
            channels_with_messages: inner.by_channel.values().filter(|r| !r.is_empty()).count(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.tx.subscribe()
    }
}

fn channel_key(fields: &serde_json::Map<String, Value>) -> String {
    match fields.get("channel_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN_CHANNEL.to_string(),
    }
}

fn push_bounded(ring: &mut VecDeque<Value>, event: Value, capacity: usize) {
    if ring.len() == capacity {
        ring.pop_front();
    }
    ring.push_back(event);
}

fn tail(ring: &VecDeque<Value>, limit: usize) -> Vec<Value> {
    ring.iter().skip(ring.len().saturating_sub(limit)).cloned().collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn evicts_oldest_per_channel_and_globally() {
        let history = EventHistory::new(3);
        for i in 0..5 {
            history
                .ingest(json!({"channel_id": "7", "n": i}))
                .unwrap();
        }
        let (events, total) = history.channel_recent("7", HISTORY_PAGE);
        assert_eq!(total, 3);
        let ns: Vec<i64> = events.iter().map(|e| e["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 4]);
        assert_eq!(history.recent(HISTORY_PAGE).1, 3);
    }

    #[test]
    fn recent_returns_newest_page() {
        let history = EventHistory::new(500);
        for i in 0..150 {
            history.ingest(json!({"channel_id": 1, "n": i})).unwrap();
        }
        let (events, total) = history.recent(HISTORY_PAGE);
        assert_eq!(total, 150);
        assert_eq!(events.len(), HISTORY_PAGE);
        assert_eq!(events[0]["n"], 50);
        assert_eq!(events[99]["n"], 149);
    }

    #[test]
    fn fills_timestamp_only_when_missing() {
        let history = EventHistory::new(10);
        let kept = history
            .ingest(json!({"timestamp": "2024-01-01T00:00:00Z"}))
            .unwrap();
        assert_eq!(kept, "2024-01-01T00:00:00Z");

        let filled = history.ingest(json!({"content": "x"})).unwrap();
        assert!(filled.as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn events_without_channel_go_to_unknown() {
        let history = EventHistory::new(10);
        history.ingest(json!({"content": "x"})).unwrap();
        assert_eq!(history.channel_recent(UNKNOWN_CHANNEL, 10).1, 1);
        assert!(history.channels().is_empty());
    }

    #[test]
    fn discovers_channels_once() {
        let history = EventHistory::new(10);
        history.register(ChannelInfo::configured(1, "Mirror", 1));
        history
            .ingest(json!({"channel_id": "1", "channel_name": "ignored"}))
            .unwrap();
        history
            .ingest(json!({"channel_id": "2", "channel_name": "general"}))
            .unwrap();
        history.ingest(json!({"channel_id": "2"})).unwrap();

        let channels = history.channels();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "Mirror");
        assert_eq!(channels[1].name, "general");
        assert_eq!(channels[1].key, "CHANNEL_AUTO_2");

        let stats = history.stats();
        assert_eq!(stats.messages_count, 3);
        assert_eq!(stats.channels_with_messages, 2);
    }

    #[test]
    fn discovery_stops_at_the_limit() {
        let history = EventHistory::new(10);
        history.register(ChannelInfo::configured(1, "Mirror", 1));
        for id in 0..MAX_DISCOVERED_CHANNELS + 5 {
            history
                .ingest(json!({"channel_id": format!("auto-{id}")}))
                .unwrap();
        }
        assert_eq!(history.channels().len(), MAX_DISCOVERED_CHANNELS + 1);
        assert_eq!(history.channel_recent("auto-0", 10).1, 1);

        let overflow = format!("auto-{MAX_DISCOVERED_CHANNELS}");
        assert_eq!(history.channel_recent(&overflow, 10).1, 0);
        assert_eq!(history.recent(HISTORY_PAGE).1, 10);

        // Registered channels keep their rings past the limit.
        history.ingest(json!({"channel_id": "1"})).unwrap();
        assert_eq!(history.channel_recent("1", 10).1, 1);
        assert_eq!(history.stats().channels_with_messages, MAX_DISCOVERED_CHANNELS + 1);
    }

    #[test]
    fn from_config_registers_routes_once() {
        let config: ferry_config::FerryConfig = toml::from_str(
            r#"
            [dashboard]
            history_capacity = 2

            [[relay.routes]]
            channel_id = 10
            webhook_url = "https://sink.example/api/webhooks/1/a"
            display_name = "Mirror A"
            avatar_url = "https://cdn.example/a.png"

            [[relay.routes]]
            channel_id = 10
            webhook_url = "https://sink.example/api/webhooks/1/b"
            display_name = "Mirror B"
            avatar_url = "https://cdn.example/b.png"
            "#,
        )
        .unwrap();
        let history = EventHistory::from_config(&config);
        assert_eq!(history.channels().len(), 1);
        assert_eq!(history.channels()[0].name, "Mirror A");

        for i in 0..3 {
            history.ingest(json!({"channel_id": "10", "n": i})).unwrap();
        }
        assert_eq!(history.channel_recent("10", HISTORY_PAGE).1, 2);
    }

    #[test]
    fn rejects_non_objects() {
        let history = EventHistory::new(10);
        let err = history.ingest(json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidEvent { .. }));
        assert_eq!(history.stats().messages_count, 0);
    }

    #[tokio::test]
    async fn subscribers_see_new_events() {
        let history = EventHistory::new(10);
        let mut rx = history.subscribe();
        history.ingest(json!({"channel_id": "5"})).unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event["channel_id"], "5");
    }
}
