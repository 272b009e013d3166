//! The poll loop.
//!
//! Each channel moves through `unprimed → primed → polling`. Priming records
//! the newest existing message as the cursor without relaying it, so a fresh
//! deployment never replays channel history. Afterwards every cycle fetches
//! messages past the cursor, relays them oldest first, and advances the
//! cursor after each one.
//!
//! The cursor moves once every target has been attempted, whether or not the
//! attempts succeeded. A target that fails a message never sees it again:
//! delivery is at most once per target.

use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    ferry_channels::{ChannelId, Message, MessageSource, SourceIdentity},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use ferry_metrics::{counter, labels, relay as relay_metrics};

use crate::{
    cursor::CursorStore,
    dispatch::Dispatcher,
    error::Result,
    event::{EventForwarder, EventSink, RelayEvent, TargetOutcome},
    mapping::{RelayMapping, SinkTarget},
    transform::MessageTransformer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub batch_limit: u32,
}

impl PollSettings {
    #[must_use]
    pub fn from_config(config: &ferry_config::RelayConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            batch_limit: config.batch_limit,
        }
    }
}

/// What one pass over the channels did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub primed: usize,
    pub relayed: usize,
    pub skipped: usize,
    pub failed_dispatches: usize,
    pub failed_channels: usize,
}

pub struct PollScheduler {
    source: Arc<dyn MessageSource>,
    dispatcher: Arc<dyn Dispatcher>,
    transformer: MessageTransformer,
    mapping: RelayMapping,
    cursors: CursorStore,
    primed: HashSet<ChannelId>,
    legacy_checked: bool,
    events: Option<EventForwarder>,
    settings: PollSettings,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn MessageSource>,
        dispatcher: Arc<dyn Dispatcher>,
        identity: &SourceIdentity,
        mapping: RelayMapping,
        cursors: CursorStore,
        settings: PollSettings,
    ) -> Self {
        let transformer = MessageTransformer::new(Arc::clone(&source), identity.user_id);
        Self {
            source,
            dispatcher,
            transformer,
            mapping,
            cursors,
            primed: HashSet::new(),
            legacy_checked: false,
            events: None,
            settings,
        }
    }

    /// Push an event record to `sink` after each relayed message. Records
    /// go through an [`EventForwarder`], so a slow sink never holds up
    /// polling. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn with_event_sink(self, sink: Arc<dyn EventSink>) -> Self {
        self.with_event_forwarder(EventForwarder::spawn(sink, EventForwarder::DEFAULT_CAPACITY))
    }

    #[must_use]
    pub fn with_event_forwarder(mut self, forwarder: EventForwarder) -> Self {
        self.events = Some(forwarder);
        self
    }

    #[must_use]
    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    #[must_use]
    pub fn mapping(&self) -> &RelayMapping {
        &self.mapping
    }

    /// Poll until `cancel` fires. Cancellation interrupts whatever network
    /// call is in flight; the next run resumes from the last persisted cursor.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            source = self.source.id(),
            channels = self.mapping.channel_count(),
            targets = self.mapping.target_count(),
            interval_secs = self.settings.poll_interval.as_secs(),
            "relay started"
        );

        loop {
            let report = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                report = self.poll_cycle() => report,
            };

            if report.relayed > 0 || report.failed_channels > 0 || report.failed_dispatches > 0 {
                info!(
                    relayed = report.relayed,
                    skipped = report.skipped,
                    failed_dispatches = report.failed_dispatches,
                    failed_channels = report.failed_channels,
                    "poll cycle finished"
                );
            } else {
                debug!(primed = report.primed, "poll cycle finished, nothing new");
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.poll_interval) => {},
            }
        }

        info!("relay stopped");
    }

    /// One pass over every mapped channel, in mapping order.
    ///
    /// A channel that fails is logged and retried next cycle; the others are
    /// unaffected.
    pub async fn poll_cycle(&mut self) -> CycleReport {
        self.adopt_legacy_cursor().await;

        let mut report = CycleReport::default();
        let channels: Vec<ChannelId> = self.mapping.channels().collect();
        for channel in channels {
            if let Err(e) = self.poll_channel(channel, &mut report).await {
                report.failed_channels += 1;
                error!(channel_id = %channel, error = %e, "failed to poll channel");
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::POLL_ERRORS_TOTAL, labels::CHANNEL => channel.to_string())
                    .increment(1);
            }
        }

        #[cfg(feature = "metrics")]
        counter!(relay_metrics::POLL_CYCLES_TOTAL).increment(1);

        report
    }

    /// Hand a legacy single-channel cursor to the first mapped channel.
    async fn adopt_legacy_cursor(&mut self) {
        if std::mem::replace(&mut self.legacy_checked, true) {
            return;
        }
        let Some(first) = self.mapping.first_channel() else {
            return;
        };
        if let Err(e) = self.cursors.claim_legacy(first).await {
            warn!(channel_id = %first, error = %e, "failed to migrate legacy cursor");
        }
    }

    fn is_primed(&self, channel: ChannelId) -> bool {
        self.primed.contains(&channel) || self.cursors.get(channel).is_some()
    }

    /// Point the cursor at the newest existing message without relaying it.
    async fn prime(&mut self, channel: ChannelId) -> Result<()> {
        match self.source.fetch_latest(channel).await? {
            Some(latest) => {
                self.cursors.set(channel, latest.id).await?;
                info!(
                    channel_id = %channel,
                    message_id = %latest.id,
                    "primed channel at newest message"
                );
            },
            None => info!(channel_id = %channel, "primed empty channel"),
        }
        self.primed.insert(channel);
        #[cfg(feature = "metrics")]
        counter!(relay_metrics::CHANNELS_PRIMED_TOTAL).increment(1);
        Ok(())
    }

    async fn poll_channel(&mut self, channel: ChannelId, report: &mut CycleReport) -> Result<()> {
        if !self.is_primed(channel) {
            self.prime(channel).await?;
            report.primed += 1;
        }

        let after = self.cursors.get(channel);
        let mut batch = self
            .source
            .fetch_since(channel, after, self.settings.batch_limit)
            .await?;
        batch.retain(|m| after.is_none_or(|cursor| m.id > cursor));
        batch.sort_by_key(|m| m.id);
        batch.dedup_by_key(|m| m.id);

        if batch.is_empty() {
            debug!(channel_id = %channel, "no new messages");
            return Ok(());
        }

        let targets = self.mapping.targets(channel).to_vec();
        let count = batch.len();
        for message in &batch {
            self.process_message(message, &targets, report).await;
            if let Err(e) = self.cursors.set(channel, message.id).await {
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::CURSOR_WRITE_ERRORS_TOTAL).increment(1);
                return Err(e);
            }
        }

        info!(
            channel_id = %channel,
            messages = count,
            targets = targets.len(),
            "relayed new messages"
        );
        Ok(())
    }

    async fn process_message(
        &self,
        message: &Message,
        targets: &[SinkTarget],
        report: &mut CycleReport,
    ) {
        if self.transformer.is_own(message) {
            debug!(message_id = %message.id, "skipping own message");
            report.skipped += 1;
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::MESSAGES_SKIPPED_TOTAL, labels::REASON => "own").increment(1);
            return;
        }

        let payload = self.transformer.transform(message).await;
        if payload.is_empty() {
            debug!(message_id = %message.id, "nothing to relay after filtering");
            report.skipped += 1;
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::MESSAGES_SKIPPED_TOTAL, labels::REASON => "empty")
                .increment(1);
            return;
        }

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            match self.dispatcher.dispatch(target, &payload).await {
                Ok(()) => {
                    debug!(
                        channel_id = %message.channel_id,
                        message_id = %message.id,
                        target = %target.display_name,
                        encoding = payload.encoding(),
                        "delivered"
                    );
                    outcomes.push(TargetOutcome {
                        target: target.display_name.clone(),
                        delivered: true,
                        error: None,
                    });
                },
                Err(e) => {
                    report.failed_dispatches += 1;
                    warn!(
                        channel_id = %message.channel_id,
                        message_id = %message.id,
                        target = %target.display_name,
                        endpoint = %target.redacted_endpoint(),
                        error = %e,
                        "delivery failed"
                    );
                    outcomes.push(TargetOutcome {
                        target: target.display_name.clone(),
                        delivered: false,
                        error: Some(e.to_string()),
                    });
                },
            }
        }
        report.relayed += 1;

        #[cfg(feature = "metrics")]
        counter!(
            relay_metrics::MESSAGES_RELAYED_TOTAL,
            labels::CHANNEL => message.channel_id.to_string()
        )
        .increment(1);

        if let Some(events) = &self.events {
            let forwarded: Vec<usize> = payload.files().iter().map(|f| f.source_index).collect();
            events.send(RelayEvent::new(message, &forwarded, outcomes));
        }
    }
}
