//! Channel relay engine.
//!
//! Polls source channels, filters and re-encodes new messages, and fans each
//! one out to every webhook target mapped to its channel. Progress is kept
//! per channel in a [`CursorStore`] so restarts never replay history.

pub mod attachment;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod mapping;
pub mod scheduler;
pub mod transform;

pub use {
    cursor::{CursorStore, LEGACY_CHANNEL_KEY},
    dispatch::{Dispatcher, WebhookDispatcher},
    error::{Error, Result},
    event::{EventForwarder, EventSink, HttpEventSink, RelayEvent, TargetOutcome},
    mapping::{RelayMapping, SinkTarget},
    scheduler::{CycleReport, PollScheduler, PollSettings},
    transform::{MessageTransformer, RelayPayload},
};
