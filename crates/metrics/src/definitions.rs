//! Metric name and label definitions.
//!
//! Centralizing names keeps the relay, the dashboard and any scrape config in
//! agreement about what exists.

/// Poll loop metrics
pub mod relay {
    /// Completed poll cycles (one pass over every configured channel)
    pub const POLL_CYCLES_TOTAL: &str = "ferry_poll_cycles_total";
    /// Per-channel poll failures (fetch errors, unknown channels)
    pub const POLL_ERRORS_TOTAL: &str = "ferry_poll_errors_total";
    /// Messages fully processed and handed to every target
    pub const MESSAGES_RELAYED_TOTAL: &str = "ferry_messages_relayed_total";
    /// Messages skipped before dispatch (self-authored, empty)
    pub const MESSAGES_SKIPPED_TOTAL: &str = "ferry_messages_skipped_total";
    /// Channels primed to the newest message on first sight
    pub const CHANNELS_PRIMED_TOTAL: &str = "ferry_channels_primed_total";
    /// Cursor persistence failures
    pub const CURSOR_WRITE_ERRORS_TOTAL: &str = "ferry_cursor_write_errors_total";
}

/// Sink delivery metrics
pub mod dispatch {
    /// Dispatch attempts, labelled by encoding
    pub const DISPATCHES_TOTAL: &str = "ferry_dispatches_total";
    /// Dispatches that ended in failure after all attempts
    pub const FAILURES_TOTAL: &str = "ferry_dispatch_failures_total";
    /// Wall time of one dispatch including retries, in seconds
    pub const DURATION_SECONDS: &str = "ferry_dispatch_duration_seconds";
}

/// Attachment handling metrics
pub mod attachments {
    /// Attachments forwarded to sinks
    pub const FORWARDED_TOTAL: &str = "ferry_attachments_forwarded_total";
    /// Attachments dropped, labelled by reason
    pub const DROPPED_TOTAL: &str = "ferry_attachments_dropped_total";
    /// Size of forwarded attachments in bytes
    pub const SIZE_BYTES: &str = "ferry_attachment_size_bytes";
}

/// Dashboard collaborator metrics
pub mod dashboard {
    /// Event records accepted on the ingest endpoint
    pub const EVENTS_INGESTED_TOTAL: &str = "ferry_dashboard_events_ingested_total";
    /// Ingest requests rejected as malformed
    pub const EVENTS_REJECTED_TOTAL: &str = "ferry_dashboard_events_rejected_total";
    /// Currently connected live-stream subscribers
    pub const SUBSCRIBERS_ACTIVE: &str = "ferry_dashboard_subscribers_active";
}

/// Common label keys used across metrics
pub mod labels {
    pub const CHANNEL: &str = "channel";
    pub const TARGET: &str = "target";
    pub const ENCODING: &str = "encoding";
    pub const REASON: &str = "reason";
    pub const STATUS: &str = "status";
}

/// Standard histogram buckets for different metric types
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Dispatch duration buckets (in seconds)
    /// Covers 10ms to 60s
    pub static DISPATCH_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]
    });

    /// Attachment size buckets (in bytes)
    /// Covers 1KB to 100MB
    pub static ATTACHMENT_SIZE: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            1024.0,      // 1KB
            10240.0,     // 10KB
            102400.0,    // 100KB
            1048576.0,   // 1MB
            10485760.0,  // 10MB
            26214400.0,  // 25MB
            104857600.0, // 100MB
        ]
    });
}
