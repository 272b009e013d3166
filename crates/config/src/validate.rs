//! Semantic validation of a parsed configuration.
//!
//! Errors block startup. Warnings are logged and the relay runs anyway.

use std::collections::HashSet;

use {secrecy::ExposeSecret, url::Url};

use crate::schema::{FerryConfig, MAX_BATCH_LIMIT};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "required", "range", "url", "format", "duplicate", "security"
    pub category: &'static str,
    /// Dotted path, e.g. "relay.routes[2].webhook_url"
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate a parsed config.
#[must_use]
pub fn validate(config: &FerryConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    check_source(config, &mut result);
    check_relay(config, &mut result);
    check_routes(config, &mut result);
    check_dashboard(config, &mut result);
    result
}

fn check_source(config: &FerryConfig, result: &mut ValidationResult) {
    let token = config.source.token.expose_secret().trim();
    if token.is_empty() {
        result.push(
            Severity::Error,
            "required",
            "source.token",
            "source token is missing or blank",
        );
    } else if token.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("bot ")) {
        result.push(
            Severity::Warning,
            "format",
            "source.token",
            "token starts with \"Bot \"; the prefix is added when sending",
        );
    }
    if Url::parse(&config.source.api_base).is_err() {
        result.push(
            Severity::Error,
            "url",
            "source.api_base",
            format!("not a valid URL: {}", config.source.api_base),
        );
    }
    if config.source.request_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "range",
            "source.request_timeout_secs",
            "request timeout must be at least 1 second",
        );
    }
}

fn check_relay(config: &FerryConfig, result: &mut ValidationResult) {
    let relay = &config.relay;

    if relay.poll_interval_secs == 0 {
        result.push(
            Severity::Error,
            "range",
            "relay.poll_interval_secs",
            "poll interval must be at least 1 second",
        );
    } else if relay.poll_interval_secs < 10 {
        result.push(
            Severity::Warning,
            "range",
            "relay.poll_interval_secs",
            format!(
                "polling every {}s is likely to hit source rate limits",
                relay.poll_interval_secs
            ),
        );
    }

    if relay.batch_limit == 0 || relay.batch_limit > MAX_BATCH_LIMIT {
        result.push(
            Severity::Error,
            "range",
            "relay.batch_limit",
            format!(
                "batch limit must be between 1 and {MAX_BATCH_LIMIT}, got {}",
                relay.batch_limit
            ),
        );
    }

    if relay.dispatch_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "range",
            "relay.dispatch_timeout_secs",
            "dispatch timeout must be at least 1 second",
        );
    }

    if relay.dispatch_retries > 5 {
        result.push(
            Severity::Warning,
            "range",
            "relay.dispatch_retries",
            format!(
                "{} retries per target can stall a poll cycle",
                relay.dispatch_retries
            ),
        );
    }

    if relay.state_path.as_os_str().is_empty() {
        result.push(
            Severity::Error,
            "required",
            "relay.state_path",
            "state path is empty",
        );
    }
}

fn check_routes(config: &FerryConfig, result: &mut ValidationResult) {
    let routes = &config.relay.routes;
    if routes.is_empty() {
        result.push(
            Severity::Error,
            "required",
            "relay.routes",
            "at least one route is required",
        );
        return;
    }

    let mut seen: HashSet<(u64, &str)> = HashSet::new();
    for (i, route) in routes.iter().enumerate() {
        let base = format!("relay.routes[{i}]");
        let webhook = route.webhook_url.expose_secret().trim();

        if route.channel_id == 0 {
            result.push(
                Severity::Error,
                "required",
                format!("{base}.channel_id"),
                "channel id must be non-zero",
            );
        }

        if webhook.is_empty() {
            result.push(
                Severity::Error,
                "required",
                format!("{base}.webhook_url"),
                "webhook URL is blank",
            );
        } else {
            match Url::parse(webhook) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    if url.scheme() == "http" {
                        result.push(
                            Severity::Warning,
                            "security",
                            format!("{base}.webhook_url"),
                            "webhook URL uses plain http",
                        );
                    }
                },
                _ => result.push(
                    Severity::Error,
                    "url",
                    format!("{base}.webhook_url"),
                    "webhook URL is not a valid http(s) URL",
                ),
            }
            if !seen.insert((route.channel_id, webhook)) {
                result.push(
                    Severity::Warning,
                    "duplicate",
                    format!("{base}.webhook_url"),
                    format!(
                        "channel {} already routes to this webhook; messages will be sent twice",
                        route.channel_id
                    ),
                );
            }
        }

        if route.display_name.trim().is_empty() {
            result.push(
                Severity::Error,
                "required",
                format!("{base}.display_name"),
                "display name is blank",
            );
        }

        let avatar = route.avatar_url.trim();
        if avatar.is_empty() {
            result.push(
                Severity::Error,
                "required",
                format!("{base}.avatar_url"),
                "avatar URL is blank",
            );
        } else if !(avatar.starts_with("https://") || avatar.starts_with("http://")) {
            result.push(
                Severity::Warning,
                "url",
                format!("{base}.avatar_url"),
                "avatar URL is not an http(s) URL; the sink may ignore it",
            );
        }
    }
}

fn check_dashboard(config: &FerryConfig, result: &mut ValidationResult) {
    let dashboard = &config.dashboard;

    if let Some(ingest) = &dashboard.ingest_url
        && Url::parse(ingest).is_err()
    {
        result.push(
            Severity::Error,
            "url",
            "dashboard.ingest_url",
            format!("not a valid URL: {ingest}"),
        );
    }

    if dashboard.history_capacity == 0 {
        result.push(
            Severity::Error,
            "range",
            "dashboard.history_capacity",
            "history capacity must be at least 1",
        );
    }

    let is_localhost = matches!(dashboard.bind.as_str(), "127.0.0.1" | "localhost" | "::1");
    if !is_localhost {
        result.push(
            Severity::Info,
            "security",
            "dashboard.bind",
            format!(
                "dashboard ingest endpoint is unauthenticated and bound to {}",
                dashboard.bind
            ),
        );
    }
}
