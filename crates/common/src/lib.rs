//! Shared error plumbing and small helpers used across all ferry crates.

pub mod error;
pub mod redact;

pub use {
    error::{Error, FromMessage, Result},
    redact::redact_url,
};
