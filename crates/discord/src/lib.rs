//! Discord REST source for the relay.
//!
//! Polls channel history over the HTTP API with a bot token. No gateway
//! connection is opened; the relay drives every request.

pub mod source;
mod wire;

pub use source::DiscordSource;
