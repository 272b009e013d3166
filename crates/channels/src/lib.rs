//! Source-side data model and the capability trait the relay polls.
//!
//! A source is anything that can list a channel's messages after a given id
//! and hand back attachment bytes. The relay never talks to a chat platform
//! directly; it only sees [`MessageSource`].

pub mod error;
pub mod message;
pub mod source;

pub use {
    error::{Error, Result},
    message::{Attachment, Author, ChannelId, Embed, Message, MessageId, UserId},
    source::{MessageSource, SourceIdentity},
};
