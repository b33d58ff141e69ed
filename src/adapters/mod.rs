//! Protocol adapters: thin wrappers owning one network connection each.
//!
//! The core depends only on this contract, never on a protocol's wire
//! format. Each adapter translates its network's native events into
//! [`AdapterEvent`]s and exposes a uniform send surface.

pub mod discord;
pub mod irc;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::AdapterError;
use crate::message::{ChannelRef, InboundMessage};

pub use discord::DiscordAdapter;
pub use irc::IrcAdapter;

/// An event surfaced by an adapter's listen loop.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    Message(InboundMessage),
    /// Connection-level failure. The session kills both sides on this.
    Fatal(String),
}

/// Stream of inbound events from one adapter.
pub type EventStream = Pin<Box<dyn Stream<Item = AdapterEvent> + Send>>;

/// One side of the bridge.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// The bridge's own identity on this network (bot user ID, nick).
    /// Empty until the connection has established it.
    fn identity(&self) -> String;

    /// Connect, authenticate and join the configured channel, then return
    /// the inbound event stream. The underlying listen loop runs on its own
    /// task; the stream ends when the connection is gone.
    async fn connect_and_join(&self) -> Result<EventStream, AdapterError>;

    /// Send one line of text to a channel, attributed to `sender`. An empty
    /// `sender` sends the text bare (used for policy warnings).
    async fn send(&self, target: &ChannelRef, sender: &str, text: &str)
    -> Result<(), AdapterError>;

    /// Delete a previously received message. No-op where the protocol has
    /// no deletion; idempotent, never retried.
    async fn delete(&self, msg: &InboundMessage) -> Result<(), AdapterError>;

    /// Send a private message to the author of `msg`. No-op where the
    /// protocol has no private channel to the author.
    async fn direct_message(&self, msg: &InboundMessage, text: &str)
    -> Result<(), AdapterError>;

    /// Tear down the connection. Safe to call more than once.
    async fn dispose(&self);
}
