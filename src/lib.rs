//! Bidirectional Discord ↔ IRC relay.
//!
//! One configured Discord channel is bridged to one IRC channel. Inbound
//! messages are sanitized to plain text, filtered, split per policy and
//! sent out the other side; a supervised session restarts both connections
//! together whenever either fails.

pub mod adapters;
pub mod config;
pub mod error;
pub mod filter;
pub mod message;
pub mod message_log;
pub mod paste;
pub mod router;
pub mod sanitize;
pub mod session;
