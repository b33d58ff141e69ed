//! Session supervisor: owns one adapter per network and restarts both
//! together on failure.
//!
//! Either adapter reporting a fatal condition enqueues a kill request; the
//! session then disposes both connections exactly once. The bridge is
//! meaningless with only one side up, so both go down even when only one
//! failed. The owning loop in `main` constructs a fresh session afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;

use crate::adapters::{Adapter, AdapterEvent, EventStream};
use crate::config::RelayConfig;
use crate::error::Result;
use crate::message::{Direction, Network};
use crate::message_log::MessageLog;
use crate::paste::PasteService;
use crate::router::{self, RouteOutcome};
use crate::sanitize;

pub struct Session {
    config: Arc<RelayConfig>,
    discord: Arc<dyn Adapter>,
    irc: Arc<dyn Adapter>,
    paste: Arc<dyn PasteService>,
    transcript: MessageLog,
    alive: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        config: Arc<RelayConfig>,
        discord: Arc<dyn Adapter>,
        irc: Arc<dyn Adapter>,
        paste: Arc<dyn PasteService>,
        transcript: MessageLog,
    ) -> Self {
        Self {
            config,
            discord,
            irc,
            paste,
            transcript,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Connect both sides and relay until something fatal happens.
    /// Returns the failure reason once the session is dead; the caller
    /// discards this session and builds a new one.
    pub async fn run(&self) -> Result<String> {
        let discord_events = match self.discord.connect_and_join().await {
            Ok(events) => events,
            Err(e) => {
                self.kill().await;
                return Err(e.into());
            }
        };
        let irc_events = match self.irc.connect_and_join().await {
            Ok(events) => events,
            Err(e) => {
                self.kill().await;
                return Err(e.into());
            }
        };

        // Fatal events are enqueued here instead of tearing down inline:
        // an adapter's own error handler must never block on its own
        // disposal.
        let (kill_tx, mut kill_rx) = tokio::sync::mpsc::channel::<String>(2);

        let discord_to_irc = tokio::spawn(relay_loop(
            discord_events,
            Arc::clone(&self.discord),
            Arc::clone(&self.irc),
            Arc::clone(&self.config),
            Arc::clone(&self.paste),
            self.transcript.clone(),
            kill_tx.clone(),
        ));
        let irc_to_discord = tokio::spawn(relay_loop(
            irc_events,
            Arc::clone(&self.irc),
            Arc::clone(&self.discord),
            Arc::clone(&self.config),
            Arc::clone(&self.paste),
            self.transcript.clone(),
            kill_tx,
        ));

        let reason = kill_rx
            .recv()
            .await
            .unwrap_or_else(|| "both relay loops ended".to_string());

        self.kill().await;
        discord_to_irc.abort();
        irc_to_discord.abort();
        Ok(reason)
    }

    /// Dispose both adapters. Idempotent: the atomic alive flag is the only
    /// state shared between the two relay loops and this supervisor.
    pub async fn kill(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.discord.dispose().await;
            self.irc.dispose().await;
        }
    }
}

/// Drain one adapter's event stream, relaying each message to the other
/// side. Messages are handled synchronously, one at a time; there is no
/// queueing between receipt and relay.
async fn relay_loop(
    mut events: EventStream,
    origin: Arc<dyn Adapter>,
    dest: Arc<dyn Adapter>,
    config: Arc<RelayConfig>,
    paste: Arc<dyn PasteService>,
    transcript: MessageLog,
    kill_tx: tokio::sync::mpsc::Sender<String>,
) {
    while let Some(event) = events.next().await {
        match event {
            AdapterEvent::Message(msg) => {
                handle_inbound(msg, &*origin, &*dest, &config, &*paste, &transcript).await;
            }
            AdapterEvent::Fatal(reason) => {
                tracing::error!(adapter = origin.name(), %reason, "Fatal adapter event");
                let _ = kill_tx.send(format!("{}: {reason}", origin.name())).await;
                return;
            }
        }
    }
    let _ = kill_tx
        .send(format!("{}: event stream ended", origin.name()))
        .await;
}

async fn handle_inbound(
    msg: crate::message::InboundMessage,
    origin: &dyn Adapter,
    dest: &dyn Adapter,
    config: &RelayConfig,
    paste: &dyn PasteService,
    transcript: &MessageLog,
) {
    // Route first, upload after: a message that gets dropped or rejected
    // must never put its code payload on the paste service. A failed upload
    // just means the relay goes out without the paste link.
    let mut outcome = router::route(&msg, &origin.identity(), config, None);
    if msg.network == Network::Discord
        && matches!(outcome, RouteOutcome::Accept(_))
        && let (_, Some(payload)) = sanitize::extract_code_block(&msg.text)
        && !payload.is_empty()
        && let Some(url) = paste.upload(&payload).await
    {
        outcome = router::route(&msg, &origin.identity(), config, Some(&url));
    }

    match outcome {
        RouteOutcome::Drop(reason) => {
            tracing::debug!(sender = %msg.sender_name, ?reason, "Message dropped");
        }
        RouteOutcome::Reject(rejection) => {
            tracing::info!(
                sender = %msg.sender_name,
                reason = ?rejection.reason,
                "Message rejected"
            );
            if let Err(e) = origin.send(&msg.origin, "", &rejection.warning).await {
                tracing::warn!("Failed to deliver rejection warning: {e}");
            }
            if rejection.delete_original
                && let Err(e) = origin.delete(&msg).await
            {
                tracing::warn!("Failed to delete rejected message: {e}");
            }
            if rejection.resend_original {
                let resend = format!(
                    "To prevent you from having to re-type your message, \
                     here's what you tried to send: \n ```{}```",
                    msg.text
                );
                if let Err(e) = origin.direct_message(&msg, &resend).await {
                    tracing::warn!("Failed to resend original to sender: {e}");
                }
            }
        }
        RouteOutcome::Accept(units) => {
            let direction = Direction::from(msg.network);
            for unit in units {
                transcript.write(direction, &unit.sender, &unit.text);
                // A single failed send drops that unit only; the relay
                // carries on.
                if let Err(e) = dest.send(&unit.target, &unit.sender, &unit.text).await {
                    tracing::warn!(adapter = dest.name(), "Relay send failed: {e}");
                }
            }
        }
    }
}
