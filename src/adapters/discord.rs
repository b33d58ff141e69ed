//! Discord adapter: gateway WebSocket for inbound events, REST for sends.
//!
//! Owns one gateway connection. Keeps just enough guild state to do its
//! job: the bot's own user ID, the target channel ID, and a channel
//! ID→name map for routing and channel-mention sanitization.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, stream};
use secrecy::ExposeSecret;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::adapters::{Adapter, AdapterEvent, EventStream};
use crate::config::RelayConfig;
use crate::error::AdapterError;
use crate::message::{
    ChannelRef, InboundMessage, MentionedChannel, MentionedUser, Network, Privilege,
};
use crate::sanitize;

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const API_BASE: &str = "https://discord.com/api/v10";

/// GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT.
const INTENTS: u64 = 1 | (1 << 9) | (1 << 15);

/// Guild state resolved from gateway dispatches.
#[derive(Default)]
struct GatewayState {
    bot_user_id: String,
    /// Resolved ID of the configured relay channel.
    target_channel_id: String,
    /// Channel ID → name, for the configured guild.
    channel_names: HashMap<String, String>,
}

pub struct DiscordAdapter {
    config: Arc<RelayConfig>,
    http: reqwest::Client,
    state: Arc<RwLock<GatewayState>>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl DiscordAdapter {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            state: Arc::new(RwLock::new(GatewayState::default())),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.config.discord.bot_token.expose_secret())
    }

    async fn post_message(&self, channel_id: &str, content: &str) -> Result<(), AdapterError> {
        let resp = self
            .http
            .post(format!("{API_BASE}/channels/{channel_id}/messages"))
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(|e| AdapterError::SendFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::SendFailed {
                name: "discord".into(),
                reason: format!("createMessage failed ({status}): {body}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for DiscordAdapter {
    fn name(&self) -> &str {
        "discord"
    }

    fn identity(&self) -> String {
        self.state
            .read()
            .map(|s| s.bot_user_id.clone())
            .unwrap_or_default()
    }

    async fn connect_and_join(&self) -> Result<EventStream, AdapterError> {
        let (ws, _) = connect_async(GATEWAY_URL)
            .await
            .map_err(|e| AdapterError::ConnectFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let token = self.config.discord.bot_token.expose_secret().to_string();
        let guild_name = self.config.discord.guild_name.clone();
        let channel_name = self.config.discord.channel_name.clone();
        let state = Arc::clone(&self.state);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let reason =
                gateway_loop(ws, &token, &guild_name, &channel_name, state, shutdown, &tx).await;
            if let Some(reason) = reason {
                let _ = tx.send(AdapterEvent::Fatal(reason));
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn send(
        &self,
        target: &ChannelRef,
        sender: &str,
        text: &str,
    ) -> Result<(), AdapterError> {
        let channel_id = self
            .state
            .read()
            .map(|s| resolve_channel(&s, target))
            .unwrap_or_default();
        if channel_id.is_empty() {
            return Err(AdapterError::SendFailed {
                name: "discord".into(),
                reason: "relay channel not resolved yet".into(),
            });
        }

        let content = if sender.is_empty() {
            text.to_string()
        } else {
            format!("**<{sender}>** {text}")
        };
        self.post_message(&channel_id, &content).await
    }

    async fn delete(&self, msg: &InboundMessage) -> Result<(), AdapterError> {
        if msg.origin_id.is_empty() || msg.message_id.is_empty() {
            return Ok(());
        }
        let resp = self
            .http
            .delete(format!(
                "{API_BASE}/channels/{}/messages/{}",
                msg.origin_id, msg.message_id
            ))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AdapterError::Http(e.to_string()))?;

        // 404 means someone beat us to it; deletion is idempotent.
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(status = %resp.status(), "Discord message deletion failed");
        }
        Ok(())
    }

    async fn direct_message(&self, msg: &InboundMessage, text: &str) -> Result<(), AdapterError> {
        let resp = self
            .http
            .post(format!("{API_BASE}/users/@me/channels"))
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({ "recipient_id": msg.sender_id }))
            .send()
            .await
            .map_err(|e| AdapterError::Http(e.to_string()))?;

        let data: serde_json::Value = resp.json().await.map_err(|e| {
            AdapterError::InvalidMessage(format!("DM channel response: {e}"))
        })?;
        let dm_channel = data
            .get("id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| AdapterError::SendFailed {
                name: "discord".into(),
                reason: "could not open DM channel".into(),
            })?;

        self.post_message(dm_channel, text).await
    }

    async fn dispose(&self) {
        self.shutdown.notify_waiters();
    }
}

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Drive the gateway until shutdown or failure. Returns the fatal reason,
/// or `None` for an orderly shutdown.
async fn gateway_loop(
    mut ws: Ws,
    token: &str,
    guild_name: &str,
    channel_name: &str,
    state: Arc<RwLock<GatewayState>>,
    shutdown: Arc<tokio::sync::Notify>,
    tx: &tokio::sync::mpsc::UnboundedSender<AdapterEvent>,
) -> Option<String> {
    // HELLO carries the heartbeat interval; until then tick slowly.
    let mut heartbeat = tokio::time::interval(std::time::Duration::from_secs(41));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_seq: Option<u64> = None;
    let mut identified = false;

    let closed = shutdown.notified();
    tokio::pin!(closed);

    loop {
        tokio::select! {
            _ = &mut closed => {
                let _ = ws.send(WsMessage::Close(None)).await;
                return None;
            }
            _ = heartbeat.tick() => {
                let beat = serde_json::json!({ "op": 1, "d": last_seq });
                if let Err(e) = ws.send(WsMessage::Text(beat.to_string().into())).await {
                    return Some(format!("heartbeat send failed: {e}"));
                }
            }
            frame = ws.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(frame))) => {
                        return Some(format!("gateway closed: {frame:?}"));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Some(format!("gateway error: {e}")),
                    None => return Some("gateway stream ended".to_string()),
                };

                let payload: serde_json::Value = match serde_json::from_str(text.as_str()) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("Unparseable gateway frame: {e}");
                        continue;
                    }
                };
                if let Some(seq) = payload.get("s").and_then(serde_json::Value::as_u64) {
                    last_seq = Some(seq);
                }

                match payload.get("op").and_then(serde_json::Value::as_u64) {
                    // HELLO
                    Some(10) => {
                        let interval_ms = payload
                            .pointer("/d/heartbeat_interval")
                            .and_then(serde_json::Value::as_u64)
                            .unwrap_or(41_250);
                        heartbeat = tokio::time::interval(
                            std::time::Duration::from_millis(interval_ms),
                        );
                        heartbeat
                            .set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                        if !identified {
                            let identify = serde_json::json!({
                                "op": 2,
                                "d": {
                                    "token": token,
                                    "intents": INTENTS,
                                    "properties": {
                                        "os": std::env::consts::OS,
                                        "browser": "irc-relay",
                                        "device": "irc-relay",
                                    }
                                }
                            });
                            if let Err(e) =
                                ws.send(WsMessage::Text(identify.to_string().into())).await
                            {
                                return Some(format!("identify send failed: {e}"));
                            }
                            identified = true;
                        }
                    }
                    // Immediate heartbeat request
                    Some(1) => {
                        let beat = serde_json::json!({ "op": 1, "d": last_seq });
                        if let Err(e) = ws.send(WsMessage::Text(beat.to_string().into())).await {
                            return Some(format!("heartbeat send failed: {e}"));
                        }
                    }
                    // Heartbeat ack
                    Some(11) => {}
                    // Reconnect / invalid session: surface as fatal, the
                    // session restart handles it.
                    Some(7) => return Some("gateway requested reconnect".to_string()),
                    Some(9) => return Some("gateway session invalidated".to_string()),
                    // Dispatch
                    Some(0) => {
                        let event = payload.get("t").and_then(serde_json::Value::as_str);
                        let data = payload.get("d").cloned().unwrap_or_default();
                        handle_dispatch(event, &data, guild_name, channel_name, &state, tx);
                    }
                    _ => {}
                }
            }
        }
    }
}

/// ID of the channel named by `target`. Warnings go back to the exact
/// channel a message arrived on; unknown or empty names fall back to the
/// resolved relay channel.
fn resolve_channel(state: &GatewayState, target: &ChannelRef) -> String {
    if !target.0.is_empty()
        && let Some(id) = state
            .channel_names
            .iter()
            .find_map(|(id, name)| (name == &target.0).then(|| id.clone()))
    {
        return id;
    }
    state.target_channel_id.clone()
}

fn handle_dispatch(
    event: Option<&str>,
    data: &serde_json::Value,
    guild_name: &str,
    channel_name: &str,
    state: &Arc<RwLock<GatewayState>>,
    tx: &tokio::sync::mpsc::UnboundedSender<AdapterEvent>,
) {
    match event {
        Some("READY") => {
            let bot_id = data
                .pointer("/user/id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            if let Ok(mut s) = state.write() {
                s.bot_user_id = bot_id.to_string();
            }
            tracing::info!(bot_id, "Discord gateway ready");
        }
        Some("GUILD_CREATE") => {
            let name = data
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            if name != guild_name {
                return;
            }
            let Some(channels) = data.get("channels").and_then(serde_json::Value::as_array)
            else {
                return;
            };

            let mut names = HashMap::new();
            let mut target_id = String::new();
            for channel in channels {
                let (Some(id), Some(chan_name)) = (
                    channel.get("id").and_then(serde_json::Value::as_str),
                    channel.get("name").and_then(serde_json::Value::as_str),
                ) else {
                    continue;
                };
                names.insert(id.to_string(), chan_name.to_string());
                // Text channel matching the configured name.
                let is_text = channel.get("type").and_then(serde_json::Value::as_u64)
                    == Some(0);
                if is_text && target_id.is_empty() && chan_name.contains(channel_name) {
                    target_id = id.to_string();
                }
            }

            if target_id.is_empty() {
                tracing::warn!(guild = name, channel = channel_name, "Relay channel not found in guild");
            } else {
                tracing::info!(guild = name, channel_id = %target_id, "Relay channel resolved");
            }
            if let Ok(mut s) = state.write() {
                s.channel_names = names;
                s.target_channel_id = target_id;
            }
        }
        Some("MESSAGE_CREATE") => {
            if let Some(msg) = inbound_from_dispatch(data, state) {
                let _ = tx.send(AdapterEvent::Message(msg));
            }
        }
        _ => {}
    }
}

fn inbound_from_dispatch(
    data: &serde_json::Value,
    state: &Arc<RwLock<GatewayState>>,
) -> Option<InboundMessage> {
    let author = data.get("author")?;
    let sender_id = author.get("id").and_then(serde_json::Value::as_str)?;
    let sender_name = author
        .get("username")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown");
    let text = data
        .get("content")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let channel_id = data
        .get("channel_id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let message_id = data
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    let channel_name = state
        .read()
        .ok()
        .and_then(|s| s.channel_names.get(channel_id).cloned())
        .unwrap_or_default();

    let attachments = data
        .get("attachments")
        .and_then(serde_json::Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| a.get("url").and_then(serde_json::Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    // Mention array in delivery order; the positional pairing in the
    // sanitizer relies on it matching token order.
    let mentioned_users = data
        .get("mentions")
        .and_then(serde_json::Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|u| {
                    let id = u.get("id").and_then(serde_json::Value::as_str)?;
                    let name = u.get("username").and_then(serde_json::Value::as_str)?;
                    Some(MentionedUser {
                        id: id.to_string(),
                        display_name: name.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    // The gateway does not ship channel mentions with the message, so they
    // are resolved from the guild channel map, in token order. Unknown IDs
    // keep the ID as the display name so pairing stays aligned.
    let mentioned_channels = {
        let names = state.read().ok();
        sanitize::channel_mention_ids(text)
            .into_iter()
            .map(|id| {
                let name = names
                    .as_ref()
                    .and_then(|s| s.channel_names.get(&id).cloned())
                    .unwrap_or_else(|| id.clone());
                MentionedChannel { id, name }
            })
            .collect()
    };

    let timestamp = data
        .get("timestamp")
        .and_then(serde_json::Value::as_str)
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);

    Some(InboundMessage {
        network: Network::Discord,
        sender_name: sender_name.to_string(),
        sender_id: sender_id.to_string(),
        text: text.to_string(),
        attachments,
        mentioned_users,
        mentioned_channels,
        privilege: Privilege::None,
        origin: ChannelRef(channel_name),
        origin_id: channel_id.to_string(),
        message_id: message_id.to_string(),
        timestamp,
    })
}
