//! IRC adapter: raw TCP line protocol over tokio.
//!
//! Registers, optionally authenticates to services, joins the configured
//! channel and answers PINGs. Channel membership modes are tracked from
//! NAMES replies and MODE changes so relayed messages carry the sender's
//! op/voice marker.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;

use crate::adapters::{Adapter, AdapterEvent, EventStream};
use crate::config::RelayConfig;
use crate::error::AdapterError;
use crate::message::{ChannelRef, InboundMessage, Network, Privilege};

/// Minimum spacing between outbound lines. Flood limits apply to the
/// connection as a whole, so warnings and notices are paced the same as
/// relayed lines.
const SEND_DELAY: Duration = Duration::from_millis(200);

/// Delay after the services auth message before joining, giving services
/// time to apply the login.
const AUTH_DELAY: Duration = Duration::from_secs(1);

struct Writer {
    half: OwnedWriteHalf,
    last_send: tokio::time::Instant,
}

pub struct IrcAdapter {
    config: Arc<RelayConfig>,
    writer: Arc<tokio::sync::Mutex<Option<Writer>>>,
    members: Arc<RwLock<HashMap<String, Privilege>>>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl IrcAdapter {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self {
            config,
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            members: Arc::new(RwLock::new(HashMap::new())),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Write one raw line, holding the writer lock across the pacing sleep
    /// so concurrent callers queue up behind it.
    async fn write_line(
        writer: &tokio::sync::Mutex<Option<Writer>>,
        line: &str,
    ) -> Result<(), AdapterError> {
        let mut guard = writer.lock().await;
        let Some(w) = guard.as_mut() else {
            return Err(AdapterError::SendFailed {
                name: "irc".into(),
                reason: "not connected".into(),
            });
        };
        let elapsed = w.last_send.elapsed();
        if elapsed < SEND_DELAY {
            tokio::time::sleep(SEND_DELAY - elapsed).await;
        }
        w.half
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|e| AdapterError::SendFailed {
                name: "irc".into(),
                reason: e.to_string(),
            })?;
        w.last_send = tokio::time::Instant::now();
        Ok(())
    }
}

#[async_trait]
impl Adapter for IrcAdapter {
    fn name(&self) -> &str {
        "irc"
    }

    fn identity(&self) -> String {
        self.config.irc.nick.clone()
    }

    async fn connect_and_join(&self) -> Result<EventStream, AdapterError> {
        let addr = (self.config.irc.server.as_str(), self.config.irc.port);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| AdapterError::ConnectFailed {
                name: "irc".into(),
                reason: e.to_string(),
            })?;
        let (read_half, write_half) = stream.into_split();

        {
            let mut guard = self.writer.lock().await;
            *guard = Some(Writer {
                half: write_half,
                last_send: tokio::time::Instant::now(),
            });
        }

        let nick = self.config.irc.nick.clone();
        let login = self.config.irc_login_name().to_string();
        Self::write_line(&self.writer, &format!("NICK {nick}")).await?;
        Self::write_line(&self.writer, &format!("USER {login} 0 * :{login}")).await?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let config = Arc::clone(&self.config);
        let writer = Arc::clone(&self.writer);
        let members = Arc::clone(&self.members);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            let closed = shutdown.notified();
            tokio::pin!(closed);
            let reason = loop {
                let line = tokio::select! {
                    _ = &mut closed => break None,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) => {
                        if let Some(reason) =
                            handle_line(&line, &config, &writer, &members, &tx).await
                        {
                            break Some(reason);
                        }
                    }
                    Ok(None) => break Some("connection closed by server".to_string()),
                    Err(e) => break Some(format!("read error: {e}")),
                }
            };
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
        let line = if sender.is_empty() {
            format!("PRIVMSG {} :{text}", target.0)
        } else {
            format!("PRIVMSG {} :<{sender}> {text}", target.0)
        };
        Self::write_line(&self.writer, &line).await
    }

    async fn delete(&self, _msg: &InboundMessage) -> Result<(), AdapterError> {
        // IRC has no message deletion.
        Ok(())
    }

    async fn direct_message(&self, msg: &InboundMessage, text: &str) -> Result<(), AdapterError> {
        Self::write_line(&self.writer, &format!("PRIVMSG {} :{text}", msg.sender_id)).await
    }

    async fn dispose(&self) {
        let _ = Self::write_line(&self.writer, "QUIT :bridge restarting").await;
        self.shutdown.notify_waiters();
        let mut guard = self.writer.lock().await;
        *guard = None;
    }
}

/// Handle one server line. Returns `Some(reason)` on a fatal condition.
async fn handle_line(
    line: &str,
    config: &RelayConfig,
    writer: &tokio::sync::Mutex<Option<Writer>>,
    members: &RwLock<HashMap<String, Privilege>>,
    tx: &tokio::sync::mpsc::UnboundedSender<AdapterEvent>,
) -> Option<String> {
    let Some(parsed) = parse_line(line) else {
        return None;
    };

    match parsed.command.as_str() {
        "PING" => {
            let token = parsed.trailing.or_else(|| parsed.params.first().cloned());
            let reply = match token {
                Some(t) => format!("PONG :{t}"),
                None => "PONG".to_string(),
            };
            if let Err(e) = IrcAdapter::write_line(writer, &reply).await {
                return Some(format!("PONG failed: {e}"));
            }
        }
        // Welcome: registration done, authenticate then join.
        "001" => {
            if let (Some(target), Some(auth)) =
                (&config.irc.auth_target, &config.irc.auth_string)
            {
                let line = format!("PRIVMSG {target} :{auth}");
                if let Err(e) = IrcAdapter::write_line(writer, &line).await {
                    return Some(format!("auth send failed: {e}"));
                }
                tokio::time::sleep(AUTH_DELAY).await;
            }
            let join = format!("JOIN {}", config.irc.channel);
            if let Err(e) = IrcAdapter::write_line(writer, &join).await {
                return Some(format!("JOIN failed: {e}"));
            }
            tracing::info!(channel = %config.irc.channel, "IRC registered, joining");
        }
        // NAMES reply: seed the membership map with mode prefixes.
        "353" => {
            if let Some(names) = parsed.trailing
                && let Ok(mut map) = members.write()
            {
                for name in names.split_whitespace() {
                    let (privilege, nick) = split_name_prefix(name);
                    map.insert(nick.to_string(), privilege);
                }
            }
        }
        "MODE" => {
            if parsed.params.first().map(String::as_str)
                == Some(config.irc.channel.as_str())
                && let Ok(mut map) = members.write()
            {
                apply_mode_change(&mut map, &parsed.params[1..]);
            }
        }
        "JOIN" => {
            if let Some(nick) = parsed.sender_nick()
                && let Ok(mut map) = members.write()
            {
                map.entry(nick.to_string()).or_insert(Privilege::None);
            }
        }
        "PART" | "QUIT" => {
            if let Some(nick) = parsed.sender_nick()
                && let Ok(mut map) = members.write()
            {
                map.remove(nick);
            }
        }
        "KICK" => {
            if let Some(kicked) = parsed.params.get(1)
                && let Ok(mut map) = members.write()
            {
                map.remove(kicked);
            }
        }
        "NICK" => {
            if let Some(old) = parsed.sender_nick() {
                let new = parsed
                    .trailing
                    .as_deref()
                    .or_else(|| parsed.params.first().map(String::as_str));
                if let Some(new) = new
                    && let Ok(mut map) = members.write()
                {
                    let privilege = map.remove(old).unwrap_or_default();
                    map.insert(new.to_string(), privilege);
                }
            }
        }
        "PRIVMSG" => {
            let target = parsed.params.first().map(String::as_str).unwrap_or("");
            let (Some(nick), Some(text)) = (parsed.sender_nick(), parsed.trailing.as_deref())
            else {
                return None;
            };
            if !target.eq_ignore_ascii_case(&config.irc.channel) {
                return None;
            }
            let privilege = members
                .read()
                .ok()
                .and_then(|map| map.get(nick).copied())
                .unwrap_or_default();

            let mut msg = InboundMessage::new(Network::Irc, nick, nick, text)
                .with_origin(&config.irc.channel);
            msg.privilege = privilege;
            let _ = tx.send(AdapterEvent::Message(msg));
        }
        "ERROR" => {
            return Some(format!(
                "server error: {}",
                parsed.trailing.unwrap_or_default()
            ));
        }
        _ => {}
    }
    None
}

/// A parsed server line: `[:prefix] COMMAND params [:trailing]`.
#[derive(Debug, PartialEq, Eq)]
struct IrcLine {
    prefix: Option<String>,
    command: String,
    params: Vec<String>,
    trailing: Option<String>,
}

impl IrcLine {
    /// Nick portion of the `nick!user@host` prefix.
    fn sender_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }
}

fn parse_line(line: &str) -> Option<IrcLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }

    let (prefix, rest) = if let Some(stripped) = line.strip_prefix(':') {
        let (prefix, rest) = stripped.split_once(' ')?;
        (Some(prefix.to_string()), rest)
    } else {
        (None, line)
    };

    let (middle, trailing) = match rest.split_once(" :") {
        Some((middle, trailing)) => (middle, Some(trailing.to_string())),
        None => (rest, None),
    };

    let mut parts = middle.split_whitespace().map(String::from);
    let command = parts.next()?;
    Some(IrcLine {
        prefix,
        command,
        params: parts.collect(),
        trailing,
    })
}

/// Split a NAMES entry like `@oper` or `+voiced` into privilege and nick.
fn split_name_prefix(name: &str) -> (Privilege, &str) {
    let mut privilege = Privilege::None;
    let mut rest = name;
    while let Some(first) = rest.chars().next() {
        match first {
            '@' | '~' | '&' => privilege = Privilege::Op,
            '+' | '%' => {
                if privilege == Privilege::None {
                    privilege = Privilege::Voice;
                }
            }
            _ => break,
        }
        rest = &rest[first.len_utf8()..];
    }
    (privilege, rest)
}

/// Apply a channel MODE change (`+o-v alice bob` style) to the member map.
fn apply_mode_change(map: &mut HashMap<String, Privilege>, args: &[String]) {
    let Some(modes) = args.first() else {
        return;
    };
    let mut targets = args[1..].iter();
    let mut adding = true;
    for c in modes.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            'o' | 'v' => {
                let Some(target) = targets.next() else {
                    return;
                };
                let entry = map.entry(target.clone()).or_default();
                *entry = match (c, adding, *entry) {
                    ('o', true, _) => Privilege::Op,
                    ('o', false, _) => Privilege::None,
                    ('v', true, Privilege::Op) => Privilege::Op,
                    ('v', true, _) => Privilege::Voice,
                    ('v', false, Privilege::Op) => Privilege::Op,
                    _ => Privilege::None,
                };
            }
            // Modes with an argument we don't track.
            'b' | 'k' | 'l' | 'q' | 'e' | 'I' | 'h' => {
                let _ = targets.next();
            }
            _ => {}
        }
    }
}
