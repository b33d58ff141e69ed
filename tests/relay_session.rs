//! Integration tests for the session supervisor and relay loops.
//!
//! Each test wires a `Session` to mock adapters, injects events on one
//! side and asserts what crossed to the other: no sockets involved.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::time::timeout;

use irc_relay::adapters::{Adapter, AdapterEvent, EventStream};
use irc_relay::config::RelayConfig;
use irc_relay::error::AdapterError;
use irc_relay::message::{ChannelRef, InboundMessage, Network};
use irc_relay::message_log::MessageLog;
use irc_relay::paste::PasteService;
use irc_relay::session::Session;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Mock adapter: events are injected by the test, outputs are recorded.
struct MockAdapter {
    name: &'static str,
    identity: String,
    incoming: tokio::sync::Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<AdapterEvent>>>,
    sent: std::sync::Mutex<Vec<(String, String, String)>>,
    deleted: std::sync::Mutex<Vec<String>>,
    dms: std::sync::Mutex<Vec<(String, String)>>,
    dispose_count: AtomicUsize,
}

impl MockAdapter {
    fn new(
        name: &'static str,
        identity: &str,
    ) -> (Arc<Self>, tokio::sync::mpsc::UnboundedSender<AdapterEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let adapter = Arc::new(Self {
            name,
            identity: identity.to_string(),
            incoming: tokio::sync::Mutex::new(Some(rx)),
            sent: std::sync::Mutex::new(Vec::new()),
            deleted: std::sync::Mutex::new(Vec::new()),
            dms: std::sync::Mutex::new(Vec::new()),
            dispose_count: AtomicUsize::new(0),
        });
        (adapter, tx)
    }

    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn dms(&self) -> Vec<(String, String)> {
        self.dms.lock().unwrap().clone()
    }

    fn disposals(&self) -> usize {
        self.dispose_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn connect_and_join(&self) -> Result<EventStream, AdapterError> {
        let rx = self
            .incoming
            .lock()
            .await
            .take()
            .ok_or_else(|| AdapterError::ConnectFailed {
                name: self.name.to_string(),
                reason: "already connected once".to_string(),
            })?;
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
        self.sent.lock().unwrap().push((
            target.0.clone(),
            sender.to_string(),
            text.to_string(),
        ));
        Ok(())
    }

    async fn delete(&self, msg: &InboundMessage) -> Result<(), AdapterError> {
        self.deleted.lock().unwrap().push(msg.message_id.clone());
        Ok(())
    }

    async fn direct_message(&self, msg: &InboundMessage, text: &str) -> Result<(), AdapterError> {
        self.dms
            .lock()
            .unwrap()
            .push((msg.sender_id.clone(), text.to_string()));
        Ok(())
    }

    async fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Paste mock: records payloads, answers with a fixed URL.
#[derive(Default)]
struct RecordingPaste {
    uploads: std::sync::Mutex<Vec<String>>,
}

impl RecordingPaste {
    fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl PasteService for RecordingPaste {
    async fn upload(&self, payload: &str) -> Option<String> {
        self.uploads.lock().unwrap().push(payload.to_string());
        Some("https://paste.example/abc".to_string())
    }
}

fn test_config(log_file: Option<&std::path::Path>) -> Arc<RelayConfig> {
    let mut json = serde_json::json!({
        "discord": {
            "bot_token": "t",
            "guild_name": "Guild",
            "channel_name": "bridge"
        },
        "irc": {
            "server": "irc.example.net",
            "port": 6667,
            "nick": "bridgebot",
            "channel": "#bridge"
        },
        "filters": {
            "discord_id_blacklist": ["123"],
            "spam_patterns": ["bad"]
        }
    });
    if let Some(path) = log_file {
        json["log_messages"] = serde_json::json!(true);
        json["log_file"] = serde_json::json!(path.to_str().unwrap());
    }
    Arc::new(RelayConfig::from_json(&json.to_string()).unwrap())
}

struct Harness {
    session: Session,
    discord: Arc<MockAdapter>,
    discord_tx: tokio::sync::mpsc::UnboundedSender<AdapterEvent>,
    irc: Arc<MockAdapter>,
    irc_tx: tokio::sync::mpsc::UnboundedSender<AdapterEvent>,
    paste: Arc<RecordingPaste>,
}

fn harness(config: Arc<RelayConfig>) -> Harness {
    let (discord, discord_tx) = MockAdapter::new("discord", "900");
    let (irc, irc_tx) = MockAdapter::new("irc", "bridgebot");
    let paste = Arc::new(RecordingPaste::default());
    let transcript = if config.log_messages {
        MessageLog::new(config.log_file.clone(), true)
    } else {
        MessageLog::disabled()
    };
    let session = Session::new(
        Arc::clone(&config),
        Arc::clone(&discord) as Arc<dyn Adapter>,
        Arc::clone(&irc) as Arc<dyn Adapter>,
        Arc::clone(&paste) as Arc<dyn PasteService>,
        transcript,
    );
    Harness {
        session,
        discord,
        discord_tx,
        irc,
        irc_tx,
        paste,
    }
}

fn discord_msg(text: &str) -> InboundMessage {
    let mut msg = InboundMessage::new(Network::Discord, "alice", "42", text).with_origin("bridge");
    msg.origin_id = "555".to_string();
    msg.message_id = "m1".to_string();
    msg
}

#[tokio::test]
async fn fatal_event_kills_session_and_disposes_both_once() {
    let h = harness(test_config(None));
    h.discord_tx
        .send(AdapterEvent::Fatal("socket reset".to_string()))
        .unwrap();

    let reason = timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();
    assert!(reason.contains("discord"));
    assert!(!h.session.is_alive());
    assert_eq!(h.discord.disposals(), 1);
    assert_eq!(h.irc.disposals(), 1);

    // A second kill must not dispose again.
    h.session.kill().await;
    assert_eq!(h.discord.disposals(), 1);
    assert_eq!(h.irc.disposals(), 1);
}

#[tokio::test]
async fn failed_session_is_replaced_by_exactly_one_new_one() {
    let config = test_config(None);
    let h = harness(Arc::clone(&config));
    h.discord_tx
        .send(AdapterEvent::Fatal("gone".to_string()))
        .unwrap();
    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();
    assert!(!h.session.is_alive());

    // The outer loop's move: one fresh session, alive and connectable.
    let replacement = harness(config);
    assert!(replacement.session.is_alive());
    assert_eq!(replacement.discord.disposals(), 0);
}

#[tokio::test]
async fn discord_message_is_relayed_to_irc() {
    let h = harness(test_config(None));
    h.discord_tx
        .send(AdapterEvent::Message(discord_msg("hello from discord")))
        .unwrap();
    h.discord_tx
        .send(AdapterEvent::Fatal("done".to_string()))
        .unwrap();

    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();

    let sent = h.irc.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "#bridge");
    assert_eq!(sent[0].1, "alice");
    assert_eq!(sent[0].2, "hello from discord");
    assert!(h.discord.sent().is_empty());
    // No fence in the text, so the paste service is never contacted.
    assert!(h.paste.uploads().is_empty());
}

#[tokio::test]
async fn fenced_code_is_uploaded_once_and_linked() {
    let h = harness(test_config(None));
    h.discord_tx
        .send(AdapterEvent::Message(discord_msg("hi ```secret``` bye")))
        .unwrap();
    h.discord_tx
        .send(AdapterEvent::Fatal("done".to_string()))
        .unwrap();

    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();

    assert_eq!(h.paste.uploads(), vec!["secret"]);
    let sent = h.irc.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].2, "hi  bye");
    assert_eq!(sent[1].2, "https://paste.example/abc");
}

#[tokio::test]
async fn blocked_senders_never_reach_the_paste_service() {
    let h = harness(test_config(None));
    let mut msg = discord_msg("hi ```secret``` bye");
    msg.sender_id = "123".to_string();
    h.discord_tx.send(AdapterEvent::Message(msg)).unwrap();

    // A message off the bridged channel must not upload either.
    h.discord_tx
        .send(AdapterEvent::Message(
            discord_msg("```more secrets```").with_origin("general"),
        ))
        .unwrap();
    h.discord_tx
        .send(AdapterEvent::Fatal("done".to_string()))
        .unwrap();

    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();

    assert!(h.irc.sent().is_empty());
    assert!(h.paste.uploads().is_empty());
}

#[tokio::test]
async fn irc_message_is_relayed_to_discord_with_attribution() {
    let h = harness(test_config(None));
    let mut msg = InboundMessage::new(Network::Irc, "bob", "bob", "hi @everyone")
        .with_origin("#bridge");
    msg.privilege = irc_relay::message::Privilege::Op;
    h.irc_tx.send(AdapterEvent::Message(msg)).unwrap();
    h.irc_tx
        .send(AdapterEvent::Fatal("done".to_string()))
        .unwrap();

    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();

    let sent = h.discord.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "@bob");
    assert_eq!(sent[0].2, "hi \\@everyone");
}

#[tokio::test]
async fn spam_is_warned_and_deleted_on_the_origin_side() {
    let h = harness(test_config(None));
    h.discord_tx
        .send(AdapterEvent::Message(discord_msg("this is BAD stuff")))
        .unwrap();
    h.discord_tx
        .send(AdapterEvent::Fatal("done".to_string()))
        .unwrap();

    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();

    assert!(h.irc.sent().is_empty());
    let warnings = h.discord.sent();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].1.is_empty());
    assert!(warnings[0].2.contains("will not be relayed"));
    assert_eq!(h.discord.deleted(), vec!["m1"]);
    assert!(h.discord.dms().is_empty());
}

#[tokio::test]
async fn too_many_lines_resends_the_original_privately() {
    let h = harness(test_config(None));
    h.discord_tx
        .send(AdapterEvent::Message(discord_msg("a\nb\nc\nd")))
        .unwrap();
    h.discord_tx
        .send(AdapterEvent::Fatal("done".to_string()))
        .unwrap();

    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();

    assert!(h.irc.sent().is_empty());
    assert_eq!(h.discord.deleted(), vec!["m1"]);
    let dms = h.discord.dms();
    assert_eq!(dms.len(), 1);
    assert_eq!(dms[0].0, "42");
    assert!(dms[0].1.contains("a\nb\nc\nd"));
}

#[tokio::test]
async fn blacklisted_sender_produces_no_units_and_no_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");
    let h = harness(test_config(Some(&log_path)));

    let mut msg = discord_msg("hello");
    msg.sender_id = "123".to_string();
    h.discord_tx.send(AdapterEvent::Message(msg)).unwrap();
    h.discord_tx
        .send(AdapterEvent::Fatal("done".to_string()))
        .unwrap();

    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();

    assert!(h.irc.sent().is_empty());
    assert!(h.discord.sent().is_empty());
    assert!(!log_path.exists());
}

#[tokio::test]
async fn accepted_messages_land_in_the_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");
    let h = harness(test_config(Some(&log_path)));

    h.discord_tx
        .send(AdapterEvent::Message(discord_msg("for the record")))
        .unwrap();
    h.discord_tx
        .send(AdapterEvent::Fatal("done".to_string()))
        .unwrap();

    timeout(TEST_TIMEOUT, h.session.run()).await.unwrap().unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("Discord -> IRC <alice> for the record"));
}
