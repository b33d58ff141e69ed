//! Shared message types flowing between adapters and the router.

use chrono::{DateTime, Utc};

/// Which network a message came from or is headed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Discord,
    Irc,
}

/// Relay direction, used for transcript tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    DiscordToIrc,
    IrcToDiscord,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DiscordToIrc => write!(f, "Discord -> IRC"),
            Self::IrcToDiscord => write!(f, "IRC -> Discord"),
        }
    }
}

impl From<Network> for Direction {
    /// Direction of a relay originating on the given network.
    fn from(source: Network) -> Self {
        match source {
            Network::Discord => Self::DiscordToIrc,
            Network::Irc => Self::IrcToDiscord,
        }
    }
}

/// IRC channel privilege of a sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Privilege {
    #[default]
    None,
    Voice,
    Op,
}

impl Privilege {
    /// Marker prefixed to the sender name when relaying to Discord.
    pub fn marker(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Voice => "+",
            Self::Op => "@",
        }
    }
}

/// Opaque reference to a channel on either network. The Discord adapter
/// stores channel names here and resolves IDs itself; the IRC adapter
/// stores `#channel` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef(pub String);

/// A user listed in a Discord message's mention array, in occurrence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionedUser {
    pub id: String,
    pub display_name: String,
}

/// A channel referenced by a Discord channel-mention token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionedChannel {
    pub id: String,
    pub name: String,
}

/// An inbound message as surfaced by an adapter. Consumed synchronously by
/// the router; never persisted.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub network: Network,
    /// Display name of the sender (Discord username or IRC nick).
    pub sender_name: String,
    /// Opaque sender identity used for blacklisting and self-suppression
    /// (Discord user ID, IRC nick).
    pub sender_id: String,
    pub text: String,
    /// Attachment URLs in upload order. Always empty for IRC.
    pub attachments: Vec<String>,
    /// Discord mention array, in the order the gateway delivered it.
    pub mentioned_users: Vec<MentionedUser>,
    pub mentioned_channels: Vec<MentionedChannel>,
    /// IRC channel privilege of the sender. `None` for Discord.
    pub privilege: Privilege,
    /// Channel the message arrived on, as the origin adapter names it.
    pub origin: ChannelRef,
    /// Protocol-level ID of the origin channel, where the protocol has one
    /// (needed for Discord REST calls). Empty for IRC.
    pub origin_id: String,
    /// Protocol-level message ID, used for deletion. Empty where the
    /// protocol has none (IRC).
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// A bare message with no attachments, mentions or privilege, as the
    /// IRC adapter produces and as tests build on.
    pub fn new(network: Network, sender_name: &str, sender_id: &str, text: &str) -> Self {
        Self {
            network,
            sender_name: sender_name.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            attachments: Vec::new(),
            mentioned_users: Vec::new(),
            mentioned_channels: Vec::new(),
            privilege: Privilege::None,
            origin: ChannelRef(String::new()),
            origin_id: String::new(),
            message_id: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = ChannelRef(origin.to_string());
        self
    }
}

/// One outbound message part. An accepted `InboundMessage` yields an ordered
/// sequence of these: attachments first, then each non-blank line, then an
/// optional paste URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundUnit {
    pub destination: Network,
    pub target: ChannelRef,
    /// Sender attribution; each adapter formats this natively
    /// (`<name>` on IRC, `**<name>**` on Discord).
    pub sender: String,
    pub text: String,
}
