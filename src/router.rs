//! The relay router: turns one inbound message into zero or more outbound
//! units, or a policy rejection.
//!
//! `route` is a pure function of (message, config, paste URL); it performs
//! no I/O. The session drives the side effects a rejection asks for
//! (warning, deletion, DM resend).

use crate::config::RelayConfig;
use crate::filter;
use crate::message::{ChannelRef, InboundMessage, Network, OutboundUnit};
use crate::sanitize;

/// Sanitized messages longer than this cannot be relayed to IRC.
pub const MAX_RELAY_CHARS: usize = 1000;

/// Maximum non-blank lines relayed to IRC per message.
pub const MAX_RELAY_LINES: usize = 3;

/// Result of routing one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Dropped without any user-visible feedback.
    Drop(DropReason),
    /// Rejected with feedback to the sender.
    Reject(Rejection),
    /// Accepted; units are sent in order.
    Accept(Vec<OutboundUnit>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The bridge's own message echoed back; relaying it would loop.
    SelfMessage,
    /// Not the configured channel pair.
    WrongChannel,
    Blacklisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Spam,
    TooLong,
    TooManyLines,
}

/// A policy rejection and the feedback it owes the sender. Not an error;
/// a deterministic routing outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    /// Warning posted back to the origin channel.
    pub warning: String,
    /// Delete the original message where the origin protocol supports it.
    pub delete_original: bool,
    /// Privately resend the raw original to the author so it is not lost.
    pub resend_original: bool,
}

/// Route an inbound message.
///
/// `self_identity` is the bridge's own identity on the inbound side (bot
/// user ID for Discord, configured nick for IRC). `paste_url` is the result
/// of uploading the message's extracted code block, if any; the caller runs
/// that upload before routing so `route` stays deterministic.
pub fn route(
    msg: &InboundMessage,
    self_identity: &str,
    config: &RelayConfig,
    paste_url: Option<&str>,
) -> RouteOutcome {
    match msg.network {
        Network::Discord => route_discord(msg, self_identity, config, paste_url),
        Network::Irc => route_irc(msg, self_identity, config),
    }
}

fn route_discord(
    msg: &InboundMessage,
    self_identity: &str,
    config: &RelayConfig,
    paste_url: Option<&str>,
) -> RouteOutcome {
    if !self_identity.is_empty() && msg.sender_id == self_identity {
        return RouteOutcome::Drop(DropReason::SelfMessage);
    }

    // Original bridge matched by substring, so "bridge" also covers
    // "bridge-test"; kept for config compatibility.
    if !msg.origin.0.contains(&config.discord.channel_name) {
        return RouteOutcome::Drop(DropReason::WrongChannel);
    }

    if filter::is_blacklisted(&msg.sender_id, &config.filters.discord_id_blacklist) {
        return RouteOutcome::Drop(DropReason::Blacklisted);
    }

    // Fenced code is exempt from the mention/emoji/escape passes, so it
    // comes out first. The payload itself was already handed to the paste
    // service by the caller.
    let (remainder, _payload) = sanitize::extract_code_block(&msg.text);
    let text = sanitize::replace_user_mentions(&remainder, &msg.mentioned_users);
    let text = sanitize::replace_channel_mentions(&text, &msg.mentioned_channels);
    let text = sanitize::replace_emoji_tokens(&text);
    let text = sanitize::unescape_outside_code(&text);

    if filter::contains_spam(&text, &config.filters.spam_patterns) {
        return RouteOutcome::Reject(Rejection {
            reason: RejectReason::Spam,
            warning: format!(
                "<@{}>: Message with blacklisted input will not be relayed!",
                msg.sender_id
            ),
            delete_original: true,
            resend_original: false,
        });
    }

    if text.chars().count() > MAX_RELAY_CHARS {
        return RouteOutcome::Reject(Rejection {
            reason: RejectReason::TooLong,
            warning: format!(
                "<@{}>: messages > 1000 characters cannot be successfully transmitted to IRC!",
                msg.sender_id
            ),
            delete_original: true,
            resend_original: false,
        });
    }

    let lines: Vec<&str> = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.len() > MAX_RELAY_LINES {
        return RouteOutcome::Reject(Rejection {
            reason: RejectReason::TooManyLines,
            warning: format!(
                "<@{}>: Too many lines! If you're meaning to post code blocks, \
                 please use \\`\\`\\` to open & close the codeblock.\n\
                 Your message has been deleted and was not relayed to IRC. Please try again.",
                msg.sender_id
            ),
            delete_original: true,
            resend_original: true,
        });
    }

    let target = ChannelRef(config.irc.channel.clone());
    let unit = |text: &str| OutboundUnit {
        destination: Network::Irc,
        target: target.clone(),
        sender: msg.sender_name.clone(),
        text: text.to_string(),
    };

    let mut units: Vec<OutboundUnit> = msg.attachments.iter().map(|url| unit(url)).collect();
    units.extend(lines.iter().map(|line| unit(line)));
    if let Some(url) = paste_url {
        units.push(unit(url));
    }

    RouteOutcome::Accept(units)
}

fn route_irc(msg: &InboundMessage, self_identity: &str, config: &RelayConfig) -> RouteOutcome {
    if !self_identity.is_empty() && msg.sender_id == self_identity {
        return RouteOutcome::Drop(DropReason::SelfMessage);
    }

    if !msg.origin.0.eq_ignore_ascii_case(&config.irc.channel) {
        return RouteOutcome::Drop(DropReason::WrongChannel);
    }

    if filter::is_blacklisted(&msg.sender_id, &config.filters.irc_name_blacklist) {
        return RouteOutcome::Drop(DropReason::Blacklisted);
    }

    // Every occurrence, not just the first: otherwise a second @everyone
    // would still ping the guild.
    let text = sanitize::escape_everyone(&msg.text);

    if filter::contains_spam(&text, &config.filters.spam_patterns) {
        return RouteOutcome::Reject(Rejection {
            reason: RejectReason::Spam,
            warning: "Message with blacklisted input will not be relayed!".to_string(),
            // IRC has no message deletion.
            delete_original: false,
            resend_original: false,
        });
    }

    let sender = format!(
        "{}{}",
        msg.privilege.marker(),
        sanitize::escape_markdown(&msg.sender_name)
    );

    RouteOutcome::Accept(vec![OutboundUnit {
        destination: Network::Discord,
        target: ChannelRef(config.discord.channel_name.clone()),
        sender,
        text,
    }])
}
