//! Conversion of network-specific markup into plain text.
//!
//! All functions here are pure; the paste upload for extracted code blocks
//! is the caller's job so routing stays deterministic.

use std::sync::LazyLock;

use regex::Regex;

use crate::message::{MentionedChannel, MentionedUser};

static USER_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@!?\d+>").unwrap());
static CHANNEL_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<#(\d+)>").unwrap());
static EMOJI_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<a?:(\w+):\d+>").unwrap());
static ESCAPED_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\([^A-Za-z0-9])").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`]*`").unwrap());

const FENCE: &str = "```";

/// Replace user-mention tokens with display names.
///
/// Tokens are paired positionally with the mention list: the Nth token in
/// the text gets the Nth mentioned user's name. When the counts differ,
/// pairing stops at the shorter list and excess tokens stay as-is. The ID
/// inside the token is deliberately not used for lookup; the gateway
/// delivers the mention array in token order.
pub fn replace_user_mentions(text: &str, mentions: &[MentionedUser]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (token, user) in USER_MENTION.find_iter(text).zip(mentions) {
        out.push_str(&text[last..token.start()]);
        out.push_str(&user.display_name);
        last = token.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Replace channel-mention tokens with `#channelName`, paired positionally
/// with the channel-mention list like [`replace_user_mentions`].
pub fn replace_channel_mentions(text: &str, mentions: &[MentionedChannel]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (token, channel) in CHANNEL_MENTION.find_iter(text).zip(mentions) {
        out.push_str(&text[last..token.start()]);
        out.push('#');
        out.push_str(&channel.name);
        last = token.end();
    }
    out.push_str(&text[last..]);
    out
}

/// IDs of channel-mention tokens in occurrence order. The Discord adapter
/// uses this to build the mention list the positional pairing consumes.
pub fn channel_mention_ids(text: &str) -> Vec<String> {
    CHANNEL_MENTION
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Rewrite every custom-emoji token `<:name:1234>` (animated or not) to
/// `:name:`.
pub fn replace_emoji_tokens(text: &str) -> String {
    EMOJI_TOKEN.replace_all(text, ":$1:").into_owned()
}

/// Unescape `\X` to `X` for any non-alphanumeric `X`, leaving
/// single-backtick code spans byte-for-byte untouched.
pub fn unescape_outside_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in INLINE_CODE.find_iter(text) {
        out.push_str(&ESCAPED_CHAR.replace_all(&text[last..span.start()], "$1"));
        out.push_str(span.as_str());
        last = span.end();
    }
    out.push_str(&ESCAPED_CHAR.replace_all(&text[last..], "$1"));
    out
}

/// Extract the first fenced code block.
///
/// When the text contains at least two fence markers, returns the text with
/// the whole fenced region removed plus the trimmed payload that sat between
/// the first two fences. Otherwise the text comes back unchanged with no
/// payload, and no external call should be made.
pub fn extract_code_block(text: &str) -> (String, Option<String>) {
    let Some(start) = text.find(FENCE) else {
        return (text.to_string(), None);
    };
    let after_open = start + FENCE.len();
    let Some(close) = text[after_open..].find(FENCE) else {
        return (text.to_string(), None);
    };
    let end = after_open + close;

    let payload = text[after_open..end].trim().to_string();
    let mut remainder = String::with_capacity(text.len() - (end + FENCE.len() - start));
    remainder.push_str(&text[..start]);
    remainder.push_str(&text[end + FENCE.len()..]);
    (remainder, Some(payload))
}

/// Escape every `@everyone` occurrence so relayed IRC text cannot ping a
/// whole guild.
pub fn escape_everyone(text: &str) -> String {
    text.replace("@everyone", "\\@everyone")
}

/// Escape Markdown-significant characters in an IRC nick so it renders
/// literally inside the `**<nick>**` attribution.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '~' | '`' | '|') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
