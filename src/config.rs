//! Relay configuration, loaded once from a JSON settings file.
//!
//! Older settings files may omit the filter lists entirely; absent lists
//! mean "no filtering", not an error.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level relay configuration. Immutable after load; both adapters and
/// the router read the same `Arc<RelayConfig>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RelayConfig {
    pub discord: DiscordConfig,
    pub irc: IrcConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    /// Write every relayed message to the transcript file.
    #[serde(default)]
    pub log_messages: bool,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub paste: PasteConfig,
    #[serde(default)]
    pub restart: RestartConfig,
}

/// Discord-side credentials and target.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub guild_name: String,
    pub channel_name: String,
}

/// IRC-side connection parameters and target.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    pub server: String,
    pub port: u16,
    pub nick: String,
    #[serde(default)]
    pub login_name: String,
    pub channel: String,
    /// Optional services authentication: on connect, `auth_string` is sent
    /// as a private message to `auth_target` (e.g. NickServ) before joining.
    #[serde(default)]
    pub auth_target: Option<String>,
    #[serde(default)]
    pub auth_string: Option<String>,
}

/// Sender blacklists and spam patterns. Every field defaults to empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    /// Discord sender IDs (opaque numeric strings) whose messages are dropped.
    #[serde(default)]
    pub discord_id_blacklist: Vec<String>,
    /// IRC nicks whose messages are dropped.
    #[serde(default)]
    pub irc_name_blacklist: Vec<String>,
    /// Case-insensitive substrings that mark a message as spam.
    #[serde(default)]
    pub spam_patterns: Vec<String>,
}

/// Paste service endpoint for extracted code blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct PasteConfig {
    #[serde(default = "default_paste_endpoint")]
    pub endpoint: String,
    /// Upload timeout in seconds. Paste upload happens inline with message
    /// handling, so an unresponsive endpoint would otherwise stall the relay.
    #[serde(default = "default_paste_timeout_secs")]
    pub timeout_secs: u64,
}

/// Session restart backoff. Sessions are restarted forever; the backoff
/// keeps a sustained outage from hammering either network.
#[derive(Debug, Clone, Deserialize)]
pub struct RestartConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("log.txt")
}

fn default_paste_endpoint() -> String {
    "https://hastebin.com".to_string()
}

fn default_paste_timeout_secs() -> u64 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_paste_endpoint(),
            timeout_secs: default_paste_timeout_secs(),
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RelayConfig {
    /// Load and validate a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string (used by tests).
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        let required = [
            (
                "discord.bot_token",
                self.discord.bot_token.expose_secret(),
                "Create a bot at https://discord.com/developers and paste its token.",
            ),
            (
                "discord.guild_name",
                self.discord.guild_name.as_str(),
                "Name of the guild to bridge.",
            ),
            (
                "discord.channel_name",
                self.discord.channel_name.as_str(),
                "Name of the channel to bridge.",
            ),
            (
                "irc.server",
                self.irc.server.as_str(),
                "Hostname of the IRC server.",
            ),
            ("irc.nick", self.irc.nick.as_str(), "Nick the bridge uses."),
            (
                "irc.channel",
                self.irc.channel.as_str(),
                "IRC channel to bridge, including the # prefix.",
            ),
        ];
        for (key, value, hint) in required {
            if value.is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: key.to_string(),
                    hint: hint.to_string(),
                });
            }
        }

        if self.irc.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "irc.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }

        if self.irc.auth_string.is_some() != self.irc.auth_target.is_some() {
            return Err(ConfigError::InvalidValue {
                key: "irc.auth_target".to_string(),
                message: "auth_target and auth_string must be set together".to_string(),
            });
        }

        Ok(())
    }

    /// Login name for the IRC USER command, falling back to the nick.
    pub fn irc_login_name(&self) -> &str {
        if self.irc.login_name.is_empty() {
            &self.irc.nick
        } else {
            &self.irc.login_name
        }
    }
}
