use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use irc_relay::adapters::{DiscordAdapter, IrcAdapter};
use irc_relay::config::RelayConfig;
use irc_relay::message_log::MessageLog;
use irc_relay::paste::{PasteClient, PasteService};
use irc_relay::session::Session;

/// A session that stayed up at least this long resets the restart backoff.
const STABLE_SESSION: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("IRC_RELAY_CONFIG").ok())
        .unwrap_or_else(|| "settings.json".to_string());
    let config = Arc::new(RelayConfig::load(&PathBuf::from(&config_path))?);

    tracing::info!(
        config = %config_path,
        guild = %config.discord.guild_name,
        discord_channel = %config.discord.channel_name,
        irc_server = %config.irc.server,
        irc_channel = %config.irc.channel,
        "Starting relay"
    );

    let paste: Arc<dyn PasteService> = Arc::new(PasteClient::new(&config.paste));
    let transcript = MessageLog::new(config.log_file.clone(), config.log_messages);

    // Sessions are restarted forever; there is no exit path besides the
    // process being killed.
    let mut backoff = Duration::from_millis(config.restart.initial_backoff_ms);
    let max_backoff = Duration::from_millis(config.restart.max_backoff_ms);
    loop {
        let session = Session::new(
            Arc::clone(&config),
            Arc::new(DiscordAdapter::new(Arc::clone(&config))),
            Arc::new(IrcAdapter::new(Arc::clone(&config))),
            Arc::clone(&paste),
            transcript.clone(),
        );

        let started = Instant::now();
        match session.run().await {
            Ok(reason) => tracing::warn!(%reason, "Session failure... New session starting."),
            Err(e) => tracing::error!("Session could not start: {e}"),
        }

        if started.elapsed() >= STABLE_SESSION {
            backoff = Duration::from_millis(config.restart.initial_backoff_ms);
        }
        tracing::info!(delay_ms = backoff.as_millis() as u64, "Restarting session");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}
