//! straybot - Straylight IRC Bot
//!
//! An extensible IRC client bot: one connection, an event bus, a sigil
//! command router, and a plugin runtime with hot load/unload/reload.

mod bot;
mod client;
mod commands;
mod config;
mod error;
mod events;
mod plugin;
mod plugins;
mod state;

use std::path::{Path, PathBuf};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::bot::Bot;
use crate::client::Outbound;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "straybot.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;
    let config_dir = Path::new(&config_path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let (out, out_rx) = Outbound::pair();
    let mut bot = Bot::new(config, config_dir, out)?;

    info!(
        nick = %bot.nick,
        server = %bot.server,
        port = bot.port,
        "Starting straybot"
    );

    // Load configured plugins before connecting so their handlers see the
    // whole session.
    for name in bot.config.get_list("plugin") {
        if let Err(e) = bot.load_plugin(&name) {
            error!(plugin = %name, error = %e, "Failed to load plugin");
        }
    }

    client::run(&mut bot, out_rx).await
}
