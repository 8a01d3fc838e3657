use anyhow::{Context, Result};
use std::time::Duration;

use crate::audio::QueueSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Catálogo
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub resolve_timeout: Duration,
    pub search_limit: usize,

    // Cola
    pub max_queue_size: usize,
    pub queue_page_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("falta DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Catálogo
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").context("falta SPOTIFY_CLIENT_ID")?,
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET")
                .context("falta SPOTIFY_CLIENT_SECRET")?,
            resolve_timeout: humantime::parse_duration(
                &std::env::var("RESOLVE_TIMEOUT").unwrap_or_else(|_| "10s".to_string()),
            )
            .context("RESOLVE_TIMEOUT inválido")?,
            search_limit: std::env::var("SEARCH_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Cola
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            queue_page_size: std::env::var("QUEUE_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Credentials must not be empty
    /// - Resolve timeout must be between 1s and 2min
    /// - Queue size and page size must be greater than 0
    /// - Search limit must be between 1 and 25 (Discord embed field limit)
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN cannot be empty");
        }

        if self.spotify_client_id.trim().is_empty() || self.spotify_client_secret.trim().is_empty() {
            anyhow::bail!("Spotify credentials cannot be empty");
        }

        if self.resolve_timeout < Duration::from_secs(1) || self.resolve_timeout > Duration::from_secs(120) {
            anyhow::bail!(
                "Resolve timeout must be between 1s and 2min, got: {}",
                humantime::format_duration(self.resolve_timeout)
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.search_limit == 0 || self.search_limit > 25 {
            anyhow::bail!("Search limit must be between 1 and 25, got: {}", self.search_limit);
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Credentials are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Catalog: {} timeout, {} search results\n  \
            Queue: {} max tracks, {} per page",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            humantime::format_duration(self.resolve_timeout),
            self.search_limit,
            self.max_queue_size,
            self.queue_page_size,
        )
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_queue_size: self.max_queue_size,
            resolve_timeout: self.resolve_timeout,
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let queue = QueueSettings::default();

        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            resolve_timeout: queue.resolve_timeout,
            search_limit: 10,

            max_queue_size: queue.max_queue_size,
            queue_page_size: 10,
        }
    }
}
