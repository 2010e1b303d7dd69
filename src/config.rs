use anyhow::Result;
use std::time::Duration;

use crate::audio::session::SessionSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub queue_page_size: usize,

    // Resolución de pistas
    pub ytdlp_path: String,
    pub resolve_timeout: Duration,
    pub max_concurrent_resolves: usize,

    // Rendimiento
    pub worker_threads: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            queue_page_size: std::env::var("QUEUE_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Resolución
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            resolve_timeout: humantime::parse_duration(
                &std::env::var("RESOLVE_TIMEOUT").unwrap_or_else(|_| "30s".to_string()),
            )?,
            max_concurrent_resolves: std::env::var("MAX_CONCURRENT_RESOLVES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,

            // Rendimiento
            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size, page size, resolver permits and worker threads must be > 0
    /// - Resolve timeout must be at least one second
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.max_concurrent_resolves == 0 {
            anyhow::bail!("Max concurrent resolves must be greater than 0");
        }

        if self.resolve_timeout < Duration::from_secs(1) {
            anyhow::bail!(
                "Resolve timeout too low, minimum 1s, got: {}",
                humantime::format_duration(self.resolve_timeout)
            );
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} queue, {} per page\n  \
            Resolver: {} ({} timeout, {} concurrent)\n  \
            Runtime: {} worker threads",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.queue_page_size,
            self.ytdlp_path,
            humantime::format_duration(self.resolve_timeout),
            self.max_concurrent_resolves,
            self.worker_threads,
        )
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            volume: self.default_volume,
            max_queue_size: self.max_queue_size,
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 1000,
            queue_page_size: 10,

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout: Duration::from_secs(30),
            max_concurrent_resolves: 3,

            worker_threads: num_cpus::get(),
        }
    }
}
