use anyhow::{Context, Result};
use std::{fmt, path::PathBuf, time::Duration};

#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Catálogo
    pub stations_file: PathBuf,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Política de reproducción
    pub radio_max_retries: u32,
    pub radio_retry_backoff: Duration,
    pub radio_retry_backoff_max: Duration,
    pub stream_stable_after: Duration,
    pub idle_disconnect_after: Duration,

    // Herramientas externas
    pub extractor_timeout: Duration,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub radio_browser_url: Option<String>,

    // Mantenimiento
    pub maintenance_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de variables.
    ///
    /// `load()` usa el entorno del proceso; los tests pasan un mapa.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let duration = |key: &str, default: &str| -> Result<Duration> {
            let raw = var(key).unwrap_or_else(|| default.to_string());
            humantime::parse_duration(raw.trim())
                .with_context(|| format!("{} no es una duración válida: {}", key, raw))
        };

        let discord_token = var("DISCORD_TOKEN")
            .ok_or_else(|| anyhow::anyhow!("La variable de entorno DISCORD_TOKEN es obligatoria"))?;

        let radio_browser_url = match lookup("RADIO_BROWSER_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) => Some(url.trim().trim_end_matches('/').to_string()),
            None => Some("https://de1.api.radio-browser.info".to_string()),
        };

        Ok(Self {
            discord_token,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            stations_file: var("STATIONS_FILE")
                .unwrap_or_else(|| "radio_stations.toml".to_string())
                .into(),

            default_volume: var("DEFAULT_VOLUME")
                .unwrap_or_else(|| "0.5".to_string())
                .parse()
                .context("DEFAULT_VOLUME debe ser un número")?,
            max_queue_size: var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|| "100".to_string())
                .parse()
                .context("MAX_QUEUE_SIZE debe ser un entero")?,

            radio_max_retries: var("RADIO_MAX_RETRIES")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .context("RADIO_MAX_RETRIES debe ser un entero")?,
            radio_retry_backoff: duration("RADIO_RETRY_BACKOFF", "2s")?,
            radio_retry_backoff_max: duration("RADIO_RETRY_BACKOFF_MAX", "30s")?,
            stream_stable_after: duration("STREAM_STABLE_AFTER", "30s")?,
            idle_disconnect_after: duration("IDLE_DISCONNECT_AFTER", "60s")?,

            extractor_timeout: duration("EXTRACTOR_TIMEOUT", "30s")?,
            ytdlp_path: var("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            ffmpeg_path: var("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            radio_browser_url,

            maintenance_interval: duration("MAINTENANCE_INTERVAL", "5m")?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and timeouts must be greater than zero
    /// - The retry backoff ceiling can't be below its base
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.radio_retry_backoff_max < self.radio_retry_backoff {
            anyhow::bail!(
                "RADIO_RETRY_BACKOFF_MAX ({:?}) is lower than RADIO_RETRY_BACKOFF ({:?})",
                self.radio_retry_backoff_max,
                self.radio_retry_backoff
            );
        }

        if self.idle_disconnect_after.is_zero() {
            anyhow::bail!("Idle disconnect window must be greater than 0");
        }

        if self.extractor_timeout.is_zero() {
            anyhow::bail!("Extractor timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Stations: {}\n  \
            Audio: {}% vol, queue max {}\n  \
            Radio retries: {} (backoff {} .. {}, stable after {})\n  \
            Idle disconnect: {}\n  \
            Tools: {} / {} (timeout {})\n  \
            Radio Browser: {}",
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.stations_file.display(),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.radio_max_retries,
            humantime::format_duration(self.radio_retry_backoff),
            humantime::format_duration(self.radio_retry_backoff_max),
            humantime::format_duration(self.stream_stable_after),
            humantime::format_duration(self.idle_disconnect_after),
            self.ytdlp_path,
            self.ffmpeg_path,
            humantime::format_duration(self.extractor_timeout),
            self.radio_browser_url.as_deref().unwrap_or("desactivado"),
        )
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("stations_file", &self.stations_file)
            .field("default_volume", &self.default_volume)
            .field("max_queue_size", &self.max_queue_size)
            .field("radio_max_retries", &self.radio_max_retries)
            .field("idle_disconnect_after", &self.idle_disconnect_after)
            .finish_non_exhaustive()
    }
}
