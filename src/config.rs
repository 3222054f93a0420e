use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::{engine::Volumes, player::PlaybackSettings};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Paths
    pub music_dir: PathBuf,
    pub effects_dir: PathBuf,
    pub data_dir: PathBuf,
    pub ffmpeg_path: PathBuf,

    // Audio
    pub music_volume: u8,   // 0-100
    pub effects_volume: u8, // 0-100
    pub connect_timeout: Duration,
    pub fade_in_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una fuente de variables.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            // Paths
            music_dir: var_or("MUSIC_DIR", "storage/music").into(),
            effects_dir: var_or("EFFECTS_DIR", "storage/effects").into(),
            data_dir: var_or("DATA_DIR", "storage/data").into(),
            ffmpeg_path: var_or("FFMPEG_PATH", "ffmpeg").into(),

            // Audio
            music_volume: var_or("MUSIC_VOLUME", "85")
                .parse()
                .context("MUSIC_VOLUME inválido")?,
            effects_volume: var_or("EFFECTS_VOLUME", "90")
                .parse()
                .context("EFFECTS_VOLUME inválido")?,
            connect_timeout: humantime::parse_duration(&var_or("CONNECT_TIMEOUT", "20s"))
                .context("CONNECT_TIMEOUT inválido")?,
            fade_in_ms: var_or("FADE_IN_MS", "50")
                .parse()
                .context("FADE_IN_MS inválido")?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volumes must be between 0 and 100
    /// - Connect timeout must be greater than zero
    /// - Fade-in cannot exceed one second
    pub fn validate(&self) -> Result<()> {
        if self.music_volume > 100 {
            anyhow::bail!("Music volume must be between 0 and 100, got: {}", self.music_volume);
        }

        if self.effects_volume > 100 {
            anyhow::bail!("Effects volume must be between 0 and 100, got: {}", self.effects_volume);
        }

        if self.connect_timeout.is_zero() {
            anyhow::bail!("Connect timeout must be greater than 0");
        }

        if self.fade_in_ms > 1000 {
            anyhow::bail!("Fade-in cannot exceed 1000ms, got: {}", self.fade_in_ms);
        }

        Ok(())
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: música {}%, efectos {}%, fade-in {}ms, timeout {}\n  \
            Paths: música={}, efectos={}, datos={}, ffmpeg={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.music_volume,
            self.effects_volume,
            self.fade_in_ms,
            humantime::format_duration(self.connect_timeout),
            self.music_dir.display(),
            self.effects_dir.display(),
            self.data_dir.display(),
            self.ffmpeg_path.display(),
        )
    }
}

impl From<&Config> for PlaybackSettings {
    fn from(config: &Config) -> Self {
        Self {
            volumes: Volumes {
                music: config.music_volume,
                effects: config.effects_volume,
            },
            connect_timeout: config.connect_timeout,
        }
    }
}
