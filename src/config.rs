use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Paths
    pub data_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub autoplaylist_dir: PathBuf,

    // Herramientas externas
    pub ffmpeg_path: String,
    pub ytdlp_path: String,

    // Audio
    #[serde(with = "humantime_serde_compat")]
    pub progress_interval: Duration,
    #[serde(with = "humantime_serde_compat")]
    pub resolve_timeout: Duration,
    pub loudnorm_filter: String,
    pub sink_buffer_frames: usize,

    // Features
    pub auto_leave: bool,
    #[serde(with = "humantime_serde_compat")]
    pub auto_leave_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.downloads_dir)?;
        std::fs::create_dir_all(&config.autoplaylist_dir)?;

        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from any key lookup, falling back to the
    /// defaults for every optional key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let data_dir: PathBuf = var("DATA_DIR").map(Into::into).unwrap_or(defaults.data_dir);

        Ok(Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is required")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID is required")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Paths
            downloads_dir: var("DOWNLOADS_DIR")
                .map(Into::into)
                .unwrap_or_else(|| data_dir.join("downloads")),
            autoplaylist_dir: var("AUTOPLAYLIST_DIR")
                .map(Into::into)
                .unwrap_or_else(|| data_dir.join("autoplaylists")),
            data_dir,

            ffmpeg_path: var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),

            // Audio
            progress_interval: duration(var("PROGRESS_INTERVAL"), defaults.progress_interval)
                .context("PROGRESS_INTERVAL")?,
            resolve_timeout: duration(var("RESOLVE_TIMEOUT"), defaults.resolve_timeout)
                .context("RESOLVE_TIMEOUT")?,
            loudnorm_filter: var("LOUDNORM_FILTER").unwrap_or(defaults.loudnorm_filter),
            sink_buffer_frames: match var("SINK_BUFFER_FRAMES") {
                Some(value) => value.parse().context("SINK_BUFFER_FRAMES")?,
                None => defaults.sink_buffer_frames,
            },

            // Features
            auto_leave: match var("AUTO_LEAVE") {
                Some(value) => value.parse().context("AUTO_LEAVE must be true or false")?,
                None => defaults.auto_leave,
            },
            auto_leave_interval: duration(var("AUTO_LEAVE_INTERVAL"), defaults.auto_leave_interval)
                .context("AUTO_LEAVE_INTERVAL")?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Progress interval of at least 100ms (Discord rate limits edits)
    /// - Resolve timeout and auto-leave interval must be non-zero
    /// - Sink buffer must hold at least one frame
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval < Duration::from_millis(100) {
            anyhow::bail!(
                "Progress interval must be at least 100ms, got: {:?}",
                self.progress_interval
            );
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.sink_buffer_frames == 0 {
            anyhow::bail!("Sink buffer must hold at least one frame");
        }

        if self.auto_leave && self.auto_leave_interval.is_zero() {
            anyhow::bail!("Auto-leave interval must be greater than 0");
        }

        if self.loudnorm_filter.trim().is_empty() {
            anyhow::bail!("Loudness filter cannot be empty");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Paths: data {}, downloads {}, autoplaylists {}\n  \
            Tools: ffmpeg={}, yt-dlp={}\n  \
            Audio: progress every {}, resolve timeout {}, {} frame buffer\n  \
            Features: AutoLeave={} (every {})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.data_dir.display(),
            self.downloads_dir.display(),
            self.autoplaylist_dir.display(),
            self.ffmpeg_path,
            self.ytdlp_path,
            humantime::format_duration(self.progress_interval),
            humantime::format_duration(self.resolve_timeout),
            self.sink_buffer_frames,
            self.auto_leave,
            humantime::format_duration(self.auto_leave_interval),
        )
    }
}

fn duration(value: Option<String>, default: Duration) -> Result<Duration> {
    match value {
        Some(value) => Ok(humantime::parse_duration(value.trim())?),
        None => Ok(default),
    }
}

/// Durations serialise as humantime strings ("1s", "1h").
mod humantime_serde_compat {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
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

            // Path defaults
            data_dir: "/app/data".into(),
            downloads_dir: "/app/data/downloads".into(),
            autoplaylist_dir: "/app/data/autoplaylists".into(),

            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),

            // Audio defaults
            progress_interval: Duration::from_secs(1),
            resolve_timeout: Duration::from_secs(30),
            loudnorm_filter: "loudnorm=I=-16:LRA=11:TP=-1.5".to_string(),
            sink_buffer_frames: 16, // 320ms a 20ms por frame

            // Feature defaults
            auto_leave: true,
            auto_leave_interval: Duration::from_secs(3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn required_keys_only_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "token"),
            ("APPLICATION_ID", "1234"),
            ("DATA_DIR", "/srv/jukebox"),
        ]))
        .unwrap();

        assert_eq!(config.application_id, 1234);
        assert_eq!(config.guild_id, None);
        assert_eq!(config.downloads_dir, PathBuf::from("/srv/jukebox/downloads"));
        assert_eq!(config.autoplaylist_dir, PathBuf::from("/srv/jukebox/autoplaylists"));
        assert_eq!(config.progress_interval, Duration::from_secs(1));
        assert_eq!(config.resolve_timeout, Duration::from_secs(30));
        assert_eq!(config.sink_buffer_frames, 16);
        assert!(config.auto_leave);
        config.validate().unwrap();
    }

    #[test]
    fn durations_use_humantime() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "token"),
            ("APPLICATION_ID", "1"),
            ("PROGRESS_INTERVAL", "2s 500ms"),
            ("AUTO_LEAVE_INTERVAL", "30m"),
            ("AUTO_LEAVE", "false"),
        ]))
        .unwrap();

        assert_eq!(config.progress_interval, Duration::from_millis(2_500));
        assert_eq!(config.auto_leave_interval, Duration::from_secs(1_800));
        assert!(!config.auto_leave);
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = Config::from_lookup(lookup(&[("APPLICATION_ID", "1")])).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "token"),
            ("APPLICATION_ID", "1"),
            ("RESOLVE_TIMEOUT", "soon"),
        ]))
        .is_err());

        let config = Config {
            progress_interval: Duration::from_millis(10),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            sink_buffer_frames: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_never_contains_the_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("global"));
    }
}
