use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::TrackResolver;
use crate::{
    audio::track::{Requester, Track},
    error::PlaybackError,
};

/// Información extraída de yt-dlp (`-j`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    /// Flat playlist entries only carry `url`.
    url: Option<String>,
}

impl YtDlpInfo {
    fn into_track(self, requester: &Requester) -> Option<Track> {
        let url = self
            .webpage_url
            .or(self.url)
            .or_else(|| self.id.map(|id| format!("https://www.youtube.com/watch?v={id}")))?;
        let title = self.title.unwrap_or_else(|| url.clone());
        let duration = self
            .duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_default();

        Some(Track::new(title, url, duration, requester.clone()).with_thumbnail(self.thumbnail))
    }
}

/// One JSON object per line, as printed by `yt-dlp -j`. Lines that do not
/// parse (warnings, partial output) are skipped.
fn parse_lines(stdout: &str, requester: &Requester) -> Vec<Track> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => info.into_track(requester),
            Err(e) => {
                debug!("Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}

fn is_direct_url(query: &str) -> bool {
    Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Resolver de metadata usando yt-dlp
pub struct YtDlpResolver {
    binary: PathBuf,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    permits: Semaphore,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            permits: Semaphore::new(3),
        }
    }

    async fn run(&self, query: &str, args: &[&str]) -> Result<String, PlaybackError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PlaybackError::Resolution(query.to_string()))?;

        let output = Command::new(&self.binary)
            .args(args)
            .arg("--no-warnings")
            .arg(query)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("⚠️ No se pudo ejecutar yt-dlp: {:?}", e);
                return Err(PlaybackError::Resolution(query.to_string()));
            }
            Err(_) => {
                warn!("⏱️ yt-dlp excedió {:?} resolviendo '{}'", self.timeout, query);
                return Err(PlaybackError::Resolution(query.to_string()));
            }
        };

        if !output.status.success() {
            warn!(
                "⚠️ yt-dlp falló para '{}': {}",
                query,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(PlaybackError::Resolution(query.to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Track, PlaybackError> {
        let target = if is_direct_url(query) {
            query.to_string()
        } else {
            info!("🔍 Buscando en YouTube: {}", query);
            format!("ytsearch1:{query}")
        };

        let stdout = self.run(&target, &["-j", "--no-playlist"]).await?;
        parse_lines(&stdout, requester)
            .into_iter()
            .next()
            .ok_or_else(|| PlaybackError::Resolution(query.to_string()))
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        requester: &Requester,
    ) -> Result<Vec<Track>, PlaybackError> {
        info!("📜 Resolviendo playlist: {}", url);
        let stdout = self.run(url, &["-j", "--flat-playlist"]).await?;
        let tracks = parse_lines(&stdout, requester);
        if tracks.is_empty() {
            return Err(PlaybackError::Resolution(url.to_string()));
        }
        Ok(tracks)
    }
}
