use async_process::Command;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::AudioFetcher;
use crate::error::PlaybackError;

const MAX_FILENAME_CHARS: usize = 100;

/// File name for a track title: no path separators, reserved characters or
/// quotes, no leading/trailing dots or spaces, at most 100 characters.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '\''))
        .take(MAX_FILENAME_CHARS)
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "track".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Descarga audio con yt-dlp a un directorio local
pub struct YtDlpDownloader {
    binary: PathBuf,
    dir: PathBuf,
}

impl YtDlpDownloader {
    pub fn new(binary: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            dir: dir.into(),
        }
    }

    pub fn target_path(&self, title: &str) -> PathBuf {
        self.dir.join(format!("{}.mp3", sanitize_filename(title)))
    }

    fn failure(title: &str, reason: impl Into<String>) -> PlaybackError {
        PlaybackError::Acquisition {
            title: title.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AudioFetcher for YtDlpDownloader {
    async fn fetch(&self, url: &str, title: &str) -> Result<PathBuf, PlaybackError> {
        let target = self.target_path(title);
        if exists(&target).await {
            debug!("📁 Ya descargado: {:?}", target);
            return Ok(target);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        info!("⬇️ Descargando '{}' desde {}", title, url);

        let output = Command::new(&self.binary)
            .args(["-f", "bestaudio", "--extract-audio", "--audio-format", "mp3", "-o"])
            .arg(&target)
            .args(["--no-playlist", "--no-warnings"])
            .arg(url)
            .output()
            .await
            .map_err(|e| Self::failure(title, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("⚠️ yt-dlp no pudo descargar '{}': {}", title, stderr.trim());
            return Err(Self::failure(title, format!("yt-dlp exited with {}", output.status)));
        }

        if !exists(&target).await {
            return Err(Self::failure(title, "yt-dlp produced no file"));
        }

        info!("✅ Descarga completa: {:?}", target);
        Ok(target)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
