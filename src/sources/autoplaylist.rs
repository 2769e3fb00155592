use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::AutoPlaylistSource;

const ACTIVE_CONFIG: &str = "activeplaylist.config";
const EXTENSION: &str = "txt";

/// Whether `add` created a new list or appended to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistChange {
    Created,
    Updated,
}

/// Autoplaylists guardadas como archivos `.txt` (una URL por línea)
pub struct FileAutoPlaylist {
    dir: PathBuf,
}

impl FileAutoPlaylist {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' '));
        if !valid {
            anyhow::bail!("Invalid autoplaylist name '{name}'");
        }
        Ok(self.dir.join(format!("{name}.{EXTENSION}")))
    }

    /// Names of every list, alphabetical.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Name stored in the active-list config, if it still exists.
    pub async fn active(&self) -> Option<String> {
        let raw = tokio::fs::read_to_string(self.dir.join(ACTIVE_CONFIG)).await.ok()?;
        let name = raw.trim().to_string();
        let path = self.path_of(&name).ok()?;
        exists(&path).await.then_some(name)
    }

    pub async fn set_active(&self, name: &str) -> Result<()> {
        let path = self.path_of(name)?;
        if !exists(&path).await {
            anyhow::bail!("Autoplaylist '{name}' not found");
        }
        tokio::fs::write(self.dir.join(ACTIVE_CONFIG), name).await?;
        info!("📻 Autoplaylist activa: {}", name);
        Ok(())
    }

    /// Entries of a list, skipping blank lines and `#` comments.
    pub async fn show(&self, name: &str) -> Result<Vec<String>> {
        let path = self.path_of(name)?;
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Autoplaylist '{name}' not found"))?;
        Ok(entries(&raw))
    }

    /// Appends `url`, creating the list when it does not exist yet.
    pub async fn add(&self, name: &str, url: &str) -> Result<PlaylistChange> {
        let path = self.path_of(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let existed = exists(&path).await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("{}\n", url.trim()).as_bytes()).await?;
        file.flush().await?;

        Ok(if existed {
            PlaylistChange::Updated
        } else {
            PlaylistChange::Created
        })
    }

    async fn current_file(&self) -> Option<PathBuf> {
        if let Some(active) = self.active().await {
            return self.path_of(&active).ok();
        }
        let first = self.list().await.ok()?.into_iter().next()?;
        self.path_of(&first).ok()
    }
}

fn entries(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[async_trait]
impl AutoPlaylistSource for FileAutoPlaylist {
    async fn next_url(&self) -> Option<String> {
        let file = self.current_file().await?;
        let raw = match tokio::fs::read_to_string(&file).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("⚠️ No se pudo leer la autoplaylist {:?}: {}", file, e);
                return None;
            }
        };

        let urls = entries(&raw);
        let picked = urls.choose(&mut rand::thread_rng()).cloned();
        if picked.is_none() {
            warn!("⚠️ Autoplaylist sin URLs válidas: {:?}", file);
        }
        picked
    }
}
