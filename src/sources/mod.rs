//! # Sources
//!
//! Collaborators that turn user requests into playable local audio:
//! metadata resolution and download through yt-dlp, and the file-backed
//! auto-playlist used when the queue runs dry.

pub mod autoplaylist;
pub mod download;
pub mod ytdlp;

use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

use crate::{
    audio::track::{Requester, Track},
    error::PlaybackError,
};

pub use autoplaylist::FileAutoPlaylist;
pub use download::YtDlpDownloader;
pub use ytdlp::YtDlpResolver;

/// Resuelve búsquedas y URLs a tracks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// A direct URL or free-text search, resolved to its best match.
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Track, PlaybackError>;

    /// Every entry of a playlist URL, in playlist order.
    async fn resolve_playlist(
        &self,
        url: &str,
        requester: &Requester,
    ) -> Result<Vec<Track>, PlaybackError>;
}

/// Descarga el audio de un track a disco
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Path of a local, decodable file for `url`. Calling it again for an
    /// already fetched title returns the same file without refetching.
    async fn fetch(&self, url: &str, title: &str) -> Result<PathBuf, PlaybackError>;
}

/// Fuente alternativa cuando la cola está vacía
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutoPlaylistSource: Send + Sync {
    async fn next_url(&self) -> Option<String>;
}

/// Whether `query` points at a playlist rather than a single video.
pub fn is_playlist_url(query: &str) -> bool {
    let Ok(url) = Url::parse(query) else {
        return false;
    };
    url.path() == "/playlist" || url.query_pairs().any(|(key, _)| key == "list")
}
