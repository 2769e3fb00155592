use serenity::model::id::UserId;
use std::{path::PathBuf, time::Duration};

/// Who asked for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub name: String,
    pub id: UserId,
}

impl Requester {
    pub fn new(name: impl Into<String>, id: UserId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    /// Requester used for tracks pulled from the auto-playlist.
    pub fn autoplaylist() -> Self {
        Self {
            name: "AutoPlaylist".to_string(),
            id: UserId::new(1),
        }
    }
}

/// A resolved, playable item.
///
/// Descriptive fields never change after resolution; only `local_path` is
/// attached once the audio has been downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub url: String,
    pub duration: Duration,
    pub requester: Requester,
    pub local_path: Option<PathBuf>,
    pub thumbnail: Option<String>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        duration: Duration,
        requester: Requester,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration,
            requester,
            local_path: None,
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_local_path(mut self, path: PathBuf) -> Self {
        self.local_path = Some(path);
        self
    }

    /// Two tracks are the same request when they point at the same source.
    pub fn same_source(&self, other: &Track) -> bool {
        self.url == other.url
    }
}
