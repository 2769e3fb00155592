use thiserror::Error;

/// Failures that stop a single track from playing.
///
/// The orchestrator logs these and moves on to the next track; none of them
/// is allowed to wedge the queue.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("could not resolve '{0}'")]
    Resolution(String),

    #[error("could not download '{title}': {reason}")]
    Acquisition { title: String, reason: String },

    #[error("could not launch decoder: {0}")]
    DecodeLaunch(#[source] std::io::Error),

    #[error("voice transport failure: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors reported by a voice sink write.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The sink was torn down out of band (channel move, forced disconnect).
    #[error("voice sink disposed")]
    Disposed,

    #[error("not connected to a voice channel")]
    NotConnected,
}
