//! Texto de las respuestas del bot.

use std::time::Duration;

use crate::audio::{
    orchestrator::ControlOutcome,
    pcm::format_duration,
    track::Track,
};

pub const NOT_IN_VOICE_CHANNEL: &str = "You need to be in a voice channel";
pub const FAILED_TO_JOIN: &str = "Failed to join voice channel";
pub const PROVIDE_QUERY: &str = "Please provide a YouTube URL or search term";
pub const COULD_NOT_PROCESS: &str = "Could not find or process the track";
pub const NOTHING_PLAYING: &str = "Nothing is currently playing";
pub const COMMAND_ERROR: &str = "An error occurred while executing the command.";
pub const LEFT_CHANNEL: &str = "Left the voice channel";

/// Pending entries listed before the "... and N more" line.
const QUEUE_PREVIEW: usize = 10;

pub fn added_to_queue(track: &Track) -> String {
    format!("Added to queue: {}", track.title)
}

pub fn added_to_front(track: &Track) -> String {
    format!("Added to front of queue: {}", track.title)
}

pub fn now_playing_immediate(track: &Track) -> String {
    format!("Now playing: {}", track.title)
}

pub fn playlist_added(count: usize) -> String {
    format!("Added {count} tracks from playlist to queue")
}

pub fn joined(channel: impl std::fmt::Display) -> String {
    format!("Joined {channel}")
}

/// Elapsed time shown for a track, never past its length.
pub fn clamp_elapsed(elapsed: Duration, total: Duration) -> Duration {
    if total.is_zero() {
        elapsed
    } else {
        elapsed.min(total)
    }
}

/// The live "now playing" line that the progress reporter keeps editing.
pub fn now_playing(track: &Track, elapsed: Duration, paused: bool) -> String {
    let mut line = format!(
        "**Now Playing:** [{}](<{}>) (requested by {}) `{} / {}`",
        track.title,
        track.url,
        track.requester.name,
        format_duration(clamp_elapsed(elapsed, track.duration)),
        format_duration(track.duration),
    );
    if paused {
        line.push_str(" **[PAUSED]**");
    }
    line
}

pub fn queue_listing(current: Option<(&Track, Duration)>, pending: &[Track]) -> String {
    if current.is_none() && pending.is_empty() {
        return "Queue is empty".to_string();
    }

    let mut out = String::from("**Queue:**\n");
    if let Some((track, elapsed)) = current {
        out.push_str(&format!(
            "**Now Playing:** {} (requested by {}) `{} / {}`\n\n",
            track.title,
            track.requester.name,
            format_duration(clamp_elapsed(elapsed, track.duration)),
            format_duration(track.duration),
        ));
    }

    if !pending.is_empty() {
        out.push_str("**Up Next:**\n");
        for (i, track) in pending.iter().take(QUEUE_PREVIEW).enumerate() {
            out.push_str(&format!(
                "{}. {} (requested by {})\n",
                i + 1,
                track.title,
                track.requester.name
            ));
        }
        if pending.len() > QUEUE_PREVIEW {
            out.push_str(&format!("... and {} more tracks", pending.len() - QUEUE_PREVIEW));
        }
    }

    out.trim_end().to_string()
}

/// Reply for a control command. `actor` is who pressed it, used by skip.
pub fn control_reply(outcome: &ControlOutcome, actor: &str) -> String {
    match outcome {
        ControlOutcome::Paused => "Playback paused".to_string(),
        ControlOutcome::AlreadyPaused => "Playback is already paused".to_string(),
        ControlOutcome::Resumed => "Playback resumed".to_string(),
        ControlOutcome::NotPaused => "Playback is not paused".to_string(),
        ControlOutcome::NothingPlaying => NOTHING_PLAYING.to_string(),
        ControlOutcome::Skipped(track) => format!("{} skipped by {}", track.title, actor),
        ControlOutcome::Cleared(_) => "Queue cleared".to_string(),
        ControlOutcome::Shuffled => "Queue shuffled".to_string(),
        ControlOutcome::QueueEmpty => "Queue is empty".to_string(),
    }
}

pub fn help(prefix: &str) -> String {
    [
        format!("**{prefix}join** - Join your voice channel"),
        format!("**{prefix}play** `<query>` - Play a song from a YouTube URL/search term or add an entire playlist"),
        format!("**{prefix}playnext** `<query>` - Add a song to the front of the queue"),
        format!("**{prefix}playnow** `<query>` - Play a song immediately, skipping the current track"),
        format!("**{prefix}skip** - Skip the current song"),
        format!("**{prefix}pause** / **{prefix}resume** - Pause or resume playback"),
        format!("**{prefix}queue** - Show the current queue"),
        format!("**{prefix}clear** - Clear the queue"),
        format!("**{prefix}shuffle** - Shuffle the queue"),
        format!("**{prefix}autoplaylist** `list|show|set|add` - Manage autoplaylists"),
        format!("**{prefix}leave** - Leave the voice channel"),
    ]
    .join("\n")
}
