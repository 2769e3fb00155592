//! # Audio Module
//!
//! Playback core for a single voice session.
//!
//! ## Architecture
//!
//! ### [`queue`] - Track Queue
//! - Pending tracks, the current track and the "is playing" flag
//! - Short lock-protected mutations, never suspends
//!
//! ### [`session`] - Playback Session
//! - Plays one track from the start or a saved offset
//! - Pause gate, tagged cancellation, progress reporting
//!
//! ### [`orchestrator`] - Queue Orchestrator
//! - Single driver task that advances through the queue
//! - Public control surface used by the command layer
//!
//! ### [`continuity`] - Transport Continuity
//! - Follows channel moves and resumes from the saved position
//! - Goes idle on a forced disconnect
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed from ffmpeg, f32 towards songbird
//! - **Channels**: Stereo (2 channels)
//! - **Loudness**: EBU R128 normalisation in the decoder

pub mod continuity;
pub mod decoder;
pub mod orchestrator;
pub mod pcm;
pub mod queue;
pub mod session;
pub mod sink;
pub mod track;
pub mod transport;
