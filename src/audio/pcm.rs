//! Fixed PCM format produced by the decoder and the conversions around it.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;
pub const BYTES_PER_SAMPLE: u32 = 2;
pub const BYTES_PER_SECOND: u64 = (SAMPLE_RATE * CHANNELS * BYTES_PER_SAMPLE) as u64;

/// 20 ms of stereo s16le audio.
pub const FRAME_BYTES: usize = (BYTES_PER_SECOND / 50) as usize;

pub fn position_to_duration(bytes: u64) -> Duration {
    Duration::from_millis(bytes * 1000 / BYTES_PER_SECOND)
}

/// Byte offset for a duration, aligned down to a whole sample frame so a
/// resumed stream never starts mid-sample.
pub fn duration_to_position(duration: Duration) -> u64 {
    let raw = duration.as_millis() as u64 * BYTES_PER_SECOND / 1000;
    let align = (CHANNELS * BYTES_PER_SAMPLE) as u64;
    raw - raw % align
}

/// `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// `hh:mm:ss.mmm`, the form ffmpeg accepts for `-ss`.
pub fn seek_timestamp(offset: Duration) -> String {
    let total = offset.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
        offset.subsec_millis()
    )
}

/// Converts interleaved s16le into the f32le layout songbird's raw input
/// expects. A trailing odd byte is dropped.
pub fn encode_f32le(pcm: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(pcm.len() * 2);
    for sample in pcm.chunks_exact(2) {
        let value = i16::from_le_bytes([sample[0], sample[1]]);
        out.put_f32_le(f32::from(value) / 32768.0);
    }
    out.freeze()
}
