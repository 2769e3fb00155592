use async_trait::async_trait;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    pin::Pin,
    process::Stdio,
    time::Duration,
};
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use super::pcm::{seek_timestamp, CHANNELS, SAMPLE_RATE};
use crate::error::PlaybackError;

/// Lifecycle hook for whatever produces a decoded stream.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Stops the producer if it is still running and reaps it.
    async fn terminate(&mut self);
}

#[async_trait]
impl ProcessHandle for tokio::process::Child {
    async fn terminate(&mut self) {
        if let Ok(Some(_)) = self.try_wait() {
            return;
        }
        if let Err(e) = self.start_kill() {
            debug!("ffmpeg ya terminó: {:?}", e);
        }
        if let Err(e) = self.wait().await {
            warn!("⚠️ No se pudo esperar a ffmpeg: {:?}", e);
        }
    }
}

/// Raw PCM (48 kHz, stereo, s16le) plus the handle of its producer.
pub struct DecodedStream {
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
    pub handle: Box<dyn ProcessHandle>,
}

/// Turns a local audio file into the fixed PCM format, optionally seeking.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    async fn open(&self, source: &Path, start: Duration) -> Result<DecodedStream, PlaybackError>;
}

/// ffmpeg child process writing loudness-normalised PCM to stdout.
pub struct FfmpegDecoder {
    binary: PathBuf,
    filter: String,
}

impl FfmpegDecoder {
    pub fn new(binary: impl Into<PathBuf>, filter: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            filter: filter.into(),
        }
    }
}

/// Argument list for one decode. The seek goes before `-i` so ffmpeg jumps
/// in the input instead of decoding and discarding.
pub fn ffmpeg_args(source: &Path, start: Duration, filter: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(14);
    if !start.is_zero() {
        args.push("-ss".into());
        args.push(seek_timestamp(start).into());
    }
    args.push("-i".into());
    args.push(source.as_os_str().to_os_string());
    args.push("-af".into());
    args.push(filter.into());
    args.push("-ac".into());
    args.push(CHANNELS.to_string().into());
    args.push("-f".into());
    args.push("s16le".into());
    args.push("-ar".into());
    args.push(SAMPLE_RATE.to_string().into());
    args.push("pipe:1".into());
    args
}

#[async_trait]
impl AudioDecoder for FfmpegDecoder {
    async fn open(&self, source: &Path, start: Duration) -> Result<DecodedStream, PlaybackError> {
        debug!("🎚️ Lanzando ffmpeg para {:?} desde {:?}", source, start);

        let mut child = tokio::process::Command::new(&self.binary)
            .args(ffmpeg_args(source, start, &self.filter))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(PlaybackError::DecodeLaunch)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            PlaybackError::DecodeLaunch(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "ffmpeg stdout not captured",
            ))
        })?;

        Ok(DecodedStream {
            reader: Box::pin(stdout),
            handle: Box::new(child),
        })
    }
}
