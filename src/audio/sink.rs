use async_trait::async_trait;
use bytes::{Buf, Bytes};
use songbird::tracks::TrackHandle;
use std::{
    io::{self, Read, Seek, SeekFrom},
    time::Duration,
};
use symphonia::core::io::MediaSource;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SinkError;

/// Single-writer destination for encoded audio frames.
///
/// `write` suspends while the transport is saturated, which is what keeps
/// the playback loop at real-time pace.
#[async_trait]
pub trait VoiceSink: Send {
    async fn write(&mut self, frame: Bytes) -> Result<(), SinkError>;

    /// Lets already-buffered audio play out, then releases the sink.
    async fn finish(&mut self);
}

/// Bytes of f32 stereo silence handed to the mixer on an underrun (20 ms).
const SILENCE_BYTES: usize = 960 * 2 * 4;

/// Reader half of a sink, polled by songbird's mixer.
///
/// Never blocks: an empty channel yields a short run of silence so a paused
/// or slow producer does not stall the mixer thread. A disconnected, drained
/// channel reads as end of stream.
pub struct ChannelSource {
    rx: flume::Receiver<Bytes>,
    pending: Bytes,
}

impl ChannelSource {
    pub fn new(rx: flume::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
        }
    }
}

impl Read for ChannelSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.pending.has_remaining() {
            match self.rx.try_recv() {
                Ok(frame) => self.pending = frame,
                Err(flume::TryRecvError::Empty) => {
                    let n = buf.len().min(SILENCE_BYTES) & !7;
                    let n = if n == 0 { buf.len() } else { n };
                    buf[..n].fill(0);
                    return Ok(n);
                }
                Err(flume::TryRecvError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.remaining());
        self.pending.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

impl Seek for ChannelSource {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "live PCM stream"))
    }
}

impl MediaSource for ChannelSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Writer half feeding a songbird track through a bounded channel.
pub struct SongbirdSink {
    tx: flume::Sender<Bytes>,
    track: TrackHandle,
    disposed: CancellationToken,
}

impl SongbirdSink {
    pub fn new(tx: flume::Sender<Bytes>, track: TrackHandle, disposed: CancellationToken) -> Self {
        Self {
            tx,
            track,
            disposed,
        }
    }
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn write(&mut self, frame: Bytes) -> Result<(), SinkError> {
        tokio::select! {
            biased;
            _ = self.disposed.cancelled() => Err(SinkError::Disposed),
            sent = self.tx.send_async(frame) => sent.map_err(|_| SinkError::Disposed),
        }
    }

    async fn finish(&mut self) {
        while !self.tx.is_empty() && !self.tx.is_disconnected() {
            tokio::select! {
                _ = self.disposed.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
        }
    }
}

impl Drop for SongbirdSink {
    fn drop(&mut self) {
        if let Err(e) = self.track.stop() {
            debug!("track ya detenido: {:?}", e);
        }
    }
}
