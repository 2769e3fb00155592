//! Hand-written fakes for the voice, decoder and chat seams.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{
    path::{Path, PathBuf},
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, ReadBuf},
    sync::watch,
};

use crate::{
    audio::{
        decoder::{AudioDecoder, DecodedStream, ProcessHandle},
        sink::VoiceSink,
        track::{Requester, Track},
        transport::VoiceTransport,
    },
    error::{PlaybackError, SinkError},
    ui::chat::{ChatSurface, MessageHandle, OutgoingMessage},
};

pub const GUILD: GuildId = GuildId::new(10);
pub const VOICE: ChannelId = ChannelId::new(20);
pub const OTHER_VOICE: ChannelId = ChannelId::new(21);
pub const TEXT: ChannelId = ChannelId::new(30);

/// A track that is already downloaded, so no fetch happens.
pub fn track(title: &str, secs: u64) -> Track {
    Track::new(
        title,
        format!("https://youtu.be/{title}"),
        Duration::from_secs(secs),
        Requester::new("tester", UserId::new(7)),
    )
    .with_local_path(PathBuf::from(format!("/tmp/{title}.mp3")))
}

// ---------------------------------------------------------------- transport

struct SinkProbe {
    frames: AtomicUsize,
    disposed: watch::Sender<bool>,
}

pub struct FakeTransport {
    channel: Mutex<Option<(GuildId, ChannelId)>>,
    /// Frames a sink accepts before further writes block until disposal.
    capacity: Option<usize>,
    sinks: Mutex<Vec<Arc<SinkProbe>>>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    pub reconnects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl FakeTransport {
    pub fn connected() -> Self {
        Self::build(Some((GUILD, VOICE)), None)
    }

    pub fn disconnected() -> Self {
        Self::build(None, None)
    }

    /// Connected transport whose sinks stall after `frames` writes, like a
    /// saturated voice connection.
    pub fn saturating_after(frames: usize) -> Self {
        Self::build(Some((GUILD, VOICE)), Some(frames))
    }

    fn build(channel: Option<(GuildId, ChannelId)>, capacity: Option<usize>) -> Self {
        Self {
            channel: Mutex::new(channel),
            capacity,
            sinks: Mutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            reconnects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Tears down every open sink, as a transport drop would.
    pub fn dispose_sinks(&self) {
        for probe in self.sinks.lock().drain(..) {
            probe.disposed.send_replace(true);
        }
    }

    /// Highest number of sinks that were open at the same time.
    pub fn max_concurrent_sinks(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    fn is_connected(&self) -> bool {
        self.channel.lock().is_some()
    }

    fn current_channel(&self) -> Option<(GuildId, ChannelId)> {
        *self.channel.lock()
    }

    /// Replacing the connection kills the old one's sinks, like songbird does.
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
        if self.current_channel() == Some((guild_id, channel_id)) {
            return Ok(());
        }
        self.dispose_sinks();
        *self.channel.lock() = Some((guild_id, channel_id));
        Ok(())
    }

    async fn reconnect(&self, channel_id: ChannelId) -> Result<(), PlaybackError> {
        self.dispose_sinks();
        let mut channel = self.channel.lock();
        let (guild_id, _) = channel.ok_or_else(|| PlaybackError::Transport("not connected".into()))?;
        *channel = Some((guild_id, channel_id));
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self) -> Option<GuildId> {
        self.dispose_sinks();
        self.channel.lock().take().map(|(guild_id, _)| guild_id)
    }

    async fn leave(&self, _guild_id: GuildId) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn open_sink(&self) -> Result<Box<dyn VoiceSink>, SinkError> {
        if !self.is_connected() {
            return Err(SinkError::NotConnected);
        }
        let (disposed, _) = watch::channel(false);
        let probe = Arc::new(SinkProbe {
            frames: AtomicUsize::new(0),
            disposed,
        });
        self.sinks.lock().push(probe.clone());

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(FakeSink {
            probe,
            capacity: self.capacity,
            live: self.live.clone(),
        }))
    }
}

struct FakeSink {
    probe: Arc<SinkProbe>,
    capacity: Option<usize>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl VoiceSink for FakeSink {
    async fn write(&mut self, _frame: Bytes) -> Result<(), SinkError> {
        if *self.probe.disposed.borrow() {
            return Err(SinkError::Disposed);
        }
        if let Some(capacity) = self.capacity {
            if self.probe.frames.load(Ordering::SeqCst) >= capacity {
                let mut rx = self.probe.disposed.subscribe();
                let _ = rx.wait_for(|disposed| *disposed).await;
                return Err(SinkError::Disposed);
            }
        }
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn finish(&mut self) {}
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ------------------------------------------------------------------ decoder

/// Zeroed PCM; after `remaining` bytes either ends or never yields again.
struct SilenceReader {
    remaining: u64,
    stall: bool,
}

impl AsyncRead for SilenceReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.remaining == 0 {
            return if self.stall {
                Poll::Pending
            } else {
                Poll::Ready(Ok(()))
            };
        }
        let n = (buf.remaining() as u64).min(self.remaining) as usize;
        buf.initialize_unfilled_to(n).fill(0);
        buf.advance(n);
        self.remaining -= n as u64;
        Poll::Ready(Ok(()))
    }
}

struct FakeProcess {
    terminated: Arc<AtomicUsize>,
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    async fn terminate(&mut self) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeDecoder {
    bytes: u64,
    stall: bool,
    fail: bool,
    opened: Mutex<Vec<(PathBuf, Duration)>>,
    terminated: Arc<AtomicUsize>,
}

impl FakeDecoder {
    /// Every stream yields `bytes` of PCM and then ends.
    pub fn finite(bytes: u64) -> Self {
        Self::build(bytes, false, false)
    }

    /// Every stream yields `bytes` of PCM and then stays silent forever,
    /// like an ffmpeg that is still running.
    pub fn stalling(bytes: u64) -> Self {
        Self::build(bytes, true, false)
    }

    pub fn failing() -> Self {
        Self::build(0, false, true)
    }

    fn build(bytes: u64, stall: bool, fail: bool) -> Self {
        Self {
            bytes,
            stall,
            fail,
            opened: Mutex::new(Vec::new()),
            terminated: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> Vec<(PathBuf, Duration)> {
        self.opened.lock().clone()
    }

    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioDecoder for FakeDecoder {
    async fn open(&self, source: &Path, start: Duration) -> Result<DecodedStream, PlaybackError> {
        self.opened.lock().push((source.to_path_buf(), start));
        if self.fail {
            return Err(PlaybackError::DecodeLaunch(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ffmpeg",
            )));
        }
        Ok(DecodedStream {
            reader: Box::pin(SilenceReader {
                remaining: self.bytes,
                stall: self.stall,
            }),
            handle: Box::new(FakeProcess {
                terminated: self.terminated.clone(),
            }),
        })
    }
}

// --------------------------------------------------------------------- chat

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Sent(String),
    Edited(String),
    Deleted,
    Listening(Option<String>),
}

#[derive(Default)]
pub struct FakeChat {
    events: Mutex<Vec<ChatEvent>>,
    next_id: AtomicUsize,
}

impl FakeChat {
    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().clone()
    }

    pub fn edits(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::Edited(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::Sent(content) => Some(content),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatSurface for FakeChat {
    async fn send(&self, channel_id: ChannelId, message: OutgoingMessage) -> Result<MessageHandle> {
        self.events.lock().push(ChatEvent::Sent(message.content));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        Ok(MessageHandle {
            channel_id,
            message_id: MessageId::new(id),
        })
    }

    async fn edit(&self, _handle: &MessageHandle, message: OutgoingMessage) -> Result<()> {
        self.events.lock().push(ChatEvent::Edited(message.content));
        Ok(())
    }

    async fn delete(&self, _handle: &MessageHandle) -> Result<()> {
        self.events.lock().push(ChatEvent::Deleted);
        Ok(())
    }

    async fn set_listening(&self, title: Option<String>) {
        self.events.lock().push(ChatEvent::Listening(title));
    }
}
