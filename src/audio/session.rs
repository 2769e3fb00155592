//! Playback of a single track into the voice sink.
//!
//! A [`PlaybackSession`] is long lived, but each call to
//! [`PlaybackSession::play`] drives exactly one track from its start (or a
//! saved resume offset) until the decoder runs dry or the run is cancelled.
//! Runs are serialised: a second `play` waits for the first to unwind.

use parking_lot::Mutex;
use serenity::model::id::ChannelId;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{io::AsyncReadExt, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    decoder::{AudioDecoder, DecodedStream},
    pcm::{self, FRAME_BYTES},
    sink::VoiceSink,
    track::Track,
    transport::VoiceTransport,
};
use crate::{
    error::{PlaybackError, SinkError},
    sources::AudioFetcher,
    ui::{
        chat::{ChatSurface, MessageHandle, OutgoingMessage, PlaybackControls},
        messages,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Paused,
    Cancelling,
    Finished,
}

/// Why a run was cancelled. The two causes recover differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Skip, play-now, shutdown, disconnect: the position is discarded.
    Deliberate,
    /// Transport loss: the position is kept for a resume of the same track.
    Disruptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Completed,
    Cancelled(CancelReason),
}

/// Cancellation for one run. The first reason recorded wins; later
/// requests with another reason are ignored.
#[derive(Debug, Default)]
struct CancelSignal {
    token: CancellationToken,
    reason: Mutex<Option<CancelReason>>,
}

impl CancelSignal {
    fn trigger(&self, reason: CancelReason) -> bool {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
        }
        self.token.cancel();
        true
    }

    fn reason(&self) -> CancelReason {
        self.reason.lock().unwrap_or(CancelReason::Deliberate)
    }
}

/// Single-slot gate in front of every sink write.
struct PauseGate {
    paused: watch::Sender<bool>,
}

impl PauseGate {
    fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }

    fn close(&self) -> bool {
        self.paused.send_if_modified(|paused| !std::mem::replace(paused, true))
    }

    fn open(&self) -> bool {
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false))
    }

    fn reset(&self) {
        self.paused.send_replace(false);
    }

    fn is_closed(&self) -> bool {
        *self.paused.borrow()
    }

    async fn wait_open(&self) {
        let mut rx = self.paused.subscribe();
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

#[derive(Debug, Clone)]
struct ResumePoint {
    track: Track,
    position: u64,
}

enum PumpEnd {
    Exhausted,
    Cancelled,
}

/// Collaborators a session talks to.
pub struct SessionDeps {
    pub fetcher: Arc<dyn AudioFetcher>,
    pub decoder: Arc<dyn AudioDecoder>,
    pub transport: Arc<dyn VoiceTransport>,
    pub chat: Arc<dyn ChatSurface>,
}

pub struct PlaybackSession {
    fetcher: Arc<dyn AudioFetcher>,
    decoder: Arc<dyn AudioDecoder>,
    transport: Arc<dyn VoiceTransport>,
    chat: Arc<dyn ChatSurface>,
    progress_interval: Duration,

    state: watch::Sender<SessionState>,
    position: Arc<AtomicU64>,
    pause: PauseGate,
    /// Held for the whole of a run; at most one track streams at a time.
    run_lock: tokio::sync::Mutex<()>,
    cancel: Mutex<Option<Arc<CancelSignal>>>,
    resume_point: Mutex<Option<ResumePoint>>,

    message_channel: Mutex<Option<ChannelId>>,
    display: Arc<tokio::sync::Mutex<Option<MessageHandle>>>,
}

impl PlaybackSession {
    pub fn new(deps: SessionDeps, progress_interval: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            fetcher: deps.fetcher,
            decoder: deps.decoder,
            transport: deps.transport,
            chat: deps.chat,
            progress_interval,
            state,
            position: Arc::new(AtomicU64::new(0)),
            pause: PauseGate::new(),
            run_lock: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(None),
            resume_point: Mutex::new(None),
            message_channel: Mutex::new(None),
            display: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Bytes of PCM delivered for the current (or last) track, including
    /// any resume offset it started from.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        pcm::position_to_duration(self.position())
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_closed()
    }

    pub fn set_message_channel(&self, channel_id: ChannelId) {
        *self.message_channel.lock() = Some(channel_id);
    }

    /// Prepares the cancellation signal for the next run ahead of time, so a
    /// cancel issued between choosing a track and calling `play` still lands.
    pub fn arm(&self) {
        *self.cancel.lock() = Some(Arc::new(CancelSignal::default()));
    }

    pub fn disarm(&self) {
        *self.cancel.lock() = None;
    }

    /// Cancels the armed or running run. Returns `false` when there is none
    /// or it already carries a reason.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let signal = self.cancel.lock().clone();
        match signal {
            Some(signal) => {
                let accepted = signal.trigger(reason);
                if accepted {
                    debug!("🛑 Cancelación {:?} solicitada", reason);
                }
                accepted
            }
            None => false,
        }
    }

    /// Returns `true` if this call paused playback.
    pub fn pause(&self) -> bool {
        self.pause.close()
    }

    /// Returns `true` if this call resumed playback.
    pub fn resume(&self) -> bool {
        self.pause.open()
    }

    /// Waits until no run is in progress.
    pub async fn wait_idle(&self) {
        drop(self.run_lock.lock().await);
    }

    /// Track that was cut by a transport disruption and can be resumed.
    pub fn interrupted_track(&self) -> Option<Track> {
        self.resume_point.lock().as_ref().map(|rp| rp.track.clone())
    }

    pub fn discard_resume(&self) {
        self.resume_point.lock().take();
    }

    pub fn mark_idle(&self) {
        self.state.send_replace(SessionState::Idle);
    }

    /// Removes the now-playing message and clears the presence.
    pub async fn cleanup_display(&self) {
        let handle = self.display.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = self.chat.delete(&handle).await {
                warn!("⚠️ No se pudo borrar el mensaje de reproducción: {:?}", e);
            }
        }
        self.chat.set_listening(None).await;
    }

    /// Plays `track` to the end or until cancelled.
    pub async fn play(&self, mut track: Track) -> Result<PlayOutcome, PlaybackError> {
        let _run = self.run_lock.lock().await;

        let signal = self
            .cancel
            .lock()
            .get_or_insert_with(|| Arc::new(CancelSignal::default()))
            .clone();
        // Una pausa pedida durante la interrupción sigue valiendo al reanudar
        if !self.resumes(&track) {
            self.pause.reset();
        }
        self.state.send_replace(SessionState::Starting);

        let result = self.run(&mut track, &signal).await;

        *self.cancel.lock() = None;
        self.state.send_replace(SessionState::Finished);

        match &result {
            Ok(PlayOutcome::Completed) => info!("✅ Terminó: {}", track.title),
            Ok(PlayOutcome::Cancelled(reason)) => {
                info!("⏹️ Cancelado ({:?}): {} en {:?}", reason, track.title, self.elapsed())
            }
            Err(e) => error!("❌ No se pudo reproducir {}: {}", track.title, e),
        }
        result
    }

    async fn run(&self, track: &mut Track, signal: &CancelSignal) -> Result<PlayOutcome, PlaybackError> {
        let start = self.take_resume_offset(track);
        self.position.store(start, Ordering::SeqCst);

        if signal.token.is_cancelled() {
            return Ok(self.unwind(track, signal));
        }

        let path = match track.local_path.clone() {
            Some(path) => path,
            None => {
                let fetched = tokio::select! {
                    _ = signal.token.cancelled() => return Ok(self.unwind(track, signal)),
                    fetched = self.fetcher.fetch(&track.url, &track.title) => fetched?,
                };
                track.local_path = Some(fetched.clone());
                fetched
            }
        };

        self.announce(track).await;

        let offset = pcm::position_to_duration(start);
        let mut stream = tokio::select! {
            _ = signal.token.cancelled() => return Ok(self.unwind(track, signal)),
            opened = self.decoder.open(&path, offset) => opened?,
        };

        let mut sink = match self.transport.open_sink().await {
            Ok(sink) => sink,
            Err(e) => {
                // Sin canal no hay dónde reanudar
                warn!("⚠️ No se pudo abrir el sink de voz: {}", e);
                signal.trigger(CancelReason::Deliberate);
                stream.handle.terminate().await;
                return Ok(self.unwind(track, signal));
            }
        };

        info!("🎵 Reproduciendo: {} desde {}", track.title, pcm::format_duration(offset));
        self.state.send_replace(SessionState::Streaming);

        let progress_stop = signal.token.child_token();
        let progress = self.spawn_progress(track.clone(), progress_stop.clone());

        let end = self.pump(&mut stream, sink.as_mut(), signal).await;

        let outcome = match end {
            PumpEnd::Exhausted => {
                tokio::select! {
                    _ = signal.token.cancelled() => {}
                    _ = sink.finish() => {}
                }
                stream.handle.terminate().await;
                if signal.token.is_cancelled() {
                    self.unwind(track, signal)
                } else {
                    self.resume_point.lock().take();
                    PlayOutcome::Completed
                }
            }
            PumpEnd::Cancelled => {
                stream.handle.terminate().await;
                self.unwind(track, signal)
            }
        };

        progress_stop.cancel();
        if let Err(e) = progress.await {
            warn!("⚠️ El reporte de progreso terminó con error: {:?}", e);
        }

        Ok(outcome)
    }

    /// Moves frames from the decoder to the sink until the decoder runs dry
    /// or the run is cancelled.
    async fn pump(
        &self,
        stream: &mut DecodedStream,
        sink: &mut dyn VoiceSink,
        signal: &CancelSignal,
    ) -> PumpEnd {
        let mut buf = vec![0u8; FRAME_BYTES];

        loop {
            let read = tokio::select! {
                biased;
                _ = signal.token.cancelled() => return PumpEnd::Cancelled,
                read = read_frame(&mut stream.reader, &mut buf) => read,
            };
            let n = match read {
                Ok(0) => return PumpEnd::Exhausted,
                Ok(n) => n,
                Err(e) => {
                    warn!("⚠️ Error leyendo del decodificador: {:?}", e);
                    return PumpEnd::Exhausted;
                }
            };

            if self.pause.is_closed() {
                self.state.send_replace(SessionState::Paused);
                tokio::select! {
                    biased;
                    _ = signal.token.cancelled() => return PumpEnd::Cancelled,
                    _ = self.pause.wait_open() => {}
                }
                self.state.send_replace(SessionState::Streaming);
            }

            let frame = pcm::encode_f32le(&buf[..n]);
            let written = tokio::select! {
                biased;
                _ = signal.token.cancelled() => return PumpEnd::Cancelled,
                written = sink.write(frame) => written,
            };

            match written {
                Ok(()) => {
                    self.position.fetch_add(n as u64, Ordering::SeqCst);
                }
                Err(SinkError::Disposed) | Err(SinkError::NotConnected) => {
                    info!("🔌 Sink de voz descartado a mitad de la reproducción");
                    signal.trigger(CancelReason::Disruptive);
                    return PumpEnd::Cancelled;
                }
            }
        }
    }

    /// Records the outcome of a cancelled run.
    fn unwind(&self, track: &Track, signal: &CancelSignal) -> PlayOutcome {
        self.state.send_replace(SessionState::Cancelling);
        let reason = signal.reason();

        match reason {
            CancelReason::Disruptive => {
                let position = self.position();
                debug!("💾 Guardando punto de reanudación en {} bytes", position);
                *self.resume_point.lock() = Some(ResumePoint {
                    track: track.clone(),
                    position,
                });
            }
            CancelReason::Deliberate => {
                self.resume_point.lock().take();
            }
        }

        PlayOutcome::Cancelled(reason)
    }

    fn resumes(&self, track: &Track) -> bool {
        self.resume_point
            .lock()
            .as_ref()
            .is_some_and(|point| point.track.same_source(track))
    }

    /// Saved offset for this track, consumed. A point saved for another
    /// track is stale and dropped.
    fn take_resume_offset(&self, track: &Track) -> u64 {
        match self.resume_point.lock().take() {
            Some(point) if point.track.same_source(track) => point.position,
            _ => 0,
        }
    }

    async fn announce(&self, track: &Track) {
        self.cleanup_display().await;

        let channel = *self.message_channel.lock();
        if let Some(channel_id) = channel {
            let paused = self.is_paused();
            let controls = if paused {
                PlaybackControls::Paused
            } else {
                PlaybackControls::Playing
            };
            let message = OutgoingMessage::with_controls(
                messages::now_playing(track, self.elapsed(), paused),
                controls,
            );
            match self.chat.send(channel_id, message).await {
                Ok(handle) => *self.display.lock().await = Some(handle),
                Err(e) => warn!("⚠️ No se pudo publicar el mensaje de reproducción: {:?}", e),
            }
        }

        self.chat.set_listening(Some(track.title.clone())).await;
    }

    fn spawn_progress(&self, track: Track, stop: CancellationToken) -> JoinHandle<()> {
        let chat = self.chat.clone();
        let display = self.display.clone();
        let position = self.position.clone();
        let paused = self.pause.paused.subscribe();
        let period = self.progress_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let is_paused = *paused.borrow();
                let elapsed = pcm::position_to_duration(position.load(Ordering::SeqCst));
                let controls = if is_paused {
                    PlaybackControls::Paused
                } else {
                    PlaybackControls::Playing
                };
                let message = OutgoingMessage::with_controls(
                    messages::now_playing(&track, elapsed, is_paused),
                    controls,
                );

                let handle = *display.lock().await;
                if let Some(handle) = handle {
                    if let Err(e) = chat.edit(&handle, message).await {
                        warn!("⚠️ No se pudo actualizar el progreso: {:?}", e);
                    }
                }
            }
            debug!("Reporte de progreso detenido: {}", track.title);
        })
    }
}

/// Fills `buf` unless the reader hits end of stream first. Returns the
/// number of bytes read; 0 means the stream is over.
async fn read_frame(
    reader: &mut std::pin::Pin<Box<dyn tokio::io::AsyncRead + Send>>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
