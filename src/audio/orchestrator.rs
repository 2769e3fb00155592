//! Sequencing loop and control surface.
//!
//! All playback is started by a single driver task spawned from
//! [`QueueOrchestrator::start`]. Callers never run the loop themselves; they
//! mutate the queue and nudge the driver through a depth-1 trigger channel,
//! so two tracks can never be streaming at once no matter how skips,
//! play-now requests and natural track ends interleave.

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    queue::TrackQueue,
    session::{CancelReason, PlayOutcome, PlaybackSession},
    track::{Requester, Track},
    transport::VoiceTransport,
};
use crate::{
    error::PlaybackError,
    sources::{AutoPlaylistSource, TrackResolver},
};

/// Result of a control command, rendered into a reply by the chat layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Paused,
    AlreadyPaused,
    Resumed,
    NotPaused,
    NothingPlaying,
    Skipped(Track),
    Cleared(usize),
    Shuffled,
    QueueEmpty,
}

pub struct QueueOrchestrator {
    queue: TrackQueue,
    session: Arc<PlaybackSession>,
    transport: Arc<dyn VoiceTransport>,
    resolver: Arc<dyn TrackResolver>,
    autoplaylist: Arc<dyn AutoPlaylistSource>,
    /// Serialises "pick the next track and arm its cancellation" against
    /// skip/play-now, so a cancel always targets the track that is current.
    handoff: Mutex<()>,
    trigger: mpsc::Sender<()>,
    wakeups: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown: CancellationToken,
}

impl QueueOrchestrator {
    pub fn new(
        session: Arc<PlaybackSession>,
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<dyn TrackResolver>,
        autoplaylist: Arc<dyn AutoPlaylistSource>,
        shutdown: CancellationToken,
    ) -> Self {
        let (trigger, wakeups) = mpsc::channel(1);
        Self {
            queue: TrackQueue::new(),
            session,
            transport,
            resolver,
            autoplaylist,
            handoff: Mutex::new(()),
            trigger,
            wakeups: Mutex::new(Some(wakeups)),
            shutdown,
        }
    }

    /// Spawns the driver. Only the first call does anything.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut wakeups = self.wakeups.lock().take()?;
        let this = Arc::clone(self);

        Some(tokio::spawn(async move {
            info!("🎛️ Orquestador de cola iniciado");
            loop {
                tokio::select! {
                    _ = this.shutdown.cancelled() => break,
                    woken = wakeups.recv() => {
                        if woken.is_none() {
                            break;
                        }
                        this.advance(&mut wakeups).await;
                    }
                }
            }
            info!("🎛️ Orquestador de cola detenido");
        }))
    }

    /// Asks the driver for a pass. Extra requests while one is pending are
    /// coalesced.
    fn kick(&self) {
        if self.trigger.try_send(()).is_err() {
            debug!("Pase del orquestador ya pendiente");
        }
    }

    /// The sequencing loop, run only by the driver task.
    async fn advance(&self, wakeups: &mut mpsc::Receiver<()>) {
        loop {
            // Lo que llegó hasta acá ya queda cubierto por esta vuelta
            while wakeups.try_recv().is_ok() {}

            if self.shutdown.is_cancelled() {
                self.go_idle().await;
                return;
            }

            if !self.transport.is_connected() {
                info!("🔇 Sin conexión de voz, la reproducción queda en espera");
                self.queue.skip_current();
                self.go_idle().await;
                return;
            }

            let picked = {
                let _handoff = self.handoff.lock();
                self.session.arm();
                self.next_from_queue()
            };

            let track = match picked {
                Some(track) => track,
                None => match self.from_autoplaylist().await {
                    Some(track) => track,
                    None => {
                        let idle = {
                            let _handoff = self.handoff.lock();
                            self.session.disarm();
                            self.queue.finish_if_empty()
                        };
                        if idle {
                            self.go_idle().await;
                            return;
                        }
                        continue;
                    }
                },
            };

            match self.session.play(track).await {
                Ok(PlayOutcome::Completed) | Ok(PlayOutcome::Cancelled(CancelReason::Deliberate)) => {}
                Ok(PlayOutcome::Cancelled(CancelReason::Disruptive)) => {
                    // El track queda como actual hasta que se reanude
                    info!("⏸️ Reproducción interrumpida por el transporte, esperando reanudación");
                    return;
                }
                Err(e) => warn!("⚠️ Track descartado: {}", e),
            }
        }
    }

    /// Interrupted track first, then the head of the queue.
    fn next_from_queue(&self) -> Option<Track> {
        if let Some(track) = self.session.interrupted_track() {
            self.queue.set_current(Some(track.clone()));
            self.queue.set_playing(true);
            return Some(track);
        }

        let next = self.queue.dequeue_next();
        if next.is_some() {
            self.queue.set_playing(true);
        }
        next
    }

    async fn from_autoplaylist(&self) -> Option<Track> {
        let url = self.autoplaylist.next_url().await?;
        match self.resolver.resolve(&url, &Requester::autoplaylist()).await {
            Ok(track) => {
                info!("📻 Autoplaylist: {}", track.title);
                let _handoff = self.handoff.lock();
                self.queue.set_current(Some(track.clone()));
                self.queue.set_playing(true);
                Some(track)
            }
            Err(e) => {
                warn!("⚠️ Autoplaylist no resolvió {}: {}", url, e);
                None
            }
        }
    }

    async fn go_idle(&self) {
        self.session.disarm();
        self.session.cleanup_display().await;
        self.session.mark_idle();
        debug!("💤 Orquestador en reposo");
    }

    /// Cancels whatever is current and forgets it. With `detach`, the voice
    /// identifiers are dropped in the same step so the driver cannot start
    /// another track before it notices the connection is gone.
    fn stop_current(&self, reason: CancelReason, detach: bool) -> Option<GuildId> {
        let _handoff = self.handoff.lock();
        self.session.cancel(reason);
        self.session.discard_resume();
        self.queue.skip_current();
        if detach {
            self.transport.detach()
        } else {
            None
        }
    }

    /// Waits for the running track to unwind and clears what it left behind.
    async fn settle_idle(&self) {
        self.session.wait_idle().await;
        self.session.discard_resume();
        self.queue.skip_current();
        self.session.cleanup_display().await;
        self.session.mark_idle();
    }

    // ------------------------------------------------------------ control

    pub fn set_message_channel(&self, channel_id: ChannelId) {
        self.session.set_message_channel(channel_id);
    }

    /// Connects to `channel_id` and picks up anything waiting to play. Leaving
    /// another channel keeps the current track, which resumes from its
    /// position in the new one.
    pub async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
        match self.transport.current_channel() {
            Some(current) if current == (guild_id, channel_id) => {}
            current => {
                // El sink del canal viejo no sobrevive al cambio
                self.interrupt().await;
                let switched = match current {
                    Some((connected, _)) if connected == guild_id => self.transport.reconnect(channel_id).await,
                    _ => self.transport.connect(guild_id, channel_id).await,
                };
                if let Err(e) = switched {
                    error!("❌ No se pudo conectar al canal {}: {}", channel_id, e);
                    self.drop_connection().await;
                    return Err(e);
                }
            }
        }

        if self.session.interrupted_track().is_some() {
            self.resume_interrupted();
        } else if !self.queue.is_empty() && !self.queue.claim_playback() {
            self.kick();
        }
        Ok(())
    }

    /// Connects and starts playing: the queue, or the autoplaylist when the
    /// queue is empty.
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
        self.connect(guild_id, channel_id).await?;
        if !self.queue.claim_playback() {
            self.kick();
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn current_channel(&self) -> Option<(GuildId, ChannelId)> {
        self.transport.current_channel()
    }

    /// Enqueues and starts the driver if nothing is playing. Returns whether
    /// this call started playback.
    pub fn add_and_play(&self, track: Track) -> bool {
        self.queue.enqueue(track);
        self.start_if_idle()
    }

    pub fn add_next(&self, track: Track) -> bool {
        self.queue.enqueue_front(track);
        self.start_if_idle()
    }

    pub fn add_all(&self, tracks: Vec<Track>) -> usize {
        let added = self.queue.enqueue_all(tracks);
        if added > 0 {
            self.start_if_idle();
        }
        added
    }

    fn start_if_idle(&self) -> bool {
        let was_playing = self.queue.claim_playback();
        if !was_playing {
            self.kick();
        }
        !was_playing
    }

    /// Deliberately stops the current track; the driver moves on without
    /// the caller waiting for it.
    pub fn skip(&self) -> ControlOutcome {
        let skipped = {
            let _handoff = self.handoff.lock();
            let Some(current) = self.queue.current() else {
                return ControlOutcome::NothingPlaying;
            };
            self.session.cancel(CancelReason::Deliberate);
            self.session.discard_resume();
            self.queue.skip_current();
            current
        };

        info!("⏭️ Saltado: {}", skipped.title);
        self.kick();
        ControlOutcome::Skipped(skipped)
    }

    /// Puts `track` at the head and cuts whatever is playing.
    pub fn play_now(&self, track: Track) {
        {
            let _handoff = self.handoff.lock();
            self.queue.enqueue_front(track);
            self.session.cancel(CancelReason::Deliberate);
            self.session.discard_resume();
            self.queue.skip_current();
        }
        self.queue.claim_playback();
        self.kick();
    }

    pub fn clear(&self) -> ControlOutcome {
        ControlOutcome::Cleared(self.queue.clear_pending())
    }

    pub fn shuffle(&self) -> ControlOutcome {
        if self.queue.is_empty() {
            return ControlOutcome::QueueEmpty;
        }
        self.queue.shuffle();
        ControlOutcome::Shuffled
    }

    pub fn pause(&self) -> ControlOutcome {
        if self.queue.current().is_none() {
            return ControlOutcome::NothingPlaying;
        }
        if self.session.pause() {
            info!("⏸️ Reproducción pausada");
            ControlOutcome::Paused
        } else {
            ControlOutcome::AlreadyPaused
        }
    }

    pub fn resume(&self) -> ControlOutcome {
        if self.queue.current().is_none() {
            return ControlOutcome::NothingPlaying;
        }
        if self.session.resume() {
            info!("▶️ Reproducción reanudada");
            ControlOutcome::Resumed
        } else {
            ControlOutcome::NotPaused
        }
    }

    pub fn snapshot(&self) -> Vec<Track> {
        self.queue.snapshot()
    }

    /// Current track with its elapsed time.
    pub fn now_playing(&self) -> Option<(Track, Duration)> {
        self.queue
            .current()
            .map(|track| (track, self.session.elapsed()))
    }

    pub fn is_playing(&self) -> bool {
        self.queue.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.session.is_paused()
    }

    pub fn queue_duration(&self) -> Duration {
        self.queue.total_duration()
    }

    // ------------------------------------------------- transport lifecycle

    /// Cuts the current track keeping its position, and waits until the
    /// session has unwound. Returns whether there is something to resume.
    pub async fn interrupt(&self) -> bool {
        self.session.cancel(CancelReason::Disruptive);
        self.session.wait_idle().await;
        self.session.interrupted_track().is_some()
    }

    /// Restarts the interrupted track from its saved position.
    pub fn resume_interrupted(&self) {
        if let Some(track) = self.session.interrupted_track() {
            info!("🔁 Reanudando {} en {:?}", track.title, self.session.elapsed());
            self.queue.claim_playback();
            self.kick();
        }
    }

    /// The transport is gone: stop without keeping a resume point, forget
    /// the channel and go idle. The pending queue survives.
    pub async fn drop_connection(&self) {
        if let Some(guild_id) = self.stop_current(CancelReason::Deliberate, true) {
            self.transport.leave(guild_id).await;
        }
        self.settle_idle().await;
    }

    /// Stops playback, clears the queue and leaves the voice channel.
    pub async fn leave(&self) {
        self.queue.clear_pending();
        self.drop_connection().await;
    }

    /// Stops for good: the driver exits and playback is torn down.
    pub async fn shutdown(&self) {
        info!("🛑 Deteniendo reproducción");
        self.shutdown.cancel();
        self.stop_current(CancelReason::Deliberate, false);
        self.transport.disconnect().await;
        self.settle_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            pcm::{BYTES_PER_SECOND, FRAME_BYTES},
            session::{SessionDeps, SessionState},
        },
        sources::{MockAudioFetcher, MockAutoPlaylistSource, MockTrackResolver},
        testing::{track, ChatEvent, FakeChat, FakeDecoder, FakeTransport, GUILD, OTHER_VOICE, TEXT, VOICE},
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        orchestrator: Arc<QueueOrchestrator>,
        session: Arc<PlaybackSession>,
        decoder: Arc<FakeDecoder>,
        transport: Arc<FakeTransport>,
        chat: Arc<FakeChat>,
        driver: JoinHandle<()>,
    }

    fn empty_autoplaylist() -> (MockAutoPlaylistSource, Arc<AtomicUsize>) {
        let asked = Arc::new(AtomicUsize::new(0));
        let counter = asked.clone();
        let mut autoplaylist = MockAutoPlaylistSource::new();
        autoplaylist.expect_next_url().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });
        (autoplaylist, asked)
    }

    fn harness(
        decoder: FakeDecoder,
        transport: FakeTransport,
        resolver: MockTrackResolver,
        autoplaylist: MockAutoPlaylistSource,
    ) -> Harness {
        let decoder = Arc::new(decoder);
        let transport = Arc::new(transport);
        let chat = Arc::new(FakeChat::default());
        let session = Arc::new(PlaybackSession::new(
            SessionDeps {
                fetcher: Arc::new(MockAudioFetcher::new()),
                decoder: decoder.clone(),
                transport: transport.clone(),
                chat: chat.clone(),
            },
            Duration::from_secs(1),
        ));
        let orchestrator = Arc::new(QueueOrchestrator::new(
            session.clone(),
            transport.clone(),
            Arc::new(resolver),
            Arc::new(autoplaylist),
            CancellationToken::new(),
        ));
        orchestrator.set_message_channel(TEXT);
        let driver = orchestrator.start().expect("driver");

        Harness {
            orchestrator,
            session,
            decoder,
            transport,
            chat,
            driver,
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        while !done() {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_state(session: &PlaybackSession, wanted: SessionState) {
        let mut rx = session.subscribe();
        rx.wait_for(|state| *state == wanted).await.unwrap();
    }

    #[tokio::test]
    async fn start_only_spawns_one_driver() {
        let (autoplaylist, _) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::finite(0),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );
        assert!(h.orchestrator.start().is_none());
        h.driver.abort();
    }

    #[tokio::test]
    async fn plays_queue_in_order_then_goes_idle() {
        let (autoplaylist, asked) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::finite(3 * FRAME_BYTES as u64),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        assert!(h.orchestrator.add_and_play(track("Song1", 60)));
        assert!(!h.orchestrator.add_and_play(track("Song2", 60)));
        assert!(!h.orchestrator.add_and_play(track("Song3", 60)));

        wait_until(|| asked.load(Ordering::SeqCst) == 1 && !h.orchestrator.is_playing()).await;
        wait_state(&h.session, SessionState::Idle).await;

        let opened: Vec<String> = h
            .decoder
            .opened()
            .into_iter()
            .map(|(path, _)| path.display().to_string())
            .collect();
        assert_eq!(opened, vec!["/tmp/Song1.mp3", "/tmp/Song2.mp3", "/tmp/Song3.mp3"]);
        assert!(h.orchestrator.now_playing().is_none());
        assert_eq!(h.chat.events().last(), Some(&ChatEvent::Listening(None)));
    }

    #[tokio::test]
    async fn empty_queue_asks_autoplaylist_once_per_cycle() {
        let (autoplaylist, asked) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::finite(FRAME_BYTES as u64),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.add_and_play(track("Song1", 60));
        wait_until(|| asked.load(Ordering::SeqCst) == 1 && !h.orchestrator.is_playing()).await;
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }

        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert_eq!(h.decoder.opened().len(), 1);
        assert!(!h.orchestrator.is_playing());
    }

    #[tokio::test]
    async fn autoplaylist_track_plays_when_queue_runs_dry() {
        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();
        let mut autoplaylist = MockAutoPlaylistSource::new();
        autoplaylist.expect_next_url().returning(move || {
            (counter.fetch_add(1, Ordering::SeqCst) == 0).then(|| "https://youtu.be/auto".to_string())
        });
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().times(1).returning(|url, requester| {
            assert_eq!(requester.name, "AutoPlaylist");
            let mut resolved = track("Auto", 60);
            resolved.url = url.to_string();
            resolved.requester = requester.clone();
            Ok(resolved)
        });
        let h = harness(
            FakeDecoder::finite(FRAME_BYTES as u64),
            FakeTransport::connected(),
            resolver,
            autoplaylist,
        );

        h.orchestrator.add_and_play(track("Song1", 60));
        wait_until(|| served.load(Ordering::SeqCst) == 2 && !h.orchestrator.is_playing()).await;

        assert_eq!(h.decoder.opened().len(), 2);
        assert_eq!(h.decoder.opened()[1].0.display().to_string(), "/tmp/Auto.mp3");
    }

    #[tokio::test(start_paused = true)]
    async fn reports_ninety_seconds_as_one_thirty() {
        let (autoplaylist, _) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::stalling(90 * BYTES_PER_SECOND),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        assert!(h.orchestrator.add_and_play(track("Song1", 180)));
        wait_until(|| h.session.position() == 90 * BYTES_PER_SECOND).await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let (current, elapsed) = h.orchestrator.now_playing().expect("playing");
        assert_eq!(current.title, "Song1");
        assert_eq!(crate::audio::pcm::format_duration(elapsed), "1:30");
        assert!(h.chat.edits().last().expect("edit").ends_with("`1:30 / 3:00`"));

        h.orchestrator.skip();
        wait_until(|| !h.orchestrator.is_playing()).await;
    }

    #[tokio::test]
    async fn skip_terminates_decoder_and_idles_on_empty_queue() {
        let (autoplaylist, _) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::stalling(10 * FRAME_BYTES as u64),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.add_and_play(track("Song1", 180));
        wait_state(&h.session, SessionState::Streaming).await;

        let outcome = h.orchestrator.skip();
        assert_eq!(outcome, ControlOutcome::Skipped(track("Song1", 180)));

        wait_state(&h.session, SessionState::Idle).await;
        assert_eq!(h.decoder.terminated(), 1);
        assert!(!h.orchestrator.is_playing());
        assert!(h.session.interrupted_track().is_none());
        assert_eq!(h.orchestrator.skip(), ControlOutcome::NothingPlaying);
    }

    #[tokio::test]
    async fn concurrent_skips_never_overlap_sessions() {
        let (autoplaylist, asked) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::finite(4 * FRAME_BYTES as u64),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        for i in 0..20 {
            h.orchestrator.add_and_play(track(&format!("T{i}"), 60));
        }

        let mut skippers = Vec::new();
        for _ in 0..4 {
            let orchestrator = h.orchestrator.clone();
            skippers.push(tokio::spawn(async move {
                for _ in 0..10 {
                    orchestrator.skip();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for skipper in skippers {
            skipper.await.unwrap();
        }

        wait_until(|| {
            h.orchestrator.snapshot().is_empty()
                && asked.load(Ordering::SeqCst) >= 1
                && !h.orchestrator.is_playing()
        })
        .await;
        wait_state(&h.session, SessionState::Idle).await;

        assert!(h.transport.max_concurrent_sinks() <= 1);
        assert!(h.orchestrator.now_playing().is_none());
    }

    #[tokio::test]
    async fn play_now_cuts_current_and_keeps_pending_order() {
        let (autoplaylist, _) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::stalling(FRAME_BYTES as u64),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.add_and_play(track("Song1", 60));
        h.orchestrator.add_and_play(track("Song2", 60));
        wait_state(&h.session, SessionState::Streaming).await;

        h.orchestrator.play_now(track("Urgent", 60));
        wait_until(|| h.decoder.opened().len() == 2).await;

        assert_eq!(h.decoder.opened()[1].0.display().to_string(), "/tmp/Urgent.mp3");
        assert_eq!(h.orchestrator.now_playing().map(|(t, _)| t.title), Some("Urgent".into()));
        let pending: Vec<String> = h.orchestrator.snapshot().into_iter().map(|t| t.title).collect();
        assert_eq!(pending, vec!["Song2"]);

        h.orchestrator.clear();
        h.orchestrator.skip();
        wait_until(|| !h.orchestrator.is_playing()).await;
    }

    #[tokio::test]
    async fn control_misuse_is_reported_not_raised() {
        let (autoplaylist, _) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::stalling(FRAME_BYTES as u64),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        assert_eq!(h.orchestrator.pause(), ControlOutcome::NothingPlaying);
        assert_eq!(h.orchestrator.resume(), ControlOutcome::NothingPlaying);
        assert_eq!(h.orchestrator.shuffle(), ControlOutcome::QueueEmpty);

        h.orchestrator.add_and_play(track("Song1", 60));
        wait_state(&h.session, SessionState::Streaming).await;

        assert_eq!(h.orchestrator.resume(), ControlOutcome::NotPaused);
        assert_eq!(h.orchestrator.pause(), ControlOutcome::Paused);
        assert_eq!(h.orchestrator.pause(), ControlOutcome::AlreadyPaused);
        assert_eq!(h.orchestrator.resume(), ControlOutcome::Resumed);
        assert_eq!(h.orchestrator.clear(), ControlOutcome::Cleared(0));

        h.orchestrator.skip();
    }

    #[tokio::test]
    async fn disconnected_transport_never_starts_playback() {
        let (autoplaylist, asked) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::finite(FRAME_BYTES as u64),
            FakeTransport::disconnected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.add_and_play(track("Song1", 60));
        wait_until(|| !h.orchestrator.is_playing()).await;
        wait_state(&h.session, SessionState::Idle).await;

        assert!(h.decoder.opened().is_empty());
        assert_eq!(asked.load(Ordering::SeqCst), 0);
        assert_eq!(h.orchestrator.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn failing_track_does_not_wedge_the_queue() {
        let (autoplaylist, asked) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::failing(),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.add_and_play(track("Bad1", 60));
        h.orchestrator.add_and_play(track("Bad2", 60));
        wait_until(|| asked.load(Ordering::SeqCst) == 1 && !h.orchestrator.is_playing()).await;

        assert_eq!(h.decoder.opened().len(), 2);
    }

    #[tokio::test]
    async fn joining_another_channel_resumes_the_same_track() {
        let (autoplaylist, asked) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::stalling(600 * BYTES_PER_SECOND),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.add_and_play(track("Song1", 180));
        h.orchestrator.add_and_play(track("Song2", 180));
        wait_until(|| h.session.position() >= 5 * FRAME_BYTES as u64).await;

        h.orchestrator.join(GUILD, OTHER_VOICE).await.unwrap();
        wait_until(|| h.decoder.opened().len() == 2).await;

        let (path, offset) = h.decoder.opened()[1].clone();
        assert_eq!(path.display().to_string(), "/tmp/Song1.mp3");
        assert!(offset > Duration::ZERO);
        assert_eq!(h.orchestrator.current_channel(), Some((GUILD, OTHER_VOICE)));
        assert_eq!(h.transport.reconnects.load(Ordering::SeqCst), 1);
        let pending: Vec<String> = h.orchestrator.snapshot().into_iter().map(|t| t.title).collect();
        assert_eq!(pending, vec!["Song2"]);
        assert_eq!(asked.load(Ordering::SeqCst), 0);

        // La cola sigue viva: lo nuevo espera detrás
        assert!(!h.orchestrator.add_and_play(track("Song3", 180)));
        h.orchestrator.leave().await;
    }

    #[tokio::test]
    async fn join_while_idle_asks_the_autoplaylist_once() {
        let (autoplaylist, asked) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::finite(FRAME_BYTES as u64),
            FakeTransport::disconnected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.join(GUILD, VOICE).await.unwrap();
        wait_until(|| asked.load(Ordering::SeqCst) == 1 && !h.orchestrator.is_playing()).await;
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }

        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert!(h.decoder.opened().is_empty());
        assert!(h.orchestrator.is_connected());
    }

    #[tokio::test]
    async fn connect_for_a_request_leaves_the_autoplaylist_alone() {
        let (autoplaylist, asked) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::finite(FRAME_BYTES as u64),
            FakeTransport::disconnected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.connect(GUILD, VOICE).await.unwrap();
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }

        assert_eq!(asked.load(Ordering::SeqCst), 0);
        assert!(!h.orchestrator.is_playing());
        assert!(h.orchestrator.add_and_play(track("Song1", 60)));
        wait_until(|| h.decoder.opened().len() == 1).await;
    }

    #[tokio::test]
    async fn leave_clears_everything() {
        let (autoplaylist, _) = empty_autoplaylist();
        let h = harness(
            FakeDecoder::stalling(FRAME_BYTES as u64),
            FakeTransport::connected(),
            MockTrackResolver::new(),
            autoplaylist,
        );

        h.orchestrator.add_and_play(track("Song1", 60));
        h.orchestrator.add_and_play(track("Song2", 60));
        wait_state(&h.session, SessionState::Streaming).await;

        h.orchestrator.leave().await;

        assert!(!h.orchestrator.is_connected());
        assert!(!h.orchestrator.is_playing());
        assert!(h.orchestrator.snapshot().is_empty());
        assert!(h.session.interrupted_track().is_none());
        assert_eq!(h.transport.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(h.decoder.opened().len(), 1);
    }
}
