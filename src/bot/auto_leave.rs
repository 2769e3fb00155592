use parking_lot::Mutex;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId},
};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::orchestrator::QueueOrchestrator;

/// Checks before giving up on an empty channel.
const ATTEMPTS: u32 = 3;
const SPACING: Duration = Duration::from_secs(10);

/// Who is listening in a voice channel.
#[cfg_attr(test, mockall::automock)]
pub trait ListenerCount: Send + Sync {
    /// Non-bot members in `channel_id`, or `None` when it cannot be told.
    fn humans_in(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize>;
}

impl ListenerCount for Cache {
    fn humans_in(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        let guild = self.guild(guild_id)?;
        let humans = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .filter(|state| {
                guild
                    .members
                    .get(&state.user_id)
                    .map(|member| !member.user.bot)
                    .unwrap_or(true)
            })
            .count();
        Some(humans)
    }
}

/// Leaves the voice channel once nobody is left to listen.
pub struct AutoLeave {
    orchestrator: Arc<QueueOrchestrator>,
    listeners: Arc<dyn ListenerCount>,
    attempts: u32,
    spacing: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutoLeave {
    pub fn new(orchestrator: Arc<QueueOrchestrator>, listeners: Arc<dyn ListenerCount>) -> Self {
        Self {
            orchestrator,
            listeners,
            attempts: ATTEMPTS,
            spacing: SPACING,
            pending: Mutex::new(None),
        }
    }

    /// Whether the bot sits in a channel with no humans. Unknown counts as
    /// occupied.
    fn is_alone(&self) -> bool {
        let Some((guild_id, channel_id)) = self.orchestrator.current_channel() else {
            return false;
        };
        match self.listeners.humans_in(guild_id, channel_id) {
            Some(0) => true,
            Some(humans) => {
                debug!("👥 {} oyentes en el canal {}", humans, channel_id);
                false
            }
            None => false,
        }
    }

    /// Checks now and then a few more times before leaving. Runs when a
    /// human leaves the bot's channel; a newer departure restarts the checks.
    pub fn human_left(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            for attempt in 1..=this.attempts {
                if !this.is_alone() {
                    debug!("Hay oyentes en el canal, el bot se queda");
                    return;
                }
                debug!("Canal vacío, intento {}/{}", attempt, this.attempts);
                if attempt < this.attempts {
                    tokio::time::sleep(this.spacing).await;
                }
            }

            info!("🚪 Nadie escuchando tras {} intentos, saliendo del canal", this.attempts);
            this.orchestrator.leave().await;
        });

        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
        }
    }

    /// Single check on a fixed period, for channels that emptied while the
    /// bot was not watching.
    pub fn spawn_periodic(self: &Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if this.is_alone() {
                    info!("🚪 Chequeo periódico: nadie escuchando, saliendo del canal");
                    this.orchestrator.leave().await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::session::{PlaybackSession, SessionDeps},
        sources::{MockAudioFetcher, MockAutoPlaylistSource, MockTrackResolver},
        testing::{FakeChat, FakeDecoder, FakeTransport, GUILD, VOICE},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator() -> (Arc<QueueOrchestrator>, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::connected());
        let session = Arc::new(PlaybackSession::new(
            SessionDeps {
                fetcher: Arc::new(MockAudioFetcher::new()),
                decoder: Arc::new(FakeDecoder::finite(0)),
                transport: transport.clone(),
                chat: Arc::new(FakeChat::default()),
            },
            Duration::from_secs(1),
        ));
        let orchestrator = Arc::new(QueueOrchestrator::new(
            session,
            transport.clone(),
            Arc::new(MockTrackResolver::new()),
            Arc::new(MockAutoPlaylistSource::new()),
            CancellationToken::new(),
        ));
        (orchestrator, transport)
    }

    /// Listener counts served in order; the last one repeats.
    fn listeners(counts: &'static [usize]) -> (MockListenerCount, Arc<AtomicUsize>) {
        let asked = Arc::new(AtomicUsize::new(0));
        let seen = asked.clone();
        let mut mock = MockListenerCount::new();
        mock.expect_humans_in().returning(move |guild_id, channel_id| {
            assert_eq!((guild_id, channel_id), (GUILD, VOICE));
            let i = seen.fetch_add(1, Ordering::SeqCst).min(counts.len() - 1);
            Some(counts[i])
        });
        (mock, asked)
    }

    #[tokio::test(start_paused = true)]
    async fn leaves_after_three_empty_checks() {
        let (orchestrator, transport) = orchestrator();
        let (mock, asked) = listeners(&[0]);
        let auto_leave = Arc::new(AutoLeave::new(orchestrator.clone(), Arc::new(mock)));

        auto_leave.human_left();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(orchestrator.is_connected());
        assert_eq!(asked.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(asked.load(Ordering::SeqCst), 3);
        assert!(!orchestrator.is_connected());
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stays_when_someone_comes_back() {
        let (orchestrator, transport) = orchestrator();
        let (mock, asked) = listeners(&[0, 1]);
        let auto_leave = Arc::new(AutoLeave::new(orchestrator.clone(), Arc::new(mock)));

        auto_leave.human_left();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(asked.load(Ordering::SeqCst), 2);
        assert!(orchestrator.is_connected());
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_listener_count_never_leaves() {
        let (orchestrator, _) = orchestrator();
        let mut mock = MockListenerCount::new();
        mock.expect_humans_in().returning(|_, _| None);
        let auto_leave = Arc::new(AutoLeave::new(orchestrator.clone(), Arc::new(mock)));

        auto_leave.human_left();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(orchestrator.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_check_leaves_an_empty_channel() {
        let (orchestrator, _) = orchestrator();
        let (mock, _) = listeners(&[2, 0]);
        let auto_leave = Arc::new(AutoLeave::new(orchestrator.clone(), Arc::new(mock)));
        let shutdown = CancellationToken::new();

        auto_leave.spawn_periodic(Duration::from_secs(3600), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert!(orchestrator.is_connected());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!orchestrator.is_connected());
        shutdown.cancel();
    }
}
