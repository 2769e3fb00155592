use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Input, RawAdapter},
    Call, Songbird,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    pcm::{CHANNELS, SAMPLE_RATE},
    sink::{ChannelSource, SongbirdSink, VoiceSink},
};
use crate::error::{PlaybackError, SinkError};

/// Connection lifecycle of the voice channel the bot streams into.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    fn current_channel(&self) -> Option<(GuildId, ChannelId)>;

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError>;

    /// Moves an existing connection to `channel_id`. Any open sink is
    /// disposed first.
    async fn reconnect(&self, channel_id: ChannelId) -> Result<(), PlaybackError>;

    /// Forgets the channel identifiers and disposes any open sink without
    /// touching the gateway. Returns the guild that was connected.
    fn detach(&self) -> Option<GuildId>;

    /// Tears down the voice call for `guild_id`.
    async fn leave(&self, guild_id: GuildId);

    async fn disconnect(&self) {
        if let Some(guild_id) = self.detach() {
            self.leave(guild_id).await;
        }
    }

    async fn open_sink(&self) -> Result<Box<dyn VoiceSink>, SinkError>;
}

struct Connection {
    guild_id: GuildId,
    channel_id: ChannelId,
    call: Arc<tokio::sync::Mutex<Call>>,
    /// Cancelled when this connection's sinks must stop accepting audio.
    epoch: CancellationToken,
}

/// songbird-backed transport for a single guild.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    buffer_frames: usize,
    connection: Mutex<Option<Connection>>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, buffer_frames: usize) -> Self {
        Self {
            manager,
            buffer_frames: buffer_frames.max(1),
            connection: Mutex::new(None),
        }
    }

    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<tokio::sync::Mutex<Call>>, PlaybackError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::Transport(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("⚠️ No se pudo ensordecer al bot: {:?}", e);
            }
        }

        Ok(call)
    }

    fn replace_connection(&self, next: Option<Connection>) -> Option<Connection> {
        let previous = std::mem::replace(&mut *self.connection.lock(), next);
        if let Some(old) = &previous {
            old.epoch.cancel();
        }
        previous
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn current_channel(&self) -> Option<(GuildId, ChannelId)> {
        self.connection
            .lock()
            .as_ref()
            .map(|c| (c.guild_id, c.channel_id))
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
        if self.current_channel() == Some((guild_id, channel_id)) {
            return Ok(());
        }

        let call = self.join(guild_id, channel_id).await?;
        self.replace_connection(Some(Connection {
            guild_id,
            channel_id,
            call,
            epoch: CancellationToken::new(),
        }));

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn reconnect(&self, channel_id: ChannelId) -> Result<(), PlaybackError> {
        let guild_id = self
            .current_channel()
            .map(|(guild_id, _)| guild_id)
            .ok_or_else(|| PlaybackError::Transport("no active voice connection".into()))?;

        // Los sinks del canal viejo quedan invalidados antes de mover la llamada
        if let Some(old) = self.replace_connection(None) {
            old.call.lock().await.stop();
        }

        let call = self.join(guild_id, channel_id).await?;
        self.replace_connection(Some(Connection {
            guild_id,
            channel_id,
            call,
            epoch: CancellationToken::new(),
        }));

        info!("🔀 Reconectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    fn detach(&self) -> Option<GuildId> {
        let old = self.replace_connection(None)?;
        info!("🔌 Conexión de voz descartada en guild {}", old.guild_id);
        Some(old.guild_id)
    }

    async fn leave(&self, guild_id: GuildId) {
        if self.manager.get(guild_id).is_none() {
            return;
        }
        if let Err(e) = self.manager.remove(guild_id).await {
            warn!("⚠️ Error al salir del canal de voz: {:?}", e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
    }

    async fn open_sink(&self) -> Result<Box<dyn VoiceSink>, SinkError> {
        let (call, epoch) = {
            let connection = self.connection.lock();
            let connection = connection.as_ref().ok_or(SinkError::NotConnected)?;
            (connection.call.clone(), connection.epoch.child_token())
        };

        let (tx, rx) = flume::bounded(self.buffer_frames);
        let input: Input = RawAdapter::new(ChannelSource::new(rx), SAMPLE_RATE, CHANNELS).into();
        let track = call.lock().await.play_only_input(input);

        Ok(Box::new(SongbirdSink::new(tx, track, epoch)))
    }
}
