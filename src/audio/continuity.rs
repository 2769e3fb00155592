use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{orchestrator::QueueOrchestrator, transport::VoiceTransport};

/// Voice lifecycle changes of the bot's own connection, as reported by the
/// gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    ChannelMoved {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
    Disconnected {
        guild_id: GuildId,
    },
}

/// Keeps playback alive across channel moves and goes idle on a forced
/// disconnect. Owns no queue state.
pub struct ContinuityHandler {
    orchestrator: Arc<QueueOrchestrator>,
    transport: Arc<dyn VoiceTransport>,
}

impl ContinuityHandler {
    pub fn spawn(
        orchestrator: Arc<QueueOrchestrator>,
        transport: Arc<dyn VoiceTransport>,
        mut events: mpsc::Receiver<TransportEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let handler = Self {
            orchestrator,
            transport,
        };

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                handler.handle(event).await;
            }
            debug!("Manejador de continuidad detenido");
        })
    }

    async fn handle(&self, event: TransportEvent) {
        let Some((guild_id, current)) = self.transport.current_channel() else {
            // Eventos de nuestras propias conexiones y salidas
            debug!("Evento de transporte sin conexión activa: {:?}", event);
            return;
        };

        match event {
            TransportEvent::ChannelMoved {
                guild_id: moved_in,
                channel_id,
            } => {
                if moved_in != guild_id || channel_id == current {
                    return;
                }
                self.follow_move(channel_id).await;
            }
            TransportEvent::Disconnected { guild_id: gone_from } => {
                if gone_from != guild_id {
                    return;
                }
                info!("🔌 Desconectado a la fuerza del canal de voz en guild {}", guild_id);
                self.orchestrator.drop_connection().await;
            }
        }
    }

    async fn follow_move(&self, channel_id: ChannelId) {
        info!("🔀 Movido al canal de voz {}", channel_id);

        let resumable = self.orchestrator.interrupt().await;

        if let Err(e) = self.transport.reconnect(channel_id).await {
            error!("❌ No se pudo reconectar al canal {}: {}", channel_id, e);
            self.orchestrator.drop_connection().await;
            return;
        }

        if resumable {
            self.orchestrator.resume_interrupted();
        }
    }
}
