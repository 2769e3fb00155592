//! # Bot Module
//!
//! Discord front end of the jukebox.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. It turns slash
//! commands and button presses into calls on the [`QueueOrchestrator`],
//! forwards the bot's own voice state changes to the continuity handler as
//! [`TransportEvent`]s, and feeds human departures to [`AutoLeave`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod auto_leave;
pub mod commands;
pub mod handlers;

use self::auto_leave::AutoLeave;
use crate::{
    audio::{continuity::TransportEvent, orchestrator::QueueOrchestrator},
    config::Config,
    sources::{FileAutoPlaylist, TrackResolver},
    ui::chat::SerenityChat,
};

/// Main Discord bot handler.
///
/// ## Fields
///
/// - `orchestrator`: queue and playback control surface
/// - `resolver`: turns queries into tracks for the play commands
/// - `autoplaylists`: the `/autoplaylist` management commands
/// - `chat`: needs the shard from `ready` for presence updates
pub struct JukeboxBot {
    config: Arc<Config>,
    pub orchestrator: Arc<QueueOrchestrator>,
    pub resolver: Arc<dyn TrackResolver>,
    pub autoplaylists: Arc<FileAutoPlaylist>,
    chat: Arc<SerenityChat>,
    transport_events: mpsc::Sender<TransportEvent>,
    /// Built on the first `ready`, once the cache exists.
    auto_leave: OnceLock<Arc<AutoLeave>>,
    shutdown: CancellationToken,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        orchestrator: Arc<QueueOrchestrator>,
        resolver: Arc<dyn TrackResolver>,
        autoplaylists: Arc<FileAutoPlaylist>,
        chat: Arc<SerenityChat>,
        transport_events: mpsc::Sender<TransportEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            orchestrator,
            resolver,
            autoplaylists,
            chat,
            transport_events,
            auto_leave: OnceLock::new(),
            shutdown,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands show up almost immediately; global ones can take up
    /// to an hour. `GUILD_ID` picks the former.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    fn start_auto_leave(&self, ctx: &Context) {
        if !self.config.auto_leave || self.auto_leave.get().is_some() {
            return;
        }

        let auto_leave = Arc::new(AutoLeave::new(self.orchestrator.clone(), ctx.cache.clone()));
        if self.auto_leave.set(auto_leave.clone()).is_ok() {
            auto_leave.spawn_periodic(self.config.auto_leave_interval, self.shutdown.clone());
            info!(
                "🚪 Auto-salida activada (chequeo cada {})",
                humantime::format_duration(self.config.auto_leave_interval)
            );
        }
    }

    /// A user other than the bot changed voice state. If they left the
    /// bot's channel, start the empty-channel checks.
    fn on_member_voice_change(&self, old: Option<&VoiceState>, new: &VoiceState) {
        let Some(auto_leave) = self.auto_leave.get() else {
            return;
        };
        if new.member.as_ref().is_some_and(|member| member.user.bot) {
            return;
        }
        let Some((guild_id, channel_id)) = self.orchestrator.current_channel() else {
            return;
        };

        let was_with_us = old.and_then(|state| state.channel_id) == Some(channel_id);
        let left = new.guild_id == Some(guild_id) && new.channel_id != Some(channel_id);
        if was_with_us && left {
            info!("👤 {} dejó el canal de voz, verificando si quedan oyentes", new.user_id);
            auto_leave.human_left();
        }
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        self.chat.attach_shard(ctx.shard.clone());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.start_auto_leave(&ctx);
    }

    /// Slash commands and the now-playing buttons. Failures are logged and
    /// reported back to the user; they never take the bot down.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction.clone(), self).await {
                    error!("Error manejando comando: {:?}", e);
                    handlers::report_failure(&ctx, &command_interaction).await;
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        if new.user_id != bot_id {
            self.on_member_voice_change(old.as_ref(), &new);
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };
        let event = match new.channel_id {
            Some(channel_id) => TransportEvent::ChannelMoved {
                guild_id,
                channel_id,
            },
            None => TransportEvent::Disconnected { guild_id },
        };

        debug!("🔊 Estado de voz del bot: {:?}", event);
        if let Err(e) = self.transport_events.send(event).await {
            warn!("⚠️ Evento de transporte descartado: {}", e);
        }
    }
}
