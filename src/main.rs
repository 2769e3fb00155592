use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

#[cfg(test)]
mod testing;

use crate::audio::{
    continuity::ContinuityHandler,
    decoder::FfmpegDecoder,
    orchestrator::QueueOrchestrator,
    session::{PlaybackSession, SessionDeps},
    transport::{SongbirdTransport, VoiceTransport},
};
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::{FileAutoPlaylist, YtDlpDownloader, YtDlpResolver};
use crate::ui::chat::SerenityChat;

/// Transport events waiting for the continuity handler.
const TRANSPORT_EVENT_BACKLOG: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // El health check no necesita token
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        let tools = Config::from_lookup(|key| std::env::var(key).ok()).unwrap_or_default();
        return health_check(&tools).await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let shutdown = CancellationToken::new();

    // Voz
    let songbird = Songbird::serenity();
    let transport: Arc<dyn VoiceTransport> = Arc::new(SongbirdTransport::new(
        songbird.clone(),
        config.sink_buffer_frames,
    ));

    // Colaboradores externos
    let resolver = Arc::new(YtDlpResolver::new(&config.ytdlp_path, config.resolve_timeout));
    let downloader = Arc::new(YtDlpDownloader::new(&config.ytdlp_path, &config.downloads_dir));
    let autoplaylists = Arc::new(FileAutoPlaylist::new(&config.autoplaylist_dir));
    let decoder = Arc::new(FfmpegDecoder::new(&config.ffmpeg_path, &config.loudnorm_filter));
    let chat = Arc::new(SerenityChat::new(Arc::new(Http::new(&config.discord_token))));

    // Núcleo de reproducción
    let session = Arc::new(PlaybackSession::new(
        SessionDeps {
            fetcher: downloader,
            decoder,
            transport: transport.clone(),
            chat: chat.clone(),
        },
        config.progress_interval,
    ));
    let orchestrator = Arc::new(QueueOrchestrator::new(
        session,
        transport.clone(),
        resolver.clone(),
        autoplaylists.clone(),
        shutdown.child_token(),
    ));
    let driver = orchestrator.start();

    let (transport_events, transport_rx) = mpsc::channel(TRANSPORT_EVENT_BACKLOG);
    let continuity = ContinuityHandler::spawn(
        orchestrator.clone(),
        transport.clone(),
        transport_rx,
        shutdown.clone(),
    );

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(
        config.clone(),
        orchestrator.clone(),
        resolver,
        autoplaylists,
        chat,
        transport_events,
        shutdown.clone(),
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("⚠️ Señal de shutdown recibida, cerrando..."),
                Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
            }
            shutdown.cancel();
        }
    });

    tokio::spawn({
        let shutdown = shutdown.clone();
        let orchestrator = orchestrator.clone();
        let shard_manager = client.shard_manager.clone();
        async move {
            shutdown.cancelled().await;
            orchestrator.shutdown().await;
            shard_manager.shutdown_all().await;
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    if let Some(driver) = driver {
        if let Err(e) = driver.await {
            warn!("⚠️ El orquestador terminó con error: {:?}", e);
        }
    }
    if let Err(e) = continuity.await {
        warn!("⚠️ El manejador de continuidad terminó con error: {:?}", e);
    }

    info!("👋 Jukebox detenido");
    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
