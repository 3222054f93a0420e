use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{path::Path, sync::Arc};
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;
mod storage;
mod ui;

use crate::audio::{
    player::{PlaybackRegistry, PlaybackSettings},
    transcoder::FfmpegTranscoder,
    voice::SongbirdTransport,
};
use crate::bot::HibikiBot;
use crate::config::Config;
use crate::sources::SoundLibrary;
use crate::storage::JsonSnapshotStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hibiki=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Hibiki v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config.ffmpeg_path).await;
    }

    info!("{}", config.summary());

    let library = Arc::new(SoundLibrary::new(config.music_dir.clone(), config.effects_dir.clone()).await?);
    let snapshots = Arc::new(JsonSnapshotStore::new(config.data_dir.clone()).await?);
    let transcoder = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone(), config.fade_in()));

    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(songbird.clone()));

    let registry = Arc::new(PlaybackRegistry::new(
        transport,
        transcoder,
        library.clone(),
        snapshots,
        PlaybackSettings::from(&config),
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let token = config.discord_token.clone();
    let handler = HibikiBot::new(config, registry.clone(), library);

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(ffmpeg: &Path) -> Result<()> {
    // Verificar dependencias críticas
    let output = async_process::Command::new(ffmpeg)
        .arg("-version")
        .output()
        .await?;

    if output.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("ffmpeg no disponible en {}", ffmpeg.display());
    }
}
