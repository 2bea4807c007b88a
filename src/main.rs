use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::{path::Path, sync::Arc};
use tracing::{error, info, warn};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod library;
mod storage;
mod ui;

use crate::audio::{
    duration::{DurationResolver, FfprobeProbe},
    mixer::Mixer,
    pipeline::PipelineBuilder,
    registry::PlayerRegistry,
};
use crate::bot::OpenPaletteBot;
use crate::config::Config;
use crate::library::{download::UrlDownloader, TrackLibrary};
use crate::storage::PaletteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_palette=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎨 Iniciando Open Palette v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Servicios compartidos por todas las guilds
    let probe = Arc::new(FfprobeProbe::new(&config.ffprobe_path, config.probe_timeout()));
    let durations = Arc::new(DurationResolver::new(probe, config.duration_cache_size));
    let pipelines = Arc::new(PipelineBuilder::new(&config.ffmpeg_path, durations.clone()));
    let players = Arc::new(PlayerRegistry::new(pipelines));
    let mixer = Arc::new(Mixer::new(&config.ffmpeg_path, durations.clone()));
    let library = Arc::new(TrackLibrary::new(
        &config.music_dir,
        durations,
        config.upload_limit_bytes(),
    ));
    let downloader = Arc::new(UrlDownloader::new(&config.ytdlp_path, &config.ffmpeg_path));

    // Inicializar almacenamiento JSON
    let palettes = Arc::new(tokio::sync::Mutex::new(PaletteStore::open(&config.data_dir).await?));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = OpenPaletteBot::new(
        config.clone(),
        players.clone(),
        library,
        mixer,
        downloader,
        palettes,
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Shutdown ordenado: cortar los streams antes de cerrar el gateway
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        players.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Comprueba que las herramientas externas responden antes de conectar el bot
async fn health_check(config: &Config) -> Result<()> {
    let tools = [
        (&config.ffmpeg_path, "-version"),
        (&config.ffprobe_path, "-version"),
        (&config.ytdlp_path, "--version"),
    ];

    let mut missing = Vec::new();
    for (program, flag) in tools {
        if !tool_available(program, flag).await {
            warn!("❌ {} no disponible", program.display());
            missing.push(program.display().to_string());
        }
    }

    if missing.is_empty() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: {}", missing.join(", "));
    }
}

async fn tool_available(program: &Path, flag: &str) -> bool {
    async_process::Command::new(program)
        .arg(flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
