use anyhow::{Context, Result};
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod catalog;
mod config;
mod error;
mod health;
mod sources;
mod ui;

use crate::audio::{
    policy::SessionPolicy, transcoder::TranscodeOptions, voice::SongbirdConnector, SessionDeps,
    SessionRegistry,
};
use crate::bot::{DiscordAnnouncer, RadioBot};
use crate::catalog::StationCatalog;
use crate::config::Config;
use crate::sources::{RadioBrowserClient, Resolver, StationDirectory, YtDlpClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_radio=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // El health check no necesita token
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("📻 Iniciando Open Radio v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    let catalog = StationCatalog::load(&config.stations_file).with_context(|| {
        format!(
            "no se pudo cargar el catálogo {}",
            config.stations_file.display()
        )
    })?;

    match health::verify_dependencies(&config.ytdlp_path, &config.ffmpeg_path).await {
        Ok(versions) => info!("🔧 yt-dlp {} listo", versions.ytdlp),
        Err(e) => warn!("⚠️ Herramientas externas no disponibles: {:?}", e),
    }

    // Fuentes
    let extractor = Arc::new(YtDlpClient::new(
        config.ytdlp_path.clone(),
        config.extractor_timeout,
    ));
    let directory: Option<Arc<dyn StationDirectory>> = match &config.radio_browser_url {
        Some(url) => Some(Arc::new(RadioBrowserClient::new(
            url.clone(),
            config.extractor_timeout,
        )?)),
        None => None,
    };
    let resolver = Arc::new(Resolver::new(
        Arc::new(catalog),
        extractor.clone(),
        directory,
    ));

    // Voz y sesiones
    let songbird = Songbird::serenity();
    let connector = SongbirdConnector::new(
        songbird.clone(),
        TranscodeOptions {
            ffmpeg_path: config.ffmpeg_path.clone(),
            volume: config.default_volume,
        },
    );
    let announcer = Arc::new(DiscordAnnouncer::new(Arc::new(Http::new(
        &config.discord_token,
    ))));
    let registry = Arc::new(SessionRegistry::new(SessionDeps {
        connector: Arc::new(connector),
        extractor,
        announcer: announcer.clone(),
        policy: SessionPolicy::from(&config),
    }));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();
    let handler = RadioBot::new(
        Arc::new(config),
        resolver,
        registry.clone(),
        announcer,
    );

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    client.start().await?;

    Ok(())
}

async fn health_check() -> Result<()> {
    dotenvy::dotenv().ok();
    let ytdlp = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());
    let ffmpeg = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());

    health::verify_dependencies(&ytdlp, &ffmpeg)
        .await
        .context("Dependencias faltantes")?;

    println!("OK");
    Ok(())
}
