//! # Bot Module
//!
//! Discord surface of the radio bot.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command and select-menu handling ([`handlers`])
//! - Voice state tracking for auto-disconnect ([`events`])
//! - Delivery of session announcements to text channels ([`announcer`])
//! - Background maintenance of the session registry
//!
//! ## Architecture
//!
//! [`RadioBot`] implements Serenity's [`EventHandler`]. It owns nothing that
//! plays audio: every command is resolved through the [`Resolver`] and then
//! handed to the guild's session from the [`SessionRegistry`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

pub mod announcer;
pub mod commands;
pub mod events;
pub mod handlers;

pub use announcer::DiscordAnnouncer;

use crate::{audio::SessionRegistry, config::Config, health, sources::Resolver};

pub struct RadioBot {
    config: Arc<Config>,
    resolver: Arc<Resolver>,
    registry: Arc<SessionRegistry>,
    announcer: Arc<DiscordAnnouncer>,
    maintenance_started: AtomicBool,
}

impl RadioBot {
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<Resolver>,
        registry: Arc<SessionRegistry>,
        announcer: Arc<DiscordAnnouncer>,
    ) -> Self {
        Self {
            config,
            resolver,
            registry,
            announcer,
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash: por guild si hay `GUILD_ID`, si no globales.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RadioBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión del gateway
        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let registry = self.registry.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                maintenance_tasks(config, registry).await;
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        events::handle_voice_state_update(&ctx, &self.registry, old.as_ref(), &new);
    }
}

/// Tareas periódicas: limpieza del registro y verificación de dependencias.
async fn maintenance_tasks(config: Arc<Config>, registry: Arc<SessionRegistry>) {
    let mut interval = tokio::time::interval(config.maintenance_interval);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;

        registry.reap_dormant();

        if let Err(e) = health::verify_dependencies(&config.ytdlp_path, &config.ffmpeg_path).await
        {
            warn!("⚠️ Error verificando dependencias: {:?}", e);
        }

        info!(
            "🧹 Tareas de mantenimiento completadas ({} sesiones activas)",
            registry.len()
        );
    }
}
