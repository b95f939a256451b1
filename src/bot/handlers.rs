use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        id::{ChannelId, GuildId, UserId},
        permissions::Permissions,
    },
    prelude::Context,
};
use tracing::{info, warn};

use super::RadioBot;
use crate::{
    audio::{
        session::{EnqueueOutcome, JoinOutcome, NowPlaying, PlaybackState, SessionSnapshot},
        SessionHandle,
    },
    catalog::Station,
    error::{user_message, ConnectError, PlaybackError},
    sources::{OnDemandQuery, StationChoice},
    ui::{components, embeds},
};

/// Respuesta de un comando ya diferido
#[derive(Default)]
struct Reply {
    content: Option<String>,
    embed: Option<CreateEmbed>,
    components: Option<Vec<CreateActionRow>>,
}

impl Reply {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    fn embed(embed: CreateEmbed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    fn with_components(mut self, components: Vec<CreateActionRow>) -> Self {
        self.components = Some(components);
        self
    }

    fn into_edit(self) -> EditInteractionResponse {
        let mut edit = EditInteractionResponse::new();
        if let Some(content) = self.content {
            edit = edit.content(content);
        }
        if let Some(embed) = self.embed {
            edit = edit.embed(embed);
        }
        if let Some(components) = self.components {
            edit = edit.components(components);
        }
        edit
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Ping responde al instante, sin diferir
    if command.data.name == "ping" {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("🏓 Pong!")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    }

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;
    bot.announcer.remember_channel(guild_id, command.channel_id);

    let result = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "play_tags" => handle_play_tags(ctx, &command, bot, guild_id).await,
        "play_yt" => handle_play_yt(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(bot, guild_id).await,
        "skip" => handle_skip(bot, guild_id).await,
        "stop" => handle_stop(bot, guild_id).await,
        "list" => Ok(Reply::embed(embeds::create_station_list_embed(
            bot.resolver.catalog(),
        ))),
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        _ => Ok(Reply::text("❌ Comando no reconocido")),
    };

    let response = match result {
        Ok(reply) => reply.into_edit(),
        Err(e) => {
            warn!("⚠️ /{} falló en guild {}: {}", command.data.name, guild_id, e);
            EditInteractionResponse::new().embed(embeds::create_error_embed(&user_message(&e)))
        }
    };
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

/// Maneja interacciones con componentes (selector de estaciones)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &RadioBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Componente {} usado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    if component.data.custom_id != components::STATION_SELECT {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Acción no reconocida")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    }

    component.defer(&ctx.http).await?;
    bot.announcer.remember_channel(guild_id, component.channel_id);

    let selected = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values
            .first()
            .and_then(|value| components::selected_station(bot.resolver.catalog(), value))
            .cloned(),
        _ => None,
    };

    let response = match selected {
        Some(station) => {
            match play_station(ctx, bot, guild_id, component.user.id, station).await {
                // El selector se reemplaza por la estación elegida
                Ok(reply) => reply
                    .into_edit()
                    .content(format!("📻 Elegida por <@{}>", component.user.id))
                    .components(Vec::new()),
                Err(e) => {
                    warn!("⚠️ Selector de estación falló en guild {}: {}", guild_id, e);
                    EditInteractionResponse::new()
                        .embed(embeds::create_error_embed(&user_message(&e)))
                }
            }
        }
        None => EditInteractionResponse::new()
            .embed(embeds::create_error_embed("Estación no válida")),
    };
    component.edit_response(&ctx.http, response).await?;

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
) -> Result<Reply> {
    match bot.resolver.resolve_station(string_option(command, "station"))? {
        StationChoice::Found(station) => {
            play_station(ctx, bot, guild_id, command.user.id, station).await
        }
        StationChoice::Prompt => {
            let catalog = bot.resolver.catalog();
            let Some(menu) = components::create_station_select(catalog) else {
                return Ok(Reply::embed(embeds::create_warning_embed(
                    "Sin estaciones",
                    "📭 No hay estaciones configuradas en el catálogo",
                )));
            };

            let text = if catalog.len() > components::MAX_OPTIONS {
                format!(
                    "📻 Elige una estación (mostrando {} de {}, usa `/play <nombre>` para el resto)",
                    components::MAX_OPTIONS,
                    catalog.len()
                )
            } else {
                "📻 Elige una estación".to_string()
            };
            Ok(Reply::text(text).with_components(menu))
        }
    }
}

async fn handle_play_tags(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
) -> Result<Reply> {
    let tags = string_option(command, "tags")
        .ok_or_else(|| anyhow::anyhow!("Etiquetas no proporcionadas"))?;

    let station = bot.resolver.resolve_tagged(tags).await?;
    play_station(ctx, bot, guild_id, command.user.id, station).await
}

async fn handle_play_yt(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
) -> Result<Reply> {
    let raw = string_option(command, "query").unwrap_or_default();
    if raw.trim().is_empty() {
        return Ok(Reply::text("❌ Escribe una URL o un término de búsqueda"));
    }
    let query = OnDemandQuery::classify(raw);

    // Conectar antes de la extracción: falla rápido si el usuario no está en voz
    let session = connect_session(ctx, bot, guild_id, command.user.id).await?;
    let item = bot.resolver.resolve_on_demand(&query, command.user.id).await?;

    let reply = match session.enqueue(item).await? {
        EnqueueOutcome::Started(item) => {
            embeds::create_now_playing_embed(&NowPlaying::Track(item))
        }
        EnqueueOutcome::Queued { position, item } => {
            embeds::create_track_queued_embed(&item, position)
        }
    };
    Ok(Reply::embed(reply))
}

async fn handle_queue(bot: &RadioBot, guild_id: GuildId) -> Result<Reply> {
    let snapshot = match bot.registry.get(guild_id) {
        Some(session) => session.snapshot().await?,
        None => SessionSnapshot {
            state: PlaybackState::Idle,
            channel: None,
            current: None,
            pending: Vec::new(),
        },
    };

    Ok(Reply::embed(embeds::create_queue_embed(&snapshot)))
}

async fn handle_skip(bot: &RadioBot, guild_id: GuildId) -> Result<Reply> {
    let session = bot
        .registry
        .get(guild_id)
        .ok_or(PlaybackError::NothingPlaying)?;
    let outcome = session.skip().await?;

    let mut text = format!("⏭️ Saltado: **{}**", outcome.skipped.title());
    match outcome.next {
        Some(next) => text.push_str(&format!("\n▶️ Ahora: **{}**", next.title)),
        None => text.push_str("\n📭 No quedan canciones en la cola"),
    }
    Ok(Reply::text(text))
}

async fn handle_stop(bot: &RadioBot, guild_id: GuildId) -> Result<Reply> {
    if let Some(session) = bot.registry.get(guild_id) {
        session.stop().await?;
    }
    Ok(Reply::text("⏹️ Reproducción detenida, cola limpiada y desconectado"))
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
) -> Result<Reply> {
    let channel_id = user_voice_channel(ctx, guild_id, command.user.id)?;
    let session = bot.registry.get_or_create(guild_id);

    let text = match session.join(channel_id).await? {
        JoinOutcome::Joined => format!("🔊 Conectado a <#{}>", channel_id),
        JoinOutcome::AlreadyHere => format!("✅ Ya estoy en <#{}>", channel_id),
    };
    Ok(Reply::text(text))
}

// Funciones auxiliares

async fn play_station(
    ctx: &Context,
    bot: &RadioBot,
    guild_id: GuildId,
    user_id: UserId,
    station: Station,
) -> Result<Reply> {
    let session = connect_session(ctx, bot, guild_id, user_id).await?;
    session.play_now(station.clone()).await?;

    Ok(Reply::embed(embeds::create_now_playing_embed(
        &NowPlaying::Radio(station),
    )))
}

/// Sesión de la guild conectada al canal de voz del usuario.
async fn connect_session(
    ctx: &Context,
    bot: &RadioBot,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<SessionHandle> {
    let channel_id = user_voice_channel(ctx, guild_id, user_id)?;
    let session = bot.registry.get_or_create(guild_id);
    session.join(channel_id).await?;
    Ok(session)
}

fn user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId, ConnectError> {
    let bot_id = ctx.cache.current_user().id;
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| ConnectError::Failed("servidor no disponible en caché".into()))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or(ConnectError::NotInVoice)?;

    // Sin el miembro del bot en caché se deja decidir a Discord
    if let (Some(channel), Some(member)) =
        (guild.channels.get(&channel_id), guild.members.get(&bot_id))
    {
        let permissions = guild.user_permissions_in(channel, member);
        if !permissions.contains(Permissions::CONNECT | Permissions::SPEAK) {
            return Err(ConnectError::PermissionDenied);
        }
    }

    Ok(channel_id)
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}
