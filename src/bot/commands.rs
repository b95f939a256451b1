use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::{Command, CommandOptionType}, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        play_tags_command(),
        play_yt_command(),
        queue_command(),
        skip_command(),
        stop_command(),
        list_command(),
        join_command(),
        ping_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una estación de radio")
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "station",
            "Nombre de la estación (vacío para elegir de una lista)",
        ))
}

fn play_tags_command() -> CreateCommand {
    CreateCommand::new("play_tags")
        .description("Reproduce una radio al azar que coincida con las etiquetas")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "tags",
                "Etiquetas separadas por comas (ej: jazz, chill)",
            )
            .required(true),
        )
}

fn play_yt_command() -> CreateCommand {
    CreateCommand::new("play_yt")
        .description("Agrega una canción de YouTube a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

// Comandos de control

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, limpia la cola y desconecta")
}

// Comandos de información y conexión

fn list_command() -> CreateCommand {
    CreateCommand::new("list").description("Lista las estaciones disponibles")
}

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Comprueba que el bot responde")
}
