use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use super::truncate;
use crate::{
    audio::{
        queue::QueueItem,
        session::{NowPlaying, PlaybackState, SessionSnapshot},
    },
    catalog::{Station, StationCatalog},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const RADIO_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "📻 Open Radio";

// Discord admite 4096 caracteres en la descripción
const MAX_DESCRIPTION: usize = 4000;

/// Crea un embed para lo que está sonando
pub fn create_now_playing_embed(now: &NowPlaying) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", now.title()))
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    match now {
        NowPlaying::Radio(station) => embed
            .color(colors::RADIO_PURPLE)
            .field("📻 Tipo", "Radio en vivo", true)
            .field("🏷️ Etiquetas", format_tags(station), true)
            .url(station.stream_url.as_str()),
        NowPlaying::Track(item) => embed
            .color(colors::SUCCESS_GREEN)
            .field("⏱️ Duración", format_item_duration(item), true)
            .field("👤 Solicitado por", format!("<@{}>", item.requested_by), true)
            .url(&item.source_url),
    }
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_queued_embed(item: &QueueItem, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Agregada a la Cola")
        .description(format!("**{}**", item.title))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true)
        .field("⏱️ Duración", format_item_duration(item), true)
        .field("👤 Solicitado por", format!("<@{}>", item.requested_by), true)
        .url(&item.source_url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando termine lo actual",
        ))
}

pub fn create_queue_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    match &snapshot.current {
        Some(current) => {
            let status = match snapshot.state {
                PlaybackState::Paused => "🔄 Reconectando",
                _ => "▶️ Reproduciendo",
            };
            let kind = if current.is_continuous() { " (radio)" } else { "" };
            embed = embed.field(status, format!("**{}**{}", current.title(), kind), false);
        }
        None if snapshot.pending.is_empty() => {
            return embed
                .description("😴 **La cola está vacía**\n\n💡 Usa `/play_yt <canción>` para agregar música")
                .color(colors::NEUTRAL_GRAY);
        }
        None => {}
    }

    if !snapshot.pending.is_empty() {
        embed = embed.description(format_queue_lines(&snapshot.pending));

        let total: Duration = snapshot.pending.iter().filter_map(|i| i.duration).sum();
        let mut info = format!("**Total:** {} canciones", snapshot.pending.len());
        if total > Duration::ZERO {
            info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
        }
        embed = embed.field("Información", info, false);
    }

    embed
}

pub fn create_station_list_embed(catalog: &StationCatalog) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📻 Estaciones Disponibles")
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(format!(
            "{} estaciones • {}",
            catalog.len(),
            STANDARD_FOOTER
        )));

    if catalog.is_empty() {
        return embed
            .description("No hay estaciones configuradas")
            .color(colors::NEUTRAL_GRAY);
    }

    embed
        .description(join_limited(
            catalog.stations().iter().map(format_station_line),
            MAX_DESCRIPTION,
        ))
        .color(colors::RADIO_PURPLE)
}

/// Crea un embed de error
pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn format_station_line(station: &Station) -> String {
    format!(
        "**{}**\n{} • {}",
        station.name,
        truncate(station.stream_url.as_str(), 100),
        format_tags(station)
    )
}

pub fn format_queue_lines(pending: &[QueueItem]) -> String {
    join_limited(
        pending.iter().enumerate().map(|(i, item)| {
            let duration = item
                .duration
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            format!(
                "**{}**. {}{} • <@{}>",
                i + 1,
                truncate(&item.title, 80),
                duration,
                item.requested_by
            )
        }),
        MAX_DESCRIPTION,
    )
}

/// Une líneas hasta `max` caracteres; el resto se resume.
fn join_limited(lines: impl Iterator<Item = String>, max: usize) -> String {
    let lines: Vec<String> = lines.collect();
    let mut out = String::new();

    for (shown, line) in lines.iter().enumerate() {
        let remaining = lines.len() - shown;
        let footer = format!("\n… y {} más", remaining);
        if out.chars().count() + line.chars().count() + 1 + footer.chars().count() > max {
            out.push_str(&footer);
            return out.trim_start().to_string();
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

fn format_tags(station: &Station) -> String {
    if station.tags.is_empty() {
        "sin etiquetas".to_string()
    } else {
        station
            .tags
            .iter()
            .map(|t| format!("`{}`", t))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn format_item_duration(item: &QueueItem) -> String {
    match item.duration {
        Some(duration) if !item.is_live => format_duration(duration),
        _ => "🔴 En vivo".to_string(),
    }
}

/// Formatea una duración en formato legible
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
