use dashmap::DashMap;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    audio::session::{Announcement, Announcer},
    ui::embeds,
};

/// Publica los eventos de las sesiones en el canal de texto del último comando.
pub struct DiscordAnnouncer {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl DiscordAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn remember_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }
}

impl Announcer for DiscordAnnouncer {
    fn announce(&self, guild_id: GuildId, announcement: Announcement) {
        let Some(channel_id) = self.channels.get(&guild_id).map(|c| *c) else {
            debug!("🔇 Sin canal de texto para anunciar en guild {}", guild_id);
            return;
        };

        let message = render(&announcement);
        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(e) = channel_id.send_message(&http, message).await {
                warn!("⚠️ No se pudo anunciar en canal {}: {:?}", channel_id, e);
            }
        });
    }
}

fn render(announcement: &Announcement) -> CreateMessage {
    match announcement {
        Announcement::NowPlaying(now) => {
            CreateMessage::new().embed(embeds::create_now_playing_embed(now))
        }
        other => CreateMessage::new().content(announcement_text(other)),
    }
}

pub(crate) fn announcement_text(announcement: &Announcement) -> String {
    match announcement {
        Announcement::NowPlaying(now) => format!("🎵 Reproduciendo: **{}**", now.title()),
        Announcement::TrackFailed { item, reason } => format!(
            "❌ <@{}> no se pudo reproducir **{}**: {}",
            item.requested_by, item.title, reason
        ),
        Announcement::RadioGaveUp { station, attempts } => format!(
            "📡 La radio **{}** dejó de responder tras {} reintentos",
            station.name, attempts
        ),
        Announcement::AutoDisconnected => {
            "👋 Me desconecté porque no quedaba nadie en el canal".to_string()
        }
    }
}
