use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::transcoder::{FfmpegBridge, TranscodeOptions, Transcoder};
use crate::error::ConnectError;

/// Conexiones de voz. La sesión no conoce songbird directamente.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Conecta al canal y devuelve el productor de audio de esa conexión.
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn Transcoder>, ConnectError>;

    async fn leave(&self, guild_id: GuildId);

    /// Si la conexión de voz de la guild sigue viva.
    async fn is_connected(&self, guild_id: GuildId) -> bool;
}

pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    options: TranscodeOptions,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, options: TranscodeOptions) -> Self {
        Self { manager, options }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn Transcoder>, ConnectError> {
        debug!("🔊 Conectando a canal {} en guild {}", channel_id, guild_id);

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| {
                warn!("❌ Error al unirse al canal de voz: {:?}", e);
                map_join_error(e)
            })?;

        // Auto-deafen para ahorrar ancho de banda
        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("⚠️ No se pudo ensordecer el bot: {:?}", e);
            }
        }

        info!("✅ Conectado a canal {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(FfmpegBridge::new(call, self.options.clone())))
    }

    async fn leave(&self, guild_id: GuildId) {
        if self.manager.get(guild_id).is_none() {
            return;
        }

        match self.manager.remove(guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", guild_id),
            Err(e) => warn!("⚠️ Error al salir del canal en guild {}: {:?}", guild_id, e),
        }
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        // songbird procesa el voice state antes que el EventHandler
        match self.manager.get(guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }
}

fn map_join_error(err: JoinError) -> ConnectError {
    match err {
        JoinError::TimedOut => ConnectError::Failed("tiempo de espera agotado".into()),
        other => ConnectError::Failed(other.to_string()),
    }
}
