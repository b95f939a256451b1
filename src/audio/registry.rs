use dashmap::DashMap;
use serenity::model::id::GuildId;
use tracing::{debug, info};

use super::session::{PlaybackState, SessionDeps, SessionHandle};

/// Registro explícito guild → sesión. Como máximo una sesión por guild.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
        }
    }

    /// Obtiene o crea la sesión de una guild.
    pub fn get_or_create(&self, guild_id: GuildId) -> SessionHandle {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Nueva sesión para guild {}", guild_id);
                SessionHandle::spawn(guild_id, self.deps.clone())
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Elimina sesiones inactivas: sin stream, sin conexión y sin comandos en curso.
    ///
    /// Devuelve cuántas se eliminaron.
    pub fn reap_dormant(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            let status = session.status();
            let dormant = status.state == PlaybackState::Idle
                && status.channel.is_none()
                && session.outstanding_refs() == 0;
            !dormant
        });

        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!("🧹 {} sesiones inactivas eliminadas", removed);
        }
        removed
    }

    /// Detiene todas las sesiones (transcoders y conexiones de voz).
    pub async fn shutdown(&self) {
        let sessions: Vec<SessionHandle> =
            self.sessions.iter().map(|entry| entry.clone()).collect();
        info!("🛑 Deteniendo {} sesiones", sessions.len());

        for session in sessions {
            let _ = session.stop().await;
        }
        self.sessions.clear();
    }
}
