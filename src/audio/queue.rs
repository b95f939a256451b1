use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{error::PlaybackError, sources::TrackInfo};

/// Track on-demand pendiente de reproducción.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub title: String,
    /// URL de la página (no la URL de audio, que caduca)
    pub source_url: String,
    pub requested_by: UserId,
    pub duration: Option<Duration>,
    pub is_live: bool,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(info: TrackInfo, requested_by: UserId) -> Self {
        Self {
            title: info.title,
            source_url: info.page_url,
            requested_by,
            duration: info.duration,
            is_live: info.is_live,
            added_at: Utc::now(),
        }
    }
}

/// Cola FIFO de una guild. Solo la sesión de esa guild la modifica.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<QueueItem>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega al final. Devuelve la posición (1-based) en la cola.
    pub fn push(&mut self, item: QueueItem) -> Result<usize, PlaybackError> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", item.title);
        self.items.push_back(item);
        Ok(self.items.len())
    }

    /// Siguiente track (FIFO - First In, First Out)
    pub fn pop(&mut self) -> Option<QueueItem> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => debug!("➡️ Siguiente en cola (FIFO): {}", item.title),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        if removed > 0 {
            info!("🗑️ Cola limpiada ({} canciones)", removed);
        }
        removed
    }

    pub fn items(&self) -> Vec<QueueItem> {
        self.items.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_item(title: &str) -> QueueItem {
    QueueItem::new(
        TrackInfo {
            title: title.to_string(),
            page_url: format!("https://www.youtube.com/watch?v={}", title),
            duration: Some(Duration::from_secs(180)),
            is_live: false,
        },
        UserId::new(1),
    )
}
