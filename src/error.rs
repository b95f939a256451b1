//! # Errors
//!
//! Typed error taxonomy for the radio bot.
//!
//! - [`CatalogError`]: the station catalog could not be loaded. Fatal at startup.
//! - [`ResolveError`]: a user request could not be turned into something playable.
//! - [`ConnectError`]: the voice connection could not be established.
//! - [`TranscodeError`]: the ffmpeg bridge failed to start.
//! - [`PlaybackError`]: session-level failures, wrapping the two above.
//!
//! The `Display` text of the recoverable errors is what users see, so it is
//! kept short and in the bot's language. Anything else is reported with a
//! generic message via [`user_message`].

use serenity::model::id::ChannelId;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no se encontró el catálogo de estaciones (buscado en: {searched:?})")]
    NotFound { searched: Vec<PathBuf> },

    #[error("error al leer el catálogo: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("la estación #{index} no tiene el campo obligatorio `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("la estación '{name}' tiene una URL inválida: {url}")]
    InvalidUrl { name: String, url: String },

    #[error("nombre de estación duplicado: '{0}'")]
    DuplicateName(String),

    #[error("no hay candidatos para elegir")]
    NoCandidates,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Estación desconocida '{name}'. Disponibles: {available}")]
    StationNotFound { name: String, available: String },

    #[error("No se encontraron estaciones para las etiquetas: {0}")]
    NoMatch(String),

    #[error("No se encontraron resultados para: {0}")]
    NoResults(String),

    #[error("No se pudo extraer el audio: {0}")]
    Extraction(String),

    #[error("La extracción tardó demasiado ({0:?})")]
    Timeout(std::time::Duration),

    #[error("Error consultando el directorio de radios: {0}")]
    Directory(String),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Debes estar en un canal de voz")]
    NotInVoice,

    #[error("Ya estoy conectado en otro canal (<#{0}>)")]
    AlreadyConnected(ChannelId),

    #[error("No tengo permisos para entrar a ese canal")]
    PermissionDenied,

    #[error("No se pudo conectar al canal de voz: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("no se pudo iniciar ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("stream inválido: {0}")]
    Stream(String),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("No estoy conectado a un canal de voz, usa /join primero")]
    NotConnected,

    #[error("No hay nada reproduciéndose ahora mismo")]
    NothingPlaying,

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("La sesión de este servidor se cerró, inténtalo de nuevo")]
    SessionClosed,

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Fallo de reproducción: {0}")]
    Transcode(#[from] TranscodeError),
}

/// Traduce un error de comando a un mensaje corto para el usuario.
pub fn user_message(err: &anyhow::Error) -> String {
    if let Some(e) = err.downcast_ref::<ResolveError>() {
        return e.to_string();
    }
    if let Some(e) = err.downcast_ref::<PlaybackError>() {
        return e.to_string();
    }
    if let Some(e) = err.downcast_ref::<ConnectError>() {
        return e.to_string();
    }
    if let Some(e) = err.downcast_ref::<CatalogError>() {
        return e.to_string();
    }

    error!("❌ Error inesperado en comando: {:?}", err);
    "Ocurrió un error inesperado, inténtalo más tarde".to_string()
}
