//! Errores de los comandos de la cola

use std::time::Duration;
use thiserror::Error;

use super::{sink::SinkError, state::PlaybackPhase};
use crate::sources::Track;

/// Resultado negativo de un comando sobre la cola de una guild.
///
/// Ninguna variante es fatal: todas describen un comando que no pudo
/// aplicarse y dejan el estado de la guild intacto.
#[derive(Debug, Error)]
pub enum QueueError {
    /// El catálogo no encontró nada
    #[error("no se encontró nada para '{query}'")]
    NotFound { query: String },

    /// El track existe pero no tiene audio reproducible
    #[error("'{}' no tiene preview disponible", .0.title())]
    NoPlayableSource(Box<Track>),

    #[error("el catálogo no respondió en {0:?}")]
    ResolutionTimeout(Duration),

    #[error("el catálogo no está disponible: {0}")]
    ResolverUnavailable(String),

    #[error("no hay nada reproduciéndose")]
    NothingPlaying,

    #[error("estado inválido: se esperaba {expected}, estado actual {actual}")]
    InvalidState {
        expected: PlaybackPhase,
        actual: PlaybackPhase,
    },

    /// El sink rechazó el primer track de un `enqueue`
    #[error("no se pudo iniciar la reproducción: {0}")]
    SinkStartFailure(#[source] SinkError),

    #[error("error del reproductor: {0}")]
    Sink(#[source] SinkError),

    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },
}

/// Result type for queue commands
pub type Result<T> = std::result::Result<T, QueueError>;
