//! Playback sink seam.
//!
//! A sink streams one audio source per call to [`PlaybackSink::start`] and
//! reports the end of that stream exactly once through the
//! [`CompletionNotifier`] it was handed. Notifications travel over an
//! unbounded channel back to the queue manager, which decides whether they
//! still refer to the guild's current stream.

use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Identificador de stream, único en todo el proceso
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stream activo de una guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    pub guild_id: GuildId,
    pub id: StreamId,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("el bot no está conectado a un canal de voz")]
    NotConnected,

    #[error("el reproductor rechazó el audio: {0}")]
    Rejected(String),

    #[error("el stream ya terminó")]
    StreamEnded,
}

/// Fin de un stream, con el error que lo terminó si lo hubo
#[derive(Debug)]
pub struct Completion {
    pub handle: StreamHandle,
    pub error: Option<SinkError>,
}

pub type CompletionSender = mpsc::UnboundedSender<Completion>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

/// Aviso de fin de stream. Se consume al disparar, así que dispara como
/// mucho una vez.
#[derive(Debug)]
pub struct CompletionNotifier {
    handle: StreamHandle,
    tx: CompletionSender,
}

impl CompletionNotifier {
    pub(crate) fn new(handle: StreamHandle, tx: CompletionSender) -> Self {
        Self { handle, tx }
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn complete(self, error: Option<SinkError>) {
        let handle = self.handle;
        if self.tx.send(Completion { handle, error }).is_err() {
            debug!("Canal de finalización cerrado, se descarta el aviso del stream {}", handle.id);
        }
    }
}

/// Destino de audio de una guild.
///
/// Todas las operaciones vuelven sin esperar al audio: `start` deja el
/// stream registrado y el fin llega después por el notifier. Si `start`
/// falla, el notifier se descarta sin disparar.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    async fn start(&self, source: &str, notifier: CompletionNotifier) -> Result<(), SinkError>;

    async fn pause(&self, handle: StreamHandle) -> Result<(), SinkError>;

    async fn resume(&self, handle: StreamHandle) -> Result<(), SinkError>;

    /// Idempotente: detener un stream ya terminado no hace nada.
    async fn stop(&self, handle: StreamHandle);
}
