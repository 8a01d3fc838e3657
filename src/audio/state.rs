use serenity::model::id::GuildId;
use std::{collections::VecDeque, fmt};
use tracing::{debug, info};

use super::{
    error::{QueueError, Result},
    sink::StreamHandle,
};
use crate::sources::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackPhase::Idle => write!(f, "inactivo"),
            PlaybackPhase::Playing => write!(f, "reproduciendo"),
            PlaybackPhase::Paused => write!(f, "pausado"),
        }
    }
}

/// Track cargado en el sink (sonando o en pausa)
#[derive(Debug, Clone)]
pub(crate) struct ActiveStream {
    pub(crate) track: Track,
    pub(crate) handle: StreamHandle,
    pub(crate) paused: bool,
}

/// Estado de reproducción de una guild.
///
/// La fase se deriva del stream activo, así que "hay track actual" y "no
/// está inactivo" no pueden divergir. Un track sale de `pending` en el mismo
/// paso en que pasa a ser el actual.
#[derive(Debug)]
pub struct GuildPlaybackState {
    guild_id: GuildId,
    pending: VecDeque<Track>,
    active: Option<ActiveStream>,
    evicted: bool,
}

impl GuildPlaybackState {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            pending: VecDeque::new(),
            active: None,
            evicted: false,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn phase(&self) -> PlaybackPhase {
        match &self.active {
            None => PlaybackPhase::Idle,
            Some(active) if active.paused => PlaybackPhase::Paused,
            Some(_) => PlaybackPhase::Playing,
        }
    }

    pub fn now_playing(&self) -> Option<&Track> {
        self.active.as_ref().map(|active| &active.track)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_handle(&self) -> Option<StreamHandle> {
        self.active.as_ref().map(|active| active.handle)
    }

    /// Indica si `handle` es el stream que la guild tiene cargado ahora
    pub fn is_current(&self, handle: StreamHandle) -> bool {
        self.active_handle() == Some(handle)
    }

    /// Agrega un track al final y devuelve su posición (desde 1)
    pub fn push_back(&mut self, track: Track, max_size: usize) -> Result<usize> {
        if self.pending.len() >= max_size {
            return Err(QueueError::QueueFull { max: max_size });
        }

        self.pending.push_back(track);
        Ok(self.pending.len())
    }

    /// Agrega tantos tracks como quepan y devuelve cuántos entraron
    pub fn extend(&mut self, tracks: Vec<Track>, max_size: usize) -> usize {
        let available_space = max_size.saturating_sub(self.pending.len());
        let to_add = tracks.len().min(available_space);

        self.pending.extend(tracks.into_iter().take(to_add));
        to_add
    }

    /// Saca de la cabeza el siguiente track reproducible junto con su
    /// referencia de audio. Los tracks sin audio se descartan por el camino.
    pub fn pop_next_playable(&mut self) -> Option<(Track, String)> {
        while let Some(track) = self.pending.pop_front() {
            match track.source_ref().map(str::to_owned) {
                Some(source) => return Some((track, source)),
                None => debug!("⏭️ Saltando track sin preview: {}", track.title()),
            }
        }

        None
    }

    pub(crate) fn begin_stream(&mut self, track: Track, handle: StreamHandle) {
        self.active = Some(ActiveStream {
            track,
            handle,
            paused: false,
        });
    }

    pub(crate) fn retire_current(&mut self) -> Option<ActiveStream> {
        self.active.take()
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        if let Some(active) = self.active.as_mut() {
            active.paused = paused;
        }
    }

    /// Vacía la cola pendiente sin tocar el track actual
    pub fn clear_pending(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        info!("🗑️ Cola limpiada en guild {}: {} tracks removidos", self.guild_id, cleared);
        cleared
    }

    /// Vuelve a inactivo. Devuelve el stream que había que detener, si había uno.
    pub(crate) fn reset(&mut self) -> Option<StreamHandle> {
        self.pending.clear();
        self.active.take().map(|active| active.handle)
    }

    pub(crate) fn mark_evicted(&mut self) {
        self.evicted = true;
    }

    pub(crate) fn is_evicted(&self) -> bool {
        self.evicted
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            phase: self.phase(),
            now_playing: self.now_playing().cloned(),
            pending: self.pending.iter().cloned().collect(),
        }
    }
}

/// Copia consistente del estado de una guild en un instante
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub phase: PlaybackPhase,
    pub now_playing: Option<Track>,
    pub pending: Vec<Track>,
}

impl QueueSnapshot {
    pub fn idle() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            now_playing: None,
            pending: Vec::new(),
        }
    }
}
