//! Vistas puras sobre un snapshot de la cola.
//!
//! Todas las funciones reciben un único [`QueueSnapshot`], así que las
//! posiciones mostradas siempre cuadran con las canciones listadas.

use std::time::Duration;

use crate::{
    audio::{PlaybackPhase, QueueSnapshot},
    sources::Track,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingView {
    pub track: Track,
    pub paused: bool,
    pub queue_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedView {
    pub track: Track,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub position: usize,
    pub track: Track,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueListing {
    pub now_playing: Option<NowPlayingView>,
    pub entries: Vec<QueueEntry>,
    /// Canciones pendientes que no entraron en `entries`
    pub overflow: usize,
    pub total: usize,
    pub total_duration: Duration,
}

impl QueueListing {
    pub fn is_empty(&self) -> bool {
        self.now_playing.is_none() && self.total == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    pub position: usize,
    pub track: Track,
    pub playable: bool,
}

/// `None` cuando no hay nada cargado
pub fn now_playing(snapshot: &QueueSnapshot) -> Option<NowPlayingView> {
    let track = snapshot.now_playing.clone()?;

    Some(NowPlayingView {
        track,
        paused: snapshot.phase == PlaybackPhase::Paused,
        queue_len: snapshot.pending.len(),
    })
}

/// Vista del track que acaba de arrancar con la cola vacía
pub fn started(track: Track) -> NowPlayingView {
    NowPlayingView {
        track,
        paused: false,
        queue_len: 0,
    }
}

pub fn queued(track: Track, position: usize) -> QueuedView {
    QueuedView { track, position }
}

pub fn queue_listing(snapshot: &QueueSnapshot, limit: usize) -> QueueListing {
    let entries: Vec<QueueEntry> = snapshot
        .pending
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, track)| QueueEntry {
            position: i + 1,
            track: track.clone(),
        })
        .collect();

    QueueListing {
        now_playing: now_playing(snapshot),
        overflow: snapshot.pending.len() - entries.len(),
        entries,
        total: snapshot.pending.len(),
        total_duration: snapshot.pending.iter().map(Track::duration).sum(),
    }
}

pub fn search_listing(results: &[Track]) -> Vec<SearchEntry> {
    results
        .iter()
        .enumerate()
        .map(|(i, track)| SearchEntry {
            position: i + 1,
            track: track.clone(),
            playable: track.is_playable(),
        })
        .collect()
}

/// `M:SS`, o `H:MM:SS` desde una hora
pub fn format_duration(duration: Duration) -> String {
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
