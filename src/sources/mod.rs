//! # Sources Module
//!
//! Catalog lookups that turn a user query into [`Track`] metadata.
//!
//! The playback core only sees the [`TrackResolver`] trait; concrete catalogs
//! (currently [`spotify::SpotifyClient`]) live behind it. A resolved track
//! carries an optional playable reference: catalogs often know about a song
//! without being able to hand out audio for it.

pub mod spotify;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use spotify::SpotifyClient;

/// Errores de resolución del catálogo
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no se encontraron resultados")]
    NotFound,

    #[error("el catálogo no respondió a tiempo")]
    Timeout,

    #[error("fallo del catálogo: {0}")]
    Upstream(String),
}

/// Busca tracks en un catálogo externo.
///
/// `query` es texto libre o una URL reconocida por el catálogo; quien llama no
/// interpreta la URL. Devuelve como mucho `max_results` tracks, el mejor
/// resultado primero.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, max_results: usize) -> Result<Vec<Track>, ResolveError>;
}

/// Representa un track resuelto. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    artist: String,
    duration: Duration,
    source_ref: Option<String>,
    catalog_url: String,
    album: Option<String>,
    artwork_url: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, catalog_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            duration: Duration::ZERO,
            source_ref: None,
            catalog_url: catalog_url.into(),
            album: None,
            artwork_url: None,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> &str {
        &self.artist
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    /// Referencia de audio reproducible, `None` si el track es solo metadata
    pub fn source_ref(&self) -> Option<&str> {
        self.source_ref.as_deref()
    }
    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }
    pub fn album(&self) -> Option<&str> {
        self.album.as_deref()
    }
    pub fn artwork_url(&self) -> Option<&str> {
        self.artwork_url.as_deref()
    }

    pub fn is_playable(&self) -> bool {
        self.source_ref.is_some()
    }

    // Setters
    /// La duración se guarda en segundos enteros.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Duration::from_secs(duration.as_secs());
        self
    }

    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_artwork_url(mut self, artwork_url: impl Into<String>) -> Self {
        self.artwork_url = Some(artwork_url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_truncated_to_whole_seconds() {
        let track = Track::new("Song", "Artist", "https://open.spotify.com/track/x")
            .with_duration(Duration::from_millis(180_900));

        assert_eq!(track.duration(), Duration::from_secs(180));
    }

    #[test]
    fn test_playable_only_with_source_ref() {
        let track = Track::new("Song", "Artist", "https://open.spotify.com/track/x");
        assert!(!track.is_playable());
        assert!(track.with_source_ref("https://p.scdn.co/mp3-preview/x").is_playable());
    }
}
