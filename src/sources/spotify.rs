use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ResolveError, Track, TrackResolver};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Margen para renovar el token antes de que Spotify lo invalide
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Límite de la API de búsqueda de Spotify
const MAX_SEARCH_LIMIT: usize = 50;

static SPOTIFY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:open|play)\.spotify\.com/(?:intl-[a-zA-Z-]+/)?(track|album|playlist|artist)/([a-zA-Z0-9]+)",
    )
    .expect("regex de URL de Spotify inválida")
});

/// Enlace al catálogo reconocido dentro de una consulta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogLink<'a> {
    Track(&'a str),
    Album(&'a str),
    Playlist(&'a str),
    Artist(&'a str),
}

impl<'a> CatalogLink<'a> {
    /// Devuelve `None` si la consulta no es una URL de Spotify (búsqueda libre).
    pub fn parse(query: &'a str) -> Option<Self> {
        let captures = SPOTIFY_URL.captures(query.trim())?;
        let id = captures.get(2)?.as_str();

        match captures.get(1)?.as_str() {
            "track" => Some(Self::Track(id)),
            "album" => Some(Self::Album(id)),
            "playlist" => Some(Self::Playlist(id)),
            "artist" => Some(Self::Artist(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    tracks: Paging<SpotifyTrack>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlbumRef {
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    duration_ms: u64,
    preview_url: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
    /// Ausente en los tracks simplificados de un álbum
    album: Option<AlbumRef>,
}

impl SpotifyTrack {
    fn into_track(self, album_fallback: Option<&AlbumRef>) -> Track {
        let artist = self
            .artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut track = Track::new(self.name, artist, self.external_urls.spotify.unwrap_or_default())
            .with_duration(Duration::from_millis(self.duration_ms));

        if let Some(preview_url) = self.preview_url {
            track = track.with_source_ref(preview_url);
        }

        if let Some(album) = self.album.as_ref().or(album_fallback) {
            track = track.with_album(album.name.clone());
            if let Some(image) = album.images.first() {
                track = track.with_artwork_url(image.url.clone());
            }
        }

        track
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Cliente del catálogo de Spotify (credenciales de aplicación).
///
/// Las URLs de track, álbum y playlist se resuelven directamente; cualquier
/// otra consulta se trata como búsqueda de tracks. La `preview_url` de cada
/// track es su referencia reproducible.
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client_id,
            client_secret,
            http,
            token: Mutex::new(None),
        })
    }

    /// Pide un token para comprobar que las credenciales sirven
    pub async fn verify_credentials(&self) -> Result<(), ResolveError> {
        self.access_token().await.map(|_| ())
    }

    async fn access_token(&self) -> Result<String, ResolveError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| map_http_error(e, Endpoint::Token))?
            .json()
            .await
            .map_err(|e| map_http_error(e, Endpoint::Token))?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(AccessToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(response.access_token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ResolveError> {
        let token = self.access_token().await?;

        self.http
            .get(format!("{}{}", API_BASE, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| map_http_error(e, endpoint))?
            .json()
            .await
            .map_err(|e| map_http_error(e, endpoint))
    }

    async fn get_track(&self, id: &str) -> Result<Vec<Track>, ResolveError> {
        let track: SpotifyTrack = self.get_json(Endpoint::Lookup, &format!("/tracks/{}", id), &[]).await?;
        Ok(vec![track.into_track(None)])
    }

    async fn get_album(&self, id: &str, limit: usize) -> Result<Vec<Track>, ResolveError> {
        let album: SpotifyAlbum = self.get_json(Endpoint::Lookup, &format!("/albums/{}", id), &[]).await?;
        let album_ref = AlbumRef {
            name: album.name,
            images: album.images,
        };

        Ok(album
            .tracks
            .items
            .into_iter()
            .take(limit)
            .map(|track| track.into_track(Some(&album_ref)))
            .collect())
    }

    async fn get_playlist(&self, id: &str, limit: usize) -> Result<Vec<Track>, ResolveError> {
        let page: Paging<PlaylistItem> = self
            .get_json(
                Endpoint::Lookup,
                &format!("/playlists/{}/tracks", id),
                &[("limit", limit.clamp(1, 100).to_string())],
            )
            .await?;

        Ok(page
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .take(limit)
            .map(|track| track.into_track(None))
            .collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, ResolveError> {
        let response: SearchResponse = self
            .get_json(
                Endpoint::Search,
                "/search",
                &[
                    ("q", query.to_string()),
                    ("type", "track".to_string()),
                    ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
                ],
            )
            .await?;

        Ok(response
            .tracks
            .items
            .into_iter()
            .map(|track| track.into_track(None))
            .collect())
    }
}

#[async_trait]
impl TrackResolver for SpotifyClient {
    async fn resolve(&self, query: &str, max_results: usize) -> Result<Vec<Track>, ResolveError> {
        let max_results = max_results.max(1);

        let tracks = match CatalogLink::parse(query) {
            Some(CatalogLink::Track(id)) => self.get_track(id).await?,
            Some(CatalogLink::Album(id)) => self.get_album(id, max_results).await?,
            Some(CatalogLink::Playlist(id)) => self.get_playlist(id, max_results).await?,
            Some(CatalogLink::Artist(id)) => {
                debug!("URL de artista no soportada: {}", id);
                return Err(ResolveError::NotFound);
            }
            None => self.search(query, max_results).await?,
        };

        if tracks.is_empty() {
            return Err(ResolveError::NotFound);
        }

        info!("🔍 Spotify resolvió {} track(s) para '{}'", tracks.len(), query);
        Ok(tracks)
    }
}

/// Endpoint que respondió, para interpretar su código de estado
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Token,
    Lookup,
    Search,
}

fn map_http_error(error: reqwest::Error, endpoint: Endpoint) -> ResolveError {
    if error.is_timeout() {
        return ResolveError::Timeout;
    }

    let mapped = match error.status() {
        Some(status) => status_error(status, endpoint),
        None => ResolveError::Upstream(error.to_string()),
    };

    if let ResolveError::Upstream(_) = mapped {
        warn!("❌ Error de la API de Spotify ({:?}): {}", endpoint, error);
    }
    mapped
}

fn status_error(status: StatusCode, endpoint: Endpoint) -> ResolveError {
    match (endpoint, status) {
        // el endpoint de token responde 400 invalid_client a credenciales malas
        (Endpoint::Token, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) => {
            ResolveError::Upstream(format!("credenciales de Spotify rechazadas ({})", status))
        }
        // Spotify responde 400 a IDs mal formados
        (Endpoint::Lookup, StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) => ResolveError::NotFound,
        (Endpoint::Search, StatusCode::NOT_FOUND) => ResolveError::NotFound,
        _ => ResolveError::Upstream(format!("Spotify respondió {}", status)),
    }
}
