use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::sink::{CompletionNotifier, PlaybackSink, SinkError, StreamHandle};

type LiveTracks = Arc<DashMap<GuildId, (StreamHandle, TrackHandle)>>;

/// Sink que reproduce las previews por la conexión de voz de songbird.
///
/// Una guild tiene como mucho un track cargado; el `StreamHandle` guardado
/// junto al `TrackHandle` evita que un comando viejo toque un track nuevo.
pub struct SongbirdSink {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    tracks: LiveTracks,
    volume: f32,
}

impl SongbirdSink {
    pub fn new(songbird: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self {
            songbird,
            http,
            tracks: Arc::new(DashMap::new()),
            volume: 0.5,
        }
    }

    fn track_for(&self, handle: StreamHandle) -> Result<TrackHandle, SinkError> {
        match self.tracks.get(&handle.guild_id) {
            Some(entry) if entry.0 == handle => Ok(entry.1.clone()),
            _ => Err(SinkError::StreamEnded),
        }
    }
}

#[async_trait]
impl PlaybackSink for SongbirdSink {
    async fn start(&self, source: &str, notifier: CompletionNotifier) -> Result<(), SinkError> {
        let handle = notifier.handle();
        let call = self
            .songbird
            .get(handle.guild_id)
            .ok_or(SinkError::NotConnected)?;

        let input = HttpRequest::new(self.http.clone(), source.to_string());
        let track = {
            let mut call = call.lock().await;
            call.play_input(input.into())
        };

        let _ = track.set_volume(self.volume);

        // End y Error comparten el notifier; el primero que llegue lo consume
        let shared = Arc::new(Mutex::new(Some(notifier)));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let handler = StreamEndHandler {
                handle,
                notifier: Arc::clone(&shared),
                tracks: Arc::clone(&self.tracks),
            };

            if let Err(e) = track.add_event(Event::Track(event), handler) {
                let _ = track.stop();
                return Err(SinkError::Rejected(e.to_string()));
            }
        }

        if let Some((_, (previous, old_track))) = self.tracks.remove(&handle.guild_id) {
            debug!("Reemplazando stream {} en guild {}", previous.id, handle.guild_id);
            let _ = old_track.stop();
        }
        self.tracks.insert(handle.guild_id, (handle, track));

        debug!("▶️ Stream {} iniciado en guild {}", handle.id, handle.guild_id);
        Ok(())
    }

    async fn pause(&self, handle: StreamHandle) -> Result<(), SinkError> {
        self.track_for(handle)?
            .pause()
            .map_err(|_| SinkError::StreamEnded)
    }

    async fn resume(&self, handle: StreamHandle) -> Result<(), SinkError> {
        self.track_for(handle)?
            .play()
            .map_err(|_| SinkError::StreamEnded)
    }

    async fn stop(&self, handle: StreamHandle) {
        let removed = self
            .tracks
            .remove_if(&handle.guild_id, |_, (current, _)| *current == handle);

        if let Some((_, (_, track))) = removed {
            // ya terminado es lo mismo que detenido
            let _ = track.stop();
            info!("⏹️ Stream {} detenido en guild {}", handle.id, handle.guild_id);
        }
    }
}

struct StreamEndHandler {
    handle: StreamHandle,
    notifier: Arc<Mutex<Option<CompletionNotifier>>>,
    tracks: LiveTracks,
}

#[async_trait]
impl VoiceEventHandler for StreamEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let Some(notifier) = self.notifier.lock().take() else {
            return None;
        };

        let error = match ctx {
            EventContext::Track(states) => states.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(SinkError::Rejected(format!("{:?}", e))),
                _ => None,
            }),
            _ => None,
        };

        if let Some(e) = &error {
            warn!("❌ Stream {} falló en guild {}: {}", self.handle.id, self.handle.guild_id, e);
        }

        self.tracks
            .remove_if(&self.handle.guild_id, |_, (current, _)| *current == self.handle);
        notifier.complete(error);

        None
    }
}
