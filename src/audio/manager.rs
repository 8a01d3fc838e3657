use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{
    error::{QueueError, Result},
    sink::{
        Completion, CompletionNotifier, CompletionReceiver, CompletionSender, PlaybackSink,
        SinkError, StreamHandle, StreamId,
    },
    state::{GuildPlaybackState, PlaybackPhase, QueueSnapshot},
};
use crate::sources::{ResolveError, Track, TrackResolver};

type GuildSlot = Arc<Mutex<GuildPlaybackState>>;

/// Límites de la cola que vienen de la configuración
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_queue_size: usize,
    pub resolve_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            resolve_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// La guild estaba inactiva y el track empezó a sonar
    StartedPlaying { track: Track },
    /// El track quedó en la cola, `position` empieza en 1
    Queued { track: Track, position: usize },
}

impl EnqueueOutcome {
    pub fn track(&self) -> &Track {
        match self {
            EnqueueOutcome::StartedPlaying { track } | EnqueueOutcome::Queued { track, .. } => track,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub resolved: usize,
    pub added: usize,
    /// Track que empezó a sonar si la guild estaba inactiva
    pub started: Option<Track>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipOutcome {
    pub skipped: Track,
    pub now_playing: Option<Track>,
}

/// Orquesta la reproducción de todas las guilds.
///
/// Cada guild tiene su propio estado detrás de su propio lock, creado la
/// primera vez que un comando la menciona. Las resoluciones de catálogo
/// corren fuera del lock; la decisión "sonar ya o encolar" y el arranque
/// del sink corren dentro.
///
/// Los avisos de fin de stream llegan por el canal devuelto en
/// [`QueueManager::new`] y se aplican con
/// [`QueueManager::on_playback_completion`]. Cada stream tiene un
/// [`StreamId`] que nunca se repite, así que un aviso de un stream que ya no
/// es el actual (detenido, saltado o de una guild desalojada) se ignora.
pub struct QueueManager {
    guilds: DashMap<GuildId, GuildSlot>,
    resolver: Arc<dyn TrackResolver>,
    sink: Arc<dyn PlaybackSink>,
    settings: QueueSettings,
    completions: CompletionSender,
    next_stream: AtomicU64,
}

impl QueueManager {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        sink: Arc<dyn PlaybackSink>,
        settings: QueueSettings,
    ) -> (Self, CompletionReceiver) {
        let (completions, receiver) = mpsc::unbounded_channel();

        let manager = Self {
            guilds: DashMap::new(),
            resolver,
            sink,
            settings,
            completions,
            next_stream: AtomicU64::new(1),
        };

        (manager, receiver)
    }

    /// Número de guilds con estado creado
    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    /// Resuelve la consulta y reproduce o encola el primer resultado
    pub async fn enqueue(&self, guild_id: GuildId, query: &str) -> Result<EnqueueOutcome> {
        let track = self
            .resolve(query, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::NotFound {
                query: query.to_string(),
            })?;

        let Some(source) = track.source_ref().map(str::to_owned) else {
            info!("🚫 '{}' no tiene preview, no se agrega", track.title());
            return Err(QueueError::NoPlayableSource(Box::new(track)));
        };

        let mut state = self.lock_guild(guild_id).await;

        if state.phase() != PlaybackPhase::Idle {
            let position = state.push_back(track.clone(), self.settings.max_queue_size)?;
            info!("➕ Agregado a la cola en guild {} (#{}): {}", guild_id, position, track.title());
            return Ok(EnqueueOutcome::Queued { track, position });
        }

        self.start_stream(&mut state, track.clone(), &source)
            .await
            .map_err(QueueError::SinkStartFailure)?;

        info!("🎵 Reproduciendo en guild {}: {}", guild_id, track.title());
        Ok(EnqueueOutcome::StartedPlaying { track })
    }

    /// Encola todos los resultados de la consulta (álbum, playlist).
    ///
    /// A diferencia de [`QueueManager::enqueue`], los tracks sin audio se
    /// aceptan: se descartan en silencio cuando les toca sonar.
    pub async fn enqueue_many(&self, guild_id: GuildId, query: &str, limit: usize) -> Result<BatchOutcome> {
        let tracks = self.resolve(query, limit).await?;
        let resolved = tracks.len();

        let mut state = self.lock_guild(guild_id).await;
        let was_idle = state.phase() == PlaybackPhase::Idle;

        let added = state.extend(tracks, self.settings.max_queue_size);
        if added == 0 {
            return Err(QueueError::QueueFull {
                max: self.settings.max_queue_size,
            });
        }
        info!("➕ Agregadas {} de {} canciones en guild {}", added, resolved, guild_id);

        let started = if was_idle {
            self.advance(&mut state).await;
            state.now_playing().cloned()
        } else {
            None
        };

        Ok(BatchOutcome {
            resolved,
            added,
            started,
        })
    }

    /// Busca sin tocar ninguna cola
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let mut tracks = self.resolve(query, limit).await?;
        tracks.truncate(limit);
        Ok(tracks)
    }

    /// Detiene el track actual y pasa al siguiente reproducible.
    ///
    /// El siguiente stream se arranca sin esperar al audio; el aviso de fin
    /// del stream saltado llega después y se descarta.
    pub async fn skip(&self, guild_id: GuildId) -> Result<SkipOutcome> {
        let mut state = self.lock_guild(guild_id).await;

        let Some(retired) = state.retire_current() else {
            return Err(QueueError::NothingPlaying);
        };

        self.sink.stop(retired.handle).await;
        info!("⏭️ Saltando en guild {}: {}", guild_id, retired.track.title());

        self.advance(&mut state).await;

        Ok(SkipOutcome {
            skipped: retired.track,
            now_playing: state.now_playing().cloned(),
        })
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<()> {
        let mut state = self.lock_guild(guild_id).await;

        let actual = state.phase();
        let handle = match (actual, state.active_handle()) {
            (PlaybackPhase::Playing, Some(handle)) => handle,
            _ => {
                return Err(QueueError::InvalidState {
                    expected: PlaybackPhase::Playing,
                    actual,
                })
            }
        };

        self.sink.pause(handle).await.map_err(QueueError::Sink)?;
        state.set_paused(true);

        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<()> {
        let mut state = self.lock_guild(guild_id).await;

        let actual = state.phase();
        let handle = match (actual, state.active_handle()) {
            (PlaybackPhase::Paused, Some(handle)) => handle,
            _ => {
                return Err(QueueError::InvalidState {
                    expected: PlaybackPhase::Paused,
                    actual,
                })
            }
        };

        self.sink.resume(handle).await.map_err(QueueError::Sink)?;
        state.set_paused(false);

        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    /// Detiene la reproducción y limpia la cola. Siempre tiene éxito.
    pub async fn stop(&self, guild_id: GuildId) {
        let mut state = self.lock_guild(guild_id).await;

        if let Some(handle) = state.reset() {
            self.sink.stop(handle).await;
        }

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
    }

    /// Vacía la cola pendiente y devuelve cuántos tracks se quitaron
    pub async fn clear_queue(&self, guild_id: GuildId) -> usize {
        let mut state = self.lock_guild(guild_id).await;
        state.clear_pending()
    }

    /// Copia consistente del estado; no crea estado para guilds nuevas
    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        let Some(slot) = self.existing_slot(guild_id) else {
            return QueueSnapshot::idle();
        };

        let state = slot.lock().await;
        state.snapshot()
    }

    /// Desaloja la guild: detiene lo que suene y olvida su estado
    pub async fn remove_guild(&self, guild_id: GuildId) {
        let Some((_, slot)) = self.guilds.remove(&guild_id) else {
            return;
        };

        let mut state = slot.lock().await;
        state.mark_evicted();
        if let Some(handle) = state.reset() {
            self.sink.stop(handle).await;
        }

        info!("🧹 Estado de guild {} eliminado", guild_id);
    }

    /// Aplica el fin de un stream. Solo actúa si sigue siendo el stream
    /// actual de su guild.
    pub async fn on_playback_completion(&self, completion: Completion) {
        let Completion { handle, error } = completion;

        let Some(slot) = self.existing_slot(handle.guild_id) else {
            debug!("Aviso de stream {} para guild sin estado {}", handle.id, handle.guild_id);
            return;
        };

        let mut state = slot.lock().await;
        if !state.is_current(handle) {
            debug!("Aviso obsoleto del stream {} en guild {}, ignorado", handle.id, handle.guild_id);
            return;
        }

        match &error {
            Some(e) => warn!("❌ Error de reproducción en guild {}: {}", handle.guild_id, e),
            None => debug!("Track terminado en guild {}, reproduciendo siguiente...", handle.guild_id),
        }

        state.retire_current();
        self.advance(&mut state).await;
    }

    /// Consume el canal de avisos. Cada aviso se aplica en su propia tarea
    /// para que una guild lenta no frene a las demás.
    pub async fn run_completions(self: Arc<Self>, mut completions: CompletionReceiver) {
        while let Some(completion) = completions.recv().await {
            let manager = Arc::clone(&self);
            tokio::spawn(async move {
                manager.on_playback_completion(completion).await;
            });
        }

        debug!("Canal de avisos de reproducción cerrado");
    }

    // Funciones privadas

    async fn resolve(&self, query: &str, max_results: usize) -> Result<Vec<Track>> {
        let timeout = self.settings.resolve_timeout;

        let tracks = match tokio::time::timeout(timeout, self.resolver.resolve(query, max_results)).await {
            Err(_) => {
                warn!("⏱️ El catálogo no respondió en {:?} para '{}'", timeout, query);
                return Err(QueueError::ResolutionTimeout(timeout));
            }
            Ok(Err(ResolveError::NotFound)) => Vec::new(),
            Ok(Err(ResolveError::Timeout)) => return Err(QueueError::ResolutionTimeout(timeout)),
            Ok(Err(ResolveError::Upstream(message))) => {
                return Err(QueueError::ResolverUnavailable(message))
            }
            Ok(Ok(tracks)) => tracks,
        };

        if tracks.is_empty() {
            return Err(QueueError::NotFound {
                query: query.to_string(),
            });
        }

        Ok(tracks)
    }

    /// Pasa al siguiente track reproducible. El stream actual, si había, ya
    /// tiene que estar retirado.
    ///
    /// Los tracks sin audio y los que el sink rechaza se saltan sin avisar a
    /// nadie. Cada vuelta saca al menos un track, así que el bucle no da más
    /// vueltas que tracks había en la cola.
    async fn advance(&self, state: &mut GuildPlaybackState) {
        let guild_id = state.guild_id();
        let budget = state.pending_len();

        for _ in 0..budget {
            let Some((track, source)) = state.pop_next_playable() else {
                break;
            };

            match self.start_stream(state, track.clone(), &source).await {
                Ok(()) => {
                    info!("🎵 Reproduciendo en guild {}: {}", guild_id, track.title());
                    return;
                }
                Err(e) => warn!("⚠️ No se pudo reproducir '{}', saltando: {}", track.title(), e),
            }
        }

        info!("📭 Cola vacía en guild {}", guild_id);
    }

    async fn start_stream(
        &self,
        state: &mut GuildPlaybackState,
        track: Track,
        source: &str,
    ) -> std::result::Result<(), SinkError> {
        let handle = StreamHandle {
            guild_id: state.guild_id(),
            id: StreamId::new(self.next_stream.fetch_add(1, Ordering::Relaxed)),
        };
        let notifier = CompletionNotifier::new(handle, self.completions.clone());

        self.sink.start(source, notifier).await?;
        state.begin_stream(track, handle);
        Ok(())
    }

    fn existing_slot(&self, guild_id: GuildId) -> Option<GuildSlot> {
        self.guilds.get(&guild_id).map(|slot| Arc::clone(slot.value()))
    }

    fn slot(&self, guild_id: GuildId) -> GuildSlot {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Nuevo estado de reproducción para guild {}", guild_id);
                Arc::new(Mutex::new(GuildPlaybackState::new(guild_id)))
            })
            .clone()
    }

    async fn lock_guild(&self, guild_id: GuildId) -> OwnedMutexGuard<GuildPlaybackState> {
        loop {
            let state = self.slot(guild_id).lock_owned().await;
            if !state.is_evicted() {
                return state;
            }
            // desalojada entre la búsqueda y el lock, se toma el estado nuevo
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::testing::RecordingSink, sources::MockTrackResolver};
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(42);

    /// `nosrc:<name>` resuelve a un track sin preview, `missing` a nada y
    /// cualquier otra consulta a `<query>.mp3`
    fn catalog_track(query: &str) -> Track {
        match query.strip_prefix("nosrc:") {
            Some(name) => Track::new(name, "Artist", format!("https://open.spotify.com/track/{}", name)),
            None => Track::new(query, "Artist", format!("https://open.spotify.com/track/{}", query))
                .with_duration(Duration::from_secs(180))
                .with_source_ref(format!("{}.mp3", query)),
        }
    }

    fn catalog() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|query, max_results| {
            if query == "missing" {
                return Err(ResolveError::NotFound);
            }
            // "album:a,nosrc:b,c" devuelve varios resultados
            match query.strip_prefix("album:") {
                Some(list) => Ok(list.split(',').take(max_results).map(catalog_track).collect()),
                None => Ok(vec![catalog_track(query)]),
            }
        });
        resolver
    }

    fn manager_with(resolver: MockTrackResolver) -> (QueueManager, CompletionReceiver, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let (manager, completions) = QueueManager::new(Arc::new(resolver), sink.clone(), QueueSettings::default());
        (manager, completions, sink)
    }

    fn manager() -> (QueueManager, CompletionReceiver, Arc<RecordingSink>) {
        manager_with(catalog())
    }

    async fn drain(manager: &QueueManager, completions: &mut CompletionReceiver) -> usize {
        let mut applied = 0;
        while let Ok(completion) = completions.try_recv() {
            manager.on_playback_completion(completion).await;
            applied += 1;
        }
        applied
    }

    fn titles(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(Track::title).collect()
    }

    #[tokio::test]
    async fn test_first_enqueue_plays_then_queues_in_order() {
        let (manager, _completions, sink) = manager();

        let first = manager.enqueue(GUILD, "a").await.unwrap();
        assert_eq!(first, EnqueueOutcome::StartedPlaying { track: catalog_track("a") });

        for (expected_position, query) in ["b", "c", "d"].into_iter().enumerate() {
            let outcome = manager.enqueue(GUILD, query).await.unwrap();
            assert_eq!(
                outcome,
                EnqueueOutcome::Queued {
                    track: catalog_track(query),
                    position: expected_position + 1,
                }
            );
        }

        let snapshot = manager.snapshot(GUILD).await;
        assert_eq!(snapshot.phase, PlaybackPhase::Playing);
        assert_eq!(snapshot.now_playing, Some(catalog_track("a")));
        assert_eq!(titles(&snapshot.pending), vec!["b", "c", "d"]);
        assert_eq!(sink.started_sources(), vec!["a.mp3"]);
    }

    #[tokio::test]
    async fn test_completion_advances_to_next_track() {
        let (manager, mut completions, sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();
        let queued = manager.enqueue(GUILD, "b").await.unwrap();
        assert!(matches!(queued, EnqueueOutcome::Queued { position: 1, .. }));

        let a_stream = sink.last_started().unwrap();
        assert!(sink.finish(a_stream, None));
        assert_eq!(drain(&manager, &mut completions).await, 1);

        let snapshot = manager.snapshot(GUILD).await;
        assert_eq!(snapshot.phase, PlaybackPhase::Playing);
        assert_eq!(snapshot.now_playing, Some(catalog_track("b")));
        assert!(snapshot.pending.is_empty());
        assert_eq!(sink.started_sources(), vec!["a.mp3", "b.mp3"]);
    }

    #[tokio::test]
    async fn test_last_completion_goes_idle() {
        let (manager, mut completions, sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();

        sink.finish(sink.last_started().unwrap(), None);
        drain(&manager, &mut completions).await;

        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());
        assert_eq!(sink.live_streams(GUILD), 0);
    }

    #[tokio::test]
    async fn test_unplayable_first_track_is_rejected() {
        let (manager, _completions, sink) = manager();

        let err = manager.enqueue(GUILD, "nosrc:c").await.unwrap_err();

        match err {
            QueueError::NoPlayableSource(track) => {
                assert_eq!(track.catalog_url(), "https://open.spotify.com/track/c")
            }
            other => panic!("error inesperado: {:?}", other),
        }
        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());
        assert!(sink.started_sources().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_distinct_from_unplayable() {
        let (manager, _completions, _sink) = manager();

        let err = manager.enqueue(GUILD, "missing").await.unwrap_err();

        assert!(matches!(err, QueueError::NotFound { ref query } if query == "missing"));
    }

    #[tokio::test]
    async fn test_empty_resolution_is_not_found() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().times(1).returning(|_, _| Ok(Vec::new()));
        let (manager, _completions, _sink) = manager_with(resolver);

        assert!(matches!(
            manager.enqueue(GUILD, "anything").await,
            Err(QueueError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_reported() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_, _| Err(ResolveError::Upstream("503".to_string())));
        let (manager, _completions, _sink) = manager_with(resolver);

        assert!(matches!(
            manager.enqueue(GUILD, "a").await,
            Err(QueueError::ResolverUnavailable(message)) if message == "503"
        ));
    }

    #[tokio::test]
    async fn test_resolver_timeout_is_reported() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_, _| Err(ResolveError::Timeout));
        let (manager, _completions, sink) = manager_with(resolver);

        assert!(matches!(
            manager.enqueue(GUILD, "a").await,
            Err(QueueError::ResolutionTimeout(timeout)) if timeout == QueueSettings::default().resolve_timeout
        ));
        assert!(sink.started_sources().is_empty());
        assert_eq!(manager.snapshot(GUILD).await.phase, PlaybackPhase::Idle);
    }

    #[tokio::test]
    async fn test_enqueue_asks_for_single_result() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .withf(|query, max_results| query == "a" && *max_results == 1)
            .times(1)
            .returning(|query, _| Ok(vec![catalog_track(query), catalog_track("other")]));
        let (manager, _completions, _sink) = manager_with(resolver);

        let outcome = manager.enqueue(GUILD, "a").await.unwrap();

        assert_eq!(outcome.track().title(), "a");
        assert!(manager.snapshot(GUILD).await.pending.is_empty());
    }

    struct SlowResolver;

    #[async_trait::async_trait]
    impl TrackResolver for SlowResolver {
        async fn resolve(&self, query: &str, _max_results: usize) -> std::result::Result<Vec<Track>, ResolveError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![catalog_track(query)])
        }
    }

    #[tokio::test]
    async fn test_slow_resolver_times_out() {
        let settings = QueueSettings {
            resolve_timeout: Duration::from_millis(20),
            ..QueueSettings::default()
        };
        let (manager, _completions) = QueueManager::new(Arc::new(SlowResolver), Arc::new(RecordingSink::default()), settings);

        let err = manager.enqueue(GUILD, "a").await.unwrap_err();

        assert!(matches!(err, QueueError::ResolutionTimeout(d) if d == Duration::from_millis(20)));
        assert_eq!(manager.snapshot(GUILD).await.phase, PlaybackPhase::Idle);
    }

    #[tokio::test]
    async fn test_rapid_skips_advance_one_track_each() {
        let (manager, mut completions, sink) = manager();
        for query in ["a", "b", "c", "d"] {
            manager.enqueue(GUILD, query).await.unwrap();
        }

        let first = manager.skip(GUILD).await.unwrap();
        let second = manager.skip(GUILD).await.unwrap();
        assert_eq!(first.skipped.title(), "a");
        assert_eq!(second.skipped.title(), "b");
        assert_eq!(second.now_playing, Some(catalog_track("c")));

        // los avisos de a y b llegan tarde y no cambian nada
        assert_eq!(drain(&manager, &mut completions).await, 2);
        let snapshot = manager.snapshot(GUILD).await;
        assert_eq!(snapshot.now_playing, Some(catalog_track("c")));
        assert_eq!(titles(&snapshot.pending), vec!["d"]);
        assert_eq!(sink.live_streams(GUILD), 1);

        assert_eq!(manager.skip(GUILD).await.unwrap().now_playing, Some(catalog_track("d")));
        assert_eq!(manager.skip(GUILD).await.unwrap().now_playing, None);
        assert!(matches!(manager.skip(GUILD).await, Err(QueueError::NothingPlaying)));

        drain(&manager, &mut completions).await;
        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());
        assert_eq!(sink.started_sources(), vec!["a.mp3", "b.mp3", "c.mp3", "d.mp3"]);
    }

    #[tokio::test]
    async fn test_stale_completion_after_stop_is_ignored() {
        let (manager, mut completions, sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();
        let a_stream = sink.last_started().unwrap();

        manager.stop(GUILD).await;
        assert_eq!(sink.stopped(), vec![a_stream]);
        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());

        // se vuelve a llenar antes de que llegue el aviso viejo
        manager.enqueue(GUILD, "b").await.unwrap();
        manager.enqueue(GUILD, "c").await.unwrap();
        let before = manager.snapshot(GUILD).await;

        assert_eq!(drain(&manager, &mut completions).await, 1);
        manager
            .on_playback_completion(Completion {
                handle: a_stream,
                error: None,
            })
            .await;

        assert_eq!(manager.snapshot(GUILD).await, before);
    }

    #[tokio::test]
    async fn test_stop_is_total() {
        let (manager, _completions, sink) = manager();

        manager.stop(GUILD).await;
        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());

        manager.enqueue(GUILD, "a").await.unwrap();
        manager.enqueue(GUILD, "b").await.unwrap();
        manager.pause(GUILD).await.unwrap();
        manager.stop(GUILD).await;

        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());
        assert_eq!(sink.live_streams(GUILD), 0);
    }

    #[tokio::test]
    async fn test_clear_queue_keeps_current_track() {
        let (manager, _completions, _sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();
        manager.enqueue(GUILD, "b").await.unwrap();
        manager.enqueue(GUILD, "c").await.unwrap();
        manager.pause(GUILD).await.unwrap();

        assert_eq!(manager.clear_queue(GUILD).await, 2);

        let snapshot = manager.snapshot(GUILD).await;
        assert_eq!(snapshot.phase, PlaybackPhase::Paused);
        assert_eq!(snapshot.now_playing, Some(catalog_track("a")));
        assert!(snapshot.pending.is_empty());
        assert_eq!(manager.clear_queue(GUILD).await, 0);
    }

    #[tokio::test]
    async fn test_pause_and_resume_require_matching_phase() {
        let (manager, _completions, sink) = manager();

        assert!(matches!(
            manager.pause(GUILD).await,
            Err(QueueError::InvalidState {
                expected: PlaybackPhase::Playing,
                actual: PlaybackPhase::Idle
            })
        ));

        manager.enqueue(GUILD, "a").await.unwrap();
        assert!(matches!(
            manager.resume(GUILD).await,
            Err(QueueError::InvalidState {
                expected: PlaybackPhase::Paused,
                actual: PlaybackPhase::Playing
            })
        ));

        manager.pause(GUILD).await.unwrap();
        assert!(matches!(manager.pause(GUILD).await, Err(QueueError::InvalidState { .. })));
        assert_eq!(manager.snapshot(GUILD).await.phase, PlaybackPhase::Paused);

        manager.resume(GUILD).await.unwrap();
        assert_eq!(manager.snapshot(GUILD).await.phase, PlaybackPhase::Playing);

        let stream = sink.last_started().unwrap();
        assert_eq!(sink.paused(), vec![stream]);
        assert_eq!(sink.resumed(), vec![stream]);
    }

    #[tokio::test]
    async fn test_enqueue_while_paused_keeps_pause() {
        let (manager, _completions, _sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();
        manager.pause(GUILD).await.unwrap();

        let outcome = manager.enqueue(GUILD, "b").await.unwrap();

        assert!(matches!(outcome, EnqueueOutcome::Queued { position: 1, .. }));
        assert_eq!(manager.snapshot(GUILD).await.phase, PlaybackPhase::Paused);
    }

    #[tokio::test]
    async fn test_skip_from_pause_starts_next_unpaused() {
        let (manager, _completions, _sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();
        manager.enqueue(GUILD, "b").await.unwrap();
        manager.pause(GUILD).await.unwrap();

        manager.skip(GUILD).await.unwrap();

        let snapshot = manager.snapshot(GUILD).await;
        assert_eq!(snapshot.phase, PlaybackPhase::Playing);
        assert_eq!(snapshot.now_playing, Some(catalog_track("b")));
    }

    #[tokio::test]
    async fn test_sink_rejection_on_first_enqueue_is_surfaced() {
        let (manager, _completions, sink) = manager();
        sink.reject_source("a.mp3");

        let err = manager.enqueue(GUILD, "a").await.unwrap_err();

        assert!(matches!(err, QueueError::SinkStartFailure(SinkError::Rejected(_))));
        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());
    }

    #[tokio::test]
    async fn test_sink_rejection_during_advance_is_absorbed() {
        let (manager, mut completions, sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();
        manager.enqueue(GUILD, "b").await.unwrap();
        manager.enqueue(GUILD, "c").await.unwrap();
        sink.reject_source("b.mp3");
        sink.reject_source("c.mp3");

        sink.finish(sink.last_started().unwrap(), Some(SinkError::Rejected("corrupt".to_string())));
        drain(&manager, &mut completions).await;

        // nunca queda "reproduciendo" sin stream
        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());
        assert_eq!(sink.live_streams(GUILD), 0);
    }

    #[tokio::test]
    async fn test_unplayable_run_never_surfaces() {
        let (manager, mut completions, sink) = manager();

        let batch = manager
            .enqueue_many(GUILD, "album:nosrc:x1,nosrc:x2,nosrc:x3,ok,nosrc:x4", 10)
            .await
            .unwrap();

        assert_eq!(batch.resolved, 5);
        assert_eq!(batch.added, 5);
        assert_eq!(batch.started, Some(catalog_track("ok")));

        let snapshot = manager.snapshot(GUILD).await;
        assert_eq!(snapshot.now_playing, Some(catalog_track("ok")));
        assert_eq!(titles(&snapshot.pending), vec!["x4"]);

        // x4 tampoco se expone nunca como actual
        sink.finish(sink.last_started().unwrap(), None);
        drain(&manager, &mut completions).await;
        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());
        assert_eq!(sink.started_sources(), vec!["ok.mp3"]);
    }

    #[tokio::test]
    async fn test_enqueue_many_appends_while_playing() {
        let (manager, _completions, _sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();

        let batch = manager.enqueue_many(GUILD, "album:b,c", 10).await.unwrap();

        assert_eq!(batch.started, None);
        assert_eq!(titles(&manager.snapshot(GUILD).await.pending), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_queue_capacity_is_enforced() {
        let settings = QueueSettings {
            max_queue_size: 1,
            ..QueueSettings::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let (manager, _completions) = QueueManager::new(Arc::new(catalog()), sink, settings);

        manager.enqueue(GUILD, "a").await.unwrap();
        manager.enqueue(GUILD, "b").await.unwrap();

        assert!(matches!(
            manager.enqueue(GUILD, "c").await,
            Err(QueueError::QueueFull { max: 1 })
        ));
    }

    #[tokio::test]
    async fn test_guilds_are_independent() {
        let (manager, mut completions, sink) = manager();
        let other = GuildId::new(7);

        manager.enqueue(GUILD, "a").await.unwrap();
        manager.enqueue(other, "x").await.unwrap();
        manager.enqueue(GUILD, "b").await.unwrap();

        manager.stop(other).await;
        drain(&manager, &mut completions).await;

        let snapshot = manager.snapshot(GUILD).await;
        assert_eq!(snapshot.now_playing, Some(catalog_track("a")));
        assert_eq!(titles(&snapshot.pending), vec!["b"]);
        assert_eq!(manager.snapshot(other).await, QueueSnapshot::idle());
        assert_eq!(sink.live_streams(GUILD), 1);
    }

    #[tokio::test]
    async fn test_search_leaves_queues_untouched() {
        let (manager, _completions, sink) = manager();

        let results = manager.search("album:a,nosrc:b,c", 2).await.unwrap();

        assert_eq!(titles(&results), vec!["a", "b"]);
        assert_eq!(manager.guild_count(), 0);
        assert!(sink.started_sources().is_empty());
        assert!(matches!(manager.search("missing", 5).await, Err(QueueError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_snapshot_does_not_create_state() {
        let (manager, _completions, _sink) = manager();

        assert_eq!(manager.snapshot(GUILD).await, QueueSnapshot::idle());
        assert_eq!(manager.guild_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_guild_stops_and_forgets() {
        let (manager, mut completions, sink) = manager();
        manager.enqueue(GUILD, "a").await.unwrap();
        manager.enqueue(GUILD, "b").await.unwrap();

        manager.remove_guild(GUILD).await;
        assert_eq!(manager.guild_count(), 0);
        assert_eq!(sink.live_streams(GUILD), 0);

        drain(&manager, &mut completions).await;
        assert_eq!(manager.guild_count(), 0);

        // la guild vuelve a empezar de cero
        let outcome = manager.enqueue(GUILD, "c").await.unwrap();
        assert!(matches!(outcome, EnqueueOutcome::StartedPlaying { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_touch_creates_one_state() {
        let (manager, _completions, sink) = manager();
        let manager = Arc::new(manager);

        let tasks = (0..16).map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.enqueue(GUILD, &format!("t{}", i)).await })
        });
        let outcomes: Vec<EnqueueOutcome> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(manager.guild_count(), 1);

        let started = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, EnqueueOutcome::StartedPlaying { .. }))
            .count();
        assert_eq!(started, 1);

        let mut positions: Vec<usize> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                EnqueueOutcome::Queued { position, .. } => Some(*position),
                EnqueueOutcome::StartedPlaying { .. } => None,
            })
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, (1..=15).collect::<Vec<_>>());

        assert_eq!(manager.snapshot(GUILD).await.pending.len(), 15);
        assert_eq!(sink.live_streams(GUILD), 1);
    }

    #[tokio::test]
    async fn test_completion_loop_applies_notifications() {
        let (manager, completions, sink) = manager();
        let manager = Arc::new(manager);
        tokio::spawn(Arc::clone(&manager).run_completions(completions));

        manager.enqueue(GUILD, "a").await.unwrap();
        manager.enqueue(GUILD, "b").await.unwrap();
        sink.finish(sink.last_started().unwrap(), None);

        let mut now_playing = None;
        for _ in 0..100 {
            now_playing = manager.snapshot(GUILD).await.now_playing;
            if now_playing == Some(catalog_track("b")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(now_playing, Some(catalog_track("b")));
    }
}
