//! Sink de pruebas que registra cada llamada

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::collections::{HashMap, HashSet};

use super::sink::{CompletionNotifier, PlaybackSink, SinkError, StreamHandle};

#[derive(Default)]
struct Recorded {
    started: Vec<(StreamHandle, String)>,
    live: HashMap<StreamHandle, CompletionNotifier>,
    stopped: Vec<StreamHandle>,
    paused: Vec<StreamHandle>,
    resumed: Vec<StreamHandle>,
    rejected_sources: HashSet<String>,
}

/// Guarda los notifiers de los streams vivos. `stop` dispara el aviso al
/// momento, como hace songbird al detener un track.
#[derive(Default)]
pub(crate) struct RecordingSink {
    inner: Mutex<Recorded>,
}

impl RecordingSink {
    pub(crate) fn reject_source(&self, source: &str) {
        self.inner.lock().rejected_sources.insert(source.to_string());
    }

    pub(crate) fn started_sources(&self) -> Vec<String> {
        self.inner.lock().started.iter().map(|(_, source)| source.clone()).collect()
    }

    pub(crate) fn last_started(&self) -> Option<StreamHandle> {
        self.inner.lock().started.last().map(|(handle, _)| *handle)
    }

    pub(crate) fn stopped(&self) -> Vec<StreamHandle> {
        self.inner.lock().stopped.clone()
    }

    pub(crate) fn paused(&self) -> Vec<StreamHandle> {
        self.inner.lock().paused.clone()
    }

    pub(crate) fn resumed(&self) -> Vec<StreamHandle> {
        self.inner.lock().resumed.clone()
    }

    /// Streams iniciados cuyo aviso todavía no se disparó
    pub(crate) fn live_streams(&self, guild_id: GuildId) -> usize {
        self.inner
            .lock()
            .live
            .keys()
            .filter(|handle| handle.guild_id == guild_id)
            .count()
    }

    /// Termina el stream como si el audio se hubiera acabado
    pub(crate) fn finish(&self, handle: StreamHandle, error: Option<SinkError>) -> bool {
        let notifier = self.inner.lock().live.remove(&handle);
        match notifier {
            Some(notifier) => {
                notifier.complete(error);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PlaybackSink for RecordingSink {
    async fn start(&self, source: &str, notifier: CompletionNotifier) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        if inner.rejected_sources.contains(source) {
            return Err(SinkError::Rejected(source.to_string()));
        }

        let handle = notifier.handle();
        inner.started.push((handle, source.to_string()));
        inner.live.insert(handle, notifier);
        Ok(())
    }

    async fn pause(&self, handle: StreamHandle) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        if !inner.live.contains_key(&handle) {
            return Err(SinkError::StreamEnded);
        }
        inner.paused.push(handle);
        Ok(())
    }

    async fn resume(&self, handle: StreamHandle) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        if !inner.live.contains_key(&handle) {
            return Err(SinkError::StreamEnded);
        }
        inner.resumed.push(handle);
        Ok(())
    }

    async fn stop(&self, handle: StreamHandle) {
        let notifier = {
            let mut inner = self.inner.lock();
            inner.stopped.push(handle);
            inner.live.remove(&handle)
        };

        if let Some(notifier) = notifier {
            notifier.complete(Some(SinkError::StreamEnded));
        }
    }
}
