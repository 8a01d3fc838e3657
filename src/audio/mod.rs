//! # Audio Module
//!
//! Per-guild playback queue and the audio sink that plays it.
//!
//! ## Architecture
//!
//! ### [`manager`] - Queue Manager
//! - Resolves queries through a [`TrackResolver`](crate::sources::TrackResolver)
//! - Decides between playing now and queueing
//! - Advances to the next playable track when a stream ends
//!
//! ### [`state`] - Guild State
//! - Pending tracks in FIFO order
//! - Current track and playback phase
//!
//! ### [`sink`] - Playback Sink
//! - Start, pause, resume and stop of a single stream
//! - End-of-stream notifications tagged with a unique stream id
//!
//! ### [`songbird_sink`] - Voice Playback
//! - [`PlaybackSink`] over a songbird voice connection
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use preview_music::audio::{QueueManager, QueueSettings, SongbirdSink};
//! use preview_music::sources::SpotifyClient;
//! use serenity::all::GuildId;
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example(songbird: Arc<songbird::Songbird>) -> anyhow::Result<()> {
//! let catalog = SpotifyClient::new("id".into(), "secret".into(), Duration::from_secs(10))?;
//! let sink = SongbirdSink::new(songbird, reqwest::Client::new());
//! let (manager, completions) = QueueManager::new(Arc::new(catalog), Arc::new(sink), QueueSettings::default());
//! let manager = Arc::new(manager);
//! tokio::spawn(Arc::clone(&manager).run_completions(completions));
//!
//! let guild_id = GuildId::new(123456789);
//! manager.enqueue(guild_id, "daft punk one more time").await?;
//! manager.pause(guild_id).await?;
//! manager.resume(guild_id).await?;
//! manager.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod sink;
pub mod songbird_sink;
pub mod state;

#[cfg(test)]
mod testing;

pub use error::QueueError;
pub use manager::{BatchOutcome, EnqueueOutcome, QueueManager, QueueSettings, SkipOutcome};
pub use sink::{Completion, CompletionNotifier, PlaybackSink, SinkError, StreamHandle};
pub use songbird_sink::SongbirdSink;
pub use state::{PlaybackPhase, QueueSnapshot};
