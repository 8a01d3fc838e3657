//! # Preview Music
//!
//! Discord bot that plays Spotify previews through a per-guild queue.
//!
//! - [`audio`]: queue state machine and playback sinks
//! - [`sources`]: catalog resolution
//! - [`ui`]: views and embeds
//! - [`bot`]: slash commands and Discord events

pub mod audio;
pub mod bot;
pub mod config;
pub mod sources;
pub mod ui;
