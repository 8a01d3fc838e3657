//! Presentación de la cola: vistas puras y embeds de Discord

pub mod embeds;
pub mod views;
