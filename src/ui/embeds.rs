use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use super::views::{format_duration, NowPlayingView, QueueListing, QueuedView, SearchEntry};
use crate::sources::Track;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SPOTIFY_GREEN: Colour = Colour::new(0x1DB954);
    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Preview Music";

const PREVIEW_FOOTER: &str = "🎧 Preview de 30 segundos • Preview Music";

/// Límite de Discord para la descripción de un embed
const MAX_DESCRIPTION_LEN: usize = 4096;

fn track_line(track: &Track) -> String {
    format!("**[{}]({})** - {}", track.title(), track.catalog_url(), track.artist())
}

/// Crea el embed del reproductor
pub fn create_player_embed(view: &NowPlayingView) -> CreateEmbed {
    let title = if view.paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", view.track.title()))
        .url(view.track.catalog_url())
        .color(colors::SPOTIFY_GREEN)
        .field("🎤 Artista", view.track.artist(), true)
        .field("⏱️ Duración", format_duration(view.track.duration()), true);

    if let Some(album) = view.track.album() {
        embed = embed.field("💿 Álbum", album, true);
    }

    if view.queue_len > 0 {
        embed = embed.field("📋 En cola", format!("{} canciones", view.queue_len), true);
    }

    if let Some(artwork) = view.track.artwork_url() {
        embed = embed.thumbnail(artwork);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(PREVIEW_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_queued_embed(view: &QueuedView) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola", view.track.title()))
        .url(view.track.catalog_url())
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", view.track.artist(), true)
        .field("⏱️ Duración", format_duration(view.track.duration()), true)
        .field("📍 Posición", format!("#{}", view.position), true);

    if let Some(artwork) = view.track.artwork_url() {
        embed = embed.thumbnail(artwork);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("🎵 Se reproducirá automáticamente cuando le toque"))
}

/// Crea un embed para un álbum o playlist agregado
pub fn create_batch_added_embed(added: usize, resolved: usize, started: Option<&Track>) -> CreateEmbed {
    let mut description = format!("Se agregaron **{} canciones** a la cola", added);
    if added < resolved {
        description.push_str(&format!("\n⚠️ {} no entraron (cola llena)", resolved - added));
    }

    let mut embed = CreateEmbed::default()
        .title("📋 Canciones Agregadas")
        .description(description)
        .color(colors::SUCCESS_GREEN);

    if let Some(track) = started {
        embed = embed.field("🎵 Reproduciendo", track_line(track), false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("Las canciones sin preview se saltan"))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(listing: &QueueListing) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if listing.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut embed = embed;

    if let Some(current) = &listing.now_playing {
        let status = if current.paused { "⏸️" } else { "▶️" };
        embed = embed.field(format!("{} Reproduciendo", status), track_line(&current.track), false);
    }

    if !listing.entries.is_empty() {
        let mut description = String::new();

        for entry in &listing.entries {
            description.push_str(&format!(
                "**{}**. {} - {} `[{}]`\n",
                entry.position,
                entry.track.title(),
                entry.track.artist(),
                format_duration(entry.track.duration())
            ));
        }

        if listing.overflow > 0 {
            description.push_str(&format!("... y {} más", listing.overflow));
        }

        embed = embed.field("Próximas canciones", description, false);
    }

    embed
        .footer(CreateEmbedFooter::new(format!(
            "Total: {} canciones • {} • Preview Music",
            listing.total,
            format_duration(listing.total_duration)
        )))
        .timestamp(Timestamp::now())
}

/// Crea un embed con resultados de búsqueda
pub fn create_search_embed(query: &str, results: &[SearchEntry]) -> CreateEmbed {
    let description = search_description(results);

    CreateEmbed::default()
        .title(format!("🔍 Resultados para \"{}\"", query))
        .description(description)
        .color(colors::SPOTIFY_GREEN)
        .footer(CreateEmbedFooter::new("🎧 con preview • 🚫 sin preview"))
        .timestamp(Timestamp::now())
}

/// Líneas de resultados que caben en una descripción; las que no caben se omiten
fn search_description(results: &[SearchEntry]) -> String {
    let mut description = String::new();
    let mut len = 0;

    for entry in results {
        let marker = if entry.playable { "🎧" } else { "🚫" };
        let line = format!(
            "**{}**. {} {} `[{}]`\n",
            entry.position,
            marker,
            track_line(&entry.track),
            format_duration(entry.track.duration())
        );

        let line_len = line.chars().count();
        if len + line_len > MAX_DESCRIPTION_LEN {
            break;
        }
        len += line_len;
        description.push_str(&line);
    }

    description
}

/// Crea un embed para un track sin preview
pub fn create_no_preview_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("🚫 Sin Preview")
        .description(format!(
            "**{}** de {} no tiene preview disponible.\n\n[Escúchala en Spotify]({})",
            track.title(),
            track.artist(),
            track.catalog_url()
        ))
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
