use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{EnqueueOutcome, QueueError},
    bot::MusicBot,
    ui::{embeds, views},
};

/// Canciones que carga `/playlist` si no se indica un límite
const DEFAULT_BATCH_LIMIT: usize = 50;

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "playlist" => handle_playlist(ctx, &command, bot, guild_id).await?,
        "search" => handle_search(ctx, &command, bot).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let query = string_option(command, "query")?;

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(e) = ensure_voice(ctx, command, bot, guild_id).await {
        let embed = embeds::create_error_embed("Sin Canal de Voz", &e.to_string());
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
            .await?;
        return Ok(());
    }

    let embed = match bot.queue.enqueue(guild_id, query).await {
        Ok(EnqueueOutcome::StartedPlaying { track }) => embeds::create_player_embed(&views::started(track)),
        Ok(EnqueueOutcome::Queued { track, position }) => {
            embeds::create_queued_embed(&views::queued(track, position))
        }
        Err(e) => error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let url = string_option(command, "url")?;
    let limit = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "limit")
        .and_then(|opt| opt.value.as_i64())
        .map_or(DEFAULT_BATCH_LIMIT, |limit| limit.max(1) as usize);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(e) = ensure_voice(ctx, command, bot, guild_id).await {
        let embed = embeds::create_error_embed("Sin Canal de Voz", &e.to_string());
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
            .await?;
        return Ok(());
    }

    let embed = match bot.queue.enqueue_many(guild_id, url, limit).await {
        Ok(batch) => embeds::create_batch_added_embed(batch.added, batch.resolved, batch.started.as_ref()),
        Err(e) => error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_search(ctx: &Context, command: &CommandInteraction, bot: &MusicBot) -> Result<()> {
    let query = string_option(command, "query")?;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match bot.queue.search(query, bot.config.search_limit).await {
        Ok(results) => embeds::create_search_embed(query, &views::search_listing(&results)),
        Err(e) => error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_pause(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    match bot.queue.pause(guild_id).await {
        Ok(()) => reply(ctx, command, "⏸️ Reproducción pausada").await,
        Err(e) => reply_error(ctx, command, &e).await,
    }
}

async fn handle_resume(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    match bot.queue.resume(guild_id).await {
        Ok(()) => reply(ctx, command, "▶️ Reproducción reanudada").await,
        Err(e) => reply_error(ctx, command, &e).await,
    }
}

async fn handle_skip(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let outcome = match bot.queue.skip(guild_id).await {
        Ok(outcome) => outcome,
        Err(e) => return reply_error(ctx, command, &e).await,
    };

    let message = match &outcome.now_playing {
        Some(next) => format!("⏭️ Saltada **{}**\n🎵 Ahora: **{}**", outcome.skipped.title(), next.title()),
        None => format!("⏭️ Saltada **{}**\n📭 No quedan canciones en la cola", outcome.skipped.title()),
    };

    reply(ctx, command, &message).await
}

async fn handle_stop(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    bot.queue.stop(guild_id).await;

    reply(ctx, command, "⏹️ Reproducción detenida y cola limpiada").await
}

async fn handle_clear(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let cleared = bot.queue.clear_queue(guild_id).await;

    reply(ctx, command, &format!("🗑️ Cola limpiada: {} canciones removidas", cleared)).await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let snapshot = bot.queue.snapshot(guild_id).await;
    let listing = views::queue_listing(&snapshot, bot.config.queue_page_size);

    respond_embed(ctx, command, embeds::create_queue_embed(&listing), false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.queue.snapshot(guild_id).await;

    match views::now_playing(&snapshot) {
        Some(view) => respond_embed(ctx, command, embeds::create_player_embed(&view), false).await,
        None => reply_error(ctx, command, &QueueError::NothingPlaying).await,
    }
}

async fn handle_join(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let voice_channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => {
            let embed = embeds::create_error_embed("Sin Canal de Voz", &e.to_string());
            return respond_embed(ctx, command, embed, true).await;
        }
    };

    bot.join_voice_channel(guild_id, voice_channel_id).await?;

    reply(ctx, command, "🔊 Conectado al canal de voz").await
}

async fn handle_leave(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    bot.leave_voice_channel(guild_id).await?;

    reply(ctx, command, "👋 Desconectado del canal de voz").await
}

// Funciones auxiliares

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Result<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Opción '{}' no proporcionada", name))
}

/// Conecta al canal de voz del usuario si el bot no está en ninguno
async fn ensure_voice(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let connected = match bot.songbird.get(guild_id) {
        Some(call) => Some(call.lock().await.current_connection().is_some()),
        None => None,
    };

    if !needs_join(connected) {
        return Ok(());
    }

    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    bot.join_voice_channel(guild_id, voice_channel_id).await
}

/// `connected` es `None` si no hay llamada para la guild. Una llamada que
/// perdió su conexión se vuelve a unir.
fn needs_join(connected: Option<bool>) -> bool {
    connected != Some(true)
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

/// Título y descripción para mostrar un error de la cola al usuario
fn describe_error(error: &QueueError) -> (&'static str, String) {
    let title = match error {
        QueueError::NotFound { .. } => "Sin Resultados",
        QueueError::NoPlayableSource(_) => "Sin Preview",
        QueueError::ResolutionTimeout(_) | QueueError::ResolverUnavailable(_) => "Spotify No Disponible",
        QueueError::NothingPlaying => "Nada Sonando",
        QueueError::InvalidState { .. } => "Acción No Disponible",
        QueueError::SinkStartFailure(_) | QueueError::Sink(_) => "Error de Reproducción",
        QueueError::QueueFull { .. } => "Cola Llena",
    };

    (title, format!("{}", error))
}

fn error_embed(error: &QueueError) -> CreateEmbed {
    match error {
        QueueError::NoPlayableSource(track) => embeds::create_no_preview_embed(track),
        _ => {
            if matches!(error, QueueError::ResolverUnavailable(_) | QueueError::SinkStartFailure(_)) {
                warn!("⚠️ Comando fallido: {}", error);
            }
            let (title, description) = describe_error(error);
            embeds::create_error_embed(title, &description)
        }
    }
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;

    Ok(())
}

async fn reply_error(ctx: &Context, command: &CommandInteraction, error: &QueueError) -> Result<()> {
    respond_embed(ctx, command, error_embed(error), true).await
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}
