//! # Bot Module
//!
//! Discord front end for the preview queue.
//!
//! This module contains:
//! - Command registration and handling
//! - Voice connection management
//! - Event handling (ready, interactions, voice state updates)
//!
//! ## Architecture
//!
//! The bot is built around the [`MusicBot`] struct which implements
//! Serenity's [`EventHandler`] trait. Every command is forwarded to the
//! shared [`QueueManager`]; the bot itself only owns voice connections.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::QueueManager, config::Config};

/// Manejador de eventos de Discord
pub struct MusicBot {
    config: Arc<Config>,
    /// Cola y reproducción de todas las guilds
    pub queue: Arc<QueueManager>,
    songbird: Arc<Songbird>,
}

impl MusicBot {
    pub fn new(config: Config, queue: Arc<QueueManager>, songbird: Arc<Songbird>) -> Self {
        Self {
            config: Arc::new(config),
            queue,
            songbird,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set, commands are registered for that guild only
    /// (~1 second propagation); otherwise globally (~1 hour).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Connects the bot to a voice channel.
    ///
    /// # Required Permissions
    ///
    /// - `Connect` - To join the voice channel
    /// - `Speak` - To play audio in the channel
    pub async fn join_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        match self.songbird.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al obtener handler de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }

    /// Disconnects from voice and drops the guild's queue.
    pub async fn leave_voice_channel(&self, guild_id: GuildId) -> Result<()> {
        self.queue.remove_guild(guild_id).await;

        if self.songbird.get(guild_id).is_some() {
            self.songbird.remove(guild_id).await?;
        }

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Evicts the guild when the bot is disconnected from voice, whether by
    /// `/leave`, a moderator or a dropped connection.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.queue.remove_guild(guild_id).await;

            // sin esto /play reutilizaría una llamada sin conexión
            if self.songbird.get(guild_id).is_some() {
                if let Err(e) = self.songbird.remove(guild_id).await {
                    warn!("⚠️ No se pudo descartar la llamada de guild {}: {:?}", guild_id, e);
                }
            }
        }
    }
}
