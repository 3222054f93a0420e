//! # Bot Module
//!
//! Capa Discord de Hibiki.
//!
//! - Registro de comandos slash (globales o por guild)
//! - Despacho de interacciones hacia el [`PlaybackRegistry`]
//! - Limpieza cuando Discord desconecta al bot de un canal
//!
//! ## Architecture
//!
//! [`HibikiBot`] implementa el [`EventHandler`] de Serenity. No guarda estado
//! de voz propio: todo pasa por el registro de reproducción, que es el único
//! dueño de los gestores por guild.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::player::PlaybackRegistry, config::Config, sources::SoundCatalog};

/// Handler de eventos de Discord.
///
/// ## Fields
///
/// - `config`: configuración del bot (ids, registro de comandos)
/// - `registry`: reproducción por guild
/// - `catalog`: biblioteca de música y efectos
pub struct HibikiBot {
    config: Arc<Config>,
    pub registry: Arc<PlaybackRegistry>,
    pub catalog: Arc<dyn SoundCatalog>,
}

impl HibikiBot {
    pub fn new(config: Config, registry: Arc<PlaybackRegistry>, catalog: Arc<dyn SoundCatalog>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            catalog,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// # Command Registration Timing
    ///
    /// - **Guild commands**: ~1 second propagation time
    /// - **Global commands**: ~1 hour propagation time
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

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
}

#[async_trait]
impl EventHandler for HibikiBot {
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

    /// Detecta cuando Discord saca al bot del canal en el que el registro
    /// cree estar y libera el gestor de esa guild.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // un cambio de canal propio también emite un "salida" del canal viejo
        let left_channel = old.and_then(|state| state.channel_id);
        let tracked_channel = self.registry.connected_channel_id(guild_id).await;
        if left_channel.is_none() || left_channel != tracked_channel {
            return;
        }

        info!("🔌 Bot desconectado por Discord en guild {}", guild_id);
        self.registry.disconnect(guild_id).await;
    }
}
