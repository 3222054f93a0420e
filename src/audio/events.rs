use serenity::{async_trait, model::id::GuildId};
use songbird::{
    events::CoreEvent, Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
    TrackEvent,
};
use tracing::{error, info, warn};

/// Handler para errores del track de salida
pub struct TrackErrorHandler {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                error!(
                    "❌ Error en la salida de audio para guild {}: {:?}",
                    self.guild_id, state.playing
                );
            }
        }

        None
    }
}

/// Handler para desconexiones del driver de voz
pub struct DriverDisconnectHandler {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Driver de voz desconectado en guild {}: {:?}",
                self.guild_id, data.reason
            );
        }

        None
    }
}

/// Handler para reconexiones automáticas
pub struct ReconnectHandler {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for ReconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        info!("🔄 Reconectado al canal de voz en guild {}", self.guild_id);
        None
    }
}

/// Registra los handlers de diagnóstico de una llamada
pub fn register_voice_events(handler: &mut Call, guild_id: GuildId) {
    handler.add_global_event(
        VoiceEvent::Track(TrackEvent::Error),
        TrackErrorHandler { guild_id },
    );

    handler.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverDisconnect),
        DriverDisconnectHandler { guild_id },
    );

    handler.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverReconnect),
        ReconnectHandler { guild_id },
    );
}
