//! Transporte de voz.
//!
//! El gestor de guild solo conoce los traits [`VoiceTransport`] y
//! [`VoiceSession`]; la implementación de producción usa songbird.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Input, RawAdapter},
    tracks::TrackHandle,
    Call, Songbird,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{events, mixer::MixReader, AudioError, AudioResult, CHANNELS, SAMPLE_RATE};

/// Canal de voz destino con la etiqueta que se muestra en el panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTarget {
    pub channel_id: ChannelId,
    pub label: String,
}

impl VoiceTarget {
    pub fn new(channel_id: ChannelId, label: impl Into<String>) -> Self {
        Self {
            channel_id,
            label: label.into(),
        }
    }
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Inicia la conexión sin esperar a que esté lista.
    async fn open(&self, guild_id: GuildId, channel_id: ChannelId) -> AudioResult<Box<dyn VoiceSession>>;
}

/// Sesión de voz abierta. Su dueño es el gestor de guild mientras está conectado.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Conecta la salida del motor a la sesión.
    async fn subscribe(&mut self, output: MixReader) -> AudioResult<()>;

    /// Resuelve cuando la sesión está lista para transmitir.
    async fn ready(&mut self) -> AudioResult<()>;

    async fn destroy(self: Box<Self>);
}

/// Transporte sobre songbird.
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn open(&self, guild_id: GuildId, channel_id: ChannelId) -> AudioResult<Box<dyn VoiceSession>> {
        info!("🔗 Conectando al canal {} en guild {}", channel_id, guild_id);

        let call = self.songbird.get_or_insert(guild_id);
        let stage = {
            let mut handler = call.lock().await;
            events::register_voice_events(&mut handler, guild_id);
            handler.join(channel_id).await
        };

        let join = match stage {
            Ok(join) => join,
            Err(e) => {
                // no dejar una llamada a medio crear
                if let Err(remove_err) = self.songbird.remove(guild_id).await {
                    debug!("Limpieza tras fallo de join en guild {}: {:?}", guild_id, remove_err);
                }
                return Err(AudioError::Voice(e.to_string()));
            }
        };

        let join: std::pin::Pin<Box<dyn std::future::Future<Output = AudioResult<()>> + Send + Sync>> =
            Box::pin(async move { join.await.map_err(|e| AudioError::Voice(e.to_string())) });

        Ok(Box::new(SongbirdSession {
            songbird: self.songbird.clone(),
            guild_id,
            channel_id,
            call,
            join: Some(join),
            track: None,
        }))
    }
}

struct SongbirdSession {
    songbird: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    call: Arc<Mutex<Call>>,
    join: Option<std::pin::Pin<Box<dyn std::future::Future<Output = AudioResult<()>> + Send + Sync>>>,
    track: Option<TrackHandle>,
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn subscribe(&mut self, output: MixReader) -> AudioResult<()> {
        let input: Input = RawAdapter::new(output, SAMPLE_RATE, CHANNELS).into();
        let mut handler = self.call.lock().await;
        if let Some(previous) = self.track.take() {
            let _ = previous.stop();
        }
        self.track = Some(handler.play_input(input));
        debug!("🔌 Salida del mezclador suscrita en guild {}", self.guild_id);
        Ok(())
    }

    async fn ready(&mut self) -> AudioResult<()> {
        match self.join.take() {
            Some(join) => join.await,
            None => Ok(()),
        }
    }

    async fn destroy(mut self: Box<Self>) {
        if let Some(track) = self.track.take() {
            let _ = track.stop();
        }
        match self.songbird.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => warn!("Error al salir del canal en guild {}: {:?}", self.guild_id, e),
        }
    }
}
