//! Gestor de audio de una guild: sesión de voz + motor + pista actual.

use serenity::model::id::{ChannelId, GuildId};
use std::{path::Path, sync::Arc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{
    engine::AudioEngine,
    player::PlaybackSettings,
    transcoder::Transcoder,
    voice::{VoiceSession, VoiceTarget, VoiceTransport},
    AudioError, AudioResult,
};
use crate::sources::TrackInfo;

pub struct GuildAudioManager {
    guild_id: GuildId,
    transport: Arc<dyn VoiceTransport>,
    engine: AudioEngine,
    session: Option<Box<dyn VoiceSession>>,
    channel: Option<VoiceTarget>,
    track: Option<TrackInfo>,
    settings: PlaybackSettings,
    destroyed: bool,
}

impl GuildAudioManager {
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        transcoder: Arc<dyn Transcoder>,
        settings: PlaybackSettings,
    ) -> Self {
        debug!("🆕 Gestor de audio creado para guild {}", guild_id);
        Self {
            guild_id,
            transport,
            engine: AudioEngine::new(transcoder, settings.volumes),
            session: None,
            channel: None,
            track: None,
            settings,
            destroyed: false,
        }
    }

    /// Une el bot a `target`. Si ya está en ese canal solo actualiza la etiqueta.
    pub async fn connect(&mut self, target: VoiceTarget) -> AudioResult<()> {
        if self.destroyed {
            return Err(AudioError::EngineClosed);
        }

        let same_channel = self
            .session
            .as_ref()
            .is_some_and(|session| session.channel_id() == target.channel_id);
        if same_channel {
            debug!("Ya conectado a {} en guild {}", target.channel_id, self.guild_id);
            self.channel = Some(target);
            return Ok(());
        }

        self.release_session().await;

        let mut session = self.transport.open(self.guild_id, target.channel_id).await?;
        if let Err(e) = session.subscribe(self.engine.output().attach()).await {
            session.destroy().await;
            return Err(e);
        }

        let readiness = timeout(self.settings.connect_timeout, session.ready()).await;
        match readiness {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("❌ Fallo al unirse a {} en guild {}: {}", target.channel_id, self.guild_id, e);
                session.destroy().await;
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "⏰ Timeout conectando a {} en guild {}",
                    target.channel_id, self.guild_id
                );
                session.destroy().await;
                return Err(AudioError::ConnectionTimeout {
                    channel_id: target.channel_id,
                    timeout: self.settings.connect_timeout,
                });
            }
        }

        info!("✅ Conectado a #{} en guild {}", target.label, self.guild_id);
        self.session = Some(session);
        self.channel = Some(target);
        Ok(())
    }

    /// Sale del canal y detiene la música. Sin efecto si no hay conexión.
    pub async fn disconnect(&mut self) {
        self.stop_music();
        self.release_session().await;
    }

    /// Liberación final: tras esto el gestor no admite más operaciones.
    pub async fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.disconnect().await;
        self.engine.destroy();
        debug!("🧹 Gestor de guild {} destruido", self.guild_id);
    }

    pub fn play_music(&mut self, path: &Path, info: TrackInfo) -> AudioResult<()> {
        self.engine.play_music(path)?;
        self.track = Some(info);
        Ok(())
    }

    pub fn stop_music(&mut self) {
        self.engine.stop_music();
        self.track = None;
    }

    pub fn play_effect(&mut self, path: &Path) -> AudioResult<()> {
        self.engine.play_effect(path).map(|_| ())
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_idle(&self) -> bool {
        self.engine.output().is_idle()
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel.as_ref().map(|channel| channel.channel_id)
    }

    pub fn channel_label(&self) -> Option<&str> {
        self.channel.as_ref().map(|channel| channel.label.as_str())
    }

    /// Solo visible mientras la música sigue activa en el motor.
    pub fn track(&self) -> Option<&TrackInfo> {
        if self.engine.is_music_active() {
            self.track.as_ref()
        } else {
            None
        }
    }

    pub fn connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    async fn release_session(&mut self) {
        self.channel = None;
        if let Some(session) = self.session.take() {
            debug!("🔌 Cerrando sesión en canal {}", session.channel_id());
            session.destroy().await;
        }
    }
}
