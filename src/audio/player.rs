use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{
    engine::Volumes,
    manager::GuildAudioManager,
    transcoder::Transcoder,
    voice::{VoiceTarget, VoiceTransport},
    AudioError, AudioResult,
};
use crate::{
    sources::{SoundCatalog, SoundCategory, SoundFile, TrackInfo},
    storage::{SnapshotPayload, SnapshotStore},
};

/// Parámetros de reproducción compartidos por todos los gestores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    pub volumes: Volumes,
    pub connect_timeout: Duration,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volumes: Volumes::default(),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// De dónde sale un estado reportado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    Live,
    Snapshot,
}

/// Estado de reproducción de una guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildPlaybackState {
    pub guild_id: GuildId,
    pub connected_channel_id: Option<ChannelId>,
    pub connected_channel_name: Option<String>,
    pub is_idle: bool,
    pub track: Option<TrackInfo>,
    pub source: StateSource,
    pub last_updated: DateTime<Utc>,
}

type SharedManager = Arc<Mutex<GuildAudioManager>>;

/// Registro guild → gestor de audio.
///
/// Las operaciones sobre una misma guild se serializan con el mutex del
/// gestor. Si un gestor se destruye mientras otra operación esperaba su lock,
/// esa operación vuelve a resolver la guild y trabaja sobre uno nuevo.
pub struct PlaybackRegistry {
    managers: DashMap<GuildId, SharedManager>,
    transport: Arc<dyn VoiceTransport>,
    transcoder: Arc<dyn Transcoder>,
    catalog: Arc<dyn SoundCatalog>,
    snapshots: Arc<dyn SnapshotStore>,
    settings: PlaybackSettings,
}

impl PlaybackRegistry {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        transcoder: Arc<dyn Transcoder>,
        catalog: Arc<dyn SoundCatalog>,
        snapshots: Arc<dyn SnapshotStore>,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            managers: DashMap::new(),
            transport,
            transcoder,
            catalog,
            snapshots,
            settings,
        }
    }

    pub async fn connect(&self, guild_id: GuildId, target: VoiceTarget) -> AudioResult<()> {
        loop {
            let mut manager = self.get_or_create(guild_id).lock_owned().await;
            if manager.is_destroyed() {
                continue;
            }
            manager.connect(target.clone()).await?;
            info!("🔗 Conectado a #{} en guild {}", target.label, guild_id);
            self.persist(&manager).await;
            return Ok(());
        }
    }

    /// Sale del canal y olvida la guild. Sin efecto si no estaba registrada.
    pub async fn disconnect(&self, guild_id: GuildId) {
        let Some((_, entry)) = self.managers.remove(&guild_id) else {
            debug!("Disconnect guild {}: sin gestor", guild_id);
            return;
        };

        entry.lock().await.destroy().await;
        if let Err(e) = self.snapshots.remove(guild_id).await {
            warn!("No se pudo borrar el snapshot de guild {}: {}", guild_id, e);
        }
        info!("👋 Desconectado de guild {}", guild_id);
    }

    /// Detiene la música. Sin efecto si la guild no está registrada.
    pub async fn stop(&self, guild_id: GuildId) {
        let Some(entry) = self.existing(guild_id) else {
            debug!("Stop guild {}: sin gestor", guild_id);
            return;
        };

        let mut manager = entry.lock().await;
        if manager.is_destroyed() {
            return;
        }
        manager.stop_music();
        self.persist(&manager).await;
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
    }

    pub async fn play_music(
        &self,
        guild_id: GuildId,
        query: &str,
        channel: Option<VoiceTarget>,
    ) -> AudioResult<SoundFile> {
        let mut manager = self.resolve_manager(guild_id, channel).await?;
        let file = self.catalog.resolve(SoundCategory::Music, query).await?;

        manager.play_music(&file.path, file.info.clone())?;
        info!("🎵 Reproduciendo '{}' en guild {}", file.info.name, guild_id);
        self.persist(&manager).await;
        Ok(file)
    }

    pub async fn play_effect(
        &self,
        guild_id: GuildId,
        query: &str,
        channel: Option<VoiceTarget>,
    ) -> AudioResult<SoundFile> {
        let mut manager = self.resolve_manager(guild_id, channel).await?;
        let file = self.catalog.resolve(SoundCategory::Effects, query).await?;

        manager.play_effect(&file.path)?;
        info!("💥 Efecto '{}' en guild {}", file.info.name, guild_id);
        self.persist(&manager).await;
        Ok(file)
    }

    /// Estado en vivo de cada guild registrada, seguido de los snapshots de
    /// guilds que ya no están en memoria.
    pub async fn get_state(&self) -> Vec<GuildPlaybackState> {
        let now = Utc::now();
        let mut live = Vec::new();
        for entry in self.entries() {
            let manager = entry.lock().await;
            if manager.is_destroyed() {
                continue;
            }
            live.push(GuildPlaybackState {
                guild_id: manager.guild_id(),
                connected_channel_id: manager.channel_id(),
                connected_channel_name: manager.channel_label().map(str::to_string),
                is_idle: manager.is_idle(),
                track: manager.track().cloned(),
                source: StateSource::Live,
                last_updated: now,
            });
        }
        live.sort_by_key(|state| state.guild_id);
        debug!("get_state: {} guild(s) en vivo", live.len());

        let snapshots = match self.snapshots.list().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!("No se pudieron leer los snapshots: {}", e);
                Vec::new()
            }
        };

        let fallbacks: Vec<_> = snapshots
            .into_iter()
            .filter(|snapshot| !live.iter().any(|state| state.guild_id == snapshot.guild_id))
            .map(|snapshot| GuildPlaybackState {
                guild_id: snapshot.guild_id,
                connected_channel_id: snapshot.connected_channel_id,
                connected_channel_name: snapshot.connected_channel_name,
                is_idle: snapshot.is_idle,
                track: snapshot.track,
                source: StateSource::Snapshot,
                last_updated: snapshot.updated_at,
            })
            .collect();

        live.extend(fallbacks);
        live
    }

    pub async fn connected_channel_id(&self, guild_id: GuildId) -> Option<ChannelId> {
        let entry = self.existing(guild_id)?;
        let manager = entry.lock().await;
        manager.channel_id()
    }

    /// Destruye todos los gestores. Los snapshots se conservan.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.managers.iter().map(|entry| *entry.key()).collect();
        for guild_id in &guilds {
            if let Some((_, entry)) = self.managers.remove(guild_id) {
                entry.lock().await.destroy().await;
            }
        }
        info!("🛑 Registro de reproducción cerrado ({} guilds)", guilds.len());
    }

    fn get_or_create(&self, guild_id: GuildId) -> SharedManager {
        self.managers
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(GuildAudioManager::new(
                    guild_id,
                    self.transport.clone(),
                    self.transcoder.clone(),
                    self.settings,
                )))
            })
            .clone()
    }

    fn existing(&self, guild_id: GuildId) -> Option<SharedManager> {
        self.managers.get(&guild_id).map(|entry| entry.value().clone())
    }

    fn entries(&self) -> Vec<SharedManager> {
        self.managers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Gestor listo para reproducir: se conecta a `channel` si se indica; si no,
    /// exige una conexión previa y no crea nada.
    async fn resolve_manager(
        &self,
        guild_id: GuildId,
        channel: Option<VoiceTarget>,
    ) -> AudioResult<OwnedMutexGuard<GuildAudioManager>> {
        loop {
            let entry = match &channel {
                Some(_) => self.get_or_create(guild_id),
                None => self.existing(guild_id).ok_or(AudioError::NotConnected)?,
            };

            let mut manager = entry.lock_owned().await;
            if manager.is_destroyed() {
                continue;
            }

            match &channel {
                Some(target) => {
                    manager.connect(target.clone()).await?;
                    self.persist(&manager).await;
                }
                None if !manager.connected() => {
                    warn!("Guild {}: sin conexión ni canal indicado", guild_id);
                    return Err(AudioError::NotConnected);
                }
                None => {}
            }
            return Ok(manager);
        }
    }

    /// Los fallos de persistencia solo se registran.
    async fn persist(&self, manager: &GuildAudioManager) {
        let payload = SnapshotPayload {
            guild_id: manager.guild_id(),
            connected_channel_id: manager.channel_id(),
            connected_channel_name: manager.channel_label().map(str::to_string),
            track: manager.track().cloned(),
            is_idle: manager.is_idle(),
        };
        if let Err(e) = self.snapshots.upsert(payload).await {
            warn!(
                "No se pudo guardar el snapshot de guild {}: {}",
                manager.guild_id(),
                e
            );
        }
    }
}
