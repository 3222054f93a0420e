use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, io::ErrorKind, path::PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::sources::TrackInfo;

/// Último estado conocido del reproductor de una guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub guild_id: GuildId,
    pub connected_channel_id: Option<ChannelId>,
    pub connected_channel_name: Option<String>,
    pub track: Option<TrackInfo>,
    pub is_idle: bool,
    pub updated_at: DateTime<Utc>,
}

/// Datos a persistir; la fecha la pone el store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPayload {
    pub guild_id: GuildId,
    pub connected_channel_id: Option<ChannelId>,
    pub connected_channel_name: Option<String>,
    pub track: Option<TrackInfo>,
    pub is_idle: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn upsert(&self, payload: SnapshotPayload) -> Result<()>;

    async fn remove(&self, guild_id: GuildId) -> Result<()>;

    /// Más recientes primero
    async fn list(&self) -> Result<Vec<PlayerSnapshot>>;
}

/// Store basado en archivos JSON, uno por guild
pub struct JsonSnapshotStore {
    data_dir: PathBuf,
    cache: RwLock<HashMap<GuildId, PlayerSnapshot>>,
}

impl JsonSnapshotStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let snapshots_dir = data_dir.join("snapshots");
        fs::create_dir_all(&snapshots_dir).await?;

        info!("📁 Snapshots en: {}", snapshots_dir.display());

        let store = Self {
            data_dir,
            cache: RwLock::new(HashMap::new()),
        };
        store.load_all().await?;

        Ok(store)
    }

    async fn load_all(&self) -> Result<()> {
        let mut files = fs::read_dir(self.snapshots_dir()).await?;
        let mut loaded = HashMap::new();

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let is_guild_file = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.starts_with("guild_"));
            if !is_guild_file {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .await
                .map_err(anyhow::Error::from)
                .and_then(|content| Ok(serde_json::from_str::<PlayerSnapshot>(&content)?));
            match parsed {
                Ok(snapshot) => {
                    loaded.insert(snapshot.guild_id, snapshot);
                }
                Err(e) => warn!("Error cargando snapshot {}: {}", path.display(), e),
            }
        }

        if !loaded.is_empty() {
            info!("📂 Cargados {} snapshots de reproductor", loaded.len());
        }
        *self.cache.write() = loaded;
        Ok(())
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    fn snapshot_path(&self, guild_id: GuildId) -> PathBuf {
        self.snapshots_dir().join(format!("guild_{}.json", guild_id))
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn upsert(&self, payload: SnapshotPayload) -> Result<()> {
        let snapshot = PlayerSnapshot {
            guild_id: payload.guild_id,
            connected_channel_id: payload.connected_channel_id,
            connected_channel_name: payload.connected_channel_name,
            track: payload.track,
            is_idle: payload.is_idle,
            updated_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(self.snapshot_path(snapshot.guild_id), content).await?;

        debug!(
            "💾 Snapshot guild={} canal={:?} idle={}",
            snapshot.guild_id, snapshot.connected_channel_id, snapshot.is_idle
        );
        self.cache.write().insert(snapshot.guild_id, snapshot);
        Ok(())
    }

    async fn remove(&self, guild_id: GuildId) -> Result<()> {
        self.cache.write().remove(&guild_id);
        match fs::remove_file(self.snapshot_path(guild_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("🗑️ Snapshot eliminado guild={}", guild_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PlayerSnapshot>> {
        let mut snapshots: Vec<_> = self.cache.read().values().cloned().collect();
        snapshots.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(snapshots)
    }
}
