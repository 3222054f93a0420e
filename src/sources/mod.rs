pub mod library;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

use crate::audio::AudioResult;

pub use library::SoundLibrary;

/// Trait común para cualquier catálogo de sonidos
#[async_trait]
pub trait SoundCatalog: Send + Sync {
    /// Lista los sonidos de una categoría, los más recientes primero
    async fn list(&self, category: SoundCategory) -> AudioResult<Vec<SoundEntry>>;

    /// Resuelve por id exacto o, si no, por id/nombre aproximado
    async fn resolve(&self, category: SoundCategory, query: &str) -> AudioResult<SoundFile>;
}

/// Categorías de sonidos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundCategory {
    Music,
    Effects,
}

impl SoundCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoundCategory::Music => "music",
            SoundCategory::Effects => "effects",
        }
    }
}

impl fmt::Display for SoundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundCategory::Music => write!(f, "música"),
            SoundCategory::Effects => write!(f, "efecto"),
        }
    }
}

/// Metadatos de un sonido del catálogo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub category: SoundCategory,
}

/// Sonido resuelto, listo para decodificar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundFile {
    pub info: TrackInfo,
    pub path: PathBuf,
}

/// Entrada de listado
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoundEntry {
    #[serde(flatten)]
    pub info: TrackInfo,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}
