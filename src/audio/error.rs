use serenity::model::id::ChannelId;
use std::time::Duration;
use thiserror::Error;

use crate::sources::SoundCategory;

/// Errores visibles para la capa de comandos.
///
/// Los fallos de decodificación posteriores al spawn nunca llegan aquí: el
/// motor los registra y solo se observan como "ya no está sonando".
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Hibiki no está conectado a un canal de voz. Usa /join primero.")]
    NotConnected,

    #[error("No se encontró {category} que coincida con '{query}'")]
    NotFound {
        category: SoundCategory,
        query: String,
    },

    #[error("El canal de voz {channel_id} no estuvo listo tras {timeout:?}")]
    ConnectionTimeout {
        channel_id: ChannelId,
        timeout: Duration,
    },

    #[error("Error de conexión de voz: {0}")]
    Voice(String),

    #[error("No se pudo iniciar el decodificador: {0}")]
    Transcoder(String),

    #[error("El motor de audio ya fue destruido")]
    EngineClosed,

    #[error("Error leyendo la biblioteca de sonidos: {0}")]
    Catalog(String),
}

pub type AudioResult<T> = std::result::Result<T, AudioError>;
