//! # Audio Module
//!
//! Pipeline de audio de Hibiki: decodificación, mezcla y salida de voz.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! ### [`transcoder`] - Decodificador externo
//! - Un proceso `ffmpeg` por archivo, PCM s16le 48 kHz estéreo con fade-in corto
//!
//! ### [`mixer`] - Bus de mezcla
//! - Entradas independientes con ganancia propia, suma con recorte a 16 bits
//! - Salida continua: silencio cuando no hay entradas
//!
//! ### [`engine`] - Motor por guild
//! - Un slot de música en bucle y efectos puntuales sobre el mismo bus
//!
//! ### [`manager`] - Gestor por guild
//! - Ciclo de vida de la sesión de voz y metadatos de la pista actual
//!
//! ### [`player`] - Registro de reproducción
//! - Mapa guild → gestor con las operaciones que usa la capa de comandos
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed integers en la mezcla, `f32` hacia songbird
//! - **Channels**: Stereo (2 channels)
//! - **Frame**: 20 ms (960 muestras por canal)

pub mod engine;
pub mod error;
pub mod events;
pub mod manager;
pub mod mixer;
pub mod player;
pub mod transcoder;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AudioError, AudioResult};

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;

/// Muestras intercaladas en un frame de 20 ms.
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize / 50) * CHANNELS as usize;

/// Bytes s16le de un frame.
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Frames que cada entrada puede tener en cola (~500 ms).
pub const CHANNEL_QUEUE_FRAMES: usize = 25;
