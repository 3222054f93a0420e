//! Adaptador del decodificador externo.
//!
//! Cada archivo se decodifica en su propio proceso `ffmpeg` que entrega PCM
//! s16le a 48 kHz estéreo por stdout. El proceso se lanza con
//! `kill_on_drop`, así que soltar el [`Transcode`] en cualquier camino (fin,
//! error, parada o pánico) termina el proceso.

use async_process::{Child, Command, Stdio};
use async_trait::async_trait;
use futures::io::AsyncRead;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use super::{AudioError, AudioResult, CHANNELS, SAMPLE_RATE};

/// Desenlace único de un proceso de decodificación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeExit {
    /// Terminó de decodificar (o fue terminado).
    Closed,
    /// Error de decodificación: archivo inexistente, corrupto, etc.
    Failed(String),
}

/// Control del proceso que produce el PCM.
#[async_trait]
pub trait DecodeProcess: Send {
    /// Espera el desenlace. Se llama una sola vez, después de agotar el PCM.
    async fn wait(&mut self) -> TranscodeExit;

    /// Idempotente.
    fn terminate(&mut self);
}

/// Un archivo en decodificación: flujo PCM más el proceso que lo genera.
pub struct Transcode {
    pub pcm: Box<dyn AsyncRead + Send + Unpin>,
    pub process: Box<dyn DecodeProcess>,
}

pub trait Transcoder: Send + Sync {
    fn spawn(&self, path: &Path) -> AudioResult<Transcode>;
}

/// Decodificador basado en `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
    fade_in: Duration,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>, fade_in: Duration) -> Self {
        Self {
            binary: binary.into(),
            fade_in,
        }
    }

    fn args(&self, path: &Path) -> Vec<String> {
        vec![
            "-analyzeduration".to_string(),
            "0".to_string(),
            "-loglevel".to_string(),
            "0".to_string(),
            "-i".to_string(),
            path.to_string_lossy().into_owned(),
            "-af".to_string(),
            format!("afade=t=in:st=0:d={:.3}", self.fade_in.as_secs_f32()),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            CHANNELS.to_string(),
            "pipe:1".to_string(),
        ]
    }
}

impl Transcoder for FfmpegTranscoder {
    fn spawn(&self, path: &Path) -> AudioResult<Transcode> {
        let mut child = Command::new(&self.binary)
            .args(self.args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AudioError::Transcoder(format!("{}: {}", self.binary.display(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AudioError::Transcoder("ffmpeg sin stdout".to_string()))?;

        debug!("🎛️ ffmpeg lanzado para {}", path.display());

        Ok(Transcode {
            pcm: Box::new(stdout),
            process: Box::new(FfmpegProcess { child }),
        })
    }
}

struct FfmpegProcess {
    child: Child,
}

#[async_trait]
impl DecodeProcess for FfmpegProcess {
    async fn wait(&mut self) -> TranscodeExit {
        match self.child.status().await {
            Ok(status) if status.success() => TranscodeExit::Closed,
            Ok(status) => TranscodeExit::Failed(format!("ffmpeg terminó con {}", status)),
            Err(e) => TranscodeExit::Failed(e.to_string()),
        }
    }

    fn terminate(&mut self) {
        // falla si el proceso ya salió; no importa
        let _ = self.child.kill();
    }
}
