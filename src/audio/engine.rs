//! Motor de audio por guild.
//!
//! Posee el bus de mezcla, la salida y los pipelines `ffmpeg → canal`. Cada
//! pipeline se identifica con un [`StreamId`] creciente; el fin de un stream
//! solo tiene efecto si su id sigue siendo el vigente, de modo que el bucle,
//! los errores y las paradas explícitas no pueden duplicar spawns ni liberar
//! dos veces el mismo canal.

use bytes::Bytes;
use futures::AsyncReadExt;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    mixer::{ChannelHandle, MixBus, MixChannel, MixChannelId, MixReader},
    transcoder::{Transcode, TranscodeExit, Transcoder},
    AudioError, AudioResult, FRAME_BYTES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

/// Cómo terminó un pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Closed,
    Failed(String),
    Cancelled,
}

/// Volúmenes en escala 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volumes {
    pub music: u8,
    pub effects: u8,
}

impl Default for Volumes {
    fn default() -> Self {
        Self {
            music: 85,
            effects: 90,
        }
    }
}

/// Salida continua del motor. Se crea una sola vez por motor.
pub struct OutputSink {
    bus: MixBus,
    stopped: AtomicBool,
}

impl OutputSink {
    /// Lector para suscribir a una sesión de voz; desconecta al anterior.
    pub fn attach(&self) -> MixReader {
        self.bus.reader()
    }

    /// `true` si no hay ninguna entrada sonando (solo silencio) o la salida se detuvo.
    pub fn is_idle(&self) -> bool {
        self.stopped.load(Ordering::Acquire) || self.bus.channel_count() == 0
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

struct ActiveStream {
    id: StreamId,
    path: PathBuf,
    volume: u8,
    looped: bool,
    channel: ChannelHandle,
    /// Iteraciones anteriores del bucle que aún suenan su cola.
    draining: Vec<ChannelHandle>,
    cancel: CancellationToken,
}

impl ActiveStream {
    /// Corte inmediato: el canal y las colas del bucle salen de la mezcla ya;
    /// ffmpeg muere después.
    fn teardown(self) {
        for tail in &self.draining {
            tail.destroy();
        }
        self.channel.destroy();
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct EngineState {
    music: Option<ActiveStream>,
    effects: HashMap<StreamId, ActiveStream>,
    next_stream: u64,
    destroyed: bool,
}

struct EngineInner {
    bus: MixBus,
    output: OutputSink,
    transcoder: Arc<dyn Transcoder>,
    volumes: Volumes,
    state: Mutex<EngineState>,
}

pub struct AudioEngine {
    inner: Arc<EngineInner>,
}

impl AudioEngine {
    pub fn new(transcoder: Arc<dyn Transcoder>, volumes: Volumes) -> Self {
        let bus = MixBus::new();
        let output = OutputSink {
            bus: bus.clone(),
            stopped: AtomicBool::new(false),
        };
        Self {
            inner: Arc::new(EngineInner {
                bus,
                output,
                transcoder,
                volumes,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    pub fn output(&self) -> &OutputSink {
        &self.inner.output
    }

    /// Reemplaza la música actual (aunque sea el mismo archivo) y la deja en bucle.
    pub fn play_music(&self, path: &Path) -> AudioResult<StreamId> {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return Err(AudioError::EngineClosed);
        }
        if let Some(previous) = state.music.take() {
            debug!("⏹️ Reemplazando música {:?}", previous.id);
            previous.teardown();
        }

        let stream = self
            .inner
            .spawn_stream(&mut state, path, self.inner.volumes.music, true, None)?;
        let id = stream.id;
        info!("🎵 Música en bucle: {}", path.display());
        state.music = Some(stream);
        Ok(id)
    }

    /// Sin efecto si no hay música.
    pub fn stop_music(&self) {
        let mut state = self.inner.state.lock();
        if let Some(music) = state.music.take() {
            info!("⏹️ Música detenida: {}", music.path.display());
            music.teardown();
        }
    }

    pub fn play_effect(&self, path: &Path) -> AudioResult<StreamId> {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return Err(AudioError::EngineClosed);
        }
        let stream = self
            .inner
            .spawn_stream(&mut state, path, self.inner.volumes.effects, false, None)?;
        let id = stream.id;
        debug!("💥 Efecto {:?}: {}", id, path.display());
        state.effects.insert(id, stream);
        Ok(id)
    }

    /// Detiene todo, destruye el bus y la salida. Idempotente.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(music) = state.music.take() {
            music.teardown();
        }
        for (_, effect) in state.effects.drain() {
            effect.teardown();
        }
        drop(state);

        self.inner.output.stop();
        self.inner.bus.destroy();
        debug!("🧹 Motor de audio destruido");
    }

    pub fn is_music_active(&self) -> bool {
        self.inner.state.lock().music.is_some()
    }

    pub fn music_path(&self) -> Option<PathBuf> {
        self.inner
            .state
            .lock()
            .music
            .as_ref()
            .map(|music| music.path.clone())
    }

    pub fn active_effects(&self) -> usize {
        self.inner.state.lock().effects.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    #[cfg(test)]
    pub(crate) fn bus(&self) -> &MixBus {
        &self.inner.bus
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl EngineInner {
    fn spawn_stream(
        self: &Arc<Self>,
        state: &mut EngineState,
        path: &Path,
        volume: u8,
        looped: bool,
        after: Option<MixChannelId>,
    ) -> AudioResult<ActiveStream> {
        let transcode = self.transcoder.spawn(path)?;
        let channel = match after {
            Some(previous) => self.bus.create_queued_channel(volume, previous),
            None => self.bus.create_channel(volume),
        };

        let id = StreamId(state.next_stream);
        state.next_stream += 1;
        let cancel = CancellationToken::new();
        let stream = ActiveStream {
            id,
            path: path.to_path_buf(),
            volume,
            looped,
            channel: channel.handle(),
            draining: Vec::new(),
            cancel: cancel.clone(),
        };

        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = pump(transcode, channel, cancel).await;
            if let Some(engine) = engine.upgrade() {
                engine.on_stream_end(id, outcome);
            }
        });

        Ok(stream)
    }

    /// Transición de fin de stream.
    fn on_stream_end(self: &Arc<Self>, id: StreamId, outcome: StreamOutcome) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }

        let is_music = state.music.as_ref().map(|music| music.id) == Some(id);
        if is_music {
            // el pump ya selló o liberó el canal; no se vuelve a destruir
            let Some(ended) = state.music.take() else {
                return;
            };
            match outcome {
                StreamOutcome::Closed if ended.looped => {
                    match self.spawn_stream(
                        &mut state,
                        &ended.path,
                        ended.volume,
                        true,
                        Some(ended.channel.id()),
                    ) {
                        Ok(mut next) => {
                            debug!("🔁 Bucle de música {:?} → {:?}", ended.id, next.id);
                            next.draining = ended.draining;
                            next.draining.push(ended.channel);
                            next.draining.retain(ChannelHandle::is_live);
                            state.music = Some(next);
                        }
                        Err(e) => warn!("No se pudo repetir {}: {}", ended.path.display(), e),
                    }
                }
                StreamOutcome::Closed => {
                    info!("🏁 Música terminada: {}", ended.path.display());
                }
                StreamOutcome::Failed(reason) => {
                    warn!(
                        "❌ Error decodificando {}: {} (sin reintento)",
                        ended.path.display(),
                        reason
                    );
                }
                StreamOutcome::Cancelled => {
                    debug!("Música {:?} cancelada", ended.id);
                }
            }
        } else if let Some(effect) = state.effects.remove(&id) {
            match outcome {
                StreamOutcome::Failed(reason) => {
                    warn!("❌ Error en efecto {}: {}", effect.path.display(), reason)
                }
                _ => debug!("Efecto {:?} terminado", effect.id),
            }
        }
    }
}

/// Copia PCM del decodificador al canal hasta que termine o se cancele.
///
/// Devuelve exactamente un desenlace y deja el canal sellado (fin natural) o
/// liberado (error / cancelación).
async fn pump(mut transcode: Transcode, channel: MixChannel, cancel: CancellationToken) -> StreamOutcome {
    let mut buf = vec![0u8; FRAME_BYTES];
    let mut produced = 0usize;

    let outcome = loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break StreamOutcome::Cancelled,
            read = transcode.pcm.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                let exit = tokio::select! {
                    _ = cancel.cancelled() => break StreamOutcome::Cancelled,
                    exit = transcode.process.wait() => exit,
                };
                break match exit {
                    TranscodeExit::Closed if produced == 0 => {
                        StreamOutcome::Failed("el archivo no produjo audio".to_string())
                    }
                    TranscodeExit::Closed => StreamOutcome::Closed,
                    TranscodeExit::Failed(reason) => StreamOutcome::Failed(reason),
                };
            }
            Ok(n) => {
                produced += n;
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                let written = tokio::select! {
                    _ = cancel.cancelled() => break StreamOutcome::Cancelled,
                    written = channel.write(chunk) => written,
                };
                if written.is_err() {
                    break StreamOutcome::Cancelled;
                }
            }
            Err(e) => break StreamOutcome::Failed(e.to_string()),
        }
    };

    match outcome {
        StreamOutcome::Closed => channel.finish(),
        _ => {
            transcode.process.terminate();
            channel.destroy();
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        mixer::MixTick,
        testing::{eventually, FakeBehavior, FakeTranscoder},
        FRAME_SAMPLES,
    };
    use pretty_assertions::assert_eq;

    fn engine(transcoder: &Arc<FakeTranscoder>) -> AudioEngine {
        AudioEngine::new(transcoder.clone(), Volumes::default())
    }

    fn drain(engine: &AudioEngine, frames: usize) {
        let mut out = vec![0; FRAME_SAMPLES];
        for _ in 0..frames {
            assert_eq!(engine.bus().mix_frame(&mut out), MixTick::Mixed);
        }
    }

    #[tokio::test]
    async fn test_play_music_keeps_single_music_channel() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        let engine = engine(&transcoder);

        for _ in 0..5 {
            engine.play_music(Path::new("track.mp3")).unwrap();
        }

        assert_eq!(engine.bus().channel_count(), 1);
        assert_eq!(transcoder.spawn_count("track.mp3"), 5);
        eventually(|| transcoder.alive() == 1).await;
    }

    #[tokio::test]
    async fn test_same_file_restarts_from_zero() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        let engine = engine(&transcoder);

        let first = engine.play_music(Path::new("track.mp3")).unwrap();
        let second = engine.play_music(Path::new("track.mp3")).unwrap();

        assert!(second > first);
        assert_eq!(engine.bus().released_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_music_when_idle_is_noop() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        let engine = engine(&transcoder);

        engine.stop_music();
        engine.stop_music();

        assert!(!engine.is_music_active());
        assert!(engine.output().is_idle());
        assert_eq!(engine.bus().released_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_music_releases_channel_and_process() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        let engine = engine(&transcoder);

        engine.play_music(Path::new("track.mp3")).unwrap();
        assert!(!engine.output().is_idle());

        engine.stop_music();
        assert!(engine.output().is_idle());
        assert_eq!(engine.music_path(), None);
        eventually(|| transcoder.alive() == 0).await;
    }

    #[tokio::test]
    async fn test_natural_end_with_loop_spawns_exactly_once() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        transcoder.script(
            "loop.ogg",
            vec![FakeBehavior::Finite { bytes: FRAME_BYTES * 2 }],
        );
        let engine = engine(&transcoder);

        engine.play_music(Path::new("loop.ogg")).unwrap();
        eventually(|| transcoder.spawn_count("loop.ogg") == 2).await;

        assert!(engine.is_music_active());
        assert_eq!(engine.music_path(), Some(PathBuf::from("loop.ogg")));
        // el canal viejo se drena y el nuevo queda esperando detrás
        eventually(|| engine.bus().channel_count() == 2).await;
        drain(&engine, 3);
        assert_eq!(engine.bus().channel_count(), 1);
        assert_eq!(engine.bus().released_count(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(transcoder.spawn_count("loop.ogg"), 2);
    }

    #[tokio::test]
    async fn test_stop_during_loop_drain_silences_previous_iteration() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        transcoder.script(
            "loop.ogg",
            vec![FakeBehavior::Finite { bytes: FRAME_BYTES * 2 }],
        );
        let engine = engine(&transcoder);

        engine.play_music(Path::new("loop.ogg")).unwrap();
        eventually(|| engine.bus().channel_count() == 2).await;

        engine.stop_music();

        assert_eq!(engine.bus().channel_count(), 0);
        let mut out = vec![0; FRAME_SAMPLES];
        assert_eq!(engine.bus().mix_frame(&mut out), MixTick::Mixed);
        assert!(out.iter().all(|s| *s == 0));
        assert!(engine.output().is_idle());
    }

    #[tokio::test]
    async fn test_replace_during_loop_drain_keeps_only_new_track() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        transcoder.script(
            "loop.ogg",
            vec![FakeBehavior::Finite { bytes: FRAME_BYTES * 2 }],
        );
        let engine = engine(&transcoder);

        engine.play_music(Path::new("loop.ogg")).unwrap();
        eventually(|| engine.bus().channel_count() == 2).await;

        engine.play_music(Path::new("other.mp3")).unwrap();

        assert_eq!(engine.bus().channel_count(), 1);
        assert_eq!(engine.bus().released_count(), 2);
        let mut out = vec![0; FRAME_SAMPLES];
        engine.bus().mix_frame(&mut out);
        assert!(out.iter().all(|s| *s == 0));
    }

    #[tokio::test]
    async fn test_stop_before_end_prevents_reloop() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        transcoder.script("loop.ogg", vec![FakeBehavior::Finite { bytes: FRAME_BYTES }]);
        let engine = engine(&transcoder);

        engine.play_music(Path::new("loop.ogg")).unwrap();
        engine.stop_music();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(transcoder.spawn_count("loop.ogg"), 1);
        assert!(!engine.is_music_active());
    }

    #[tokio::test]
    async fn test_decode_failure_ends_music_without_retry() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Fail));
        let engine = engine(&transcoder);

        engine.play_music(Path::new("corrupt.mp3")).unwrap();
        eventually(|| !engine.is_music_active()).await;

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(transcoder.spawn_count("corrupt.mp3"), 1);
        assert_eq!(engine.bus().channel_count(), 0);
        assert_eq!(engine.bus().released_count(), 1);
    }

    #[tokio::test]
    async fn test_effect_does_not_touch_music() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        transcoder.script("boom.wav", vec![FakeBehavior::Finite { bytes: FRAME_BYTES }]);
        let engine = engine(&transcoder);

        engine.play_music(Path::new("track.mp3")).unwrap();
        engine.play_effect(Path::new("boom.wav")).unwrap();
        eventually(|| engine.active_effects() == 0).await;

        drain(&engine, 2);
        assert!(engine.is_music_active());
        assert_eq!(engine.music_path(), Some(PathBuf::from("track.mp3")));
        assert_eq!(engine.bus().channel_count(), 1);
        assert_eq!(transcoder.spawn_count("boom.wav"), 1);
    }

    #[tokio::test]
    async fn test_failed_effect_releases_only_its_channel() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        transcoder.script("broken.wav", vec![FakeBehavior::Fail]);
        let engine = engine(&transcoder);

        engine.play_music(Path::new("track.mp3")).unwrap();
        engine.play_effect(Path::new("broken.wav")).unwrap();
        eventually(|| engine.active_effects() == 0).await;

        assert!(engine.is_music_active());
        assert_eq!(engine.bus().channel_count(), 1);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_final() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Endless));
        let engine = engine(&transcoder);

        engine.play_music(Path::new("track.mp3")).unwrap();
        engine.play_effect(Path::new("boom.wav")).unwrap();
        engine.destroy();
        engine.destroy();

        assert!(engine.is_destroyed());
        assert!(engine.output().is_idle());
        assert!(engine.bus().is_closed());
        assert!(matches!(
            engine.play_music(Path::new("track.mp3")),
            Err(AudioError::EngineClosed)
        ));
        eventually(|| transcoder.alive() == 0).await;
    }

    #[tokio::test]
    async fn test_empty_output_does_not_loop_forever() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::Finite { bytes: 0 }));
        let engine = engine(&transcoder);

        engine.play_music(Path::new("silence.mp3")).unwrap();
        eventually(|| !engine.is_music_active()).await;
        assert_eq!(transcoder.spawn_count("silence.mp3"), 1);
    }

    #[tokio::test]
    async fn test_spawn_error_creates_no_channel() {
        let transcoder = Arc::new(FakeTranscoder::new(FakeBehavior::SpawnError));
        let engine = engine(&transcoder);

        let result = engine.play_music(Path::new("track.mp3"));

        assert!(matches!(result, Err(AudioError::Transcoder(_))));
        assert!(!engine.is_music_active());
        assert_eq!(engine.bus().channel_count(), 0);
    }
}
