//! Dobles de prueba para el pipeline de audio.

use async_trait::async_trait;
use chrono::Utc;
use futures::io::AsyncRead;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, VecDeque},
    io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};

use super::{
    mixer::MixReader,
    transcoder::{DecodeProcess, Transcode, TranscodeExit, Transcoder},
    voice::{VoiceSession, VoiceTransport},
    AudioError, AudioResult,
};
use crate::sources::{SoundCatalog, SoundCategory, SoundEntry, SoundFile, TrackInfo};

/// Espera hasta ~2 s a que se cumpla la condición.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("la condición no se cumplió a tiempo");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Entrega `bytes` de PCM y termina bien.
    Finite { bytes: usize },
    /// Nunca termina por sí solo.
    Endless,
    /// Termina sin audio con error de decodificación.
    Fail,
    /// El proceso ni siquiera arranca.
    SpawnError,
}

pub struct FakeTranscoder {
    default: FakeBehavior,
    scripts: Mutex<HashMap<PathBuf, VecDeque<FakeBehavior>>>,
    spawns: Mutex<HashMap<PathBuf, usize>>,
    alive: Arc<AtomicUsize>,
}

impl FakeTranscoder {
    pub fn new(default: FakeBehavior) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            spawns: Mutex::new(HashMap::new()),
            alive: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Comportamientos para los próximos spawns de `path`; luego se usa el default.
    pub fn script(&self, path: impl AsRef<Path>, behaviors: Vec<FakeBehavior>) {
        self.scripts
            .lock()
            .insert(path.as_ref().to_path_buf(), behaviors.into());
    }

    pub fn spawn_count(&self, path: impl AsRef<Path>) -> usize {
        self.spawns.lock().get(path.as_ref()).copied().unwrap_or(0)
    }

    /// Procesos lanzados que aún no fueron terminados ni soltados.
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Transcoder for FakeTranscoder {
    fn spawn(&self, path: &Path) -> AudioResult<Transcode> {
        *self.spawns.lock().entry(path.to_path_buf()).or_insert(0) += 1;

        let behavior = self
            .scripts
            .lock()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone());

        let (pcm, exit) = match behavior {
            FakeBehavior::Finite { bytes } => (FakePcm::finite(bytes), TranscodeExit::Closed),
            FakeBehavior::Endless => (FakePcm::endless(), TranscodeExit::Closed),
            FakeBehavior::Fail => (
                FakePcm::finite(0),
                TranscodeExit::Failed("invalid data found when processing input".to_string()),
            ),
            FakeBehavior::SpawnError => {
                return Err(AudioError::Transcoder("ffmpeg: not found".to_string()))
            }
        };

        self.alive.fetch_add(1, Ordering::SeqCst);
        Ok(Transcode {
            pcm: Box::new(pcm),
            process: Box::new(FakeProcess {
                exit,
                alive: self.alive.clone(),
                terminated: false,
            }),
        })
    }
}

struct FakePcm {
    remaining: usize,
    endless: bool,
}

impl FakePcm {
    fn finite(bytes: usize) -> Self {
        Self {
            remaining: bytes,
            endless: false,
        }
    }

    fn endless() -> Self {
        Self {
            remaining: 0,
            endless: true,
        }
    }
}

impl AsyncRead for FakePcm {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.remaining > 0 {
            let n = this.remaining.min(buf.len());
            buf[..n].fill(0x10);
            this.remaining -= n;
            return Poll::Ready(Ok(n));
        }
        if this.endless {
            Poll::Pending
        } else {
            Poll::Ready(Ok(0))
        }
    }
}

struct FakeProcess {
    exit: TranscodeExit,
    alive: Arc<AtomicUsize>,
    terminated: bool,
}

#[async_trait]
impl DecodeProcess for FakeProcess {
    async fn wait(&mut self) -> TranscodeExit {
        self.exit.clone()
    }

    fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            self.alive.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Qué hace `ready()` en las sesiones que abre el [`FakeTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyBehavior {
    Ready,
    Fail,
    Hang,
}

#[derive(Debug)]
struct TransportState {
    ready: ReadyBehavior,
    fail_open: bool,
    opens: Vec<(GuildId, ChannelId)>,
    live_sessions: usize,
    subscriptions: usize,
    destroyed: usize,
}

/// Transporte en memoria que cuenta sesiones abiertas y destruidas.
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState {
                ready: ReadyBehavior::Ready,
                fail_open: false,
                opens: Vec::new(),
                live_sessions: 0,
                subscriptions: 0,
                destroyed: 0,
            })),
        }
    }

    pub fn set_ready(&self, behavior: ReadyBehavior) {
        self.state.lock().ready = behavior;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn opens(&self) -> Vec<(GuildId, ChannelId)> {
        self.state.lock().opens.clone()
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().live_sessions
    }

    pub fn subscriptions(&self) -> usize {
        self.state.lock().subscriptions
    }

    pub fn destroyed(&self) -> usize {
        self.state.lock().destroyed
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn open(&self, guild_id: GuildId, channel_id: ChannelId) -> AudioResult<Box<dyn VoiceSession>> {
        let mut state = self.state.lock();
        state.opens.push((guild_id, channel_id));
        if state.fail_open {
            return Err(AudioError::Voice("gateway rechazó la conexión".to_string()));
        }
        state.live_sessions += 1;
        Ok(Box::new(FakeSession {
            channel_id,
            ready: state.ready,
            _output: None,
            transport: self.state.clone(),
        }))
    }
}

struct FakeSession {
    channel_id: ChannelId,
    ready: ReadyBehavior,
    _output: Option<MixReader>,
    transport: Arc<Mutex<TransportState>>,
}

#[async_trait]
impl VoiceSession for FakeSession {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn subscribe(&mut self, output: MixReader) -> AudioResult<()> {
        self._output = Some(output);
        self.transport.lock().subscriptions += 1;
        Ok(())
    }

    async fn ready(&mut self) -> AudioResult<()> {
        match self.ready {
            ReadyBehavior::Ready => Ok(()),
            ReadyBehavior::Fail => Err(AudioError::Voice("handshake de voz fallido".to_string())),
            ReadyBehavior::Hang => futures::future::pending().await,
        }
    }

    async fn destroy(self: Box<Self>) {
        let mut state = self.transport.lock();
        state.live_sessions -= 1;
        state.destroyed += 1;
    }
}

/// Catálogo fijo en memoria; la ruta de cada sonido es su nombre de archivo.
pub struct StaticCatalog {
    music: Vec<TrackInfo>,
    effects: Vec<TrackInfo>,
}

impl StaticCatalog {
    pub fn new(music: &[&str], effects: &[&str]) -> Self {
        let infos = |files: &[&str], category: SoundCategory| -> Vec<TrackInfo> {
            files
                .iter()
                .map(|filename| TrackInfo {
                    id: filename.split('.').next().unwrap_or(filename).to_string(),
                    name: filename.to_string(),
                    filename: filename.to_string(),
                    category,
                })
                .collect()
        };
        Self {
            music: infos(music, SoundCategory::Music),
            effects: infos(effects, SoundCategory::Effects),
        }
    }

    fn infos(&self, category: SoundCategory) -> &[TrackInfo] {
        match category {
            SoundCategory::Music => &self.music,
            SoundCategory::Effects => &self.effects,
        }
    }
}

#[async_trait]
impl SoundCatalog for StaticCatalog {
    async fn list(&self, category: SoundCategory) -> AudioResult<Vec<SoundEntry>> {
        Ok(self
            .infos(category)
            .iter()
            .map(|info| SoundEntry {
                info: info.clone(),
                size: 0,
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn resolve(&self, category: SoundCategory, query: &str) -> AudioResult<SoundFile> {
        self.infos(category)
            .iter()
            .find(|info| info.id == query)
            .map(|info| SoundFile {
                info: info.clone(),
                path: PathBuf::from(&info.filename),
            })
            .ok_or_else(|| AudioError::NotFound {
                category,
                query: query.to_string(),
            })
    }
}
