//! Bus de mezcla en tiempo real.
//!
//! Cada [`MixChannel`] es una entrada independiente con su propia ganancia.
//! El bus no tiene reloj propio: el lector ([`MixReader`]) extrae un frame de
//! 20 ms cada vez que songbird pide audio, de modo que la salida nunca se
//! detiene aunque no haya entradas activas (en ese caso emite silencio).
//!
//! Los productores (tareas que leen de ffmpeg) escriben a través de una cola
//! `flume` acotada; la contrapresión de esa cola es lo que marca el ritmo de
//! decodificación.

use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::{self, Read, Seek, SeekFrom},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};
use symphonia::core::io::MediaSource;
use tracing::debug;

use super::{CHANNELS, CHANNEL_QUEUE_FRAMES, FRAME_SAMPLES};

/// Identificador de una entrada del bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MixChannelId(u64);

impl std::fmt::Display for MixChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mix#{}", self.0)
    }
}

/// Error devuelto al escribir en un canal que ya salió de la mezcla.
#[derive(Debug, thiserror::Error)]
#[error("el canal {0} ya no forma parte de la mezcla")]
pub struct ChannelDetached(pub MixChannelId);

/// Resultado de mezclar un frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixTick {
    /// El bus fue destruido; la salida terminó.
    Closed,
    /// Frame emitido (posiblemente silencio).
    Mixed,
}

/// Convierte la escala 0-100 a amplitud lineal.
pub fn gain_from_volume(volume: u8) -> f32 {
    f32::from(volume.min(100)) / 100.0
}

struct Slot {
    rx: flume::Receiver<Bytes>,
    /// Muestras ya decodificadas, intercaladas L/R.
    pending: VecDeque<i16>,
    /// Byte bajo de una muestra partida entre dos escrituras.
    odd_byte: Option<u8>,
    gain: f32,
    /// Permanece en silencio mientras este canal siga en el bus.
    after: Option<MixChannelId>,
}

impl Slot {
    fn fill(&mut self) {
        while let Ok(chunk) = self.rx.try_recv() {
            let mut data: &[u8] = &chunk;
            if let Some(lo) = self.odd_byte.take() {
                match data.split_first() {
                    Some((&hi, rest)) => {
                        self.pending.push_back(i16::from_le_bytes([lo, hi]));
                        data = rest;
                    }
                    None => {
                        self.odd_byte = Some(lo);
                        continue;
                    }
                }
            }

            let samples = data.chunks_exact(2);
            self.odd_byte = samples.remainder().first().copied();
            self.pending
                .extend(samples.map(|pair| i16::from_le_bytes([pair[0], pair[1]])));
        }
    }

    /// Solo consume frames L/R completos; un frame a medias espera al siguiente tick.
    fn accumulate(&mut self, acc: &mut [i32]) {
        let frame = CHANNELS as usize;
        for values in acc.chunks_exact_mut(frame) {
            if self.pending.len() < frame {
                break;
            }
            for (value, sample) in values.iter_mut().zip(self.pending.drain(..frame)) {
                *value += (f32::from(sample) * self.gain).round() as i32;
            }
        }
    }

    /// Sellado por el productor y sin un frame completo pendiente.
    fn is_drained(&self) -> bool {
        self.rx.is_disconnected() && self.rx.is_empty() && self.pending.len() < CHANNELS as usize
    }
}

#[derive(Default)]
struct BusState {
    slots: HashMap<MixChannelId, Slot>,
    next_id: u64,
    closed: bool,
    reader_generation: u64,
}

struct BusShared {
    state: Mutex<BusState>,
    released: AtomicU64,
}

impl BusShared {
    /// Quita un slot de la mezcla. Devuelve `true` solo la primera vez.
    fn release(&self, id: MixChannelId) -> bool {
        let removed = self.state.lock().slots.remove(&id).is_some();
        if removed {
            self.released.fetch_add(1, Ordering::Relaxed);
            debug!("🔇 Canal {} retirado de la mezcla", id);
        }
        removed
    }
}

/// Mezclador de N entradas a una salida estéreo continua.
#[derive(Clone)]
pub struct MixBus {
    shared: Arc<BusShared>,
}

impl MixBus {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(BusShared {
                state: Mutex::new(BusState::default()),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Crea una entrada con ganancia fija (escala 0-100).
    pub fn create_channel(&self, volume: u8) -> MixChannel {
        self.insert_slot(volume, None)
    }

    /// Crea una entrada que no suena hasta que `after` haya salido del bus.
    ///
    /// Se usa para encadenar el bucle de música sin hueco ni solapamiento.
    pub fn create_queued_channel(&self, volume: u8, after: MixChannelId) -> MixChannel {
        self.insert_slot(volume, Some(after))
    }

    fn insert_slot(&self, volume: u8, after: Option<MixChannelId>) -> MixChannel {
        let (tx, rx) = flume::bounded(CHANNEL_QUEUE_FRAMES);
        let mut state = self.shared.state.lock();
        let id = MixChannelId(state.next_id);
        state.next_id += 1;

        // En un bus cerrado el slot no se registra: las escrituras fallan de inmediato.
        if !state.closed {
            state.slots.insert(
                id,
                Slot {
                    rx,
                    pending: VecDeque::new(),
                    odd_byte: None,
                    gain: gain_from_volume(volume),
                    after,
                },
            );
        }

        MixChannel {
            id,
            tx,
            shared: self.shared.clone(),
            sealed: false,
        }
    }

    /// Mezcla el siguiente frame en `out` (muestras intercaladas L/R).
    pub fn mix_frame(&self, out: &mut [i16]) -> MixTick {
        let mut acc = vec![0i32; out.len()];
        let mut state = self.shared.state.lock();
        if state.closed {
            return MixTick::Closed;
        }

        let live: HashSet<MixChannelId> = state.slots.keys().copied().collect();
        for slot in state.slots.values_mut() {
            if let Some(previous) = slot.after {
                if live.contains(&previous) {
                    continue;
                }
                slot.after = None;
            }
            slot.fill();
            slot.accumulate(&mut acc);
        }

        let mut drained = 0;
        state.slots.retain(|id, slot| {
            let keep = slot.after.is_some() || !slot.is_drained();
            if !keep {
                debug!("🏁 Canal {} agotado", id);
                drained += 1;
            }
            keep
        });
        drop(state);
        self.shared.released.fetch_add(drained, Ordering::Relaxed);

        for (sample, sum) in out.iter_mut().zip(acc) {
            *sample = sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        }
        MixTick::Mixed
    }

    /// Número de entradas presentes en el bus (incluidas las que se drenan).
    pub fn channel_count(&self) -> usize {
        self.shared.state.lock().slots.len()
    }

    pub fn contains(&self, id: MixChannelId) -> bool {
        self.shared.state.lock().slots.contains_key(&id)
    }

    /// Total de entradas liberadas desde la creación del bus.
    pub fn released_count(&self) -> u64 {
        self.shared.released.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Detiene la salida continua y descarta todas las entradas.
    pub fn destroy(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let dropped = state.slots.len() as u64;
        state.slots.clear();
        drop(state);
        self.shared.released.fetch_add(dropped, Ordering::Relaxed);
        debug!("🛑 Bus de mezcla destruido ({} canales descartados)", dropped);
    }

    /// Crea un lector nuevo e invalida los anteriores.
    pub fn reader(&self) -> MixReader {
        let generation = {
            let mut state = self.shared.state.lock();
            state.reader_generation += 1;
            state.reader_generation
        };
        MixReader {
            shared: self.shared.clone(),
            generation,
            frame: vec![0; FRAME_SAMPLES],
            carry: VecDeque::new(),
        }
    }

    fn reader_is_current(&self, generation: u64) -> bool {
        self.shared.state.lock().reader_generation == generation
    }
}

impl Default for MixBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Entrada de escritura del bus.
///
/// Se consume con [`finish`](Self::finish) o [`destroy`](Self::destroy); si se
/// suelta sin llamar a ninguno, se comporta como `destroy`.
pub struct MixChannel {
    id: MixChannelId,
    tx: flume::Sender<Bytes>,
    shared: Arc<BusShared>,
    sealed: bool,
}

impl MixChannel {
    pub fn id(&self) -> MixChannelId {
        self.id
    }

    /// Handle clonable para retirar el canal desde fuera del productor.
    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            id: self.id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Encola PCM s16le; espera si la cola está llena.
    pub async fn write(&self, pcm: Bytes) -> Result<(), ChannelDetached> {
        self.tx
            .send_async(pcm)
            .await
            .map_err(|_| ChannelDetached(self.id))
    }

    /// Fin natural: el audio ya encolado sigue sonando y el bus libera el
    /// canal cuando se agota.
    pub fn finish(mut self) {
        self.sealed = true;
    }

    /// Retira el canal de inmediato, descartando lo que tenga en cola.
    pub fn destroy(self) {}
}

impl Drop for MixChannel {
    fn drop(&mut self) {
        if !self.sealed {
            self.shared.release(self.id);
        }
    }
}

/// Referencia débil a un canal, usada por el motor para cortarlo al instante.
#[derive(Clone)]
pub struct ChannelHandle {
    id: MixChannelId,
    shared: Weak<BusShared>,
}

impl ChannelHandle {
    pub fn id(&self) -> MixChannelId {
        self.id
    }

    /// `true` mientras el canal siga en el bus (sonando, en cola o drenando).
    pub fn is_live(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.state.lock().slots.contains_key(&self.id))
    }

    /// Idempotente: solo la primera llamada efectiva libera el slot.
    pub fn destroy(&self) -> bool {
        self.shared
            .upgrade()
            .map(|shared| shared.release(self.id))
            .unwrap_or(false)
    }
}

/// Lector de la salida mezclada como flujo de bytes `f32` little-endian.
///
/// Es el formato que espera `songbird::input::RawAdapter`. Un lector deja de
/// producir datos (EOF) cuando el bus se destruye o cuando se crea otro lector.
pub struct MixReader {
    shared: Arc<BusShared>,
    generation: u64,
    frame: Vec<i16>,
    carry: VecDeque<u8>,
}

impl MixReader {
    fn bus(&self) -> MixBus {
        MixBus {
            shared: self.shared.clone(),
        }
    }

    fn refill(&mut self) -> bool {
        let bus = self.bus();
        if !bus.reader_is_current(self.generation) {
            return false;
        }
        if bus.mix_frame(&mut self.frame) == MixTick::Closed {
            return false;
        }
        for sample in &self.frame {
            let value = f32::from(*sample) / 32768.0;
            self.carry.extend(value.to_le_bytes());
        }
        true
    }
}

impl Read for MixReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.carry.is_empty() && !self.refill() {
            return Ok(0);
        }
        let n = buf.len().min(self.carry.len());
        for (dst, src) in buf.iter_mut().zip(self.carry.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Seek for MixReader {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "la salida del mezclador es un flujo en vivo",
        ))
    }
}

impl MediaSource for MixReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
