//! Output channels backed by `rodio` sinks on the default device.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};
use rodio::mixer::Mixer;
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};

use crate::audio::SoundBuffer;
use crate::error::MixerError;

use super::{ChannelProvider, OutputChannel};

const OUTPUT_STREAM_OPEN_RETRIES: usize = 20;
const OUTPUT_STREAM_OPEN_RETRY_MS: u64 = 100;

/// Left/right gains shared lock-free between the engine and the audio thread.
#[derive(Debug)]
struct StereoGains {
    left: AtomicU32,
    right: AtomicU32,
}

impl StereoGains {
    fn new() -> Self {
        Self {
            left: AtomicU32::new(1.0_f32.to_bits()),
            right: AtomicU32::new(1.0_f32.to_bits()),
        }
    }

    fn store(&self, left: f32, right: f32) {
        self.left.store(left.to_bits(), Ordering::Relaxed);
        self.right.store(right.to_bits(), Ordering::Relaxed);
    }

    fn load(&self) -> (f32, f32) {
        (
            f32::from_bits(self.left.load(Ordering::Relaxed)),
            f32::from_bits(self.right.load(Ordering::Relaxed)),
        )
    }
}

struct Slot {
    sink: Sink,
    gains: Arc<StereoGains>,
    claimed: AtomicBool,
}

/// Fixed set of sinks connected to one output stream.
///
/// The stream itself lives on a dedicated thread for the lifetime of the
/// pool; only its mixer handle crosses threads.
pub struct RodioChannelPool {
    slots: Vec<Arc<Slot>>,
    shutdown: Option<mpsc::Sender<()>>,
    stream_thread: Option<JoinHandle<()>>,
}

impl RodioChannelPool {
    /// Open the default output device and create `channel_count` sinks.
    ///
    /// # Errors
    ///
    /// [`MixerError::Device`] when the device cannot be opened after retrying.
    pub fn open(channel_count: usize) -> Result<Self, MixerError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Mixer, MixerError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let stream_thread = thread::Builder::new()
            .name("murmur-output".to_string())
            .spawn(move || match open_output_stream_with_retry() {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(stream.mixer().clone()));
                    // Park until the pool is dropped; the stream closes with this thread.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|err| MixerError::Device(format!("cannot spawn output thread: {}", err)))?;

        let mixer = ready_rx
            .recv()
            .map_err(|_| MixerError::Device("output thread exited".to_string()))??;

        let slots = (0..channel_count.max(1))
            .map(|_| {
                let sink = Sink::connect_new(&mixer);
                sink.pause();
                Arc::new(Slot {
                    sink,
                    gains: Arc::new(StereoGains::new()),
                    claimed: AtomicBool::new(false),
                })
            })
            .collect::<Vec<_>>();
        info!("opened output stream with {} channels", slots.len());

        Ok(Self {
            slots,
            shutdown: Some(shutdown_tx),
            stream_thread: Some(stream_thread),
        })
    }
}

impl Drop for RodioChannelPool {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.sink.stop();
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}

impl ChannelProvider for RodioChannelPool {
    fn find_free_channel(&mut self) -> Option<Box<dyn OutputChannel>> {
        let slot = self.slots.iter().find(|slot| {
            slot.claimed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        })?;
        Some(Box::new(RodioChannel {
            slot: slot.clone(),
            released: false,
        }))
    }
}

/// Open the default output stream with bounded retry behavior.
fn open_output_stream_with_retry() -> Result<OutputStream, MixerError> {
    let mut last_error = String::new();
    for attempt in 1..=OUTPUT_STREAM_OPEN_RETRIES {
        match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                last_error = err.to_string();
                warn!(
                    "open_default_stream attempt {}/{} failed: {}",
                    attempt, OUTPUT_STREAM_OPEN_RETRIES, err
                );
                if attempt < OUTPUT_STREAM_OPEN_RETRIES {
                    thread::sleep(Duration::from_millis(OUTPUT_STREAM_OPEN_RETRY_MS));
                }
            }
        }
    }
    error!(
        "failed to open default output stream after {} attempts",
        OUTPUT_STREAM_OPEN_RETRIES
    );
    Err(MixerError::Device(last_error))
}

struct RodioChannel {
    slot: Arc<Slot>,
    released: bool,
}

impl OutputChannel for RodioChannel {
    fn play(&mut self, buffer: &SoundBuffer, looped: bool) {
        if self.released {
            return;
        }
        self.slot.sink.clear();
        self.slot
            .sink
            .append(PannedSource::new(buffer, self.slot.gains.clone(), looped));
        self.slot.sink.play();
    }

    fn set_gain(&mut self, left: f32, right: f32) {
        if !self.released {
            self.slot.gains.store(left, right);
        }
    }

    fn pause(&mut self) {
        if !self.released {
            self.slot.sink.pause();
        }
    }

    fn resume(&mut self) {
        if !self.released {
            self.slot.sink.play();
        }
    }

    fn stop(&mut self) {
        if self.released {
            return;
        }
        self.slot.sink.clear();
        self.slot.gains.store(1.0, 1.0);
        self.slot.claimed.store(false, Ordering::SeqCst);
        self.released = true;
    }

    fn is_active(&self) -> bool {
        !self.released && !self.slot.sink.empty()
    }
}

impl Drop for RodioChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Source that plays a [`SoundBuffer`] with live left/right gains.
///
/// Mono input is up-mixed to stereo. With more channels, even channel
/// indices take the left gain and odd ones the right gain.
struct PannedSource {
    samples: Arc<[f32]>,
    input_channels: u16,
    sample_rate: u32,
    position: usize,
    looped: bool,
    gains: Arc<StereoGains>,
    frame_gains: (f32, f32),
    pending_right: Option<f32>,
}

impl PannedSource {
    fn new(buffer: &SoundBuffer, gains: Arc<StereoGains>, looped: bool) -> Self {
        Self {
            samples: buffer.samples().clone(),
            input_channels: buffer.channels(),
            sample_rate: buffer.sample_rate(),
            position: 0,
            looped,
            frame_gains: gains.load(),
            gains,
            pending_right: None,
        }
    }

    fn next_raw(&mut self) -> Option<f32> {
        if self.position >= self.samples.len() {
            if !self.looped || self.samples.is_empty() {
                return None;
            }
            self.position = 0;
        }
        let sample = self.samples[self.position];
        self.position += 1;
        Some(sample)
    }
}

impl Iterator for PannedSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input_channels == 1 {
            if let Some(right) = self.pending_right.take() {
                return Some(right);
            }
            let sample = self.next_raw()?;
            let (left, right) = self.gains.load();
            self.pending_right = Some(sample * right);
            return Some(sample * left);
        }

        let channel = self.position % self.input_channels as usize;
        if channel == 0 {
            self.frame_gains = self.gains.load();
        }
        let sample = self.next_raw()?;
        let (left, right) = self.frame_gains;
        if channel % 2 == 0 {
            Some(sample * left)
        } else {
            Some(sample * right)
        }
    }
}

impl Source for PannedSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.input_channels.max(2)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
