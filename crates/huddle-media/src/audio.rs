//! PCM audio frames, sinks and sources.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Interleaved 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn data(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of samples in each channel.
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

/// Receiver of decoded remote audio, called per stream/track.
pub trait AudioSink: Send + Sync {
    fn handle_audio(&self, stream_id: &str, track_id: &str, frame: &AudioFrame);
}

/// The media engine's input for injected audio.
pub trait RtcAudioSource: Send + Sync {
    fn on_data(&self, frame: &AudioFrame);
}

/// Application audio producer that replaces the microphone.
///
/// Once registered, the source pushes frames into the given
/// [`RtcAudioSource`] until it is deregistered.
pub trait AudioSource: Send + Sync {
    fn register_rtc_source(&self, source: Arc<dyn RtcAudioSource>);
    fn deregister_rtc_source(&self);
}

/// Default playout capacity: 2 seconds of 48kHz mono.
const DEFAULT_MAX_SAMPLES: usize = 48_000 * 2;

/// Thread-safe ring buffer for decoded remote audio.
///
/// Used as an [`AudioSink`]: remote frames are mixed down to mono and
/// queued; a platform output pulls from it.
///
/// Max capacity prevents unbounded growth if the consumer is slower than
/// the producer; old samples are discarded.
pub struct AudioPlayoutBuffer {
    buffer: Mutex<VecDeque<i16>>,
    max_samples: usize,
}

impl AudioPlayoutBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SAMPLES)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(max_samples)),
            max_samples,
        }
    }

    /// Push mono samples. Oldest samples are dropped past capacity.
    pub fn push_samples(&self, samples: &[i16]) {
        let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend(samples.iter().copied());

        let overflow = buf.len().saturating_sub(self.max_samples);
        if overflow > 0 {
            buf.drain(..overflow);
        }
    }

    /// Pull up to `out.len()` samples, zero-filling the rest.
    ///
    /// Returns the number of real samples written.
    pub fn pull_samples(&self, out: &mut [i16]) -> usize {
        let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let available = buf.len().min(out.len());

        for (slot, sample) in out.iter_mut().zip(buf.drain(..available)) {
            *slot = sample;
        }
        for sample in out[available..].iter_mut() {
            *sample = 0;
        }

        available
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Default for AudioPlayoutBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for AudioPlayoutBuffer {
    fn handle_audio(&self, _stream_id: &str, _track_id: &str, frame: &AudioFrame) {
        let channels = frame.channels() as usize;
        if channels == 1 {
            self.push_samples(frame.data());
            return;
        }
        let mono: Vec<i16> = frame
            .data()
            .chunks(channels)
            .map(|chunk| {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                (sum / chunk.len() as i32) as i16
            })
            .collect();
        self.push_samples(&mono);
    }
}
