//! Raw media hooks: decoded remote audio, encoded remote video and an
//! injected local audio source.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use huddle_media::{AudioSink, AudioSource, EncodedVideoSink};

use crate::async_result::AsyncResult;
use crate::engine::{Executor, SerialQueue};
use crate::transport::SignalingTransport;

#[derive(Default)]
struct MediaIoState {
    audio_sink: Option<Arc<dyn AudioSink>>,
    encoded_sink: Option<Arc<dyn EncodedVideoSink>>,
    audio_source: Option<Arc<dyn AudioSource>>,
}

struct MediaIoInner {
    ops: SerialQueue,
    transport: Arc<dyn SignalingTransport>,
    state: Mutex<MediaIoState>,
}

impl MediaIoInner {
    fn lock(&self) -> MutexGuard<'_, MediaIoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Installs application sinks and sources on the backend. Each setter
/// replaces the previous hook once the backend accepted the new one;
/// `None` removes it.
#[derive(Clone)]
pub struct MediaIoService {
    inner: Arc<MediaIoInner>,
}

impl MediaIoService {
    pub fn new(executor: Executor, transport: Arc<dyn SignalingTransport>) -> Self {
        Self {
            inner: Arc::new(MediaIoInner {
                ops: SerialQueue::new(executor),
                transport,
                state: Mutex::new(MediaIoState::default()),
            }),
        }
    }

    pub fn set_audio_sink(&self, sink: Option<Arc<dyn AudioSink>>) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            inner.transport.set_audio_sink(sink.clone()).await?;
            tracing::debug!(installed = sink.is_some(), "audio sink updated");
            inner.lock().audio_sink = sink;
            Ok(())
        })
    }

    pub fn set_encoded_video_sink(&self, sink: Option<Arc<dyn EncodedVideoSink>>) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            inner.transport.set_encoded_video_sink(sink.clone()).await?;
            tracing::debug!(installed = sink.is_some(), "encoded video sink updated");
            inner.lock().encoded_sink = sink;
            Ok(())
        })
    }

    /// Replace the microphone with `source`, or restore it with `None`.
    pub fn set_audio_source(&self, source: Option<Arc<dyn AudioSource>>) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            inner.transport.set_audio_source(source.clone()).await?;
            tracing::debug!(installed = source.is_some(), "audio source updated");
            inner.lock().audio_source = source;
            Ok(())
        })
    }

    pub fn audio_sink(&self) -> Option<Arc<dyn AudioSink>> {
        self.inner.lock().audio_sink.clone()
    }

    pub fn encoded_video_sink(&self) -> Option<Arc<dyn EncodedVideoSink>> {
        self.inner.lock().encoded_sink.clone()
    }

    pub fn audio_source(&self) -> Option<Arc<dyn AudioSource>> {
        self.inner.lock().audio_source.clone()
    }
}
