//! Video sinks, sources and frame handlers.
//!
//! A sink is passive: whoever owns delivery calls `handle_frame`. A source
//! pushes frames into the sink registered through `set_sink`, from any
//! thread, until the sink is replaced or cleared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::frame::{I420Buffer, VideoFrame, VideoFrameBuffer};

/// Receiver of decoded video frames.
///
/// Called from capture or network threads, possibly concurrently with the
/// engine thread.
pub trait VideoSink: Send + Sync {
    fn handle_frame(&self, frame: &VideoFrame);
}

/// Delivery constraints a sink asks of its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSourceConfig {
    pub rotation_applied: bool,
    /// Replace every frame with black frames of the same size.
    pub black_frames: bool,
    pub max_pixel_count: u32,
    pub target_pixel_count: Option<u32>,
    pub max_framerate_fps: u32,
}

impl Default for VideoSourceConfig {
    fn default() -> Self {
        Self {
            rotation_applied: false,
            black_frames: false,
            max_pixel_count: u32::MAX,
            target_pixel_count: None,
            max_framerate_fps: u32::MAX,
        }
    }
}

/// Producer of video frames.
///
/// After `set_sink` returns, the previous sink must not receive any more
/// frames. Passing `None` stops delivery.
pub trait VideoSource: Send + Sync {
    fn set_sink(&self, sink: Option<Arc<dyn VideoSink>>, config: VideoSourceConfig);
}

struct SinkSlot {
    sink: Option<Arc<dyn VideoSink>>,
    config: VideoSourceConfig,
}

/// Ready-made [`VideoSource`] for code that produces frames itself
/// (capture backends, processors, test generators).
///
/// Deliveries hold a read lock on the sink slot; `set_sink` takes the write
/// lock, so it returns only once every in-flight delivery to the old sink
/// has finished. A sink must not call `set_sink` on the source that is
/// currently delivering to it.
pub struct FrameSource {
    name: String,
    slot: RwLock<SinkSlot>,
    delivered: AtomicU64,
}

impl FrameSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: RwLock::new(SinkSlot {
                sink: None,
                config: VideoSourceConfig::default(),
            }),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push a frame to the current sink. Returns `false` when no sink is set.
    pub fn deliver(&self, frame: &VideoFrame) -> bool {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = slot.sink.as_ref() else {
            return false;
        };

        if slot.config.black_frames {
            let black = VideoFrame::new(
                VideoFrameBuffer::I420(I420Buffer::new(frame.width(), frame.height())),
                frame.timestamp_us(),
            );
            sink.handle_frame(&black);
        } else {
            sink.handle_frame(frame);
        }

        let count = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
        if count == 1 {
            tracing::info!(
                source = %self.name,
                width = frame.width(),
                height = frame.height(),
                "first video frame delivered"
            );
        }
        true
    }

    pub fn has_sink(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sink
            .is_some()
    }

    pub fn config(&self) -> VideoSourceConfig {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).config
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl VideoSource for FrameSource {
    fn set_sink(&self, sink: Option<Arc<dyn VideoSink>>, config: VideoSourceConfig) {
        let attached = sink.is_some();
        let previous = {
            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.config = config;
            std::mem::replace(&mut slot.sink, sink)
        };
        tracing::debug!(
            source = %self.name,
            attached,
            replaced = previous.is_some(),
            "video source sink updated"
        );
    }
}

/// Forwards each frame to a fixed list of sinks, in order.
///
/// Immutable once built: to change the fan-out, build a new one and swap
/// it into the source.
pub struct SinkFanout {
    sinks: Vec<Arc<dyn VideoSink>>,
}

impl SinkFanout {
    pub fn new(sinks: Vec<Arc<dyn VideoSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl VideoSink for SinkFanout {
    fn handle_frame(&self, frame: &VideoFrame) {
        for sink in &self.sinks {
            sink.handle_frame(frame);
        }
    }
}

/// How a [`VideoFrameHandler`] takes part in a video pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHandlerMode {
    /// No sink, no source: frames go straight from capture to the network.
    PassThrough,
    /// Sink only: the application observes captured frames.
    PreviewOnly,
    /// Sink and source: captured frames go to the application, whose
    /// source feeds the network.
    Processing,
    /// Source only: the application produces every frame, camera unused.
    Injection,
}

impl FrameHandlerMode {
    pub fn from_parts(has_sink: bool, has_source: bool) -> Self {
        match (has_sink, has_source) {
            (false, false) => Self::PassThrough,
            (true, false) => Self::PreviewOnly,
            (true, true) => Self::Processing,
            (false, true) => Self::Injection,
        }
    }

    /// Whether the capture device has to run in this mode.
    pub fn uses_capture(self) -> bool {
        self != Self::Injection
    }
}

/// Application hook into a local video pipeline (camera or screen share).
pub trait VideoFrameHandler: Send + Sync {
    fn sink(&self) -> Option<Arc<dyn VideoSink>>;
    fn source(&self) -> Option<Arc<dyn VideoSource>>;

    fn mode(&self) -> FrameHandlerMode {
        FrameHandlerMode::from_parts(self.sink().is_some(), self.source().is_some())
    }
}

/// Plain [`VideoFrameHandler`] built from an optional sink and source.
#[derive(Clone, Default)]
pub struct FrameHandler {
    sink: Option<Arc<dyn VideoSink>>,
    source: Option<Arc<dyn VideoSource>>,
}

impl FrameHandler {
    pub fn new(sink: Option<Arc<dyn VideoSink>>, source: Option<Arc<dyn VideoSource>>) -> Self {
        Self { sink, source }
    }

    pub fn preview(sink: Arc<dyn VideoSink>) -> Self {
        Self::new(Some(sink), None)
    }

    pub fn processing(sink: Arc<dyn VideoSink>, source: Arc<dyn VideoSource>) -> Self {
        Self::new(Some(sink), Some(source))
    }

    pub fn injection(source: Arc<dyn VideoSource>) -> Self {
        Self::new(None, Some(source))
    }
}

impl VideoFrameHandler for FrameHandler {
    fn sink(&self) -> Option<Arc<dyn VideoSink>> {
        self.sink.clone()
    }

    fn source(&self) -> Option<Arc<dyn VideoSource>> {
        self.source.clone()
    }
}
