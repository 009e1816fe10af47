//! Local camera pipeline and remote video sinks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use huddle_media::{
    FrameHandlerMode, SinkFanout, VideoFrameHandler, VideoSink, VideoSource, VideoSourceConfig,
};

use crate::async_result::AsyncResult;
use crate::capture::CaptureBackend;
use crate::devices::{CameraDevice, DeviceRegistry};
use crate::dispatch::EventRegistry;
use crate::engine::{Executor, SerialQueue};
use crate::errors::HuddleError;
use crate::events::{ConferenceStatusUpdated, VideoDeviceChanged};
use crate::participants::VideoTrack;
use crate::session::ConferenceService;
use crate::transport::SignalingTransport;

/// Wiring between a capture device, an optional application handler and
/// the network input of one local video stream.
///
/// | handler sink | handler source | capture feeds          | network fed by |
/// |--------------|----------------|------------------------|----------------|
/// | -            | -              | network                | capture        |
/// | set          | -              | app sink and network   | capture        |
/// | set          | set            | app sink               | app source     |
/// | -            | set            | nothing (not started)  | app source     |
pub(crate) struct LocalPipeline {
    pub mode: FrameHandlerMode,
    pub capture_sink: Option<Arc<dyn VideoSink>>,
    pub app_source: Option<Arc<dyn VideoSource>>,
}

impl LocalPipeline {
    pub fn mode_of(handler: Option<&Arc<dyn VideoFrameHandler>>) -> FrameHandlerMode {
        handler.map_or(FrameHandlerMode::PassThrough, |h| {
            FrameHandlerMode::from_parts(h.sink().is_some(), h.source().is_some())
        })
    }

    /// Connect the handler to `network`. The application source, if any,
    /// starts feeding the network right away.
    pub fn wire(handler: Option<&Arc<dyn VideoFrameHandler>>, network: Arc<dyn VideoSink>) -> Self {
        let (app_sink, app_source) = handler.map_or((None, None), |h| (h.sink(), h.source()));
        let mode = FrameHandlerMode::from_parts(app_sink.is_some(), app_source.is_some());

        if let Some(source) = &app_source {
            source.set_sink(Some(network.clone()), VideoSourceConfig::default());
        }
        let capture_sink: Option<Arc<dyn VideoSink>> = match (app_sink, app_source.is_some()) {
            (None, false) => Some(network),
            (Some(app), false) => Some(Arc::new(SinkFanout::new(vec![app, network]))),
            (Some(app), true) => Some(app),
            (None, true) => None,
        };

        Self {
            mode,
            capture_sink,
            app_source,
        }
    }

    /// Stop the application source from feeding the network.
    pub fn detach(&self) {
        if let Some(source) = &self.app_source {
            source.set_sink(None, VideoSourceConfig::default());
        }
    }
}

struct LocalVideo {
    camera: Option<CameraDevice>,
    pipeline: LocalPipeline,
}

struct VideoInner {
    ops: SerialQueue,
    events: EventRegistry,
    transport: Arc<dyn SignalingTransport>,
    capture: Arc<dyn CaptureBackend>,
    devices: DeviceRegistry,
    conference: ConferenceService,
    local: Mutex<Option<LocalVideo>>,
}

impl VideoInner {
    fn lock(&self) -> MutexGuard<'_, Option<LocalVideo>> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pick_camera(&self) -> Result<CameraDevice, HuddleError> {
        if let Some(camera) = self.devices.first_camera() {
            return Ok(camera);
        }
        self.capture
            .video_devices()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HuddleError::NotFound("no camera available".into()))
    }

    async fn teardown(&self, local: LocalVideo) -> Result<(), HuddleError> {
        local.pipeline.detach();
        if local.pipeline.mode.uses_capture() {
            self.capture.stop_camera().await?;
        }
        self.transport.release_local_video(false).await?;
        self.devices.set_current_camera(None);
        tracing::info!("local video stopped");
        self.events.dispatch(&VideoDeviceChanged { device: None });
        Ok(())
    }
}

#[derive(Clone)]
pub struct VideoService {
    inner: Arc<VideoInner>,
}

impl VideoService {
    pub fn new(
        executor: Executor,
        events: EventRegistry,
        transport: Arc<dyn SignalingTransport>,
        capture: Arc<dyn CaptureBackend>,
        devices: DeviceRegistry,
        conference: ConferenceService,
    ) -> Self {
        let inner = Arc::new(VideoInner {
            ops: SerialQueue::new(executor),
            events: events.clone(),
            transport,
            capture,
            devices,
            conference,
            local: Mutex::new(None),
        });

        // Local video does not outlive the conference.
        let weak = Arc::downgrade(&inner);
        events
            .add_event_handler(move |event: &ConferenceStatusUpdated| {
                if !event.is_ended() {
                    return;
                }
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.lock().is_none() {
                    return;
                }
                VideoService { inner }
                    .stop_local_video()
                    .on_error(|error| tracing::warn!(%error, "stopping local video failed"));
            })
            .ignore_errors();

        Self { inner }
    }

    /// Start the camera (or the application source) and publish it.
    ///
    /// Without `camera`, the first known camera is used. A running local
    /// video is stopped first.
    pub fn start_local_video(
        &self,
        camera: Option<CameraDevice>,
        handler: Option<Arc<dyn VideoFrameHandler>>,
    ) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let previous = inner.lock().take();
            if let Some(previous) = previous {
                inner.teardown(previous).await?;
            }

            let mode = LocalPipeline::mode_of(handler.as_ref());
            let camera = match (mode.uses_capture(), camera) {
                (false, _) => None,
                (true, Some(camera)) => Some(camera),
                (true, None) => Some(inner.pick_camera().await?),
            };

            let network = inner.transport.local_video_input(false).await?;
            let pipeline = LocalPipeline::wire(handler.as_ref(), network);
            if let (Some(device), Some(sink)) = (&camera, &pipeline.capture_sink) {
                if let Err(error) = inner.capture.start_camera(device.clone(), sink.clone()).await {
                    pipeline.detach();
                    if let Err(release) = inner.transport.release_local_video(false).await {
                        tracing::warn!(error = %release, "releasing local video input failed");
                    }
                    return Err(error);
                }
            }

            inner.devices.set_current_camera(camera.clone());
            tracing::info!(
                camera = camera.as_ref().map(|c| c.name.as_str()),
                mode = ?pipeline.mode,
                "local video started"
            );
            *inner.lock() = Some(LocalVideo {
                camera: camera.clone(),
                pipeline,
            });
            inner.events.dispatch(&VideoDeviceChanged { device: camera });
            Ok(())
        })
    }

    /// Stop local video. Does nothing when none is running.
    pub fn stop_local_video(&self) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let local = inner.lock().take();
            match local {
                Some(local) => inner.teardown(local).await,
                None => Ok(()),
            }
        })
    }

    pub fn is_local_video_active(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn current_camera(&self) -> Option<CameraDevice> {
        self.inner.lock().as_ref().and_then(|l| l.camera.clone())
    }

    /// Attach (or detach with `None`) a sink to a remote video track.
    pub fn set_remote_video_sink(
        &self,
        track: VideoTrack,
        sink: Option<Arc<dyn VideoSink>>,
    ) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            if !inner.conference.has_remote_video_track(&track) {
                return Err(HuddleError::NotFound(format!(
                    "remote video track {}",
                    track.sdp_track_id
                )));
            }
            tracing::debug!(
                track_id = %track.track_id,
                participant_id = %track.participant_id,
                attached = sink.is_some(),
                "remote video sink updated"
            );
            inner.transport.set_remote_video_sink(track, sink).await
        })
    }
}
