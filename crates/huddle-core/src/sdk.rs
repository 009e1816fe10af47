use std::sync::Arc;

use crate::capture::CaptureBackend;
use crate::devices::{DeviceEventSink, DeviceRegistry};
use crate::dispatch::EventRegistry;
use crate::engine::{Engine, Executor};
use crate::errors::HuddleError;
use crate::media_io::MediaIoService;
use crate::session::{ConferenceService, SignalingEventSink};
use crate::transport::SignalingTransport;
use crate::video::VideoService;

/// One conferencing session: the engine thread plus every service bound to
/// it.
///
/// Dropping the `Sdk` removes all event handlers and stops the engine;
/// results still pending at that point fail with `EngineStopped` or
/// "operation abandoned".
pub struct Sdk {
    engine: Engine,
    events: EventRegistry,
    conference: ConferenceService,
    devices: DeviceRegistry,
    video: VideoService,
    media_io: MediaIoService,
}

impl Sdk {
    pub fn new(
        transport: Arc<dyn SignalingTransport>,
        capture: Arc<dyn CaptureBackend>,
    ) -> Result<Self, HuddleError> {
        let engine = Engine::start()?;
        let executor = engine.executor();
        let events = EventRegistry::new(executor.clone());

        let devices = DeviceRegistry::new(executor.clone(), events.clone(), capture.clone());
        let conference = ConferenceService::new(
            executor.clone(),
            events.clone(),
            transport.clone(),
            capture.clone(),
            devices.clone(),
        );
        let video = VideoService::new(
            executor.clone(),
            events.clone(),
            transport.clone(),
            capture,
            devices.clone(),
            conference.clone(),
        );
        let media_io = MediaIoService::new(executor, transport);

        tracing::info!("sdk initialized");
        Ok(Self {
            engine,
            events,
            conference,
            devices,
            video,
            media_io,
        })
    }

    pub fn conference(&self) -> &ConferenceService {
        &self.conference
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn video(&self) -> &VideoService {
        &self.video
    }

    pub fn media_io(&self) -> &MediaIoService {
        &self.media_io
    }

    pub fn executor(&self) -> Executor {
        self.engine.executor()
    }

    /// Where the transport delivers server pushes.
    pub fn signaling_sink(&self) -> SignalingEventSink {
        self.conference.event_sink()
    }

    /// Where the capture backend delivers device notifications.
    pub fn device_sink(&self) -> DeviceEventSink {
        self.devices.event_sink()
    }
}

impl Drop for Sdk {
    fn drop(&mut self) {
        self.events.clear();
        self.engine.shutdown();
        tracing::info!("sdk released");
    }
}
