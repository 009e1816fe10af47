//! Huddle conferencing client core.
//!
//! Conference lifecycle, device tracking and media routing on top of a
//! pluggable signaling transport and capture backend. All state lives on a
//! single engine thread; every operation returns an [`AsyncResult`].

pub mod async_result;
pub mod capture;
pub mod conference;
pub mod devices;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod media_io;
pub mod participants;
pub mod screen_share;
pub mod sdk;
pub mod session;
pub mod spatial;
pub mod transport;
pub mod video;

pub use async_result::{AsyncResult, Resolver, unhandled_failure_count};
pub use capture::{CaptureBackend, DeviceNotification, NativeAudioDevice};
pub use conference::{
    ConferenceInfo, ConferenceOptions, ConferenceStatus, JoinOptions, ListenOptions,
    MediaConstraints, SpatialAudioStyle, VideoForwardingStrategy,
};
pub use devices::{
    AudioDevice, CameraDevice, DefaultAudioDevicePolicy, DeviceDirection, DeviceEventSink,
    DeviceIdentity,
};
pub use dispatch::{Event, EventRegistry, HandlerId};
pub use engine::{Engine, Executor};
pub use errors::HuddleError;
pub use logging::{LogLevel, LogSink, SinkLayer, init_logging, init_logging_with_sink};
pub use media_io::MediaIoService;
pub use participants::{AudioTrack, ParticipantDetails, ParticipantInfo, VideoTrack};
pub use sdk::Sdk;
pub use session::{ConferenceService, SignalingEventSink};
pub use transport::{BackendFuture, JoinedConference, SignalingEvent, SignalingTransport};
pub use video::VideoService;
