//! Platform capture backend contract.
//!
//! Enumeration, device selection and capture control go through
//! [`CaptureBackend`]. Hot-plug and device failures come back through a
//! [`DeviceEventSink`](crate::devices::DeviceEventSink) as
//! [`DeviceNotification`]s.

use std::sync::Arc;

use huddle_media::VideoSink;

use crate::devices::{
    CameraDevice, DefaultAudioDevicePolicy, DeviceDirection, LinearVolume, NativeDeviceId,
};
use crate::errors::HuddleError;
use crate::screen_share::ScreenShareSource;
use crate::transport::BackendFuture;

/// An audio endpoint as the platform reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAudioDevice {
    pub native_id: NativeDeviceId,
    pub name: String,
    pub direction: DeviceDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceNotification {
    AudioAdded(NativeAudioDevice),
    AudioRemoved(NativeDeviceId),
    /// The platform replaced the device in place (remove and re-add).
    AudioChanged(NativeAudioDevice),
    CameraAdded(CameraDevice),
    CameraRemoved(CameraDevice),
    CameraError(String),
    ScreenShareError(String),
    AudioDeviceTimeout(String),
}

pub trait CaptureBackend: Send + Sync {
    fn audio_devices(&self) -> BackendFuture<Vec<NativeAudioDevice>>;
    fn video_devices(&self) -> BackendFuture<Vec<CameraDevice>>;
    fn screen_share_sources(&self) -> BackendFuture<Vec<ScreenShareSource>>;

    fn select_audio_device(
        &self,
        native_id: NativeDeviceId,
        direction: DeviceDirection,
    ) -> BackendFuture<()>;
    fn set_volume(&self, direction: DeviceDirection, volume: LinearVolume) -> BackendFuture<()>;

    /// Only some platforms expose a communications default.
    fn set_default_audio_device_policy(
        &self,
        _policy: DefaultAudioDevicePolicy,
    ) -> BackendFuture<()> {
        Box::pin(std::future::ready(Err(HuddleError::Unsupported(
            "default audio device policy".to_string(),
        ))))
    }

    /// Start the camera and feed every captured frame into `sink`.
    fn start_camera(&self, device: CameraDevice, sink: Arc<dyn VideoSink>) -> BackendFuture<()>;
    fn stop_camera(&self) -> BackendFuture<()>;

    fn start_screen_capture(
        &self,
        source: ScreenShareSource,
        sink: Arc<dyn VideoSink>,
    ) -> BackendFuture<()>;
    /// Move the running capture to another source, keeping its sink.
    fn switch_screen_capture(&self, source: ScreenShareSource) -> BackendFuture<()>;
    fn stop_screen_capture(&self) -> BackendFuture<()>;

    /// Whether a running capture of `from` can move to `to` without
    /// republishing the screen share track.
    fn can_switch_screen_source(&self, from: &ScreenShareSource, to: &ScreenShareSource) -> bool;
}
