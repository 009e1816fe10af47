//! Audio/video device tracking.
//!
//! The registry issues a stable [`DeviceIdentity`] per native device id and
//! keeps the live device set, the current selections and the announcement
//! history used to order added/removed events.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::async_result::AsyncResult;
use crate::capture::{CaptureBackend, DeviceNotification, NativeAudioDevice};
use crate::dispatch::{EventRegistry, HandlerId};
use crate::engine::{Executor, SerialQueue};
use crate::errors::HuddleError;
use crate::events::{
    AudioDeviceAdded, AudioDeviceChanged, AudioDeviceRemoved, AudioDeviceTimeoutFailure,
    AudioVolumeChanged, DeviceEvent, ScreenShareError, VideoDeviceAdded, VideoDeviceChanged,
    VideoDeviceError, VideoDeviceRemoved,
};
use crate::screen_share::ScreenShareSource;

/// Opaque device token issued by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(Uuid);

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform handle of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeDeviceId {
    Numeric(u32),
    Text(String),
}

impl fmt::Display for NativeDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceDirection {
    None,
    Input,
    Output,
    InputAndOutput,
}

impl DeviceDirection {
    pub fn has_input(self) -> bool {
        matches!(self, Self::Input | Self::InputAndOutput)
    }

    pub fn has_output(self) -> bool {
        matches!(self, Self::Output | Self::InputAndOutput)
    }
}

/// Audio endpoint. Two records are the same device when their identities
/// match, whatever their other fields say.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    identity: DeviceIdentity,
    pub name: String,
    pub direction: DeviceDirection,
    pub native_id: NativeDeviceId,
}

impl AudioDevice {
    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }
}

impl PartialEq for AudioDevice {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for AudioDevice {}

impl Hash for AudioDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraDevice {
    pub name: String,
    pub unique_id: String,
}

impl PartialEq for CameraDevice {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id
    }
}

impl Eq for CameraDevice {}

impl Hash for CameraDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_id.hash(state);
    }
}

/// Volume in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearVolume(pub f32);

impl LinearVolume {
    pub fn validate(self) -> Result<(), HuddleError> {
        if (0.0..=1.0).contains(&self.0) {
            Ok(())
        } else {
            Err(HuddleError::InvalidArgument(format!(
                "volume must be within [0, 1], got {}",
                self.0
            )))
        }
    }
}

/// Which system default the platform follows when no device is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAudioDevicePolicy {
    #[default]
    Output,
    Communications,
}

// ---------------------------------------------------------------------------
// Registry state
// ---------------------------------------------------------------------------

/// An announced audio device that left the live set, with the directions
/// whose current selection it was.
#[derive(Debug)]
struct Vanished {
    device: AudioDevice,
    cleared: Vec<DeviceDirection>,
}

/// Outcome of an audio enumeration.
#[derive(Debug, Default)]
struct AudioDiff {
    devices: Vec<AudioDevice>,
    added: Vec<AudioDevice>,
    vanished: Vec<Vanished>,
}

/// Outcome of a camera enumeration.
#[derive(Debug, Default)]
struct CameraDiff {
    added: Vec<CameraDevice>,
    removed: Vec<CameraDevice>,
    current_cleared: bool,
}

#[derive(Default)]
struct DeviceState {
    identities: HashMap<NativeDeviceId, DeviceIdentity>,
    live: Vec<AudioDevice>,
    announced: HashSet<NativeDeviceId>,
    cameras: Vec<CameraDevice>,
    announced_cameras: HashSet<String>,
    policy: DefaultAudioDevicePolicy,
    current_input: Option<AudioDevice>,
    current_output: Option<AudioDevice>,
    current_camera: Option<CameraDevice>,
    current_screen_source: Option<ScreenShareSource>,
    input_volume: Option<LinearVolume>,
    output_volume: Option<LinearVolume>,
}

impl DeviceState {
    fn identity_for(&mut self, native_id: &NativeDeviceId) -> DeviceIdentity {
        *self
            .identities
            .entry(native_id.clone())
            .or_insert_with(|| DeviceIdentity(Uuid::new_v4()))
    }

    fn device_from(&mut self, native: NativeAudioDevice) -> AudioDevice {
        AudioDevice {
            identity: self.identity_for(&native.native_id),
            name: native.name,
            direction: native.direction,
            native_id: native.native_id,
        }
    }

    /// Insert or refresh a live device. Returns it and whether it was
    /// announced for the first time.
    fn upsert(&mut self, native: NativeAudioDevice) -> (AudioDevice, bool) {
        let device = self.device_from(native);
        match self.live.iter().position(|d| d == &device) {
            Some(index) => self.live[index] = device.clone(),
            None => self.live.push(device.clone()),
        }
        for current in [&mut self.current_input, &mut self.current_output] {
            if current.as_ref() == Some(&device) {
                *current = Some(device.clone());
            }
        }
        let first_sight = self.announced.insert(device.native_id.clone());
        (device, first_sight)
    }

    /// Replace the live set with a fresh enumeration. Announced devices
    /// missing from it are dropped along with any selection they held.
    fn reconcile(&mut self, natives: Vec<NativeAudioDevice>) -> AudioDiff {
        let previous: Vec<NativeDeviceId> =
            self.live.iter().map(|d| d.native_id.clone()).collect();
        let mut diff = AudioDiff::default();
        for native in natives {
            let (device, first_sight) = self.upsert(native);
            if first_sight {
                diff.added.push(device.clone());
            }
            diff.devices.push(device);
        }
        for native_id in previous {
            if diff.devices.iter().any(|d| d.native_id == native_id) {
                continue;
            }
            if let Some(vanished) = self.remove(&native_id) {
                diff.vanished.push(vanished);
            }
        }
        self.live = diff.devices.clone();
        diff
    }

    fn remove(&mut self, native_id: &NativeDeviceId) -> Option<Vanished> {
        if !self.announced.remove(native_id) {
            return None;
        }
        let identity = self.identities.get(native_id).copied()?;
        let index = self.live.iter().position(|d| d.identity == identity)?;
        let device = self.live.remove(index);
        let mut cleared = Vec::new();
        if self.current_input.as_ref() == Some(&device) {
            self.current_input = None;
            cleared.push(DeviceDirection::Input);
        }
        if self.current_output.as_ref() == Some(&device) {
            self.current_output = None;
            cleared.push(DeviceDirection::Output);
        }
        Some(Vanished { device, cleared })
    }

    /// Record a hot-plugged camera. Returns whether it is new.
    fn add_camera(&mut self, device: CameraDevice) -> bool {
        self.cameras.retain(|c| c != &device);
        self.cameras.push(device.clone());
        self.announced_cameras.insert(device.unique_id)
    }

    /// Forget an announced camera. Returns `None` for cameras never
    /// announced, otherwise whether it was the current camera.
    fn remove_camera(&mut self, device: &CameraDevice) -> Option<bool> {
        if !self.announced_cameras.remove(&device.unique_id) {
            return None;
        }
        self.cameras.retain(|c| c != device);
        let was_current = self.current_camera.as_ref() == Some(device);
        if was_current {
            self.current_camera = None;
        }
        Some(was_current)
    }

    fn reconcile_cameras(&mut self, cameras: Vec<CameraDevice>) -> CameraDiff {
        let mut diff = CameraDiff::default();
        let gone: Vec<CameraDevice> = self
            .cameras
            .iter()
            .filter(|c| !cameras.contains(c))
            .cloned()
            .collect();
        for camera in gone {
            if let Some(was_current) = self.remove_camera(&camera) {
                diff.current_cleared |= was_current;
                diff.removed.push(camera);
            }
        }
        for camera in &cameras {
            if self.announced_cameras.insert(camera.unique_id.clone()) {
                diff.added.push(camera.clone());
            }
        }
        self.cameras = cameras;
        diff
    }

    fn live_device(&self, identity: DeviceIdentity) -> Option<&AudioDevice> {
        self.live.iter().find(|d| d.identity == identity)
    }
}

// ---------------------------------------------------------------------------
// DeviceRegistry
// ---------------------------------------------------------------------------

struct DeviceInner {
    executor: Executor,
    ops: SerialQueue,
    events: EventRegistry,
    capture: Arc<dyn CaptureBackend>,
    state: Mutex<DeviceState>,
}

impl DeviceInner {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce_vanished(&self, vanished: Vanished) {
        let Vanished { device, cleared } = vanished;
        tracing::info!(device = %device.name, native_id = %device.native_id, "audio device removed");
        self.events.dispatch(&AudioDeviceRemoved { device });
        for direction in cleared {
            tracing::info!(?direction, "current audio device cleared");
            self.events.dispatch(&AudioDeviceChanged {
                device: None,
                direction,
            });
        }
    }

    fn announce_cameras(&self, diff: CameraDiff) {
        for device in diff.removed {
            tracing::info!(camera = %device.name, "camera removed");
            self.events.dispatch(&VideoDeviceRemoved { device });
        }
        if diff.current_cleared {
            self.events.dispatch(&VideoDeviceChanged { device: None });
        }
        for device in diff.added {
            tracing::info!(camera = %device.name, "camera added");
            self.events.dispatch(&VideoDeviceAdded { device });
        }
    }

    fn handle_notification(&self, notification: DeviceNotification) {
        match notification {
            DeviceNotification::AudioAdded(native) | DeviceNotification::AudioChanged(native) => {
                let native_id = native.native_id.clone();
                let (device, first_sight) = self.lock().upsert(native);
                if first_sight {
                    tracing::info!(device = %device.name, native_id = %native_id, "audio device added");
                    self.events.dispatch(&AudioDeviceAdded { device });
                } else {
                    tracing::info!(device = %device.name, native_id = %native_id, "audio device changed");
                    let direction = device.direction;
                    self.events.dispatch(&AudioDeviceChanged {
                        device: Some(device),
                        direction,
                    });
                }
            }
            DeviceNotification::AudioRemoved(native_id) => {
                let removed = self.lock().remove(&native_id);
                match removed {
                    Some(vanished) => self.announce_vanished(vanished),
                    None => {
                        tracing::debug!(native_id = %native_id, "removal of unannounced audio device ignored");
                    }
                }
            }
            DeviceNotification::CameraAdded(device) => {
                if self.lock().add_camera(device.clone()) {
                    tracing::info!(camera = %device.name, "camera added");
                    self.events.dispatch(&VideoDeviceAdded { device });
                } else {
                    tracing::debug!(camera = %device.name, "camera refreshed");
                }
            }
            DeviceNotification::CameraRemoved(device) => {
                let removed = self.lock().remove_camera(&device);
                match removed {
                    Some(was_current) => self.announce_cameras(CameraDiff {
                        removed: vec![device],
                        current_cleared: was_current,
                        ..CameraDiff::default()
                    }),
                    None => {
                        tracing::debug!(camera = %device.name, "removal of unannounced camera ignored");
                    }
                }
            }
            DeviceNotification::CameraError(message) => {
                tracing::warn!(%message, "camera error");
                self.events.dispatch(&VideoDeviceError { message });
            }
            DeviceNotification::ScreenShareError(message) => {
                tracing::warn!(%message, "screen share error");
                self.events.dispatch(&ScreenShareError { message });
            }
            DeviceNotification::AudioDeviceTimeout(message) => {
                tracing::warn!(%message, "audio device timed out");
                self.events.dispatch(&AudioDeviceTimeoutFailure {
                    error: HuddleError::audio_device_timeout(message),
                });
            }
        }
    }
}

/// Entry point for backend device notifications. Cheap to clone; may be
/// used from any thread.
#[derive(Clone)]
pub struct DeviceEventSink {
    inner: Weak<DeviceInner>,
}

impl DeviceEventSink {
    pub fn push(&self, notification: DeviceNotification) {
        let Some(inner) = self.inner.upgrade() else {
            tracing::debug!("device registry gone, notification dropped");
            return;
        };
        let executor = inner.executor.clone();
        if !executor.post(move || inner.handle_notification(notification)) {
            tracing::debug!("engine stopped, device notification dropped");
        }
    }
}

#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<DeviceInner>,
}

impl DeviceRegistry {
    pub fn new(executor: Executor, events: EventRegistry, capture: Arc<dyn CaptureBackend>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                ops: SerialQueue::new(executor.clone()),
                executor,
                events,
                capture,
                state: Mutex::new(DeviceState::default()),
            }),
        }
    }

    pub fn event_sink(&self) -> DeviceEventSink {
        DeviceEventSink {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn add_event_handler<E, F>(&self, callback: F) -> AsyncResult<HandlerId>
    where
        E: DeviceEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.inner.events.add_event_handler(callback)
    }

    pub fn remove_event_handler(&self, id: HandlerId) -> AsyncResult<()> {
        self.inner.events.remove_event_handler(id)
    }

    // -- Enumeration ----------------------------------------------------

    pub fn get_audio_devices(&self) -> AsyncResult<Vec<AudioDevice>> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let natives = inner.capture.audio_devices().await?;
            let diff = inner.lock().reconcile(natives);
            for vanished in diff.vanished {
                inner.announce_vanished(vanished);
            }
            for device in diff.added {
                tracing::info!(device = %device.name, native_id = %device.native_id, "audio device added");
                inner.events.dispatch(&AudioDeviceAdded { device });
            }
            Ok(diff.devices)
        })
    }

    pub fn get_video_devices(&self) -> AsyncResult<Vec<CameraDevice>> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let cameras = inner.capture.video_devices().await?;
            let diff = inner.lock().reconcile_cameras(cameras.clone());
            inner.announce_cameras(diff);
            Ok(cameras)
        })
    }

    pub fn get_screen_share_sources(&self) -> AsyncResult<Vec<ScreenShareSource>> {
        let inner = self.inner.clone();
        self.inner
            .ops
            .run(async move { inner.capture.screen_share_sources().await })
    }

    // -- Current selection ----------------------------------------------

    pub fn get_current_audio_input_device(&self) -> AsyncResult<Option<AudioDevice>> {
        let inner = self.inner.clone();
        self.inner
            .executor
            .submit(move || Ok(inner.lock().current_input.clone()))
    }

    pub fn get_current_audio_output_device(&self) -> AsyncResult<Option<AudioDevice>> {
        let inner = self.inner.clone();
        self.inner
            .executor
            .submit(move || Ok(inner.lock().current_output.clone()))
    }

    pub fn get_current_video_device(&self) -> AsyncResult<Option<CameraDevice>> {
        let inner = self.inner.clone();
        self.inner
            .executor
            .submit(move || Ok(inner.lock().current_camera.clone()))
    }

    pub fn get_current_screen_share_source(&self) -> AsyncResult<Option<ScreenShareSource>> {
        let inner = self.inner.clone();
        self.inner
            .executor
            .submit(move || Ok(inner.lock().current_screen_source.clone()))
    }

    pub fn set_preferred_input_audio_device(&self, device: AudioDevice) -> AsyncResult<()> {
        self.set_preferred(device, DeviceDirection::Input)
    }

    pub fn set_preferred_output_audio_device(&self, device: AudioDevice) -> AsyncResult<()> {
        self.set_preferred(device, DeviceDirection::Output)
    }

    fn set_preferred(&self, device: AudioDevice, direction: DeviceDirection) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let native_id = {
                let state = inner.lock();
                let live = state.live_device(device.identity).ok_or_else(|| {
                    HuddleError::NotFound(format!("audio device {}", device.identity))
                })?;
                let capable = match direction {
                    DeviceDirection::Input => live.direction.has_input(),
                    _ => live.direction.has_output(),
                };
                if !capable {
                    return Err(HuddleError::NotFound(format!(
                        "audio device {} has no {direction:?} endpoint",
                        live.name
                    )));
                }
                live.native_id.clone()
            };

            inner
                .capture
                .select_audio_device(native_id, direction)
                .await?;

            let selected = {
                let mut state = inner.lock();
                let selected = state.live_device(device.identity).cloned().ok_or_else(|| {
                    HuddleError::NotFound(format!("audio device {} vanished", device.identity))
                })?;
                match direction {
                    DeviceDirection::Input => state.current_input = Some(selected.clone()),
                    _ => state.current_output = Some(selected.clone()),
                }
                selected
            };
            tracing::info!(device = %selected.name, ?direction, "preferred audio device set");
            inner.events.dispatch(&AudioDeviceChanged {
                device: Some(selected),
                direction,
            });
            Ok(())
        })
    }

    // -- Volume ---------------------------------------------------------

    pub fn set_input_volume(&self, volume: LinearVolume) -> AsyncResult<()> {
        self.set_volume(DeviceDirection::Input, volume)
    }

    pub fn set_output_volume(&self, volume: LinearVolume) -> AsyncResult<()> {
        self.set_volume(DeviceDirection::Output, volume)
    }

    fn set_volume(&self, direction: DeviceDirection, volume: LinearVolume) -> AsyncResult<()> {
        if let Err(e) = volume.validate() {
            return self.inner.executor.failed(e);
        }
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            inner.capture.set_volume(direction, volume).await?;
            {
                let mut state = inner.lock();
                match direction {
                    DeviceDirection::Input => state.input_volume = Some(volume),
                    _ => state.output_volume = Some(volume),
                }
            }
            inner
                .events
                .dispatch(&AudioVolumeChanged { direction, volume });
            Ok(())
        })
    }

    pub fn input_volume(&self) -> Option<LinearVolume> {
        self.inner.lock().input_volume
    }

    pub fn output_volume(&self) -> Option<LinearVolume> {
        self.inner.lock().output_volume
    }

    // -- Default device policy ------------------------------------------

    /// Choose which system default the platform follows. Backends without
    /// such a notion reject it with [`HuddleError::Unsupported`].
    pub fn set_default_audio_device_policy(
        &self,
        policy: DefaultAudioDevicePolicy,
    ) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            inner.capture.set_default_audio_device_policy(policy).await?;
            inner.lock().policy = policy;
            tracing::info!(?policy, "default audio device policy set");
            Ok(())
        })
    }

    pub fn default_audio_device_policy(&self) -> DefaultAudioDevicePolicy {
        self.inner.lock().policy
    }

    // -- Used by the video and conference services ----------------------

    pub(crate) fn first_camera(&self) -> Option<CameraDevice> {
        self.inner.lock().cameras.first().cloned()
    }

    pub(crate) fn set_current_camera(&self, camera: Option<CameraDevice>) {
        self.inner.lock().current_camera = camera;
    }

    pub(crate) fn set_current_screen_source(&self, source: Option<ScreenShareSource>) {
        self.inner.lock().current_screen_source = source;
    }
}
