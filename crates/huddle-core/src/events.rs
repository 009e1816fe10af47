//! Event records dispatched to application handlers.
//!
//! Each service only accepts handlers for its own events: conference events
//! implement [`ConferenceEvent`], device events implement [`DeviceEvent`].

use chrono::{DateTime, Utc};

use crate::conference::ConferenceStatus;
use crate::devices::{AudioDevice, CameraDevice, DeviceDirection, LinearVolume};
use crate::dispatch::Event;
use crate::errors::HuddleError;
use crate::participants::{AudioTrack, ParticipantDetails, ParticipantInfo, VideoTrack};

pub trait ConferenceEvent: Event {}

pub trait DeviceEvent: Event {}

macro_rules! conference_events {
    ($($name:ident),* $(,)?) => {
        $(
            impl Event for $name {}
            impl ConferenceEvent for $name {}
        )*
    };
}

macro_rules! device_events {
    ($($name:ident),* $(,)?) => {
        $(
            impl Event for $name {}
            impl DeviceEvent for $name {}
        )*
    };
}

// ---------------------------------------------------------------------------
// Conference
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceStatusUpdated {
    /// Empty while the backend has not assigned an id yet.
    pub conference_id: String,
    pub status: ConferenceStatus,
}

impl ConferenceStatusUpdated {
    pub fn is_ended(&self) -> bool {
        self.status.is_ended()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteParticipantAdded {
    pub participant: ParticipantInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteParticipantUpdated {
    pub participant: ParticipantInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalParticipantUpdated {
    pub participant: ParticipantInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSpeakerChanged {
    pub participant_ids: Vec<String>,
}

/// The set of participants whose video the server forwards changed.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoForwardedChanged {
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVideoTrackAdded {
    pub track: VideoTrack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVideoTrackRemoved {
    pub track: VideoTrack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVideoTrackAdded {
    pub track: VideoTrack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVideoTrackRemoved {
    pub track: VideoTrack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrackAdded {
    pub track: AudioTrack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrackRemoved {
    pub track: AudioTrack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceMessageReceived {
    pub participant_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceInvitationReceived {
    pub conference_id: String,
    pub conference_alias: Option<String>,
    pub sender: ParticipantDetails,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioLevel {
    pub level: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioLevels {
    /// Participant id and level in `[0, 1]`.
    pub levels: Vec<(String, AudioLevel)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingStatusUpdated {
    pub conference_id: String,
    pub participant_id: Option<String>,
    pub recording: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DvcError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerConnectionFailed {
    pub message: String,
}

// Legacy forms, dispatched next to their canonical events.

/// Dispatched with [`RemoteParticipantAdded`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantAdded {
    pub participant: ParticipantInfo,
}

/// Dispatched with [`RemoteParticipantUpdated`] and [`LocalParticipantUpdated`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantUpdated {
    pub participant: ParticipantInfo,
}

/// Dispatched with [`LocalVideoTrackAdded`] and [`RemoteVideoTrackAdded`].
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrackAdded {
    pub track: VideoTrack,
}

/// Dispatched with [`LocalVideoTrackRemoved`] and [`RemoteVideoTrackRemoved`].
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrackRemoved {
    pub track: VideoTrack,
}

conference_events!(
    ConferenceStatusUpdated,
    RemoteParticipantAdded,
    RemoteParticipantUpdated,
    LocalParticipantUpdated,
    ActiveSpeakerChanged,
    VideoForwardedChanged,
    LocalVideoTrackAdded,
    LocalVideoTrackRemoved,
    RemoteVideoTrackAdded,
    RemoteVideoTrackRemoved,
    AudioTrackAdded,
    AudioTrackRemoved,
    ConferenceMessageReceived,
    ConferenceInvitationReceived,
    AudioLevels,
    RecordingStatusUpdated,
    DvcError,
    PeerConnectionFailed,
    ParticipantAdded,
    ParticipantUpdated,
    VideoTrackAdded,
    VideoTrackRemoved,
);

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AudioDeviceAdded {
    pub device: AudioDevice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioDeviceRemoved {
    pub device: AudioDevice,
}

/// A device was replaced by the platform or became the current selection
/// for `direction`. `None` means the selection was cleared because its
/// device went away.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDeviceChanged {
    pub device: Option<AudioDevice>,
    pub direction: DeviceDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoDeviceAdded {
    pub device: CameraDevice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoDeviceRemoved {
    pub device: CameraDevice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoDeviceChanged {
    pub device: Option<CameraDevice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoDeviceError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenShareError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioDeviceTimeoutFailure {
    pub error: HuddleError,
}

impl AudioDeviceTimeoutFailure {
    pub fn recovery_hint(&self) -> Option<&str> {
        self.error.recovery_hint()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioVolumeChanged {
    pub direction: DeviceDirection,
    pub volume: LinearVolume,
}

device_events!(
    AudioDeviceAdded,
    AudioDeviceRemoved,
    AudioDeviceChanged,
    VideoDeviceAdded,
    VideoDeviceRemoved,
    VideoDeviceChanged,
    VideoDeviceError,
    ScreenShareError,
    AudioDeviceTimeoutFailure,
    AudioVolumeChanged,
);
