//! Conference records, options and the status graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::HuddleError;
use crate::participants::{ParticipantDetails, ParticipantInfo};

/// Upper bound for `max_video_forwarding`.
pub const MAX_VIDEO_FORWARDING: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConferenceStatus {
    Creating,
    Created,
    Joining,
    Joined,
    Leaving,
    Left,
    Destroyed,
    Error,
}

impl ConferenceStatus {
    pub fn is_ended(self) -> bool {
        matches!(self, Self::Left | Self::Error | Self::Destroyed)
    }

    /// Whether `next` is an edge of the status graph.
    ///
    /// The happy path is creating, created, joining, joined, leaving, left.
    /// `destroyed` and `error` are reachable from any non-terminal status.
    pub fn can_transition_to(self, next: ConferenceStatus) -> bool {
        use ConferenceStatus::*;
        if self.is_ended() {
            return false;
        }
        matches!(
            (self, next),
            (Creating, Created)
                | (Created, Joining)
                | (Joining, Joined)
                | (Joined, Leaving)
                | (Leaving, Left)
                | (_, Destroyed)
                | (_, Error)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConferenceAccessPermission {
    Invite,
    Kick,
    UpdatePermissions,
    Join,
    SendAudio,
    SendVideo,
    ShareScreen,
    ShareVideo,
    ShareFile,
    SendMessage,
    Record,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialAudioStyle {
    Disabled,
    /// Each participant places the others in their own scene.
    #[default]
    Individual,
    /// One scene shared by everyone; a participant only places itself.
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    #[default]
    H264,
    Vp8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtcpMode {
    #[default]
    Average,
    Worst,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingFormat {
    Mp4,
    Mp3,
}

/// How the server picks the participants whose video is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoForwardingStrategy {
    /// The loudest participants.
    #[default]
    LastSpeaker,
    /// The participants closest in the spatial scene. Needs spatial audio.
    ClosestUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenType {
    #[default]
    Regular,
    /// Receive a single mixed stream instead of individual tracks.
    Mixed,
}

/// A conference as known to this client.
#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceInfo {
    pub id: String,
    pub alias: Option<String>,
    pub is_new: bool,
    pub status: ConferenceStatus,
    pub permissions: BTreeSet<ConferenceAccessPermission>,
    pub participants: BTreeMap<String, ParticipantInfo>,
    pub spatial_audio_style: Option<SpatialAudioStyle>,
    pub video_codec: VideoCodec,
    pub audio_only: bool,
    pub dolby_voice: bool,
    pub recording_formats: Vec<RecordingFormat>,
    pub rtcp_mode: RtcpMode,
    pub live_recording: bool,
}

impl ConferenceInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: None,
            is_new: false,
            status: ConferenceStatus::Created,
            permissions: BTreeSet::new(),
            participants: BTreeMap::new(),
            spatial_audio_style: None,
            video_codec: VideoCodec::default(),
            audio_only: false,
            dolby_voice: false,
            recording_formats: Vec::new(),
            rtcp_mode: RtcpMode::default(),
            live_recording: false,
        }
    }

    /// Placeholder used while the backend has not assigned an id yet.
    pub(crate) fn pending(options: &ConferenceOptions) -> Self {
        let mut info = Self::new(String::new());
        info.alias = options.alias.clone();
        info.status = ConferenceStatus::Creating;
        info.apply_options(options);
        info
    }

    /// The record of a conference the backend just created from `options`.
    /// Identity, permissions and participants come from the backend; the
    /// media settings stay as requested.
    pub(crate) fn created(options: &ConferenceOptions, backend: ConferenceInfo) -> Self {
        let mut info = Self::pending(options);
        info.id = backend.id;
        info.alias = backend.alias.or(info.alias);
        info.is_new = backend.is_new;
        info.permissions = backend.permissions;
        info.participants = backend.participants;
        info.recording_formats = backend.recording_formats;
        info.status = ConferenceStatus::Created;
        info
    }

    pub(crate) fn apply_options(&mut self, options: &ConferenceOptions) {
        self.spatial_audio_style = Some(options.spatial_audio_style);
        self.video_codec = options.video_codec;
        self.audio_only = options.audio_only;
        self.dolby_voice = options.dolby_voice;
        self.rtcp_mode = options.rtcp_mode;
        self.live_recording = options.live_recording;
    }

    pub fn is_ended(&self) -> bool {
        self.status.is_ended()
    }

    /// The style in effect, `Individual` when the backend did not say.
    pub fn effective_spatial_style(&self) -> SpatialAudioStyle {
        self.spatial_audio_style.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceOptions {
    pub alias: Option<String>,
    pub spatial_audio_style: SpatialAudioStyle,
    pub video_codec: VideoCodec,
    pub audio_only: bool,
    pub dolby_voice: bool,
    pub live_recording: bool,
    pub rtcp_mode: RtcpMode,
}

impl Default for ConferenceOptions {
    fn default() -> Self {
        Self {
            alias: None,
            spatial_audio_style: SpatialAudioStyle::default(),
            video_codec: VideoCodec::default(),
            audio_only: false,
            dolby_voice: true,
            live_recording: false,
            rtcp_mode: RtcpMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    pub constraints: MediaConstraints,
    pub max_video_forwarding: Option<u32>,
    pub forwarding_strategy: Option<VideoForwardingStrategy>,
    pub spatial_audio: bool,
    pub simulcast: bool,
    pub conference_access_token: Option<String>,
    pub participant: ParticipantDetails,
}

impl JoinOptions {
    pub fn validate(&self) -> Result<(), HuddleError> {
        validate_forwarding(
            self.max_video_forwarding,
            self.forwarding_strategy,
            self.spatial_audio,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenOptions {
    pub max_video_forwarding: Option<u32>,
    pub forwarding_strategy: Option<VideoForwardingStrategy>,
    pub spatial_audio: bool,
    pub listen_type: ListenType,
    pub conference_access_token: Option<String>,
    pub participant: ParticipantDetails,
}

impl ListenOptions {
    pub fn validate(&self) -> Result<(), HuddleError> {
        validate_forwarding(
            self.max_video_forwarding,
            self.forwarding_strategy,
            self.spatial_audio,
        )
    }
}

fn validate_forwarding(
    max: Option<u32>,
    strategy: Option<VideoForwardingStrategy>,
    spatial_audio: bool,
) -> Result<(), HuddleError> {
    if let Some(n) = max.filter(|n| *n > MAX_VIDEO_FORWARDING) {
        return Err(HuddleError::InvalidArgument(format!(
            "max_video_forwarding must be at most {MAX_VIDEO_FORWARDING}, got {n}"
        )));
    }
    if strategy == Some(VideoForwardingStrategy::ClosestUser) && !spatial_audio {
        return Err(HuddleError::InvalidArgument(
            "closest_user forwarding requires spatial audio".into(),
        ));
    }
    Ok(())
}
