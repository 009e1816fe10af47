use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Display information supplied by the application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantDetails {
    pub name: Option<String>,
    pub external_id: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    #[default]
    User,
    Listener,
    Mixer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    #[default]
    Reserved,
    Inactive,
    Declined,
    Connecting,
    OnAir,
    Left,
    Kicked,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantInfo {
    pub id: String,
    pub details: ParticipantDetails,
    pub is_local: bool,
    pub participant_type: ParticipantType,
    pub status: ParticipantStatus,
    pub is_sending_audio: bool,
    pub audible_locally: bool,
    pub is_muted: bool,
    pub audio_track_id: Option<String>,
    /// Sdp track ids of the participant's video tracks.
    pub video_track_ids: Vec<String>,
}

impl ParticipantInfo {
    pub fn new(id: impl Into<String>, is_local: bool) -> Self {
        Self {
            id: id.into(),
            details: ParticipantDetails::default(),
            is_local,
            participant_type: ParticipantType::User,
            status: ParticipantStatus::Reserved,
            is_sending_audio: false,
            audible_locally: true,
            is_muted: false,
            audio_track_id: None,
            video_track_ids: Vec::new(),
        }
    }

    /// Carry track associations over from the record being replaced.
    fn inherit_tracks(&mut self, previous: &ParticipantInfo) {
        if self.audio_track_id.is_none() {
            self.audio_track_id = previous.audio_track_id.clone();
        }
        if self.video_track_ids.is_empty() {
            self.video_track_ids = previous.video_track_ids.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioTrack {
    pub participant_id: String,
    pub stream_id: String,
    pub track_id: String,
    pub is_remote: bool,
}

/// Video track. Two records are the same track when their sdp track ids
/// match.
#[derive(Debug, Clone)]
pub struct VideoTrack {
    pub participant_id: String,
    pub stream_id: String,
    pub track_id: String,
    pub sdp_track_id: String,
    pub is_remote: bool,
    pub is_screen_share: bool,
}

impl PartialEq for VideoTrack {
    fn eq(&self, other: &Self) -> bool {
        self.sdp_track_id == other.sdp_track_id
    }
}

impl Eq for VideoTrack {}

impl Hash for VideoTrack {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sdp_track_id.hash(state);
    }
}

/// Participants and tracks of the active conference.
///
/// Mutated on the engine thread before the matching event is dispatched;
/// readers may take a copy from any thread.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    local: Option<ParticipantInfo>,
    remote: Vec<ParticipantInfo>,
    active_speakers: Vec<String>,
    audio_tracks: Vec<AudioTrack>,
    video_tracks: Vec<VideoTrack>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_local(&mut self, mut info: ParticipantInfo) {
        info.is_local = true;
        if let Some(previous) = &self.local {
            info.inherit_tracks(previous);
        }
        self.local = Some(info);
    }

    pub fn local(&self) -> Option<&ParticipantInfo> {
        self.local.as_ref()
    }

    pub fn local_mut(&mut self) -> Option<&mut ParticipantInfo> {
        self.local.as_mut()
    }

    /// Insert or replace a remote participant. Returns `true` when new.
    pub fn upsert_remote(&mut self, mut info: ParticipantInfo) -> bool {
        info.is_local = false;
        match self.remote.iter().position(|p| p.id == info.id) {
            Some(index) => {
                info.inherit_tracks(&self.remote[index]);
                self.remote[index] = info;
                false
            }
            None => {
                self.remote.push(info);
                true
            }
        }
    }

    pub fn participant(&self, id: &str) -> Option<&ParticipantInfo> {
        self.local
            .iter()
            .chain(self.remote.iter())
            .find(|p| p.id == id)
    }

    pub fn remote_mut(&mut self, id: &str) -> Option<&mut ParticipantInfo> {
        self.remote.iter_mut().find(|p| p.id == id)
    }

    /// Local participant first, then remotes in arrival order.
    pub fn participants(&self) -> Vec<ParticipantInfo> {
        self.local
            .iter()
            .chain(self.remote.iter())
            .cloned()
            .collect()
    }

    pub fn participant_count(&self) -> usize {
        self.remote.len() + usize::from(self.local.is_some())
    }

    pub fn set_active_speakers(&mut self, ids: Vec<String>) {
        self.active_speakers = ids;
    }

    pub fn active_speakers(&self) -> &[String] {
        &self.active_speakers
    }

    fn owner_mut(&mut self, participant_id: &str) -> Option<&mut ParticipantInfo> {
        self.local
            .iter_mut()
            .chain(self.remote.iter_mut())
            .find(|p| p.id == participant_id)
    }

    pub fn add_audio_track(&mut self, track: AudioTrack) {
        if let Some(owner) = self.owner_mut(&track.participant_id) {
            owner.audio_track_id = Some(track.track_id.clone());
        }
        self.audio_tracks.retain(|t| t.track_id != track.track_id);
        self.audio_tracks.push(track);
    }

    pub fn remove_audio_track(&mut self, track: &AudioTrack) {
        if let Some(owner) = self.owner_mut(&track.participant_id) {
            if owner.audio_track_id.as_deref() == Some(track.track_id.as_str()) {
                owner.audio_track_id = None;
            }
        }
        self.audio_tracks.retain(|t| t.track_id != track.track_id);
    }

    pub fn add_video_track(&mut self, track: VideoTrack) {
        if let Some(owner) = self.owner_mut(&track.participant_id) {
            if !owner.video_track_ids.contains(&track.sdp_track_id) {
                owner.video_track_ids.push(track.sdp_track_id.clone());
            }
        }
        self.video_tracks.retain(|t| t != &track);
        self.video_tracks.push(track);
    }

    pub fn remove_video_track(&mut self, track: &VideoTrack) {
        if let Some(owner) = self.owner_mut(&track.participant_id) {
            owner.video_track_ids.retain(|id| id != &track.sdp_track_id);
        }
        self.video_tracks.retain(|t| t != track);
    }

    pub fn audio_tracks(&self) -> &[AudioTrack] {
        &self.audio_tracks
    }

    pub fn video_tracks(&self) -> &[VideoTrack] {
        &self.video_tracks
    }

    pub fn has_remote_video_track(&self, track: &VideoTrack) -> bool {
        self.video_tracks.iter().any(|t| t.is_remote && t == track)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
