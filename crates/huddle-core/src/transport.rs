//! Signaling/media backend contract.
//!
//! The conference, video and media IO services drive the backend through
//! [`SignalingTransport`]. Server pushes come back as [`SignalingEvent`]s
//! through a [`SignalingEventSink`](crate::session::SignalingEventSink).

use std::sync::Arc;

use futures_util::future::BoxFuture;
use huddle_media::{AudioSink, AudioSource, EncodedVideoSink, VideoSink};

use crate::conference::{
    ConferenceInfo, ConferenceOptions, ConferenceStatus, JoinOptions, ListenOptions,
    SpatialAudioStyle,
};
use crate::errors::HuddleError;
use crate::events::AudioLevel;
use crate::participants::{AudioTrack, ParticipantDetails, ParticipantInfo, VideoTrack};
use crate::screen_share::ScreenShareContentInfo;
use crate::spatial::SpatialAudioBatch;

/// Future returned by backend collaborators.
pub type BackendFuture<T> = BoxFuture<'static, Result<T, HuddleError>>;

/// Result of a successful join or listen.
#[derive(Debug, Clone)]
pub struct JoinedConference {
    pub conference: ConferenceInfo,
    pub local_participant: ParticipantInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    StatusUpdated {
        conference_id: String,
        status: ConferenceStatus,
    },
    ParticipantAdded(ParticipantInfo),
    /// Local or remote, per `ParticipantInfo::is_local`.
    ParticipantUpdated(ParticipantInfo),
    ActiveSpeakerChanged(Vec<String>),
    VideoForwardedChanged(Vec<String>),
    AudioTrackAdded(AudioTrack),
    AudioTrackRemoved(AudioTrack),
    VideoTrackAdded(VideoTrack),
    VideoTrackRemoved(VideoTrack),
    MessageReceived {
        participant_id: String,
        message: String,
    },
    InvitationReceived {
        conference_id: String,
        conference_alias: Option<String>,
        sender: ParticipantDetails,
    },
    AudioLevels(Vec<(String, AudioLevel)>),
    RecordingStatus {
        conference_id: String,
        participant_id: Option<String>,
        recording: bool,
    },
    DvcError(String),
    PeerConnectionFailed(String),
}

pub trait SignalingTransport: Send + Sync {
    fn create_conference(&self, options: ConferenceOptions) -> BackendFuture<ConferenceInfo>;
    fn create_demo(&self, style: SpatialAudioStyle) -> BackendFuture<ConferenceInfo>;
    fn join_conference(
        &self,
        conference: ConferenceInfo,
        options: JoinOptions,
    ) -> BackendFuture<JoinedConference>;
    fn listen_conference(
        &self,
        conference: ConferenceInfo,
        options: ListenOptions,
    ) -> BackendFuture<JoinedConference>;
    fn leave_conference(&self, conference_id: String) -> BackendFuture<()>;

    fn send_message(
        &self,
        conference_id: String,
        message: String,
        participant_ids: Vec<String>,
    ) -> BackendFuture<()>;
    fn set_mute(&self, muted: bool) -> BackendFuture<()>;
    fn set_remote_mute(&self, participant_id: String, muted: bool) -> BackendFuture<()>;
    fn set_output_mute(&self, muted: bool) -> BackendFuture<()>;
    fn update_spatial(&self, batch: SpatialAudioBatch) -> BackendFuture<()>;

    fn decline_invitation(&self, conference_id: String) -> BackendFuture<()>;
    fn start_recording(&self, conference_id: String) -> BackendFuture<()>;
    fn stop_recording(&self, conference_id: String) -> BackendFuture<()>;

    /// Acquire the sink that publishes local video (camera or screen share)
    /// to the conference.
    fn local_video_input(&self, screen_share: bool) -> BackendFuture<Arc<dyn VideoSink>>;
    fn release_local_video(&self, screen_share: bool) -> BackendFuture<()>;
    fn set_screen_share_content(&self, info: ScreenShareContentInfo) -> BackendFuture<()>;

    fn set_remote_video_sink(
        &self,
        track: VideoTrack,
        sink: Option<Arc<dyn VideoSink>>,
    ) -> BackendFuture<()>;
    fn set_audio_sink(&self, sink: Option<Arc<dyn AudioSink>>) -> BackendFuture<()>;
    fn set_encoded_video_sink(&self, sink: Option<Arc<dyn EncodedVideoSink>>) -> BackendFuture<()>;
    fn set_audio_source(&self, source: Option<Arc<dyn AudioSource>>) -> BackendFuture<()>;
}
