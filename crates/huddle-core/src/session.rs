//! Conference lifecycle service.
//!
//! Every operation runs on the engine: validate against the current state,
//! transition and dispatch, await the backend, then re-check that the
//! conference has not ended in the meantime. Server pushes enter through
//! [`SignalingEventSink`] and are applied on the engine as well.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use huddle_media::VideoFrameHandler;

use crate::async_result::AsyncResult;
use crate::capture::CaptureBackend;
use crate::conference::{
    ConferenceInfo, ConferenceOptions, ConferenceStatus, JoinOptions, ListenOptions,
    SpatialAudioStyle,
};
use crate::devices::DeviceRegistry;
use crate::dispatch::{EventRegistry, HandlerId};
use crate::engine::{Executor, SerialQueue};
use crate::errors::HuddleError;
use crate::events::{
    ActiveSpeakerChanged, AudioLevels, AudioTrackAdded, AudioTrackRemoved, ConferenceEvent,
    ConferenceInvitationReceived, ConferenceMessageReceived, ConferenceStatusUpdated, DvcError,
    LocalParticipantUpdated, LocalVideoTrackAdded, LocalVideoTrackRemoved, ParticipantAdded,
    ParticipantUpdated, PeerConnectionFailed, RecordingStatusUpdated, RemoteParticipantAdded,
    RemoteParticipantUpdated, RemoteVideoTrackAdded, RemoteVideoTrackRemoved,
    VideoForwardedChanged, VideoTrackAdded, VideoTrackRemoved,
};
use crate::participants::{ParticipantInfo, ParticipantType, Roster, VideoTrack};
use crate::screen_share::{ActiveScreenShare, ScreenShareContentInfo, ScreenShareSource};
use crate::spatial::{SpatialAudioBatch, SpatialDirection, SpatialEnvironment, SpatialPosition};
use crate::transport::{JoinedConference, SignalingEvent, SignalingTransport};
use crate::video::LocalPipeline;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConferenceState {
    current: Option<ConferenceInfo>,
    /// Bumped whenever a new conference begins, so a pending operation can
    /// tell that its conference was replaced.
    generation: u64,
    roster: Roster,
    listener: bool,
    spatial_audio: bool,
    muted: bool,
    output_muted: bool,
    screen_share: Option<ActiveScreenShare>,
    recording_started_at: Option<DateTime<Utc>>,
}

fn status_event(info: &ConferenceInfo) -> ConferenceStatusUpdated {
    ConferenceStatusUpdated {
        conference_id: info.id.clone(),
        status: info.status,
    }
}

impl ConferenceState {
    fn active(&self) -> Option<&ConferenceInfo> {
        self.current.as_ref().filter(|c| !c.is_ended())
    }

    fn ensure_idle(&self) -> Result<(), HuddleError> {
        match self.active() {
            Some(c) => Err(HuddleError::InvalidState(format!(
                "conference {} is still {:?}",
                c.id, c.status
            ))),
            None => Ok(()),
        }
    }

    fn joined(&self) -> Result<&ConferenceInfo, HuddleError> {
        match &self.current {
            Some(c) if c.status == ConferenceStatus::Joined => Ok(c),
            _ => Err(HuddleError::InvalidState("no joined conference".into())),
        }
    }

    fn begin(&mut self, info: ConferenceInfo) -> u64 {
        let generation = self.generation + 1;
        *self = Self {
            current: Some(info),
            generation,
            ..Self::default()
        };
        generation
    }

    /// The status of the conference started by `generation`, or
    /// `InvalidState` if it has ended or been replaced.
    fn pending_status(&self, generation: u64) -> Result<ConferenceStatus, HuddleError> {
        match &self.current {
            Some(c) if self.generation == generation && !c.is_ended() => Ok(c.status),
            _ => Err(HuddleError::InvalidState(
                "conference ended while the operation was pending".into(),
            )),
        }
    }

    /// Move the conference of `generation` to `next` if the graph allows it.
    fn advance(
        &mut self,
        generation: u64,
        next: ConferenceStatus,
    ) -> Result<(ConferenceStatusUpdated, Option<ActiveScreenShare>), HuddleError> {
        let status = self.pending_status(generation)?;
        if !status.can_transition_to(next) {
            return Err(HuddleError::InvalidState(format!(
                "cannot move from {status:?} to {next:?}"
            )));
        }
        let Some(current) = self.current.as_mut() else {
            return Err(HuddleError::InvalidState("no conference".into()));
        };
        current.status = next;
        let event = status_event(current);
        let released = if next.is_ended() { self.end() } else { None };
        Ok((event, released))
    }

    /// Local cleanup once the conference reached a terminal status.
    fn end(&mut self) -> Option<ActiveScreenShare> {
        self.recording_started_at = None;
        self.roster.clear();
        self.screen_share.take()
    }

    fn start_join(
        &mut self,
        conference: &ConferenceInfo,
        listener: bool,
        spatial_audio: bool,
    ) -> Result<(u64, ConferenceInfo), HuddleError> {
        let resumes_created = matches!(
            self.current.as_ref(),
            Some(c) if c.status == ConferenceStatus::Created && c.id == conference.id
        );
        let generation = if resumes_created {
            self.generation
        } else {
            self.ensure_idle()?;
            let mut info = conference.clone();
            info.status = ConferenceStatus::Created;
            self.begin(info)
        };
        self.listener = listener;
        self.spatial_audio = spatial_audio;

        let Some(current) = self.current.as_mut() else {
            return Err(HuddleError::InvalidState("no conference".into()));
        };
        current.status = ConferenceStatus::Joining;
        Ok((generation, current.clone()))
    }

    /// Returns the joined conference and whether its status still needs to
    /// be announced (a push may already have moved it to joined).
    fn complete_join(
        &mut self,
        generation: u64,
        joined: JoinedConference,
    ) -> Result<(ConferenceInfo, ParticipantInfo, bool), HuddleError> {
        let status = self.pending_status(generation)?;
        if !matches!(status, ConferenceStatus::Joining | ConferenceStatus::Joined) {
            return Err(HuddleError::InvalidState(format!(
                "join completed while conference is {status:?}"
            )));
        }

        let JoinedConference {
            mut conference,
            mut local_participant,
        } = joined;
        if let Some(previous) = &self.current {
            if conference.spatial_audio_style.is_none() {
                conference.spatial_audio_style = previous.spatial_audio_style;
            }
        }
        conference.status = ConferenceStatus::Joined;
        if self.listener {
            local_participant.participant_type = ParticipantType::Listener;
        }

        self.roster.set_local(local_participant);
        let local_id = self.roster.local().map(|p| p.id.clone()).unwrap_or_default();
        for participant in conference.participants.values() {
            if participant.id != local_id {
                self.roster.upsert_remote(participant.clone());
            }
        }
        self.current = Some(conference);

        let info = self.snapshot().ok_or_else(|| HuddleError::InvalidState("no conference".into()))?;
        let local = self
            .roster
            .local()
            .cloned()
            .ok_or_else(|| HuddleError::InvalidState("no local participant".into()))?;
        Ok((info, local, status == ConferenceStatus::Joining))
    }

    /// The current conference with its participants filled from the roster.
    fn snapshot(&self) -> Option<ConferenceInfo> {
        let mut info = self.current.clone()?;
        info.participants = self
            .roster
            .participants()
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        Some(info)
    }

    /// Apply a status pushed by the server. Invalid edges are ignored.
    fn apply_pushed_status(
        &mut self,
        conference_id: &str,
        status: ConferenceStatus,
    ) -> Option<(ConferenceStatusUpdated, Option<ActiveScreenShare>)> {
        let current = self.current.as_ref()?;
        if current.id != conference_id {
            tracing::debug!(conference_id, "status push for another conference ignored");
            return None;
        }
        if current.status == status {
            return None;
        }
        if !current.status.can_transition_to(status) {
            tracing::warn!(
                conference_id,
                from = ?current.status,
                to = ?status,
                "invalid status transition ignored"
            );
            return None;
        }
        self.advance(self.generation, status).ok()
    }
}

// ---------------------------------------------------------------------------
// Service internals
// ---------------------------------------------------------------------------

enum JoinRequest {
    Join(JoinOptions),
    Listen(ListenOptions),
}

struct ConferenceInner {
    executor: Executor,
    ops: SerialQueue,
    events: EventRegistry,
    transport: Arc<dyn SignalingTransport>,
    capture: Arc<dyn CaptureBackend>,
    devices: DeviceRegistry,
    state: Mutex<ConferenceState>,
}

impl ConferenceInner {
    fn lock(&self) -> MutexGuard<'_, ConferenceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(self: &Arc<Self>, event: ConferenceStatusUpdated, released: Option<ActiveScreenShare>) {
        tracing::info!(
            conference_id = %event.conference_id,
            status = ?event.status,
            "conference status changed"
        );
        self.events.dispatch(&event);
        if let Some(share) = released {
            let inner = self.clone();
            self.ops
                .run(async move { inner.release_screen_share(share).await })
                .on_error(|error| tracing::warn!(%error, "releasing screen share failed"));
        }
    }

    /// Move to `next` and publish; a conference that already ended is left
    /// alone.
    fn advance(self: &Arc<Self>, generation: u64, next: ConferenceStatus) {
        let advanced = self.lock().advance(generation, next);
        match advanced {
            Ok((event, released)) => self.publish(event, released),
            Err(error) => tracing::debug!(%error, ?next, "status change skipped"),
        }
    }

    async fn create_flow(
        self: Arc<Self>,
        options: ConferenceOptions,
        demo: bool,
    ) -> Result<ConferenceInfo, HuddleError> {
        let (generation, pending) = {
            let mut state = self.lock();
            state.ensure_idle()?;
            let pending = ConferenceInfo::pending(&options);
            (state.begin(pending.clone()), pending)
        };
        self.publish(status_event(&pending), None);

        let created = if demo {
            self.transport
                .create_demo(options.spatial_audio_style)
                .await
        } else {
            self.transport.create_conference(options.clone()).await
        };
        let info = match created {
            Ok(backend) => ConferenceInfo::created(&options, backend),
            Err(error) => {
                self.advance(generation, ConferenceStatus::Error);
                return Err(error);
            }
        };

        let announce = {
            let mut state = self.lock();
            let status = state.pending_status(generation)?;
            state.current = Some(info.clone());
            status == ConferenceStatus::Creating
        };
        if announce {
            self.publish(status_event(&info), None);
        }
        tracing::info!(conference_id = %info.id, alias = ?info.alias, "conference created");
        Ok(info)
    }

    async fn join_flow(
        self: Arc<Self>,
        conference: ConferenceInfo,
        request: JoinRequest,
    ) -> Result<ConferenceInfo, HuddleError> {
        let (listener, spatial_audio) = match &request {
            JoinRequest::Join(options) => {
                options.validate()?;
                (false, options.spatial_audio)
            }
            JoinRequest::Listen(options) => {
                options.validate()?;
                (true, options.spatial_audio)
            }
        };

        let (generation, joining) =
            self.lock()
                .start_join(&conference, listener, spatial_audio)?;
        self.publish(status_event(&joining), None);

        let joined = match request {
            JoinRequest::Join(options) => {
                self.transport.join_conference(joining, options).await
            }
            JoinRequest::Listen(options) => {
                self.transport.listen_conference(joining, options).await
            }
        };
        let joined = match joined {
            Ok(joined) => joined,
            Err(error) => {
                self.advance(generation, ConferenceStatus::Error);
                return Err(error);
            }
        };

        let (info, local, announce) = self.lock().complete_join(generation, joined)?;
        if announce {
            self.publish(status_event(&info), None);
        }
        tracing::info!(
            conference_id = %info.id,
            participant_id = %local.id,
            listener,
            "conference joined"
        );
        self.events.dispatch(&LocalParticipantUpdated {
            participant: local.clone(),
        });
        self.events.dispatch(&ParticipantUpdated { participant: local });
        Ok(info)
    }

    async fn release_screen_share(&self, share: ActiveScreenShare) -> Result<(), HuddleError> {
        share.pipeline.detach();
        if share.uses_capture() {
            self.capture.stop_screen_capture().await?;
        }
        self.transport.release_local_video(true).await?;
        self.devices.set_current_screen_source(None);
        tracing::info!(source = %share.source.title, "screen share stopped");
        Ok(())
    }

    fn dispatch_participant(&self, participant: ParticipantInfo, is_new: bool) {
        if participant.is_local {
            self.events.dispatch(&LocalParticipantUpdated {
                participant: participant.clone(),
            });
            self.events.dispatch(&ParticipantUpdated { participant });
        } else if is_new {
            self.events.dispatch(&RemoteParticipantAdded {
                participant: participant.clone(),
            });
            self.events.dispatch(&ParticipantAdded { participant });
        } else {
            self.events.dispatch(&RemoteParticipantUpdated {
                participant: participant.clone(),
            });
            self.events.dispatch(&ParticipantUpdated { participant });
        }
    }

    fn handle_signaling(self: &Arc<Self>, event: SignalingEvent) {
        match event {
            SignalingEvent::StatusUpdated {
                conference_id,
                status,
            } => {
                let applied = self.lock().apply_pushed_status(&conference_id, status);
                if let Some((event, released)) = applied {
                    self.publish(event, released);
                }
            }
            SignalingEvent::ParticipantAdded(participant)
            | SignalingEvent::ParticipantUpdated(participant) => {
                let stored = {
                    let mut state = self.lock();
                    if state.active().is_none() {
                        None
                    } else if participant.is_local {
                        let id = participant.id.clone();
                        state.roster.set_local(participant);
                        state.roster.participant(&id).cloned().map(|p| (p, false))
                    } else {
                        let id = participant.id.clone();
                        let is_new = state.roster.upsert_remote(participant);
                        state.roster.participant(&id).cloned().map(|p| (p, is_new))
                    }
                };
                match stored {
                    Some((participant, is_new)) => {
                        tracing::debug!(participant_id = %participant.id, is_new, "participant updated");
                        self.dispatch_participant(participant, is_new);
                    }
                    None => tracing::debug!("participant push without active conference ignored"),
                }
            }
            SignalingEvent::ActiveSpeakerChanged(participant_ids) => {
                if self.with_active(|state| state.roster.set_active_speakers(participant_ids.clone())) {
                    self.events.dispatch(&ActiveSpeakerChanged { participant_ids });
                }
            }
            SignalingEvent::VideoForwardedChanged(participant_ids) => {
                if self.with_active(|_| ()) {
                    self.events.dispatch(&VideoForwardedChanged { participant_ids });
                }
            }
            SignalingEvent::AudioTrackAdded(track) => {
                if self.with_active(|state| state.roster.add_audio_track(track.clone())) {
                    tracing::debug!(track_id = %track.track_id, participant_id = %track.participant_id, "audio track added");
                    self.events.dispatch(&AudioTrackAdded { track });
                }
            }
            SignalingEvent::AudioTrackRemoved(track) => {
                if self.with_active(|state| state.roster.remove_audio_track(&track)) {
                    self.events.dispatch(&AudioTrackRemoved { track });
                }
            }
            SignalingEvent::VideoTrackAdded(track) => {
                if self.with_active(|state| state.roster.add_video_track(track.clone())) {
                    tracing::debug!(track_id = %track.track_id, participant_id = %track.participant_id, "video track added");
                    if track.is_remote {
                        self.events.dispatch(&RemoteVideoTrackAdded {
                            track: track.clone(),
                        });
                    } else {
                        self.events.dispatch(&LocalVideoTrackAdded {
                            track: track.clone(),
                        });
                    }
                    self.events.dispatch(&VideoTrackAdded { track });
                }
            }
            SignalingEvent::VideoTrackRemoved(track) => {
                if self.with_active(|state| state.roster.remove_video_track(&track)) {
                    if track.is_remote {
                        self.events.dispatch(&RemoteVideoTrackRemoved {
                            track: track.clone(),
                        });
                    } else {
                        self.events.dispatch(&LocalVideoTrackRemoved {
                            track: track.clone(),
                        });
                    }
                    self.events.dispatch(&VideoTrackRemoved { track });
                }
            }
            SignalingEvent::MessageReceived {
                participant_id,
                message,
            } => {
                if self.with_active(|_| ()) {
                    self.events.dispatch(&ConferenceMessageReceived {
                        participant_id,
                        message,
                    });
                }
            }
            SignalingEvent::InvitationReceived {
                conference_id,
                conference_alias,
                sender,
            } => {
                tracing::info!(%conference_id, "conference invitation received");
                self.events.dispatch(&ConferenceInvitationReceived {
                    conference_id,
                    conference_alias,
                    sender,
                });
            }
            SignalingEvent::AudioLevels(levels) => {
                if self.with_active(|_| ()) {
                    self.events.dispatch(&AudioLevels { levels });
                }
            }
            SignalingEvent::RecordingStatus {
                conference_id,
                participant_id,
                recording,
            } => {
                tracing::info!(%conference_id, recording, "recording status changed");
                self.events.dispatch(&RecordingStatusUpdated {
                    conference_id,
                    participant_id,
                    recording,
                    timestamp: Utc::now(),
                });
            }
            SignalingEvent::DvcError(message) => {
                tracing::warn!(%message, "dolby voice error");
                self.events.dispatch(&DvcError { message });
            }
            SignalingEvent::PeerConnectionFailed(message) => {
                tracing::warn!(%message, "peer connection failed");
                self.events.dispatch(&PeerConnectionFailed { message });
            }
        }
    }

    /// Run `f` if a conference is active. Returns whether it ran.
    fn with_active(&self, f: impl FnOnce(&mut ConferenceState)) -> bool {
        let mut state = self.lock();
        if state.active().is_none() {
            tracing::debug!("push without active conference ignored");
            return false;
        }
        f(&mut state);
        true
    }
}

/// Entry point for server pushes. Cheap to clone; may be used from any
/// thread.
#[derive(Clone)]
pub struct SignalingEventSink {
    inner: Weak<ConferenceInner>,
}

impl SignalingEventSink {
    pub fn push(&self, event: SignalingEvent) {
        let Some(inner) = self.inner.upgrade() else {
            tracing::debug!("conference service gone, push dropped");
            return;
        };
        let executor = inner.executor.clone();
        if !executor.post(move || inner.handle_signaling(event)) {
            tracing::debug!("engine stopped, push dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// ConferenceService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ConferenceService {
    inner: Arc<ConferenceInner>,
}

impl ConferenceService {
    pub fn new(
        executor: Executor,
        events: EventRegistry,
        transport: Arc<dyn SignalingTransport>,
        capture: Arc<dyn CaptureBackend>,
        devices: DeviceRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(ConferenceInner {
                ops: SerialQueue::new(executor.clone()),
                executor,
                events,
                transport,
                capture,
                devices,
                state: Mutex::new(ConferenceState::default()),
            }),
        }
    }

    pub fn event_sink(&self) -> SignalingEventSink {
        SignalingEventSink {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn add_event_handler<E, F>(&self, callback: F) -> AsyncResult<HandlerId>
    where
        E: ConferenceEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.inner.events.add_event_handler(callback)
    }

    pub fn remove_event_handler(&self, id: HandlerId) -> AsyncResult<()> {
        self.inner.events.remove_event_handler(id)
    }

    // -- Lifecycle ------------------------------------------------------

    pub fn create(&self, options: ConferenceOptions) -> AsyncResult<ConferenceInfo> {
        let inner = self.inner.clone();
        self.inner.ops.run(inner.create_flow(options, false))
    }

    /// Create and join a demo conference with simulated participants.
    pub fn demo(&self, style: SpatialAudioStyle) -> AsyncResult<ConferenceInfo> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let options = ConferenceOptions {
                alias: Some("demo".into()),
                spatial_audio_style: style,
                ..Default::default()
            };
            let created = inner.clone().create_flow(options, true).await?;
            let join = JoinOptions {
                spatial_audio: style != SpatialAudioStyle::Disabled,
                ..Default::default()
            };
            inner.join_flow(created, JoinRequest::Join(join)).await
        })
    }

    pub fn join(&self, conference: ConferenceInfo, options: JoinOptions) -> AsyncResult<ConferenceInfo> {
        let inner = self.inner.clone();
        self.inner
            .ops
            .run(inner.join_flow(conference, JoinRequest::Join(options)))
    }

    /// Join as a listener: receive media, send none.
    pub fn listen(
        &self,
        conference: ConferenceInfo,
        options: ListenOptions,
    ) -> AsyncResult<ConferenceInfo> {
        let inner = self.inner.clone();
        self.inner
            .ops
            .run(inner.join_flow(conference, JoinRequest::Listen(options)))
    }

    /// Leave the joined conference. A conference that was created but
    /// never joined is destroyed locally instead.
    pub fn leave(&self) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let abandoned = {
                let mut state = inner.lock();
                let created = state
                    .active()
                    .is_some_and(|c| c.status == ConferenceStatus::Created);
                if created {
                    let generation = state.generation;
                    Some(state.advance(generation, ConferenceStatus::Destroyed)?)
                } else {
                    None
                }
            };
            if let Some((event, released)) = abandoned {
                tracing::info!(conference_id = %event.conference_id, "unjoined conference dropped");
                inner.publish(event, released);
                return Ok(());
            }

            let (generation, conference_id, leaving) = {
                let mut state = inner.lock();
                let conference_id = state.joined()?.id.clone();
                let generation = state.generation;
                let (event, _) = state.advance(generation, ConferenceStatus::Leaving)?;
                (generation, conference_id, event)
            };
            inner.publish(leaving, None);

            if let Err(error) = inner.transport.leave_conference(conference_id.clone()).await {
                inner.advance(generation, ConferenceStatus::Error);
                return Err(error);
            }
            inner.advance(generation, ConferenceStatus::Left);
            tracing::info!(%conference_id, "conference left");
            Ok(())
        })
    }

    pub fn decline_invitation(&self, conference_id: impl Into<String>) -> AsyncResult<()> {
        let inner = self.inner.clone();
        let conference_id = conference_id.into();
        self.inner
            .ops
            .run(async move { inner.transport.decline_invitation(conference_id).await })
    }

    // -- Queries --------------------------------------------------------

    pub fn get_current_conference(&self) -> AsyncResult<ConferenceInfo> {
        let inner = self.inner.clone();
        self.inner.executor.submit(move || {
            let state = inner.lock();
            match state.active() {
                Some(_) => state
                    .snapshot()
                    .ok_or_else(|| HuddleError::InvalidState("no active conference".into())),
                None => Err(HuddleError::InvalidState("no active conference".into())),
            }
        })
    }

    /// Status of the last conference, if any.
    pub fn status(&self) -> Option<ConferenceStatus> {
        self.inner.lock().current.as_ref().map(|c| c.status)
    }

    pub fn participant(&self, id: &str) -> Option<ParticipantInfo> {
        self.inner.lock().roster.participant(id).cloned()
    }

    pub fn participants(&self) -> Vec<ParticipantInfo> {
        self.inner.lock().roster.participants()
    }

    pub fn active_speakers(&self) -> Vec<String> {
        self.inner.lock().roster.active_speakers().to_vec()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }

    pub fn is_output_muted(&self) -> bool {
        self.inner.lock().output_muted
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.inner.lock().screen_share.is_some()
    }

    pub fn recording_started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().recording_started_at
    }

    pub(crate) fn has_remote_video_track(&self, track: &VideoTrack) -> bool {
        self.inner.lock().roster.has_remote_video_track(track)
    }

    // -- Messaging and audio --------------------------------------------

    /// Send `message` to `participant_ids`, or to everyone when empty.
    pub fn send(&self, message: impl Into<String>, participant_ids: Vec<String>) -> AsyncResult<()> {
        let inner = self.inner.clone();
        let message = message.into();
        self.inner.ops.run(async move {
            let conference_id = inner.lock().joined()?.id.clone();
            inner
                .transport
                .send_message(conference_id, message, participant_ids)
                .await
        })
    }

    pub fn mute(&self, muted: bool) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            {
                let state = inner.lock();
                state.joined()?;
                if state.listener {
                    return Err(HuddleError::Unsupported("listeners cannot send audio".into()));
                }
            }
            inner.transport.set_mute(muted).await?;

            let local = {
                let mut state = inner.lock();
                state.muted = muted;
                state.roster.local_mut().map(|p| {
                    p.is_muted = muted;
                    p.clone()
                })
            };
            tracing::info!(muted, "local audio mute changed");
            if let Some(participant) = local {
                inner.dispatch_participant(participant, false);
            }
            Ok(())
        })
    }

    /// Mute a remote participant for everyone.
    pub fn remote_mute(&self, muted: bool, participant_id: impl Into<String>) -> AsyncResult<()> {
        let inner = self.inner.clone();
        let participant_id = participant_id.into();
        self.inner.ops.run(async move {
            {
                let state = inner.lock();
                if state.active().is_some_and(|c| c.dolby_voice) {
                    return Err(HuddleError::Unsupported(
                        "remote mute is not available in Dolby Voice conferences".into(),
                    ));
                }
                state.joined()?;
                match state.roster.participant(&participant_id) {
                    Some(p) if !p.is_local => {}
                    _ => {
                        return Err(HuddleError::NotFound(format!(
                            "remote participant {participant_id}"
                        )));
                    }
                }
            }
            inner
                .transport
                .set_remote_mute(participant_id.clone(), muted)
                .await?;

            let updated = {
                let mut state = inner.lock();
                state.roster.remote_mut(&participant_id).map(|p| {
                    p.is_muted = muted;
                    p.clone()
                })
            };
            tracing::info!(%participant_id, muted, "remote participant mute changed");
            if let Some(participant) = updated {
                inner.dispatch_participant(participant, false);
            }
            Ok(())
        })
    }

    /// Mute everything this client plays. Dolby Voice conferences only.
    pub fn mute_output(&self, muted: bool) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            if !inner.lock().joined()?.dolby_voice {
                return Err(HuddleError::Unsupported(
                    "output mute requires a Dolby Voice conference".into(),
                ));
            }
            inner.transport.set_output_mute(muted).await?;
            inner.lock().output_muted = muted;
            tracing::info!(muted, "output mute changed");
            Ok(())
        })
    }

    // -- Recording ------------------------------------------------------

    pub fn start_recording(&self) -> AsyncResult<()> {
        self.set_recording(true)
    }

    pub fn stop_recording(&self) -> AsyncResult<()> {
        self.set_recording(false)
    }

    fn set_recording(&self, recording: bool) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let conference_id = inner.lock().joined()?.id.clone();
            if recording {
                inner.transport.start_recording(conference_id.clone()).await?;
            } else {
                inner.transport.stop_recording(conference_id.clone()).await?;
            }

            let timestamp = Utc::now();
            let participant_id = {
                let mut state = inner.lock();
                state.recording_started_at = recording.then_some(timestamp);
                state.roster.local().map(|p| p.id.clone())
            };
            tracing::info!(%conference_id, recording, "recording changed");
            inner.events.dispatch(&RecordingStatusUpdated {
                conference_id,
                participant_id,
                recording,
                timestamp,
            });
            Ok(())
        })
    }

    // -- Spatial audio --------------------------------------------------

    pub fn set_spatial_position(
        &self,
        participant_id: impl Into<String>,
        position: SpatialPosition,
    ) -> AsyncResult<()> {
        let mut batch = SpatialAudioBatch::new();
        batch.set_spatial_position(participant_id, position);
        self.update_spatial_audio_configuration(batch)
    }

    pub fn set_spatial_direction(&self, direction: SpatialDirection) -> AsyncResult<()> {
        let mut batch = SpatialAudioBatch::new();
        batch.set_spatial_direction(direction);
        self.update_spatial_audio_configuration(batch)
    }

    pub fn set_spatial_environment(&self, environment: SpatialEnvironment) -> AsyncResult<()> {
        let mut batch = SpatialAudioBatch::new();
        batch.set_spatial_environment(environment);
        self.update_spatial_audio_configuration(batch)
    }

    /// Apply several spatial changes in one backend call.
    pub fn update_spatial_audio_configuration(&self, batch: SpatialAudioBatch) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            {
                let state = inner.lock();
                let conference = state.joined()?;
                if !state.spatial_audio {
                    return Err(HuddleError::InvalidState(
                        "spatial audio was not enabled when joining".into(),
                    ));
                }
                let local_id = state.roster.local().map(|p| p.id.as_str()).unwrap_or_default();
                batch.validate(conference.effective_spatial_style(), local_id)?;
            }
            inner.transport.update_spatial(batch).await
        })
    }

    // -- Screen share ---------------------------------------------------

    /// Start sharing `source`, or switch the running share to it.
    ///
    /// A switch keeps the published track (and ignores `handler`) when the
    /// capture backend supports it; otherwise it fails with
    /// `ScreenShareRestartRequired` and the running share is unchanged.
    pub fn start_screen_share(
        &self,
        source: ScreenShareSource,
        handler: Option<Arc<dyn VideoFrameHandler>>,
        content: ScreenShareContentInfo,
    ) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let running = {
                let state = inner.lock();
                state.joined()?;
                state
                    .screen_share
                    .as_ref()
                    .map(|s| (s.source.clone(), s.uses_capture()))
            };

            if let Some((current, uses_capture)) = running {
                if current == source {
                    return Ok(());
                }
                if uses_capture {
                    if !inner.capture.can_switch_screen_source(&current, &source) {
                        return Err(HuddleError::ScreenShareRestartRequired);
                    }
                    inner.capture.switch_screen_capture(source.clone()).await?;
                }
                if let Some(share) = inner.lock().screen_share.as_mut() {
                    share.source = source.clone();
                }
                tracing::info!(from = %current.title, to = %source.title, "screen share switched");
                inner.devices.set_current_screen_source(Some(source));
                return Ok(());
            }

            let network = inner.transport.local_video_input(true).await?;
            let pipeline = LocalPipeline::wire(handler.as_ref(), network);
            let started = async {
                inner.transport.set_screen_share_content(content).await?;
                if let Some(sink) = pipeline.capture_sink.clone() {
                    inner.capture.start_screen_capture(source.clone(), sink).await?;
                }
                Ok::<(), HuddleError>(())
            }
            .await;
            let share = ActiveScreenShare {
                source: source.clone(),
                content,
                pipeline,
            };
            if let Err(error) = started {
                share.pipeline.detach();
                if let Err(release) = inner.transport.release_local_video(true).await {
                    tracing::warn!(error = %release, "releasing screen share input failed");
                }
                return Err(error);
            }

            // Operations are serialized, so only a pushed end can get here
            // first. The share being released is the one this call started.
            let rejected = {
                let mut state = inner.lock();
                if state.joined().is_ok() {
                    state.screen_share = Some(share);
                    None
                } else {
                    Some(share)
                }
            };
            if let Some(share) = rejected {
                inner.release_screen_share(share).await?;
                return Err(HuddleError::InvalidState(
                    "conference ended while starting screen share".into(),
                ));
            }

            tracing::info!(source = %source.title, "screen share started");
            inner.devices.set_current_screen_source(Some(source));
            Ok(())
        })
    }

    pub fn stop_screen_share(&self) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            let share = {
                let mut state = inner.lock();
                state.joined()?;
                state
                    .screen_share
                    .take()
                    .ok_or_else(|| HuddleError::InvalidState("no screen share in progress".into()))?
            };
            inner.release_screen_share(share).await
        })
    }

    /// Update the content hint of the running screen share.
    pub fn screen_share_content_info(&self, content: ScreenShareContentInfo) -> AsyncResult<()> {
        let inner = self.inner.clone();
        self.inner.ops.run(async move {
            {
                let state = inner.lock();
                state.joined()?;
                if state.screen_share.is_none() {
                    return Err(HuddleError::InvalidState("no screen share in progress".into()));
                }
            }
            inner.transport.set_screen_share_content(content).await?;
            if let Some(share) = inner.lock().screen_share.as_mut() {
                share.content = content;
            }
            Ok(())
        })
    }
}
