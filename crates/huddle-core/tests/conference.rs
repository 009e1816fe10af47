mod common;

use common::{Harness, LOCAL_ID, Recorder, eventually};
use huddle_core::conference::{
    ConferenceOptions, ConferenceStatus, JoinOptions, ListenOptions, SpatialAudioStyle,
    VideoForwardingStrategy,
};
use huddle_core::events::{
    ActiveSpeakerChanged, ConferenceInvitationReceived, ConferenceStatusUpdated,
    LocalParticipantUpdated, ParticipantAdded, ParticipantUpdated, RecordingStatusUpdated,
    RemoteParticipantAdded, RemoteParticipantUpdated, RemoteVideoTrackAdded, VideoTrackAdded,
};
use huddle_core::participants::{ParticipantDetails, ParticipantInfo, ParticipantType, VideoTrack};
use huddle_core::spatial::{SpatialAudioBatch, SpatialEnvironment, SpatialPosition};
use huddle_core::{ConferenceInfo, HuddleError, SignalingEvent};

fn statuses(recorder: &Recorder<ConferenceStatusUpdated>) -> Vec<ConferenceStatus> {
    recorder.take().into_iter().map(|e| e.status).collect()
}

fn remote_video(participant_id: &str, sdp: &str) -> VideoTrack {
    VideoTrack {
        participant_id: participant_id.into(),
        stream_id: format!("stream-{participant_id}"),
        track_id: format!("track-{sdp}"),
        sdp_track_id: sdp.into(),
        is_remote: true,
        is_screen_share: false,
    }
}

#[test]
fn create_join_leave_walks_the_status_graph() {
    let h = Harness::new();
    let conference = h.sdk.conference();
    let recorder = Recorder::<ConferenceStatusUpdated>::new();
    conference
        .add_event_handler(recorder.callback())
        .wait()
        .unwrap();

    let options = ConferenceOptions {
        alias: Some("standup".into()),
        dolby_voice: true,
        ..Default::default()
    };
    let created = conference.create(options).wait().unwrap();
    assert_eq!(created.status, ConferenceStatus::Created);
    assert!(created.dolby_voice);
    assert_eq!(
        statuses(&recorder),
        vec![ConferenceStatus::Creating, ConferenceStatus::Created]
    );

    let joined = conference.join(created, JoinOptions::default()).wait().unwrap();
    assert_eq!(joined.status, ConferenceStatus::Joined);
    assert!(!joined.is_ended());
    assert_eq!(
        statuses(&recorder),
        vec![ConferenceStatus::Joining, ConferenceStatus::Joined]
    );

    conference.leave().wait().unwrap();
    let events = recorder.take();
    assert_eq!(
        events.iter().map(|e| e.status).collect::<Vec<_>>(),
        vec![ConferenceStatus::Leaving, ConferenceStatus::Left]
    );
    assert!(!events[0].is_ended());
    assert!(events[1].is_ended());
    assert_eq!(conference.status(), Some(ConferenceStatus::Left));
    assert!(matches!(
        conference.get_current_conference().wait(),
        Err(HuddleError::InvalidState(_))
    ));
}

#[test]
fn remote_mute_is_unsupported_with_dolby_voice() {
    let h = Harness::new();
    let conference = h.sdk.conference();
    let created = conference
        .create(ConferenceOptions {
            dolby_voice: true,
            ..Default::default()
        })
        .wait()
        .unwrap();

    assert!(matches!(
        conference.remote_mute(true, "p1").wait(),
        Err(HuddleError::Unsupported(_))
    ));

    conference.join(created, JoinOptions::default()).wait().unwrap();
    assert!(matches!(
        conference.remote_mute(true, "p1").wait(),
        Err(HuddleError::Unsupported(_))
    ));
    assert!(!h.transport.called("set_remote_mute"));
}

#[test]
fn remote_mute_updates_the_participant() {
    let h = Harness::new();
    h.transport.with_remote(ParticipantInfo::new("p1", false));
    let conference = h.sdk.conference();
    h.joined(ConferenceOptions {
        dolby_voice: false,
        ..Default::default()
    });
    let updated = Recorder::<RemoteParticipantUpdated>::new();
    conference.add_event_handler(updated.callback()).wait().unwrap();

    assert!(matches!(
        conference.remote_mute(true, "nobody").wait(),
        Err(HuddleError::NotFound(_))
    ));
    conference.remote_mute(true, "p1").wait().unwrap();

    assert!(conference.participant("p1").unwrap().is_muted);
    let events = updated.take();
    assert_eq!(events.len(), 1);
    assert!(events[0].participant.is_muted);
}

#[test]
fn second_join_while_joined_is_rejected() {
    let h = Harness::new();
    h.joined(ConferenceOptions::default());
    let conference = h.sdk.conference();

    let again = conference
        .join(ConferenceInfo::new("other"), JoinOptions::default())
        .wait();
    assert!(matches!(again, Err(HuddleError::InvalidState(_))));
    assert!(matches!(
        conference.create(ConferenceOptions::default()).wait(),
        Err(HuddleError::InvalidState(_))
    ));
    assert_eq!(conference.status(), Some(ConferenceStatus::Joined));
}

#[test]
fn join_rejects_excessive_video_forwarding() {
    let h = Harness::new();
    let options = JoinOptions {
        max_video_forwarding: Some(26),
        ..Default::default()
    };
    let result = h
        .sdk
        .conference()
        .join(ConferenceInfo::new("c1"), options)
        .wait();
    assert!(matches!(result, Err(HuddleError::InvalidArgument(_))));
    assert!(!h.transport.called("join_conference"));
}

#[test]
fn failed_join_moves_to_error() {
    let h = Harness::new();
    h.transport.fail("join_conference");
    let conference = h.sdk.conference();
    let recorder = Recorder::<ConferenceStatusUpdated>::new();
    conference.add_event_handler(recorder.callback()).wait().unwrap();

    let result = conference
        .join(ConferenceInfo::new("c1"), JoinOptions::default())
        .wait();
    let error = result.unwrap_err();
    assert!(matches!(error, HuddleError::BackendFailure { .. }));
    assert_eq!(
        statuses(&recorder),
        vec![ConferenceStatus::Joining, ConferenceStatus::Error]
    );

    // An ended conference does not block the next one.
    assert!(conference.create(ConferenceOptions::default()).wait().is_ok());
}

#[test]
fn conference_destroyed_during_join_fails_the_join() {
    let h = Harness::new();
    let gate = h.transport.gate_joins();
    let conference = h.sdk.conference();

    let pending = conference.join(ConferenceInfo::new("c1"), JoinOptions::default());
    assert!(eventually(|| conference.status() == Some(ConferenceStatus::Joining)));

    h.sdk.signaling_sink().push(SignalingEvent::StatusUpdated {
        conference_id: "c1".into(),
        status: ConferenceStatus::Destroyed,
    });
    h.flush();
    gate.notify_one();

    assert!(matches!(pending.wait(), Err(HuddleError::InvalidState(_))));
    assert_eq!(conference.status(), Some(ConferenceStatus::Destroyed));
}

#[test]
fn listener_cannot_mute_and_is_typed_as_listener() {
    let h = Harness::new();
    let conference = h.sdk.conference();
    let joined = conference
        .listen(ConferenceInfo::new("c1"), ListenOptions::default())
        .wait()
        .unwrap();

    assert!(h.transport.called("listen_conference"));
    let local = &joined.participants[LOCAL_ID];
    assert_eq!(local.participant_type, ParticipantType::Listener);
    assert!(matches!(
        conference.mute(true).wait(),
        Err(HuddleError::Unsupported(_))
    ));
}

#[test]
fn mute_updates_local_participant() {
    let h = Harness::new();
    h.joined(ConferenceOptions::default());
    let conference = h.sdk.conference();
    let local = Recorder::<LocalParticipantUpdated>::new();
    let legacy = Recorder::<ParticipantUpdated>::new();
    conference.add_event_handler(local.callback()).wait().unwrap();
    conference.add_event_handler(legacy.callback()).wait().unwrap();

    conference.mute(true).wait().unwrap();

    assert!(conference.is_muted());
    assert!(local.take()[0].participant.is_muted);
    assert_eq!(legacy.take().len(), 1);
}

#[test]
fn output_mute_requires_dolby_voice() {
    let h = Harness::new();
    h.joined(ConferenceOptions {
        dolby_voice: false,
        ..Default::default()
    });
    let conference = h.sdk.conference();
    assert!(matches!(
        conference.mute_output(true).wait(),
        Err(HuddleError::Unsupported(_))
    ));
    assert!(!conference.is_output_muted());
}

#[test]
fn operations_before_join_are_invalid_state() {
    let h = Harness::new();
    let conference = h.sdk.conference();

    assert!(matches!(
        conference.send("hello", vec![]).wait(),
        Err(HuddleError::InvalidState(_))
    ));
    assert!(matches!(
        conference.leave().wait(),
        Err(HuddleError::InvalidState(_))
    ));
    assert!(matches!(
        conference.start_recording().wait(),
        Err(HuddleError::InvalidState(_))
    ));
    assert!(matches!(
        conference
            .set_spatial_position(LOCAL_ID, SpatialPosition::new(1.0, 0.0, 0.0))
            .wait(),
        Err(HuddleError::InvalidState(_))
    ));
    assert!(!h.transport.called("update_spatial"));
}

#[test]
fn spatial_batch_reaches_transport() {
    let h = Harness::new();
    h.transport.with_remote(ParticipantInfo::new("p1", false));
    h.joined(ConferenceOptions {
        spatial_audio_style: SpatialAudioStyle::Individual,
        ..Default::default()
    });

    let mut batch = SpatialAudioBatch::new();
    batch
        .set_spatial_position("p1", SpatialPosition::new(1.0, 0.0, 0.0))
        .set_spatial_environment(SpatialEnvironment::default());
    h.sdk
        .conference()
        .update_spatial_audio_configuration(batch.clone())
        .wait()
        .unwrap();

    assert_eq!(*h.transport.last_spatial.lock().unwrap(), Some(batch));
}

#[test]
fn shared_scene_rejects_remote_positions() {
    let h = Harness::new();
    h.joined(ConferenceOptions {
        spatial_audio_style: SpatialAudioStyle::Shared,
        ..Default::default()
    });
    let conference = h.sdk.conference();

    assert!(matches!(
        conference
            .set_spatial_position("p1", SpatialPosition::default())
            .wait(),
        Err(HuddleError::Unsupported(_))
    ));
    conference
        .set_spatial_position(LOCAL_ID, SpatialPosition::default())
        .wait()
        .unwrap();
}

#[test]
fn recording_is_timestamped() {
    let h = Harness::new();
    h.joined(ConferenceOptions::default());
    let conference = h.sdk.conference();
    let recorder = Recorder::<RecordingStatusUpdated>::new();
    conference.add_event_handler(recorder.callback()).wait().unwrap();

    conference.start_recording().wait().unwrap();
    let started = conference.recording_started_at().unwrap();
    conference.stop_recording().wait().unwrap();
    assert_eq!(conference.recording_started_at(), None);

    let events = recorder.take();
    assert_eq!(events.len(), 2);
    assert!(events[0].recording);
    assert_eq!(events[0].timestamp, started);
    assert_eq!(events[0].participant_id.as_deref(), Some(LOCAL_ID));
    assert!(!events[1].recording);
}

#[test]
fn pushes_update_the_roster_and_fire_canonical_and_legacy_events() {
    let h = Harness::new();
    h.joined(ConferenceOptions::default());
    let conference = h.sdk.conference();
    let added = Recorder::<RemoteParticipantAdded>::new();
    let legacy_added = Recorder::<ParticipantAdded>::new();
    let updated = Recorder::<RemoteParticipantUpdated>::new();
    let track_added = Recorder::<RemoteVideoTrackAdded>::new();
    let legacy_track = Recorder::<VideoTrackAdded>::new();
    let speakers = Recorder::<ActiveSpeakerChanged>::new();
    conference.add_event_handler(added.callback()).wait().unwrap();
    conference.add_event_handler(legacy_added.callback()).wait().unwrap();
    conference.add_event_handler(updated.callback()).wait().unwrap();
    conference.add_event_handler(track_added.callback()).wait().unwrap();
    conference.add_event_handler(legacy_track.callback()).wait().unwrap();
    conference.add_event_handler(speakers.callback()).wait().unwrap();

    let sink = h.sdk.signaling_sink();
    let mut bob = ParticipantInfo::new("bob", false);
    bob.details = ParticipantDetails {
        name: Some("Bob".into()),
        ..Default::default()
    };
    sink.push(SignalingEvent::ParticipantAdded(bob.clone()));
    bob.is_sending_audio = true;
    sink.push(SignalingEvent::ParticipantUpdated(bob));
    sink.push(SignalingEvent::VideoTrackAdded(remote_video("bob", "v1")));
    sink.push(SignalingEvent::ActiveSpeakerChanged(vec!["bob".into()]));
    h.flush();

    assert_eq!(added.take().len(), 1);
    assert_eq!(legacy_added.take().len(), 1);
    assert!(updated.take()[0].participant.is_sending_audio);
    assert_eq!(track_added.take()[0].track.sdp_track_id, "v1");
    assert_eq!(legacy_track.take().len(), 1);
    assert_eq!(speakers.take()[0].participant_ids, vec!["bob".to_string()]);

    let bob = conference.participant("bob").unwrap();
    assert_eq!(bob.details.name.as_deref(), Some("Bob"));
    assert_eq!(bob.video_track_ids, vec!["v1".to_string()]);
    assert_eq!(conference.active_speakers(), vec!["bob".to_string()]);

    let current = conference.get_current_conference().wait().unwrap();
    assert!(current.participants.contains_key("bob"));
    assert!(current.participants.contains_key(LOCAL_ID));
}

#[test]
fn roster_pushes_without_conference_are_dropped() {
    let h = Harness::new();
    let added = Recorder::<RemoteParticipantAdded>::new();
    h.sdk
        .conference()
        .add_event_handler(added.callback())
        .wait()
        .unwrap();

    h.sdk
        .signaling_sink()
        .push(SignalingEvent::ParticipantAdded(ParticipantInfo::new("bob", false)));
    h.flush();

    assert!(added.take().is_empty());
    assert!(h.sdk.conference().participants().is_empty());
}

#[test]
fn invitations_arrive_without_a_conference() {
    let h = Harness::new();
    let invitations = Recorder::<ConferenceInvitationReceived>::new();
    let conference = h.sdk.conference();
    conference.add_event_handler(invitations.callback()).wait().unwrap();

    h.sdk.signaling_sink().push(SignalingEvent::InvitationReceived {
        conference_id: "c9".into(),
        conference_alias: Some("retro".into()),
        sender: ParticipantDetails::default(),
    });
    h.flush();

    assert_eq!(invitations.take()[0].conference_id, "c9");
    conference.decline_invitation("c9").wait().unwrap();
    assert!(h.transport.called("decline_invitation"));
}

#[test]
fn invalid_pushed_status_is_ignored() {
    let h = Harness::new();
    h.joined(ConferenceOptions::default());
    let recorder = Recorder::<ConferenceStatusUpdated>::new();
    let conference = h.sdk.conference();
    conference.add_event_handler(recorder.callback()).wait().unwrap();

    let id = conference.get_current_conference().wait().unwrap().id;
    h.sdk.signaling_sink().push(SignalingEvent::StatusUpdated {
        conference_id: id,
        status: ConferenceStatus::Creating,
    });
    h.flush();

    assert!(recorder.take().is_empty());
    assert_eq!(conference.status(), Some(ConferenceStatus::Joined));
}

#[test]
fn demo_creates_and_joins() {
    let h = Harness::new();
    let joined = h
        .sdk
        .conference()
        .demo(SpatialAudioStyle::Shared)
        .wait()
        .unwrap();

    assert_eq!(joined.status, ConferenceStatus::Joined);
    assert_eq!(joined.effective_spatial_style(), SpatialAudioStyle::Shared);
    assert_eq!(
        h.transport.calls(),
        vec!["create_demo".to_string(), "join_conference".to_string()]
    );
}

#[test]
fn removed_handler_is_not_invoked() {
    let h = Harness::new();
    let conference = h.sdk.conference();
    let recorder = Recorder::<ConferenceStatusUpdated>::new();
    let id = conference.add_event_handler(recorder.callback()).wait().unwrap();
    conference.remove_event_handler(id).wait().unwrap();

    conference.create(ConferenceOptions::default()).wait().unwrap();

    assert!(recorder.take().is_empty());
    assert!(matches!(
        conference.remove_event_handler(id).wait(),
        Err(HuddleError::NotFound(_))
    ));
}

#[test]
fn leaving_a_created_conference_destroys_it_locally() {
    let h = Harness::new();
    let conference = h.sdk.conference();
    let recorder = Recorder::<ConferenceStatusUpdated>::new();
    conference
        .add_event_handler(recorder.callback())
        .wait()
        .unwrap();

    conference.create(ConferenceOptions::default()).wait().unwrap();
    conference.leave().wait().unwrap();

    assert_eq!(
        statuses(&recorder),
        vec![
            ConferenceStatus::Creating,
            ConferenceStatus::Created,
            ConferenceStatus::Destroyed
        ]
    );
    assert!(!h.transport.called("leave_conference"));
    assert_eq!(conference.status(), Some(ConferenceStatus::Destroyed));

    let next = conference.create(ConferenceOptions::default()).wait().unwrap();
    assert_eq!(next.status, ConferenceStatus::Created);
}

#[test]
fn roster_is_emptied_when_the_conference_ends() {
    let h = Harness::new();
    h.transport.with_remote(ParticipantInfo::new("bob", false));
    h.joined(ConferenceOptions::default());
    let conference = h.sdk.conference();
    h.sdk
        .signaling_sink()
        .push(SignalingEvent::ActiveSpeakerChanged(vec!["bob".into()]));
    h.flush();
    assert!(conference.participant("bob").is_some());
    assert!(!conference.active_speakers().is_empty());

    conference.leave().wait().unwrap();

    assert!(conference.participant("bob").is_none());
    assert!(conference.participants().is_empty());
    assert!(conference.active_speakers().is_empty());
}

#[test]
fn created_conference_keeps_requested_settings_the_backend_omits() {
    let h = Harness::new();
    h.transport.bare_records();
    let conference = h.sdk.conference();
    let created = conference
        .create(ConferenceOptions {
            alias: Some("retro".into()),
            dolby_voice: true,
            ..Default::default()
        })
        .wait()
        .unwrap();

    assert_eq!(created.id, "conf-1");
    assert_eq!(created.alias.as_deref(), Some("retro"));
    assert!(created.dolby_voice);
    assert!(matches!(
        conference.remote_mute(true, "p1").wait(),
        Err(HuddleError::Unsupported(_))
    ));
}

#[test]
fn closest_user_forwarding_requires_spatial_audio() {
    let h = Harness::new();
    let conference = h.sdk.conference();
    let flat = JoinOptions {
        forwarding_strategy: Some(VideoForwardingStrategy::ClosestUser),
        ..Default::default()
    };
    let result = conference.join(ConferenceInfo::new("c1"), flat.clone()).wait();
    assert!(matches!(result, Err(HuddleError::InvalidArgument(_))));
    assert!(!h.transport.called("join_conference"));

    let spatial = JoinOptions {
        spatial_audio: true,
        ..flat
    };
    conference
        .join(ConferenceInfo::new("c1"), spatial)
        .wait()
        .unwrap();
    let sent = h.transport.last_join.lock().unwrap().clone().unwrap();
    assert_eq!(
        sent.forwarding_strategy,
        Some(VideoForwardingStrategy::ClosestUser)
    );
}
