//! In-memory transport and capture backend used by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use huddle_core::capture::{CaptureBackend, NativeAudioDevice};
use huddle_core::conference::{
    ConferenceInfo, ConferenceOptions, JoinOptions, ListenOptions, SpatialAudioStyle,
};
use huddle_core::devices::{
    CameraDevice, DefaultAudioDevicePolicy, DeviceDirection, LinearVolume, NativeDeviceId,
};
use huddle_core::participants::{ParticipantInfo, VideoTrack};
use huddle_core::screen_share::{ScreenShareContentInfo, ScreenShareSource, ScreenShareSourceType};
use huddle_core::spatial::SpatialAudioBatch;
use huddle_core::{BackendFuture, HuddleError, JoinedConference, Sdk, SignalingTransport};
use huddle_media::{AudioSink, AudioSource, EncodedVideoSink, VideoFrame, VideoSink};
use tokio::sync::Notify;

pub const LOCAL_ID: &str = "local-1";

#[derive(Default)]
pub struct CountingSink {
    frames: AtomicU64,
}

impl CountingSink {
    pub fn count(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

impl VideoSink for CountingSink {
    fn handle_frame(&self, _frame: &VideoFrame) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records every call and fails the ones listed in `failing`.
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    next_conference: AtomicU64,
    remote_participants: Mutex<Vec<ParticipantInfo>>,
    join_gate: Mutex<Option<Arc<Notify>>>,
    bare_records: AtomicBool,
    pub last_join: Mutex<Option<JoinOptions>>,
    pub camera_input: Arc<CountingSink>,
    pub screen_input: Arc<CountingSink>,
    pub last_spatial: Mutex<Option<SpatialAudioBatch>>,
    pub remote_sinks: Mutex<Vec<(VideoTrack, bool)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, call: &'static str) {
        self.failing.lock().unwrap().insert(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }

    pub fn with_remote(&self, participant: ParticipantInfo) {
        self.remote_participants.lock().unwrap().push(participant);
    }

    /// Hold every join until the returned notify is triggered.
    pub fn gate_joins(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.join_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Answer `create_conference` with only an id, as backends that do
    /// not echo the requested settings do.
    pub fn bare_records(&self) {
        self.bare_records.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: &'static str) -> Result<(), HuddleError> {
        self.calls.lock().unwrap().push(call.to_string());
        if self.failing.lock().unwrap().contains(call) {
            return Err(HuddleError::backend(format!("{call} failed")));
        }
        Ok(())
    }

    fn ready<T: Send + 'static>(&self, call: &'static str, value: T) -> BackendFuture<T> {
        let outcome = self.record(call).map(|_| value);
        async move { outcome }.boxed()
    }

    fn joined(&self, conference: ConferenceInfo, call: &'static str) -> BackendFuture<JoinedConference> {
        let outcome = self.record(call);
        let gate = self.join_gate.lock().unwrap().clone();
        let mut conference = conference;
        for participant in self.remote_participants.lock().unwrap().iter() {
            conference
                .participants
                .insert(participant.id.clone(), participant.clone());
        }
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            outcome?;
            Ok(JoinedConference {
                conference,
                local_participant: ParticipantInfo::new(LOCAL_ID, true),
            })
        }
        .boxed()
    }
}

impl SignalingTransport for FakeTransport {
    fn create_conference(&self, options: ConferenceOptions) -> BackendFuture<ConferenceInfo> {
        let n = self.next_conference.fetch_add(1, Ordering::SeqCst) + 1;
        let mut info = ConferenceInfo::new(format!("conf-{n}"));
        if self.bare_records.load(Ordering::SeqCst) {
            return self.ready("create_conference", info);
        }
        info.alias = options.alias.clone();
        info.is_new = true;
        info.dolby_voice = options.dolby_voice;
        info.spatial_audio_style = Some(options.spatial_audio_style);
        info.video_codec = options.video_codec;
        self.ready("create_conference", info)
    }

    fn create_demo(&self, style: SpatialAudioStyle) -> BackendFuture<ConferenceInfo> {
        let mut info = ConferenceInfo::new("demo-1");
        info.spatial_audio_style = Some(style);
        self.ready("create_demo", info)
    }

    fn join_conference(
        &self,
        conference: ConferenceInfo,
        options: JoinOptions,
    ) -> BackendFuture<JoinedConference> {
        *self.last_join.lock().unwrap() = Some(options);
        self.joined(conference, "join_conference")
    }

    fn listen_conference(
        &self,
        conference: ConferenceInfo,
        _options: ListenOptions,
    ) -> BackendFuture<JoinedConference> {
        self.joined(conference, "listen_conference")
    }

    fn leave_conference(&self, _conference_id: String) -> BackendFuture<()> {
        self.ready("leave_conference", ())
    }

    fn send_message(
        &self,
        _conference_id: String,
        _message: String,
        _participant_ids: Vec<String>,
    ) -> BackendFuture<()> {
        self.ready("send_message", ())
    }

    fn set_mute(&self, _muted: bool) -> BackendFuture<()> {
        self.ready("set_mute", ())
    }

    fn set_remote_mute(&self, _participant_id: String, _muted: bool) -> BackendFuture<()> {
        self.ready("set_remote_mute", ())
    }

    fn set_output_mute(&self, _muted: bool) -> BackendFuture<()> {
        self.ready("set_output_mute", ())
    }

    fn update_spatial(&self, batch: SpatialAudioBatch) -> BackendFuture<()> {
        *self.last_spatial.lock().unwrap() = Some(batch);
        self.ready("update_spatial", ())
    }

    fn decline_invitation(&self, _conference_id: String) -> BackendFuture<()> {
        self.ready("decline_invitation", ())
    }

    fn start_recording(&self, _conference_id: String) -> BackendFuture<()> {
        self.ready("start_recording", ())
    }

    fn stop_recording(&self, _conference_id: String) -> BackendFuture<()> {
        self.ready("stop_recording", ())
    }

    fn local_video_input(&self, screen_share: bool) -> BackendFuture<Arc<dyn VideoSink>> {
        let sink: Arc<dyn VideoSink> = if screen_share {
            self.screen_input.clone()
        } else {
            self.camera_input.clone()
        };
        self.ready("local_video_input", sink)
    }

    fn release_local_video(&self, screen_share: bool) -> BackendFuture<()> {
        let call = if screen_share {
            "release_screen_share"
        } else {
            "release_camera"
        };
        self.ready(call, ())
    }

    fn set_screen_share_content(&self, _info: ScreenShareContentInfo) -> BackendFuture<()> {
        self.ready("set_screen_share_content", ())
    }

    fn set_remote_video_sink(
        &self,
        track: VideoTrack,
        sink: Option<Arc<dyn VideoSink>>,
    ) -> BackendFuture<()> {
        self.remote_sinks.lock().unwrap().push((track, sink.is_some()));
        self.ready("set_remote_video_sink", ())
    }

    fn set_audio_sink(&self, _sink: Option<Arc<dyn AudioSink>>) -> BackendFuture<()> {
        self.ready("set_audio_sink", ())
    }

    fn set_encoded_video_sink(&self, _sink: Option<Arc<dyn EncodedVideoSink>>) -> BackendFuture<()> {
        self.ready("set_encoded_video_sink", ())
    }

    fn set_audio_source(&self, _source: Option<Arc<dyn AudioSource>>) -> BackendFuture<()> {
        self.ready("set_audio_source", ())
    }
}

/// Capture backend holding a fixed device set.
pub struct FakeCapture {
    calls: Mutex<Vec<String>>,
    pub audio: Mutex<Vec<NativeAudioDevice>>,
    pub cameras: Mutex<Vec<CameraDevice>>,
    pub screens: Vec<ScreenShareSource>,
    pub can_switch: AtomicBool,
    pub camera_sink: Mutex<Option<Arc<dyn VideoSink>>>,
    pub screen_sink: Mutex<Option<Arc<dyn VideoSink>>>,
    pub policy: Mutex<Option<DefaultAudioDevicePolicy>>,
    camera_gate: Mutex<Option<Arc<Notify>>>,
    screen_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            audio: Mutex::new(vec![
                native_audio(1, "Built-in Microphone", DeviceDirection::Input),
                native_audio(2, "Speakers", DeviceDirection::Output),
            ]),
            cameras: Mutex::new(vec![camera("cam-front", "Front Camera")]),
            screens: vec![screen(1, "Display 1"), screen(2, "Display 2")],
            can_switch: AtomicBool::new(true),
            camera_sink: Mutex::new(None),
            screen_sink: Mutex::new(None),
            policy: Mutex::new(None),
            camera_gate: Mutex::new(None),
            screen_gate: Mutex::new(None),
        })
    }

    /// Hold every camera start until the returned notify is triggered.
    pub fn gate_camera(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.camera_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold every screen capture start until the returned notify is
    /// triggered.
    pub fn gate_screen_capture(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.screen_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }

    fn ready<T: Send + 'static>(&self, call: &str, value: T) -> BackendFuture<T> {
        self.calls.lock().unwrap().push(call.to_string());
        async move { Ok(value) }.boxed()
    }

    fn gated(&self, call: &str, gate: &Mutex<Option<Arc<Notify>>>) -> BackendFuture<()> {
        self.calls.lock().unwrap().push(call.to_string());
        let gate = gate.lock().unwrap().clone();
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(())
        }
        .boxed()
    }
}

impl CaptureBackend for FakeCapture {
    fn audio_devices(&self) -> BackendFuture<Vec<NativeAudioDevice>> {
        let devices = self.audio.lock().unwrap().clone();
        self.ready("audio_devices", devices)
    }

    fn video_devices(&self) -> BackendFuture<Vec<CameraDevice>> {
        let cameras = self.cameras.lock().unwrap().clone();
        self.ready("video_devices", cameras)
    }

    fn screen_share_sources(&self) -> BackendFuture<Vec<ScreenShareSource>> {
        self.ready("screen_share_sources", self.screens.clone())
    }

    fn select_audio_device(
        &self,
        _native_id: NativeDeviceId,
        _direction: DeviceDirection,
    ) -> BackendFuture<()> {
        self.ready("select_audio_device", ())
    }

    fn set_volume(&self, _direction: DeviceDirection, _volume: LinearVolume) -> BackendFuture<()> {
        self.ready("set_volume", ())
    }

    fn set_default_audio_device_policy(
        &self,
        policy: DefaultAudioDevicePolicy,
    ) -> BackendFuture<()> {
        *self.policy.lock().unwrap() = Some(policy);
        self.ready("set_default_audio_device_policy", ())
    }

    fn start_camera(&self, _device: CameraDevice, sink: Arc<dyn VideoSink>) -> BackendFuture<()> {
        *self.camera_sink.lock().unwrap() = Some(sink);
        self.gated("start_camera", &self.camera_gate)
    }

    fn stop_camera(&self) -> BackendFuture<()> {
        *self.camera_sink.lock().unwrap() = None;
        self.ready("stop_camera", ())
    }

    fn start_screen_capture(
        &self,
        _source: ScreenShareSource,
        sink: Arc<dyn VideoSink>,
    ) -> BackendFuture<()> {
        *self.screen_sink.lock().unwrap() = Some(sink);
        self.gated("start_screen_capture", &self.screen_gate)
    }

    fn switch_screen_capture(&self, _source: ScreenShareSource) -> BackendFuture<()> {
        self.ready("switch_screen_capture", ())
    }

    fn stop_screen_capture(&self) -> BackendFuture<()> {
        *self.screen_sink.lock().unwrap() = None;
        self.ready("stop_screen_capture", ())
    }

    fn can_switch_screen_source(&self, _from: &ScreenShareSource, _to: &ScreenShareSource) -> bool {
        self.can_switch.load(Ordering::SeqCst)
    }
}

pub fn native_audio(id: u32, name: &str, direction: DeviceDirection) -> NativeAudioDevice {
    NativeAudioDevice {
        native_id: NativeDeviceId::Numeric(id),
        name: name.to_string(),
        direction,
    }
}

pub fn camera(unique_id: &str, name: &str) -> CameraDevice {
    CameraDevice {
        name: name.to_string(),
        unique_id: unique_id.to_string(),
    }
}

pub fn screen(id: u64, title: &str) -> ScreenShareSource {
    ScreenShareSource {
        title: title.to_string(),
        id,
        source_type: ScreenShareSourceType::Screen,
    }
}

pub struct Harness {
    pub sdk: Sdk,
    pub transport: Arc<FakeTransport>,
    pub capture: Arc<FakeCapture>,
}

impl Harness {
    pub fn new() -> Self {
        let transport = FakeTransport::new();
        let capture = FakeCapture::new();
        let sdk = Sdk::new(transport.clone(), capture.clone()).unwrap();
        Self {
            sdk,
            transport,
            capture,
        }
    }

    /// Wait until every job queued so far has run, and the tasks they
    /// spawned had a chance to finish.
    pub fn flush(&self) {
        self.sdk
            .executor()
            .spawn(async {
                tokio::task::yield_now().await;
                Ok(())
            })
            .wait()
            .unwrap();
    }

    /// Create and join a conference with spatial audio enabled.
    pub fn joined(&self, options: ConferenceOptions) -> ConferenceInfo {
        let conference = self.sdk.conference();
        let created = conference.create(options).wait().unwrap();
        let join = JoinOptions {
            spatial_audio: true,
            ..Default::default()
        };
        conference.join(created, join).wait().unwrap()
    }
}

/// Poll `condition` for up to two seconds.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Collects every event of one type.
pub struct Recorder<E> {
    pub events: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone + Send + 'static> Recorder<E> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn callback(&self) -> impl Fn(&E) + Send + Sync + 'static {
        let events = self.events.clone();
        move |event: &E| events.lock().unwrap().push(event.clone())
    }

    pub fn take(&self) -> Vec<E> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}
