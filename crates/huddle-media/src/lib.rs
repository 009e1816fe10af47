//! Media pipeline primitives for the huddle conferencing core.
//!
//! Frame records (raw video, encoded video, PCM audio) plus the sink and
//! source contracts that connect local capture, network tracks and
//! application processors. Frame delivery may happen on any thread; every
//! sink and source here is `Send + Sync`.

pub mod audio;
pub mod encoded;
pub mod frame;
pub mod video;

pub use audio::{AudioFrame, AudioPlayoutBuffer, AudioSink, AudioSource, RtcAudioSource};
pub use encoded::{DecoderConfig, EncodedVideoFrame, EncodedVideoSink};
pub use frame::{
    ArgbBuffer, I420Buffer, NativeBuffer, Nv12Buffer, VideoFrame, VideoFrameBuffer,
    VideoFrameBufferType,
};
pub use video::{
    FrameHandler, FrameHandlerMode, FrameSource, SinkFanout, VideoFrameHandler, VideoSink,
    VideoSource, VideoSourceConfig,
};
