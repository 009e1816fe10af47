//! Encoded (pre-decoder) video frames.

use std::fmt;
use std::sync::Arc;

/// One compressed video frame as handed over by the codec layer.
#[derive(Clone)]
pub struct EncodedVideoFrame {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    keyframe: bool,
}

impl EncodedVideoFrame {
    pub fn new(data: impl Into<Arc<[u8]>>, width: u32, height: u32, keyframe: bool) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            keyframe,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }
}

impl fmt::Debug for EncodedVideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedVideoFrame")
            .field("size", &self.size())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("keyframe", &self.keyframe)
            .finish()
    }
}

/// What the decoder should do once an encoded sink is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderConfig {
    /// Decode every frame; raw video sinks keep working.
    #[default]
    FullDecoding,
    /// Decode only the first frame. Raw sinks receive nothing afterwards.
    OptimizedDecoding,
}

/// Receiver of encoded frames for every remote video track.
pub trait EncodedVideoSink: Send + Sync {
    /// Called when a track starts; the answer configures that track's
    /// decoder.
    fn configure_encoded_sink(&self, codec: &str, track_id: &str) -> DecoderConfig;

    fn decoder_configuration(&self) -> DecoderConfig;

    fn handle_frame_encoded(&self, track_id: &str, frame: EncodedVideoFrame);
}
