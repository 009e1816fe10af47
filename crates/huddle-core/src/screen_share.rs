use serde::{Deserialize, Serialize};

use crate::video::LocalPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenShareSourceType {
    Screen,
    Window,
}

/// A screen or window that can be captured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenShareSource {
    pub title: String,
    pub id: u64,
    pub source_type: ScreenShareSourceType,
}

/// Hint for the encoder about what is being shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenShareContentType {
    #[default]
    Unspecified,
    Detailed,
    Text,
    Fluid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenShareContentInfo {
    pub content_type: ScreenShareContentType,
}

/// The screen share currently published by this client.
pub(crate) struct ActiveScreenShare {
    pub source: ScreenShareSource,
    pub content: ScreenShareContentInfo,
    pub pipeline: LocalPipeline,
}

impl ActiveScreenShare {
    pub fn uses_capture(&self) -> bool {
        self.pipeline.mode.uses_capture()
    }
}
