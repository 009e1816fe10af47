use thiserror::Error;

/// Recovery hint attached to audio device timeout failures.
pub const AUDIO_DEVICE_TIMEOUT_HINT: &str = "audio_device_timeout_failure";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HuddleError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("backend failure: {message}")]
    BackendFailure {
        message: String,
        recovery_hint: Option<String>,
    },
    #[error("conversion failed: {0}")]
    ConversionFailure(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("screen share must be restarted to switch to this source")]
    ScreenShareRestartRequired,
    #[error("async result already settled")]
    AlreadySettled,
    #[error("engine stopped")]
    EngineStopped,
}

impl HuddleError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendFailure {
            message: message.into(),
            recovery_hint: None,
        }
    }

    pub fn audio_device_timeout(message: impl Into<String>) -> Self {
        Self::BackendFailure {
            message: message.into(),
            recovery_hint: Some(AUDIO_DEVICE_TIMEOUT_HINT.to_string()),
        }
    }

    pub fn recovery_hint(&self) -> Option<&str> {
        match self {
            Self::BackendFailure { recovery_hint, .. } => recovery_hint.as_deref(),
            _ => None,
        }
    }
}
