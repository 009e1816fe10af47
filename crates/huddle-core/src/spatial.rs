//! Spatial audio scene description.

use serde::{Deserialize, Serialize};

use crate::conference::SpatialAudioStyle;
use crate::errors::HuddleError;

/// Position of a participant in the scene, in environment units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SpatialPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Rotation of the local listener, in degrees around each axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialDirection {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// How many application units make one meter on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialScale {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for SpatialScale {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialEnvironment {
    pub scale: SpatialScale,
    pub forward: SpatialPosition,
    pub up: SpatialPosition,
    pub right: SpatialPosition,
}

impl Default for SpatialEnvironment {
    fn default() -> Self {
        Self {
            scale: SpatialScale::default(),
            forward: SpatialPosition::new(0.0, 0.0, 1.0),
            up: SpatialPosition::new(0.0, 1.0, 0.0),
            right: SpatialPosition::new(1.0, 0.0, 0.0),
        }
    }
}

impl SpatialEnvironment {
    pub fn validate(&self) -> Result<(), HuddleError> {
        let SpatialScale { x, y, z } = self.scale;
        if [x, y, z].iter().all(|v| v.is_finite() && *v > 0.0) {
            Ok(())
        } else {
            Err(HuddleError::InvalidArgument(format!(
                "environment scale must be positive, got ({x}, {y}, {z})"
            )))
        }
    }
}

/// Several spatial updates sent to the backend in one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpatialAudioBatch {
    pub positions: Vec<(String, SpatialPosition)>,
    pub direction: Option<SpatialDirection>,
    pub environment: Option<SpatialEnvironment>,
}

impl SpatialAudioBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_spatial_position(
        &mut self,
        participant_id: impl Into<String>,
        position: SpatialPosition,
    ) -> &mut Self {
        let participant_id = participant_id.into();
        self.positions.retain(|(id, _)| id != &participant_id);
        self.positions.push((participant_id, position));
        self
    }

    pub fn set_spatial_direction(&mut self, direction: SpatialDirection) -> &mut Self {
        self.direction = Some(direction);
        self
    }

    pub fn set_spatial_environment(&mut self, environment: SpatialEnvironment) -> &mut Self {
        self.environment = Some(environment);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.direction.is_none() && self.environment.is_none()
    }

    /// Check the batch against the conference's spatial style.
    pub fn validate(&self, style: SpatialAudioStyle, local_id: &str) -> Result<(), HuddleError> {
        if style == SpatialAudioStyle::Disabled {
            return Err(HuddleError::InvalidState(
                "spatial audio is disabled for this conference".into(),
            ));
        }
        if style == SpatialAudioStyle::Shared {
            if let Some((id, _)) = self.positions.iter().find(|(id, _)| id != local_id) {
                return Err(HuddleError::Unsupported(format!(
                    "shared spatial scene: cannot position remote participant {id}"
                )));
            }
        }
        if let Some(environment) = &self.environment {
            environment.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_position_for_same_participant_wins() {
        let mut batch = SpatialAudioBatch::new();
        batch
            .set_spatial_position("p1", SpatialPosition::new(1.0, 0.0, 0.0))
            .set_spatial_position("p1", SpatialPosition::new(2.0, 0.0, 0.0));
        assert_eq!(batch.positions.len(), 1);
        assert_eq!(batch.positions[0].1.x, 2.0);
    }

    #[test]
    fn shared_style_only_positions_local() {
        let mut batch = SpatialAudioBatch::new();
        batch.set_spatial_position("me", SpatialPosition::default());
        assert!(batch.validate(SpatialAudioStyle::Shared, "me").is_ok());

        batch.set_spatial_position("p2", SpatialPosition::default());
        assert!(matches!(
            batch.validate(SpatialAudioStyle::Shared, "me"),
            Err(HuddleError::Unsupported(_))
        ));
        assert!(batch.validate(SpatialAudioStyle::Individual, "me").is_ok());
    }

    #[test]
    fn disabled_style_rejects_everything() {
        let batch = SpatialAudioBatch::new();
        assert!(matches!(
            batch.validate(SpatialAudioStyle::Disabled, "me"),
            Err(HuddleError::InvalidState(_))
        ));
    }

    #[test]
    fn environment_scale_must_be_positive() {
        let mut environment = SpatialEnvironment::default();
        assert!(environment.validate().is_ok());
        environment.scale.y = 0.0;
        assert!(matches!(
            environment.validate(),
            Err(HuddleError::InvalidArgument(_))
        ));
    }
}
