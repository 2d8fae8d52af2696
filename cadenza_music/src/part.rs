// Part specifications: what instrument plays, in what role, and whether the
// part is percussion.
//
// A percussion part carries a fixed pitch palette (one pitch per drum voice)
// and is generated by drums.rs without consulting the event source. Melodic
// parts are generated by generator.rs under the orchestration's shared
// constraint model with the part's role swapped in.

use serde::{Deserialize, Serialize};

use crate::constraint::{MIDI_MAX, Role};
use crate::error::{MusicError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSpec {
    /// General MIDI program number (instrument timbre).
    pub program: u8,
    pub display_name: String,
    pub role: Role,
    pub is_percussion: bool,
    /// Fixed pitches for percussion. Required iff `is_percussion`.
    #[serde(default)]
    pub percussion_palette: Option<Vec<u8>>,
    /// Overrides sampled velocities for every note of the part.
    #[serde(default)]
    pub fixed_velocity: Option<u8>,
}

impl PartSpec {
    pub fn melodic(program: u8, display_name: impl Into<String>, role: Role) -> Self {
        PartSpec {
            program,
            display_name: display_name.into(),
            role,
            is_percussion: false,
            percussion_palette: None,
            fixed_velocity: None,
        }
    }

    pub fn percussion(
        display_name: impl Into<String>,
        palette: impl Into<Vec<u8>>,
        velocity: Option<u8>,
    ) -> Self {
        PartSpec {
            program: 0,
            display_name: display_name.into(),
            role: Role::Drums,
            is_percussion: true,
            percussion_palette: Some(palette.into()),
            fixed_velocity: velocity,
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.fixed_velocity = Some(velocity);
        self
    }

    /// Check the structural rules of a part before any generation.
    ///
    /// An empty percussion palette is reported as `InvalidPalette` by the
    /// drum generator itself, so it is not rejected here.
    pub fn validate(&self) -> Result<()> {
        if self.program > MIDI_MAX {
            return Err(MusicError::InvalidPart(format!(
                "{}: program {} > 127",
                self.display_name, self.program
            )));
        }
        if let Some(v) = self.fixed_velocity.filter(|&v| v == 0 || v > MIDI_MAX) {
            return Err(MusicError::InvalidPart(format!(
                "{}: velocity {v} outside 1-127",
                self.display_name
            )));
        }
        match (self.is_percussion, &self.percussion_palette) {
            (true, None) => Err(MusicError::InvalidPart(format!(
                "{}: percussion part has no palette",
                self.display_name
            ))),
            (false, Some(_)) => Err(MusicError::InvalidPart(format!(
                "{}: melodic part has a percussion palette",
                self.display_name
            ))),
            _ => Ok(()),
        }
    }
}
