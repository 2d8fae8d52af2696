//! Error types for the sequencing engine.
//!
//! Validation failures (`InvalidConstraint`, `InvalidPalette`, `InvalidPart`,
//! `InvalidNote`) are raised before any generation work and are never
//! retried. Event source failures are retried per note by the generator and
//! surface as `GenerationAborted` once the retry bound is spent. The
//! orchestrator wraps part-level failures in `OrchestrationFailed`, except for
//! `Cancelled`, which always propagates as itself.

use thiserror::Error;

use crate::source::SourceError;

/// Why a `ConstraintModel` (or one of its parts) was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    #[error("scale is empty")]
    EmptyScale,
    #[error("pitch {0} is outside the MIDI range 0-127")]
    PitchOutOfRange(i32),
    #[error("pitch range is inverted: low {low} > high {high}")]
    InvertedPitchRange { low: u8, high: u8 },
    #[error("tempo bound {name} must be positive and finite, got {value}")]
    NonPositiveTempo { name: &'static str, value: f64 },
    #[error("tempo {name} range is inverted: min {min} > max {max}")]
    InvertedTempo {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("no scale pitch lies within the pitch range {low}-{high}")]
    ScaleOutsideRange { low: u8, high: u8 },
}

#[derive(Debug, Error)]
pub enum MusicError {
    #[error("invalid constraint: {0}")]
    InvalidConstraint(#[from] ConstraintError),
    #[error("percussion palette is empty or holds a pitch above 127")]
    InvalidPalette,
    #[error("invalid part: {0}")]
    InvalidPart(String),
    #[error("invalid note: {0}")]
    InvalidNote(String),
    #[error("generation aborted at note {note_index} after {attempts} attempt(s): {cause}")]
    GenerationAborted {
        note_index: usize,
        attempts: u32,
        #[source]
        cause: SourceError,
    },
    #[error("orchestration failed on part {part_index} ({part_name}): {source}")]
    OrchestrationFailed {
        part_index: usize,
        part_name: String,
        #[source]
        source: Box<MusicError>,
    },
    #[error("document has no parts")]
    EmptyDocument,
    #[error("generation cancelled")]
    Cancelled,
    #[error("MIDI error: {0}")]
    Midi(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MusicError>;
