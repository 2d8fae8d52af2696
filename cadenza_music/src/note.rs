// Timed note events, the unit of output for every generator.
//
// Times are in seconds from the start of the part. Conversion to MIDI ticks
// happens only in midi.rs, at a single fixed reference tempo.

use serde::{Deserialize, Serialize};

use crate::constraint::MIDI_MAX;
use crate::error::{MusicError, Result};

/// A single pitched note with onset, release and velocity.
///
/// Invariants (checked by `new`): pitch and velocity are valid MIDI values,
/// velocity is non-zero, `start >= 0` and `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNote")]
pub struct NoteEvent {
    pitch: u8,
    start: f64,
    end: f64,
    velocity: u8,
}

impl NoteEvent {
    pub fn new(pitch: u8, start: f64, end: f64, velocity: u8) -> Result<Self> {
        if pitch > MIDI_MAX {
            return Err(MusicError::InvalidNote(format!("pitch {pitch} > 127")));
        }
        if velocity == 0 || velocity > MIDI_MAX {
            return Err(MusicError::InvalidNote(format!(
                "velocity {velocity} outside 1-127"
            )));
        }
        if !start.is_finite() || start < 0.0 {
            return Err(MusicError::InvalidNote(format!("start {start} is negative")));
        }
        if !end.is_finite() || end <= start {
            return Err(MusicError::InvalidNote(format!(
                "end {end} is not after start {start}"
            )));
        }
        Ok(NoteEvent {
            pitch,
            start,
            end,
            velocity,
        })
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Deserialize)]
struct RawNote {
    pitch: u8,
    start: f64,
    end: f64,
    velocity: u8,
}

impl TryFrom<RawNote> for NoteEvent {
    type Error = MusicError;

    fn try_from(raw: RawNote) -> Result<Self> {
        NoteEvent::new(raw.pitch, raw.start, raw.end, raw.velocity)
    }
}

/// True if `start` never decreases along the sequence.
pub fn is_time_ordered(notes: &[NoteEvent]) -> bool {
    notes.windows(2).all(|w| w[0].start <= w[1].start)
}

/// Latest release time in the sequence, 0.0 when empty.
pub fn end_time(notes: &[NoteEvent]) -> f64 {
    notes.iter().map(|n| n.end).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_note_rejected() {
        assert!(matches!(
            NoteEvent::new(60, 1.0, 1.0, 80),
            Err(MusicError::InvalidNote(_))
        ));
    }

    #[test]
    fn bad_velocity_and_pitch_rejected() {
        assert!(NoteEvent::new(60, 0.0, 1.0, 0).is_err());
        assert!(NoteEvent::new(60, 0.0, 1.0, 128).is_err());
        assert!(NoteEvent::new(128, 0.0, 1.0, 64).is_err());
        assert!(NoteEvent::new(60, -0.5, 1.0, 64).is_err());
    }

    #[test]
    fn accessors_and_duration() {
        let note = NoteEvent::new(64, 0.5, 1.25, 90).unwrap();
        assert_eq!(note.pitch(), 64);
        assert_eq!(note.velocity(), 90);
        assert!((note.duration() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn ordering_and_end_time() {
        let notes = vec![
            NoteEvent::new(60, 0.0, 2.0, 80).unwrap(),
            NoteEvent::new(64, 0.0, 1.0, 80).unwrap(),
            NoteEvent::new(67, 0.5, 1.5, 80).unwrap(),
        ];
        assert!(is_time_ordered(&notes));
        assert_eq!(end_time(&notes), 2.0);
        assert_eq!(end_time(&[]), 0.0);
    }

    #[test]
    fn deserialization_validates() {
        let ok: NoteEvent =
            serde_json::from_str(r#"{"pitch":60,"start":0.0,"end":0.5,"velocity":70}"#).unwrap();
        assert_eq!(ok.pitch(), 60);
        let bad = serde_json::from_str::<NoteEvent>(
            r#"{"pitch":60,"start":1.0,"end":0.5,"velocity":70}"#,
        );
        assert!(bad.is_err());
    }
}
