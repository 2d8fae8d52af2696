// Note sequence generation for one melodic part.
//
// Walks a clock forward from 0.0, asking the event source for a pitch,
// duration and step at each position:
//
//   1. request a choice (retrying up to `max_attempts` on failure or an
//      out-of-domain value),
//   2. resolve the pitch: with the scale locked, snap to the nearest scale
//      member inside the pitch range; otherwise clip to the range,
//   3. quantize onset and duration to the grid if requested,
//   4. sample a velocity and emit the note at the current clock,
//   5. advance the clock by the step.
//
// Onsets are non-decreasing because steps are positive and rounding to a
// grid is monotone. Exactly `count` notes are produced unless an error or
// cancellation stops the run, in which case nothing is returned.

use cadenza_prng::SeqRng;

use crate::cancel::CancelToken;
use crate::constraint::{ConstraintModel, MIDI_MAX};
use crate::error::{MusicError, Result};
use crate::note::NoteEvent;
use crate::source::{EventChoice, EventContext, EventSource, SourceError};

/// Slack allowed when checking a source's duration and step against the
/// tempo bounds, to absorb float rounding in the source.
const BOUND_EPSILON: f64 = 1e-9;

/// Tuning for the note sequence generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Inclusive velocity bounds for sampled velocities.
    pub velocity_min: u8,
    pub velocity_max: u8,
    /// Grid size in seconds used when quantizing. Default is a sixteenth
    /// note at 120 BPM.
    pub quantize_grid: f64,
    /// Attempts per note before the run is aborted.
    pub max_attempts: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            velocity_min: 60,
            velocity_max: 99,
            quantize_grid: 0.125,
            max_attempts: 3,
        }
    }
}

impl GeneratorConfig {
    /// Pull out-of-range settings back to usable values.
    fn normalized(mut self) -> Self {
        self.velocity_min = self.velocity_min.clamp(1, MIDI_MAX);
        self.velocity_max = self.velocity_max.clamp(1, MIDI_MAX);
        if self.velocity_min > self.velocity_max {
            std::mem::swap(&mut self.velocity_min, &mut self.velocity_max);
        }
        if !self.quantize_grid.is_finite() || self.quantize_grid <= 0.0 {
            self.quantize_grid = GeneratorConfig::default().quantize_grid;
        }
        self.max_attempts = self.max_attempts.max(1);
        self
    }
}

/// Round `seconds` to the nearest multiple of `grid`.
pub fn snap_to_grid(seconds: f64, grid: f64) -> f64 {
    (seconds / grid).round() * grid
}

pub struct NoteSequenceGenerator {
    config: GeneratorConfig,
    rng: SeqRng,
}

impl NoteSequenceGenerator {
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        NoteSequenceGenerator {
            config: config.normalized(),
            rng: SeqRng::new(seed),
        }
    }

    pub fn with_rng(config: GeneratorConfig, rng: SeqRng) -> Self {
        NoteSequenceGenerator {
            config: config.normalized(),
            rng,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate `count` notes under `constraint`.
    pub fn generate(
        &mut self,
        constraint: &ConstraintModel,
        count: usize,
        source: &mut dyn EventSource,
    ) -> Result<Vec<NoteEvent>> {
        self.generate_cancellable(constraint, count, source, &CancelToken::new())
    }

    /// Like `generate`, checking `cancel` before every note.
    pub fn generate_cancellable(
        &mut self,
        constraint: &ConstraintModel,
        count: usize,
        source: &mut dyn EventSource,
        cancel: &CancelToken,
    ) -> Result<Vec<NoteEvent>> {
        let mut notes = Vec::with_capacity(count);
        let mut clock = 0.0;
        let mut previous: Option<u8> = None;

        for index in 0..count {
            cancel.check()?;
            let choice = self.request(constraint, source, index, previous)?;
            let pitch = resolve_pitch(constraint, choice.pitch);

            let (start, duration) = if constraint.quantize_rhythm() {
                let grid = self.config.quantize_grid;
                (
                    snap_to_grid(clock, grid),
                    snap_to_grid(choice.duration, grid).max(grid),
                )
            } else {
                (clock, choice.duration)
            };

            let velocity = self
                .rng
                .range_u8(self.config.velocity_min, self.config.velocity_max + 1);
            notes.push(NoteEvent::new(pitch, start, start + duration, velocity)?);

            previous = Some(pitch);
            clock += choice.step;
        }

        Ok(notes)
    }

    /// Ask the source for a valid choice, retrying up to the configured bound.
    fn request(
        &mut self,
        constraint: &ConstraintModel,
        source: &mut dyn EventSource,
        index: usize,
        previous: Option<u8>,
    ) -> Result<EventChoice> {
        let previous_pitch = if constraint.smooth_melody() {
            previous
        } else {
            None
        };
        let mut last_error = SourceError::Unavailable("no attempt made".into());

        for attempt in 0..self.config.max_attempts {
            let ctx = EventContext {
                constraint,
                previous_pitch,
                position: index,
                attempt,
            };
            match source
                .next_event(&ctx)
                .and_then(|choice| check_domain(constraint, choice))
            {
                Ok(choice) => return Ok(choice),
                Err(err) => {
                    tracing::warn!(
                        note = index,
                        attempt,
                        error = %err,
                        "event source rejected, retrying"
                    );
                    last_error = err;
                }
            }
        }

        Err(MusicError::GenerationAborted {
            note_index: index,
            attempts: self.config.max_attempts,
            cause: last_error,
        })
    }
}

/// Reject choices outside the MIDI pitch domain or the tempo bounds.
/// Values within `BOUND_EPSILON` of a bound are pulled onto it.
fn check_domain(
    constraint: &ConstraintModel,
    choice: EventChoice,
) -> std::result::Result<EventChoice, SourceError> {
    if !(0..=MIDI_MAX as i32).contains(&choice.pitch) {
        return Err(SourceError::OutOfDomain {
            field: "pitch",
            value: choice.pitch as f64,
            min: 0.0,
            max: MIDI_MAX as f64,
        });
    }
    let tempo = constraint.tempo();
    let duration = within_bounds(
        "duration",
        choice.duration,
        tempo.duration_min,
        tempo.duration_max,
    )?;
    let step = within_bounds("step", choice.step, tempo.step_min, tempo.step_max)?;
    Ok(EventChoice {
        pitch: choice.pitch,
        duration,
        step,
    })
}

fn within_bounds(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> std::result::Result<f64, SourceError> {
    if value.is_finite() && value >= min - BOUND_EPSILON && value <= max + BOUND_EPSILON {
        Ok(value.clamp(min, max))
    } else {
        Err(SourceError::OutOfDomain {
            field,
            value,
            min,
            max,
        })
    }
}

/// Map a raw candidate to an admissible pitch.
///
/// Scale-locked: nearest scale member inside the pitch range (ties go down).
/// Otherwise: clipped to the nearest range bound.
pub fn resolve_pitch(constraint: &ConstraintModel, candidate: i32) -> u8 {
    let range = constraint.pitch_range();
    if constraint.use_scale() {
        if let Some(pitch) = constraint.scale().nearest_within(candidate, range) {
            return pitch;
        }
    }
    range.clip(candidate)
}
