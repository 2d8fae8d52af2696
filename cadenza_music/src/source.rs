// The event source: the pluggable provider of pitch, duration and step
// choices for melodic generation.
//
// The generator owns the control flow (timing, scale resolution, range
// clipping, quantization, retries); the source only proposes values. Any
// policy can sit behind the trait: uniform sampling, weighted sampling, or
// an external model. The generator never looks behind it.
//
// `RandomEventSource` is the built-in policy. It samples from the constraint's
// admissible pitches with weights shaped by temperature:
// - with a previous pitch (smoothing requested), weight falls off
//   exponentially with the interval from that pitch, and leaps wider than
//   `max_leap` are excluded while any closer pitch exists;
// - without one, weight falls off with distance from the role's preferred
//   register, so bass parts sit low and solos sit high.
// Higher temperature flattens both curves toward uniform sampling.

use cadenza_prng::SeqRng;
use thiserror::Error;

use crate::constraint::ConstraintModel;

/// Everything a source may consult when proposing the next event.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub constraint: &'a ConstraintModel,
    /// Pitch of the previous note. Only present when the constraint asks for
    /// smooth melody and at least one note has been emitted.
    pub previous_pitch: Option<u8>,
    /// Index of the note being generated within its part.
    pub position: usize,
    /// Zero-based retry counter for this position.
    pub attempt: u32,
}

/// A proposed event. `pitch` is a raw candidate and may fall outside the
/// constraint's range; the generator resolves it. Duration and step are
/// seconds and must lie inside the constraint's tempo bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventChoice {
    pub pitch: i32,
    pub duration: f64,
    pub step: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("event source unavailable: {0}")]
    Unavailable(String),
    #[error("event source returned {field} = {value}, outside {min}..={max}")]
    OutOfDomain {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Supplies per-note choices to the note sequence generator.
///
/// Sources are not reentrant: `next_event` takes `&mut self`, so one source
/// serves one part at a time. Parallel orchestration builds a fresh source
/// per part instead of sharing one.
pub trait EventSource {
    fn next_event(&mut self, ctx: &EventContext<'_>) -> Result<EventChoice, SourceError>;
}

impl<S: EventSource + ?Sized> EventSource for &mut S {
    fn next_event(&mut self, ctx: &EventContext<'_>) -> Result<EventChoice, SourceError> {
        (**self).next_event(ctx)
    }
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn next_event(&mut self, ctx: &EventContext<'_>) -> Result<EventChoice, SourceError> {
        (**self).next_event(ctx)
    }
}

/// Lowest temperature accepted; anything colder is raised to this.
pub const MIN_TEMPERATURE: f64 = 0.05;

/// Semitone scale of the smoothing fall-off at temperature 1.0.
const SMOOTH_FALLOFF: f64 = 2.0;

/// Register scale (fraction of the range) of the role fall-off at
/// temperature 1.0.
const REGISTER_FALLOFF: f64 = 0.25;

/// Temperature-weighted random sampling over the admissible pitches.
#[derive(Debug, Clone)]
pub struct RandomEventSource {
    rng: SeqRng,
    temperature: f64,
    max_leap: u8,
}

impl RandomEventSource {
    pub fn new(seed: u64) -> Self {
        RandomEventSource {
            rng: SeqRng::new(seed),
            temperature: 1.0,
            max_leap: 7,
        }
    }

    /// Independent source for part `index` of an orchestration seeded with
    /// `seed`. Used as the per-part factory for parallel runs.
    pub fn for_part(seed: u64, index: usize, temperature: f64) -> Self {
        RandomEventSource {
            rng: SeqRng::new(seed).fork(0x5eed_0000 + index as u64),
            ..RandomEventSource::new(seed)
        }
        .with_temperature(temperature)
    }

    /// Non-finite or too-cold temperatures are raised to `MIN_TEMPERATURE`.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = if temperature.is_finite() {
            temperature.max(MIN_TEMPERATURE)
        } else {
            MIN_TEMPERATURE
        };
        self
    }

    /// Widest interval (semitones) preferred when smoothing.
    pub fn with_max_leap(mut self, semitones: u8) -> Self {
        self.max_leap = semitones;
        self
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    fn pitch_weights(&self, candidates: &[u8], ctx: &EventContext<'_>) -> Vec<f64> {
        match ctx.previous_pitch {
            Some(prev) => {
                let near = candidates
                    .iter()
                    .any(|&p| (p as i32 - prev as i32).unsigned_abs() <= self.max_leap as u32);
                candidates
                    .iter()
                    .map(|&p| {
                        let leap = (p as i32 - prev as i32).unsigned_abs();
                        if near && leap > self.max_leap as u32 {
                            0.0
                        } else {
                            (-(leap as f64) / (SMOOTH_FALLOFF * self.temperature)).exp()
                        }
                    })
                    .collect()
            }
            None => {
                let range = ctx.constraint.pitch_range();
                let center = ctx.constraint.role().register_center();
                candidates
                    .iter()
                    .map(|&p| {
                        let dist = (range.position(p) - center).abs();
                        (-dist / (REGISTER_FALLOFF * self.temperature)).exp()
                    })
                    .collect()
            }
        }
    }
}

impl EventSource for RandomEventSource {
    fn next_event(&mut self, ctx: &EventContext<'_>) -> Result<EventChoice, SourceError> {
        let candidates = ctx.constraint.admissible_pitches();
        let weights = self.pitch_weights(&candidates, ctx);
        let index = match self.rng.weighted_index(&weights) {
            Some(i) => i,
            None => self.rng.range_usize(0, candidates.len().max(1)),
        };
        let pitch = candidates
            .get(index)
            .copied()
            .ok_or_else(|| SourceError::Unavailable("no admissible pitch".into()))?;

        let tempo = ctx.constraint.tempo();
        let duration = self.rng.range_f64(tempo.duration_min, tempo.duration_max);
        let step = self.rng.range_f64(tempo.step_min, tempo.step_max);

        Ok(EventChoice {
            pitch: pitch as i32,
            duration,
            step,
        })
    }
}
