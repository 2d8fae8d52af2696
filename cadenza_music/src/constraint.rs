// Generation constraints: scale, tempo class, pitch range, rule flags, role.
//
// A `ConstraintModel` is the immutable description of one generation request.
// It is validated once at construction and then only read. The orchestrator
// derives per-part variants with `with_role`, which copies the model and
// swaps the role; nothing mutates a model after it is built.
//
// Scales are absolute pitch sets (MIDI note numbers), not pitch-class sets:
// "C Major" in the catalog is C4..B4. `Scale::fit_to_range` shifts a scale by
// whole octaves when a request's register does not overlap it.

use serde::{Deserialize, Serialize};

use crate::error::ConstraintError;

/// Highest valid MIDI pitch, velocity and program number.
pub const MIDI_MAX: u8 = 127;

/// An ordered, duplicate-free set of absolute MIDI pitches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Scale {
    pitches: Vec<u8>,
}

impl Scale {
    /// Build a scale from any pitch list. Pitches are sorted and deduplicated.
    pub fn new(pitches: impl Into<Vec<u8>>) -> Result<Self, ConstraintError> {
        let mut pitches = pitches.into();
        if pitches.is_empty() {
            return Err(ConstraintError::EmptyScale);
        }
        if let Some(&bad) = pitches.iter().find(|&&p| p > MIDI_MAX) {
            return Err(ConstraintError::PitchOutOfRange(bad as i32));
        }
        pitches.sort_unstable();
        pitches.dedup();
        Ok(Scale { pitches })
    }

    pub fn pitches(&self) -> &[u8] {
        &self.pitches
    }

    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.pitches.binary_search(&pitch).is_ok()
    }

    /// Scale members inside `range`, ascending.
    pub fn within(&self, range: PitchRange) -> Vec<u8> {
        self.pitches
            .iter()
            .copied()
            .filter(|&p| range.contains(p))
            .collect()
    }

    /// The member inside `range` closest to `candidate`. Ties go to the lower
    /// pitch. `None` if no member lies in the range.
    pub fn nearest_within(&self, candidate: i32, range: PitchRange) -> Option<u8> {
        let mut best: Option<(u8, i32)> = None;
        for &p in self.pitches.iter().filter(|&&p| range.contains(p)) {
            let dist = (p as i32 - candidate).abs();
            if best.is_none_or(|(_, d)| dist < d) {
                best = Some((p, dist));
            }
        }
        best.map(|(p, _)| p)
    }

    /// Shift every pitch by `semitones`.
    pub fn transposed(&self, semitones: i32) -> Result<Scale, ConstraintError> {
        let shifted = self
            .pitches
            .iter()
            .map(|&p| {
                let q = p as i32 + semitones;
                if (0..=MIDI_MAX as i32).contains(&q) {
                    Ok(q as u8)
                } else {
                    Err(ConstraintError::PitchOutOfRange(q))
                }
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Scale::new(shifted)
    }

    /// Move the scale by whole octaves so it overlaps `range`.
    ///
    /// Returns the scale unchanged if any member already lies inside the
    /// range. Otherwise picks the octave shift that puts the most members in
    /// range, preferring the smallest shift on ties. If no shift helps, the
    /// scale is returned unchanged and constraint validation will reject it.
    pub fn fit_to_range(&self, range: PitchRange) -> Scale {
        if !self.within(range).is_empty() {
            return self.clone();
        }
        let mut best: Option<(usize, i32, Scale)> = None;
        for octaves in 1..=10i32 {
            for shift in [-12 * octaves, 12 * octaves] {
                let Ok(candidate) = self.transposed(shift) else {
                    continue;
                };
                let hits = candidate.within(range).len();
                if hits > 0 && best.as_ref().is_none_or(|(h, _, _)| hits > *h) {
                    best = Some((hits, shift, candidate));
                }
            }
        }
        best.map(|(_, _, s)| s).unwrap_or_else(|| self.clone())
    }
}

impl TryFrom<Vec<u8>> for Scale {
    type Error = ConstraintError;

    fn try_from(pitches: Vec<u8>) -> Result<Self, Self::Error> {
        Scale::new(pitches)
    }
}

impl From<Scale> for Vec<u8> {
    fn from(scale: Scale) -> Self {
        scale.pitches
    }
}

/// Inclusive pitch bounds, `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u8, u8)", into = "(u8, u8)")]
pub struct PitchRange {
    low: u8,
    high: u8,
}

impl PitchRange {
    pub fn new(low: u8, high: u8) -> Result<Self, ConstraintError> {
        if high > MIDI_MAX {
            return Err(ConstraintError::PitchOutOfRange(high as i32));
        }
        if low > high {
            return Err(ConstraintError::InvertedPitchRange { low, high });
        }
        Ok(PitchRange { low, high })
    }

    /// The full MIDI range 0..=127.
    pub fn full() -> Self {
        PitchRange {
            low: 0,
            high: MIDI_MAX,
        }
    }

    pub fn low(&self) -> u8 {
        self.low
    }

    pub fn high(&self) -> u8 {
        self.high
    }

    pub fn contains(&self, pitch: u8) -> bool {
        (self.low..=self.high).contains(&pitch)
    }

    /// Clip a candidate to the nearest bound.
    pub fn clip(&self, candidate: i32) -> u8 {
        candidate.clamp(self.low as i32, self.high as i32) as u8
    }

    /// Relative position of `pitch` in the range, 0.0 at `low`, 1.0 at `high`.
    pub fn position(&self, pitch: u8) -> f64 {
        if self.high == self.low {
            return 0.5;
        }
        (pitch as f64 - self.low as f64) / (self.high as f64 - self.low as f64)
    }
}

impl TryFrom<(u8, u8)> for PitchRange {
    type Error = ConstraintError;

    fn try_from((low, high): (u8, u8)) -> Result<Self, Self::Error> {
        PitchRange::new(low, high)
    }
}

impl From<PitchRange> for (u8, u8) {
    fn from(range: PitchRange) -> Self {
        (range.low, range.high)
    }
}

/// Timing bounds in seconds: inter-onset step and note duration.
///
/// The two ranges are independent and may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoClass {
    pub step_min: f64,
    pub step_max: f64,
    pub duration_min: f64,
    pub duration_max: f64,
}

impl TempoClass {
    pub fn new(
        step_min: f64,
        step_max: f64,
        duration_min: f64,
        duration_max: f64,
    ) -> Result<Self, ConstraintError> {
        let tempo = TempoClass {
            step_min,
            step_max,
            duration_min,
            duration_max,
        };
        tempo.validate()?;
        Ok(tempo)
    }

    pub fn validate(&self) -> Result<(), ConstraintError> {
        for (name, value) in [
            ("step_min", self.step_min),
            ("step_max", self.step_max),
            ("duration_min", self.duration_min),
            ("duration_max", self.duration_max),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConstraintError::NonPositiveTempo { name, value });
            }
        }
        if self.step_min > self.step_max {
            return Err(ConstraintError::InvertedTempo {
                name: "step",
                min: self.step_min,
                max: self.step_max,
            });
        }
        if self.duration_min > self.duration_max {
            return Err(ConstraintError::InvertedTempo {
                name: "duration",
                min: self.duration_min,
                max: self.duration_max,
            });
        }
        Ok(())
    }
}

/// What a part does in the arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Melody,
    Harmony,
    Chords,
    Bass,
    Rhythm,
    Solo,
    Drums,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Melody,
        Role::Harmony,
        Role::Chords,
        Role::Bass,
        Role::Rhythm,
        Role::Solo,
        Role::Drums,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Melody => "melody",
            Role::Harmony => "harmony",
            Role::Chords => "chords",
            Role::Bass => "bass",
            Role::Rhythm => "rhythm",
            Role::Solo => "solo",
            Role::Drums => "drums",
        }
    }

    pub fn parse(name: &str) -> Option<Role> {
        let name = name.trim().to_lowercase();
        Role::ALL.into_iter().find(|r| r.name() == name)
    }

    /// Preferred register as a fraction of the pitch range (0 = low bound).
    pub fn register_center(self) -> f64 {
        match self {
            Role::Bass => 0.15,
            Role::Rhythm => 0.35,
            Role::Harmony | Role::Chords | Role::Drums => 0.5,
            Role::Melody => 0.65,
            Role::Solo => 0.8,
        }
    }
}

/// Rule toggles applied during generation. All on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleFlags {
    /// Every pitch must be a member of the scale.
    pub use_scale: bool,
    /// Expose the previous pitch to the event source so it can limit leaps.
    pub smooth_melody: bool,
    /// Round onsets and durations to the generator's grid.
    pub quantize_rhythm: bool,
}

impl Default for RuleFlags {
    fn default() -> Self {
        RuleFlags {
            use_scale: true,
            smooth_melody: true,
            quantize_rhythm: true,
        }
    }
}

/// A validated, immutable generation request for one part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintModel {
    scale: Scale,
    tempo: TempoClass,
    pitch_range: PitchRange,
    rules: RuleFlags,
    role: Role,
}

impl ConstraintModel {
    pub fn new(
        scale: Scale,
        tempo: TempoClass,
        pitch_range: PitchRange,
        rules: RuleFlags,
        role: Role,
    ) -> Result<Self, ConstraintError> {
        if scale.is_empty() {
            return Err(ConstraintError::EmptyScale);
        }
        tempo.validate()?;
        if rules.use_scale && scale.within(pitch_range).is_empty() {
            return Err(ConstraintError::ScaleOutsideRange {
                low: pitch_range.low(),
                high: pitch_range.high(),
            });
        }
        Ok(ConstraintModel {
            scale,
            tempo,
            pitch_range,
            rules,
            role,
        })
    }

    /// Copy of this model with a different role. Role does not take part in
    /// validation, so this cannot fail.
    pub fn with_role(&self, role: Role) -> ConstraintModel {
        ConstraintModel {
            role,
            ..self.clone()
        }
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    pub fn tempo(&self) -> &TempoClass {
        &self.tempo
    }

    pub fn pitch_range(&self) -> PitchRange {
        self.pitch_range
    }

    pub fn rules(&self) -> RuleFlags {
        self.rules
    }

    pub fn use_scale(&self) -> bool {
        self.rules.use_scale
    }

    pub fn smooth_melody(&self) -> bool {
        self.rules.smooth_melody
    }

    pub fn quantize_rhythm(&self) -> bool {
        self.rules.quantize_rhythm
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Pitches the generator may emit: scale members in range when the
    /// scale is locked, otherwise every pitch in range.
    pub fn admissible_pitches(&self) -> Vec<u8> {
        if self.rules.use_scale {
            self.scale.within(self.pitch_range)
        } else {
            (self.pitch_range.low()..=self.pitch_range.high()).collect()
        }
    }
}
