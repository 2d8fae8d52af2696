// Generation requests: the externally supplied configuration for one run.
//
// A `GenerationRequest` names a scale and tempo class (by catalog name or
// inline values), a pitch range, rule flags, a seed and temperature, and
// either a single instrument or a roster of parts. It can be built from a
// catalog preset, loaded from JSON, or both: a JSON document with a `preset`
// key starts from that preset and overrides whatever other keys it sets.
//
// `resolve` turns the request into a validated ConstraintModel plus roster.
// Named scales are shifted by whole octaves when none of their pitches fall
// inside the requested range, so a bass preset over E Minor lands in the bass
// register instead of failing validation. Explicit pitch lists are used as
// given and fail validation when none fall in range. `run` then drives the
// whole pipeline through the orchestrator and returns the finished Document.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assembler::Document;
use crate::cancel::{CancelToken, ProgressSink};
use crate::catalog;
use crate::constraint::{ConstraintModel, PitchRange, Role, RuleFlags, Scale, TempoClass};
use crate::error::{MusicError, Result};
use crate::orchestra::Orchestrator;
use crate::part::PartSpec;
use crate::source::RandomEventSource;

/// A scale given by catalog name or as explicit pitches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleChoice {
    Named(String),
    Pitches(Vec<u8>),
}

/// A tempo class given by catalog name or as explicit bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TempoChoice {
    Named(String),
    Bounds(TempoClass),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub scale: ScaleChoice,
    pub tempo: TempoChoice,
    pub pitch_low: u8,
    pub pitch_high: u8,
    pub rules: RuleFlags,
    /// Role and program of the single part generated when there is no roster.
    pub role: Role,
    pub program: u8,
    pub name: Option<String>,
    /// Note count for single-part runs.
    pub notes: usize,
    /// Note (or hit) count per part for orchestrated runs.
    pub notes_per_part: usize,
    pub temperature: f64,
    /// Fixed seed for reproducible output; drawn from the clock if absent.
    pub seed: Option<u64>,
    /// Generate parts on the rayon pool.
    pub parallel: bool,
    /// Append the built-in drum kit to the roster.
    pub drums: bool,
    pub roster: Vec<PartSpec>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        GenerationRequest {
            scale: ScaleChoice::Named(catalog::DEFAULT_SCALE.to_string()),
            tempo: TempoChoice::Named(catalog::DEFAULT_TEMPO.to_string()),
            pitch_low: 48,
            pitch_high: 84,
            rules: RuleFlags::default(),
            role: Role::Melody,
            program: 0,
            name: None,
            notes: 200,
            notes_per_part: 150,
            temperature: 1.0,
            seed: None,
            parallel: false,
            drums: false,
            roster: Vec::new(),
        }
    }
}

impl GenerationRequest {
    /// Start from a catalog preset. Orchestral presets get the default
    /// orchestra plus the drum kit.
    pub fn from_preset(name: &str) -> Result<Self> {
        let preset = catalog::preset(name)
            .ok_or_else(|| MusicError::Config(format!("unknown preset '{name}'")))?;
        Ok(GenerationRequest {
            scale: ScaleChoice::Named(preset.scale.to_string()),
            tempo: TempoChoice::Named(preset.tempo.to_string()),
            pitch_low: preset.pitch_low,
            pitch_high: preset.pitch_high,
            rules: preset.rules,
            role: preset.role,
            program: preset.program,
            name: None,
            notes: preset.notes,
            notes_per_part: preset.notes,
            temperature: preset.temperature,
            drums: preset.orchestra,
            roster: if preset.orchestra {
                catalog::default_orchestra()
            } else {
                Vec::new()
            },
            ..GenerationRequest::default()
        })
    }

    /// Load a request from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Parse a request from JSON. A `preset` key seeds the request from the
    /// catalog before the remaining keys are applied.
    pub fn from_json(data: &str) -> Result<Self> {
        let mut value: serde_json::Value =
            serde_json::from_str(data).map_err(|e| MusicError::Config(e.to_string()))?;

        if let Some(name) = value
            .as_object_mut()
            .and_then(|obj| obj.remove("preset"))
        {
            let name = name
                .as_str()
                .ok_or_else(|| MusicError::Config("preset must be a string".into()))?
                .to_string();
            let mut base = serde_json::to_value(Self::from_preset(&name)?)
                .map_err(|e| MusicError::Config(e.to_string()))?;
            if let (Some(base_obj), Some(overrides)) = (base.as_object_mut(), value.as_object()) {
                for (key, v) in overrides {
                    base_obj.insert(key.clone(), v.clone());
                }
            }
            value = base;
        }

        serde_json::from_value(value).map_err(|e| MusicError::Config(e.to_string()))
    }

    /// The scale for `range`. Named scales move by octaves into the range;
    /// explicit pitches are taken as given.
    pub fn resolve_scale(&self, range: PitchRange) -> Result<Scale> {
        match &self.scale {
            ScaleChoice::Named(name) => catalog::scale(name)
                .map(|scale| scale.fit_to_range(range))
                .ok_or_else(|| MusicError::Config(format!("unknown scale '{name}'"))),
            ScaleChoice::Pitches(pitches) => Ok(Scale::new(pitches.clone())?),
        }
    }

    pub fn resolve_tempo(&self) -> Result<TempoClass> {
        match &self.tempo {
            TempoChoice::Named(name) => catalog::tempo_class(name)
                .ok_or_else(|| MusicError::Config(format!("unknown tempo class '{name}'"))),
            TempoChoice::Bounds(tempo) => {
                tempo.validate()?;
                Ok(*tempo)
            }
        }
    }

    /// The validated constraint model for this request.
    pub fn constraint(&self) -> Result<ConstraintModel> {
        let range = PitchRange::new(self.pitch_low, self.pitch_high)?;
        let scale = self.resolve_scale(range)?;
        let tempo = self.resolve_tempo()?;
        Ok(ConstraintModel::new(
            scale, tempo, range, self.rules, self.role,
        )?)
    }

    /// Parts to orchestrate. Empty means a single-part run.
    pub fn roster(&self) -> Vec<PartSpec> {
        let mut roster = self.roster.clone();
        if self.drums {
            if roster.is_empty() {
                roster.push(self.single_part());
            }
            roster.extend(catalog::drum_kit());
        }
        roster
    }

    pub fn resolve(&self) -> Result<(ConstraintModel, Vec<PartSpec>)> {
        let constraint = self.constraint()?;
        let roster = self.roster();
        for part in &roster {
            part.validate()?;
        }
        Ok((constraint, roster))
    }

    /// The part generated when the roster is empty.
    pub fn single_part(&self) -> PartSpec {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| catalog::program_label(self.program));
        PartSpec::melodic(self.program, name, self.role)
    }

    pub fn seed_or_clock(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        })
    }

    /// Generate the document this request describes.
    pub fn run(&self, cancel: CancelToken, progress: &dyn ProgressSink) -> Result<Document> {
        let (constraint, roster) = self.resolve()?;
        let seed = self.seed_or_clock();
        tracing::info!(
            seed,
            parts = roster.len().max(1),
            parallel = self.parallel,
            "generation request resolved"
        );

        let orchestrator = Orchestrator::new(seed)
            .with_cancel(cancel)
            .with_progress(progress);

        if roster.is_empty() {
            let mut source = RandomEventSource::new(seed).with_temperature(self.temperature);
            return orchestrator.generate_single(
                &self.single_part(),
                &constraint,
                self.notes,
                &mut source,
            );
        }

        if self.parallel {
            let temperature = self.temperature;
            orchestrator.orchestrate_parallel(&roster, &constraint, self.notes_per_part, |i| {
                RandomEventSource::for_part(seed, i, temperature)
            })
        } else {
            let mut source = RandomEventSource::new(seed).with_temperature(self.temperature);
            orchestrator.orchestrate(&roster, &constraint, self.notes_per_part, &mut source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::NoProgress;

    #[test]
    fn default_request_resolves() {
        let (constraint, roster) = GenerationRequest::default().resolve().unwrap();
        assert!(roster.is_empty());
        assert_eq!(constraint.pitch_range().low(), 48);
        assert_eq!(constraint.scale().pitches(), &[60, 62, 64, 65, 67, 69, 71]);
    }

    #[test]
    fn bass_preset_moves_scale_into_register() {
        let request = GenerationRequest::from_preset("Bass Guitar").unwrap();
        let constraint = request.constraint().unwrap();
        assert_eq!(constraint.role(), Role::Bass);
        assert!(!constraint.admissible_pitches().is_empty());
        assert!(constraint.admissible_pitches().iter().all(|&p| (24..=48).contains(&p)));
    }

    #[test]
    fn orchestral_preset_has_orchestra_and_drums() {
        let request = GenerationRequest::from_preset("Symphonic Orchestra").unwrap();
        let roster = request.roster();
        assert_eq!(roster.len(), 9);
        assert_eq!(roster.iter().filter(|p| p.is_percussion).count(), 4);
    }

    #[test]
    fn unknown_names_are_config_errors() {
        assert!(matches!(
            GenerationRequest::from_preset("Polka"),
            Err(MusicError::Config(_))
        ));
        let request = GenerationRequest {
            scale: ScaleChoice::Named("Lydian".into()),
            ..GenerationRequest::default()
        };
        assert!(matches!(request.constraint(), Err(MusicError::Config(_))));
    }

    #[test]
    fn inline_values_are_validated() {
        let json = r#"{
            "scale": [60, 64, 67],
            "tempo": { "step_min": 0.5, "step_max": 0.25, "duration_min": 0.5, "duration_max": 1.0 }
        }"#;
        let request = GenerationRequest::from_json(json).unwrap();
        assert!(matches!(
            request.constraint(),
            Err(MusicError::InvalidConstraint(_))
        ));
    }

    #[test]
    fn inline_scale_outside_range_is_not_transposed() {
        let request = GenerationRequest {
            scale: ScaleChoice::Pitches(vec![60, 64, 67]),
            pitch_low: 24,
            pitch_high: 48,
            ..GenerationRequest::default()
        };
        assert!(matches!(
            request.constraint(),
            Err(MusicError::InvalidConstraint(_))
        ));

        // Pitches inside the range are kept exactly.
        let inside = GenerationRequest {
            scale: ScaleChoice::Pitches(vec![36, 40, 43]),
            ..request
        };
        assert_eq!(inside.constraint().unwrap().scale().pitches(), &[36, 40, 43]);
    }

    #[test]
    fn json_preset_is_overridden_by_keys() {
        let json = r#"{ "preset": "sax solo", "notes": 12, "seed": 5 }"#;
        let request = GenerationRequest::from_json(json).unwrap();
        assert_eq!(request.program, 65);
        assert_eq!(request.notes, 12);
        assert_eq!(request.seed, Some(5));
        assert_eq!(request.scale, ScaleChoice::Named("D Minor".into()));
    }

    #[test]
    fn json_roster_round_trips() {
        let json = r#"{
            "seed": 3,
            "notes_per_part": 16,
            "roster": [
                { "program": 40, "display_name": "Violin", "role": "melody",
                  "is_percussion": false },
                { "program": 0, "display_name": "Kick", "role": "drums", "is_percussion": true,
                  "percussion_palette": [36], "fixed_velocity": 100 }
            ]
        }"#;
        let request = GenerationRequest::from_json(json).unwrap();
        let doc = request.run(CancelToken::new(), &NoProgress).unwrap();
        assert_eq!(doc.len(), 2);
        assert!(doc.tracks()[1].is_percussion());
        assert!(doc.tracks().iter().all(|t| t.notes.len() == 16));
    }

    #[test]
    fn single_part_run_uses_note_count() {
        let request = GenerationRequest {
            notes: 40,
            seed: Some(1),
            ..GenerationRequest::default()
        };
        let doc = request.run(CancelToken::new(), &NoProgress).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.tracks()[0].notes.len(), 40);
        assert_eq!(doc.tracks()[0].part.display_name, "Acoustic Grand Piano");
    }

    #[test]
    fn drums_flag_adds_kit_after_single_part() {
        let request = GenerationRequest {
            drums: true,
            notes_per_part: 10,
            seed: Some(2),
            ..GenerationRequest::default()
        };
        let doc = request.run(CancelToken::new(), &NoProgress).unwrap();
        assert_eq!(doc.len(), 5);
        assert!(!doc.tracks()[0].is_percussion());
        assert!(doc.tracks()[1..].iter().all(|t| t.is_percussion()));
    }

    #[test]
    fn parallel_and_sequential_runs_are_reproducible() {
        for parallel in [false, true] {
            let request = GenerationRequest {
                parallel,
                notes_per_part: 20,
                seed: Some(9),
                ..GenerationRequest::from_preset("Solemn March").unwrap()
            };
            let a = request.run(CancelToken::new(), &NoProgress).unwrap();
            let b = request.run(CancelToken::new(), &NoProgress).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn cancelled_token_stops_run() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let request = GenerationRequest::from_preset("Dramatic Orchestra").unwrap();
        assert!(matches!(
            request.run(cancel, &NoProgress),
            Err(MusicError::Cancelled)
        ));
    }
}
