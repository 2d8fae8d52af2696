// Percussion pattern generation.
//
// Drum parts are generated algorithmically, without the event source: each
// hit picks a drum voice uniformly from a small fixed palette, jitters the
// base velocity symmetrically, and advances the clock by one of a few grid
// fractions of a reference beat. Low entropy and high repetition is the
// intended character of the output.

use cadenza_prng::SeqRng;

use crate::cancel::CancelToken;
use crate::constraint::MIDI_MAX;
use crate::error::{MusicError, Result};
use crate::note::NoteEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct DrumConfig {
    /// Length of every hit in seconds.
    pub hit_length: f64,
    /// Reference beat in seconds.
    pub beat_seconds: f64,
    /// Steps between hits, as fractions of the reference beat.
    pub grid_fractions: Vec<f64>,
    /// Velocity jitter; each hit gets `base ± jitter`, clamped to 1..=127.
    pub velocity_jitter: u32,
    /// Base velocity for parts that do not fix one.
    pub default_velocity: u8,
}

impl Default for DrumConfig {
    fn default() -> Self {
        DrumConfig {
            hit_length: 0.5,
            beat_seconds: 1.0,
            grid_fractions: vec![0.25, 0.5, 1.0],
            velocity_jitter: 10,
            default_velocity: 100,
        }
    }
}

impl DrumConfig {
    fn normalized(mut self) -> Self {
        let defaults = DrumConfig::default();
        if !self.hit_length.is_finite() || self.hit_length <= 0.0 {
            self.hit_length = defaults.hit_length;
        }
        if !self.beat_seconds.is_finite() || self.beat_seconds <= 0.0 {
            self.beat_seconds = defaults.beat_seconds;
        }
        self.grid_fractions.retain(|f| f.is_finite() && *f > 0.0);
        if self.grid_fractions.is_empty() {
            self.grid_fractions = defaults.grid_fractions;
        }
        self.default_velocity = self.default_velocity.clamp(1, MIDI_MAX);
        self
    }
}

pub struct DrumPatternGenerator {
    config: DrumConfig,
    rng: SeqRng,
}

impl DrumPatternGenerator {
    pub fn new(config: DrumConfig, seed: u64) -> Self {
        DrumPatternGenerator {
            config: config.normalized(),
            rng: SeqRng::new(seed),
        }
    }

    pub fn with_rng(config: DrumConfig, rng: SeqRng) -> Self {
        DrumPatternGenerator {
            config: config.normalized(),
            rng,
        }
    }

    pub fn config(&self) -> &DrumConfig {
        &self.config
    }

    /// Generate `hit_count` hits drawn from `palette`.
    pub fn generate(
        &mut self,
        palette: &[u8],
        base_velocity: u8,
        hit_count: usize,
    ) -> Result<Vec<NoteEvent>> {
        self.generate_cancellable(palette, base_velocity, hit_count, &CancelToken::new())
    }

    pub fn generate_cancellable(
        &mut self,
        palette: &[u8],
        base_velocity: u8,
        hit_count: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<NoteEvent>> {
        if palette.is_empty() || palette.iter().any(|&p| p > MIDI_MAX) {
            return Err(MusicError::InvalidPalette);
        }

        let mut hits = Vec::with_capacity(hit_count);
        let mut clock = 0.0;
        for _ in 0..hit_count {
            cancel.check()?;
            let pitch = *self.rng.choose(palette).ok_or(MusicError::InvalidPalette)?;
            let jitter = self.rng.jitter(self.config.velocity_jitter);
            let velocity = (base_velocity as i32 + jitter).clamp(1, MIDI_MAX as i32) as u8;
            hits.push(NoteEvent::new(
                pitch,
                clock,
                clock + self.config.hit_length,
                velocity,
            )?);

            let fraction = self
                .rng
                .choose(&self.config.grid_fractions)
                .copied()
                .unwrap_or(1.0);
            clock += fraction * self.config.beat_seconds;
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::is_time_ordered;

    #[test]
    fn single_voice_palette_repeats_pitch() {
        let mut drums = DrumPatternGenerator::new(DrumConfig::default(), 1);
        let hits = drums.generate(&[36], 100, 64).unwrap();
        assert_eq!(hits.len(), 64);
        assert!(hits.iter().all(|h| h.pitch() == 36));
    }

    #[test]
    fn empty_palette_rejected() {
        let mut drums = DrumPatternGenerator::new(DrumConfig::default(), 1);
        assert!(matches!(
            drums.generate(&[], 100, 4),
            Err(MusicError::InvalidPalette)
        ));
        assert!(matches!(
            drums.generate(&[36, 200], 100, 4),
            Err(MusicError::InvalidPalette)
        ));
    }

    #[test]
    fn velocity_jitter_stays_symmetric_and_clamped() {
        let mut drums = DrumPatternGenerator::new(DrumConfig::default(), 2);
        for h in drums.generate(&[38, 40], 100, 500).unwrap() {
            assert!((90..=110).contains(&h.velocity()));
        }
        for h in drums.generate(&[42], 125, 500).unwrap() {
            assert!((115..=127).contains(&h.velocity()));
        }
        for h in drums.generate(&[42], 3, 500).unwrap() {
            assert!((1..=13).contains(&h.velocity()));
        }
    }

    #[test]
    fn steps_come_from_the_grid() {
        let mut drums = DrumPatternGenerator::new(DrumConfig::default(), 3);
        let hits = drums.generate(&[36, 38], 100, 200).unwrap();
        assert!(is_time_ordered(&hits));
        for pair in hits.windows(2) {
            let step = pair[1].start() - pair[0].start();
            assert!(
                [0.25, 0.5, 1.0].iter().any(|g| (step - g).abs() < 1e-9),
                "unexpected step {step}"
            );
        }
        assert!(hits.iter().all(|h| (h.duration() - 0.5).abs() < 1e-12));
    }

    #[test]
    fn palette_voices_all_appear() {
        let mut drums = DrumPatternGenerator::new(DrumConfig::default(), 4);
        let hits = drums.generate(&[49, 57], 110, 200).unwrap();
        assert!(hits.iter().any(|h| h.pitch() == 49));
        assert!(hits.iter().any(|h| h.pitch() == 57));
    }

    #[test]
    fn degenerate_config_falls_back_to_defaults() {
        let drums = DrumPatternGenerator::new(
            DrumConfig {
                hit_length: 0.0,
                beat_seconds: f64::NAN,
                grid_fractions: vec![-1.0],
                velocity_jitter: 0,
                default_velocity: 0,
            },
            5,
        );
        let config = drums.config();
        assert_eq!(config.hit_length, 0.5);
        assert_eq!(config.beat_seconds, 1.0);
        assert_eq!(config.grid_fractions, vec![0.25, 0.5, 1.0]);
        assert_eq!(config.default_velocity, 1);
    }
}
