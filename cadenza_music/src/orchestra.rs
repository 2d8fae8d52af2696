// Orchestration: generating every part of a roster into one document.
//
// Each roster entry is generated independently. Percussion parts go to the
// drum generator with their palette and velocity; melodic parts go to the
// note sequence generator under the shared constraint template with the
// part's role swapped in. Every part's clock starts at zero.
//
// Part `i` always gets generator randomness forked from the orchestration
// seed with stream `i`, so the same roster and seed yield the same notes
// whether parts run in order or on the rayon pool (given per-part sources).
//
// Failure policy: the first failing part fails the whole run, wrapped as
// `OrchestrationFailed` with the part's index and name. Cancellation is
// checked before each part (and by the generators before each note) and
// surfaces as plain `Cancelled`. Neither path returns a partial document.

use cadenza_prng::SeqRng;
use rayon::prelude::*;

use crate::assembler::{self, Document};
use crate::cancel::{CancelToken, NoProgress, Progress, ProgressSink, ProgressStage};
use crate::constraint::ConstraintModel;
use crate::drums::{DrumConfig, DrumPatternGenerator};
use crate::error::{MusicError, Result};
use crate::generator::{GeneratorConfig, NoteSequenceGenerator};
use crate::note::NoteEvent;
use crate::part::PartSpec;
use crate::source::EventSource;

pub struct Orchestrator<'a> {
    seed: u64,
    generator_config: GeneratorConfig,
    drum_config: DrumConfig,
    cancel: CancelToken,
    progress: &'a dyn ProgressSink,
}

impl Orchestrator<'static> {
    pub fn new(seed: u64) -> Self {
        Orchestrator {
            seed,
            generator_config: GeneratorConfig::default(),
            drum_config: DrumConfig::default(),
            cancel: CancelToken::new(),
            progress: &NoProgress,
        }
    }
}

impl<'a> Orchestrator<'a> {
    pub fn with_generator_config(mut self, config: GeneratorConfig) -> Self {
        self.generator_config = config;
        self
    }

    pub fn with_drum_config(mut self, config: DrumConfig) -> Self {
        self.drum_config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress<'b>(self, progress: &'b dyn ProgressSink) -> Orchestrator<'b> {
        Orchestrator {
            seed: self.seed,
            generator_config: self.generator_config,
            drum_config: self.drum_config,
            cancel: self.cancel,
            progress,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Generate every part in roster order, sharing one event source.
    pub fn orchestrate(
        &self,
        roster: &[PartSpec],
        template: &ConstraintModel,
        notes_per_part: usize,
        source: &mut dyn EventSource,
    ) -> Result<Document> {
        if roster.is_empty() {
            return Err(MusicError::EmptyDocument);
        }
        tracing::info!(parts = roster.len(), notes_per_part, "orchestration started");

        let mut generated = Vec::with_capacity(roster.len());
        for (index, part) in roster.iter().enumerate() {
            self.cancel.check()?;
            let notes = self.run_part(index, roster.len(), part, template, notes_per_part, source)?;
            generated.push((part.clone(), notes));
        }

        self.finish(generated)
    }

    /// Generate parts concurrently on the rayon pool.
    ///
    /// `make_source(i)` builds the event source for part `i`; sources are
    /// never shared between threads. Output order is roster order. If several
    /// parts fail, which failure is reported is unspecified.
    pub fn orchestrate_parallel<S, F>(
        &self,
        roster: &[PartSpec],
        template: &ConstraintModel,
        notes_per_part: usize,
        make_source: F,
    ) -> Result<Document>
    where
        S: EventSource,
        F: Fn(usize) -> S + Sync,
    {
        if roster.is_empty() {
            return Err(MusicError::EmptyDocument);
        }
        tracing::info!(
            parts = roster.len(),
            notes_per_part,
            threads = rayon::current_num_threads(),
            "parallel orchestration started"
        );

        let parts: Vec<Vec<NoteEvent>> = roster
            .par_iter()
            .enumerate()
            .map(|(index, part)| {
                self.cancel.check()?;
                let mut source = make_source(index);
                self.run_part(index, roster.len(), part, template, notes_per_part, &mut source)
            })
            .collect::<Result<Vec<_>>>()?;

        self.finish(roster.iter().cloned().zip(parts).collect())
    }

    /// Generate one part straight into a one-track document, with no
    /// template: `constraint` is used as given.
    pub fn generate_single(
        &self,
        part: &PartSpec,
        constraint: &ConstraintModel,
        count: usize,
        source: &mut dyn EventSource,
    ) -> Result<Document> {
        part.validate()?;
        let notes = if part.is_percussion {
            self.drum_part(0, part, count)?
        } else {
            let mut generator = NoteSequenceGenerator::with_rng(
                self.part_generator_config(part),
                self.part_rng(0),
            );
            generator.generate_cancellable(constraint, count, source, &self.cancel)?
        };
        assembler::assemble(vec![(part.clone(), notes)])
    }

    fn finish(&self, generated: Vec<(PartSpec, Vec<NoteEvent>)>) -> Result<Document> {
        self.cancel.check()?;
        let document = assembler::assemble(generated)?;
        let summary = document.summary();
        tracing::info!(
            tracks = summary.tracks,
            notes = summary.notes,
            seconds = summary.duration_seconds,
            "orchestration finished"
        );
        Ok(document)
    }

    /// Generate one roster entry, reporting progress around it.
    fn run_part(
        &self,
        index: usize,
        part_count: usize,
        part: &PartSpec,
        template: &ConstraintModel,
        notes_per_part: usize,
        source: &mut dyn EventSource,
    ) -> Result<Vec<NoteEvent>> {
        self.report(index, part_count, part, ProgressStage::Started);
        let notes = self
            .generate_part(index, part, template, notes_per_part, source)
            .map_err(|err| wrap_part_error(index, part, err))?;
        tracing::debug!(
            part = index,
            name = %part.display_name,
            notes = notes.len(),
            percussion = part.is_percussion,
            "part generated"
        );
        self.report(index, part_count, part, ProgressStage::Finished);
        Ok(notes)
    }

    fn generate_part(
        &self,
        index: usize,
        part: &PartSpec,
        template: &ConstraintModel,
        notes_per_part: usize,
        source: &mut dyn EventSource,
    ) -> Result<Vec<NoteEvent>> {
        part.validate()?;
        if part.is_percussion {
            return self.drum_part(index, part, notes_per_part);
        }
        let constraint = template.with_role(part.role);
        let mut generator =
            NoteSequenceGenerator::with_rng(self.part_generator_config(part), self.part_rng(index));
        generator.generate_cancellable(&constraint, notes_per_part, source, &self.cancel)
    }

    fn drum_part(&self, index: usize, part: &PartSpec, hits: usize) -> Result<Vec<NoteEvent>> {
        let palette = part.percussion_palette.as_deref().unwrap_or(&[]);
        let velocity = part
            .fixed_velocity
            .unwrap_or(self.drum_config.default_velocity);
        let mut drums =
            DrumPatternGenerator::with_rng(self.drum_config.clone(), self.part_rng(index));
        drums.generate_cancellable(palette, velocity, hits, &self.cancel)
    }

    /// Generator config for a melodic part; a fixed velocity pins the range.
    fn part_generator_config(&self, part: &PartSpec) -> GeneratorConfig {
        let mut config = self.generator_config.clone();
        if let Some(v) = part.fixed_velocity {
            config.velocity_min = v;
            config.velocity_max = v;
        }
        config
    }

    fn part_rng(&self, index: usize) -> SeqRng {
        SeqRng::new(self.seed).fork(index as u64)
    }

    fn report(&self, index: usize, part_count: usize, part: &PartSpec, stage: ProgressStage) {
        self.progress.report(Progress {
            part_index: index,
            part_count,
            part_name: part.display_name.clone(),
            stage,
        });
    }
}

fn wrap_part_error(index: usize, part: &PartSpec, err: MusicError) -> MusicError {
    match err {
        MusicError::Cancelled => MusicError::Cancelled,
        other => {
            tracing::warn!(part = index, name = %part.display_name, error = %other, "part failed");
            MusicError::OrchestrationFailed {
                part_index: index,
                part_name: part.display_name.clone(),
                source: Box::new(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{PitchRange, Role, RuleFlags, Scale, TempoClass};
    use crate::source::{EventChoice, EventContext, RandomEventSource, SourceError};
    use std::sync::Mutex;

    fn template() -> ConstraintModel {
        ConstraintModel::new(
            Scale::new(vec![60, 62, 64, 65, 67, 69, 71]).unwrap(),
            TempoClass::new(0.4, 1.2, 0.6, 2.0).unwrap(),
            PitchRange::new(48, 84).unwrap(),
            RuleFlags::default(),
            Role::Melody,
        )
        .unwrap()
    }

    fn roster() -> Vec<PartSpec> {
        vec![
            PartSpec::melodic(48, "Strings", Role::Harmony),
            PartSpec::melodic(0, "Piano", Role::Chords),
            PartSpec::melodic(33, "Bass", Role::Bass),
            PartSpec::percussion("Kick", vec![36], Some(100)),
        ]
    }

    /// Records the role it was asked about, then defers to a random source.
    struct RoleSpy {
        inner: RandomEventSource,
        roles: Vec<Role>,
    }

    impl EventSource for RoleSpy {
        fn next_event(
            &mut self,
            ctx: &EventContext<'_>,
        ) -> std::result::Result<EventChoice, SourceError> {
            if ctx.position == 0 {
                self.roles.push(ctx.constraint.role());
            }
            self.inner.next_event(ctx)
        }
    }

    #[test]
    fn roster_order_and_percussion_preserved() {
        let doc = Orchestrator::new(1)
            .orchestrate(&roster(), &template(), 50, &mut RandomEventSource::new(1))
            .unwrap();
        assert_eq!(doc.len(), 4);
        let names: Vec<&str> = doc
            .tracks()
            .iter()
            .map(|t| t.part.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Strings", "Piano", "Bass", "Kick"]);
        let drums = &doc.tracks()[3];
        assert!(drums.is_percussion());
        assert!(drums.notes.iter().all(|n| n.pitch() == 36));
        for track in doc.tracks() {
            assert_eq!(track.notes.len(), 50);
            assert_eq!(track.notes[0].start(), 0.0);
        }
    }

    #[test]
    fn each_part_sees_its_own_role() {
        let mut spy = RoleSpy {
            inner: RandomEventSource::new(2),
            roles: Vec::new(),
        };
        Orchestrator::new(2)
            .orchestrate(&roster(), &template(), 5, &mut spy)
            .unwrap();
        // The drum part never consults the source.
        assert_eq!(spy.roles, vec![Role::Harmony, Role::Chords, Role::Bass]);
    }

    #[test]
    fn failing_part_fails_whole_orchestration() {
        let mut parts = roster();
        parts.insert(1, PartSpec::percussion("Broken", Vec::<u8>::new(), None));
        let err = Orchestrator::new(3)
            .orchestrate(&parts, &template(), 10, &mut RandomEventSource::new(3))
            .unwrap_err();
        match err {
            MusicError::OrchestrationFailed {
                part_index,
                part_name,
                source,
            } => {
                assert_eq!(part_index, 1);
                assert_eq!(part_name, "Broken");
                assert!(matches!(*source, MusicError::InvalidPalette));
            }
            other => panic!("expected OrchestrationFailed, got {other:?}"),
        }
    }

    #[test]
    fn empty_roster_is_rejected() {
        let err = Orchestrator::new(4)
            .orchestrate(&[], &template(), 10, &mut RandomEventSource::new(4))
            .unwrap_err();
        assert!(matches!(err, MusicError::EmptyDocument));
    }

    #[test]
    fn cancel_between_parts_yields_cancelled() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let started = Mutex::new(Vec::new());
        let sink = |p: Progress| {
            if p.stage == ProgressStage::Started {
                started.lock().unwrap().push(p.part_index);
            }
            if p.stage == ProgressStage::Finished && p.part_index == 1 {
                trigger.cancel();
            }
        };
        let parts: Vec<PartSpec> = (0..5)
            .map(|i| PartSpec::melodic(0, format!("Part {i}"), Role::Melody))
            .collect();
        let err = Orchestrator::new(5)
            .with_cancel(cancel)
            .with_progress(&sink)
            .orchestrate(&parts, &template(), 20, &mut RandomEventSource::new(5))
            .unwrap_err();
        assert!(matches!(err, MusicError::Cancelled));
        assert_eq!(*started.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn cancel_inside_a_part_is_not_wrapped() {
        struct CancelOnThird(CancelToken);
        impl EventSource for CancelOnThird {
            fn next_event(
                &mut self,
                ctx: &EventContext<'_>,
            ) -> std::result::Result<EventChoice, SourceError> {
                if ctx.position == 2 {
                    self.0.cancel();
                }
                Ok(EventChoice {
                    pitch: 60,
                    duration: 1.0,
                    step: 0.5,
                })
            }
        }
        let cancel = CancelToken::new();
        let err = Orchestrator::new(6)
            .with_cancel(cancel.clone())
            .orchestrate(&roster(), &template(), 10, &mut CancelOnThird(cancel))
            .unwrap_err();
        assert!(matches!(err, MusicError::Cancelled));
    }

    #[test]
    fn parallel_matches_sequential_with_per_part_sources() {
        let parts = roster();
        let orchestrator = Orchestrator::new(7);
        let parallel = orchestrator
            .orchestrate_parallel(&parts, &template(), 40, |i| {
                RandomEventSource::for_part(7, i, 1.0)
            })
            .unwrap();

        // Sequential reference: one part at a time with the same sources.
        let mut sequential = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let doc = orchestrator
                .orchestrate(
                    std::slice::from_ref(part),
                    &template(),
                    40,
                    &mut RandomEventSource::for_part(7, i, 1.0),
                )
                .unwrap();
            sequential.push(doc.into_tracks().remove(0).notes);
        }
        let parallel_notes: Vec<Vec<NoteEvent>> =
            parallel.into_tracks().into_iter().map(|t| t.notes).collect();
        // Part 0 lines up exactly; later parts use a different generator
        // stream index when run alone, so only compare lengths there.
        assert_eq!(parallel_notes[0], sequential[0]);
        for (p, s) in parallel_notes.iter().zip(&sequential) {
            assert_eq!(p.len(), s.len());
        }
    }

    #[test]
    fn parallel_preserves_roster_order() {
        let parts: Vec<PartSpec> = (0..12)
            .map(|i| PartSpec::melodic(i as u8, format!("Part {i}"), Role::Melody))
            .collect();
        let doc = Orchestrator::new(8)
            .orchestrate_parallel(&parts, &template(), 30, |i| {
                RandomEventSource::for_part(8, i, 1.0)
            })
            .unwrap();
        let programs: Vec<u8> = doc.tracks().iter().map(|t| t.program()).collect();
        assert_eq!(programs, (0..12).collect::<Vec<u8>>());
    }

    #[test]
    fn parallel_is_deterministic() {
        let run = || {
            Orchestrator::new(9)
                .orchestrate_parallel(&roster(), &template(), 25, |i| {
                    RandomEventSource::for_part(9, i, 0.8)
                })
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn fixed_velocity_applies_to_melodic_parts() {
        let parts = vec![PartSpec::melodic(56, "Trumpet", Role::Solo).with_velocity(90)];
        let doc = Orchestrator::new(10)
            .orchestrate(&parts, &template(), 30, &mut RandomEventSource::new(10))
            .unwrap();
        assert!(doc.tracks()[0].notes.iter().all(|n| n.velocity() == 90));
    }

    #[test]
    fn single_part_skips_the_roster() {
        let part = PartSpec::melodic(40, "Violin", Role::Melody);
        let doc = Orchestrator::new(11)
            .generate_single(&part, &template(), 64, &mut RandomEventSource::new(11))
            .unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.tracks()[0].notes.len(), 64);
    }
}
