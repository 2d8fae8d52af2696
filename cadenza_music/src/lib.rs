// Cadenza Music Engine
//
// Turns abstract musical constraints (scale, tempo class, pitch range,
// instrument role) plus a pluggable next-event source into well-formed
// multi-track note timelines, and writes them as Standard MIDI Files.
// Percussion parts are generated algorithmically from fixed drum palettes;
// orchestration coordinates many independent parts into one document.
//
// Architecture (data flows top to bottom):
// - constraint.rs: Scale, TempoClass, PitchRange, Role, RuleFlags and the
//   validated ConstraintModel
// - note.rs: NoteEvent value type and sequence helpers
// - part.rs: PartSpec (instrument, role, percussion palette)
// - source.rs: EventSource trait and the temperature-weighted random source
// - generator.rs: Note sequence generation for one melodic part
// - drums.rs: Percussion pattern generation from a fixed palette
// - cancel.rs: Cooperative cancellation and progress reporting
// - orchestra.rs: Roster-driven generation, sequential or on rayon
// - assembler.rs: Document assembly and MIDI channel allocation
// - midi.rs: SMF writing and parsing via midly
// - catalog.rs: Named scales, tempo classes, instruments, presets, drum kit
// - request.rs: JSON generation requests resolved against the catalog
// - error.rs: Error taxonomy
//
// Generation is deterministic given a seed.

pub mod assembler;
pub mod cancel;
pub mod catalog;
pub mod constraint;
pub mod drums;
pub mod error;
pub mod generator;
pub mod midi;
pub mod note;
pub mod orchestra;
pub mod part;
pub mod request;
pub mod source;

pub use assembler::{Document, Track, assemble};
pub use cancel::{CancelToken, Progress, ProgressSink};
pub use constraint::{ConstraintModel, PitchRange, Role, RuleFlags, Scale, TempoClass};
pub use error::{ConstraintError, MusicError, Result};
pub use note::NoteEvent;
pub use orchestra::Orchestrator;
pub use part::PartSpec;
pub use request::GenerationRequest;
pub use source::{EventChoice, EventContext, EventSource, RandomEventSource, SourceError};
