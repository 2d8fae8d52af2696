// Built-in configuration: named scales, tempo classes, instrument names,
// presets, the default orchestra and the drum kit.
//
// Lookups are by display name, case-insensitive, with `-` and `_` accepted in
// place of spaces so that CLI arguments like `a-minor` or `bass_guitar` work.
// Everything here is plain data; request.rs turns it into validated
// constraint models and rosters.

use crate::constraint::{Role, RuleFlags, Scale, TempoClass};
use crate::part::PartSpec;

/// Named scales as absolute MIDI pitches, one octave each.
const SCALES: &[(&str, &[u8])] = &[
    ("C Major", &[60, 62, 64, 65, 67, 69, 71]),
    ("A Minor", &[57, 59, 60, 62, 64, 65, 67]),
    ("G Major", &[67, 69, 71, 72, 74, 76, 78]),
    ("E Minor", &[64, 66, 67, 69, 71, 72, 74]),
    ("F Major", &[65, 67, 69, 70, 72, 74, 76]),
    ("D Minor", &[62, 64, 65, 67, 69, 70, 72]),
    ("Bb Major", &[70, 72, 74, 75, 77, 79, 81]),
    (
        "Chromatic",
        &[60, 61, 62, 63, 64, 65, 66, 67, 68, 69, 70, 71, 72],
    ),
];

/// Tempo classes: (name, step min, step max, duration min, duration max).
const TEMPO_CLASSES: &[(&str, f64, f64, f64, f64)] = &[
    ("slow", 0.8, 2.0, 1.0, 3.0),
    ("moderate", 0.4, 1.2, 0.6, 2.0),
    ("fast", 0.2, 0.8, 0.3, 1.5),
    ("custom", 0.1, 4.0, 0.1, 4.0),
];

/// General MIDI programs offered by name.
const INSTRUMENTS: &[(u8, &str)] = &[
    (0, "Acoustic Grand Piano"),
    (1, "Bright Acoustic Piano"),
    (2, "Electric Grand Piano"),
    (24, "Acoustic Guitar (nylon)"),
    (25, "Acoustic Guitar (steel)"),
    (26, "Electric Guitar (jazz)"),
    (27, "Electric Guitar (clean)"),
    (32, "Acoustic Bass"),
    (33, "Electric Bass (finger)"),
    (40, "Violin"),
    (41, "Viola"),
    (42, "Cello"),
    (48, "String Ensemble 1"),
    (49, "String Ensemble 2"),
    (56, "Trumpet"),
    (57, "Trombone"),
    (61, "Brass Section"),
    (64, "Soprano Sax"),
    (65, "Alto Sax"),
    (73, "Flute"),
    (80, "Lead 1 (square)"),
    (81, "Lead 2 (sawtooth)"),
];

pub const DEFAULT_SCALE: &str = "C Major";
pub const DEFAULT_TEMPO: &str = "moderate";

/// A named starting point for a generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub program: u8,
    pub role: Role,
    /// Generate the default orchestra (plus drums) instead of one part.
    pub orchestra: bool,
    pub scale: &'static str,
    pub notes: usize,
    pub temperature: f64,
    pub tempo: &'static str,
    pub pitch_low: u8,
    pub pitch_high: u8,
    pub rules: RuleFlags,
}

const fn rules(use_scale: bool, smooth_melody: bool, quantize_rhythm: bool) -> RuleFlags {
    RuleFlags {
        use_scale,
        smooth_melody,
        quantize_rhythm,
    }
}

#[allow(clippy::too_many_arguments)]
const fn entry(
    name: &'static str,
    program: u8,
    role: Role,
    orchestra: bool,
    scale: &'static str,
    notes: usize,
    temperature: f64,
    tempo: &'static str,
    pitch: (u8, u8),
    rules: RuleFlags,
) -> Preset {
    Preset {
        name,
        program,
        role,
        orchestra,
        scale,
        notes,
        temperature,
        tempo,
        pitch_low: pitch.0,
        pitch_high: pitch.1,
        rules,
    }
}

#[rustfmt::skip]
const PRESETS: &[Preset] = &[
    entry("Classical Piano", 0, Role::Melody, false, "C Major", 300, 0.8, "moderate", (60, 84), rules(true, true, true)),
    entry("Blues Guitar", 27, Role::Melody, false, "A Minor", 250, 1.2, "moderate", (48, 72), rules(true, true, false)),
    entry("Jazz Trumpet", 56, Role::Melody, false, "Bb Major", 200, 1.1, "fast", (60, 96), rules(false, false, true)),
    entry("Lyrical Violin", 40, Role::Melody, false, "G Major", 350, 0.9, "slow", (67, 108), rules(true, true, true)),
    entry("Bass Guitar", 33, Role::Bass, false, "E Minor", 150, 0.7, "moderate", (24, 48), rules(true, false, true)),
    entry("Chord Accompaniment", 0, Role::Chords, false, "F Major", 100, 0.6, "slow", (48, 72), rules(true, false, true)),
    entry("Sax Solo", 65, Role::Solo, false, "D Minor", 280, 1.3, "moderate", (55, 84), rules(false, true, false)),
    entry("Electronic Synth", 80, Role::Melody, false, "Chromatic", 400, 1.5, "fast", (36, 96), rules(false, false, true)),
    entry("Symphonic Orchestra", 48, Role::Melody, true, "C Major", 500, 0.9, "moderate", (36, 108), rules(true, true, true)),
    entry("Dramatic Orchestra", 49, Role::Melody, true, "D Minor", 600, 1.1, "slow", (24, 108), rules(true, true, true)),
    entry("Solemn March", 61, Role::Melody, true, "Bb Major", 400, 0.8, "moderate", (48, 96), rules(true, false, true)),
];

/// Compare names ignoring case and treating `-`/`_` as spaces.
fn same_name(a: &str, b: &str) -> bool {
    let norm = |c: char| match c {
        '-' | '_' => ' ',
        c => c.to_ascii_lowercase(),
    };
    a.chars().map(norm).eq(b.chars().map(norm))
}

pub fn scale(name: &str) -> Option<Scale> {
    SCALES
        .iter()
        .find(|(n, _)| same_name(n, name))
        .and_then(|(_, pitches)| Scale::new(pitches.to_vec()).ok())
}

pub fn scale_names() -> impl Iterator<Item = &'static str> {
    SCALES.iter().map(|(n, _)| *n)
}

pub fn tempo_class(name: &str) -> Option<TempoClass> {
    TEMPO_CLASSES
        .iter()
        .find(|(n, ..)| same_name(n, name))
        .and_then(|&(_, s0, s1, d0, d1)| TempoClass::new(s0, s1, d0, d1).ok())
}

pub fn tempo_names() -> impl Iterator<Item = &'static str> {
    TEMPO_CLASSES.iter().map(|(n, ..)| *n)
}

pub fn instrument_name(program: u8) -> Option<&'static str> {
    INSTRUMENTS
        .iter()
        .find(|(p, _)| *p == program)
        .map(|(_, n)| *n)
}

pub fn instrument_program(name: &str) -> Option<u8> {
    INSTRUMENTS
        .iter()
        .find(|(_, n)| same_name(n, name))
        .map(|(p, _)| *p)
}

pub fn preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| same_name(p.name, name))
}

pub fn presets() -> &'static [Preset] {
    PRESETS
}

/// Display name for a program: the General MIDI name if known.
pub fn program_label(program: u8) -> String {
    instrument_name(program)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Program {program}"))
}

/// The five melodic sections used for orchestral presets.
pub fn default_orchestra() -> Vec<PartSpec> {
    vec![
        PartSpec::melodic(48, "String Ensemble 1", Role::Harmony),
        PartSpec::melodic(0, "Acoustic Grand Piano", Role::Chords),
        PartSpec::melodic(56, "Trumpet", Role::Solo),
        PartSpec::melodic(40, "Violin", Role::Melody),
        PartSpec::melodic(33, "Electric Bass (finger)", Role::Bass),
    ]
}

/// Kick, snare, hi-hat and crash, each its own percussion part.
pub fn drum_kit() -> Vec<PartSpec> {
    vec![
        PartSpec::percussion("Kick Drum", vec![36], Some(120)),
        PartSpec::percussion("Snare Drum", vec![38, 40], Some(110)),
        PartSpec::percussion("Hi-Hat", vec![42, 44], Some(100)),
        PartSpec::percussion("Crash Cymbal", vec![49, 57], Some(110)),
    ]
}
