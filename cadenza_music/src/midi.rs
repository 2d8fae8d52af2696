// MIDI output from assembled documents, and reading it back.
//
// Converts a Document into a Standard MIDI File (SMF) for playback. Output is
// SMF Format 1: track 0 carries the tempo, then one track per part with its
// name, a program change and the part's notes on its assigned channel.
// Percussion tracks sit on channel 10 (zero-based 9), which General MIDI
// players render as a drum kit regardless of program.
//
// Note times are seconds. The file is written at a fixed 120 BPM with 480
// ticks per quarter, so one second is 960 ticks and a note's tick position is
// its time in seconds scaled and rounded. Every note lasts at least one tick.
//
// Within a track, note-offs are written before note-ons at the same tick, so
// back-to-back notes of one pitch stay distinct. A melodic note that starts
// while an earlier note of the same pitch is still sounding moves to an
// overflow channel that no track of the document uses, with the same program.
// Reading keys sounding notes by (channel, pitch) and pairs each note-off with
// the oldest sounding note under that key, so nested notes keep their own
// ends. Percussion stays on channel 10; its hits share one length, so
// first-in, first-out pairing is exact there. When the overflow channels run
// out, nested notes fall back to the track's channel and pair first-in,
// first-out.
//
// Uses the `midly` crate for both directions.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track as SmfTrack, TrackEvent,
    TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

use crate::assembler::{self, Document, PERCUSSION_CHANNEL};
use crate::constraint::Role;
use crate::error::{MusicError, Result};
use crate::note::NoteEvent;
use crate::part::PartSpec;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Tempo written to the conductor track.
pub const REFERENCE_BPM: u32 = 120;

const MICROS_PER_MINUTE: u32 = 60_000_000;

const MIDI_CHANNELS: u8 = 16;

/// Ticks per second at the reference tempo.
fn ticks_per_second() -> f64 {
    TICKS_PER_QUARTER as f64 * REFERENCE_BPM as f64 / 60.0
}

/// Convert seconds to ticks at the reference tempo.
pub fn seconds_to_ticks(seconds: f64) -> u32 {
    (seconds.max(0.0) * ticks_per_second()).round() as u32
}

/// Convert a Document to MIDI and write it to a file.
pub fn write_midi(doc: &Document, path: &Path) -> Result<()> {
    let bytes = to_bytes(doc)?;
    std::fs::write(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "MIDI written");
    Ok(())
}

/// Encode a Document as SMF bytes.
pub fn to_bytes(doc: &Document) -> Result<Vec<u8>> {
    let smf = document_to_smf(doc);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)
        .map_err(|e| MusicError::Midi(e.to_string()))?;
    Ok(buf)
}

/// A note boundary in absolute ticks, before delta encoding.
struct TimedEvent {
    tick: u32,
    /// Offs (0) sort before ons (1) at the same tick.
    order: u8,
    seq: usize,
    channel: u8,
    key: u8,
    vel: u8,
}

/// A note placed in ticks, with the lane it plays in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlacedNote {
    start: u32,
    end: u32,
    lane: usize,
}

/// Place each note in the first lane where its pitch is silent by the note's
/// start. Lane 0 is the track's own channel; higher lanes only hold notes
/// that nest inside another note of the same pitch.
fn place_notes(notes: &[NoteEvent]) -> Vec<PlacedNote> {
    // Per lane, the tick at which each pitch falls silent.
    let mut lanes: Vec<HashMap<u8, u32>> = Vec::new();
    notes
        .iter()
        .map(|note| {
            let start = seconds_to_ticks(note.start());
            let end = seconds_to_ticks(note.end()).max(start + 1);
            let free = lanes
                .iter()
                .position(|silent| silent.get(&note.pitch()).is_none_or(|&t| t <= start));
            let lane = match free {
                Some(lane) => lane,
                None => {
                    lanes.push(HashMap::new());
                    lanes.len() - 1
                }
            };
            lanes[lane].insert(note.pitch(), end);
            PlacedNote { start, end, lane }
        })
        .collect()
}

/// Channels no track of `doc` plays on, excluding percussion.
fn overflow_channels(doc: &Document) -> Vec<u8> {
    (0..MIDI_CHANNELS)
        .filter(|&c| c != PERCUSSION_CHANNEL && doc.tracks().iter().all(|t| t.channel != c))
        .collect()
}

/// Convert a Document to an in-memory SMF. Track names borrow from `doc`.
pub fn document_to_smf(doc: &Document) -> Smf<'_> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo track
    let tempo_microseconds = MICROS_PER_MINUTE / REFERENCE_BPM;
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    let mut overflow = overflow_channels(doc).into_iter();
    for track in doc.tracks() {
        let placed = place_notes(&track.notes);
        let lanes = placed.iter().map(|p| p.lane + 1).max().unwrap_or(1);
        let mut channels = vec![track.channel];
        if !track.is_percussion() {
            channels.extend(overflow.by_ref().take(lanes - 1));
            if channels.len() < lanes {
                tracing::warn!(
                    part = %track.part.display_name,
                    lanes,
                    channels = channels.len(),
                    "out of overflow channels; nested notes share the track channel"
                );
            }
        }

        let mut out: SmfTrack<'_> = Vec::with_capacity(track.notes.len() * 2 + channels.len() + 2);
        out.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(
                track.part.display_name.as_bytes(),
            )),
        });
        for &channel in &channels {
            out.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(channel),
                    message: MidiMessage::ProgramChange {
                        program: u7::new(track.program()),
                    },
                },
            });
        }

        let mut events = Vec::with_capacity(track.notes.len() * 2);
        for (seq, (note, place)) in track.notes.iter().zip(&placed).enumerate() {
            let channel = channels.get(place.lane).copied().unwrap_or(track.channel);
            events.push(TimedEvent {
                tick: place.start,
                order: 1,
                seq,
                channel,
                key: note.pitch(),
                vel: note.velocity(),
            });
            events.push(TimedEvent {
                tick: place.end,
                order: 0,
                seq,
                channel,
                key: note.pitch(),
                vel: 0,
            });
        }
        events.sort_by_key(|e| (e.tick, e.order, e.seq));

        let mut last_tick = 0;
        for event in &events {
            let message = if event.order == 1 {
                MidiMessage::NoteOn {
                    key: u7::new(event.key),
                    vel: u7::new(event.vel),
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::new(event.key),
                    vel: u7::new(0),
                }
            };
            out.push(TrackEvent {
                delta: u28::new(event.tick - last_tick),
                kind: TrackEventKind::Midi {
                    channel: u4::new(event.channel),
                    message,
                },
            });
            last_tick = event.tick;
        }

        out.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(out);
    }

    smf
}

/// Read a MIDI file back into a Document.
pub fn read_midi(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path)?;
    parse_midi(&bytes)
}

/// Parse SMF bytes into a Document.
///
/// Tracks with neither notes nor a program change (the tempo track, for
/// instance) are skipped. A track whose first program change (or, lacking
/// one, first channel event) is on channel 10 becomes a percussion part
/// whose palette is the set of pitches it plays. Times use the first tempo
/// event found, or 120 BPM if there is none. Only metrical timing is
/// supported.
pub fn parse_midi(bytes: &[u8]) -> Result<Document> {
    let smf = Smf::parse(bytes).map_err(|e| MusicError::Midi(e.to_string()))?;
    let tpq = match smf.header.timing {
        Timing::Metrical(t) => t.as_int().max(1),
        Timing::Timecode(..) => {
            return Err(MusicError::Midi("timecode timing is not supported".into()));
        }
    };

    let tempo = smf
        .tracks
        .iter()
        .flatten()
        .find_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        })
        .unwrap_or(MICROS_PER_MINUTE / REFERENCE_BPM);
    let seconds_per_tick = tempo as f64 / 1_000_000.0 / tpq as f64;

    let mut parts = Vec::new();
    for (index, events) in smf.tracks.iter().enumerate() {
        if let Some(part) = parse_track(index, events, seconds_per_tick)? {
            parts.push(part);
        }
    }
    tracing::debug!(tracks = parts.len(), "MIDI parsed");
    assembler::assemble(parts)
}

fn parse_track(
    index: usize,
    events: &[TrackEvent<'_>],
    seconds_per_tick: f64,
) -> Result<Option<(PartSpec, Vec<NoteEvent>)>> {
    let mut name = None;
    let mut program = None;
    let mut channel = None;
    let mut first_channel = None;
    // (start tick, velocity, note-on order) per sounding (channel, pitch),
    // oldest first.
    let mut sounding: HashMap<(u8, u8), VecDeque<(u64, u8, usize)>> = HashMap::new();
    let mut finished: Vec<(usize, u8, u64, u64, u8)> = Vec::new();
    let mut ons = 0;
    // Deltas are 28-bit; a long track overflows a 32-bit sum.
    let mut tick = 0u64;

    for event in events {
        tick += u64::from(event.delta.as_int());
        match event.kind {
            TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                name = Some(String::from_utf8_lossy(bytes).into_owned());
            }
            TrackEventKind::Midi { channel: ch, message } => {
                let ch = ch.as_int();
                if first_channel.is_none() {
                    first_channel = Some(ch);
                }
                match message {
                    MidiMessage::ProgramChange { program: p } if program.is_none() => {
                        program = Some(p.as_int());
                        channel = Some(ch);
                    }
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        sounding
                            .entry((ch, key.as_int()))
                            .or_default()
                            .push_back((tick, vel.as_int(), ons));
                        ons += 1;
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let pitch = key.as_int();
                        if let Some((start, vel, order)) = sounding
                            .get_mut(&(ch, pitch))
                            .and_then(VecDeque::pop_front)
                        {
                            finished.push((order, pitch, start, tick, vel));
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // Close anything left sounding at the end of the track.
    for ((_, pitch), queue) in sounding {
        for (start, vel, order) in queue {
            finished.push((order, pitch, start, tick, vel));
        }
    }

    if finished.is_empty() && program.is_none() {
        return Ok(None);
    }

    finished.sort_by_key(|&(order, ..)| order);
    let notes = finished
        .iter()
        .map(|&(_, pitch, start, end, vel)| {
            let end = end.max(start + 1);
            NoteEvent::new(
                pitch,
                start as f64 * seconds_per_tick,
                end as f64 * seconds_per_tick,
                vel,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let name = name.unwrap_or_else(|| format!("Track {index}"));
    let part = if channel.or(first_channel) == Some(PERCUSSION_CHANNEL) {
        let mut palette: Vec<u8> = notes.iter().map(NoteEvent::pitch).collect();
        palette.sort_unstable();
        palette.dedup();
        PartSpec::percussion(name, palette, None)
    } else {
        PartSpec::melodic(program.unwrap_or(0), name, Role::Melody)
    };
    Ok(Some((part, notes)))
}
