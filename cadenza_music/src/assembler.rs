// Track assembly: turning generated parts into a document.
//
// One track per part, in the order given. Each track keeps its part's
// program, name and percussion flag, and is assigned a MIDI channel:
// percussion always uses the General MIDI drum channel, melodic parts take
// the remaining fifteen channels in order and wrap if there are more than
// fifteen of them.

use serde::{Deserialize, Serialize};

use crate::error::{MusicError, Result};
use crate::note::{self, NoteEvent};
use crate::part::PartSpec;

/// General MIDI percussion channel (channel 10, zero-based).
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Channels available to melodic parts, in allocation order.
const MELODIC_CHANNELS: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub part: PartSpec,
    pub channel: u8,
    pub notes: Vec<NoteEvent>,
}

impl Track {
    pub fn is_percussion(&self) -> bool {
        self.part.is_percussion
    }

    pub fn program(&self) -> u8 {
        self.part.program
    }

    pub fn end_time(&self) -> f64 {
        note::end_time(&self.notes)
    }
}

/// The finished multi-track result. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    tracks: Vec<Track>,
}

/// Totals shown after a generation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentSummary {
    pub tracks: usize,
    pub notes: usize,
    pub duration_seconds: f64,
}

impl Document {
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false: assembly rejects empty documents.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Dump the document as pretty-printed JSON, one object per track.
    pub fn write_json(&self, writer: impl std::io::Write) -> Result<()> {
        serde_json::to_writer_pretty(writer, self).map_err(std::io::Error::from)?;
        Ok(())
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            tracks: self.tracks.len(),
            notes: self.tracks.iter().map(|t| t.notes.len()).sum(),
            duration_seconds: self.tracks.iter().map(Track::end_time).fold(0.0, f64::max),
        }
    }
}

/// Build a document with one track per part, preserving order.
///
/// Notes inside each part are stably sorted by onset, which leaves generator
/// output untouched. Fails with `EmptyDocument` when `parts` is empty.
pub fn assemble(parts: Vec<(PartSpec, Vec<NoteEvent>)>) -> Result<Document> {
    if parts.is_empty() {
        return Err(MusicError::EmptyDocument);
    }

    let mut melodic = MELODIC_CHANNELS.iter().copied().cycle();
    let mut tracks = Vec::with_capacity(parts.len());
    for (part, mut notes) in parts {
        part.validate()?;
        if !note::is_time_ordered(&notes) {
            notes.sort_by(|a, b| a.start().total_cmp(&b.start()));
        }
        let channel = if part.is_percussion {
            PERCUSSION_CHANNEL
        } else {
            melodic.next().unwrap_or(0)
        };
        tracks.push(Track {
            part,
            channel,
            notes,
        });
    }

    tracing::debug!(tracks = tracks.len(), "document assembled");
    Ok(Document { tracks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Role;

    fn note(pitch: u8, start: f64) -> NoteEvent {
        NoteEvent::new(pitch, start, start + 0.5, 80).unwrap()
    }

    #[test]
    fn zero_parts_is_an_error() {
        assert!(matches!(assemble(Vec::new()), Err(MusicError::EmptyDocument)));
    }

    #[test]
    fn tracks_follow_input_order_and_flags() {
        let doc = assemble(vec![
            (PartSpec::melodic(40, "Violin", Role::Melody), vec![note(72, 0.0)]),
            (PartSpec::percussion("Kick", vec![36], Some(120)), vec![note(36, 0.0)]),
            (PartSpec::melodic(33, "Bass", Role::Bass), vec![note(40, 0.0)]),
        ])
        .unwrap();
        let names: Vec<&str> = doc
            .tracks()
            .iter()
            .map(|t| t.part.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Violin", "Kick", "Bass"]);
        assert_eq!(doc.tracks()[0].program(), 40);
        assert!(doc.tracks()[1].is_percussion());
        assert_eq!(doc.tracks()[1].channel, PERCUSSION_CHANNEL);
        assert_eq!(doc.tracks()[0].channel, 0);
        assert_eq!(doc.tracks()[2].channel, 1);
    }

    #[test]
    fn melodic_channels_skip_drums_and_wrap() {
        let parts: Vec<_> = (0..17)
            .map(|i| (PartSpec::melodic(0, format!("P{i}"), Role::Harmony), Vec::new()))
            .collect();
        let doc = assemble(parts).unwrap();
        let channels: Vec<u8> = doc.tracks().iter().map(|t| t.channel).collect();
        assert!(!channels.contains(&PERCUSSION_CHANNEL));
        assert_eq!(channels[8], 8);
        assert_eq!(channels[9], 10);
        assert_eq!(channels[15], 0);
        assert_eq!(channels[16], 1);
    }

    #[test]
    fn unsorted_notes_are_ordered() {
        let doc = assemble(vec![(
            PartSpec::melodic(0, "Piano", Role::Melody),
            vec![note(60, 2.0), note(62, 0.0), note(64, 1.0)],
        )])
        .unwrap();
        let starts: Vec<f64> = doc.tracks()[0].notes.iter().map(|n| n.start()).collect();
        assert_eq!(starts, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn invalid_part_is_rejected() {
        let mut drums = PartSpec::percussion("Snare", vec![38], None);
        drums.percussion_palette = None;
        assert!(matches!(
            assemble(vec![(drums, Vec::new())]),
            Err(MusicError::InvalidPart(_))
        ));
    }

    #[test]
    fn json_dump_lists_tracks_with_channels_and_notes() {
        let doc = assemble(vec![
            (PartSpec::melodic(40, "Violin", Role::Melody), vec![note(72, 0.0)]),
            (PartSpec::percussion("Kick", vec![36], Some(120)), vec![note(36, 0.5)]),
        ])
        .unwrap();
        let mut buf = Vec::new();
        doc.write_json(&mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let tracks = value["tracks"].as_array().unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0]["part"]["display_name"], "Violin");
        assert_eq!(tracks[1]["channel"], PERCUSSION_CHANNEL);
        assert_eq!(tracks[1]["notes"][0]["pitch"], 36);
        // Tracks read back as the same values.
        let kick: Track = serde_json::from_value(tracks[1].clone()).unwrap();
        assert_eq!(kick, doc.tracks()[1]);
    }

    #[test]
    fn summary_counts_notes_and_length() {
        let doc = assemble(vec![
            (PartSpec::melodic(0, "A", Role::Melody), vec![note(60, 0.0), note(62, 3.0)]),
            (PartSpec::melodic(0, "B", Role::Bass), vec![note(40, 1.0)]),
        ])
        .unwrap();
        let summary = doc.summary();
        assert_eq!(summary.tracks, 2);
        assert_eq!(summary.notes, 3);
        assert!((summary.duration_seconds - 3.5).abs() < 1e-12);
    }
}
