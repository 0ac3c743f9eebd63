//! # Score Model
//!
//! The score as the execution engine sees it: an ordered list of gongans, each an
//! ordered list of beats, with every beat already bound to per-position notes.
//!
//! ## Type Hierarchy
//! ```text
//! Score
//!   ├── title: Option<String>
//!   ├── Vec<Gongan>
//!   │     ├── id (1-based)
//!   │     ├── Vec<BeatId>
//!   │     └── Vec<MetaData> (label | goto | loop | sequence | tempo | dynamics)
//!   └── Vec<Beat> (arena, indexed by BeatId)
//!         ├── gongan_id, index (1-based within the gongan)
//!         ├── duration (in beats)
//!         ├── next / prev: Option<BeatId>
//!         └── measures: Position -> Measure (default notes + pass-specific notes)
//! ```
//!
//! ## Beat Identity
//! Beats are stored in a single arena and referred to by [`BeatId`]. Two beats with
//! identical notes at different places in the score are different beats; all
//! comparisons in the flow engine use ids, never note content.
//!
//! ## Input Format
//! Scores are read from YAML (see [`parse_score`]):
//! ```yaml
//! title: Tabuh
//! gongans:
//!   - metadata:
//!       - { type: label, name: A }
//!       - { type: loop, count: 2 }
//!     beats:
//!       - notes:
//!           gangsa: [{ key: 72, duration: 0.5 }, { duration: 0.5 }]
//!         passes:
//!           2:
//!             gangsa: [{ key: 74, duration: 1.0 }]
//! ```
//! A note without `key` is a rest. Notation parsing and instrument range rules are
//! handled upstream; this model only carries the result.

use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Tolerance when checking that notes fit in their beat
const DURATION_TOLERANCE: f64 = 0.001;

/// Instrument position (e.g. `gangsa_polos`), one MIDI track each
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(String);

impl Position {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Position {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single note or rest, with its duration in beats
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI key; `None` is a rest
    #[serde(default)]
    pub key: Option<u8>,
    pub duration: f64,
}

/// One position's notation for one beat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measure {
    pub notes: Vec<Note>,
    /// Notation that replaces `notes` on a specific pass
    pub passes: BTreeMap<u32, Vec<Note>>,
}

impl Measure {
    /// Notes to play on the given pass.
    pub fn notes_for_pass(&self, pass: u32) -> &[Note] {
        self.passes.get(&pass).unwrap_or(&self.notes)
    }
}

/// Stable arena index of a beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BeatId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Beat {
    pub id: BeatId,
    pub gongan_id: usize,
    /// 1-based position within the gongan
    pub index: usize,
    pub duration: f64,
    pub measures: BTreeMap<Position, Measure>,
    pub next: Option<BeatId>,
    pub prev: Option<BeatId>,
}

impl Beat {
    /// Score-unique `"<gongan>-<beat>"` label, for diagnostics and traces.
    pub fn full_id(&self) -> String {
        format!("{}-{}", self.gongan_id, self.index)
    }

    /// Notes for a position on a given pass; empty if the position is silent here.
    pub fn notes(&self, position: &Position, pass: u32) -> &[Note] {
        self.measures
            .get(position)
            .map(|m| m.notes_for_pass(pass))
            .unwrap_or(&[])
    }
}

/// Structural directive attached to a gongan
///
/// Beat numbers are 1-based within the gongan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetaData {
    /// Names a beat as a jump target.
    Label {
        name: String,
        #[serde(default = "first_beat")]
        beat: usize,
    },
    /// Jump to a label from `from_beat` (default: last beat) on the listed passes,
    /// or on every pass if `passes` is empty.
    #[serde(rename = "goto")]
    GoTo {
        label: String,
        #[serde(default)]
        from_beat: Option<usize>,
        #[serde(default)]
        passes: Vec<u32>,
        #[serde(default)]
        cycle: Option<u32>,
    },
    /// Play the gongan `count` times.
    Loop { count: u32 },
    /// Play labelled sections in this order.
    Sequence { labels: Vec<String> },
    /// Move the tempo to `value` BPM over `beat_count` beats starting at `first_beat`.
    Tempo {
        value: i32,
        #[serde(default = "first_beat")]
        first_beat: usize,
        #[serde(default)]
        beat_count: i32,
        #[serde(default)]
        passes: Vec<u32>,
        #[serde(default)]
        iterations: Vec<u32>,
    },
    /// Move the dynamics to `abbreviation` (e.g. `ff`) over `beat_count` beats.
    Dynamics {
        abbreviation: String,
        #[serde(default = "first_beat")]
        first_beat: usize,
        #[serde(default)]
        beat_count: i32,
        #[serde(default)]
        passes: Vec<u32>,
        #[serde(default)]
        iterations: Vec<u32>,
        #[serde(default)]
        positions: Vec<Position>,
    },
}

fn first_beat() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gongan {
    /// 1-based sequence number in the score
    pub id: usize,
    pub beats: Vec<BeatId>,
    pub metadata: Vec<MetaData>,
}

impl Gongan {
    pub fn first_beat(&self) -> BeatId {
        self.beats[0]
    }

    pub fn last_beat(&self) -> BeatId {
        self.beats[self.beats.len() - 1]
    }

    /// Beat by 1-based number, if the gongan has that many beats.
    pub fn beat_at(&self, number: usize) -> Option<BeatId> {
        number.checked_sub(1).and_then(|i| self.beats.get(i)).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Score {
    pub title: Option<String>,
    pub gongans: Vec<Gongan>,
    beats: Vec<Beat>,
}

impl Score {
    pub fn beat(&self, id: BeatId) -> &Beat {
        &self.beats[id.0]
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn first_beat(&self) -> Option<BeatId> {
        self.beats.first().map(|b| b.id)
    }

    /// Gongan by 1-based id.
    pub fn gongan(&self, gongan_id: usize) -> &Gongan {
        &self.gongans[gongan_id - 1]
    }

    pub fn gongan_of(&self, beat: BeatId) -> &Gongan {
        self.gongan(self.beat(beat).gongan_id)
    }

    /// Every position that has notation somewhere in the score.
    pub fn positions(&self) -> BTreeSet<&Position> {
        self.beats.iter().flat_map(|b| b.measures.keys()).collect()
    }

    /// Build the beat arena from a parsed definition.
    pub fn from_definition(definition: ScoreDefinition) -> Result<Self, FlowError> {
        let mut score = Score {
            title: definition.title,
            gongans: Vec::with_capacity(definition.gongans.len()),
            beats: Vec::new(),
        };

        for (g, gongan_def) in definition.gongans.into_iter().enumerate() {
            let gongan_id = g + 1;
            if gongan_def.beats.is_empty() {
                return Err(FlowError::ScoreError(format!("gongan {} has no beats", gongan_id)));
            }

            let mut beat_ids = Vec::with_capacity(gongan_def.beats.len());
            for (b, beat_def) in gongan_def.beats.into_iter().enumerate() {
                let id = BeatId(score.beats.len());
                let beat = beat_def.into_beat(id, gongan_id, b + 1)?;
                score.beats.push(beat);
                beat_ids.push(id);
            }

            score.gongans.push(Gongan {
                id: gongan_id,
                beats: beat_ids,
                metadata: gongan_def.metadata,
            });
        }

        // Link the arena in score order
        let count = score.beats.len();
        for (i, beat) in score.beats.iter_mut().enumerate() {
            beat.prev = i.checked_sub(1).map(BeatId);
            beat.next = (i + 1 < count).then_some(BeatId(i + 1));
        }

        Ok(score)
    }
}

/// Raw score as read from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreDefinition {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub gongans: Vec<GonganDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GonganDefinition {
    #[serde(default)]
    pub metadata: Vec<MetaData>,
    #[serde(default)]
    pub beats: Vec<BeatDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeatDefinition {
    #[serde(default = "default_beat_duration")]
    pub duration: f64,
    #[serde(default)]
    pub notes: BTreeMap<Position, Vec<Note>>,
    #[serde(default)]
    pub passes: BTreeMap<u32, BTreeMap<Position, Vec<Note>>>,
}

fn default_beat_duration() -> f64 {
    1.0
}

impl BeatDefinition {
    fn into_beat(self, id: BeatId, gongan_id: usize, index: usize) -> Result<Beat, FlowError> {
        let location = format!("{}-{}", gongan_id, index);
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(FlowError::ScoreError(format!(
                "beat {} has invalid duration {}",
                location, self.duration
            )));
        }

        let mut measures: BTreeMap<Position, Measure> = BTreeMap::new();
        for (position, notes) in self.notes {
            check_notes(&notes, self.duration, &location, &position)?;
            measures.entry(position).or_default().notes = notes;
        }
        for (pass, by_position) in self.passes {
            if pass == 0 {
                return Err(FlowError::ScoreError(format!(
                    "beat {} has notation for pass 0; passes start at 1",
                    location
                )));
            }
            for (position, notes) in by_position {
                check_notes(&notes, self.duration, &location, &position)?;
                measures.entry(position).or_default().passes.insert(pass, notes);
            }
        }

        Ok(Beat {
            id,
            gongan_id,
            index,
            duration: self.duration,
            measures,
            next: None,
            prev: None,
        })
    }
}

fn check_notes(notes: &[Note], beat_duration: f64, location: &str, position: &Position) -> Result<(), FlowError> {
    if let Some(note) = notes.iter().find(|n| !(n.duration.is_finite() && n.duration > 0.0)) {
        return Err(FlowError::ScoreError(format!(
            "beat {} ({}) has a note with invalid duration {}",
            location, position, note.duration
        )));
    }
    if let Some(note) = notes.iter().find(|n| n.key.is_some_and(|k| k > 127)) {
        return Err(FlowError::ScoreError(format!(
            "beat {} ({}) has key {:?} outside the MIDI range",
            location, position, note.key
        )));
    }
    let total: f64 = notes.iter().map(|n| n.duration).sum();
    if total > beat_duration + DURATION_TOLERANCE {
        return Err(FlowError::ScoreError(format!(
            "beat {} ({}) holds {} beats of notes but lasts {}",
            location, position, total, beat_duration
        )));
    }
    Ok(())
}

/// Parse a YAML score into the beat arena.
///
/// # Example
/// ```rust
/// use balimidi::parse_score;
///
/// let score = parse_score(r#"
/// gongans:
///   - beats:
///       - notes: { gangsa: [{ key: 72, duration: 1.0 }] }
///       - notes: { gangsa: [{ key: 74, duration: 1.0 }] }
/// "#).unwrap();
///
/// assert_eq!(score.beats().len(), 2);
/// assert_eq!(score.beat(score.first_beat().unwrap()).full_id(), "1-1");
/// ```
pub fn parse_score(source: &str) -> Result<Score, FlowError> {
    let definition: ScoreDefinition =
        serde_yaml::from_str(source).map_err(|e| FlowError::ScoreError(e.to_string()))?;
    Score::from_definition(definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_GONGANS: &str = r#"
title: Test
gongans:
  - metadata:
      - { type: label, name: A }
    beats:
      - notes: { gangsa: [{ key: 72, duration: 0.5 }, { duration: 0.5 }] }
      - notes: { gangsa: [{ key: 74, duration: 1.0 }] }
  - beats:
      - notes: { jegogan: [{ key: 48, duration: 1.0 }] }
        passes:
          2:
            jegogan: [{ key: 50, duration: 1.0 }]
"#;

    #[test]
    fn test_arena_links() {
        let score = parse_score(TWO_GONGANS).unwrap();
        assert_eq!(score.beats().len(), 3);
        assert_eq!(score.beat(BeatId(0)).next, Some(BeatId(1)));
        assert_eq!(score.beat(BeatId(1)).next, Some(BeatId(2)));
        assert_eq!(score.beat(BeatId(2)).next, None);
        assert_eq!(score.beat(BeatId(0)).prev, None);
        assert_eq!(score.beat(BeatId(2)).prev, Some(BeatId(1)));
    }

    #[test]
    fn test_gongan_ids_and_full_ids() {
        let score = parse_score(TWO_GONGANS).unwrap();
        assert_eq!(score.gongans.len(), 2);
        assert_eq!(score.beat(BeatId(1)).full_id(), "1-2");
        assert_eq!(score.beat(BeatId(2)).full_id(), "2-1");
        assert_eq!(score.gongan_of(BeatId(2)).id, 2);
        assert_eq!(score.gongan(1).last_beat(), BeatId(1));
        assert_eq!(score.gongan(1).beat_at(3), None);
        assert_eq!(score.gongan(1).beat_at(0), None);
    }

    #[test]
    fn test_metadata_parsed() {
        let score = parse_score(TWO_GONGANS).unwrap();
        assert_eq!(
            score.gongan(1).metadata,
            vec![MetaData::Label { name: "A".to_string(), beat: 1 }]
        );
    }

    #[test]
    fn test_pass_specific_notes() {
        let score = parse_score(TWO_GONGANS).unwrap();
        let beat = score.beat(BeatId(2));
        let jegogan = Position::from("jegogan");
        assert_eq!(beat.notes(&jegogan, 1)[0].key, Some(48));
        assert_eq!(beat.notes(&jegogan, 2)[0].key, Some(50));
        assert_eq!(beat.notes(&jegogan, 3)[0].key, Some(48));
        assert!(beat.notes(&Position::from("gangsa"), 1).is_empty());
    }

    #[test]
    fn test_positions() {
        let score = parse_score(TWO_GONGANS).unwrap();
        let names: Vec<&str> = score.positions().into_iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["gangsa", "jegogan"]);
    }

    #[test]
    fn test_empty_gongan_rejected() {
        let result = parse_score("gongans:\n  - beats: []\n");
        assert!(matches!(result, Err(FlowError::ScoreError(msg)) if msg.contains("no beats")));
    }

    #[test]
    fn test_overfull_beat_rejected() {
        let source = r#"
gongans:
  - beats:
      - notes: { gangsa: [{ key: 72, duration: 0.75 }, { key: 74, duration: 0.5 }] }
"#;
        assert!(parse_score(source).is_err());
    }

    #[test]
    fn test_pass_zero_rejected() {
        let source = r#"
gongans:
  - beats:
      - passes:
          0:
            gangsa: [{ key: 72, duration: 1.0 }]
"#;
        assert!(parse_score(source).is_err());
    }
}
