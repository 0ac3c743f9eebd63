//! Performance flow of Balinese gamelan scores and their rendering to MIDI.
//!
//! A score is a sequence of gongans (groups of beats). Metadata on each gongan
//! describes how the music is performed: labels, pass-conditional gotos, loops,
//! label sequences and gradual tempo/dynamics changes. This crate walks the score
//! in performance order and writes the result as a Standard MIDI File.

pub mod config;
pub mod error;
pub mod execution;
pub mod midi;
pub mod score;

pub use config::{InstrumentSettings, RunSettings};
pub use error::FlowError;
pub use execution::{build_execution, BuildReport, ExecutionManager, PlayedBeat};
pub use midi::write_midi;
pub use score::{parse_score, BeatId, MetaData, Position, Score};

/// Compile a YAML score to MIDI file bytes.
/// This is the main entry point for the library.
///
/// Problems in the score's metadata are logged and the offending directives are
/// skipped; only an unreadable score or a failed traversal is an error.
pub fn compile(source: &str, settings: &RunSettings) -> Result<Vec<u8>, FlowError> {
    settings.validate()?;
    let score = parse_score(source)?;
    let (mut manager, _report) = build_execution(&score, settings)?;
    write_midi(&score, &mut manager, settings)
}

/// Walk a YAML score for one position (or for no position in particular) and
/// return the beats in the order they are played.
pub fn trace(source: &str, settings: &RunSettings, position: Option<&str>) -> Result<Vec<PlayedBeat>, FlowError> {
    settings.validate()?;
    let score = parse_score(source)?;
    let (mut manager, _report) = build_execution(&score, settings)?;
    let position = position.map(Position::from);
    manager.walk(position.as_ref())
}
