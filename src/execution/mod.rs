//! # Execution Module
//!
//! Walks a score the way a performer would: following loops, pass-conditional
//! gotos and label sequences, and tracking the tempo and dynamics in effect at
//! every beat.
//!
//! ## Sub-modules
//! - `flow` - [`GoTo`] and [`Loop`] directives and their pass/iteration counters
//! - `gradual` - [`GradualChangeInstruction`], integer tempo/dynamics ramps
//! - `manager` - [`ExecutionManager`], the traversal state machine
//! - `builder` - [`build_execution`], metadata to directives
//!
//! ## Traversal Rules
//! On each call to [`ExecutionManager::next_beat_in_flow`]:
//! 1. The first call returns the first beat of the score.
//! 2. From the last beat of a gongan with a loop, the loop jumps back while
//!    iterations remain.
//! 3. Otherwise the beat's goto picks the target for the current pass, falling back
//!    to its default entry (the next beat in the score).
//! 4. On arrival, the loop iteration counter advances if the beat starts the loop,
//!    and the beat's pass counter advances on the first iteration only. Entering a
//!    gongan past its first beat copies the pass onto the skipped beats.
//! 5. Tempo and dynamics are updated for the new beat.
//!
//! ## Example
//! ```rust
//! use balimidi::{build_execution, parse_score, RunSettings};
//!
//! let score = parse_score(r#"
//! gongans:
//!   - metadata:
//!       - { type: label, name: A }
//!       - { type: tempo, value: 80, first_beat: 2 }
//!     beats: [{}, {}]
//!   - metadata:
//!       - { type: goto, label: A, passes: [1] }
//!     beats: [{}]
//! "#).unwrap();
//! let settings = RunSettings::default();
//! let (mut manager, _) = build_execution(&score, &settings).unwrap();
//!
//! let played = manager.walk(None).unwrap();
//! let ids: Vec<&str> = played.iter().map(|b| b.full_id.as_str()).collect();
//! assert_eq!(ids, vec!["1-1", "1-2", "2-1", "1-1", "1-2", "2-1"]);
//! assert_eq!(played[0].tempo, (60, 60));
//! assert_eq!(played[1].tempo, (80, 80));
//! ```
//!
//! ## Related Modules
//! - `score` - Beat arena and metadata types walked here
//! - `midi` - Consumes the walk to produce MIDI tracks

mod builder;
mod flow;
mod gradual;
mod manager;

#[cfg(test)]
mod tests;

pub use builder::{build_execution, BuildReport};
pub use flow::{Flow, GoTo, Loop, PassKey, DEFAULT_CYCLE};
pub use gradual::{ChangeStatus, GradualChangeInstruction, ValueKind, MAX_TEMPO, MIN_TEMPO};
pub use manager::{ExecutionManager, PlayedBeat};
