//! # Error Types
//!
//! This module defines all error types for the balimidi converter.
//!
//! Errors carry location information (gongan number) where it exists so that a
//! score author can find the offending directive.
//!
//! ## Error Types
//! - `ScoreError` - Malformed score definition
//! - `SettingsError` - Malformed run settings
//! - `MetadataError` - Structural metadata errors reported by the execution builder
//! - `GradualChangeError` - Invalid tempo/dynamics ramp
//! - `StepLimitExceeded` - A flow graph that never reaches the end of the score
//! - `TraversalFinished` - Walking past the end of a finished traversal
//! - `MidiError` - MIDI serialization failure
//!
//! ## Usage
//! ```rust
//! use balimidi::{compile, FlowError, RunSettings};
//!
//! let settings = RunSettings::default();
//! match compile("gongans: []", &settings) {
//!     Ok(bytes) => println!("{} bytes of MIDI", bytes.len()),
//!     Err(FlowError::StepLimitExceeded { limit }) => {
//!         eprintln!("Score loops forever (gave up after {} beats)", limit);
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// Malformed score definition.
    ///
    /// # Example
    /// ```
    /// # use balimidi::FlowError;
    /// let err = FlowError::ScoreError("gongan 3 has no beats".to_string());
    /// assert_eq!(err.to_string(), "Invalid score: gongan 3 has no beats");
    /// ```
    #[error("Invalid score: {0}")]
    ScoreError(String),

    /// Malformed run settings.
    #[error("Invalid settings: {0}")]
    SettingsError(String),

    /// Structural metadata error attached to a gongan.
    ///
    /// These are collected by the execution builder rather than returned on first
    /// occurrence; the offending directive is skipped.
    ///
    /// # Example
    /// ```
    /// # use balimidi::FlowError;
    /// let err = FlowError::MetadataError {
    ///     gongan: 4,
    ///     message: "goto refers to undefined label 'PENGECET'".to_string(),
    /// };
    /// assert_eq!(
    ///     err.to_string(),
    ///     "Metadata error in gongan 4: goto refers to undefined label 'PENGECET'"
    /// );
    /// ```
    #[error("Metadata error in gongan {gongan}: {message}")]
    MetadataError { gongan: usize, message: String },

    #[error("Invalid gradual change: {0}")]
    GradualChangeError(String),

    /// The traversal did not terminate within the configured number of beats.
    #[error("Traversal exceeded {limit} beats; the score's flow never reaches its end")]
    StepLimitExceeded { limit: usize },

    /// `next_beat_in_flow` was called after the traversal had already ended.
    #[error("Traversal already finished; call reset_all before walking the score again")]
    TraversalFinished,

    #[error("MIDI error: {0}")]
    MidiError(String),
}
