//! Gradual tempo and dynamics changes.
//!
//! A [`GradualChangeInstruction`] moves a value toward `target_value` over
//! `tot_beats` beats. Each step recomputes the increment from the remaining delta and
//! the remaining number of steps, so the ramp lands exactly on the target however the
//! integer division rounds along the way.

use crate::error::FlowError;
use crate::score::Position;

/// Slowest tempo in BPM; a slower beat does not fit a MIDI tempo event
pub const MIN_TEMPO: i32 = 4;
pub const MAX_TEMPO: i32 = 1000;

/// Which value an instruction drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Beats per minute
    Tempo,
    /// MIDI velocity
    Dynamics,
}

impl ValueKind {
    fn accepts(self, value: i32) -> bool {
        match self {
            ValueKind::Tempo => (MIN_TEMPO..=MAX_TEMPO).contains(&value),
            ValueKind::Dynamics => (0..=127).contains(&value),
        }
    }
}

/// Live interpolation state of the active instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeStatus {
    pub initial_value: i32,
    pub beat_seq: u32,
    pub start_value: i32,
    pub end_value: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradualChangeInstruction {
    pub kind: ValueKind,
    pub target_value: i32,
    pub tot_beats: u32,
    pub positions: Vec<Position>,
    pub passes: Vec<u32>,
    pub iterations: Vec<u32>,
    status: Option<ChangeStatus>,
}

impl GradualChangeInstruction {
    /// Create an unfiltered instruction.
    ///
    /// Fails if `tot_beats` is negative or the target is outside the range of the
    /// value kind (4-1000 BPM, 0-127 velocity).
    pub fn new(kind: ValueKind, target_value: i32, tot_beats: i32) -> Result<Self, FlowError> {
        let tot_beats = u32::try_from(tot_beats).map_err(|_| {
            FlowError::GradualChangeError(format!("ramp length must not be negative, got {}", tot_beats))
        })?;
        if !kind.accepts(target_value) {
            return Err(FlowError::GradualChangeError(format!(
                "{:?} target {} is out of range",
                kind, target_value
            )));
        }
        Ok(Self {
            kind,
            target_value,
            tot_beats,
            positions: Vec::new(),
            passes: Vec::new(),
            iterations: Vec::new(),
            status: None,
        })
    }

    pub fn with_filters(mut self, positions: Vec<Position>, passes: Vec<u32>, iterations: Vec<u32>) -> Self {
        self.positions = positions;
        self.passes = passes;
        self.iterations = iterations;
        self
    }

    /// An empty filter list matches anything.
    pub fn matches(&self, position: Option<&Position>, pass_number: u32, iteration_number: u32) -> bool {
        let position_ok = self.positions.is_empty() || position.is_some_and(|p| self.positions.contains(p));
        position_ok
            && (self.passes.is_empty() || self.passes.contains(&pass_number))
            && (self.iterations.is_empty() || self.iterations.contains(&iteration_number))
    }

    pub fn status(&self) -> Option<&ChangeStatus> {
        self.status.as_ref()
    }

    /// Start the ramp from `initial_value`. A zero-length ramp jumps straight to the
    /// target.
    pub fn initialize_status(&mut self, initial_value: i32) {
        let seed = if self.tot_beats == 0 { self.target_value } else { initial_value };
        self.status = Some(ChangeStatus {
            initial_value,
            beat_seq: 0,
            start_value: seed,
            end_value: seed,
        });
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    pub fn completed(&self) -> bool {
        self.status
            .is_some_and(|s| s.beat_seq >= self.tot_beats && s.start_value == s.end_value)
    }

    /// Advance the ramp by one beat.
    pub fn next_step(&mut self) {
        if self.completed() {
            return;
        }
        let (target, tot) = (self.target_value, self.tot_beats);
        let Some(status) = self.status.as_mut() else {
            return;
        };

        status.beat_seq += 1;
        if status.beat_seq > tot {
            status.start_value = target;
            status.end_value = target;
        } else {
            status.start_value = status.end_value;
            let remaining_steps = (tot - status.beat_seq + 1) as i32;
            // Integer division truncates toward zero, so the ramp never overshoots
            status.end_value = status.start_value + (target - status.start_value) / remaining_steps;
        }
    }

    /// `(start, end)` of the current beat, if the instruction is running.
    pub fn values(&self) -> Option<(i32, i32)> {
        self.status.map(|s| (s.start_value, s.end_value))
    }
}
