//! Flow directives: conditional "next beat" mappings keyed by pass or iteration.

use crate::score::BeatId;
use std::collections::BTreeMap;

/// Cycle used when a goto does not specify one
pub const DEFAULT_CYCLE: u32 = 99;

/// Key of a goto mapping: an explicit pass number or the fallback entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassKey {
    Pass(u32),
    Default,
}

/// Shared counter behaviour of [`GoTo`] and [`Loop`].
///
/// The counter runs `1, 2, ..., cycle, 1, 2, ...`: it wraps after reaching the
/// cycle bound, not before.
pub trait Flow {
    fn counter(&self) -> u32;
    fn counter_mut(&mut self) -> &mut u32;
    fn cycle(&self) -> u32;

    fn reset_counter(&mut self) {
        *self.counter_mut() = 0;
    }

    fn increment_counter(&mut self) -> u32 {
        let cycle = self.cycle();
        let counter = self.counter_mut();
        if *counter >= cycle {
            *counter = 0;
        }
        *counter += 1;
        *counter
    }
}

/// Pass-conditional jump from one beat
#[derive(Debug, Clone, PartialEq)]
pub struct GoTo {
    to_beat: BTreeMap<PassKey, Option<BeatId>>,
    cycle: u32,
    counter: u32,
}

impl GoTo {
    pub fn new(cycle: u32) -> Self {
        Self {
            to_beat: BTreeMap::new(),
            cycle,
            counter: 0,
        }
    }

    /// Straight-line goto: every pass continues to `next`.
    pub fn with_default(next: Option<BeatId>) -> Self {
        let mut goto = Self::new(DEFAULT_CYCLE);
        goto.set(PassKey::Default, next);
        goto
    }

    pub fn set(&mut self, key: PassKey, target: Option<BeatId>) {
        self.to_beat.insert(key, target);
    }

    pub fn set_cycle(&mut self, cycle: u32) {
        self.cycle = cycle;
    }

    /// Overwrite the pass counter; used when passes are corrected retroactively.
    /// Values above the cycle wrap the same way `increment_counter` does.
    pub fn set_counter(&mut self, counter: u32) {
        self.counter = match counter {
            0 => 0,
            c => (c - 1) % self.cycle.max(1) + 1,
        };
    }

    pub fn target(&self, key: PassKey) -> Option<Option<BeatId>> {
        self.to_beat.get(&key).copied()
    }

    /// Beat to jump to on the current pass: the exact pass entry, else the default
    /// entry, else `None`.
    pub fn next_beat(&self) -> Option<BeatId> {
        self.to_beat
            .get(&PassKey::Pass(self.counter))
            .or_else(|| self.to_beat.get(&PassKey::Default))
            .copied()
            .flatten()
    }

    /// Highest pass number with an explicit entry, 0 if there is none.
    pub fn max_pass_number(&self) -> u32 {
        self.to_beat
            .keys()
            .filter_map(|k| match k {
                PassKey::Pass(p) => Some(*p),
                PassKey::Default => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Copy the mappings of `other` into this goto, optionally leaving this goto's
    /// default entry alone.
    pub fn extend(&mut self, other: &GoTo, skip_default: bool) {
        for (key, target) in &other.to_beat {
            if skip_default && *key == PassKey::Default {
                continue;
            }
            self.to_beat.insert(*key, *target);
        }
    }
}

impl Flow for GoTo {
    fn counter(&self) -> u32 {
        self.counter
    }

    fn counter_mut(&mut self) -> &mut u32 {
        &mut self.counter
    }

    fn cycle(&self) -> u32 {
        self.cycle
    }
}

/// Bounded repetition of a gongan
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub from_beat: BeatId,
    pub to_beat: BeatId,
    cycle: u32,
    counter: u32,
}

impl Loop {
    pub fn new(from_beat: BeatId, to_beat: BeatId, cycle: u32) -> Self {
        Self {
            from_beat,
            to_beat,
            cycle,
            counter: 0,
        }
    }

    /// Jump back to `to_beat` while iterations remain, but only from `from_beat`
    /// itself.
    pub fn next_beat(&self, beat: BeatId) -> Option<BeatId> {
        (beat == self.from_beat && self.counter < self.cycle).then_some(self.to_beat)
    }
}

impl Flow for Loop {
    fn counter(&self) -> u32 {
        self.counter
    }

    fn counter_mut(&mut self) -> &mut u32 {
        &mut self.counter
    }

    fn cycle(&self) -> u32 {
        self.cycle
    }
}
