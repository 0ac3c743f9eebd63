//! Beat-by-beat traversal of a score's flow graph.

use super::flow::{Flow, GoTo, Loop, PassKey};
use super::gradual::{GradualChangeInstruction, ValueKind};
use crate::config::RunSettings;
use crate::error::FlowError;
use crate::score::{BeatId, Position, Score};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;

/// Where the traversal stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    NotStarted,
    At(BeatId),
    Finished,
}

/// One beat as it is performed, with the values in effect while it plays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayedBeat {
    pub beat: BeatId,
    pub full_id: String,
    pub pass: u32,
    pub iteration: u32,
    pub tempo: (i32, i32),
    pub dynamics: (i32, i32),
}

/// Gradual-change instructions of one value kind.
///
/// Instruction 0 is the score-level default; `active` is an index into
/// `instructions`, so identity comparisons are index comparisons.
#[derive(Debug)]
struct ChangeTable {
    instructions: Vec<GradualChangeInstruction>,
    by_beat: HashMap<BeatId, Vec<usize>>,
    active: usize,
}

impl ChangeTable {
    fn new(kind: ValueKind, default_value: i32) -> Result<Self, FlowError> {
        let mut default = GradualChangeInstruction::new(kind, default_value, 0)?;
        default.initialize_status(default_value);
        Ok(Self {
            instructions: vec![default],
            by_beat: HashMap::new(),
            active: 0,
        })
    }

    fn assign(&mut self, beat: BeatId, instruction: GradualChangeInstruction) {
        let id = self.instructions.len();
        self.instructions.push(instruction);
        self.by_beat.entry(beat).or_default().push(id);
    }

    fn reset(&mut self) {
        for instruction in &mut self.instructions {
            instruction.clear_status();
        }
        self.active = 0;
        let default = self.instructions[0].target_value;
        self.instructions[0].initialize_status(default);
    }

    fn update(&mut self, beat: BeatId, position: Option<&Position>, pass: u32, iteration: u32) {
        let matched = self.by_beat.get(&beat).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|&id| self.instructions[id].matches(position, pass, iteration))
        });

        if let Some(id) = matched.filter(|&id| id != self.active) {
            let (_, reached) = self.values();
            self.instructions[self.active].clear_status();
            self.active = id;
            self.instructions[id].initialize_status(reached);
        }
        self.instructions[self.active].next_step();
    }

    fn values(&self) -> (i32, i32) {
        self.instructions[self.active].values().unwrap_or_else(|| {
            let default = self.instructions[0].target_value;
            (default, default)
        })
    }
}

/// Owns all per-run flow state for one score and walks it.
///
/// Counters live here, keyed by beat id or gongan id, rather than on the beats, so
/// the same `Score` can be walked once per instrument position. Call
/// [`reset_all`](Self::reset_all) before each walk.
///
/// # Example
/// ```rust
/// use balimidi::{build_execution, parse_score, RunSettings};
///
/// let score = parse_score(r#"
/// gongans:
///   - metadata: [{ type: loop, count: 2 }]
///     beats: [{}, {}]
/// "#).unwrap();
/// let settings = RunSettings::default();
/// let (mut manager, report) = build_execution(&score, &settings).unwrap();
/// assert!(report.is_clean());
///
/// let played = manager.walk(None).unwrap();
/// let ids: Vec<&str> = played.iter().map(|b| b.full_id.as_str()).collect();
/// assert_eq!(ids, vec!["1-1", "1-2", "1-1", "1-2"]);
/// ```
#[derive(Debug)]
pub struct ExecutionManager<'a> {
    score: &'a Score,
    max_steps: usize,
    gotos: HashMap<BeatId, GoTo>,
    loops: HashMap<usize, Loop>,
    tempo: ChangeTable,
    dynamics: ChangeTable,
    cursor: Cursor,
    position: Option<Position>,
    steps: usize,
}

impl<'a> ExecutionManager<'a> {
    pub fn new(score: &'a Score, settings: &RunSettings) -> Result<Self, FlowError> {
        Ok(Self {
            score,
            max_steps: settings.max_steps,
            gotos: HashMap::new(),
            loops: HashMap::new(),
            tempo: ChangeTable::new(ValueKind::Tempo, settings.default_tempo)?,
            dynamics: ChangeTable::new(ValueKind::Dynamics, settings.default_velocity())?,
            cursor: Cursor::NotStarted,
            position: None,
            steps: 0,
        })
    }

    pub fn score(&self) -> &'a Score {
        self.score
    }

    /// Register the straight-line goto for a beat unless it already has one.
    pub fn create_default_goto(&mut self, beat: BeatId) {
        self.goto(beat);
    }

    /// The beat's goto, created as `DEFAULT -> beat.next` if it has none yet.
    pub fn goto(&mut self, beat: BeatId) -> &mut GoTo {
        let next = self.score.beat(beat).next;
        self.gotos.entry(beat).or_insert_with(|| GoTo::with_default(next))
    }

    pub fn find_goto(&self, beat: BeatId) -> Option<&GoTo> {
        self.gotos.get(&beat)
    }

    /// Merge the mappings of `other` into the beat's goto.
    pub fn extend_goto(&mut self, beat: BeatId, other: &GoTo, skip_default: bool) {
        self.goto(beat).extend(other, skip_default);
    }

    /// Jump from `from` to `to` on each of `passes`, or on every pass if `passes` is
    /// empty.
    pub fn process_goto(&mut self, from: BeatId, to: BeatId, passes: &[u32], cycle: Option<u32>) {
        let goto = self.goto(from);
        if passes.is_empty() {
            goto.set(PassKey::Default, Some(to));
        } else {
            for &pass in passes {
                goto.set(PassKey::Pass(pass), Some(to));
            }
        }
        if let Some(cycle) = cycle {
            goto.set_cycle(cycle);
        }
        debug!(
            "goto {} -> {} on passes {:?}",
            self.score.beat(from).full_id(),
            self.score.beat(to).full_id(),
            passes
        );
    }

    /// The loop of the beat's gongan, if it has one. Loops are never created
    /// implicitly.
    pub fn gongan_loop(&self, beat: BeatId) -> Option<&Loop> {
        self.loops.get(&self.score.beat(beat).gongan_id)
    }

    pub fn set_loop(&mut self, gongan_id: usize, lp: Loop) {
        self.loops.insert(gongan_id, lp);
    }

    pub fn has_loop(&self, gongan_id: usize) -> bool {
        self.loops.contains_key(&gongan_id)
    }

    pub fn assign_tempo(&mut self, beat: BeatId, instruction: GradualChangeInstruction) {
        self.tempo.assign(beat, instruction);
    }

    pub fn assign_dynamics(&mut self, beat: BeatId, instruction: GradualChangeInstruction) {
        self.dynamics.assign(beat, instruction);
    }

    /// Reinitialize every counter and the active tempo/dynamics before walking the
    /// score for `position`.
    pub fn reset_all(&mut self, position: Option<&Position>) {
        for goto in self.gotos.values_mut() {
            goto.reset_counter();
        }
        for lp in self.loops.values_mut() {
            lp.reset_counter();
        }
        self.tempo.reset();
        self.dynamics.reset();
        self.cursor = Cursor::NotStarted;
        self.position = position.cloned();
        self.steps = 0;
    }

    pub fn current_beat(&self) -> Option<BeatId> {
        match self.cursor {
            Cursor::At(beat) => Some(beat),
            Cursor::NotStarted | Cursor::Finished => None,
        }
    }

    pub fn current_position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Pass number of the current beat (0 before the traversal starts).
    pub fn current_pass(&self) -> u32 {
        self.current_beat()
            .and_then(|b| self.gotos.get(&b))
            .map_or(0, |g| g.counter())
    }

    /// Loop iteration of the current beat's gongan; a gongan without a loop is on
    /// its first iteration.
    pub fn current_iteration(&self) -> u32 {
        self.current_beat()
            .and_then(|b| self.gongan_loop(b))
            .map_or(1, |l| l.counter().max(1))
    }

    /// `(start_bpm, end_bpm)` for the current beat.
    pub fn get_tempo_values(&self) -> (i32, i32) {
        self.tempo.values()
    }

    /// `(start_velocity, end_velocity)` for the current beat.
    pub fn get_dynamics_values(&self) -> (i32, i32) {
        self.dynamics.values()
    }

    /// Advance to the next beat to perform.
    ///
    /// Returns `Ok(None)` once the end of the score is reached. Calling again after
    /// that is an error until [`reset_all`](Self::reset_all) is called.
    pub fn next_beat_in_flow(&mut self) -> Result<Option<BeatId>, FlowError> {
        let (current, next) = match self.cursor {
            Cursor::Finished => return Err(FlowError::TraversalFinished),
            Cursor::NotStarted => (None, self.score.first_beat()),
            Cursor::At(curr) => (Some(curr), self.flow_target(curr)),
        };

        let Some(next) = next else {
            self.cursor = Cursor::Finished;
            debug!("end of score after {} beats", self.steps);
            return Ok(None);
        };

        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(FlowError::StepLimitExceeded {
                limit: self.max_steps,
            });
        }

        self.enter_beat(current, next);
        self.cursor = Cursor::At(next);

        let (pass, iteration) = (self.current_pass(), self.current_iteration());
        let position = self.position.as_ref();
        self.tempo.update(next, position, pass, iteration);
        self.dynamics.update(next, position, pass, iteration);

        debug!(
            "beat {} pass {} iteration {} tempo {:?} dynamics {:?}",
            self.score.beat(next).full_id(),
            pass,
            iteration,
            self.tempo.values(),
            self.dynamics.values()
        );
        Ok(Some(next))
    }

    /// A loop that is still running takes precedence over the beat's goto.
    fn flow_target(&mut self, curr: BeatId) -> Option<BeatId> {
        let gongan_id = self.score.beat(curr).gongan_id;
        let looped = self
            .loops
            .get(&gongan_id)
            .filter(|lp| lp.from_beat == curr)
            .and_then(|lp| lp.next_beat(curr));
        match looped {
            Some(target) => Some(target),
            None => self.goto(curr).next_beat(),
        }
    }

    /// Update loop and pass counters on arriving at `next`.
    fn enter_beat(&mut self, current: Option<BeatId>, next: BeatId) {
        let score = self.score;
        let beat = score.beat(next);

        let iteration = self.loops.get_mut(&beat.gongan_id).map(|lp| {
            if lp.to_beat == next {
                lp.increment_counter();
            }
            lp.counter()
        });

        // Repeated visits within one loop run are not new passes
        if matches!(iteration, None | Some(0) | Some(1)) {
            self.goto(next).increment_counter();
        }

        // Entering a gongan mid-way: the skipped beats take the pass of the entry beat
        let gongan_changed = current.map_or(true, |c| score.beat(c).gongan_id != beat.gongan_id);
        if gongan_changed && beat.index > 1 {
            let pass = self.goto(next).counter();
            let gongan = score.gongan(beat.gongan_id);
            for &earlier in &gongan.beats[..beat.index - 1] {
                self.goto(earlier).set_counter(pass);
            }
        }
    }

    /// Walk the whole score for one position and collect what is played.
    pub fn walk(&mut self, position: Option<&Position>) -> Result<Vec<PlayedBeat>, FlowError> {
        self.reset_all(position);
        let mut played = Vec::new();
        while let Some(beat) = self.next_beat_in_flow()? {
            played.push(PlayedBeat {
                beat,
                full_id: self.score.beat(beat).full_id(),
                pass: self.current_pass(),
                iteration: self.current_iteration(),
                tempo: self.get_tempo_values(),
                dynamics: self.get_dynamics_values(),
            });
        }
        info!(
            "walked {} beats for {}",
            played.len(),
            position.map_or("all positions", |p| p.as_str())
        );
        Ok(played)
    }
}
