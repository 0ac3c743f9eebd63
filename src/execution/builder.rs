//! Translation of gongan metadata into flow directives and gradual changes.
//!
//! Labels from the whole score are collected first so that a goto or sequence can
//! refer to a label defined later in the score. Sequences are applied after every
//! other directive, so the passes they allocate never collide with an explicit goto
//! pass. Malformed directives are reported and skipped; the rest of the score still
//! builds.

use super::flow::{Flow, GoTo, Loop, PassKey, DEFAULT_CYCLE};
use super::gradual::{GradualChangeInstruction, ValueKind};
use super::manager::ExecutionManager;
use crate::config::RunSettings;
use crate::error::FlowError;
use crate::score::{BeatId, Gongan, MetaData, Position, Score};
use log::{debug, warn};
use std::collections::HashMap;

/// Diagnostics collected while building
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub diagnostics: Vec<FlowError>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Ramp fields shared by tempo and dynamics directives
struct RampSpec<'m> {
    kind: ValueKind,
    target: i32,
    first_beat: usize,
    beat_count: i32,
    passes: &'m [u32],
    iterations: &'m [u32],
    positions: &'m [Position],
}

struct ExecutionBuilder<'a> {
    score: &'a Score,
    settings: &'a RunSettings,
    manager: ExecutionManager<'a>,
    labels: HashMap<&'a str, BeatId>,
    report: BuildReport,
}

/// Build an [`ExecutionManager`] for `score`, populated from its metadata.
///
/// Fails only if the settings' default tempo or dynamics cannot seed a traversal;
/// problems in the score's metadata end up in the returned [`BuildReport`].
pub fn build_execution<'a>(
    score: &'a Score,
    settings: &'a RunSettings,
) -> Result<(ExecutionManager<'a>, BuildReport), FlowError> {
    let builder = ExecutionBuilder {
        score,
        settings,
        manager: ExecutionManager::new(score, settings)?,
        labels: HashMap::new(),
        report: BuildReport::default(),
    };
    Ok(builder.build())
}

impl<'a> ExecutionBuilder<'a> {
    fn build(mut self) -> (ExecutionManager<'a>, BuildReport) {
        let score = self.score;
        for beat in score.beats() {
            self.manager.create_default_goto(beat.id);
        }

        for gongan in &score.gongans {
            for meta in &gongan.metadata {
                if let MetaData::Label { name, beat } = meta {
                    self.add_label(gongan, name, *beat);
                }
            }
        }

        for gongan in &score.gongans {
            for meta in &gongan.metadata {
                self.apply(gongan, meta);
            }
        }

        // Sequences take pass numbers above every explicit goto pass, so they go last
        for gongan in &score.gongans {
            for meta in &gongan.metadata {
                if let MetaData::Sequence { labels } = meta {
                    self.apply_sequence(gongan, labels);
                }
            }
        }

        (self.manager, self.report)
    }

    fn report(&mut self, gongan: &Gongan, message: String) {
        let error = FlowError::MetadataError {
            gongan: gongan.id,
            message,
        };
        warn!("{}", error);
        self.report.diagnostics.push(error);
    }

    fn add_label(&mut self, gongan: &'a Gongan, name: &'a str, beat: usize) {
        let Some(beat_id) = gongan.beat_at(beat) else {
            self.report(gongan, format!("label '{}' refers to beat {} which does not exist", name, beat));
            return;
        };
        if self.labels.contains_key(name) {
            self.report(gongan, format!("label '{}' is defined more than once", name));
            return;
        }
        self.labels.insert(name, beat_id);
    }

    fn resolve_label(&mut self, gongan: &Gongan, name: &str) -> Option<BeatId> {
        let found = self.labels.get(name).copied();
        if found.is_none() {
            self.report(gongan, format!("undefined label '{}'", name));
        }
        found
    }

    fn apply(&mut self, gongan: &'a Gongan, meta: &'a MetaData) {
        match meta {
            MetaData::Label { .. } | MetaData::Sequence { .. } => {}
            MetaData::GoTo {
                label,
                from_beat,
                passes,
                cycle,
            } => self.apply_goto(gongan, label, *from_beat, passes, *cycle),
            MetaData::Loop { count } => self.apply_loop(gongan, *count),
            MetaData::Tempo {
                value,
                first_beat,
                beat_count,
                passes,
                iterations,
            } => self.apply_ramp(
                gongan,
                RampSpec {
                    kind: ValueKind::Tempo,
                    target: *value,
                    first_beat: *first_beat,
                    beat_count: *beat_count,
                    passes,
                    iterations,
                    positions: &[],
                },
            ),
            MetaData::Dynamics {
                abbreviation,
                first_beat,
                beat_count,
                passes,
                iterations,
                positions,
            } => {
                let Some(velocity) = self.settings.velocity_for(abbreviation) else {
                    self.report(gongan, format!("unknown dynamics '{}'", abbreviation));
                    return;
                };
                self.apply_ramp(
                    gongan,
                    RampSpec {
                        kind: ValueKind::Dynamics,
                        target: velocity,
                        first_beat: *first_beat,
                        beat_count: *beat_count,
                        passes,
                        iterations,
                        positions,
                    },
                )
            }
        }
    }

    fn apply_goto(&mut self, gongan: &Gongan, label: &str, from_beat: Option<usize>, passes: &[u32], cycle: Option<u32>) {
        let Some(to) = self.resolve_label(gongan, label) else {
            return;
        };
        let number = from_beat.unwrap_or(gongan.beats.len());
        let Some(from) = gongan.beat_at(number) else {
            self.report(gongan, format!("goto '{}' starts from beat {} which does not exist", label, number));
            return;
        };
        if cycle == Some(0) {
            self.report(gongan, format!("goto '{}' has a cycle of 0", label));
            return;
        }
        let bound = cycle.unwrap_or(DEFAULT_CYCLE);
        if let Some(pass) = passes.iter().find(|&&p| p == 0 || p > bound) {
            self.report(
                gongan,
                format!("goto '{}' uses pass {} which never occurs with cycle {}", label, pass, bound),
            );
            return;
        }
        self.manager.process_goto(from, to, passes, cycle);
    }

    fn apply_loop(&mut self, gongan: &Gongan, count: u32) {
        if count == 0 {
            self.report(gongan, "loop count must be at least 1".to_string());
            return;
        }
        if self.manager.has_loop(gongan.id) {
            self.report(gongan, "gongan has more than one loop".to_string());
            return;
        }
        self.manager
            .set_loop(gongan.id, Loop::new(gongan.last_beat(), gongan.first_beat(), count));
        debug!("loop gongan {} x{}", gongan.id, count);
    }

    /// Each consecutive pair of labels becomes a jump from the end of the first
    /// label's gongan, on the next unused pass of that beat. Either every jump is
    /// registered or none is.
    fn apply_sequence(&mut self, gongan: &Gongan, labels: &[String]) {
        let mut targets = Vec::with_capacity(labels.len());
        for name in labels {
            match self.resolve_label(gongan, name) {
                Some(beat) => targets.push(beat),
                None => return,
            }
        }

        let mut next_pass: HashMap<BeatId, u32> = HashMap::new();
        let mut jumps = Vec::with_capacity(targets.len().saturating_sub(1));
        for pair in targets.windows(2) {
            let from = self.score.gongan_of(pair[0]).last_beat();
            let pass = *next_pass
                .entry(from)
                .or_insert_with(|| self.manager.find_goto(from).map_or(0, |g| g.max_pass_number()))
                + 1;
            next_pass.insert(from, pass);

            let cycle = self.manager.find_goto(from).map_or(DEFAULT_CYCLE, |g| g.cycle());
            if pass > cycle {
                self.report(
                    gongan,
                    format!(
                        "sequence needs pass {} at beat {} whose cycle is {}",
                        pass,
                        self.score.beat(from).full_id(),
                        cycle
                    ),
                );
                return;
            }
            jumps.push((from, pass, pair[1]));
        }

        for (from, pass, to) in jumps {
            let mut jump = GoTo::new(DEFAULT_CYCLE);
            jump.set(PassKey::Pass(pass), Some(to));
            self.manager.extend_goto(from, &jump, true);
            debug!(
                "sequence {} -> {} on pass {}",
                self.score.beat(from).full_id(),
                self.score.beat(to).full_id(),
                pass
            );
        }
    }

    fn apply_ramp(&mut self, gongan: &Gongan, spec: RampSpec<'_>) {
        let Some(beat) = gongan.beat_at(spec.first_beat) else {
            self.report(
                gongan,
                format!("{:?} change starts at beat {} which does not exist", spec.kind, spec.first_beat),
            );
            return;
        };
        let len = gongan.beats.len() as i64;
        if spec.first_beat as i64 - 1 + i64::from(spec.beat_count) > len {
            self.report(
                gongan,
                format!(
                    "{:?} change over {} beats from beat {} runs past the end of the gongan ({} beats)",
                    spec.kind, spec.beat_count, spec.first_beat, len
                ),
            );
            return;
        }

        let instruction = match GradualChangeInstruction::new(spec.kind, spec.target, spec.beat_count) {
            Ok(instruction) => instruction.with_filters(
                spec.positions.to_vec(),
                spec.passes.to_vec(),
                spec.iterations.to_vec(),
            ),
            Err(e) => {
                self.report(gongan, e.to_string());
                return;
            }
        };

        match spec.kind {
            ValueKind::Tempo => self.manager.assign_tempo(beat, instruction),
            ValueKind::Dynamics => self.manager.assign_dynamics(beat, instruction),
        }
    }
}
