use super::*;
use crate::config::RunSettings;
use crate::error::FlowError;
use crate::score::{parse_score, BeatId, Position};

fn walk(source: &str, position: Option<&str>) -> Vec<PlayedBeat> {
    let score = parse_score(source).unwrap();
    let settings = RunSettings::default();
    let (mut manager, report) = build_execution(&score, &settings).unwrap();
    assert!(report.is_clean(), "unexpected diagnostics: {:?}", report);
    let position = position.map(Position::from);
    manager.walk(position.as_ref()).unwrap()
}

fn ids(played: &[PlayedBeat]) -> Vec<&str> {
    played.iter().map(|b| b.full_id.as_str()).collect()
}

#[test]
fn test_no_metadata_plays_in_order() {
    let played = walk(
        r#"
gongans:
  - beats: [{}, {}, {}]
  - beats: [{}, {}]
"#,
        None,
    );
    assert_eq!(ids(&played), vec!["1-1", "1-2", "1-3", "2-1", "2-2"]);
    assert!(played.iter().all(|b| b.pass == 1 && b.iteration == 1));
    assert!(played.iter().all(|b| b.tempo == (60, 60) && b.dynamics == (75, 75)));
}

#[test]
fn test_empty_score() {
    let score = parse_score("gongans: []").unwrap();
    let settings = RunSettings::default();
    let (mut manager, _) = build_execution(&score, &settings).unwrap();
    assert!(manager.walk(None).unwrap().is_empty());
}

#[test]
fn test_loop_plays_gongan_cycle_times() {
    let played = walk(
        r#"
gongans:
  - metadata: [{ type: loop, count: 3 }]
    beats: [{}, {}, {}]
  - beats: [{}]
"#,
        None,
    );
    assert_eq!(
        ids(&played),
        vec!["1-1", "1-2", "1-3", "1-1", "1-2", "1-3", "1-1", "1-2", "1-3", "2-1"]
    );
    let iterations: Vec<u32> = played.iter().map(|b| b.iteration).collect();
    assert_eq!(iterations, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 1]);
    // Loop iterations are not new passes
    assert!(played.iter().all(|b| b.pass == 1));
}

#[test]
fn test_loop_runs_again_when_gongan_is_revisited() {
    let played = walk(
        r#"
gongans:
  - metadata:
      - { type: label, name: A }
      - { type: loop, count: 2 }
    beats: [{}, {}]
  - metadata: [{ type: goto, label: A, passes: [1] }]
    beats: [{}]
"#,
        None,
    );
    assert_eq!(
        ids(&played),
        vec!["1-1", "1-2", "1-1", "1-2", "2-1", "1-1", "1-2", "1-1", "1-2", "2-1"]
    );
    let passes: Vec<u32> = played.iter().map(|b| b.pass).collect();
    assert_eq!(passes, vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2]);
}

#[test]
fn test_goto_uses_pass_then_default() {
    // X jumps to Y on pass 1 and falls through to Z afterwards
    let played = walk(
        r#"
gongans:
  - metadata:
      - { type: label, name: X }
      - { type: goto, label: Y, passes: [1], cycle: 99 }
    beats: [{}]
  - beats: [{}]
  - metadata:
      - { type: label, name: Y }
      - { type: goto, label: X, passes: [1] }
    beats: [{}]
"#,
        None,
    );
    assert_eq!(ids(&played), vec!["1-1", "3-1", "1-1", "2-1", "3-1"]);
}

#[test]
fn test_sequence_orders_sections() {
    let played = walk(
        r#"
gongans:
  - metadata:
      - { type: label, name: A }
      - { type: sequence, labels: [A, B, A, C] }
    beats: [{}, {}]
  - metadata: [{ type: label, name: B }]
    beats: [{}]
  - metadata: [{ type: label, name: C }]
    beats: [{}]
"#,
        None,
    );
    assert_eq!(ids(&played), vec!["1-1", "1-2", "2-1", "1-1", "1-2", "3-1"]);
}

#[test]
fn test_tempo_ramp_after_instant_change() {
    let played = walk(
        r#"
gongans:
  - metadata:
      - { type: tempo, value: 60 }
      - { type: tempo, value: 120, first_beat: 5, beat_count: 4 }
    beats: [{}, {}, {}, {}, {}, {}, {}, {}, {}]
"#,
        None,
    );
    let tempi: Vec<(i32, i32)> = played.iter().map(|b| b.tempo).collect();
    assert_eq!(
        tempi,
        vec![
            (60, 60),
            (60, 60),
            (60, 60),
            (60, 60),
            (60, 75),
            (75, 90),
            (90, 105),
            (105, 120),
            (120, 120),
        ]
    );
}

#[test]
fn test_preempted_ramp_continues_from_reached_value() {
    let played = walk(
        r#"
gongans:
  - metadata:
      - { type: tempo, value: 120, beat_count: 4 }
      - { type: tempo, value: 60, first_beat: 3, beat_count: 2 }
    beats: [{}, {}, {}, {}, {}, {}]
"#,
        None,
    );
    let tempi: Vec<(i32, i32)> = played.iter().map(|b| b.tempo).collect();
    assert_eq!(tempi, vec![(60, 75), (75, 90), (90, 75), (75, 60), (60, 60), (60, 60)]);
}

#[test]
fn test_ramp_never_overshoots() {
    let played = walk(
        r#"
gongans:
  - metadata:
      - { type: dynamics, abbreviation: ff, beat_count: 7 }
    beats: [{}, {}, {}, {}, {}, {}, {}, {}]
"#,
        None,
    );
    let mut previous = 75;
    for beat in &played {
        let (start, end) = beat.dynamics;
        assert!(start >= previous && start <= end && end <= 105, "{:?}", beat);
        previous = end;
    }
    assert_eq!(played.last().unwrap().dynamics, (105, 105));
}

#[test]
fn test_dynamics_position_filter() {
    let source = r#"
gongans:
  - metadata:
      - { type: dynamics, abbreviation: f, first_beat: 2, positions: [gangsa] }
    beats: [{}, {}]
"#;
    let gangsa = walk(source, Some("gangsa"));
    let reyong = walk(source, Some("reyong"));
    assert_eq!(gangsa[1].dynamics, (90, 90));
    assert_eq!(reyong[1].dynamics, (75, 75));
}

#[test]
fn test_dynamics_iteration_filter() {
    let played = walk(
        r#"
gongans:
  - metadata:
      - { type: loop, count: 2 }
      - { type: dynamics, abbreviation: p, iterations: [2] }
    beats: [{}, {}]
"#,
        None,
    );
    let velocities: Vec<i32> = played.iter().map(|b| b.dynamics.1).collect();
    assert_eq!(velocities, vec![75, 75, 45, 45]);
}

#[test]
fn test_mid_gongan_entry_corrects_skipped_passes() {
    let played = walk(
        r#"
gongans:
  - metadata: [{ type: goto, label: M, passes: [1] }]
    beats: [{}, {}]
  - metadata:
      - { type: label, name: S }
      - { type: label, name: M, beat: 3 }
      - { type: tempo, value: 90, passes: [2] }
    beats: [{}, {}, {}]
  - metadata: [{ type: goto, label: S, passes: [1] }]
    beats: [{}]
"#,
        None,
    );
    assert_eq!(ids(&played), vec!["1-1", "1-2", "2-3", "3-1", "2-1", "2-2", "2-3", "3-1"]);
    // 2-1 was skipped on the first pass, so this is its second
    assert_eq!(played[4].pass, 2);
    assert_eq!(played[4].tempo, (90, 90));
}

#[test]
fn test_skipped_beats_take_entry_pass() {
    let score = parse_score(
        r#"
gongans:
  - metadata: [{ type: goto, label: M, passes: [1] }]
    beats: [{}]
  - metadata: [{ type: label, name: M, beat: 3 }]
    beats: [{}, {}, {}]
"#,
    )
    .unwrap();
    let settings = RunSettings::default();
    let (mut manager, _) = build_execution(&score, &settings).unwrap();
    manager.walk(None).unwrap();

    assert_eq!(manager.find_goto(BeatId(1)).unwrap().counter(), 1);
    assert_eq!(manager.find_goto(BeatId(2)).unwrap().counter(), 1);
    assert_eq!(manager.find_goto(BeatId(3)).unwrap().counter(), 1);
}

#[test]
fn test_skipped_beat_pass_respects_its_cycle() {
    let score = parse_score(
        r#"
gongans:
  - metadata:
      - { type: label, name: X }
      - { type: goto, label: M, passes: [1, 2] }
    beats: [{}]
  - metadata:
      - { type: label, name: N, beat: 2 }
      - { type: label, name: M, beat: 3 }
      - { type: goto, label: N, from_beat: 1, passes: [1], cycle: 1 }
    beats: [{}, {}, {}]
  - metadata: [{ type: goto, label: X, passes: [1] }]
    beats: [{}]
"#,
    )
    .unwrap();
    let settings = RunSettings::default();
    let (mut manager, report) = build_execution(&score, &settings).unwrap();
    assert!(report.is_clean(), "{:?}", report);

    let played = manager.walk(None).unwrap();
    assert_eq!(ids(&played), vec!["1-1", "2-3", "3-1", "1-1", "2-3", "3-1"]);
    assert_eq!(played[4].pass, 2);
    // 2-1 has a cycle of 1, so pass 2 wraps back to 1
    assert_eq!(manager.find_goto(BeatId(1)).unwrap().counter(), 1);
    assert_eq!(manager.find_goto(BeatId(2)).unwrap().counter(), 2);
}

#[test]
fn test_walks_are_independent() {
    let score = parse_score(
        r#"
gongans:
  - metadata:
      - { type: label, name: A }
      - { type: dynamics, abbreviation: pp, first_beat: 2, passes: [2], positions: [reyong] }
    beats: [{}, {}]
  - metadata: [{ type: goto, label: A, passes: [1] }]
    beats: [{}]
"#,
    )
    .unwrap();
    let settings = RunSettings::default();
    let (mut manager, _) = build_execution(&score, &settings).unwrap();
    let gangsa = Position::from("gangsa");
    let reyong = Position::from("reyong");

    let first_gangsa = manager.walk(Some(&gangsa)).unwrap();
    let first_reyong = manager.walk(Some(&reyong)).unwrap();
    let second_reyong = manager.walk(Some(&reyong)).unwrap();
    let second_gangsa = manager.walk(Some(&gangsa)).unwrap();

    assert_eq!(first_gangsa, second_gangsa);
    assert_eq!(first_reyong, second_reyong);
    assert_eq!(first_reyong[4].dynamics, (30, 30));
    assert_eq!(first_gangsa[4].dynamics, (75, 75));
}

#[test]
fn test_step_limit() {
    let score = parse_score(
        r#"
gongans:
  - metadata:
      - { type: label, name: A }
      - { type: goto, label: A }
    beats: [{}, {}]
"#,
    )
    .unwrap();
    let settings = RunSettings {
        max_steps: 50,
        ..RunSettings::default()
    };
    let (mut manager, _) = build_execution(&score, &settings).unwrap();
    assert_eq!(manager.walk(None), Err(FlowError::StepLimitExceeded { limit: 50 }));
}

#[test]
fn test_stepping_past_the_end() {
    let score = parse_score("gongans:\n  - beats: [{}, {}]\n").unwrap();
    let settings = RunSettings::default();
    let (mut manager, _) = build_execution(&score, &settings).unwrap();
    manager.reset_all(None);

    assert_eq!(manager.current_beat(), None);
    assert_eq!(manager.get_tempo_values(), (60, 60));
    assert_eq!(manager.next_beat_in_flow(), Ok(Some(BeatId(0))));
    assert_eq!(manager.current_pass(), 1);
    assert_eq!(manager.next_beat_in_flow(), Ok(Some(BeatId(1))));
    assert_eq!(manager.next_beat_in_flow(), Ok(None));
    assert_eq!(manager.current_beat(), None);
    assert_eq!(manager.next_beat_in_flow(), Err(FlowError::TraversalFinished));

    manager.reset_all(None);
    assert_eq!(manager.next_beat_in_flow(), Ok(Some(BeatId(0))));
}

#[test]
fn test_loops_are_not_created_implicitly() {
    let score = parse_score("gongans:\n  - beats: [{}]\n").unwrap();
    let settings = RunSettings::default();
    let (mut manager, _) = build_execution(&score, &settings).unwrap();
    assert!(manager.gongan_loop(BeatId(0)).is_none());
    assert_eq!(manager.goto(BeatId(0)).target(PassKey::Default), Some(None));
}
