//! # MIDI Output
//!
//! Renders a walked score as a Standard MIDI File (format 1).
//!
//! ## Track Layout
//! - Track 0: score title and the tempo map
//! - Tracks 1+: one per instrument position, with track name, program change and
//!   notes
//!
//! Each track comes from its own walk of the flow graph, so pass-specific notation
//! and position-specific dynamics are honoured. Tempo directives never depend on the
//! position, so the tempo map is taken from a position-independent walk.
//!
//! Values that ramp within a beat (start != end) are interpolated linearly: note
//! velocity at each note onset, tempo at `TEMPO_STEPS` points across the beat.

use crate::config::{InstrumentSettings, RunSettings};
use crate::error::FlowError;
use crate::execution::ExecutionManager;
use crate::score::{Position, Score};
use log::info;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Track, TrackEvent, TrackEventKind};

/// Tempo events per beat while the tempo is ramping
const TEMPO_STEPS: u32 = 4;

/// General MIDI percussion channel, never assigned automatically
const PERCUSSION_CHANNEL: u8 = 9;

/// Event at an absolute tick; `order` breaks ties so note-offs come before note-ons
struct TimedEvent<'a> {
    tick: u32,
    order: u8,
    kind: TrackEventKind<'a>,
}

/// Positions to render: the configured instruments, or every position in the score
/// on automatically assigned channels.
pub fn track_plan(score: &Score, settings: &RunSettings) -> Result<Vec<(Position, InstrumentSettings)>, FlowError> {
    if !settings.instruments.is_empty() {
        return Ok(settings
            .instruments
            .iter()
            .map(|(p, i)| (p.clone(), *i))
            .collect());
    }

    let mut channels = (0..16u8).filter(|&c| c != PERCUSSION_CHANNEL);
    score
        .positions()
        .into_iter()
        .map(|position| {
            let channel = channels.next().ok_or_else(|| {
                FlowError::MidiError(format!("no MIDI channel left for position '{}'", position))
            })?;
            Ok((position.clone(), InstrumentSettings { channel, program: 0 }))
        })
        .collect()
}

/// Walk the score once per track and serialize the result.
pub fn write_midi(score: &Score, manager: &mut ExecutionManager<'_>, settings: &RunSettings) -> Result<Vec<u8>, FlowError> {
    let plan = track_plan(score, settings)?;
    let title = score.title.clone().unwrap_or_default();

    let mut tracks = vec![conductor_track(score, manager, settings, &title)?];
    for (position, instrument) in &plan {
        tracks.push(position_track(score, manager, settings, position, *instrument)?);
    }

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: midly::Timing::Metrical(u15::from(settings.ppq)),
        },
        tracks,
    };

    let mut out = Vec::new();
    smf.write(&mut out)
        .map_err(|e| FlowError::MidiError(format!("failed to write MIDI: {}", e)))?;
    info!("wrote {} tracks, {} bytes", smf.tracks.len(), out.len());
    Ok(out)
}

fn conductor_track<'a>(
    score: &Score,
    manager: &mut ExecutionManager<'_>,
    settings: &RunSettings,
    title: &'a str,
) -> Result<Track<'a>, FlowError> {
    let ppq = f64::from(settings.ppq);
    let mut events = vec![TimedEvent {
        tick: 0,
        order: 0,
        kind: TrackEventKind::Meta(MetaMessage::TrackName(title.as_bytes())),
    }];

    let mut beat_start = 0.0;
    let mut last_bpm = None;
    for played in manager.walk(None)? {
        let duration = score.beat(played.beat).duration;
        let (start, end) = played.tempo;
        let steps = if start == end { 1 } else { TEMPO_STEPS };
        for step in 0..steps {
            let fraction = f64::from(step) / f64::from(steps);
            let bpm = interpolate(start, end, fraction).max(1);
            if last_bpm != Some(bpm) {
                events.push(TimedEvent {
                    tick: to_ticks(beat_start + duration * fraction, ppq),
                    order: 1,
                    kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(60_000_000 / bpm as u32))),
                });
                last_bpm = Some(bpm);
            }
        }
        beat_start += duration;
    }

    Ok(finish_track(events, to_ticks(beat_start, ppq)))
}

fn position_track<'a>(
    score: &Score,
    manager: &mut ExecutionManager<'_>,
    settings: &RunSettings,
    position: &'a Position,
    instrument: InstrumentSettings,
) -> Result<Track<'a>, FlowError> {
    let ppq = f64::from(settings.ppq);
    let channel = u4::from(instrument.channel);
    let mut events = vec![
        TimedEvent {
            tick: 0,
            order: 0,
            kind: TrackEventKind::Meta(MetaMessage::TrackName(position.as_str().as_bytes())),
        },
        TimedEvent {
            tick: 0,
            order: 0,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::from(instrument.program),
                },
            },
        },
    ];

    let mut beat_start = 0.0;
    let mut note_count = 0usize;
    for played in manager.walk(Some(position))? {
        let beat = score.beat(played.beat);
        let (start, end) = played.dynamics;
        let mut offset = 0.0;
        for note in beat.notes(position, played.pass) {
            if let Some(key) = note.key {
                let velocity = interpolate(start, end, offset / beat.duration).clamp(1, 127) as u8;
                let on = to_ticks(beat_start + offset, ppq);
                let off = to_ticks(beat_start + offset + note.duration, ppq).max(on + 1);
                events.push(TimedEvent {
                    tick: on,
                    order: 2,
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOn {
                            key: u7::from(key),
                            vel: u7::from(velocity),
                        },
                    },
                });
                events.push(TimedEvent {
                    tick: off,
                    order: 1,
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOff {
                            key: u7::from(key),
                            vel: u7::from(0),
                        },
                    },
                });
                note_count += 1;
            }
            offset += note.duration;
        }
        beat_start += beat.duration;
    }

    info!("{}: {} notes on channel {}", position, note_count, instrument.channel);
    Ok(finish_track(events, to_ticks(beat_start, ppq)))
}

/// Sort by absolute tick, convert to delta times and close the track.
fn finish_track(mut events: Vec<TimedEvent<'_>>, end_tick: u32) -> Track<'_> {
    events.sort_by_key(|e| (e.tick, e.order));

    let mut track = Vec::with_capacity(events.len() + 1);
    let mut prev_tick = 0;
    for event in events {
        track.push(TrackEvent {
            delta: u28::from(event.tick - prev_tick),
            kind: event.kind,
        });
        prev_tick = event.tick;
    }
    track.push(TrackEvent {
        delta: u28::from(end_tick.saturating_sub(prev_tick)),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn to_ticks(beats: f64, ppq: f64) -> u32 {
    (beats * ppq).round() as u32
}

fn interpolate(start: i32, end: i32, fraction: f64) -> i32 {
    start + (f64::from(end - start) * fraction).round() as i32
}
