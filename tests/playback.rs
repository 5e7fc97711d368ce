//! End-to-end playback through the registry clock traversal
//!
//! These drive `Registry::clock` tick by tick the way the clock thread does
//! and inspect the merged schedule.

use stepseq::midi::event::NOTE_ON;
use stepseq::{PlayMode, PlayState, Registry, Schedule, ScheduledEvent, SequenceId, SongKey};

const SPC: u64 = 1000;
const BAR: u64 = 96;

fn song_with_note(mode: PlayMode) -> (Registry, SequenceId) {
    let mut registry = Registry::new();
    let key = SongKey::main(1);
    let track = registry.add_track(key).unwrap();
    let sequence = registry.sequence_id(key, track).unwrap();

    let pattern = registry.create_pattern();
    assert!(registry.get_pattern(pattern).add_note(0, 60, 100, 4.0));
    assert!(registry.add_pattern(sequence, 0, 0, pattern, false));
    registry.set_play_mode(sequence, mode);
    (registry, sequence)
}

fn run(registry: &mut Registry, ticks: std::ops::Range<u64>) -> Vec<ScheduledEvent> {
    let mut schedule = Schedule::new();
    for tick in ticks {
        registry.clock(tick * SPC, &mut schedule, tick % BAR == 0, SPC as f64);
    }
    let mut events = Vec::new();
    while let Some(event) = schedule.pop_first() {
        events.push(event);
    }
    events
}

fn notes(events: &[ScheduledEvent]) -> Vec<(u64, u8, u8)> {
    events
        .iter()
        .filter(|e| e.message.command() == NOTE_ON)
        .map(|e| (e.time, e.message.data1(), e.message.data2()))
        .collect()
}

#[test]
fn test_one_bar_loop() {
    let (mut registry, sequence) = song_with_note(PlayMode::Loop);
    registry.set_sequence_play_state(sequence, PlayState::Starting);

    let events = run(&mut registry, 0..BAR);
    // Four steps of six clocks each
    assert_eq!(notes(&events), vec![(0, 60, 100), (24 * SPC - 1, 60, 0)]);
    assert_eq!(registry.sequence(sequence).unwrap().play_state(), PlayState::Playing);
}

#[test]
fn test_loop_repeats_every_bar() {
    let (mut registry, sequence) = song_with_note(PlayMode::Loop);
    registry.set_sequence_play_state(sequence, PlayState::Starting);

    let events = run(&mut registry, 0..2 * BAR);
    assert_eq!(
        notes(&events),
        vec![
            (0, 60, 100),
            (24 * SPC - 1, 60, 0),
            (BAR * SPC, 60, 100),
            ((BAR + 24) * SPC - 1, 60, 0),
        ]
    );
}

#[test]
fn test_oneshot_plays_once() {
    let (mut registry, sequence) = song_with_note(PlayMode::OneShot);
    registry.set_sequence_play_state(sequence, PlayState::Starting);

    let events = run(&mut registry, 0..2 * BAR);
    assert_eq!(notes(&events).len(), 2);
    assert_eq!(registry.sequence(sequence).unwrap().play_state(), PlayState::Stopped);
}

#[test]
fn test_start_waits_for_bar() {
    let (mut registry, sequence) = song_with_note(PlayMode::Loop);

    // Requested part way through a bar: nothing until the next sync
    let mut schedule = Schedule::new();
    for tick in 0..10 {
        registry.clock(tick * SPC, &mut schedule, tick == 0, SPC as f64);
    }
    registry.set_sequence_play_state(sequence, PlayState::Starting);
    for tick in 10..BAR {
        registry.clock(tick * SPC, &mut schedule, false, SPC as f64);
    }
    assert!(schedule.is_empty());

    registry.clock(BAR * SPC, &mut schedule, true, SPC as f64);
    assert_eq!(schedule.pop_first().map(|e| e.time), Some(BAR * SPC));
}

#[test]
fn test_add_pattern_without_force_keeps_track() {
    let (mut registry, sequence) = song_with_note(PlayMode::Loop);
    let other = registry.create_pattern();
    registry.get_pattern(other).add_note(0, 64, 90, 1.0);

    let before = registry.sequence(sequence).unwrap().clone();
    assert!(!registry.add_pattern(sequence, 0, 8, other, false));
    assert_eq!(registry.sequence(sequence).unwrap(), &before);

    assert!(registry.add_pattern(sequence, 0, 8, other, true));
    let track = registry.sequence(sequence).unwrap().track(0).unwrap();
    assert_eq!(track.placements().collect::<Vec<_>>(), vec![(8, other)]);
}

#[test]
fn test_overlapping_note_replaced() {
    let mut registry = Registry::new();
    let pattern = registry.get_pattern(1);
    assert!(pattern.add_note(0, 60, 100, 4.0));
    assert!(pattern.add_note(2, 60, 80, 4.0));

    assert_eq!(pattern.event_count(), 1);
    assert_eq!(pattern.get_note_velocity(0, 60), 0);
    assert_eq!(pattern.get_note_velocity(2, 60), 80);
}

#[test]
fn test_resolution_change_keeps_timing() {
    let mut registry = Registry::new();
    registry.get_pattern(1).add_note(4, 62, 90, 1.0);

    assert!(registry.set_pattern_steps_per_beat(1, 8));
    let pattern = registry.pattern(1).unwrap();
    assert_eq!(pattern.get_note_velocity(8, 62), 90);
    assert_eq!(pattern.get_note_duration(8, 62), 2.0);

    assert!(registry.set_pattern_steps_per_beat(1, 4));
    let pattern = registry.pattern(1).unwrap();
    assert_eq!(pattern.get_note_velocity(4, 62), 90);
    assert_eq!(pattern.get_note_duration(4, 62), 1.0);
    assert!(!registry.set_pattern_steps_per_beat(1, 5));
}

#[test]
fn test_simultaneous_tracks_do_not_collide() {
    let mut registry = Registry::new();
    let key = SongKey::main(1);
    registry.get_pattern(1).add_note(0, 60, 100, 1.0);
    for channel in 0..3 {
        let track = registry.add_track(key).unwrap();
        let sequence = registry.sequence_id(key, track).unwrap();
        registry.add_pattern(sequence, 0, 0, 1, false);
        registry.get_sequence(sequence).track_mut(0).unwrap().set_channel(channel);
        registry.set_sequence_play_state(sequence, PlayState::Starting);
    }

    let events = run(&mut registry, 0..1);
    let times: Vec<u64> = events
        .iter()
        .filter(|e| e.message.data2() == 100)
        .map(|e| e.time)
        .collect();
    assert_eq!(times, vec![0, 1, 2]);
}

#[test]
fn test_transport_stop_silences_song() {
    let (mut registry, sequence) = song_with_note(PlayMode::Loop);
    registry.set_song_play_state(SongKey::main(1), PlayState::Starting);
    run(&mut registry, 0..10);
    assert!(registry.is_song_playing(SongKey::main(1)));

    registry.handle_midi_input(stepseq::MidiEvent::Stop);
    assert_eq!(registry.sequence(sequence).unwrap().play_state(), PlayState::Stopped);
    assert!(run(&mut registry, 10..BAR).is_empty());
}
