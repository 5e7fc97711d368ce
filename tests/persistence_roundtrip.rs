// Integration test for sequencer state persistence
// Save to disk, load into a fresh registry and play the result

use stepseq::{
    PersistenceError, PlayMode, PlayState, Registry, Schedule, SongKey, TimebaseType,
};
use tempfile::tempdir;

fn build_registry() -> Registry {
    let mut registry = Registry::new();

    // Bass line with a stutter and a filter ramp
    let bass = registry.create_pattern();
    {
        let pattern = registry.get_pattern(bass);
        pattern.add_note(0, 36, 110, 2.0);
        pattern.add_note(8, 38, 100, 2.0);
        pattern.set_note_duration(8, 38, 1.5);
        pattern.add_control(0, 74, 20, 100, 16.0);
        pattern.set_scale(3);
        pattern.set_tonic(2);
    }

    // Half-time pattern at triplet resolution
    let lead = registry.create_pattern();
    registry.set_pattern_beats(lead, 8);
    registry.set_pattern_steps_per_beat(lead, 3);
    registry.get_pattern(lead).add_note(5, 72, 64, 3.0);

    let song = SongKey::main(2);
    for (pattern, mode, channel) in [(bass, PlayMode::Loop, 1), (lead, PlayMode::LoopAll, 2)] {
        let track = registry.add_track(song).unwrap();
        let sequence = registry.sequence_id(song, track).unwrap();
        registry.add_pattern(sequence, 0, 0, pattern, false);
        registry.set_play_mode(sequence, mode);
        registry.get_sequence(sequence).track_mut(0).unwrap().set_channel(channel);
    }
    {
        let timebase = registry.get_song(song).unwrap().timebase_mut();
        timebase.add_event(1, 0, TimebaseType::Tempo, 100);
        timebase.add_event(3, 12, TimebaseType::TimeSig, 3);
    }

    let pads = SongKey::pad(2);
    for note in [48, 49] {
        let track = registry.add_track(pads).unwrap();
        let sequence = registry.sequence_id(pads, track).unwrap();
        registry.add_pattern(sequence, 0, 0, bass, false);
        registry.set_play_mode(sequence, PlayMode::OneShot);
        registry.set_trigger_note(sequence, note);
    }

    registry
}

#[test]
fn test_complete_save_load_cycle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.seq");

    let original = build_registry();
    original.save(&path).unwrap();
    assert!(path.exists());

    let mut loaded = Registry::new();
    loaded.load(&path).unwrap();

    // Patterns
    assert_eq!(loaded.patterns().len(), 2);
    assert_eq!(loaded.pattern(1), original.pattern(1));
    let lead = loaded.pattern(2).unwrap();
    assert_eq!(lead.beats(), 8);
    assert_eq!(lead.steps_per_beat(), 3);
    assert_eq!(lead.get_note_velocity(5, 72), 64);
    assert_eq!(loaded.pattern(1).unwrap().get_note_duration(8, 38), 1.5);

    // Songs
    let song = loaded.song(SongKey::main(2)).unwrap();
    assert_eq!(song.track_count(), 2);
    assert_eq!(song.timebase(), original.song(SongKey::main(2)).unwrap().timebase());
    let modes: Vec<PlayMode> = song
        .tracks()
        .iter()
        .map(|&id| loaded.sequence(id).unwrap().play_mode())
        .collect();
    assert_eq!(modes, vec![PlayMode::Loop, PlayMode::LoopAll]);
    let channels: Vec<u8> = song
        .tracks()
        .iter()
        .map(|&id| loaded.sequence(id).unwrap().track(0).unwrap().channel())
        .collect();
    assert_eq!(channels, vec![1, 2]);

    assert_eq!(loaded.song(SongKey::pad(2)).unwrap().track_count(), 2);
}

#[test]
fn test_loaded_pads_trigger_and_play() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pads.seq");
    build_registry().save(&path).unwrap();

    let mut registry = Registry::new();
    registry.load(&path).unwrap();
    registry.play_song(2);

    let id = registry.trigger(49).unwrap();
    assert_eq!(registry.sequence(id).unwrap().play_state(), PlayState::Starting);

    let mut schedule = Schedule::new();
    registry.clock(0, &mut schedule, true, 500.0);
    let first = schedule.pop_first().unwrap();
    assert_eq!(first.time, 0);
    assert_eq!(first.message.data1(), 36);
    assert_eq!(first.message.data2(), 110);
}

#[test]
fn test_load_missing_file() {
    let dir = tempdir().unwrap();
    let mut registry = build_registry();

    let result = registry.load(dir.path().join("missing.seq"));
    assert!(matches!(result, Err(PersistenceError::Io(_))));
}

#[test]
fn test_load_garbage_resets_model() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.seq");
    std::fs::write(&path, b"not a sequencer file").unwrap();

    let mut registry = build_registry();
    assert!(registry.load(&path).is_err());
    assert!(registry.patterns().is_empty());
    assert!(registry.song(SongKey::main(2)).is_none());
    // The editor song is always there
    assert!(registry.song(SongKey::EDITOR).is_some());
}

#[test]
fn test_save_is_deterministic() {
    let registry = build_registry();
    let first = registry.to_bytes();
    let reloaded = Registry::from_bytes(&first).unwrap();
    assert_eq!(reloaded.to_bytes(), first);
}
