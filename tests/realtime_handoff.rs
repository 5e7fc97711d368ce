// Integration test: clock thread and realtime processor working together
// Drives the processor the way an audio callback would, without a device

use std::thread;
use std::time::Duration;
use stepseq::{
    Engine, EngineConfig, FreeRunningTransport, MidiEvent, MidiMessage, PlayMode, PlayState,
    Registry, SongKey,
};

const SAMPLE_RATE: u32 = 48_000;
const BUFFER_SIZE: u32 = 256;
const MAX_BUFFERS: usize = 4000;

fn playing_registry() -> Registry {
    let mut registry = Registry::new();
    let key = SongKey::main(1);
    let track = registry.add_track(key).unwrap();
    let sequence = registry.sequence_id(key, track).unwrap();
    registry.get_pattern(1).add_note(0, 60, 100, 1.0);
    registry.add_pattern(sequence, 0, 0, 1, false);
    registry.set_play_mode(sequence, PlayMode::Loop);
    registry.set_sequence_play_state(sequence, PlayState::Starting);
    registry
}

#[test]
fn test_scheduled_notes_reach_the_callback() {
    let config = EngineConfig {
        idle_wait_ms: 1,
        ..EngineConfig::default()
    };
    let (mut engine, mut processor) = Engine::start(playing_registry(), &config).unwrap();
    let mut transport = FreeRunningTransport::new(SAMPLE_RATE, 120.0, 4);

    let mut emitted: Vec<(u64, u32, MidiMessage)> = Vec::new();
    for _ in 0..MAX_BUFFERS {
        let buffer_start = transport.frame();
        processor.process(
            &transport.position(),
            buffer_start,
            BUFFER_SIZE,
            std::iter::empty(),
            |offset, message| emitted.push((buffer_start, offset, message)),
        );
        transport.advance(BUFFER_SIZE);
        if emitted.len() >= 2 {
            break;
        }
        thread::sleep(Duration::from_micros(200));
    }

    assert!(emitted.len() >= 2, "no events after {MAX_BUFFERS} buffers");
    let (_, offset, note_on) = emitted[0];
    assert_eq!(note_on.data1(), 60);
    assert_eq!(note_on.data2(), 100);
    assert!(offset < BUFFER_SIZE);

    let (_, _, note_off) = emitted[1];
    assert_eq!(note_off.data1(), 60);
    assert_eq!(note_off.data2(), 0);

    assert_eq!(processor.dropped_input(), 0);
    assert_eq!(processor.pending_overflows(), 0);
    engine.stop();
    assert!(!engine.is_running());
}

#[test]
fn test_input_is_forwarded_to_the_clock_thread() {
    let (engine, mut processor) = Engine::start(Registry::new(), &EngineConfig::default()).unwrap();
    let mut transport = FreeRunningTransport::new(SAMPLE_RATE, 120.0, 4);
    transport.set_rolling(false);

    let mut input = Some(MidiEvent::SongSelect(4));
    let mut selected = 1;
    for _ in 0..MAX_BUFFERS {
        processor.process(
            &transport.position(),
            transport.frame(),
            BUFFER_SIZE,
            input.take(),
            |_, _| {},
        );
        selected = engine.with_registry(|r| r.selected_song()).unwrap();
        if selected == 4 {
            break;
        }
        thread::sleep(Duration::from_micros(200));
    }
    assert_eq!(selected, 4);
}

#[test]
fn test_stopped_transport_emits_nothing() {
    let (engine, mut processor) = Engine::start(playing_registry(), &EngineConfig::default()).unwrap();
    let mut transport = FreeRunningTransport::new(SAMPLE_RATE, 120.0, 4);
    transport.set_rolling(false);

    let mut count = 0;
    for _ in 0..50 {
        processor.process(
            &transport.position(),
            transport.frame(),
            BUFFER_SIZE,
            std::iter::empty(),
            |_, _| count += 1,
        );
        thread::sleep(Duration::from_micros(200));
    }
    assert_eq!(count, 0);
    assert_eq!(processor.pending(), 0);
    drop(engine);
}
