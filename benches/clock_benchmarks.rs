use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use stepseq::clock::{FreeRunningTransport, PulseClock};
use stepseq::{
    MidiMessage, PlayMode, PlayState, RealtimeScheduler, Registry, Schedule, ScheduledEvent,
    SongKey,
};

/// Song with `tracks` sequences, each playing a busy one-bar pattern
fn busy_registry(tracks: usize) -> Registry {
    let mut registry = Registry::new();
    let pattern = registry.create_pattern();
    {
        let pattern = registry.get_pattern(pattern);
        for step in 0..16 {
            pattern.add_note(step, 36 + step as u8, 100, 0.5);
        }
        pattern.add_control(0, 74, 0, 127, 16.0);
    }

    let key = SongKey::main(1);
    for _ in 0..tracks {
        let track = registry.add_track(key).unwrap();
        if let Some(sequence) = registry.sequence_id(key, track) {
            registry.add_pattern(sequence, 0, 0, pattern, false);
            registry.set_play_mode(sequence, PlayMode::Loop);
            registry.set_sequence_play_state(sequence, PlayState::Starting);
        }
    }
    registry
}

/// Benchmark one bar of clock traversal (the clock thread's whole job)
fn bench_registry_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_clock");

    for tracks in [1, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(tracks), &tracks, |b, &tracks| {
            let mut registry = busy_registry(tracks);
            let mut schedule = Schedule::new();
            let mut now = 0u64;
            b.iter(|| {
                for tick in 0..96u64 {
                    registry.clock(now, &mut schedule, tick == 0, 1000.0);
                    now += 1000;
                }
                black_box(schedule.len());
                schedule.clear();
            });
        });
    }
    group.finish();
}

/// Benchmark the realtime drain (runs inside the audio callback)
fn bench_realtime_drain(c: &mut Criterion) {
    let buffer_size = 256u32;

    c.bench_function("realtime_drain_256_events", |b| {
        let mut scheduler = RealtimeScheduler::new(1024);
        b.iter(|| {
            for i in 0..256u64 {
                scheduler.push(ScheduledEvent::new(
                    (i * 7) % buffer_size as u64,
                    MidiMessage::note_on(0, 60, 100),
                ));
            }
            let mut count = 0;
            scheduler.drain(0, buffer_size, |offset, message| {
                black_box((offset, message));
                count += 1;
            });
            black_box(count);
        });
    });
}

/// Benchmark pulse derivation from the transport
fn bench_pulse_clock(c: &mut Criterion) {
    c.bench_function("pulse_clock_one_second", |b| {
        b.iter(|| {
            let mut clock = PulseClock::new();
            let mut transport = FreeRunningTransport::new(48_000, 120.0, 4);
            let mut pulses = 0;
            while transport.frame() < 48_000 {
                pulses += clock.for_each_pulse(&transport.position(), transport.frame(), 256, |p| {
                    black_box(p);
                });
                transport.advance(256);
            }
            black_box(pulses);
        });
    });
}

criterion_group!(
    benches,
    bench_registry_clock,
    bench_realtime_drain,
    bench_pulse_clock
);
criterion_main!(benches);
