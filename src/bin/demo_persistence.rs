// Quick demonstration of the sequencer file format
// Run with: cargo run --bin demo_persistence

use stepseq::{PlayMode, Registry, SongKey, TimebaseType};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("stepseq - Persistence Demo");
    println!("==========================");

    let mut registry = Registry::new();

    let bass = registry.create_pattern();
    {
        let pattern = registry.get_pattern(bass);
        pattern.add_note(0, 36, 100, 2.0);
        pattern.add_note(6, 36, 90, 1.0);
        pattern.add_note(10, 43, 100, 2.0);
    }
    let pad = registry.create_pattern();
    registry.set_pattern_beats(pad, 8);
    registry.get_pattern(pad).add_note(0, 60, 70, 32.0);

    let song = SongKey::main(1);
    for pattern in [bass, pad] {
        let sequence = registry
            .add_track(song)
            .and_then(|track| registry.sequence_id(song, track));
        if let Some(sequence) = sequence {
            registry.add_pattern(sequence, 0, 0, pattern, false);
            registry.set_play_mode(sequence, PlayMode::LoopSync);
        }
    }
    if let Some(song) = registry.get_song(song) {
        song.timebase_mut().add_event(4, 0, TimebaseType::Tempo, 132);
    }

    let launcher = SongKey::pad(1);
    let sequence = registry
        .add_track(launcher)
        .and_then(|track| registry.sequence_id(launcher, track));
    if let Some(sequence) = sequence {
        registry.add_pattern(sequence, 0, 0, bass, false);
        registry.set_trigger_note(sequence, 36);
    }

    println!("✅ Created song with {} tracks", registry.song(song).map_or(0, |s| s.track_count()));
    println!("   - Patterns: {}", registry.patterns().len());
    println!("   - Sequences: {}", registry.sequence_count());

    let path = std::env::temp_dir().join("demo_song.seq");
    registry.save(&path)?;
    let size = std::fs::metadata(&path)?.len();
    println!("\n💾 Saved to: {} ({} bytes)", path.display(), size);

    let mut loaded = Registry::new();
    loaded.load(&path)?;

    println!("\n📂 Loaded:");
    for key in loaded.song_keys() {
        if let Some(song) = loaded.song(key) {
            println!(
                "   - {:?} {}: {} tracks, bar length {} ticks",
                key.slot,
                key.index,
                song.track_count(),
                song.bar_length()
            );
        }
    }
    for (id, pattern) in loaded.patterns() {
        println!(
            "   - Pattern {}: {} beats, {} events",
            id,
            pattern.beats(),
            pattern.event_count()
        );
    }

    std::fs::remove_file(&path)?;
    println!("\n🧹 Cleaned up demo file");
    Ok(())
}
