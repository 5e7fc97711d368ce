use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample, Stream, StreamConfig};
use env_logger::Env;
use ringbuf::traits::{Consumer, Producer};
use stepseq::midi::input::MidiInput;
use stepseq::midi::output::MidiOutput;
use stepseq::scheduler::channels::{
    InputConsumer, OutputProducer, create_input_channel, create_output_channel,
};
use stepseq::{
    Engine, EngineConfig, EngineError, FreeRunningTransport, PlayMode, PlayState,
    RealtimeProcessor, Registry, SongKey,
};
use std::error::Error;

// Emitted messages waiting for the MIDI output thread
// A full bar of 16th notes on 16 channels is well under this
const OUTPUT_RINGBUFFER_CAPACITY: usize = 1024;

const DEMO_SONG: SongKey = SongKey::main(1);

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    println!("=== stepseq ===");
    println!("Usage: stepseq [config.json] [song.seq]\n");

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::from_file(&path)?,
        None => EngineConfig::default(),
    };

    let mut registry = Registry::new();
    match args.next() {
        Some(path) => registry.load(&path)?,
        None => build_demo_song(&mut registry),
    }
    config.apply(&mut registry);
    registry.play_song(DEMO_SONG.index);
    let song = registry.song(DEMO_SONG).cloned().unwrap_or_default();

    let (engine, processor) = Engine::start(registry, &config)?;

    let (input_tx, input_rx) = create_input_channel(config.input_capacity);
    let (output_tx, output_rx) = create_output_channel(OUTPUT_RINGBUFFER_CAPACITY);
    let _midi_in = MidiInput::new(&config.client_name, input_tx)?;
    let _midi_out = MidiOutput::new(&config.client_name, output_rx, config.idle_wait())?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EngineError::Audio("No audio device found".to_string()))?;
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let mut stream_config: StreamConfig = supported.into();
    if stream_config.sample_rate.0 == 0 {
        stream_config.sample_rate.0 = config.fallback_sample_rate;
    }

    println!(
        "Audio device: {} ({} Hz)",
        device.name().unwrap_or_else(|_| "Unknown".to_string()),
        stream_config.sample_rate.0
    );

    let transport =
        FreeRunningTransport::for_song(stream_config.sample_rate.0, &song, config.default_tempo);
    log::info!(
        "Transport at {} BPM, {} beats per bar",
        transport.position().beats_per_minute,
        transport.position().beats_per_bar
    );
    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, processor, transport, input_rx, output_tx)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, processor, transport, input_rx, output_tx)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &stream_config, processor, transport, input_rx, output_tx)
        }
        other => {
            return Err(Box::new(EngineError::Audio(format!(
                "Unsupported sample format: {other:?}"
            ))));
        }
    }?;
    stream.play()?;

    engine.with_registry(|registry| registry.set_song_play_state(DEMO_SONG, PlayState::Starting));
    println!("\n=== Sequencer running, press Enter to quit ===");

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    drop(stream);
    Ok(())
}

/// Output stream driving the realtime processor; the audio itself is silence
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut processor: RealtimeProcessor,
    mut transport: FreeRunningTransport,
    mut input_rx: InputConsumer,
    mut output_tx: OutputProducer,
) -> Result<Stream, Box<dyn Error>>
where
    T: SizedSample + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = (data.len() / channels) as u32;
            let position = transport.position();
            processor.process(
                &position,
                transport.frame(),
                frames,
                std::iter::from_fn(|| input_rx.try_pop()),
                |_offset, message| {
                    let _ = output_tx.try_push(message);
                },
            );
            transport.advance(frames);
            data.fill(T::EQUILIBRIUM);
        },
        |err| log::error!("Audio stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

/// Four-on-the-floor kick with an off-beat hat and a filter sweep
fn build_demo_song(registry: &mut Registry) {
    let drums = registry.create_pattern();
    let pattern = registry.get_pattern(drums);
    for beat in 0..4 {
        pattern.add_note(beat * 4, 36, 110, 1.0);
        pattern.add_note(beat * 4 + 2, 42, 80, 0.5);
    }

    let sweep = registry.create_pattern();
    registry.get_pattern(sweep).add_control(0, 74, 10, 120, 16.0);

    for (pattern, channel) in [(drums, 9), (sweep, 0)] {
        let sequence = registry
            .add_track(DEMO_SONG)
            .and_then(|track| registry.sequence_id(DEMO_SONG, track));
        if let Some(sequence) = sequence {
            registry.add_pattern(sequence, 0, 0, pattern, false);
            registry.set_play_mode(sequence, PlayMode::Loop);
            if let Some(track) = registry.get_sequence(sequence).track_mut(0) {
                track.set_channel(channel);
            }
        }
    }
}
