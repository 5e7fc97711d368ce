// MIDI Input - Receives device MIDI and queues decoded messages for the audio thread

use crate::engine::EngineError;
use crate::midi::event::MidiEvent;
use crate::scheduler::channels::InputProducer;
use midir::{MidiInput as MidirInput, MidiInputConnection};
use ringbuf::traits::Producer;

pub struct MidiInput {
    _connection: Option<MidiInputConnection<()>>,
}

impl MidiInput {
    /// Connect to the first available input port
    ///
    /// Having no port is not an error: the sequencer runs without input.
    pub fn new(client_name: &str, mut input_tx: InputProducer) -> Result<Self, EngineError> {
        let mut midi_in = MidirInput::new(&format!("{client_name} input"))
            .map_err(|e| EngineError::Midi(e.to_string()))?;
        midi_in.ignore(midir::Ignore::Sysex);

        let ports = midi_in.ports();
        let Some(port) = ports.first() else {
            log::warn!("No MIDI input port detected, running without MIDI input");
            return Ok(Self { _connection: None });
        };

        for (i, p) in ports.iter().enumerate() {
            if let Ok(name) = midi_in.port_name(p) {
                log::debug!("MIDI input [{i}] {name}");
            }
        }
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_in
            .connect(
                port,
                &format!("{client_name}-in"),
                move |_timestamp, message, _| {
                    // midir thread: decode and hand over without blocking
                    if let Some(event) = MidiEvent::from_bytes(message) {
                        if input_tx.try_push(event).is_err() {
                            log::warn!("MIDI input buffer full, event ignored");
                        }
                    }
                },
                (),
            )
            .map_err(|e| EngineError::Midi(e.to_string()))?;

        log::info!("Connected to MIDI input: {port_name}");
        Ok(Self {
            _connection: Some(connection),
        })
    }

    pub fn is_connected(&self) -> bool {
        self._connection.is_some()
    }
}
