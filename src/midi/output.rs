// MIDI Output - Bridge thread sending emitted messages to a device port

use crate::engine::EngineError;
use crate::scheduler::channels::OutputConsumer;
use midir::{MidiOutput as MidirOutput, MidiOutputConnection};
use ringbuf::traits::Consumer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Drains the output queue filled by the audio callback
///
/// Messages are sent as soon as they are drained; with no port connected
/// they are discarded.
pub struct MidiOutput {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MidiOutput {
    pub fn new(
        client_name: &str,
        mut output_rx: OutputConsumer,
        poll_interval: Duration,
    ) -> Result<Self, EngineError> {
        let midi_out = MidirOutput::new(&format!("{client_name} output"))
            .map_err(|e| EngineError::Midi(e.to_string()))?;

        let ports = midi_out.ports();
        let mut connection: Option<MidiOutputConnection> = match ports.first() {
            Some(port) => {
                let name = midi_out
                    .port_name(port)
                    .unwrap_or_else(|_| "Unknown".to_string());
                let connection = midi_out
                    .connect(port, &format!("{client_name}-out"))
                    .map_err(|e| EngineError::Midi(e.to_string()))?;
                log::info!("Connected to MIDI output: {name}");
                Some(connection)
            }
            None => {
                log::warn!("No MIDI output port detected, sequencer output is discarded");
                None
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(format!("{client_name}-midi-out"))
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    let mut sent = false;
                    while let Some(message) = output_rx.try_pop() {
                        sent = true;
                        if let Some(conn) = connection.as_mut() {
                            if let Err(e) = conn.send(message.as_bytes()) {
                                log::warn!("MIDI send failed: {e}");
                            }
                        }
                    }
                    if !sent {
                        thread::sleep(poll_interval);
                    }
                }
                if let Some(conn) = connection.take() {
                    conn.close();
                }
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }
}

impl Drop for MidiOutput {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
