// Engine - Wires the registry, clock thread and realtime processor together
// The registry is shared with control code; the realtime side never locks it

use crate::clock::transport::{PulseClock, TransportPosition};
use crate::clock::worker::ClockWorker;
use crate::config::EngineConfig;
use crate::midi::event::{MidiEvent, MidiMessage};
use crate::registry::Registry;
use crate::scheduler::channels::{
    InputProducer, PulseProducer, ScheduleConsumer, create_input_channel, create_pulse_channel,
    create_schedule_channel,
};
use crate::scheduler::realtime::RealtimeScheduler;
use ringbuf::traits::Producer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, Thread};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to spawn clock thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Audio device error: {0}")]
    Audio(String),

    #[error("MIDI error: {0}")]
    Midi(String),
}

/// Owner of the clock thread
///
/// Dropping the engine stops and joins the thread.
pub struct Engine {
    registry: Arc<Mutex<Registry>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Engine {
    /// Spawn the clock thread and hand back the realtime half
    pub fn start(
        registry: Registry,
        config: &EngineConfig,
    ) -> Result<(Engine, RealtimeProcessor), EngineError> {
        let config = config.clone().validate();

        let (pulse_tx, pulse_rx) = create_pulse_channel(config.pulse_capacity);
        let (input_tx, input_rx) = create_input_channel(config.input_capacity);
        let (schedule_tx, schedule_rx) = create_schedule_channel(config.schedule_capacity);

        let registry = Arc::new(Mutex::new(registry));
        let running = Arc::new(AtomicBool::new(true));
        let worker = ClockWorker::new(
            Arc::clone(&registry),
            pulse_rx,
            input_rx,
            schedule_tx,
            Arc::clone(&running),
            config.idle_wait(),
        );

        let handle = thread::Builder::new()
            .name(format!("{}-clock", config.client_name))
            .spawn(move || worker.run())?;

        let processor = RealtimeProcessor::new(
            pulse_tx,
            input_tx,
            schedule_rx,
            config.pending_capacity,
            handle.thread().clone(),
        );

        log::info!(
            "Engine started (schedule {}, pending {})",
            config.schedule_capacity,
            config.pending_capacity
        );

        Ok((
            Engine {
                registry,
                running,
                handle: Some(handle),
            },
            processor,
        ))
    }

    /// Shared registry handle for control code
    pub fn registry(&self) -> Arc<Mutex<Registry>> {
        Arc::clone(&self.registry)
    }

    /// Run `f` with the registry locked; `None` if the lock is poisoned
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> Option<R> {
        match self.registry.lock() {
            Ok(mut registry) => Some(f(&mut registry)),
            Err(_) => {
                log::error!("Registry lock poisoned");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        handle.thread().unpark();
        if handle.join().is_err() {
            log::error!("Clock thread panicked");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The audio-callback half of the engine
pub struct RealtimeProcessor {
    clock: PulseClock,
    pulses: PulseProducer,
    input: InputProducer,
    schedule: ScheduleConsumer,
    scheduler: RealtimeScheduler,
    compute: Thread,
    dropped_pulses: u64,
    dropped_input: u64,
}

impl RealtimeProcessor {
    fn new(
        pulses: PulseProducer,
        input: InputProducer,
        schedule: ScheduleConsumer,
        pending_capacity: usize,
        compute: Thread,
    ) -> Self {
        Self {
            clock: PulseClock::new(),
            pulses,
            input,
            schedule,
            scheduler: RealtimeScheduler::new(pending_capacity),
            compute,
            dropped_pulses: 0,
            dropped_input: 0,
        }
    }

    /// The whole realtime callback body for one buffer
    ///
    /// Forwards `midi_in` and this buffer's clock pulses to the clock thread,
    /// wakes it, then emits every scheduled message due in this buffer as
    /// `(frame offset, message)`.
    pub fn process<I, F>(
        &mut self,
        transport: &TransportPosition,
        buffer_start: u64,
        frames: u32,
        midi_in: I,
        mut emit: F,
    ) where
        I: IntoIterator<Item = MidiEvent>,
        F: FnMut(u32, MidiMessage),
    {
        // ========== SACRED ZONE ==========
        // No allocations, No I/O, No blocking locks
        let mut wake = false;

        for event in midi_in {
            if self.input.try_push(event).is_ok() {
                wake = true;
            } else {
                self.dropped_input += 1;
            }
        }

        let pulses = &mut self.pulses;
        let dropped = &mut self.dropped_pulses;
        self.clock
            .for_each_pulse(transport, buffer_start, frames, |pulse| {
                if pulses.try_push(pulse).is_ok() {
                    wake = true;
                } else {
                    *dropped += 1;
                }
            });

        if wake {
            self.compute.unpark();
        }

        self.scheduler.refill(&mut self.schedule);
        self.scheduler.drain(buffer_start, frames, &mut emit);
        // ========== SACRED ZONE END ==========
    }

    /// Pulses lost because the clock thread fell behind
    pub fn dropped_pulses(&self) -> u64 {
        self.dropped_pulses
    }

    /// Input messages lost because the clock thread fell behind
    pub fn dropped_input(&self) -> u64 {
        self.dropped_input
    }

    /// Events waiting on the realtime side for a later buffer
    pub fn pending(&self) -> usize {
        self.scheduler.len()
    }

    /// Buffers where the pending buffer was full and events stayed queued
    pub fn pending_overflows(&self) -> u64 {
        self.scheduler.saturated_refills()
    }
}
