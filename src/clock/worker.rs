// Clock worker - Non-realtime thread running the registry clock traversal
// Parks until the realtime callback unparks it with new pulses or input

use crate::registry::Registry;
use crate::scheduler::channels::{InputConsumer, PulseConsumer, ScheduleProducer};
use crate::scheduler::schedule::Schedule;
use ringbuf::traits::{Consumer, Observer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub struct ClockWorker {
    registry: Arc<Mutex<Registry>>,
    pulses: PulseConsumer,
    input: InputConsumer,
    output: ScheduleProducer,
    schedule: Schedule,
    running: Arc<AtomicBool>,
    idle_wait: Duration,
}

impl ClockWorker {
    pub fn new(
        registry: Arc<Mutex<Registry>>,
        pulses: PulseConsumer,
        input: InputConsumer,
        output: ScheduleProducer,
        running: Arc<AtomicBool>,
        idle_wait: Duration,
    ) -> Self {
        Self {
            registry,
            pulses,
            input,
            output,
            schedule: Schedule::new(),
            running,
            idle_wait,
        }
    }

    /// Events computed but not yet handed to the realtime side
    pub fn backlog(&self) -> usize {
        self.schedule.len()
    }

    /// Handle pending input and pulses, then flush the schedule.
    /// Returns true if anything was processed.
    pub fn step(&mut self) -> bool {
        let mut worked = false;

        if !self.pulses.is_empty() || !self.input.is_empty() {
            match self.registry.lock() {
                Ok(mut registry) => {
                    // Input first so a trigger lands on the pulse that follows it
                    while let Some(event) = self.input.try_pop() {
                        registry.handle_midi_input(event);
                        worked = true;
                    }
                    while let Some(pulse) = self.pulses.try_pop() {
                        registry.clock(
                            pulse.time,
                            &mut self.schedule,
                            pulse.sync,
                            pulse.samples_per_clock,
                        );
                        worked = true;
                    }
                }
                Err(_) => log::error!("Registry lock poisoned, clock pulses dropped"),
            }
        }

        if !self.schedule.is_empty() {
            self.schedule.flush(&mut self.output);
        }
        worked
    }

    /// Thread body: runs until the shared running flag is cleared
    pub fn run(mut self) {
        log::info!("Clock thread started");
        while self.running.load(Ordering::Acquire) {
            if !self.step() {
                thread::park_timeout(self.idle_wait);
            }
        }
        if !self.schedule.is_empty() {
            log::debug!("Discarding {} unsent events", self.schedule.len());
        }
        log::info!("Clock thread stopped");
    }
}
