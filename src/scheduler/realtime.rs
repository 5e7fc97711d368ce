// Realtime scheduler - Audio-thread side of the schedule
// Preallocated and sorted by time: no allocation, no locks

use crate::midi::event::MidiMessage;
use crate::scheduler::channels::ScheduleConsumer;
use crate::sequencer::ScheduledEvent;
use ringbuf::traits::{Consumer, Observer};

pub struct RealtimeScheduler {
    pending: Vec<ScheduledEvent>,
    capacity: usize,
    saturated_refills: u64,
}

impl RealtimeScheduler {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Vec::with_capacity(capacity),
            capacity,
            saturated_refills: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refills that stopped at capacity with events still queued
    ///
    /// Those events may be due before pending ones and then go out late.
    pub fn saturated_refills(&self) -> u64 {
        self.saturated_refills
    }

    /// Pull queued events into the pending buffer, up to its capacity
    ///
    /// Events left in the queue are picked up by a later call.
    pub fn refill(&mut self, queue: &mut ScheduleConsumer) -> usize {
        let mut pulled = 0;
        while self.pending.len() < self.capacity {
            let Some(event) = queue.try_pop() else {
                break;
            };
            self.push(event);
            pulled += 1;
        }
        if !queue.is_empty() {
            self.saturated_refills += 1;
        }
        pulled
    }

    /// Insert keeping time order; events with equal times keep arrival order
    pub fn push(&mut self, event: ScheduledEvent) -> bool {
        if self.pending.len() >= self.capacity {
            return false;
        }
        let index = self.pending.partition_point(|e| e.time <= event.time);
        self.pending.insert(index, event);
        true
    }

    /// Emit every event due before the end of this buffer
    ///
    /// `emit` receives the frame offset inside the buffer. Events whose time
    /// has already passed are emitted at offset 0.
    pub fn drain(
        &mut self,
        buffer_start: u64,
        frames: u32,
        mut emit: impl FnMut(u32, MidiMessage),
    ) -> usize {
        let end = buffer_start + frames as u64;
        let due = self.pending.partition_point(|e| e.time < end);
        for event in self.pending.drain(..due) {
            let offset = event.time.saturating_sub(buffer_start) as u32;
            emit(offset, event.message);
        }
        due
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
