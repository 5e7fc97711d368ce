// Schedule - Time-indexed MIDI messages produced by the clock thread
// One message per sample time; collisions are nudged later, never dropped

use crate::midi::event::MidiMessage;
use crate::scheduler::channels::ScheduleProducer;
use crate::sequencer::ScheduledEvent;
use ringbuf::traits::Producer;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    events: BTreeMap<u64, MidiMessage>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Insert a message, moving it one sample later until its slot is free.
    /// Returns the time actually used.
    pub fn insert(&mut self, event: ScheduledEvent) -> u64 {
        let mut time = event.time;
        while self.events.contains_key(&time) {
            time += 1;
        }
        self.events.insert(time, event.message);
        time
    }

    /// Earliest message
    pub fn pop_first(&mut self) -> Option<ScheduledEvent> {
        self.events
            .pop_first()
            .map(|(time, message)| ScheduledEvent::new(time, message))
    }

    pub fn iter(&self) -> impl Iterator<Item = ScheduledEvent> + '_ {
        self.events
            .iter()
            .map(|(&time, &message)| ScheduledEvent::new(time, message))
    }

    /// Move messages into the realtime queue in time order
    ///
    /// Whatever does not fit stays here for the next flush.
    pub fn flush(&mut self, producer: &mut ScheduleProducer) -> usize {
        let mut moved = 0;
        while let Some(entry) = self.events.first_entry() {
            let event = ScheduledEvent::new(*entry.key(), *entry.get());
            if producer.try_push(event).is_err() {
                break;
            }
            entry.remove();
            moved += 1;
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::channels::create_schedule_channel;
    use ringbuf::traits::Consumer;

    fn note(velocity: u8) -> MidiMessage {
        MidiMessage::note_on(0, 60, velocity)
    }

    #[test]
    fn test_collisions_are_nudged() {
        let mut schedule = Schedule::new();
        assert_eq!(schedule.insert(ScheduledEvent::new(100, note(1))), 100);
        assert_eq!(schedule.insert(ScheduledEvent::new(100, note(2))), 101);
        assert_eq!(schedule.insert(ScheduledEvent::new(100, note(3))), 102);
        assert_eq!(schedule.insert(ScheduledEvent::new(101, note(4))), 103);

        let velocities: Vec<u8> = schedule.iter().map(|e| e.message.data2()).collect();
        assert_eq!(velocities, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_flush_keeps_overflow() {
        let (mut tx, mut rx) = create_schedule_channel(2);
        let mut schedule = Schedule::new();
        for time in [30, 10, 20] {
            schedule.insert(ScheduledEvent::new(time, note(1)));
        }

        assert_eq!(schedule.flush(&mut tx), 2);
        assert_eq!(schedule.len(), 1);
        assert_eq!(rx.try_pop().map(|e| e.time), Some(10));
        assert_eq!(rx.try_pop().map(|e| e.time), Some(20));

        assert_eq!(schedule.flush(&mut tx), 1);
        assert_eq!(rx.try_pop().map(|e| e.time), Some(30));
        assert!(schedule.is_empty());
    }
}
