// Communication channels lock-free
// Every queue crossing the realtime boundary is a single-producer single-consumer ring

use crate::clock::transport::Pulse;
use crate::midi::event::{MidiEvent, MidiMessage};
use crate::sequencer::ScheduledEvent;
use ringbuf::{HeapRb, traits::Split};

/// Clock pulses, realtime callback -> clock thread
pub type PulseProducer = ringbuf::HeapProd<Pulse>;
pub type PulseConsumer = ringbuf::HeapCons<Pulse>;

pub fn create_pulse_channel(capacity: usize) -> (PulseProducer, PulseConsumer) {
    let rb = HeapRb::<Pulse>::new(capacity);
    rb.split()
}

/// Decoded MIDI input, device -> realtime callback -> clock thread
pub type InputProducer = ringbuf::HeapProd<MidiEvent>;
pub type InputConsumer = ringbuf::HeapCons<MidiEvent>;

pub fn create_input_channel(capacity: usize) -> (InputProducer, InputConsumer) {
    let rb = HeapRb::<MidiEvent>::new(capacity);
    rb.split()
}

/// Time-stamped messages, clock thread -> realtime callback
pub type ScheduleProducer = ringbuf::HeapProd<ScheduledEvent>;
pub type ScheduleConsumer = ringbuf::HeapCons<ScheduledEvent>;

pub fn create_schedule_channel(capacity: usize) -> (ScheduleProducer, ScheduleConsumer) {
    let rb = HeapRb::<ScheduledEvent>::new(capacity);
    rb.split()
}

/// Emitted messages, realtime callback -> MIDI output bridge
pub type OutputProducer = ringbuf::HeapProd<MidiMessage>;
pub type OutputConsumer = ringbuf::HeapCons<MidiMessage>;

pub fn create_output_channel(capacity: usize) -> (OutputProducer, OutputConsumer) {
    let rb = HeapRb::<MidiMessage>::new(capacity);
    rb.split()
}
