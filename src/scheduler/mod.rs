// Scheduler - Hand-off of scheduled MIDI between the clock thread and the realtime callback
// The compute side keeps an ordered map, the realtime side a preallocated sorted buffer

pub mod channels;
pub mod realtime;
pub mod schedule;

pub use channels::{
    InputConsumer, InputProducer, OutputConsumer, OutputProducer, PulseConsumer, PulseProducer,
    ScheduleConsumer, ScheduleProducer, create_input_channel, create_output_channel,
    create_pulse_channel, create_schedule_channel,
};
pub use realtime::RealtimeScheduler;
pub use schedule::Schedule;
