// Clock module
// Transport-derived pulses and the clock thread that turns them into scheduled MIDI

pub mod transport;
pub mod worker;

pub use transport::{FreeRunningTransport, Pulse, PulseClock, TransportPosition};
pub use worker::ClockWorker;
