// MIDI module
// Message types plus the midir device adapters used by the runtime binary

pub mod event;
pub mod input;
pub mod output;

pub use event::{MidiEvent, MidiMessage};
