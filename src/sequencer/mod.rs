// Sequencer module
// Pattern / track / sequence / song data model and the clock-driven event generator

pub mod pattern;
pub mod play_state;
pub mod sequence;
pub mod song;
pub mod step_event;
pub mod timebase;
pub mod track;

pub use pattern::{Pattern, PatternId, PatternMap};
pub use play_state::{PlayMode, PlayState};
pub use sequence::{ClockOutcome, Sequence, SequenceEvents, SequenceId};
pub use song::Song;
pub use step_event::StepEvent;
pub use timebase::{Tempo, Timebase, TimebaseEvent, TimebaseType};
pub use track::Track;

use crate::midi::event::MidiMessage;

/// Clock pulses (ticks) per quarter note
/// Every pattern, track and song length is expressed in these ticks
pub const PPQN: u32 = 24;

/// Step resolutions a pattern may use; each divides PPQN exactly
pub const VALID_STEPS_PER_BEAT: [u32; 8] = [1, 2, 3, 4, 6, 8, 12, 24];

/// Channel value meaning "no tally output"
pub const NO_TALLY_CHANNEL: u8 = 16;

/// Trigger note value meaning "no trigger"
pub const NO_TRIGGER: u8 = 0xFF;

/// A MIDI message bound to an absolute sample time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub time: u64,
    pub message: MidiMessage,
}

impl ScheduledEvent {
    pub fn new(time: u64, message: MidiMessage) -> Self {
        Self { time, message }
    }
}
