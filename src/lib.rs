// stepseq - Library exports for the binaries, tests and benchmarks

pub mod clock;
pub mod config;
pub mod engine;
pub mod midi;
pub mod registry;
pub mod scheduler;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use clock::{FreeRunningTransport, Pulse, PulseClock, TransportPosition};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineError, RealtimeProcessor};
pub use midi::event::{MidiEvent, MidiMessage};
pub use registry::{PersistenceError, Registry, SongKey, SongSlot};
pub use scheduler::{RealtimeScheduler, Schedule};
pub use sequencer::{
    PPQN, Pattern, PatternId, PlayMode, PlayState, ScheduledEvent, Sequence, SequenceId, Song,
    StepEvent, Tempo, Timebase, TimebaseType, Track,
};
