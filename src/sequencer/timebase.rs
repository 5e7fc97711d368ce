// Timebase - Tempo and time signature changes along a song
// Handles conversion between tempo and sample durations

use crate::sequencer::PPQN;
use std::fmt;

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo, `None` outside [20.0, 999.0]
    pub fn from_bpm(bpm: f64) -> Option<Self> {
        (Self::MIN_BPM..=Self::MAX_BPM)
            .contains(&bpm)
            .then_some(Self { bpm })
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one beat in samples at given sample rate
    pub fn beat_duration_samples(&self, sample_rate: f64) -> f64 {
        self.beat_duration_seconds() * sample_rate
    }

    /// Duration of one clock tick (1/PPQN beat) in samples
    pub fn clock_duration_samples(&self, sample_rate: f64) -> f64 {
        self.beat_duration_samples(sample_rate) / PPQN as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            bpm: Timebase::DEFAULT_TEMPO as f64,
        }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Kind of timebase change; the discriminants double as query mask bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TimebaseType {
    Tempo = 1,
    TimeSig = 2,
}

impl TimebaseType {
    /// Mask matching every event type
    pub const ANY: u16 = TimebaseType::Tempo as u16 | TimebaseType::TimeSig as u16;

    pub fn mask(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(TimebaseType::Tempo),
            2 => Some(TimebaseType::TimeSig),
            _ => None,
        }
    }
}

/// A single tempo or time signature change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimebaseEvent {
    pub bar: u16,
    pub tick: u16,
    pub kind: TimebaseType,
    /// BPM for tempo events, beats per bar for time signature events
    pub value: u16,
}

impl TimebaseEvent {
    fn position(&self) -> (u16, u16) {
        (self.bar, self.tick)
    }
}

/// Ordered map of tempo / time signature changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timebase {
    events: Vec<TimebaseEvent>,
}

impl Timebase {
    pub const DEFAULT_TEMPO: u16 = 120;
    pub const DEFAULT_BEATS_PER_BAR: u16 = 4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TimebaseEvent] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Add a change; an existing event of the same type at the same position
    /// has its value replaced
    pub fn add_event(&mut self, bar: u16, tick: u16, kind: TimebaseType, value: u16) {
        if let Some(existing) = self
            .events
            .iter_mut()
            .find(|e| e.bar == bar && e.tick == tick && e.kind == kind)
        {
            existing.value = value;
            return;
        }

        let index = self
            .events
            .partition_point(|e| e.position() <= (bar, tick));
        self.events.insert(
            index,
            TimebaseEvent {
                bar,
                tick,
                kind,
                value,
            },
        );
    }

    pub fn remove_event(&mut self, bar: u16, tick: u16, kind: TimebaseType) -> bool {
        match self
            .events
            .iter()
            .position(|e| e.bar == bar && e.tick == tick && e.kind == kind)
        {
            Some(index) => {
                self.events.remove(index);
                true
            }
            None => false,
        }
    }

    /// Most recent event at or before (bar, tick) whose type is in `mask`
    pub fn get_previous_event(&self, bar: u16, tick: u16, mask: u16) -> Option<&TimebaseEvent> {
        self.events
            .iter()
            .take_while(|e| e.position() <= (bar, tick))
            .filter(|e| e.kind.mask() & mask != 0)
            .last()
    }

    /// First event strictly after (bar, tick) whose type is in `mask`
    pub fn get_next_event(&self, bar: u16, tick: u16, mask: u16) -> Option<&TimebaseEvent> {
        self.events
            .iter()
            .find(|e| e.position() > (bar, tick) && e.kind.mask() & mask != 0)
    }

    /// Tempo in force at (bar, tick)
    pub fn tempo_at(&self, bar: u16, tick: u16) -> u16 {
        self.get_previous_event(bar, tick, TimebaseType::Tempo.mask())
            .map(|e| e.value)
            .unwrap_or(Self::DEFAULT_TEMPO)
    }

    /// Beats per bar in force at (bar, tick)
    pub fn beats_per_bar_at(&self, bar: u16, tick: u16) -> u16 {
        self.get_previous_event(bar, tick, TimebaseType::TimeSig.mask())
            .map(|e| e.value)
            .unwrap_or(Self::DEFAULT_BEATS_PER_BAR)
    }
}
