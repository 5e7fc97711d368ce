// Song - Ordered list of sequence references with bar length and timebase

use crate::sequencer::PPQN;
use crate::sequencer::sequence::SequenceId;
use crate::sequencer::timebase::{Timebase, TimebaseType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    tracks: Vec<SequenceId>,
    bar_length: u32,
    tempo: u16,
    timebase: Timebase,
}

impl Song {
    /// One 4/4 bar
    pub const DEFAULT_BAR_LENGTH: u32 = 4 * PPQN;

    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            bar_length: Self::DEFAULT_BAR_LENGTH,
            tempo: Timebase::DEFAULT_TEMPO,
            timebase: Timebase::new(),
        }
    }

    /// Append a sequence reference, returning its track index
    pub fn add_track(&mut self, sequence: SequenceId) -> usize {
        self.tracks.push(sequence);
        self.tracks.len() - 1
    }

    pub fn remove_track(&mut self, index: usize) -> Option<SequenceId> {
        (index < self.tracks.len()).then(|| self.tracks.remove(index))
    }

    pub fn get_sequence(&self, index: usize) -> Option<SequenceId> {
        self.tracks.get(index).copied()
    }

    pub fn tracks(&self) -> &[SequenceId] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Ticks per bar
    pub fn bar_length(&self) -> u32 {
        self.bar_length
    }

    pub fn set_bar_length(&mut self, ticks: u32) -> bool {
        if ticks == 0 {
            return false;
        }
        self.bar_length = ticks;
        true
    }

    /// Tempo used when the timebase has no tempo event
    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn set_tempo(&mut self, bpm: u16) {
        self.tempo = bpm;
    }

    /// Tempo in force at (bar, tick), the song tempo before any tempo event
    pub fn tempo_at(&self, bar: u16, tick: u16) -> u16 {
        self.timebase
            .get_previous_event(bar, tick, TimebaseType::Tempo.mask())
            .map_or(self.tempo, |event| event.value)
    }

    pub fn beats_per_bar_at(&self, bar: u16, tick: u16) -> u16 {
        self.timebase.beats_per_bar_at(bar, tick)
    }

    pub fn timebase(&self) -> &Timebase {
        &self.timebase
    }

    pub fn timebase_mut(&mut self) -> &mut Timebase {
        &mut self.timebase
    }

    pub(crate) fn clear_tracks(&mut self) -> Vec<SequenceId> {
        std::mem::take(&mut self.tracks)
    }
}

impl Default for Song {
    fn default() -> Self {
        Self::new()
    }
}
