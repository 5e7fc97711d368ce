// Pattern - Collection of step events forming a reusable phrase
// A pattern is placed on tracks; it never knows where it is placed

use crate::midi::event::{CONTROL_CHANGE, NOTE_ON};
use crate::sequencer::step_event::StepEvent;
use crate::sequencer::{PPQN, VALID_STEPS_PER_BEAT};
use std::collections::BTreeMap;

/// Unique identifier for patterns
pub type PatternId = u32;

/// Pattern storage owned by the registry, resolved by id during a call
pub type PatternMap = BTreeMap<PatternId, Pattern>;

/// A pattern of step events
///
/// Events are kept sorted by step position. For NOTE_ON events the tuple
/// (position, command, note) is unique: inserting an event that overlaps an
/// existing event with the same command and first value replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    beats: u32,
    steps_per_beat: u32,
    scale: u8,
    tonic: u8,
    ref_note: u8,
    events: Vec<StepEvent>,
}

impl Pattern {
    pub const DEFAULT_BEATS: u32 = 4;
    pub const DEFAULT_STEPS_PER_BEAT: u32 = 4;
    pub const DEFAULT_REF_NOTE: u8 = 60;
    /// Longest pattern whose length in clock ticks still fits a `u32`
    pub const MAX_BEATS: u32 = u32::MAX / PPQN;

    /// Create an empty pattern
    ///
    /// Invalid arguments fall back to the defaults (4 beats, 4 steps per beat).
    /// Beats must lie in `1..=MAX_BEATS`.
    pub fn new(beats: u32, steps_per_beat: u32) -> Self {
        let beats = if (1..=Self::MAX_BEATS).contains(&beats) {
            beats
        } else {
            Self::DEFAULT_BEATS
        };
        let steps_per_beat = if VALID_STEPS_PER_BEAT.contains(&steps_per_beat) {
            steps_per_beat
        } else {
            Self::DEFAULT_STEPS_PER_BEAT
        };

        Self {
            beats,
            steps_per_beat,
            scale: 0,
            tonic: 0,
            ref_note: Self::DEFAULT_REF_NOTE,
            events: Vec::new(),
        }
    }

    pub fn beats(&self) -> u32 {
        self.beats
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat
    }

    /// Number of steps in the pattern
    pub fn steps(&self) -> u32 {
        self.beats * self.steps_per_beat
    }

    /// Clock ticks per step
    pub fn clocks_per_step(&self) -> u32 {
        PPQN / self.steps_per_beat
    }

    /// Length of the pattern in clock ticks
    pub fn length_in_ticks(&self) -> u32 {
        self.beats * PPQN
    }

    /// All events, sorted by position
    pub fn events(&self) -> &[StepEvent] {
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

    /// Index of the first event at or after `step`
    pub fn first_event_at(&self, step: u32) -> usize {
        self.events.partition_point(|e| e.position() < step)
    }

    /// Add an event, replacing any event of the same command and first value
    /// whose interval overlaps the new one.
    ///
    /// Returns `None` if the step is outside the pattern or a value is not a
    /// valid MIDI data byte.
    pub fn add_event(
        &mut self,
        position: u32,
        command: u8,
        value1: u8,
        value2: u8,
        duration: f32,
    ) -> Option<&StepEvent> {
        if value1 > 127 || value2 > 127 {
            return None;
        }
        let event = StepEvent::new(position, duration, command, value1, value2);
        let index = self.insert_event(event)?;
        self.events.get(index)
    }

    fn insert_event(&mut self, mut event: StepEvent) -> Option<usize> {
        let position = event.position();
        let duration = event.duration();
        if position >= self.steps() || !(duration >= 0.0) || !duration.is_finite() {
            return None;
        }

        // Replaced events hand their stutter settings to the newcomer
        let mut stutter = None;
        self.events.retain(|existing| {
            let clash = existing.command() == event.command()
                && existing.value1_start() == event.value1_start()
                && existing.overlaps(position, duration);
            if clash {
                stutter = Some((existing.stutter_count(), existing.stutter_dur()));
            }
            !clash
        });
        if let Some((count, dur)) = stutter {
            event.set_stutter(count, dur);
        }

        let index = self.events.partition_point(|e| e.position() <= position);
        self.events.insert(index, event);
        Some(index)
    }

    /// Insert an event read from storage without overlap resolution
    pub(crate) fn push_loaded(&mut self, event: StepEvent) {
        let index = self
            .events
            .partition_point(|e| e.position() <= event.position());
        self.events.insert(index, event);
    }

    fn find(&self, step: u32, command: u8, value1: u8) -> Option<usize> {
        self.events.iter().position(|e| {
            e.position() == step && e.command() == command && e.value1_start() == value1
        })
    }

    /// Add a note; no-op returning false if any argument is out of range
    pub fn add_note(&mut self, step: u32, note: u8, velocity: u8, duration: f32) -> bool {
        if note > 127 || velocity > 127 {
            return false;
        }
        let event = StepEvent::new(step, duration, NOTE_ON, note, velocity);
        self.insert_event(event).is_some()
    }

    pub fn remove_note(&mut self, step: u32, note: u8) -> bool {
        match self.find(step, NOTE_ON, note) {
            Some(index) => {
                self.events.remove(index);
                true
            }
            None => false,
        }
    }

    /// Velocity of the note at `step`, 0 if there is none
    pub fn get_note_velocity(&self, step: u32, note: u8) -> u8 {
        self.find(step, NOTE_ON, note)
            .map(|i| self.events[i].value2_start())
            .unwrap_or(0)
    }

    pub fn set_note_velocity(&mut self, step: u32, note: u8, velocity: u8) -> bool {
        if velocity > 127 {
            return false;
        }
        match self.find(step, NOTE_ON, note) {
            Some(index) => {
                let end = self.events[index].value2_end();
                self.events[index].set_value2(velocity, end);
                true
            }
            None => false,
        }
    }

    /// Duration in steps of the note at `step`, 0.0 if there is none
    pub fn get_note_duration(&self, step: u32, note: u8) -> f32 {
        self.find(step, NOTE_ON, note)
            .map(|i| self.events[i].duration())
            .unwrap_or(0.0)
    }

    pub fn set_note_duration(&mut self, step: u32, note: u8, duration: f32) -> bool {
        if !(duration >= 0.0) || !duration.is_finite() {
            return false;
        }
        match self.find(step, NOTE_ON, note) {
            Some(index) => {
                self.events[index].set_duration(duration);
                true
            }
            None => false,
        }
    }

    /// Re-trigger the note `count` times, every `dur` clocks
    pub fn set_stutter(&mut self, step: u32, note: u8, count: u8, dur: u8) -> bool {
        match self.find(step, NOTE_ON, note) {
            Some(index) => {
                self.events[index].set_stutter(count, dur);
                true
            }
            None => false,
        }
    }

    pub fn get_stutter(&self, step: u32, note: u8) -> Option<(u8, u8)> {
        self.find(step, NOTE_ON, note).map(|i| {
            let event = &self.events[i];
            (event.stutter_count(), event.stutter_dur())
        })
    }

    /// Add a continuous controller event ramping from `value_start` to `value_end`
    pub fn add_control(
        &mut self,
        step: u32,
        control: u8,
        value_start: u8,
        value_end: u8,
        duration: f32,
    ) -> bool {
        if control > 127 || value_start > 127 || value_end > 127 {
            return false;
        }
        let mut event = StepEvent::new(step, duration, CONTROL_CHANGE, control, value_start);
        event.set_value2(value_start, value_end);
        self.insert_event(event).is_some()
    }

    pub fn remove_control(&mut self, step: u32, control: u8) -> bool {
        match self.find(step, CONTROL_CHANGE, control) {
            Some(index) => {
                self.events.remove(index);
                true
            }
            None => false,
        }
    }

    /// Start and end value of the controller event at `step`
    pub fn get_control_value(&self, step: u32, control: u8) -> Option<(u8, u8)> {
        self.find(step, CONTROL_CHANGE, control).map(|i| {
            let event = &self.events[i];
            (event.value2_start(), event.value2_end())
        })
    }

    /// Change the number of beats; events past the new end are dropped
    pub fn set_beats(&mut self, beats: u32) -> bool {
        if !(1..=Self::MAX_BEATS).contains(&beats) {
            return false;
        }
        self.beats = beats;
        let steps = self.steps();
        self.events.retain(|e| e.position() < steps);
        true
    }

    /// Change the step resolution, rescaling every event so it keeps its
    /// musical position.
    ///
    /// Positions are rounded to the nearest step; events that land on the same
    /// (position, command, first value) collapse into the later one.
    pub fn set_steps_per_beat(&mut self, value: u32) -> bool {
        if !VALID_STEPS_PER_BEAT.contains(&value) {
            return false;
        }
        let old = self.steps_per_beat;
        if value == old {
            return true;
        }

        let last_step = (self.beats * value).saturating_sub(1);
        let ratio = value as f32 / old as f32;
        let mut rescaled: Vec<StepEvent> = Vec::with_capacity(self.events.len());
        for mut event in self.events.drain(..) {
            let scaled = (event.position() as u64 * value as u64 + old as u64 / 2) / old as u64;
            let position = u32::try_from(scaled).unwrap_or(u32::MAX).min(last_step);
            event.set_position(position);
            event.set_duration(event.duration() * ratio);
            rescaled.retain(|kept| {
                !(kept.position() == position
                    && kept.command() == event.command()
                    && kept.value1_start() == event.value1_start())
            });
            rescaled.push(event);
        }
        rescaled.sort_by_key(|e| e.position());

        self.events = rescaled;
        self.steps_per_beat = value;
        true
    }

    /// Shift every note by `delta` semitones
    ///
    /// All or nothing: if any note would leave the MIDI range the pattern is
    /// left untouched and false is returned.
    pub fn transpose(&mut self, delta: i32) -> bool {
        let in_range = |value: u8| (0..=127).contains(&(value as i32 + delta));
        let fits = self
            .events
            .iter()
            .filter(|e| e.is_note())
            .all(|e| in_range(e.value1_start()) && in_range(e.value1_end()));
        if !fits {
            return false;
        }

        for event in self.events.iter_mut().filter(|e| e.is_note()) {
            let start = (event.value1_start() as i32 + delta) as u8;
            let end = (event.value1_end() as i32 + delta) as u8;
            event.set_value1(start, end);
        }
        true
    }

    /// Last step holding an event, `None` if the pattern is empty
    pub fn get_last_step(&self) -> Option<u32> {
        self.events.last().map(|e| e.position())
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: u8) {
        self.scale = scale;
    }

    pub fn tonic(&self) -> u8 {
        self.tonic
    }

    pub fn set_tonic(&mut self, tonic: u8) {
        self.tonic = tonic;
    }

    pub fn ref_note(&self) -> u8 {
        self.ref_note
    }

    pub fn set_ref_note(&mut self, note: u8) -> bool {
        if note > 127 {
            return false;
        }
        self.ref_note = note;
        true
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BEATS, Self::DEFAULT_STEPS_PER_BEAT)
    }
}
