// Track - Places patterns at tick offsets and walks the one under the play head
// Patterns are referenced by id and resolved through the registry's PatternMap

use crate::midi::event::{MidiMessage, NOTE_ON};
use crate::sequencer::ScheduledEvent;
use crate::sequencer::pattern::{Pattern, PatternId, PatternMap};
use crate::sequencer::step_event::StepEvent;
use std::collections::BTreeMap;

/// Which message of the current step event comes next
#[derive(Debug, Clone, Copy, PartialEq)]
enum EmitPhase {
    Start,
    StutterOff(u8),
    StutterOn(u8),
    Ramp(u32),
    End,
}

/// Play cursor inside the placement currently under the play head
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cursor {
    start: u32,
    pattern: PatternId,
    clocks_per_step: u32,
    step: u32,
    step_time: u64,
    samples_per_clock: f64,
    next_event: usize,
    phase: EmitPhase,
    due: bool,
}

impl Cursor {
    fn new(start: u32, pattern: PatternId, clocks_per_step: u32) -> Self {
        Self {
            start,
            pattern,
            clocks_per_step: clocks_per_step.max(1),
            step: 0,
            step_time: 0,
            samples_per_clock: 0.0,
            next_event: 0,
            phase: EmitPhase::Start,
            due: false,
        }
    }

    fn clocks_to_samples(&self, clocks: f64) -> u64 {
        (clocks * self.samples_per_clock).round().max(0.0) as u64
    }

    /// Produce the next message of `event`, advancing the phase.
    /// `None` means the phase had nothing to send; the caller tries again.
    fn emit(&mut self, event: &StepEvent, channel: u8) -> Option<ScheduledEvent> {
        let t0 = self.step_time;
        let clocks = event.duration() as f64 * self.clocks_per_step as f64;
        let duration_samples = self.clocks_to_samples(clocks).max(1);
        let end_time = t0 + duration_samples - 1;
        let command = event.command();
        let message =
            |data1: u8, data2: u8| MidiMessage::channel(command, channel, data1, data2);

        match self.phase {
            EmitPhase::Start => {
                self.phase = if event.is_note()
                    && event.stutter_count() > 0
                    && event.stutter_dur() > 0
                {
                    EmitPhase::StutterOff(1)
                } else if ramp_clocks(event, clocks) > 1 {
                    EmitPhase::Ramp(1)
                } else {
                    EmitPhase::End
                };
                Some(ScheduledEvent::new(
                    t0,
                    message(event.value1_start(), event.value2_start()),
                ))
            }
            EmitPhase::StutterOff(index) => {
                let time = t0 + self.clocks_to_samples(index as f64 * event.stutter_dur() as f64);
                if index > event.stutter_count() || time >= end_time {
                    self.phase = EmitPhase::End;
                    return None;
                }
                self.phase = EmitPhase::StutterOn(index);
                Some(ScheduledEvent::new(
                    time.saturating_sub(1).max(t0),
                    MidiMessage::channel(NOTE_ON, channel, event.value1_start(), 0),
                ))
            }
            EmitPhase::StutterOn(index) => {
                let time = t0 + self.clocks_to_samples(index as f64 * event.stutter_dur() as f64);
                self.phase = EmitPhase::StutterOff(index.saturating_add(1));
                Some(ScheduledEvent::new(
                    time,
                    message(event.value1_start(), event.value2_start()),
                ))
            }
            EmitPhase::Ramp(clock) => {
                let total = ramp_clocks(event, clocks);
                if clock >= total {
                    self.phase = EmitPhase::End;
                    return None;
                }
                let from = event.value2_start() as i64;
                let to = event.value2_end() as i64;
                let value = from + (to - from) * clock as i64 / total as i64;
                self.phase = EmitPhase::Ramp(clock + 1);
                Some(ScheduledEvent::new(
                    t0 + self.clocks_to_samples(clock as f64),
                    message(event.value1_start(), value as u8),
                ))
            }
            EmitPhase::End => {
                self.phase = EmitPhase::Start;
                self.next_event += 1;
                if !event.has_end() {
                    return None;
                }
                Some(ScheduledEvent::new(
                    end_time,
                    message(event.value1_end(), event.value2_end()),
                ))
            }
        }
    }
}

/// Whole clocks a controller ramp is spread over (0 when the event is not a ramp)
fn ramp_clocks(event: &StepEvent, clocks: f64) -> u32 {
    if event.is_note() || event.value2_start() == event.value2_end() {
        0
    } else {
        clocks.floor().max(0.0) as u32
    }
}

/// A MIDI track
///
/// Placements never overlap: each tick of the track belongs to at most one
/// pattern. The track only stores pattern ids, so deleting a pattern from the
/// registry cannot leave a dangling reference behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    channel: u8,
    output: u8,
    map: u8,
    placements: BTreeMap<u32, PatternId>,
    length: u32,
    muted: bool,
    soloed: bool,
    cursor: Option<Cursor>,
}

impl Track {
    pub fn new(channel: u8) -> Self {
        Self {
            channel: channel & 0x0F,
            output: 0,
            map: 0,
            placements: BTreeMap::new(),
            length: 0,
            muted: false,
            soloed: false,
            cursor: None,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn set_channel(&mut self, channel: u8) -> bool {
        if channel > 15 {
            return false;
        }
        self.channel = channel;
        true
    }

    pub fn output(&self) -> u8 {
        self.output
    }

    pub fn set_output(&mut self, output: u8) {
        self.output = output;
    }

    /// Note map selector used by editors (e.g. drum maps)
    pub fn map(&self) -> u8 {
        self.map
    }

    pub fn set_map(&mut self, map: u8) {
        self.map = map;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if muted {
            self.cursor = None;
        }
    }

    pub fn is_soloed(&self) -> bool {
        self.soloed
    }

    pub fn set_soloed(&mut self, soloed: bool) {
        self.soloed = soloed;
    }

    /// Ticks up to the end of the last placement
    pub fn length(&self) -> u32 {
        self.length
    }

    /// (start tick, pattern id) pairs in start order
    pub fn placements(&self) -> impl Iterator<Item = (u32, PatternId)> + '_ {
        self.placements.iter().map(|(&start, &id)| (start, id))
    }

    pub fn placement_count(&self) -> usize {
        self.placements.len()
    }

    /// Place a pattern at `position`
    ///
    /// Fails without touching the track if the new placement would overlap an
    /// existing one, unless `force` is set, in which case the conflicting
    /// placements are removed first. The patterns themselves stay in the
    /// registry.
    pub fn add_pattern(
        &mut self,
        position: u32,
        pattern_id: PatternId,
        patterns: &PatternMap,
        force: bool,
    ) -> bool {
        let Some(pattern) = patterns.get(&pattern_id) else {
            return false;
        };
        let Some(end) = position.checked_add(pattern.length_in_ticks()) else {
            return false;
        };

        let conflicts: Vec<u32> = self
            .placements
            .iter()
            .filter(|&(&start, id)| {
                let length = patterns
                    .get(id)
                    .map(Pattern::length_in_ticks)
                    .unwrap_or(0)
                    .max(1);
                start < end && position < start.saturating_add(length)
            })
            .map(|(&start, _)| start)
            .collect();

        if !conflicts.is_empty() {
            if !force {
                return false;
            }
            for start in conflicts {
                self.placements.remove(&start);
            }
        }

        self.placements.insert(position, pattern_id);
        self.cursor = None;
        self.refresh_length(patterns);
        true
    }

    /// Remove the placement starting at `position`
    pub fn remove_pattern(&mut self, position: u32, patterns: &PatternMap) -> Option<PatternId> {
        let removed = self.placements.remove(&position)?;
        self.cursor = None;
        self.refresh_length(patterns);
        Some(removed)
    }

    /// Drop every placement of `pattern_id`, returning how many were removed
    pub(crate) fn remove_pattern_id(&mut self, pattern_id: PatternId, patterns: &PatternMap) -> usize {
        let before = self.placements.len();
        self.placements.retain(|_, id| *id != pattern_id);
        let removed = before - self.placements.len();
        if removed > 0 {
            self.cursor = None;
            self.refresh_length(patterns);
        }
        removed
    }

    /// Placement (start, id) covering `tick`
    pub fn pattern_at(&self, tick: u32, patterns: &PatternMap) -> Option<(u32, PatternId)> {
        self.placement_at(tick, patterns)
            .map(|(start, id, _)| (start, id))
    }

    fn placement_at<'p>(
        &self,
        tick: u32,
        patterns: &'p PatternMap,
    ) -> Option<(u32, PatternId, &'p Pattern)> {
        let (&start, &id) = self.placements.range(..=tick).next_back()?;
        let pattern = patterns.get(&id)?;
        (tick < start.saturating_add(pattern.length_in_ticks())).then_some((start, id, pattern))
    }

    /// Recompute the length from the current pattern sizes
    pub fn refresh_length(&mut self, patterns: &PatternMap) {
        self.length = self
            .placements
            .iter()
            .map(|(&start, id)| {
                let length = patterns
                    .get(id)
                    .map(Pattern::length_in_ticks)
                    .unwrap_or(0);
                start.saturating_add(length)
            })
            .max()
            .unwrap_or(0);
    }

    pub fn clear(&mut self) {
        self.placements.clear();
        self.length = 0;
        self.cursor = None;
    }

    /// Forget the play cursor (next clock starts from the placement boundary)
    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// Advance to `position` (ticks from the start of the owning sequence)
    ///
    /// Returns true on ticks where a step of the pattern under the play head
    /// begins; the step's events are then drained with [`Track::next_event`].
    pub fn clock(
        &mut self,
        now: u64,
        position: u32,
        samples_per_clock: f64,
        patterns: &PatternMap,
    ) -> bool {
        if self.muted {
            return false;
        }
        let Some((start, pattern_id, pattern)) = self.placement_at(position, patterns) else {
            self.cursor = None;
            return false;
        };

        let offset = position - start;
        let same_placement =
            matches!(self.cursor, Some(c) if c.start == start && c.pattern == pattern_id);
        if !same_placement || offset == 0 {
            self.cursor = Some(Cursor::new(start, pattern_id, pattern.clocks_per_step()));
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return false;
        };

        if offset % cursor.clocks_per_step != 0 {
            cursor.due = false;
            return false;
        }

        let step = offset / cursor.clocks_per_step;
        cursor.step = step;
        cursor.step_time = now;
        cursor.samples_per_clock = samples_per_clock;
        cursor.next_event = pattern.first_event_at(step);
        cursor.phase = EmitPhase::Start;
        cursor.due = true;
        true
    }

    /// Next message due for the current step, `None` once the step is drained
    ///
    /// Each step event yields its start message at the step time, then its end
    /// message one sample before the duration elapses, so a note-off always
    /// precedes a note-on on the following step.
    pub fn next_event(&mut self, patterns: &PatternMap) -> Option<ScheduledEvent> {
        let channel = self.channel;
        let cursor = self.cursor.as_mut()?;
        if !cursor.due {
            return None;
        }
        let Some(pattern) = patterns.get(&cursor.pattern) else {
            cursor.due = false;
            return None;
        };

        loop {
            let step = cursor.step;
            let Some(event) = pattern
                .events()
                .get(cursor.next_event)
                .filter(|e| e.position() == step)
            else {
                cursor.due = false;
                return None;
            };
            if let Some(scheduled) = cursor.emit(event, channel) {
                return Some(scheduled);
            }
        }
    }
}

impl Default for Track {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::CONTROL_CHANGE;

    const SPC: f64 = 1000.0;

    fn patterns_with(id: PatternId, pattern: Pattern) -> PatternMap {
        let mut patterns = PatternMap::new();
        patterns.insert(id, pattern);
        patterns
    }

    fn drain(track: &mut Track, patterns: &PatternMap) -> Vec<ScheduledEvent> {
        std::iter::from_fn(|| track.next_event(patterns)).collect()
    }

    #[test]
    fn test_add_pattern_updates_length() {
        let patterns = patterns_with(1, Pattern::new(4, 4));
        let mut track = Track::new(0);

        assert!(track.add_pattern(0, 1, &patterns, false));
        assert!(track.add_pattern(96, 1, &patterns, false));
        assert_eq!(track.length(), 192);
        assert_eq!(track.placement_count(), 2);
    }

    #[test]
    fn test_overlap_without_force_leaves_track_untouched() {
        let patterns = patterns_with(1, Pattern::new(4, 4));
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);
        let before = track.clone();

        assert!(!track.add_pattern(48, 1, &patterns, false));
        assert_eq!(track, before);
    }

    #[test]
    fn test_forced_overlap_evicts_placement() {
        let mut patterns = patterns_with(1, Pattern::new(4, 4));
        patterns.insert(2, Pattern::new(2, 4));
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);
        track.add_pattern(96, 1, &patterns, false);

        assert!(track.add_pattern(72, 2, &patterns, true));
        let placements: Vec<_> = track.placements().collect();
        assert_eq!(placements, vec![(72, 2)]);
        assert_eq!(track.length(), 120);
        // The evicted pattern is still owned by the caller
        assert!(patterns.contains_key(&1));
    }

    #[test]
    fn test_missing_pattern_cannot_be_placed() {
        let patterns = PatternMap::new();
        let mut track = Track::new(0);
        assert!(!track.add_pattern(0, 7, &patterns, true));
    }

    #[test]
    fn test_remove_pattern() {
        let patterns = patterns_with(1, Pattern::new(4, 4));
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);
        track.add_pattern(96, 1, &patterns, false);

        assert_eq!(track.remove_pattern(96, &patterns), Some(1));
        assert_eq!(track.remove_pattern(50, &patterns), None);
        assert_eq!(track.length(), 96);
        assert_eq!(track.remove_pattern_id(1, &patterns), 1);
        assert_eq!(track.length(), 0);
    }

    #[test]
    fn test_pattern_at() {
        let patterns = patterns_with(1, Pattern::new(1, 4));
        let mut track = Track::new(0);
        track.add_pattern(48, 1, &patterns, false);

        assert_eq!(track.pattern_at(47, &patterns), None);
        assert_eq!(track.pattern_at(48, &patterns), Some((48, 1)));
        assert_eq!(track.pattern_at(71, &patterns), Some((48, 1)));
        assert_eq!(track.pattern_at(72, &patterns), None);
    }

    #[test]
    fn test_step_due_every_clocks_per_step() {
        let patterns = patterns_with(1, Pattern::new(1, 4));
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);

        let due: Vec<u32> = (0..24)
            .filter(|&tick| track.clock(tick as u64 * 1000, tick, SPC, &patterns))
            .collect();
        assert_eq!(due, vec![0, 6, 12, 18]);
        assert!(!track.clock(24_000, 24, SPC, &patterns));
    }

    #[test]
    fn test_note_start_and_end() {
        let mut pattern = Pattern::new(4, 4);
        pattern.add_note(0, 60, 100, 4.0);
        let patterns = patterns_with(1, pattern);
        let mut track = Track::new(3);
        track.add_pattern(0, 1, &patterns, false);

        assert!(track.clock(5000, 0, SPC, &patterns));
        let events = drain(&mut track, &patterns);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].time, 5000);
        assert_eq!(events[0].message.as_bytes(), &[0x93, 60, 100]);
        // 4 steps * 6 clocks * 1000 samples, minus one sample
        assert_eq!(events[1].time, 5000 + 24_000 - 1);
        assert_eq!(events[1].message.as_bytes(), &[0x93, 60, 0]);
        assert!(track.next_event(&patterns).is_none());
    }

    #[test]
    fn test_note_added_as_event_is_released() {
        let mut pattern = Pattern::new(4, 4);
        pattern.add_event(0, NOTE_ON, 60, 100, 4.0).unwrap();
        let patterns = patterns_with(1, pattern);
        let mut track = Track::new(3);
        track.add_pattern(0, 1, &patterns, false);

        assert!(track.clock(5000, 0, SPC, &patterns));
        let events = drain(&mut track, &patterns);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message.as_bytes(), &[0x93, 60, 100]);
        assert_eq!(events[1].message.as_bytes(), &[0x93, 60, 0]);
    }

    #[test]
    fn test_events_only_on_their_step() {
        let mut pattern = Pattern::new(4, 4);
        pattern.add_note(1, 62, 100, 1.0);
        let patterns = patterns_with(1, pattern);
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);

        assert!(track.clock(0, 0, SPC, &patterns));
        assert!(drain(&mut track, &patterns).is_empty());
        assert!(!track.clock(1000, 1, SPC, &patterns));
        assert!(drain(&mut track, &patterns).is_empty());
        assert!(track.clock(6000, 6, SPC, &patterns));
        assert_eq!(drain(&mut track, &patterns).len(), 2);
    }

    #[test]
    fn test_controller_ramp_interpolates_per_clock() {
        let mut pattern = Pattern::new(4, 4);
        pattern.add_control(0, 74, 0, 120, 1.0);
        let patterns = patterns_with(1, pattern);
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);

        track.clock(0, 0, SPC, &patterns);
        let events = drain(&mut track, &patterns);

        // start, five intermediate clocks, end
        let values: Vec<u8> = events.iter().map(|e| e.message.data2()).collect();
        assert_eq!(values, vec![0, 20, 40, 60, 80, 100, 120]);
        let times: Vec<u64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0, 1000, 2000, 3000, 4000, 5000, 5999]);
        assert!(events.iter().all(|e| e.message.command() == CONTROL_CHANGE));
    }

    #[test]
    fn test_static_controller_has_no_end_message() {
        let mut pattern = Pattern::new(4, 4);
        pattern.add_control(0, 7, 100, 100, 1.0);
        let patterns = patterns_with(1, pattern);
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);

        track.clock(0, 0, SPC, &patterns);
        assert_eq!(drain(&mut track, &patterns).len(), 1);
    }

    #[test]
    fn test_stutter_retriggers_note() {
        let mut pattern = Pattern::new(4, 4);
        pattern.add_note(0, 60, 100, 2.0);
        pattern.set_stutter(0, 60, 2, 3);
        let patterns = patterns_with(1, pattern);
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);

        track.clock(0, 0, SPC, &patterns);
        let events = drain(&mut track, &patterns);
        let summary: Vec<(u64, u8)> = events
            .iter()
            .map(|e| (e.time, e.message.data2()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (0, 100),
                (2999, 0),
                (3000, 100),
                (5999, 0),
                (6000, 100),
                (11_999, 0),
            ]
        );
    }

    #[test]
    fn test_muted_track_is_silent() {
        let mut pattern = Pattern::new(4, 4);
        pattern.add_note(0, 60, 100, 1.0);
        let patterns = patterns_with(1, pattern);
        let mut track = Track::new(0);
        track.add_pattern(0, 1, &patterns, false);
        track.set_muted(true);

        assert!(!track.clock(0, 0, SPC, &patterns));
        assert!(track.next_event(&patterns).is_none());
    }

    #[test]
    fn test_set_channel_rejects_out_of_range() {
        let mut track = Track::new(0);
        assert!(!track.set_channel(16));
        assert!(track.set_channel(9));
        assert_eq!(track.channel(), 9);
    }
}
