// Sequence - Tracks playing in lock-step under one play state
// Owns the play cursor, end-of-sequence policy and the tally report

use crate::midi::event::MidiMessage;
use crate::sequencer::pattern::PatternMap;
use crate::sequencer::play_state::{PlayMode, PlayState, transition};
use crate::sequencer::track::Track;
use crate::sequencer::{NO_TALLY_CHANNEL, NO_TRIGGER, ScheduledEvent};

pub type SequenceId = u32;

/// What happened during one [`Sequence::clock`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockOutcome {
    /// At least one track reached a step boundary
    pub step: bool,
    /// The play state changed since the last drain
    pub state_changed: bool,
}

impl ClockOutcome {
    /// Nothing to drain
    pub fn is_idle(&self) -> bool {
        !self.step && !self.state_changed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    tracks: Vec<Track>,
    play_mode: PlayMode,
    play_state: PlayState,
    group: u8,
    trigger_note: u8,
    tally_channel: u8,
    length: u32,
    position: u32,
    clock_time: u64,
    state_changed: bool,
}

impl Sequence {
    /// A stopped, looping sequence with a single empty track
    pub fn new() -> Self {
        Self {
            tracks: vec![Track::new(0)],
            play_mode: PlayMode::default(),
            play_state: PlayState::Stopped,
            group: 0,
            trigger_note: NO_TRIGGER,
            tally_channel: NO_TALLY_CHANNEL,
            length: 0,
            position: 0,
            clock_time: 0,
            state_changed: false,
        }
    }

    // Tracks

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Mutable track access; call [`Sequence::refresh_length`] after
    /// changing placements
    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Append an empty track on the channel of the first one
    pub fn add_track(&mut self) -> usize {
        let channel = self.tracks.first().map(Track::channel).unwrap_or(0);
        self.tracks.push(Track::new(channel));
        self.tracks.len() - 1
    }

    pub fn remove_track(&mut self, index: usize, patterns: &PatternMap) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.tracks.remove(index);
        self.refresh_length(patterns);
        true
    }

    /// Recompute track lengths and the sequence length
    ///
    /// A sequence left with nothing to play stops.
    pub fn refresh_length(&mut self, patterns: &PatternMap) {
        for track in &mut self.tracks {
            track.refresh_length(patterns);
        }
        self.length = self.tracks.iter().map(Track::length).max().unwrap_or(0);
        if self.length == 0 && self.play_state != PlayState::Stopped {
            self.enter(PlayState::Stopped);
        }
    }

    // Metadata

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Next tick to be played, relative to the start of the sequence
    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn set_position(&mut self, position: u32) {
        self.position = position.min(self.length);
        self.reset_tracks();
    }

    pub fn play_mode(&self) -> PlayMode {
        self.play_mode
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) {
        self.play_mode = mode;
        if mode == PlayMode::Disabled && self.play_state != PlayState::Stopped {
            self.enter(PlayState::Stopped);
        }
    }

    pub fn group(&self) -> u8 {
        self.group
    }

    pub fn set_group(&mut self, group: u8) {
        self.group = group;
    }

    pub fn trigger_note(&self) -> u8 {
        self.trigger_note
    }

    /// Use `Registry::set_trigger_note` so the trigger map stays in sync
    pub(crate) fn set_trigger_note(&mut self, note: u8) {
        self.trigger_note = if note > 127 { NO_TRIGGER } else { note };
    }

    pub fn tally_channel(&self) -> u8 {
        self.tally_channel
    }

    pub fn set_tally_channel(&mut self, channel: u8) {
        self.tally_channel = channel.min(NO_TALLY_CHANNEL);
    }

    // Play state

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    /// Request a play state; the effective state is returned
    ///
    /// A start request on a stopped sequence rewinds it.
    pub fn set_play_state(&mut self, requested: PlayState) -> PlayState {
        let next = transition(self.play_state, requested, self.play_mode, self.length);
        if next == PlayState::Starting && self.play_state != PlayState::Starting {
            self.position = 0;
            self.reset_tracks();
        }
        self.enter(next);
        next
    }

    /// Enter `state` without the request policy; used for group hand-off
    pub fn force_play_state(&mut self, state: PlayState) {
        let state = if self.length == 0 {
            PlayState::Stopped
        } else {
            state
        };
        self.enter(state);
    }

    pub fn toggle_play_state(&mut self) -> PlayState {
        self.set_play_state(self.play_state.toggled())
    }

    /// Start from the current position instead of rewinding
    pub fn resume(&mut self) -> PlayState {
        let next = transition(
            self.play_state,
            PlayState::Starting,
            self.play_mode,
            self.length,
        );
        if self.position >= self.length {
            self.position = 0;
        }
        self.reset_tracks();
        self.enter(next);
        next
    }

    fn enter(&mut self, state: PlayState) {
        if state != self.play_state {
            self.play_state = state;
            self.state_changed = true;
        }
    }

    fn reset_tracks(&mut self) {
        for track in &mut self.tracks {
            track.reset();
        }
    }

    /// Advance by one clock tick
    ///
    /// `sync` marks the first tick of a bar: pending starts and restarts take
    /// effect there, and stop requests in the *SYNC modes truncate playback.
    pub fn clock(
        &mut self,
        now: u64,
        sync: bool,
        samples_per_clock: f64,
        patterns: &PatternMap,
    ) -> ClockOutcome {
        let mut outcome = ClockOutcome::default();
        self.clock_time = now;

        if sync {
            match self.play_state {
                PlayState::Starting => self.enter(PlayState::Playing),
                PlayState::Restarting => {
                    self.position = 0;
                    self.reset_tracks();
                    self.enter(PlayState::Playing);
                }
                PlayState::Stopping if self.play_mode.stops_at_sync() => {
                    self.enter(PlayState::Stopped)
                }
                _ => {}
            }
        }

        if self.is_sounding() && self.position >= self.length {
            if self.play_state == PlayState::Stopping || !self.play_mode.is_looping() {
                self.enter(PlayState::Stopped);
            } else {
                self.position = 0;
                self.reset_tracks();
            }
        }

        if self.is_sounding() {
            let any_solo = self.tracks.iter().any(Track::is_soloed);
            for track in &mut self.tracks {
                if any_solo && !track.is_soloed() {
                    track.reset();
                    continue;
                }
                if track.clock(now, self.position, samples_per_clock, patterns) {
                    outcome.step = true;
                }
            }
            self.position += 1;
        }

        outcome.state_changed = self.state_changed;
        outcome
    }

    fn is_sounding(&self) -> bool {
        matches!(
            self.play_state,
            PlayState::Playing | PlayState::Stopping | PlayState::Restarting
        )
    }

    fn tally(&self) -> Option<ScheduledEvent> {
        if self.tally_channel >= NO_TALLY_CHANNEL || self.trigger_note > 127 {
            return None;
        }
        Some(ScheduledEvent::new(
            self.clock_time,
            MidiMessage::note_on(
                self.tally_channel,
                self.trigger_note,
                self.play_state.tally_velocity(),
            ),
        ))
    }

    /// Messages produced by the last clock tick
    ///
    /// The pending state-change tally comes first, then each track's events
    /// in track order. Dropping the iterator early discards the rest of this
    /// tick's events; the next clock tick starts afresh.
    pub fn events<'a>(&'a mut self, patterns: &'a PatternMap) -> SequenceEvents<'a> {
        SequenceEvents {
            sequence: self,
            patterns,
            track: 0,
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over one clock tick's worth of scheduled messages
pub struct SequenceEvents<'a> {
    sequence: &'a mut Sequence,
    patterns: &'a PatternMap,
    track: usize,
}

impl Iterator for SequenceEvents<'_> {
    type Item = ScheduledEvent;

    fn next(&mut self) -> Option<ScheduledEvent> {
        if self.sequence.state_changed {
            self.sequence.state_changed = false;
            if let Some(tally) = self.sequence.tally() {
                return Some(tally);
            }
        }

        while let Some(track) = self.sequence.tracks.get_mut(self.track) {
            if let Some(event) = track.next_event(self.patterns) {
                return Some(event);
            }
            self.track += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::pattern::Pattern;

    const SPC: f64 = 100.0;

    fn one_pattern_sequence(mode: PlayMode) -> (Sequence, PatternMap) {
        let mut pattern = Pattern::new(1, 4);
        pattern.add_note(0, 60, 100, 1.0);
        let mut patterns = PatternMap::new();
        patterns.insert(1, pattern);

        let mut sequence = Sequence::new();
        sequence
            .track_mut(0)
            .unwrap()
            .add_pattern(0, 1, &patterns, false);
        sequence.refresh_length(&patterns);
        sequence.set_play_mode(mode);
        (sequence, patterns)
    }

    fn run(
        sequence: &mut Sequence,
        patterns: &PatternMap,
        ticks: std::ops::Range<u64>,
    ) -> Vec<ScheduledEvent> {
        let mut out = Vec::new();
        for tick in ticks {
            sequence.clock(tick * 100, tick == 0, SPC, patterns);
            out.extend(sequence.events(patterns));
        }
        out
    }

    #[test]
    fn test_empty_sequence_cannot_start() {
        let mut sequence = Sequence::new();
        assert_eq!(sequence.set_play_state(PlayState::Starting), PlayState::Stopped);
    }

    #[test]
    fn test_starting_waits_for_sync() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::Loop);
        sequence.set_play_state(PlayState::Starting);

        let outcome = sequence.clock(0, false, SPC, &patterns);
        assert!(!outcome.step);
        assert_eq!(sequence.play_state(), PlayState::Starting);

        let outcome = sequence.clock(100, true, SPC, &patterns);
        assert!(outcome.step);
        assert!(outcome.state_changed);
        assert_eq!(sequence.play_state(), PlayState::Playing);
        assert_eq!(sequence.position(), 1);
    }

    #[test]
    fn test_loop_wraps_and_repeats() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::Loop);
        sequence.set_play_state(PlayState::Starting);

        let events = run(&mut sequence, &patterns, 0..48);
        let note_ons: Vec<u64> = events
            .iter()
            .filter(|e| e.message.data2() == 100)
            .map(|e| e.time)
            .collect();
        assert_eq!(note_ons, vec![0, 2400]);
        assert_eq!(sequence.play_state(), PlayState::Playing);
    }

    #[test]
    fn test_oneshot_stops_at_end() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::OneShot);
        sequence.set_play_state(PlayState::Starting);

        let events = run(&mut sequence, &patterns, 0..24);
        assert_eq!(events.len(), 2);

        let outcome = sequence.clock(2400, false, SPC, &patterns);
        assert!(outcome.state_changed);
        assert_eq!(sequence.play_state(), PlayState::Stopped);
        sequence.events(&patterns).for_each(drop);

        let outcome = sequence.clock(2500, true, SPC, &patterns);
        assert!(outcome.is_idle());
    }

    #[test]
    fn test_loop_all_finishes_cycle_before_stopping() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::LoopAll);
        sequence.set_play_state(PlayState::Starting);
        run(&mut sequence, &patterns, 0..10);

        assert_eq!(sequence.set_play_state(PlayState::Stopping), PlayState::Stopping);
        run(&mut sequence, &patterns, 10..24);
        assert_eq!(sequence.play_state(), PlayState::Stopping);
        run(&mut sequence, &patterns, 24..25);
        assert_eq!(sequence.play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_sync_mode_truncates_at_sync() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::LoopSync);
        sequence.set_play_state(PlayState::Starting);
        run(&mut sequence, &patterns, 0..5);

        sequence.set_play_state(PlayState::Stopping);
        sequence.clock(500, false, SPC, &patterns);
        assert_eq!(sequence.play_state(), PlayState::Stopping);
        sequence.clock(600, true, SPC, &patterns);
        assert_eq!(sequence.play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_restart_rewinds_on_sync() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::Loop);
        sequence.set_play_state(PlayState::Starting);
        run(&mut sequence, &patterns, 0..10);

        assert_eq!(
            sequence.set_play_state(PlayState::Restarting),
            PlayState::Restarting
        );
        sequence.clock(1000, false, SPC, &patterns);
        assert_eq!(sequence.position(), 11);
        sequence.clock(1100, true, SPC, &patterns);
        assert_eq!(sequence.play_state(), PlayState::Playing);
        assert_eq!(sequence.position(), 1);
    }

    #[test]
    fn test_tally_reports_state_changes() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::Loop);
        sequence.set_trigger_note(36);
        sequence.set_tally_channel(9);
        sequence.set_play_state(PlayState::Starting);

        sequence.clock(0, false, SPC, &patterns);
        let tally: Vec<_> = sequence.events(&patterns).collect();
        assert_eq!(tally.len(), 1);
        assert_eq!(tally[0].message.as_bytes(), &[0x99, 36, 5]);

        sequence.clock(100, true, SPC, &patterns);
        let events: Vec<_> = sequence.events(&patterns).collect();
        assert_eq!(events[0].message.as_bytes(), &[0x99, 36, 1]);
        assert_eq!(events[1].message.data1(), 60);
    }

    #[test]
    fn test_no_tally_without_channel() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::Loop);
        sequence.set_trigger_note(36);
        sequence.set_play_state(PlayState::Starting);

        sequence.clock(0, false, SPC, &patterns);
        assert_eq!(sequence.events(&patterns).count(), 0);
    }

    #[test]
    fn test_solo_silences_other_tracks() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::Loop);
        let second = sequence.add_track();
        sequence
            .track_mut(second)
            .unwrap()
            .add_pattern(0, 1, &patterns, false);
        sequence.track_mut(second).unwrap().set_soloed(true);
        sequence.set_play_state(PlayState::Starting);

        let events = run(&mut sequence, &patterns, 0..1);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_resume_keeps_position() {
        let (mut sequence, patterns) = one_pattern_sequence(PlayMode::Loop);
        sequence.set_position(12);
        sequence.resume();
        sequence.clock(0, true, SPC, &patterns);

        assert_eq!(sequence.play_state(), PlayState::Playing);
        assert_eq!(sequence.position(), 13);
    }

    #[test]
    fn test_disabling_stops_playback() {
        let (mut sequence, _patterns) = one_pattern_sequence(PlayMode::Loop);
        sequence.force_play_state(PlayState::Playing);
        sequence.set_play_mode(PlayMode::Disabled);
        assert_eq!(sequence.play_state(), PlayState::Stopped);
    }
}
