// Registry - Owns every pattern, song and sequence by integer id
// Routes clock ticks to the active songs and MIDI input to triggers and the editor

pub mod persistence;

pub use persistence::{FORMAT_VERSION, PersistenceError};

use crate::midi::event::MidiEvent;
use crate::scheduler::schedule::Schedule;
use crate::sequencer::{
    NO_TRIGGER, PPQN, Pattern, PatternId, PatternMap, PlayMode, PlayState, Sequence, SequenceId,
    Song,
};
use std::collections::BTreeMap;

/// Offset separating pad song ids from main song ids in the file format
pub const PAD_SONG_OFFSET: u32 = 1000;

/// Which of the two parallel songs of a logical song index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SongSlot {
    /// Arranged song
    #[default]
    Main,
    /// Launcher pads played alongside the main song
    Pad,
}

/// A song slot of a logical song index
///
/// Only indices up to [`SongKey::MAX_INDEX`] can hold a song: main and pad
/// songs share one file id space, so larger indices would alias on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SongKey {
    pub index: u32,
    pub slot: SongSlot,
}

impl SongKey {
    /// Reserved song holding the pattern being edited
    pub const EDITOR: SongKey = SongKey::main(0);

    /// Highest song index the registry accepts
    pub const MAX_INDEX: u32 = PAD_SONG_OFFSET - 1;

    pub const fn main(index: u32) -> Self {
        Self {
            index,
            slot: SongSlot::Main,
        }
    }

    pub const fn pad(index: u32) -> Self {
        Self {
            index,
            slot: SongSlot::Pad,
        }
    }

    pub const fn is_valid(self) -> bool {
        self.index <= Self::MAX_INDEX
    }

    pub(crate) fn file_id(self) -> Option<u32> {
        if !self.is_valid() {
            return None;
        }
        match self.slot {
            SongSlot::Main => Some(self.index),
            SongSlot::Pad => self.index.checked_add(PAD_SONG_OFFSET),
        }
    }

    pub(crate) fn from_file_id(id: u32) -> Option<Self> {
        let key = match id.checked_sub(PAD_SONG_OFFSET) {
            Some(index) => Self::pad(index),
            None => Self::main(id),
        };
        key.is_valid().then_some(key)
    }
}

/// Pattern editor state
#[derive(Debug, Clone, PartialEq)]
struct Editor {
    sequence: SequenceId,
    pattern: Option<PatternId>,
    step: u32,
    input_channel: u8,
    note_duration: f32,
}

/// Root owner of the sequencer data model
///
/// Entities are created on first access by id. Tracks hold pattern ids only,
/// so deleting a pattern also removes every placement of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    patterns: PatternMap,
    songs: BTreeMap<SongKey, Song>,
    sequences: BTreeMap<SequenceId, Sequence>,
    sequence_songs: BTreeMap<SequenceId, SongKey>,
    triggers: BTreeMap<u8, SequenceId>,
    next_sequence: SequenceId,
    playing_song: u32,
    selected_song: u32,
    trigger_channel: u8,
    editor: Editor,
}

impl Registry {
    pub const DEFAULT_TRIGGER_CHANNEL: u8 = 15;
    /// Channels at or above this value disable the corresponding input
    pub const NO_CHANNEL: u8 = 16;

    pub fn new() -> Self {
        let mut registry = Self {
            patterns: PatternMap::new(),
            songs: BTreeMap::new(),
            sequences: BTreeMap::new(),
            sequence_songs: BTreeMap::new(),
            triggers: BTreeMap::new(),
            next_sequence: 0,
            playing_song: 1,
            selected_song: 1,
            trigger_channel: Self::DEFAULT_TRIGGER_CHANNEL,
            editor: Editor {
                sequence: 0,
                pattern: None,
                step: 0,
                input_channel: Self::NO_CHANNEL,
                note_duration: 1.0,
            },
        };
        registry.init_editor();
        registry
    }

    fn init_editor(&mut self) {
        self.songs.insert(SongKey::EDITOR, Song::new());
        let index = self.add_track(SongKey::EDITOR).unwrap_or_default();
        self.editor.sequence = self.sequence_id(SongKey::EDITOR, index).unwrap_or_default();
        self.editor.pattern = None;
        self.editor.step = 0;
    }

    /// Drop everything and start from an empty model
    pub fn clear(&mut self) {
        let input_channel = self.editor.input_channel;
        let note_duration = self.editor.note_duration;
        *self = Self::new();
        self.editor.input_channel = input_channel;
        self.editor.note_duration = note_duration;
    }

    // Patterns

    /// Pattern `id`, created empty if it does not exist yet
    ///
    /// Call [`Registry::refresh_lengths`] after changing a pattern's size
    /// through this reference, or use the `set_pattern_*` helpers.
    pub fn get_pattern(&mut self, id: PatternId) -> &mut Pattern {
        self.patterns.entry(id).or_default()
    }

    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(&id)
    }

    pub fn patterns(&self) -> &PatternMap {
        &self.patterns
    }

    /// Create an empty pattern under the next unused id
    pub fn create_pattern(&mut self) -> PatternId {
        let id = self
            .patterns
            .last_key_value()
            .map(|(&id, _)| id + 1)
            .unwrap_or(1);
        self.patterns.insert(id, Pattern::default());
        id
    }

    /// Delete a pattern and every placement that referenced it
    pub fn delete_pattern(&mut self, id: PatternId) -> bool {
        if self.patterns.remove(&id).is_none() {
            return false;
        }
        for sequence in self.sequences.values_mut() {
            let mut removed = 0;
            for index in 0..sequence.track_count() {
                if let Some(track) = sequence.track_mut(index) {
                    removed += track.remove_pattern_id(id, &self.patterns);
                }
            }
            if removed > 0 {
                sequence.refresh_length(&self.patterns);
            }
        }
        if self.editor.pattern == Some(id) {
            self.editor.pattern = None;
        }
        true
    }

    /// Replace pattern `dst` with a copy of `src`
    pub fn copy_pattern(&mut self, src: PatternId, dst: PatternId) -> bool {
        if src == dst {
            return false;
        }
        let Some(pattern) = self.patterns.get(&src).cloned() else {
            return false;
        };
        self.patterns.insert(dst, pattern);
        self.refresh_lengths();
        true
    }

    pub fn set_pattern_beats(&mut self, id: PatternId, beats: u32) -> bool {
        let changed = self.get_pattern(id).set_beats(beats);
        if changed {
            self.refresh_lengths();
        }
        changed
    }

    pub fn set_pattern_steps_per_beat(&mut self, id: PatternId, steps_per_beat: u32) -> bool {
        self.get_pattern(id).set_steps_per_beat(steps_per_beat)
    }

    /// Recompute every track and sequence length from the current patterns
    pub fn refresh_lengths(&mut self) {
        for sequence in self.sequences.values_mut() {
            sequence.refresh_length(&self.patterns);
        }
    }

    // Songs

    /// Song `key`, created empty if it does not exist yet
    ///
    /// `None` if the key's index is above [`SongKey::MAX_INDEX`].
    pub fn get_song(&mut self, key: SongKey) -> Option<&mut Song> {
        if !key.is_valid() {
            return None;
        }
        Some(self.songs.entry(key).or_default())
    }

    pub fn song(&self, key: SongKey) -> Option<&Song> {
        self.songs.get(&key)
    }

    pub fn song_keys(&self) -> impl Iterator<Item = SongKey> + '_ {
        self.songs.keys().copied()
    }

    /// Remove a song and the sequences it owns; the editor song cannot be deleted
    pub fn delete_song(&mut self, key: SongKey) -> bool {
        if key == SongKey::EDITOR {
            return false;
        }
        let Some(mut song) = self.songs.remove(&key) else {
            return false;
        };
        for sequence in song.clear_tracks() {
            self.drop_sequence(sequence);
        }
        true
    }

    /// Replace song `dst` with a copy of `src`
    ///
    /// Sequences are duplicated, not shared. The copies get no trigger notes
    /// so a note keeps starting exactly one sequence.
    pub fn copy_song(&mut self, src: SongKey, dst: SongKey) -> bool {
        if src == dst || dst == SongKey::EDITOR || !dst.is_valid() {
            return false;
        }
        let Some(source) = self.songs.get(&src).cloned() else {
            return false;
        };

        if let Some(mut old) = self.songs.remove(&dst) {
            for sequence in old.clear_tracks() {
                self.drop_sequence(sequence);
            }
        }

        let mut song = source.clone();
        song.clear_tracks();
        for &sequence_id in source.tracks() {
            let mut sequence = self
                .sequences
                .get(&sequence_id)
                .cloned()
                .unwrap_or_default();
            sequence.set_trigger_note(NO_TRIGGER);
            sequence.force_play_state(PlayState::Stopped);
            let id = self.allocate_sequence(sequence);
            self.sequence_songs.insert(id, dst);
            song.add_track(id);
        }
        self.songs.insert(dst, song);
        true
    }

    pub fn playing_song(&self) -> u32 {
        self.playing_song
    }

    /// Choose the song index whose main and pad songs are clocked as "playing"
    pub fn play_song(&mut self, index: u32) {
        self.playing_song = index;
    }

    pub fn selected_song(&self) -> u32 {
        self.selected_song
    }

    /// Choose the song index being edited; it is clocked too
    pub fn select_song(&mut self, index: u32) {
        self.selected_song = index;
    }

    /// Request a play state for every sequence of a song (no group policy)
    pub fn set_song_play_state(&mut self, key: SongKey, state: PlayState) -> bool {
        let Some(song) = self.songs.get(&key) else {
            return false;
        };
        for id in song.tracks() {
            if let Some(sequence) = self.sequences.get_mut(id) {
                sequence.set_play_state(state);
            }
        }
        true
    }

    /// Move every sequence of a song to `ticks`, wrapping looping sequences
    pub fn set_song_position(&mut self, key: SongKey, ticks: u32) -> bool {
        let Some(song) = self.songs.get(&key) else {
            return false;
        };
        for id in song.tracks() {
            if let Some(sequence) = self.sequences.get_mut(id) {
                let length = sequence.length();
                let position = if sequence.play_mode().is_looping() && length > 0 {
                    ticks % length
                } else {
                    ticks.min(length)
                };
                sequence.set_position(position);
            }
        }
        true
    }

    /// Any sequence of the song sounding or about to sound
    pub fn is_song_playing(&self, key: SongKey) -> bool {
        self.songs.get(&key).is_some_and(|song| {
            song.tracks().iter().any(|id| {
                self.sequences
                    .get(id)
                    .is_some_and(|s| s.play_state().is_active())
            })
        })
    }

    // Tracks and sequences

    /// Append a new sequence to a song, returning the track index
    ///
    /// The sequence's group defaults to its track index so tracks do not
    /// silence each other unless regrouped.
    pub fn add_track(&mut self, key: SongKey) -> Option<usize> {
        if !key.is_valid() {
            return None;
        }
        let index = self.songs.get(&key).map(Song::track_count).unwrap_or(0);
        let mut sequence = Sequence::new();
        sequence.set_group((index % 256) as u8);
        let id = self.allocate_sequence(sequence);
        self.sequence_songs.insert(id, key);
        Some(self.songs.entry(key).or_default().add_track(id))
    }

    pub fn remove_track(&mut self, key: SongKey, index: usize) -> bool {
        let Some(id) = self
            .songs
            .get_mut(&key)
            .and_then(|song| song.remove_track(index))
        else {
            return false;
        };
        self.drop_sequence(id);
        true
    }

    /// Sequence id behind a song track
    pub fn sequence_id(&self, key: SongKey, track: usize) -> Option<SequenceId> {
        self.songs.get(&key).and_then(|song| song.get_sequence(track))
    }

    /// Sequence `id`, created if it does not exist yet (unowned by any song)
    pub fn get_sequence(&mut self, id: SequenceId) -> &mut Sequence {
        if id >= self.next_sequence {
            self.next_sequence = id + 1;
        }
        self.sequences.entry(id).or_default()
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(&id)
    }

    /// Song owning a sequence
    pub fn sequence_song(&self, id: SequenceId) -> Option<SongKey> {
        self.sequence_songs.get(&id).copied()
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    fn allocate_sequence(&mut self, sequence: Sequence) -> SequenceId {
        let id = self.next_sequence;
        self.next_sequence += 1;
        self.sequences.insert(id, sequence);
        id
    }

    fn drop_sequence(&mut self, id: SequenceId) {
        if let Some(sequence) = self.sequences.remove(&id) {
            let note = sequence.trigger_note();
            if self.triggers.get(&note) == Some(&id) {
                self.triggers.remove(&note);
            }
        }
        self.sequence_songs.remove(&id);
    }

    /// Place a pattern on a sequence track, creating the pattern if needed
    pub fn add_pattern(
        &mut self,
        sequence: SequenceId,
        track: usize,
        position: u32,
        pattern: PatternId,
        force: bool,
    ) -> bool {
        self.patterns.entry(pattern).or_default();
        let Some(seq) = self.sequences.get_mut(&sequence) else {
            return false;
        };
        let Some(target) = seq.track_mut(track) else {
            return false;
        };
        let placed = target.add_pattern(position, pattern, &self.patterns, force);
        if placed {
            seq.refresh_length(&self.patterns);
        }
        placed
    }

    pub fn remove_pattern(&mut self, sequence: SequenceId, track: usize, position: u32) -> bool {
        let Some(seq) = self.sequences.get_mut(&sequence) else {
            return false;
        };
        let removed = seq
            .track_mut(track)
            .and_then(|t| t.remove_pattern(position, &self.patterns))
            .is_some();
        if removed {
            seq.refresh_length(&self.patterns);
        }
        removed
    }

    pub fn set_play_mode(&mut self, sequence: SequenceId, mode: PlayMode) -> bool {
        match self.sequences.get_mut(&sequence) {
            Some(seq) => {
                seq.set_play_mode(mode);
                true
            }
            None => false,
        }
    }

    /// Request a play state, applying group exclusivity within the owning song
    ///
    /// Starting a sequence stops its group siblings: those still waiting to
    /// start are stopped outright, those sounding are asked to stop.
    pub fn set_sequence_play_state(
        &mut self,
        id: SequenceId,
        state: PlayState,
    ) -> Option<PlayState> {
        let sequence = self.sequences.get_mut(&id)?;
        let entered = sequence.set_play_state(state);
        let group = sequence.group();

        if matches!(entered, PlayState::Starting | PlayState::Playing) {
            let siblings: Vec<SequenceId> = self
                .sequence_songs
                .get(&id)
                .and_then(|key| self.songs.get(key))
                .map(|song| {
                    song.tracks()
                        .iter()
                        .copied()
                        .filter(|&other| other != id)
                        .collect()
                })
                .unwrap_or_default();

            for other in siblings {
                let Some(sibling) = self.sequences.get_mut(&other) else {
                    continue;
                };
                if sibling.group() != group {
                    continue;
                }
                match sibling.play_state() {
                    PlayState::Starting => sibling.force_play_state(PlayState::Stopped),
                    PlayState::Playing | PlayState::Restarting => {
                        sibling.force_play_state(PlayState::Stopping)
                    }
                    PlayState::Stopped | PlayState::Stopping => {}
                }
            }
        }
        Some(entered)
    }

    pub fn toggle_sequence(&mut self, id: SequenceId) -> Option<PlayState> {
        let requested = self.sequences.get(&id)?.play_state().toggled();
        self.set_sequence_play_state(id, requested)
    }

    // Triggers

    pub fn trigger_channel(&self) -> u8 {
        self.trigger_channel
    }

    /// MIDI channel whose note-ons fire triggers (16 or more disables)
    pub fn set_trigger_channel(&mut self, channel: u8) {
        self.trigger_channel = channel.min(Self::NO_CHANNEL);
    }

    /// Bind a note to a sequence, unbinding whatever held either side before
    pub fn set_trigger_note(&mut self, sequence: SequenceId, note: u8) -> bool {
        let Some(current) = self.sequences.get(&sequence).map(Sequence::trigger_note) else {
            return false;
        };
        if self.triggers.get(&current) == Some(&sequence) {
            self.triggers.remove(&current);
        }
        if note > 127 {
            self.get_sequence(sequence).set_trigger_note(NO_TRIGGER);
            return true;
        }
        if let Some(previous) = self.triggers.insert(note, sequence) {
            if previous != sequence {
                if let Some(other) = self.sequences.get_mut(&previous) {
                    other.set_trigger_note(NO_TRIGGER);
                }
            }
        }
        self.get_sequence(sequence).set_trigger_note(note);
        true
    }

    /// Toggle the sequence bound to `note`, returning its id
    pub fn trigger(&mut self, note: u8) -> Option<SequenceId> {
        let id = *self.triggers.get(&note)?;
        let state = self.toggle_sequence(id)?;
        log::debug!("Trigger note {note} -> sequence {id} {state:?}");
        Some(id)
    }

    // Pattern editor

    /// Sequence playing back the pattern under edit
    pub fn editor_sequence(&self) -> SequenceId {
        self.editor.sequence
    }

    pub fn editor_pattern(&self) -> Option<PatternId> {
        self.editor.pattern
    }

    /// Put a pattern under edit; it becomes the only placement of the editor song
    pub fn set_editor_pattern(&mut self, pattern: PatternId) {
        self.patterns.entry(pattern).or_default();
        let sequence = self.editor.sequence;
        let Some(seq) = self.sequences.get_mut(&sequence) else {
            return;
        };
        if let Some(track) = seq.track_mut(0) {
            track.clear();
            track.add_pattern(0, pattern, &self.patterns, true);
        }
        seq.refresh_length(&self.patterns);
        self.editor.pattern = Some(pattern);
        self.editor.step = 0;
    }

    pub fn editor_step(&self) -> u32 {
        self.editor.step
    }

    pub fn set_editor_step(&mut self, step: u32) -> bool {
        let valid = self
            .editor
            .pattern
            .and_then(|id| self.patterns.get(&id))
            .is_some_and(|pattern| step < pattern.steps());
        if valid {
            self.editor.step = step;
        }
        valid
    }

    pub fn set_editor_input_channel(&mut self, channel: u8) {
        self.editor.input_channel = channel.min(Self::NO_CHANNEL);
    }

    pub fn set_editor_note_duration(&mut self, steps: f32) {
        if steps.is_finite() && steps > 0.0 {
            self.editor.note_duration = steps;
        }
    }

    /// Toggle `note` at the editing step of the pattern under edit
    pub fn editor_note_input(&mut self, note: u8, velocity: u8) -> bool {
        if velocity == 0 {
            return false;
        }
        let Some(id) = self.editor.pattern else {
            return false;
        };
        let step = self.editor.step;
        let duration = self.editor.note_duration;
        let Some(pattern) = self.patterns.get_mut(&id) else {
            return false;
        };
        if pattern.get_note_velocity(step, note) > 0 {
            pattern.remove_note(step, note)
        } else {
            pattern.add_note(step, note, velocity, duration)
        }
    }

    // MIDI input

    /// Route a decoded input message; returns true if it was consumed
    pub fn handle_midi_input(&mut self, event: MidiEvent) -> bool {
        let playing = SongKey::main(self.playing_song);
        match event {
            MidiEvent::NoteOn { channel, note, .. } if channel == self.trigger_channel => {
                self.trigger(note).is_some()
            }
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } if channel == self.editor.input_channel => self.editor_note_input(note, velocity),
            MidiEvent::Start => {
                self.set_song_position(playing, 0);
                self.set_song_play_state(playing, PlayState::Starting)
            }
            MidiEvent::Stop => self.set_song_play_state(playing, PlayState::Stopped),
            MidiEvent::Continue => {
                let Some(song) = self.songs.get(&playing) else {
                    return false;
                };
                for id in song.tracks() {
                    if let Some(sequence) = self.sequences.get_mut(id) {
                        sequence.resume();
                    }
                }
                true
            }
            MidiEvent::SongPosition(sixteenths) => {
                let ticks = sixteenths as u32 * PPQN / 4;
                self.set_song_position(playing, ticks)
            }
            MidiEvent::SongSelect(song) => {
                self.select_song(song as u32);
                true
            }
            _ => false,
        }
    }

    // Clock

    /// Advance every active song by one tick, merging their output into `schedule`
    ///
    /// Songs are visited in a fixed order: the editor song, the playing song
    /// and its pads, then the selected song and its pads when different.
    /// Returns true while any visited sequence is sounding or about to.
    pub fn clock(
        &mut self,
        now: u64,
        schedule: &mut Schedule,
        sync: bool,
        samples_per_clock: f64,
    ) -> bool {
        let order = [
            SongKey::EDITOR,
            SongKey::main(self.playing_song),
            SongKey::pad(self.playing_song),
            SongKey::main(self.selected_song),
            SongKey::pad(self.selected_song),
        ];

        let mut playing = false;
        for (n, key) in order.iter().enumerate() {
            if order[..n].contains(key) {
                continue;
            }
            let Some(song) = self.songs.get(key) else {
                continue;
            };
            for id in song.tracks() {
                let Some(sequence) = self.sequences.get_mut(id) else {
                    continue;
                };
                let outcome = sequence.clock(now, sync, samples_per_clock, &self.patterns);
                if sequence.play_state().is_active() {
                    playing = true;
                }
                if outcome.is_idle() {
                    continue;
                }
                for event in sequence.events(&self.patterns) {
                    schedule.insert(event);
                }
            }
        }
        playing
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
