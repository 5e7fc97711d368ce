// Persistence - Chunked big-endian file format for the registry
// Each chunk is a 4-byte ASCII tag, a u32 payload size and the payload

use super::{Registry, SongKey};
use crate::sequencer::step_event::StepEvent;
use crate::sequencer::{PPQN, Pattern, PlayMode, SequenceId, TimebaseType};
use std::path::Path;

/// Version written to the "vers" chunk; older versions load too
pub const FORMAT_VERSION: u32 = 4;

const TAG_VERSION: [u8; 4] = *b"vers";
const TAG_PATTERN: [u8; 4] = *b"patn";
const TAG_SONG: [u8; 4] = *b"song";
const TAG_TRIGGER: [u8; 4] = *b"trig";

/// Persistence error types
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing version chunk")]
    MissingVersion,

    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u32),

    #[error("Truncated '{0}' chunk")]
    Truncated(String),

    #[error("Invalid '{tag}' chunk: {reason}")]
    InvalidChunk { tag: String, reason: String },
}

fn tag_name(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

fn put_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_chunk(out: &mut Vec<u8>, tag: [u8; 4], payload: &[u8]) {
    out.extend_from_slice(&tag);
    put_u32(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

/// Cursor over one chunk payload
struct Reader<'a> {
    tag: [u8; 4],
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(tag: [u8; 4], data: &'a [u8]) -> Self {
        Self { tag, data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], PersistenceError> {
        let data = self.data;
        let (head, rest) = data
            .split_first_chunk::<N>()
            .ok_or_else(|| PersistenceError::Truncated(tag_name(&self.tag)))?;
        self.data = rest;
        Ok(*head)
    }

    fn u8(&mut self) -> Result<u8, PersistenceError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, PersistenceError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, PersistenceError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    fn invalid(&self, reason: impl Into<String>) -> PersistenceError {
        PersistenceError::InvalidChunk {
            tag: tag_name(&self.tag),
            reason: reason.into(),
        }
    }
}

/// Split the next chunk off `data`: (tag, payload, rest)
fn next_chunk(data: &[u8]) -> Result<([u8; 4], &[u8], &[u8]), PersistenceError> {
    let mut header = Reader::new(*b"????", data);
    let tag = header.take::<4>()?;
    header.tag = tag;
    let size = header.u32()? as usize;
    if header.data.len() < size {
        return Err(PersistenceError::Truncated(tag_name(&tag)));
    }
    let (payload, rest) = header.data.split_at(size);
    Ok((tag, payload, rest))
}

impl Registry {
    /// Serialize every non-empty pattern and every song but the editor song
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut payload = Vec::new();

        put_u32(&mut payload, FORMAT_VERSION);
        put_chunk(&mut out, TAG_VERSION, &payload);

        for (&id, pattern) in self.patterns.iter().filter(|(_, p)| !p.is_empty()) {
            payload.clear();
            put_u32(&mut payload, id);
            put_u32(&mut payload, pattern.beats());
            put_u16(&mut payload, PPQN as u16);
            put_u16(&mut payload, pattern.steps_per_beat() as u16);
            put_u8(&mut payload, pattern.scale());
            put_u8(&mut payload, pattern.tonic());
            for event in pattern.events() {
                put_u32(&mut payload, event.position());
                put_u32(&mut payload, event.duration().to_bits());
                put_u8(&mut payload, event.command());
                put_u8(&mut payload, event.value1_start());
                put_u8(&mut payload, event.value2_start());
                put_u8(&mut payload, event.value1_end());
                put_u8(&mut payload, event.value2_end());
                put_u8(&mut payload, 0);
            }
            put_chunk(&mut out, TAG_PATTERN, &payload);
        }

        for (&key, song) in self.songs.iter().filter(|(k, _)| **k != SongKey::EDITOR) {
            let Some(file_id) = key.file_id() else {
                log::warn!("Song {key:?} has no file id, not saved");
                continue;
            };
            payload.clear();
            put_u32(&mut payload, file_id);
            put_u16(&mut payload, song.bar_length().min(u16::MAX as u32) as u16);
            put_u16(&mut payload, song.tempo());
            let timebase = song.timebase().events();
            put_u32(&mut payload, timebase.len() as u32);
            for event in timebase {
                put_u16(&mut payload, event.bar);
                put_u16(&mut payload, event.tick);
                put_u16(&mut payload, event.kind as u16);
                put_u16(&mut payload, event.value);
            }
            for id in song.tracks() {
                self.put_sequence(&mut payload, *id);
            }
            put_chunk(&mut out, TAG_SONG, &payload);
        }

        payload.clear();
        put_u8(&mut payload, self.trigger_channel);
        put_u8(&mut payload, 0);
        put_chunk(&mut out, TAG_TRIGGER, &payload);

        out
    }

    // Only the first track of a sequence fits the record layout
    fn put_sequence(&self, out: &mut Vec<u8>, id: SequenceId) {
        let sequence = self.sequences.get(&id).cloned().unwrap_or_default();
        let track = sequence.track(0).cloned().unwrap_or_default();
        put_u8(out, track.channel());
        put_u8(out, track.output());
        put_u8(out, sequence.play_mode() as u8);
        put_u8(out, sequence.group());
        put_u8(out, sequence.trigger_note());
        put_u8(out, track.map());
        let placements: Vec<_> = track.placements().collect();
        put_u16(out, placements.len().min(u16::MAX as usize) as u16);
        for (start, pattern) in placements.into_iter().take(u16::MAX as usize) {
            put_u32(out, start);
            put_u32(out, pattern);
        }
    }

    /// Decode a registry from bytes produced by [`Registry::to_bytes`]
    ///
    /// Sequence ids are reassigned; unknown chunks are skipped.
    pub fn from_bytes(data: &[u8]) -> Result<Registry, PersistenceError> {
        let mut registry = Registry::new();
        let mut version = None;
        let mut rest = data;

        while !rest.is_empty() {
            let (tag, payload, tail) = next_chunk(rest)?;
            rest = tail;
            let mut reader = Reader::new(tag, payload);

            match tag {
                TAG_VERSION => {
                    let value = reader.u32()?;
                    if value == 0 || value > FORMAT_VERSION {
                        return Err(PersistenceError::UnsupportedVersion(value));
                    }
                    version = Some(value);
                }
                _ if version.is_none() => return Err(PersistenceError::MissingVersion),
                TAG_PATTERN => registry.read_pattern(&mut reader)?,
                TAG_SONG => registry.read_song(&mut reader)?,
                TAG_TRIGGER => {
                    let channel = reader.u8()?;
                    reader.u8()?;
                    registry.set_trigger_channel(channel);
                }
                _ => log::debug!("Skipping unknown chunk '{}'", tag_name(&tag)),
            }
        }

        if version.is_none() {
            return Err(PersistenceError::MissingVersion);
        }
        registry.refresh_lengths();
        Ok(registry)
    }

    fn read_pattern(&mut self, reader: &mut Reader<'_>) -> Result<(), PersistenceError> {
        let id = reader.u32()?;
        let beats = reader.u32()?;
        let _clocks_per_beat = reader.u16()?;
        let steps_per_beat = reader.u16()? as u32;
        let scale = reader.u8()?;
        let tonic = reader.u8()?;

        let mut pattern = Pattern::new(beats, steps_per_beat);
        if pattern.beats() != beats || pattern.steps_per_beat() != steps_per_beat {
            return Err(reader.invalid(format!(
                "pattern {id} has an invalid layout ({beats} beats, {steps_per_beat} steps per beat)"
            )));
        }
        pattern.set_scale(scale);
        pattern.set_tonic(tonic);

        while !reader.is_empty() {
            let position = reader.u32()?;
            let duration = f32::from_bits(reader.u32()?);
            let command = reader.u8()?;
            let value1_start = reader.u8()?;
            let value2_start = reader.u8()?;
            let value1_end = reader.u8()?;
            let value2_end = reader.u8()?;
            reader.u8()?;

            if position >= pattern.steps() || !duration.is_finite() || duration < 0.0 {
                log::warn!("Dropping invalid event at step {position} of pattern {id}");
                continue;
            }
            let mut event = StepEvent::new(position, duration, command, value1_start, value2_start);
            event.set_value1(value1_start, value1_end);
            event.set_value2(value2_start, value2_end);
            pattern.push_loaded(event);
        }

        self.patterns.insert(id, pattern);
        Ok(())
    }

    fn read_song(&mut self, reader: &mut Reader<'_>) -> Result<(), PersistenceError> {
        let file_id = reader.u32()?;
        let key = SongKey::from_file_id(file_id)
            .ok_or_else(|| reader.invalid(format!("song id {file_id} out of range")))?;
        if key == SongKey::EDITOR {
            return Err(reader.invalid("the editor song is not stored"));
        }
        let bar_length = reader.u16()? as u32;
        let tempo = reader.u16()?;
        let timebase_count = reader.u32()?;

        let song = self.songs.entry(key).or_default();
        song.set_bar_length(bar_length);
        song.set_tempo(tempo);
        for _ in 0..timebase_count {
            let bar = reader.u16()?;
            let tick = reader.u16()?;
            let kind = reader.u16()?;
            let value = reader.u16()?;
            let kind = TimebaseType::from_u16(kind)
                .ok_or_else(|| reader.invalid(format!("unknown timebase type {kind}")))?;
            song.timebase_mut().add_event(bar, tick, kind, value);
        }

        while !reader.is_empty() {
            let channel = reader.u8()?;
            let output = reader.u8()?;
            let mode = reader.u8()?;
            let group = reader.u8()?;
            let trigger_note = reader.u8()?;
            let map = reader.u8()?;
            let placement_count = reader.u16()?;

            let play_mode = PlayMode::from_u8(mode)
                .ok_or_else(|| reader.invalid(format!("unknown play mode {mode}")))?;

            let id = self
                .add_track(key)
                .and_then(|index| self.sequence_id(key, index))
                .ok_or_else(|| reader.invalid(format!("song {file_id} cannot hold a track")))?;
            for _ in 0..placement_count {
                let start = reader.u32()?;
                let pattern = reader.u32()?;
                self.patterns.entry(pattern).or_default();
                if let Some(track) = self.sequences.get_mut(&id).and_then(|s| s.track_mut(0)) {
                    track.add_pattern(start, pattern, &self.patterns, true);
                }
            }

            let sequence = self.get_sequence(id);
            sequence.set_play_mode(play_mode);
            sequence.set_group(group);
            if let Some(track) = sequence.track_mut(0) {
                track.set_channel(channel);
                track.set_output(output);
                track.set_map(map);
            }
            if trigger_note <= 127 {
                self.set_trigger_note(id, trigger_note);
            }
        }
        Ok(())
    }

    /// Replace the whole model with decoded `data`
    ///
    /// On failure the model is left empty, as if nothing had been loaded.
    pub fn load_bytes(&mut self, data: &[u8]) -> Result<(), PersistenceError> {
        let input_channel = self.editor.input_channel;
        let note_duration = self.editor.note_duration;
        let result = match Registry::from_bytes(data) {
            Ok(registry) => {
                *self = registry;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to decode sequencer state: {e}");
                *self = Registry::new();
                Err(e)
            }
        };
        self.editor.input_channel = input_channel;
        self.editor.note_duration = note_duration;
        result
    }

    /// Write the model to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes()).inspect_err(|e| {
            log::error!("Failed to save sequencer state to {}: {e}", path.display());
        })?;
        log::info!(
            "Saved {} patterns and {} songs to {}",
            self.patterns.values().filter(|p| !p.is_empty()).count(),
            self.songs.len().saturating_sub(1),
            path.display()
        );
        Ok(())
    }

    /// Replace the model with the contents of `path`
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                log::error!("Failed to read sequencer state from {}: {e}", path.display());
                self.clear();
                return Err(e.into());
            }
        };
        self.load_bytes(&data)?;
        log::info!("Loaded sequencer state from {}", path.display());
        Ok(())
    }
}
