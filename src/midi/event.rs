// MIDI message types
// Decoded input events and the fixed-size messages written to the output port

/// Channel voice status bytes (channel nibble cleared)
pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_AFTERTOUCH: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

/// System messages
pub const SONG_POSITION: u8 = 0xF2;
pub const SONG_SELECT: u8 = 0xF3;
pub const TIMING_CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;

/// Decoded MIDI input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    PitchBend { channel: u8, value: i16 },
    Clock,
    Start,
    Continue,
    Stop,
    /// Song position pointer, in MIDI beats (sixteenth notes)
    SongPosition(u16),
    SongSelect(u8),
}

impl MidiEvent {
    /// Parse a raw MIDI message
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;

        if status >= 0xF0 {
            return Self::system_from_bytes(status, bytes);
        }

        let channel = status & 0x0F;
        let data = |index: usize| bytes.get(index).map(|b| b & 0x7F);

        match status & 0xF0 {
            NOTE_ON => {
                let note = data(1)?;
                let velocity = data(2)?;
                // Velocity 0 = Note Off
                if velocity == 0 {
                    Some(MidiEvent::NoteOff { channel, note })
                } else {
                    Some(MidiEvent::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            NOTE_OFF => {
                data(2)?;
                Some(MidiEvent::NoteOff {
                    channel,
                    note: data(1)?,
                })
            }
            CONTROL_CHANGE => Some(MidiEvent::ControlChange {
                channel,
                controller: data(1)?,
                value: data(2)?,
            }),
            PROGRAM_CHANGE => Some(MidiEvent::ProgramChange {
                channel,
                program: data(1)?,
            }),
            PITCH_BEND => {
                let lsb = data(1)? as i16;
                let msb = data(2)? as i16;
                Some(MidiEvent::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    fn system_from_bytes(status: u8, bytes: &[u8]) -> Option<Self> {
        match status {
            TIMING_CLOCK => Some(MidiEvent::Clock),
            START => Some(MidiEvent::Start),
            CONTINUE => Some(MidiEvent::Continue),
            STOP => Some(MidiEvent::Stop),
            SONG_POSITION => {
                let lsb = (*bytes.get(1)? & 0x7F) as u16;
                let msb = (*bytes.get(2)? & 0x7F) as u16;
                Some(MidiEvent::SongPosition((msb << 7) | lsb))
            }
            SONG_SELECT => Some(MidiEvent::SongSelect(*bytes.get(1)? & 0x7F)),
            _ => None,
        }
    }
}

/// Three byte MIDI message as written to the output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MidiMessage {
    bytes: [u8; 3],
}

impl MidiMessage {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            bytes: [status, data1 & 0x7F, data2 & 0x7F],
        }
    }

    /// Build a channel message from a channel-less command and a channel
    pub fn channel(command: u8, channel: u8, data1: u8, data2: u8) -> Self {
        Self::new((command & 0xF0) | (channel & 0x0F), data1, data2)
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel(NOTE_ON, channel, note, velocity)
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// Status with the channel nibble cleared
    pub fn command(&self) -> u8 {
        if self.bytes[0] >= 0xF0 {
            self.bytes[0]
        } else {
            self.bytes[0] & 0xF0
        }
    }

    pub fn midi_channel(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    pub fn data1(&self) -> u8 {
        self.bytes[1]
    }

    pub fn data2(&self) -> u8 {
        self.bytes[2]
    }

    /// Number of meaningful bytes for this status
    pub fn len(&self) -> usize {
        match self.command() {
            PROGRAM_CHANGE | CHANNEL_PRESSURE | SONG_SELECT => 2,
            TIMING_CLOCK | START | CONTINUE | STOP => 1,
            _ => 3,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }
}
