// Transport - Host transport snapshots and the 24 PPQN pulse clock derived from them
// Pulses are timestamped one buffer ahead so the clock thread has a full buffer to respond

use crate::sequencer::{PPQN, Song, Tempo};

const PULSE_EPSILON: f64 = 1e-6;

/// Host transport state at the start of an audio buffer
///
/// Bars and beats count from 1; `tick` is the (possibly fractional) tick
/// within the current beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportPosition {
    pub rolling: bool,
    pub bar: u32,
    pub beat: u32,
    pub tick: f64,
    pub ticks_per_beat: f64,
    pub beats_per_bar: u32,
    pub beats_per_minute: f64,
    pub frame_rate: u32,
}

impl Default for TransportPosition {
    fn default() -> Self {
        Self {
            rolling: false,
            bar: 1,
            beat: 1,
            tick: 0.0,
            ticks_per_beat: FreeRunningTransport::TICKS_PER_BEAT,
            beats_per_bar: 4,
            beats_per_minute: 120.0,
            frame_rate: 48_000,
        }
    }
}

/// One clock tick for the sequencer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    /// Absolute sample time the tick belongs to
    pub time: u64,
    /// First tick of a bar
    pub sync: bool,
    pub samples_per_clock: f64,
}

/// Derives sequencer clock pulses from transport snapshots
#[derive(Debug, Clone, Default)]
pub struct PulseClock {
    ticks_per_beat: f64,
    beats_per_minute: f64,
    frame_rate: u32,
    ticks_per_pulse: f64,
    samples_per_clock: f64,
    last_pulse: Option<u64>,
}

impl PulseClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks_per_pulse(&self) -> f64 {
        self.ticks_per_pulse
    }

    pub fn samples_per_clock(&self) -> f64 {
        self.samples_per_clock
    }

    fn update_rates(&mut self, transport: &TransportPosition) {
        if transport.ticks_per_beat == self.ticks_per_beat
            && transport.beats_per_minute == self.beats_per_minute
            && transport.frame_rate == self.frame_rate
        {
            return;
        }
        self.ticks_per_beat = transport.ticks_per_beat;
        self.beats_per_minute = transport.beats_per_minute;
        self.frame_rate = transport.frame_rate;
        self.ticks_per_pulse = transport.ticks_per_beat / PPQN as f64;
        self.samples_per_clock = if transport.beats_per_minute > 0.0 {
            transport.frame_rate as f64 * 60.0 / (transport.beats_per_minute * PPQN as f64)
        } else {
            0.0
        };
    }

    /// Call `on_pulse` for every pulse falling inside this buffer
    ///
    /// Runs on the audio thread: no allocation. A pulse sitting exactly on
    /// the boundary between two buffers is reported once.
    pub fn for_each_pulse(
        &mut self,
        transport: &TransportPosition,
        buffer_start: u64,
        frames: u32,
        mut on_pulse: impl FnMut(Pulse),
    ) -> usize {
        if !transport.rolling || transport.beats_per_bar == 0 {
            self.last_pulse = None;
            return 0;
        }
        self.update_rates(transport);
        if self.samples_per_clock <= 0.0 || self.ticks_per_pulse <= 0.0 {
            return 0;
        }

        let pulses_per_bar = transport.beats_per_bar as u64 * PPQN as u64;
        let bar_start = transport.bar.saturating_sub(1) as u64 * pulses_per_bar;
        let position = transport.beat.saturating_sub(1) as f64 * PPQN as f64
            + transport.tick / self.ticks_per_pulse;

        // A pulse within rounding error of the buffer start belongs to this buffer
        let mut pulse = (position - PULSE_EPSILON).ceil().max(0.0);
        let mut count = 0;
        loop {
            let offset = ((pulse - position) * self.samples_per_clock).max(0.0);
            if offset >= frames as f64 {
                break;
            }
            let in_bar = pulse as u64;
            let absolute = bar_start + in_bar;
            if self.last_pulse != Some(absolute) {
                self.last_pulse = Some(absolute);
                on_pulse(Pulse {
                    time: buffer_start + frames as u64 + offset as u64,
                    sync: in_bar % pulses_per_bar == 0,
                    samples_per_clock: self.samples_per_clock,
                });
                count += 1;
            }
            pulse += 1.0;
        }
        count
    }
}

/// Internal transport for when no host transport drives the engine
#[derive(Debug, Clone)]
pub struct FreeRunningTransport {
    frame_rate: u32,
    beats_per_minute: f64,
    beats_per_bar: u32,
    frame: u64,
    rolling: bool,
}

impl FreeRunningTransport {
    pub const TICKS_PER_BEAT: f64 = 1920.0;

    pub fn new(frame_rate: u32, beats_per_minute: f64, beats_per_bar: u32) -> Self {
        Self {
            frame_rate: frame_rate.max(1),
            beats_per_minute,
            beats_per_bar: beats_per_bar.max(1),
            frame: 0,
            rolling: true,
        }
    }

    /// Start at the tempo and meter in force at the top of `song`
    ///
    /// A song tempo outside the valid range falls back to `default_bpm`.
    pub fn for_song(frame_rate: u32, song: &Song, default_bpm: f64) -> Self {
        let bpm = song.tempo_at(1, 0) as f64;
        let bpm = Tempo::from_bpm(bpm).map_or(default_bpm, |tempo| tempo.bpm());
        Self::new(frame_rate, bpm, song.beats_per_bar_at(1, 0) as u32)
    }

    /// Frames elapsed since the start
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_rolling(&self) -> bool {
        self.rolling
    }

    pub fn set_rolling(&mut self, rolling: bool) {
        self.rolling = rolling;
    }

    pub fn set_tempo(&mut self, beats_per_minute: f64) {
        self.beats_per_minute = beats_per_minute;
    }

    pub fn locate(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Move forward by one buffer (no-op while stopped)
    pub fn advance(&mut self, frames: u32) {
        if self.rolling {
            self.frame += frames as u64;
        }
    }

    pub fn position(&self) -> TransportPosition {
        let beats = self.frame as f64 * self.beats_per_minute / (60.0 * self.frame_rate as f64);
        let whole_beats = beats.floor();
        let bar = (whole_beats as u64 / self.beats_per_bar as u64) as u32 + 1;
        let beat = (whole_beats as u64 % self.beats_per_bar as u64) as u32 + 1;

        TransportPosition {
            rolling: self.rolling,
            bar,
            beat,
            tick: (beats - whole_beats) * Self::TICKS_PER_BEAT,
            ticks_per_beat: Self::TICKS_PER_BEAT,
            beats_per_bar: self.beats_per_bar,
            beats_per_minute: self.beats_per_minute,
            frame_rate: self.frame_rate,
        }
    }
}
