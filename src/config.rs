// Engine configuration
// JSON file with defaults for every missing field

use crate::registry::Registry;
use crate::sequencer::Tempo;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name used for the clock thread and the MIDI ports
    pub client_name: String,
    /// Scheduled events in flight from the clock thread to the audio thread
    pub schedule_capacity: usize,
    /// Pulses in flight from the audio thread to the clock thread
    pub pulse_capacity: usize,
    /// Decoded input messages in flight to the clock thread
    pub input_capacity: usize,
    /// Events held by the audio thread waiting for their buffer
    pub pending_capacity: usize,
    /// MIDI channel of pad triggers (16 disables)
    pub trigger_channel: u8,
    /// MIDI channel of pattern editor note entry (16 disables)
    pub editor_input_channel: u8,
    /// Duration in steps of notes entered from the editor channel
    pub editor_note_duration: f32,
    /// How long the clock thread sleeps when nothing wakes it
    pub idle_wait_ms: u64,
    /// Sample rate assumed when the device does not report one
    pub fallback_sample_rate: u32,
    /// Tempo of the internal transport
    pub default_tempo: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client_name: "stepseq".to_string(),
            schedule_capacity: 4096,
            pulse_capacity: 256,
            input_capacity: 256,
            pending_capacity: 4096,
            trigger_channel: Registry::DEFAULT_TRIGGER_CHANNEL,
            editor_input_channel: Registry::NO_CHANNEL,
            editor_note_duration: 1.0,
            idle_wait_ms: 5,
            fallback_sample_rate: 48_000,
            default_tempo: 120.0,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        Ok(config.validate())
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Clamp every field into its usable range
    pub fn validate(mut self) -> Self {
        let defaults = Self::default();
        self.schedule_capacity = self.schedule_capacity.max(1);
        self.pulse_capacity = self.pulse_capacity.max(1);
        self.input_capacity = self.input_capacity.max(1);
        self.pending_capacity = self.pending_capacity.max(1);
        self.trigger_channel = self.trigger_channel.min(Registry::NO_CHANNEL);
        self.editor_input_channel = self.editor_input_channel.min(Registry::NO_CHANNEL);
        if !(self.editor_note_duration.is_finite() && self.editor_note_duration > 0.0) {
            self.editor_note_duration = defaults.editor_note_duration;
        }
        self.idle_wait_ms = self.idle_wait_ms.max(1);
        if self.fallback_sample_rate == 0 {
            self.fallback_sample_rate = defaults.fallback_sample_rate;
        }
        if Tempo::from_bpm(self.default_tempo).is_none() {
            log::warn!(
                "Tempo {} out of range, using {}",
                self.default_tempo,
                defaults.default_tempo
            );
            self.default_tempo = defaults.default_tempo;
        }
        if self.client_name.trim().is_empty() {
            self.client_name = defaults.client_name;
        }
        self
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Push the MIDI routing settings into a registry
    pub fn apply(&self, registry: &mut Registry) {
        registry.set_trigger_channel(self.trigger_channel);
        registry.set_editor_input_channel(self.editor_input_channel);
        registry.set_editor_note_duration(self.editor_note_duration);
    }
}
