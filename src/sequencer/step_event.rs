// Step event - the atomic unit stored in a pattern
// A MIDI command with start/end values, positioned on the step grid

use crate::midi::event::NOTE_ON;

/// A scheduled MIDI command inside a pattern
///
/// The start values are sent when the step is reached, the end values when
/// the duration has elapsed. A note is therefore a single event whose end
/// velocity is zero, and a controller ramp is an event whose end value
/// differs from its start value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    position: u32,
    duration: f32,
    command: u8,
    value1_start: u8,
    value2_start: u8,
    value1_end: u8,
    value2_end: u8,
    stutter_count: u8,
    stutter_dur: u8,
}

impl StepEvent {
    /// Notes end with velocity zero; other commands hold their start values
    pub(crate) fn new(position: u32, duration: f32, command: u8, value1: u8, value2: u8) -> Self {
        Self {
            position,
            duration,
            command,
            value1_start: value1,
            value2_start: value2,
            value1_end: value1,
            value2_end: if command == NOTE_ON { 0 } else { value2 },
            stutter_count: 0,
            stutter_dur: 0,
        }
    }

    /// Step index within the pattern
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Duration in (fractional) steps
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// MIDI status without channel
    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn value1_start(&self) -> u8 {
        self.value1_start
    }

    pub fn value2_start(&self) -> u8 {
        self.value2_start
    }

    pub fn value1_end(&self) -> u8 {
        self.value1_end
    }

    pub fn value2_end(&self) -> u8 {
        self.value2_end
    }

    pub fn stutter_count(&self) -> u8 {
        self.stutter_count
    }

    pub fn stutter_dur(&self) -> u8 {
        self.stutter_dur
    }

    pub fn is_note(&self) -> bool {
        self.command == NOTE_ON
    }

    /// True when `[position, position + duration)` intersects the other interval.
    /// Zero-length events occupy their start step.
    pub fn overlaps(&self, position: u32, duration: f32) -> bool {
        let (a_start, a_end) = Self::span(self.position, self.duration);
        let (b_start, b_end) = Self::span(position, duration);
        a_start < b_end && b_start < a_end
    }

    fn span(position: u32, duration: f32) -> (f64, f64) {
        let start = position as f64;
        let length = if duration > 0.0 {
            duration as f64
        } else {
            f64::EPSILON
        };
        (start, start + length)
    }

    /// Whether an end message is needed once the duration has elapsed
    pub fn has_end(&self) -> bool {
        self.is_note()
            || self.value1_end != self.value1_start
            || self.value2_end != self.value2_start
    }

    pub(crate) fn set_position(&mut self, position: u32) {
        self.position = position;
    }

    pub(crate) fn set_duration(&mut self, duration: f32) {
        self.duration = duration;
    }

    pub(crate) fn set_value1(&mut self, start: u8, end: u8) {
        self.value1_start = start;
        self.value1_end = end;
    }

    pub(crate) fn set_value2(&mut self, start: u8, end: u8) {
        self.value2_start = start;
        self.value2_end = end;
    }

    pub(crate) fn set_stutter(&mut self, count: u8, dur: u8) {
        self.stutter_count = count;
        self.stutter_dur = dur;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::CONTROL_CHANGE;

    #[test]
    fn test_overlap_intervals() {
        let event = StepEvent::new(0, 4.0, NOTE_ON, 60, 100);

        assert!(event.overlaps(2, 4.0));
        assert!(event.overlaps(0, 1.0));
        assert!(!event.overlaps(4, 1.0));
        assert!(!event.overlaps(8, 0.0));
    }

    #[test]
    fn test_zero_length_occupies_start() {
        let event = StepEvent::new(3, 0.0, CONTROL_CHANGE, 7, 100);

        assert!(event.overlaps(3, 0.0));
        assert!(event.overlaps(2, 2.0));
        assert!(!event.overlaps(4, 1.0));
    }

    #[test]
    fn test_end_message_required() {
        let note = StepEvent::new(0, 1.0, NOTE_ON, 60, 100);
        assert!(note.has_end());
        assert_eq!(note.value2_end(), 0);

        let mut cc = StepEvent::new(0, 1.0, CONTROL_CHANGE, 7, 100);
        assert_eq!(cc.value2_end(), 100);
        assert!(!cc.has_end());
        cc.set_value2(100, 20);
        assert!(cc.has_end());
    }
}
