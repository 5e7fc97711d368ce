// Play mode and play state of a sequence
// The transition function is pure so its policies can be tested without a clock

/// How a sequence behaves at its end and when asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlayMode {
    /// Never plays
    Disabled = 0,
    /// Plays once, stops immediately on request
    OneShot = 1,
    /// Loops, stops immediately on request
    #[default]
    Loop = 2,
    /// Plays once, a stop request lets it reach its end
    OneShotAll = 3,
    /// Loops, a stop request lets it reach its end
    LoopAll = 4,
    /// Plays once, a stop request takes effect at the next sync pulse
    OneShotSync = 5,
    /// Loops, a stop request takes effect at the next sync pulse
    LoopSync = 6,
}

impl PlayMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PlayMode::Disabled),
            1 => Some(PlayMode::OneShot),
            2 => Some(PlayMode::Loop),
            3 => Some(PlayMode::OneShotAll),
            4 => Some(PlayMode::LoopAll),
            5 => Some(PlayMode::OneShotSync),
            6 => Some(PlayMode::LoopSync),
            _ => None,
        }
    }

    /// Wraps to the start instead of stopping at the end
    pub fn is_looping(self) -> bool {
        matches!(self, PlayMode::Loop | PlayMode::LoopAll | PlayMode::LoopSync)
    }

    /// Stop requests are truncated at the next sync pulse
    pub fn stops_at_sync(self) -> bool {
        matches!(self, PlayMode::OneShotSync | PlayMode::LoopSync)
    }

    /// Stop requests resolve to STOPPED straight away
    pub fn stops_immediately(self) -> bool {
        matches!(self, PlayMode::Disabled | PlayMode::OneShot | PlayMode::Loop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlayState {
    #[default]
    Stopped = 0,
    /// Waiting for the next sync pulse to start
    Starting = 1,
    Playing = 2,
    /// Still sounding, will stop at sync or at the end depending on the mode
    Stopping = 3,
    /// Playing, will rewind at the next sync pulse
    Restarting = 4,
}

impl PlayState {
    /// Velocity of the tally note reporting this state to a controller
    pub fn tally_velocity(self) -> u8 {
        match self {
            PlayState::Stopped => 3,
            PlayState::Playing => 1,
            PlayState::Stopping => 4,
            PlayState::Starting | PlayState::Restarting => 5,
        }
    }

    /// Sounding or about to sound
    pub fn is_active(self) -> bool {
        !matches!(self, PlayState::Stopped)
    }

    /// Target of a toggle request
    pub fn toggled(self) -> PlayState {
        match self {
            PlayState::Stopped | PlayState::Stopping => PlayState::Starting,
            _ => PlayState::Stopping,
        }
    }
}

/// Resolve a requested play state into the state actually entered
///
/// A sequence with nothing to play always ends up STOPPED. Stop requests in
/// DISABLED, ONESHOT and LOOP modes resolve to STOPPED at once; the other
/// modes stop gracefully. A start request on a sequence that is still
/// sounding cancels its pending stop.
pub fn transition(
    current: PlayState,
    requested: PlayState,
    mode: PlayMode,
    length: u32,
) -> PlayState {
    if length == 0 {
        return PlayState::Stopped;
    }

    match requested {
        PlayState::Stopped => PlayState::Stopped,
        PlayState::Stopping => match current {
            PlayState::Stopped | PlayState::Starting => PlayState::Stopped,
            _ if mode.stops_immediately() => PlayState::Stopped,
            _ => PlayState::Stopping,
        },
        _ if mode == PlayMode::Disabled => PlayState::Stopped,
        PlayState::Starting => match current {
            PlayState::Playing | PlayState::Stopping => PlayState::Playing,
            PlayState::Restarting => PlayState::Restarting,
            _ => PlayState::Starting,
        },
        PlayState::Restarting => match current {
            PlayState::Stopped | PlayState::Starting => PlayState::Starting,
            _ => PlayState::Restarting,
        },
        PlayState::Playing => PlayState::Playing,
    }
}
