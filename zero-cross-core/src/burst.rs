//! Burst-fire (integral half-cycle) duty control.
//!
//! Power is regulated over a fixed window of [`BURST_WINDOW`] half cycles:
//! the relay conducts for the first `flip_point` half cycles of the window
//! and is off for the remainder. Every accepted zero-cross edge advances the
//! window by one half cycle.

use core::fmt;

use crate::RelayState;

/// Half cycles per burst window.
pub const BURST_WINDOW: u8 = 20;

/// Default flip point (50 % duty).
pub const DEFAULT_FLIP_POINT: u8 = 10;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BurstError {
    FlipPointOutOfRange { flip_point: u8 },
}

impl fmt::Display for BurstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstError::FlipPointOutOfRange { flip_point } => {
                write!(f, "duty {flip_point} out of range (0-{BURST_WINDOW})")
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BurstFire {
    flip_point: u8,
    position: u8,
}

impl BurstFire {
    /// Creates a burst controller positioned at the start of a window.
    pub const fn new(flip_point: u8) -> Result<Self, BurstError> {
        if flip_point > BURST_WINDOW {
            return Err(BurstError::FlipPointOutOfRange { flip_point });
        }
        Ok(Self {
            flip_point,
            position: 0,
        })
    }

    #[must_use]
    pub const fn flip_point(&self) -> u8 {
        self.flip_point
    }

    /// Position within the window of the half cycle currently conducting.
    #[must_use]
    pub const fn position(&self) -> u8 {
        self.position
    }

    /// Duty cycle in percent.
    #[must_use]
    pub const fn duty_percent(&self) -> u8 {
        self.flip_point * (100 / BURST_WINDOW)
    }

    /// Relay state for a half cycle at `position` within the window.
    #[must_use]
    pub const fn state_at(&self, position: u8) -> RelayState {
        RelayState::from_on(position < self.flip_point)
    }

    /// State for the half cycle currently conducting.
    #[must_use]
    pub const fn current_state(&self) -> RelayState {
        self.state_at(self.position)
    }

    /// Advances to the next half cycle and returns its desired state.
    pub fn advance(&mut self) -> RelayState {
        self.position = (self.position + 1) % BURST_WINDOW;
        self.current_state()
    }
}
