#![no_std]

// Shared logic for the zero-cross relay controller.
//
// Everything here runs unchanged on the MCU firmware and the host emulator:
// no standard library, no allocation, and all time expressed as monotonic
// tick counts supplied by the caller.

pub mod burst;
pub mod config;
pub mod controller;
pub mod edge;
pub mod estimator;
pub mod repl;
pub mod scheduler;
pub mod stats;
pub mod telemetry;

/// Monotonic tick count used for every timestamp in the core.
pub type Ticks = u64;

/// Logical state of the relay output.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RelayState {
    #[default]
    Off,
    On,
}

impl RelayState {
    /// Converts a boolean "energised" flag into a [`RelayState`].
    #[must_use]
    pub const fn from_on(on: bool) -> Self {
        if on { RelayState::On } else { RelayState::Off }
    }

    /// Returns `true` when the relay is energised.
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, RelayState::On)
    }

    /// Short lowercase label used by logs and the REPL.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            RelayState::Off => "off",
            RelayState::On => "on",
        }
    }
}

impl core::fmt::Display for RelayState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}
