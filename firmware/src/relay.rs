//! Relay output driver for the SSR control pin.

use zero_cross_core::RelayState;
use zero_cross_core::config::ActiveLevel;
use zero_cross_core::scheduler::RelayDriver;

use crate::status;

/// Output level that energises the relay for the given polarity.
#[must_use]
pub const fn level_for(state: RelayState, polarity: ActiveLevel) -> bool {
    match polarity {
        ActiveLevel::High => state.is_on(),
        ActiveLevel::Low => !state.is_on(),
    }
}

/// Push-pull output driving the SSR input.
#[cfg(target_os = "none")]
pub struct RelayPin<'d> {
    output: embassy_stm32::gpio::Output<'d>,
    polarity: ActiveLevel,
}

#[cfg(target_os = "none")]
impl<'d> RelayPin<'d> {
    pub fn new(output: embassy_stm32::gpio::Output<'d>, polarity: ActiveLevel) -> Self {
        Self { output, polarity }
    }
}

#[cfg(target_os = "none")]
impl RelayDriver for RelayPin<'_> {
    fn set(&mut self, state: RelayState) {
        if level_for(state, self.polarity) {
            self.output.set_high();
        } else {
            self.output.set_low();
        }
        status::record_relay_state(state);
    }
}

/// Host stand-in that only mirrors the state into the status atomics.
#[cfg(not(target_os = "none"))]
pub struct RelayPin {
    level_high: bool,
    polarity: ActiveLevel,
}

#[cfg(not(target_os = "none"))]
impl RelayPin {
    pub fn new(polarity: ActiveLevel) -> Self {
        Self {
            level_high: false,
            polarity,
        }
    }

    pub fn is_set_high(&self) -> bool {
        self.level_high
    }
}

#[cfg(not(target_os = "none"))]
impl RelayDriver for RelayPin {
    fn set(&mut self, state: RelayState) {
        self.level_high = level_for(state, self.polarity);
        status::record_relay_state(state);
    }
}
