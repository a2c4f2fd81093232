//! Phase-synchronised relay switching.
//!
//! [`RelayScheduler`] owns the relay output driver and at most one
//! [`ScheduledToggle`]. A request computes its target from the period
//! estimator and the configured phase offset; a newer request cancels and
//! replaces the pending one. [`RelayScheduler::poll`] drives the output once
//! the target is reached, or drops the toggle as missed when it is polled
//! too late.

use core::fmt;

use crate::config::ZeroCrossConfig;
use crate::estimator::{NotReady, PeriodEstimator};
use crate::{RelayState, Ticks};

/// Hardware abstraction for the relay output pin.
pub trait RelayDriver {
    /// Drives the output to the requested state.
    fn set(&mut self, state: RelayState);
}

/// Driver that ignores every write.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRelayDriver;

impl RelayDriver for NoopRelayDriver {
    fn set(&mut self, _state: RelayState) {}
}

impl<D: RelayDriver + ?Sized> RelayDriver for &mut D {
    fn set(&mut self, state: RelayState) {
        (**self).set(state);
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    Idle,
    Armed,
    /// A toggle fired on the last poll; the next poll returns to idle.
    Fired,
}

impl SchedulerState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Armed => "armed",
            SchedulerState::Fired => "fired",
        }
    }
}

/// Operator or automation request for a relay state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RelayCommand {
    pub desired_state: RelayState,
    pub requested_at: Ticks,
}

impl RelayCommand {
    #[must_use]
    pub const fn new(desired_state: RelayState, requested_at: Ticks) -> Self {
        Self {
            desired_state,
            requested_at,
        }
    }
}

/// Pending relay transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScheduledToggle {
    pub target_timestamp: Ticks,
    pub target_state: RelayState,
    pub requested_at: Ticks,
}

/// Result of an accepted request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestOutcome {
    Armed(ScheduledToggle),
    Replaced {
        previous: ScheduledToggle,
        current: ScheduledToggle,
    },
    /// An identical toggle was already pending.
    Unchanged(ScheduledToggle),
}

impl RequestOutcome {
    #[must_use]
    pub const fn toggle(&self) -> ScheduledToggle {
        match self {
            RequestOutcome::Armed(toggle)
            | RequestOutcome::Unchanged(toggle)
            | RequestOutcome::Replaced { current: toggle, .. } => *toggle,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MissReason {
    /// Polled more than the fire tolerance after the target.
    Late { lateness: Ticks },
    /// The zero-cross signal timed out while armed.
    SignalLost,
    /// The period estimate lost lock while armed.
    LockLost,
}

impl MissReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            MissReason::Late { .. } => "late",
            MissReason::SignalLost => "signal-lost",
            MissReason::LockLost => "lock-lost",
        }
    }
}

/// A toggle that was dropped without driving the output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MissedToggle {
    pub toggle: ScheduledToggle,
    pub reason: MissReason,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    Idle,
    Waiting { target: Ticks },
    Fired {
        toggle: ScheduledToggle,
        lateness: Ticks,
    },
    Missed(MissedToggle),
}

/// Errors returned by [`RelayScheduler::request`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScheduleError {
    /// No valid period estimate; switch immediately with `force` instead.
    NotReady,
}

impl From<NotReady> for ScheduleError {
    fn from(_: NotReady) -> Self {
        ScheduleError::NotReady
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::NotReady => {
                f.write_str("no zero-cross lock; use `now` to switch immediately")
            }
        }
    }
}

pub struct RelayScheduler<D> {
    driver: D,
    state: SchedulerState,
    pending: Option<ScheduledToggle>,
    relay_state: RelayState,
    phase_offset_ticks: i64,
    fire_tolerance: Ticks,
}

impl<D: RelayDriver> RelayScheduler<D> {
    /// Creates a scheduler and drives the output to `initial_state`.
    pub fn new(
        mut driver: D,
        initial_state: RelayState,
        phase_offset_ticks: i64,
        fire_tolerance: Ticks,
    ) -> Self {
        driver.set(initial_state);
        Self {
            driver,
            state: SchedulerState::Idle,
            pending: None,
            relay_state: initial_state,
            phase_offset_ticks,
            fire_tolerance,
        }
    }

    pub fn from_config(driver: D, config: &ZeroCrossConfig) -> Self {
        Self::new(
            driver,
            config.relay_pin.initial_state,
            config.phase_offset_ticks(),
            config.fire_tolerance_ticks(),
        )
    }

    /// Arms a toggle for the next crossing, replacing any pending one.
    pub fn request(
        &mut self,
        command: RelayCommand,
        estimator: &PeriodEstimator,
    ) -> Result<RequestOutcome, ScheduleError> {
        let target_timestamp = self.target_for(command.requested_at, estimator)?;
        let toggle = ScheduledToggle {
            target_timestamp,
            target_state: command.desired_state,
            requested_at: command.requested_at,
        };

        let outcome = match self.pending {
            Some(previous)
                if previous.target_state == toggle.target_state
                    && previous.target_timestamp == toggle.target_timestamp =>
            {
                return Ok(RequestOutcome::Unchanged(previous));
            }
            Some(previous) => RequestOutcome::Replaced {
                previous,
                current: toggle,
            },
            None => RequestOutcome::Armed(toggle),
        };

        self.pending = Some(toggle);
        self.state = SchedulerState::Armed;
        Ok(outcome)
    }

    /// Fire time for a request issued at `now`.
    pub fn target_for(&self, now: Ticks, estimator: &PeriodEstimator) -> Result<Ticks, NotReady> {
        let crossing = estimator.predict_next_crossing(now)?;
        if self.phase_offset_ticks >= 0 {
            return Ok(crossing.saturating_add(self.phase_offset_ticks.unsigned_abs()));
        }

        let half = estimator.half_cycle_ticks().ok_or(NotReady)?;
        let mut target = crossing.saturating_sub(self.phase_offset_ticks.unsigned_abs());
        if target < now {
            target = target.saturating_add(half);
        }
        Ok(target)
    }

    /// Drives the output when the pending toggle is due.
    pub fn poll(&mut self, now: Ticks) -> PollOutcome {
        if self.state == SchedulerState::Fired {
            self.state = SchedulerState::Idle;
        }

        let Some(toggle) = self.pending else {
            return PollOutcome::Idle;
        };
        if now < toggle.target_timestamp {
            return PollOutcome::Waiting {
                target: toggle.target_timestamp,
            };
        }

        self.pending = None;
        let lateness = now - toggle.target_timestamp;
        if lateness > self.fire_tolerance {
            self.state = SchedulerState::Idle;
            return PollOutcome::Missed(MissedToggle {
                toggle,
                reason: MissReason::Late { lateness },
            });
        }

        self.driver.set(toggle.target_state);
        self.relay_state = toggle.target_state;
        self.state = SchedulerState::Fired;
        PollOutcome::Fired { toggle, lateness }
    }

    /// Drops the pending toggle, if any.
    pub fn cancel(&mut self, reason: MissReason) -> Option<MissedToggle> {
        let toggle = self.pending.take()?;
        self.state = SchedulerState::Idle;
        Some(MissedToggle { toggle, reason })
    }

    /// Switches immediately, bypassing phase synchronisation.
    ///
    /// Returns the pending toggle that was superseded.
    pub fn force(&mut self, state: RelayState) -> Option<ScheduledToggle> {
        let superseded = self.pending.take();
        self.driver.set(state);
        self.relay_state = state;
        self.state = SchedulerState::Idle;
        superseded
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub const fn pending(&self) -> Option<ScheduledToggle> {
        self.pending
    }

    /// State last driven onto the output.
    #[must_use]
    pub const fn relay_state(&self) -> RelayState {
        self.relay_state
    }

    /// State the output will hold once the pending toggle (if any) fires.
    #[must_use]
    pub fn committed_state(&self) -> RelayState {
        self.pending
            .map_or(self.relay_state, |toggle| toggle.target_state)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
