//! Construction-time configuration for the zero-cross relay controller.
//!
//! The host configuration layer resolves pin bindings and numeric knobs into a
//! [`ZeroCrossConfig`] and calls [`ZeroCrossConfig::validate`] before handing
//! it to the controller. Durations stay in `core::time::Duration` until the
//! controller converts them into ticks using `ticks_per_second`.

use core::fmt;
use core::time::Duration;

use crate::{RelayState, Ticks};

/// Default tick rate (1 MHz free-running timer).
pub const DEFAULT_TICKS_PER_SECOND: u64 = 1_000_000;

/// Default debounce window applied to the zero-cross sense input.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1);

/// Default weight given to each new half-cycle sample in the moving average.
pub const DEFAULT_EWMA_WEIGHT: f32 = 0.2;

/// Default acceptance band, as a fraction of the running half-cycle estimate.
pub const DEFAULT_BAND_TOLERANCE: f32 = 0.10;

/// Consecutive in-band edges required before the estimate is trusted.
pub const DEFAULT_LOCK_EDGES: u8 = 3;

/// Loss-of-signal timeout expressed in half cycles.
pub const DEFAULT_TIMEOUT_MULTIPLE: u8 = 3;

/// Nominal mains frequency used before an estimate exists.
pub const DEFAULT_NOMINAL_FREQUENCY_HZ: u16 = 50;

/// Lowest mains frequency accepted when seeding the estimate.
pub const DEFAULT_MIN_FREQUENCY_HZ: u16 = 40;

/// Highest mains frequency accepted when seeding the estimate.
pub const DEFAULT_MAX_FREQUENCY_HZ: u16 = 70;

/// Maximum lateness tolerated when a scheduled toggle fires.
pub const DEFAULT_FIRE_TOLERANCE: Duration = Duration::from_micros(500);

/// Internal pull resistor applied to the sense input.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Pull {
    None,
    Up,
    Down,
}

impl Pull {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Pull::None => "none",
            Pull::Up => "up",
            Pull::Down => "down",
        }
    }
}

/// Electrical level that represents an active zero-cross pulse.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActiveLevel {
    High,
    Low,
}

impl ActiveLevel {
    /// Returns `true` when the sampled electrical level is the active one.
    #[must_use]
    pub const fn is_active(self, level_high: bool) -> bool {
        match self {
            ActiveLevel::High => level_high,
            ActiveLevel::Low => !level_high,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ActiveLevel::High => "high",
            ActiveLevel::Low => "low",
        }
    }
}

/// Binding for the zero-cross sense input.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InputPinBinding {
    pub gpio: u8,
    pub pull: Pull,
    pub active_level: ActiveLevel,
}

impl InputPinBinding {
    #[must_use]
    pub const fn new(gpio: u8, pull: Pull, active_level: ActiveLevel) -> Self {
        Self {
            gpio,
            pull,
            active_level,
        }
    }
}

/// Binding for the relay drive output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OutputPinBinding {
    pub gpio: u8,
    pub initial_state: RelayState,
}

impl OutputPinBinding {
    #[must_use]
    pub const fn new(gpio: u8, initial_state: RelayState) -> Self {
        Self {
            gpio,
            initial_state,
        }
    }
}

/// Where, relative to the predicted crossing, a toggle should fire.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum PhaseOffset {
    /// Fire exactly at the predicted crossing.
    #[default]
    AtCrossing,
    /// Fire after the crossing.
    Delay(Duration),
    /// Fire before the crossing (compensates for relay operate time).
    Advance(Duration),
}

/// What the controller does with the relay when mains sync is lost.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum SignalLossPolicy {
    /// Leave the relay in its last commanded state.
    #[default]
    HoldLastState,
    /// Switch the relay off as soon as loss of signal is detected.
    ForceOff,
}

/// Full controller configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ZeroCrossConfig {
    pub zero_cross_pin: InputPinBinding,
    pub relay_pin: OutputPinBinding,
    pub ticks_per_second: u64,
    pub debounce: Duration,
    pub ewma_weight: f32,
    pub band_tolerance: f32,
    pub lock_edges: u8,
    pub timeout_multiple: u8,
    pub nominal_frequency_hz: u16,
    pub min_frequency_hz: u16,
    pub max_frequency_hz: u16,
    pub phase_offset: PhaseOffset,
    pub fire_tolerance: Duration,
    pub signal_loss_policy: SignalLossPolicy,
}

impl ZeroCrossConfig {
    /// Default configuration: sense on GPIO3 with pull-up, relay on GPIO4 (off).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            zero_cross_pin: InputPinBinding::new(3, Pull::Up, ActiveLevel::High),
            relay_pin: OutputPinBinding::new(4, RelayState::Off),
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            debounce: DEFAULT_DEBOUNCE,
            ewma_weight: DEFAULT_EWMA_WEIGHT,
            band_tolerance: DEFAULT_BAND_TOLERANCE,
            lock_edges: DEFAULT_LOCK_EDGES,
            timeout_multiple: DEFAULT_TIMEOUT_MULTIPLE,
            nominal_frequency_hz: DEFAULT_NOMINAL_FREQUENCY_HZ,
            min_frequency_hz: DEFAULT_MIN_FREQUENCY_HZ,
            max_frequency_hz: DEFAULT_MAX_FREQUENCY_HZ,
            phase_offset: PhaseOffset::AtCrossing,
            fire_tolerance: DEFAULT_FIRE_TOLERANCE,
            signal_loss_policy: SignalLossPolicy::HoldLastState,
        }
    }

    #[must_use]
    pub const fn with_ticks_per_second(mut self, ticks_per_second: u64) -> Self {
        self.ticks_per_second = ticks_per_second;
        self
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub const fn with_phase_offset(mut self, offset: PhaseOffset) -> Self {
        self.phase_offset = offset;
        self
    }

    #[must_use]
    pub const fn with_fire_tolerance(mut self, tolerance: Duration) -> Self {
        self.fire_tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn with_signal_loss_policy(mut self, policy: SignalLossPolicy) -> Self {
        self.signal_loss_policy = policy;
        self
    }

    /// Converts a duration into ticks at the configured rate, saturating.
    #[must_use]
    pub fn ticks_for(&self, duration: Duration) -> Ticks {
        let ticks = duration.as_nanos() * u128::from(self.ticks_per_second) / 1_000_000_000;
        Ticks::try_from(ticks).unwrap_or(Ticks::MAX)
    }

    /// Converts ticks back into a duration at the configured rate.
    #[must_use]
    pub fn duration_for(&self, ticks: Ticks) -> Duration {
        if self.ticks_per_second == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(self.ticks_per_second);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    #[must_use]
    pub fn debounce_ticks(&self) -> Ticks {
        self.ticks_for(self.debounce)
    }

    #[must_use]
    pub fn fire_tolerance_ticks(&self) -> Ticks {
        self.ticks_for(self.fire_tolerance)
    }

    /// Half-cycle length at a given mains frequency.
    #[must_use]
    pub fn half_cycle_ticks_at(&self, frequency_hz: u16) -> Ticks {
        if frequency_hz == 0 {
            return Ticks::MAX;
        }
        self.ticks_per_second / (2 * u64::from(frequency_hz))
    }

    #[must_use]
    pub fn nominal_half_cycle_ticks(&self) -> Ticks {
        self.half_cycle_ticks_at(self.nominal_frequency_hz)
    }

    /// Shortest plausible half cycle (at `max_frequency_hz`).
    #[must_use]
    pub fn min_half_cycle_ticks(&self) -> Ticks {
        self.half_cycle_ticks_at(self.max_frequency_hz)
    }

    /// Longest plausible half cycle (at `min_frequency_hz`).
    #[must_use]
    pub fn max_half_cycle_ticks(&self) -> Ticks {
        self.half_cycle_ticks_at(self.min_frequency_hz)
    }

    /// Signed phase offset in ticks (negative values advance the toggle).
    #[must_use]
    pub fn phase_offset_ticks(&self) -> i64 {
        match self.phase_offset {
            PhaseOffset::AtCrossing => 0,
            PhaseOffset::Delay(delay) => i64::try_from(self.ticks_for(delay)).unwrap_or(i64::MAX),
            PhaseOffset::Advance(advance) => {
                -i64::try_from(self.ticks_for(advance)).unwrap_or(i64::MAX)
            }
        }
    }

    /// Range and consistency checks performed at configuration-load time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_second == 0 {
            return Err(ConfigError::ZeroTickRate);
        }

        if self.zero_cross_pin.gpio == self.relay_pin.gpio {
            return Err(ConfigError::PinConflict {
                gpio: self.relay_pin.gpio,
            });
        }

        if self.min_frequency_hz == 0 || self.min_frequency_hz >= self.max_frequency_hz {
            return Err(ConfigError::InvalidFrequencyRange {
                min_hz: self.min_frequency_hz,
                max_hz: self.max_frequency_hz,
            });
        }

        if self.nominal_frequency_hz < self.min_frequency_hz
            || self.nominal_frequency_hz > self.max_frequency_hz
        {
            return Err(ConfigError::NominalOutsideRange {
                nominal_hz: self.nominal_frequency_hz,
            });
        }

        let min_half_cycle = self.min_half_cycle_ticks();
        if min_half_cycle == 0 {
            return Err(ConfigError::TickRateTooLow);
        }

        if self.debounce_ticks() >= min_half_cycle {
            return Err(ConfigError::DebounceTooLong);
        }

        if !(self.ewma_weight > 0.0 && self.ewma_weight <= 1.0) {
            return Err(ConfigError::InvalidEwmaWeight);
        }

        if !(self.band_tolerance > 0.0 && self.band_tolerance < 1.0) {
            return Err(ConfigError::InvalidBandTolerance);
        }

        if self.lock_edges < 2 {
            return Err(ConfigError::LockEdgesTooFew {
                lock_edges: self.lock_edges,
            });
        }

        if self.timeout_multiple < 2 {
            return Err(ConfigError::TimeoutMultipleTooSmall {
                multiple: self.timeout_multiple,
            });
        }

        let offset = self.phase_offset_ticks().unsigned_abs();
        if offset >= min_half_cycle {
            return Err(ConfigError::PhaseOffsetTooLarge);
        }

        if self.fire_tolerance_ticks() >= min_half_cycle {
            return Err(ConfigError::FireToleranceTooLarge);
        }

        Ok(())
    }
}

impl Default for ZeroCrossConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration rejected by [`ZeroCrossConfig::validate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    ZeroTickRate,
    TickRateTooLow,
    PinConflict { gpio: u8 },
    InvalidFrequencyRange { min_hz: u16, max_hz: u16 },
    NominalOutsideRange { nominal_hz: u16 },
    DebounceTooLong,
    InvalidEwmaWeight,
    InvalidBandTolerance,
    LockEdgesTooFew { lock_edges: u8 },
    TimeoutMultipleTooSmall { multiple: u8 },
    PhaseOffsetTooLarge,
    FireToleranceTooLarge,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTickRate => f.write_str("tick rate must be non-zero"),
            ConfigError::TickRateTooLow => {
                f.write_str("tick rate too low to resolve a mains half cycle")
            }
            ConfigError::PinConflict { gpio } => {
                write!(f, "GPIO{gpio} bound to both zero-cross input and relay output")
            }
            ConfigError::InvalidFrequencyRange { min_hz, max_hz } => {
                write!(f, "invalid mains frequency range {min_hz}-{max_hz} Hz")
            }
            ConfigError::NominalOutsideRange { nominal_hz } => {
                write!(f, "nominal frequency {nominal_hz} Hz outside accepted range")
            }
            ConfigError::DebounceTooLong => {
                f.write_str("debounce interval must be shorter than a half cycle")
            }
            ConfigError::InvalidEwmaWeight => f.write_str("EWMA weight must be in (0, 1]"),
            ConfigError::InvalidBandTolerance => {
                f.write_str("acceptance band tolerance must be in (0, 1)")
            }
            ConfigError::LockEdgesTooFew { lock_edges } => {
                write!(f, "lock requires at least 2 edges (got {lock_edges})")
            }
            ConfigError::TimeoutMultipleTooSmall { multiple } => {
                write!(f, "loss-of-signal timeout must span at least 2 half cycles (got {multiple})")
            }
            ConfigError::PhaseOffsetTooLarge => {
                f.write_str("phase offset must be shorter than a half cycle")
            }
            ConfigError::FireToleranceTooLarge => {
                f.write_str("fire tolerance must be shorter than a half cycle")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ZeroCrossConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.zero_cross_pin.gpio, 3);
        assert_eq!(config.zero_cross_pin.pull, Pull::Up);
        assert_eq!(config.relay_pin.gpio, 4);
        assert_eq!(config.relay_pin.initial_state, RelayState::Off);
    }

    #[test]
    fn converts_durations_to_ticks() {
        let config = ZeroCrossConfig::default();
        assert_eq!(config.debounce_ticks(), 1_000);
        assert_eq!(config.nominal_half_cycle_ticks(), 10_000);
        assert_eq!(config.min_half_cycle_ticks(), 7_142);
        assert_eq!(config.max_half_cycle_ticks(), 12_500);

        let slow = config.with_ticks_per_second(10_000);
        assert_eq!(slow.debounce_ticks(), 10);
        assert_eq!(slow.nominal_half_cycle_ticks(), 100);
        assert_eq!(slow.duration_for(100), Duration::from_millis(10));
    }

    #[test]
    fn phase_offset_sign_follows_direction() {
        let base = ZeroCrossConfig::default();
        assert_eq!(base.phase_offset_ticks(), 0);

        let delayed = base.with_phase_offset(PhaseOffset::Delay(Duration::from_micros(250)));
        assert_eq!(delayed.phase_offset_ticks(), 250);

        let advanced = base.with_phase_offset(PhaseOffset::Advance(Duration::from_micros(800)));
        assert_eq!(advanced.phase_offset_ticks(), -800);
    }

    #[test]
    fn rejects_pin_conflict() {
        let mut config = ZeroCrossConfig::default();
        config.relay_pin.gpio = 3;
        assert_eq!(config.validate(), Err(ConfigError::PinConflict { gpio: 3 }));
    }

    #[test]
    fn rejects_debounce_longer_than_half_cycle() {
        let config = ZeroCrossConfig::default().with_debounce(Duration::from_millis(8));
        assert_eq!(config.validate(), Err(ConfigError::DebounceTooLong));
    }

    #[test]
    fn rejects_out_of_range_weights() {
        let mut config = ZeroCrossConfig::default();
        config.ewma_weight = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidEwmaWeight));

        config.ewma_weight = f32::NAN;
        assert_eq!(config.validate(), Err(ConfigError::InvalidEwmaWeight));

        config.ewma_weight = 0.5;
        config.band_tolerance = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBandTolerance));
    }

    #[test]
    fn rejects_oversized_phase_offset() {
        let config = ZeroCrossConfig::default()
            .with_phase_offset(PhaseOffset::Advance(Duration::from_millis(9)));
        assert_eq!(config.validate(), Err(ConfigError::PhaseOffsetTooLarge));
    }

    #[test]
    fn rejects_nominal_outside_range() {
        let mut config = ZeroCrossConfig::default();
        config.nominal_frequency_hz = 80;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NominalOutsideRange { nominal_hz: 80 })
        );
    }
}
