//! Monitoring counters fed by the edge detector, estimator, and scheduler.

use crate::Ticks;
use crate::estimator::PeriodEstimate;

/// Running counters exposed for monitoring.
///
/// Counters saturate instead of wrapping and only go back to zero through
/// [`ZeroCrossStats::reset`]. The cached frequency mirrors the estimator and
/// is not a counter, so a reset leaves it untouched.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ZeroCrossStats {
    trigger_count: u32,
    edge_count: u32,
    rejected_count: u32,
    pulse_count: u32,
    last_pulse_width: Option<Ticks>,
    missed_crossing_count: u32,
    missed_toggle_count: u32,
    toggle_count: u32,
    frequency_hz: f32,
}

impl ZeroCrossStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trigger_count: 0,
            edge_count: 0,
            rejected_count: 0,
            pulse_count: 0,
            last_pulse_width: None,
            missed_crossing_count: 0,
            missed_toggle_count: 0,
            toggle_count: 0,
            frequency_hz: 0.0,
        }
    }

    pub fn record_trigger(&mut self) {
        self.trigger_count = self.trigger_count.saturating_add(1);
    }

    pub fn record_edge(&mut self) {
        self.edge_count = self.edge_count.saturating_add(1);
    }

    pub fn record_rejected(&mut self) {
        self.rejected_count = self.rejected_count.saturating_add(1);
    }

    pub fn record_pulse(&mut self, width: Ticks) {
        self.pulse_count = self.pulse_count.saturating_add(1);
        self.last_pulse_width = Some(width);
    }

    pub fn record_missed_crossing(&mut self) {
        self.missed_crossing_count = self.missed_crossing_count.saturating_add(1);
    }

    pub fn record_missed_toggle(&mut self) {
        self.missed_toggle_count = self.missed_toggle_count.saturating_add(1);
    }

    pub fn record_toggle(&mut self) {
        self.toggle_count = self.toggle_count.saturating_add(1);
    }

    /// Mirrors the estimator output; reports 0 Hz while the estimate is invalid.
    pub fn observe_estimate(&mut self, estimate: &PeriodEstimate) {
        self.frequency_hz = if estimate.valid {
            estimate.frequency_hz
        } else {
            0.0
        };
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self {
            frequency_hz: self.frequency_hz,
            ..Self::new()
        };
    }

    #[must_use]
    pub const fn trigger_count(&self) -> u32 {
        self.trigger_count
    }

    #[must_use]
    pub const fn edge_count(&self) -> u32 {
        self.edge_count
    }

    #[must_use]
    pub const fn rejected_count(&self) -> u32 {
        self.rejected_count
    }

    #[must_use]
    pub const fn pulse_count(&self) -> u32 {
        self.pulse_count
    }

    #[must_use]
    pub const fn last_pulse_width(&self) -> Option<Ticks> {
        self.last_pulse_width
    }

    #[must_use]
    pub const fn missed_crossing_count(&self) -> u32 {
        self.missed_crossing_count
    }

    #[must_use]
    pub const fn missed_toggle_count(&self) -> u32 {
        self.missed_toggle_count
    }

    #[must_use]
    pub const fn toggle_count(&self) -> u32 {
        self.toggle_count
    }

    #[must_use]
    pub const fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    /// Copies the current values into a plain snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            trigger_count: self.trigger_count,
            edge_count: self.edge_count,
            rejected_count: self.rejected_count,
            pulse_count: self.pulse_count,
            last_pulse_width: self.last_pulse_width,
            missed_crossing_count: self.missed_crossing_count,
            missed_toggle_count: self.missed_toggle_count,
            toggle_count: self.toggle_count,
            frequency_hz: self.frequency_hz,
        }
    }
}

/// Point-in-time copy of [`ZeroCrossStats`].
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct StatsSnapshot {
    pub trigger_count: u32,
    pub edge_count: u32,
    pub rejected_count: u32,
    pub pulse_count: u32,
    pub last_pulse_width: Option<Ticks>,
    pub missed_crossing_count: u32,
    pub missed_toggle_count: u32,
    pub toggle_count: u32,
    pub frequency_hz: f32,
}
