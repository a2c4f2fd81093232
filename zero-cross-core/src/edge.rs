//! Debounced zero-cross edge detection.
//!
//! The detector is fed every raw level change seen on the sense input
//! (normally from the EXTI interrupt) together with its capture timestamp.
//! A transition into the active level becomes an [`EdgeEvent`] only when it
//! arrives at least `debounce_ticks` after the previously accepted one.
//! Transitions back to the idle level close the current sense pulse and
//! record its width.

use crate::Ticks;
use crate::config::{ActiveLevel, ZeroCrossConfig};
use crate::stats::ZeroCrossStats;

/// Accepted zero-crossing edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgeEvent {
    pub timestamp: Ticks,
    pub edge_id: u32,
}

/// Minimum-interval debouncer for the zero-cross sense input.
#[derive(Clone, Debug)]
pub struct EdgeDetector {
    debounce_ticks: Ticks,
    max_pulse_ticks: Ticks,
    active_level: ActiveLevel,
    last_accepted: Option<Ticks>,
    pulse_started_at: Option<Ticks>,
    next_edge_id: u32,
}

impl EdgeDetector {
    /// Creates a detector from raw parameters.
    #[must_use]
    pub const fn new(
        debounce_ticks: Ticks,
        max_pulse_ticks: Ticks,
        active_level: ActiveLevel,
    ) -> Self {
        Self {
            debounce_ticks,
            max_pulse_ticks,
            active_level,
            last_accepted: None,
            pulse_started_at: None,
            next_edge_id: 0,
        }
    }

    /// Creates a detector using the debounce interval and polarity from `config`.
    ///
    /// Pulses longer than the longest plausible half cycle are not measured.
    #[must_use]
    pub fn from_config(config: &ZeroCrossConfig) -> Self {
        Self::new(
            config.debounce_ticks(),
            config.max_half_cycle_ticks(),
            config.zero_cross_pin.active_level,
        )
    }

    #[must_use]
    pub const fn debounce_ticks(&self) -> Ticks {
        self.debounce_ticks
    }

    /// Timestamp of the most recently accepted edge.
    #[must_use]
    pub const fn last_accepted(&self) -> Option<Ticks> {
        self.last_accepted
    }

    /// Handles one raw transition.
    ///
    /// `level_high` is the electrical level sampled after the transition.
    /// Returns the accepted edge, if any, and updates `stats`.
    pub fn on_raw_signal(
        &mut self,
        level_high: bool,
        timestamp: Ticks,
        stats: &mut ZeroCrossStats,
    ) -> Option<EdgeEvent> {
        stats.record_trigger();

        if !self.active_level.is_active(level_high) {
            self.close_pulse(timestamp, stats);
            return None;
        }

        if self
            .last_accepted
            .is_some_and(|last| timestamp.saturating_sub(last) < self.debounce_ticks)
        {
            stats.record_rejected();
            return None;
        }

        let event = EdgeEvent {
            timestamp,
            edge_id: self.next_edge_id,
        };
        self.next_edge_id = self.next_edge_id.wrapping_add(1);
        self.last_accepted = Some(timestamp);
        self.pulse_started_at = Some(timestamp);
        stats.record_edge();
        Some(event)
    }

    fn close_pulse(&mut self, timestamp: Ticks, stats: &mut ZeroCrossStats) {
        let Some(started) = self.pulse_started_at.take() else {
            return;
        };
        let width = timestamp.saturating_sub(started);
        if width > 0 && width < self.max_pulse_ticks {
            stats.record_pulse(width);
        }
    }

    /// Forgets edge history; the next active transition is accepted.
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.pulse_started_at = None;
    }
}
