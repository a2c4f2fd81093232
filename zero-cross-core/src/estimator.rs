//! Mains period estimation from accepted zero-cross edges.
//!
//! The half-cycle length is tracked with an exponentially weighted moving
//! average. An interval is in band when it and the running value can both
//! lie within `band_tolerance` of one common half cycle, so jitter of up to
//! the tolerance in either direction never breaks the chain. The estimate
//! becomes valid once `lock_edges` consecutive edges are in band. A locked
//! estimate ignores isolated outliers and only drops lock after
//! [`LOCK_LOSS_OUTLIERS`] consecutive out-of-band intervals. It is
//! invalidated when no edge arrives for `timeout_multiple` half cycles.

use core::fmt;

use crate::Ticks;
use crate::config::ZeroCrossConfig;
use crate::edge::EdgeEvent;
use crate::stats::ZeroCrossStats;

/// Consecutive out-of-band intervals that break an established lock.
pub const LOCK_LOSS_OUTLIERS: u8 = 2;

/// Snapshot of the estimator output.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct PeriodEstimate {
    pub half_cycle_ticks: Ticks,
    pub frequency_hz: f32,
    pub valid: bool,
    pub last_update: Option<Ticks>,
}

/// Raised when a crossing prediction is requested without a valid estimate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NotReady;

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mains period estimate not ready")
    }
}

/// Lock transitions reported by [`PeriodEstimator::on_edge`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EstimatorUpdate {
    /// Estimate updated without a change in validity.
    Tracking,
    /// Estimate just became valid.
    Locked,
    /// Estimate was valid and consecutive out-of-band intervals invalidated it.
    LockLost,
}

#[derive(Clone, Debug)]
pub struct PeriodEstimator {
    ticks_per_second: u64,
    weight: f32,
    band_tolerance: f32,
    lock_edges: u8,
    timeout_multiple: u8,
    nominal_half_cycle: Ticks,
    min_half_cycle: Ticks,
    max_half_cycle: Ticks,
    half_cycle: Option<f32>,
    last_edge: Option<EdgeEvent>,
    consistent_edges: u8,
    outliers: u8,
    valid: bool,
    signal_lost: bool,
}

impl PeriodEstimator {
    #[must_use]
    pub fn from_config(config: &ZeroCrossConfig) -> Self {
        Self {
            ticks_per_second: config.ticks_per_second,
            weight: config.ewma_weight,
            band_tolerance: config.band_tolerance,
            lock_edges: config.lock_edges,
            timeout_multiple: config.timeout_multiple,
            nominal_half_cycle: config.nominal_half_cycle_ticks(),
            min_half_cycle: config.min_half_cycle_ticks(),
            max_half_cycle: config.max_half_cycle_ticks(),
            half_cycle: None,
            last_edge: None,
            consistent_edges: 0,
            outliers: 0,
            valid: false,
            signal_lost: false,
        }
    }

    /// Feeds one accepted edge into the estimate.
    pub fn on_edge(&mut self, event: EdgeEvent) -> EstimatorUpdate {
        let was_valid = self.valid;
        let previous = self.last_edge.replace(event);
        self.signal_lost = false;

        let Some(previous) = previous else {
            self.consistent_edges = 1;
            self.outliers = 0;
            return EstimatorUpdate::Tracking;
        };

        let delta = event.timestamp.saturating_sub(previous.timestamp);
        match self.half_cycle {
            Some(average) if self.within_band(delta, average) => {
                self.half_cycle =
                    Some(average * (1.0 - self.weight) + ticks_to_f32(delta) * self.weight);
                self.consistent_edges = self.consistent_edges.saturating_add(1);
                self.outliers = 0;
            }
            Some(_) if self.valid && self.outliers + 1 < LOCK_LOSS_OUTLIERS => {
                // Isolated outlier while locked: keep the estimate.
                self.outliers += 1;
                return EstimatorUpdate::Tracking;
            }
            _ => self.reseed(delta),
        }

        self.valid = self.half_cycle.is_some() && self.consistent_edges >= self.lock_edges;

        match (was_valid, self.valid) {
            (false, true) => EstimatorUpdate::Locked,
            (true, false) => EstimatorUpdate::LockLost,
            _ => EstimatorUpdate::Tracking,
        }
    }

    /// Detects loss of signal.
    ///
    /// Returns `true` exactly once per episode: the first call at or after
    /// the timeout invalidates the estimate and bumps the missed-crossing
    /// counter. The next accepted edge ends the episode.
    pub fn check_timeout(&mut self, now: Ticks, stats: &mut ZeroCrossStats) -> bool {
        if self.signal_lost {
            return false;
        }
        let Some(deadline) = self.loss_of_signal_deadline() else {
            return false;
        };
        if now < deadline {
            return false;
        }

        self.valid = false;
        self.consistent_edges = 0;
        self.outliers = 0;
        self.signal_lost = true;
        stats.record_missed_crossing();
        true
    }

    /// First crossing at or after `after`.
    ///
    /// Steps from the last edge by whole half cycles. Fails when the estimate
    /// is not valid or the last edge is already older than the timeout.
    pub fn predict_next_crossing(&self, after: Ticks) -> Result<Ticks, NotReady> {
        if !self.valid {
            return Err(NotReady);
        }
        let (Some(last), Some(half)) = (self.last_edge, self.half_cycle_ticks()) else {
            return Err(NotReady);
        };
        if half == 0 || after.saturating_sub(last.timestamp) >= self.timeout_ticks() {
            return Err(NotReady);
        }

        let mut target = last.timestamp + half;
        if target < after {
            let steps = (after - target).div_ceil(half);
            target += steps * half;
        }
        Ok(target)
    }

    /// Tick at which loss of signal will be declared if no edge arrives.
    #[must_use]
    pub fn loss_of_signal_deadline(&self) -> Option<Ticks> {
        if self.signal_lost {
            return None;
        }
        self.last_edge
            .map(|edge| edge.timestamp.saturating_add(self.timeout_ticks()))
    }

    #[must_use]
    pub fn timeout_ticks(&self) -> Ticks {
        let half = self.half_cycle_ticks().unwrap_or(self.nominal_half_cycle);
        half.saturating_mul(Ticks::from(self.timeout_multiple))
    }

    /// Rounded running half-cycle estimate, valid or not.
    #[must_use]
    pub fn half_cycle_ticks(&self) -> Option<Ticks> {
        self.half_cycle.map(round_ticks)
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub const fn signal_lost(&self) -> bool {
        self.signal_lost
    }

    #[must_use]
    pub fn last_edge(&self) -> Option<EdgeEvent> {
        self.last_edge
    }

    #[must_use]
    pub fn estimate(&self) -> PeriodEstimate {
        let half_cycle_ticks = self.half_cycle_ticks().unwrap_or(0);
        let frequency_hz = match self.half_cycle {
            Some(half) if half > 0.0 => ticks_to_f32(self.ticks_per_second) / (2.0 * half),
            _ => 0.0,
        };
        PeriodEstimate {
            half_cycle_ticks,
            frequency_hz,
            valid: self.valid,
            last_update: self.last_edge.map(|edge| edge.timestamp),
        }
    }

    /// Drops all history.
    pub fn reset(&mut self) {
        self.half_cycle = None;
        self.last_edge = None;
        self.consistent_edges = 0;
        self.outliers = 0;
        self.valid = false;
        self.signal_lost = false;
    }

    fn reseed(&mut self, delta: Ticks) {
        self.outliers = 0;
        if self.is_plausible(delta) {
            self.half_cycle = Some(ticks_to_f32(delta));
            self.consistent_edges = 2;
        } else {
            self.half_cycle = None;
            self.consistent_edges = 1;
        }
    }

    /// Both values fit within the tolerance of some common half cycle
    /// (half a tick of slack for rounding).
    fn within_band(&self, delta: Ticks, average: f32) -> bool {
        let delta = ticks_to_f32(delta);
        let low = 1.0 - self.band_tolerance;
        let high = 1.0 + self.band_tolerance;
        delta * low <= average * high + 0.5 && average * low <= delta * high + 0.5
    }

    fn is_plausible(&self, delta: Ticks) -> bool {
        (self.min_half_cycle..=self.max_half_cycle).contains(&delta)
    }
}

#[allow(clippy::cast_precision_loss)]
fn ticks_to_f32(ticks: Ticks) -> f32 {
    ticks as f32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_ticks(value: f32) -> Ticks {
    if value <= 0.0 {
        0
    } else {
        (value + 0.5) as Ticks
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;

    fn config() -> ZeroCrossConfig {
        ZeroCrossConfig::default().with_ticks_per_second(10_000)
    }

    fn edge(timestamp: Ticks, edge_id: u32) -> EdgeEvent {
        EdgeEvent { timestamp, edge_id }
    }

    fn feed(estimator: &mut PeriodEstimator, timestamps: &[Ticks]) -> EstimatorUpdate {
        let mut last = EstimatorUpdate::Tracking;
        for (id, timestamp) in timestamps.iter().enumerate() {
            last = estimator.on_edge(edge(*timestamp, u32::try_from(id).unwrap_or(0)));
        }
        last
    }

    #[test]
    fn locks_after_three_consistent_edges() {
        let mut estimator = PeriodEstimator::from_config(&config());

        assert_eq!(estimator.on_edge(edge(0, 0)), EstimatorUpdate::Tracking);
        assert_eq!(estimator.on_edge(edge(100, 1)), EstimatorUpdate::Tracking);
        assert!(!estimator.is_valid());
        assert_eq!(estimator.on_edge(edge(200, 2)), EstimatorUpdate::Locked);
        assert!(estimator.is_valid());

        let estimate = estimator.estimate();
        assert_eq!(estimate.half_cycle_ticks, 100);
        assert!(estimate.frequency_hz > 49.9 && estimate.frequency_hz < 50.1);
        assert_eq!(estimate.last_update, Some(200));
    }

    #[test]
    fn implausible_interval_is_not_used_as_seed() {
        let mut estimator = PeriodEstimator::from_config(&config());
        feed(&mut estimator, &[0, 30, 60, 90]);
        assert!(!estimator.is_valid());
        assert_eq!(estimator.half_cycle_ticks(), None);
    }

    #[test]
    fn consecutive_outliers_drop_lock_and_reseed() {
        let mut estimator = PeriodEstimator::from_config(&config());
        feed(&mut estimator, &[0, 100, 200, 300]);
        assert!(estimator.is_valid());

        // 75 ticks is plausible (66.7 Hz) but cannot share a period with 100.
        assert_eq!(estimator.on_edge(edge(375, 4)), EstimatorUpdate::Tracking);
        assert!(estimator.is_valid());
        assert_eq!(estimator.half_cycle_ticks(), Some(100));

        assert_eq!(estimator.on_edge(edge(450, 5)), EstimatorUpdate::LockLost);
        assert_eq!(estimator.half_cycle_ticks(), Some(75));

        assert_eq!(estimator.on_edge(edge(525, 6)), EstimatorUpdate::Locked);
    }

    #[test]
    fn single_outlier_keeps_lock() {
        let mut estimator = PeriodEstimator::from_config(&config());
        feed(&mut estimator, &[0, 100, 200, 300]);

        // A missed crossing doubles one interval.
        assert_eq!(estimator.on_edge(edge(500, 4)), EstimatorUpdate::Tracking);
        assert_eq!(estimator.on_edge(edge(600, 5)), EstimatorUpdate::Tracking);
        assert!(estimator.is_valid());
        assert_eq!(estimator.half_cycle_ticks(), Some(100));
    }

    #[test]
    fn alternating_extremes_of_the_band_lock() {
        let mut estimator = PeriodEstimator::from_config(&config());
        let mut timestamp = 0;
        let mut updates = Vec::new();
        for index in 0..200u32 {
            updates.push(estimator.on_edge(edge(timestamp, index)));
            timestamp += if index % 2 == 0 { 110 } else { 90 };
        }

        assert_eq!(updates[2], EstimatorUpdate::Locked);
        assert!(!updates.contains(&EstimatorUpdate::LockLost));
        let estimate = estimator.estimate();
        assert!(estimate.valid);
        assert!((45.0..=55.0).contains(&estimate.frequency_hz), "{estimate:?}");
    }

    #[test]
    fn ewma_moves_toward_new_intervals() {
        let mut estimator = PeriodEstimator::from_config(&config());
        feed(&mut estimator, &[0, 100, 200]);
        estimator.on_edge(edge(305, 3));
        // 0.8 * 100 + 0.2 * 105 = 101
        assert_eq!(estimator.half_cycle_ticks(), Some(101));
    }

    #[test]
    fn timeout_counts_once_per_episode() {
        let mut estimator = PeriodEstimator::from_config(&config());
        let mut stats = ZeroCrossStats::new();
        feed(&mut estimator, &[0, 100, 200, 300]);

        assert!(!estimator.check_timeout(599, &mut stats));
        assert!(estimator.check_timeout(600, &mut stats));
        assert!(!estimator.is_valid());
        assert!(!estimator.check_timeout(700, &mut stats));
        assert!(!estimator.check_timeout(5_000, &mut stats));
        assert_eq!(stats.missed_crossing_count(), 1);

        estimator.on_edge(edge(6_000, 4));
        assert!(estimator.check_timeout(6_400, &mut stats));
        assert_eq!(stats.missed_crossing_count(), 2);
    }

    #[test]
    fn no_timeout_before_first_edge() {
        let mut estimator = PeriodEstimator::from_config(&config());
        let mut stats = ZeroCrossStats::new();
        assert!(!estimator.check_timeout(1_000_000, &mut stats));
        assert_eq!(estimator.loss_of_signal_deadline(), None);
    }

    #[test]
    fn timeout_uses_nominal_half_cycle_without_estimate() {
        let mut estimator = PeriodEstimator::from_config(&config());
        estimator.on_edge(edge(0, 0));
        assert_eq!(estimator.timeout_ticks(), 300);
    }

    #[test]
    fn prediction_steps_by_whole_half_cycles() {
        let mut estimator = PeriodEstimator::from_config(&config());
        feed(&mut estimator, &[0, 100, 200]);

        assert_eq!(estimator.predict_next_crossing(200), Ok(300));
        assert_eq!(estimator.predict_next_crossing(250), Ok(300));
        assert_eq!(estimator.predict_next_crossing(300), Ok(300));
        assert_eq!(estimator.predict_next_crossing(301), Ok(400));
        assert_eq!(estimator.predict_next_crossing(500), Err(NotReady));
    }

    #[test]
    fn prediction_requires_valid_estimate() {
        let mut estimator = PeriodEstimator::from_config(&config());
        feed(&mut estimator, &[0, 100]);
        assert_eq!(estimator.predict_next_crossing(150), Err(NotReady));
    }
}
