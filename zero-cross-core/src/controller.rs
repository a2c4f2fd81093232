//! Zero-cross relay controller facade.
//!
//! [`ZeroCrossRelay`] wires the edge detector, period estimator, and relay
//! scheduler together, keeps the statistics and telemetry ring, applies the
//! signal-loss policy, and runs burst-fire duty control. The firmware keeps
//! one instance behind a critical-section mutex: the EXTI task feeds
//! [`ZeroCrossRelay::on_raw_signal`], the relay task sleeps until
//! [`ZeroCrossRelay::next_deadline`] and calls [`ZeroCrossRelay::poll`].

use crate::burst::{BurstError, BurstFire};
use crate::config::{ConfigError, SignalLossPolicy, ZeroCrossConfig};
use crate::edge::{EdgeDetector, EdgeEvent};
use crate::estimator::{EstimatorUpdate, PeriodEstimate, PeriodEstimator};
use crate::scheduler::{
    MissReason, MissedToggle, PollOutcome, RelayCommand, RelayDriver, RelayScheduler,
    RequestOutcome, ScheduleError, ScheduledToggle, SchedulerState,
};
use crate::stats::{StatsSnapshot, ZeroCrossStats};
use crate::telemetry::{
    TELEMETRY_RING_CAPACITY, TelemetryEventKind, TelemetryPayload, TelemetryRecorder,
};
use crate::{RelayState, Ticks};

/// Everything the `status` command reports, captured at one instant.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub taken_at: Ticks,
    pub ticks_per_second: u64,
    pub relay: RelayState,
    pub scheduler: SchedulerState,
    pub pending: Option<ScheduledToggle>,
    pub estimate: PeriodEstimate,
    pub signal_lost: bool,
    pub stats: StatsSnapshot,
    pub burst: Option<BurstFire>,
}

pub struct ZeroCrossRelay<D, const TELEMETRY: usize = TELEMETRY_RING_CAPACITY> {
    config: ZeroCrossConfig,
    detector: EdgeDetector,
    estimator: PeriodEstimator,
    scheduler: RelayScheduler<D>,
    stats: ZeroCrossStats,
    telemetry: TelemetryRecorder<TELEMETRY>,
    burst: Option<BurstFire>,
}

impl<D: RelayDriver, const TELEMETRY: usize> ZeroCrossRelay<D, TELEMETRY> {
    /// Validates `config` and drives the relay to its initial state.
    pub fn new(config: ZeroCrossConfig, driver: D) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            detector: EdgeDetector::from_config(&config),
            estimator: PeriodEstimator::from_config(&config),
            scheduler: RelayScheduler::from_config(driver, &config),
            stats: ZeroCrossStats::new(),
            telemetry: TelemetryRecorder::new(),
            burst: None,
            config,
        })
    }

    /// Feeds one raw transition of the zero-cross input.
    pub fn on_raw_signal(&mut self, level_high: bool, timestamp: Ticks) -> Option<EdgeEvent> {
        let event = self
            .detector
            .on_raw_signal(level_high, timestamp, &mut self.stats)?;

        // An edge after a long gap closes the loss-of-signal episode, which
        // must be counted even if no poll ran in between.
        if self.estimator.check_timeout(timestamp, &mut self.stats) {
            self.handle_signal_lost(timestamp);
        }

        let update = self.estimator.on_edge(event);
        let estimate = self.estimator.estimate();
        self.stats.observe_estimate(&estimate);

        match update {
            EstimatorUpdate::Locked => {
                self.telemetry.record_lock_change(
                    TelemetryEventKind::SignalLocked,
                    estimate.half_cycle_ticks,
                    estimate.frequency_hz,
                    timestamp,
                );
            }
            EstimatorUpdate::LockLost => {
                self.telemetry.record_lock_change(
                    TelemetryEventKind::LockLost,
                    estimate.half_cycle_ticks,
                    estimate.frequency_hz,
                    timestamp,
                );
                self.drop_pending(MissReason::LockLost, timestamp);
            }
            EstimatorUpdate::Tracking => {}
        }

        let locked = self.estimator.is_valid();
        if let Some(burst) = self.burst.as_mut().filter(|_| locked) {
            burst.advance();
        }
        self.sync_burst(timestamp);

        Some(event)
    }

    /// Services timeouts and the pending toggle.
    pub fn poll(&mut self, now: Ticks) -> PollOutcome {
        let timed_out = self.estimator.check_timeout(now, &mut self.stats);
        if let Some(missed) = timed_out.then(|| self.handle_signal_lost(now)).flatten() {
            return PollOutcome::Missed(missed);
        }

        let outcome = self.scheduler.poll(now);
        match outcome {
            PollOutcome::Fired { toggle, lateness } => {
                self.stats.record_toggle();
                self.telemetry.record_toggle_fired(toggle, lateness, now);
                self.sync_burst(now);
            }
            PollOutcome::Missed(missed) => {
                self.stats.record_missed_toggle();
                self.telemetry.record_toggle_missed(missed, now);
                self.sync_burst(now);
            }
            PollOutcome::Idle | PollOutcome::Waiting { .. } => {}
        }
        outcome
    }

    /// Requests a zero-cross synchronised switch. Leaves burst mode.
    pub fn request(
        &mut self,
        state: RelayState,
        now: Ticks,
    ) -> Result<RequestOutcome, ScheduleError> {
        self.leave_burst(now);
        self.schedule(state, now)
    }

    /// Switches immediately without waiting for a crossing. Leaves burst mode.
    ///
    /// Returns the pending toggle that was superseded, if any.
    pub fn force(&mut self, state: RelayState, now: Ticks) -> Option<ScheduledToggle> {
        self.leave_burst(now);
        let superseded = self.scheduler.force(state);
        self.telemetry.record(
            TelemetryEventKind::ForcedSwitch(state),
            TelemetryPayload::None,
            now,
        );
        superseded
    }

    /// Enables burst-fire with the given flip point, or disables it with `None`.
    pub fn set_burst(&mut self, flip_point: Option<u8>, now: Ticks) -> Result<(), BurstError> {
        self.burst = flip_point.map(BurstFire::new).transpose()?;
        self.telemetry.record_burst(flip_point, now);
        self.sync_burst(now);
        Ok(())
    }

    /// Zeroes the statistics counters. The period estimate is unaffected.
    pub fn reset_stats(&mut self, now: Ticks) {
        self.stats.reset();
        self.telemetry
            .record(TelemetryEventKind::StatsReset, TelemetryPayload::None, now);
    }

    /// Earliest tick at which [`Self::poll`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Ticks> {
        let toggle = self.scheduler.pending().map(|toggle| toggle.target_timestamp);
        let timeout = self.estimator.loss_of_signal_deadline();
        match (toggle, timeout) {
            (Some(toggle), Some(timeout)) => Some(toggle.min(timeout)),
            (deadline, None) | (None, deadline) => deadline,
        }
    }

    #[must_use]
    pub fn snapshot(&self, now: Ticks) -> StatusSnapshot {
        StatusSnapshot {
            taken_at: now,
            ticks_per_second: self.config.ticks_per_second,
            relay: self.scheduler.relay_state(),
            scheduler: self.scheduler.state(),
            pending: self.scheduler.pending(),
            estimate: self.estimator.estimate(),
            signal_lost: self.estimator.signal_lost(),
            stats: self.stats.snapshot(),
            burst: self.burst,
        }
    }

    pub fn config(&self) -> &ZeroCrossConfig {
        &self.config
    }

    pub fn estimator(&self) -> &PeriodEstimator {
        &self.estimator
    }

    pub fn scheduler(&self) -> &RelayScheduler<D> {
        &self.scheduler
    }

    pub fn stats(&self) -> &ZeroCrossStats {
        &self.stats
    }

    pub fn telemetry(&self) -> &TelemetryRecorder<TELEMETRY> {
        &self.telemetry
    }

    pub fn burst(&self) -> Option<BurstFire> {
        self.burst
    }

    pub fn relay_state(&self) -> RelayState {
        self.scheduler.relay_state()
    }

    pub fn driver(&self) -> &D {
        self.scheduler.driver()
    }

    pub fn driver_mut(&mut self) -> &mut D {
        self.scheduler.driver_mut()
    }

    fn schedule(
        &mut self,
        state: RelayState,
        now: Ticks,
    ) -> Result<RequestOutcome, ScheduleError> {
        let outcome = self
            .scheduler
            .request(RelayCommand::new(state, now), &self.estimator)?;
        match outcome {
            RequestOutcome::Armed(toggle) => {
                self.telemetry.record_toggle_armed(toggle, false, now);
            }
            RequestOutcome::Replaced { current, .. } => {
                self.telemetry.record_toggle_armed(current, true, now);
            }
            RequestOutcome::Unchanged(_) => {}
        }
        Ok(outcome)
    }

    fn handle_signal_lost(&mut self, now: Ticks) -> Option<MissedToggle> {
        self.telemetry
            .record(TelemetryEventKind::SignalLost, TelemetryPayload::None, now);
        self.stats.observe_estimate(&self.estimator.estimate());
        let missed = self.drop_pending(MissReason::SignalLost, now);

        if self.config.signal_loss_policy == SignalLossPolicy::ForceOff
            && self.scheduler.relay_state().is_on()
        {
            self.scheduler.force(RelayState::Off);
            self.telemetry.record(
                TelemetryEventKind::ForcedSwitch(RelayState::Off),
                TelemetryPayload::None,
                now,
            );
        }
        missed
    }

    fn drop_pending(&mut self, reason: MissReason, now: Ticks) -> Option<MissedToggle> {
        let missed = self.scheduler.cancel(reason)?;
        self.stats.record_missed_toggle();
        self.telemetry.record_toggle_missed(missed, now);
        Some(missed)
    }

    fn leave_burst(&mut self, now: Ticks) {
        if self.burst.take().is_some() {
            self.telemetry.record_burst(None, now);
        }
    }

    /// Arms the next burst transition once the previous one has fired.
    fn sync_burst(&mut self, now: Ticks) {
        let Some(burst) = self.burst else {
            return;
        };
        if !self.estimator.is_valid() || self.scheduler.pending().is_some() {
            return;
        }
        let desired = burst.current_state();
        if desired != self.scheduler.committed_state() {
            // Only fails without lock, which was checked above.
            let _ = self.schedule(desired, now);
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::burst::BURST_WINDOW;

    #[derive(Default)]
    struct RecordingDriver {
        writes: Vec<RelayState>,
    }

    impl RelayDriver for RecordingDriver {
        fn set(&mut self, state: RelayState) {
            self.writes.push(state);
        }
    }

    type TestRelay = ZeroCrossRelay<RecordingDriver, 32>;

    fn controller(config: ZeroCrossConfig) -> TestRelay {
        ZeroCrossRelay::new(config, RecordingDriver::default()).expect("valid config")
    }

    fn config() -> ZeroCrossConfig {
        ZeroCrossConfig::default().with_ticks_per_second(10_000)
    }

    fn pulse(relay: &mut TestRelay, timestamp: Ticks) {
        relay.on_raw_signal(true, timestamp);
        relay.on_raw_signal(false, timestamp + 5);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = config();
        config.lock_edges = 1;
        assert!(matches!(
            ZeroCrossRelay::<_, 8>::new(config, RecordingDriver::default()),
            Err(ConfigError::LockEdgesTooFew { lock_edges: 1 })
        ));
    }

    #[test]
    fn lock_is_recorded_in_telemetry() {
        let mut relay = controller(config());
        for timestamp in [0, 100, 200] {
            pulse(&mut relay, timestamp);
        }

        let record = relay
            .telemetry()
            .oldest_first()
            .find(|record| record.event == TelemetryEventKind::SignalLocked)
            .copied()
            .expect("lock recorded");
        assert_eq!(record.timestamp, 200);
        assert!(relay.stats().frequency_hz() > 49.9);
    }

    #[test]
    fn next_deadline_tracks_toggle_and_timeout() {
        let mut relay = controller(config());
        assert_eq!(relay.next_deadline(), None);

        for timestamp in [0, 100, 200] {
            pulse(&mut relay, timestamp);
        }
        assert_eq!(relay.next_deadline(), Some(500));

        relay.request(RelayState::On, 250).expect("armed");
        assert_eq!(relay.next_deadline(), Some(300));
    }

    #[test]
    fn force_off_policy_releases_relay_on_signal_loss() {
        let mut relay = controller(config().with_signal_loss_policy(SignalLossPolicy::ForceOff));
        for timestamp in [0, 100, 200] {
            pulse(&mut relay, timestamp);
        }
        relay.request(RelayState::On, 250).expect("armed");
        assert!(matches!(relay.poll(300), PollOutcome::Fired { .. }));
        assert_eq!(relay.relay_state(), RelayState::On);

        relay.poll(500);
        assert_eq!(relay.relay_state(), RelayState::Off);
        assert_eq!(relay.stats().missed_crossing_count(), 1);
        assert_eq!(
            relay.driver().writes,
            [RelayState::Off, RelayState::On, RelayState::Off]
        );
    }

    #[test]
    fn hold_policy_keeps_relay_on_signal_loss() {
        let mut relay = controller(config());
        for timestamp in [0, 100, 200] {
            pulse(&mut relay, timestamp);
        }
        relay.force(RelayState::On, 210);
        relay.poll(500);
        assert_eq!(relay.relay_state(), RelayState::On);
    }

    #[test]
    fn lock_loss_cancels_pending_toggle() {
        let mut relay = controller(config());
        for timestamp in [0, 100, 200] {
            pulse(&mut relay, timestamp);
        }
        relay.request(RelayState::On, 250).expect("armed");

        // Plausible but out-of-band interval drops lock.
        pulse(&mut relay, 320);
        assert_eq!(relay.scheduler().pending(), None);
        assert_eq!(relay.stats().missed_toggle_count(), 1);
        assert_eq!(relay.poll(400), PollOutcome::Idle);
    }

    #[test]
    fn burst_mode_delivers_flip_point_half_cycles() {
        let mut relay = controller(config());
        for timestamp in [0, 100, 200] {
            pulse(&mut relay, timestamp);
        }
        relay.set_burst(Some(5), 200).expect("valid duty");

        let mut on_half_cycles = 0;
        let mut timestamp = 200;
        for _ in 0..u32::from(BURST_WINDOW) * 2 {
            timestamp += 100;
            relay.poll(timestamp);
            pulse(&mut relay, timestamp);
            if relay.relay_state().is_on() {
                on_half_cycles += 1;
            }
        }

        assert_eq!(on_half_cycles, 10);
        assert_eq!(relay.stats().missed_toggle_count(), 0);
    }

    #[test]
    fn manual_request_leaves_burst_mode() {
        let mut relay = controller(config());
        for timestamp in [0, 100, 200] {
            pulse(&mut relay, timestamp);
        }
        relay.set_burst(Some(20), 200).expect("valid duty");
        assert!(relay.burst().is_some());

        relay.request(RelayState::Off, 250).expect("armed");
        assert!(relay.burst().is_none());
    }

    #[test]
    fn reset_stats_keeps_lock() {
        let mut relay = controller(config());
        for timestamp in [0, 100, 200] {
            pulse(&mut relay, timestamp);
        }
        relay.reset_stats(210);
        assert_eq!(relay.stats().edge_count(), 0);
        assert!(relay.estimator().is_valid());
        assert!(relay.request(RelayState::On, 250).is_ok());
    }
}
