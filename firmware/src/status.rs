//! Shared status mirrors for the firmware target.
//!
//! Lock-free atomics let the heartbeat log report the relay level, the last
//! accepted edge, mains lock, and USB attachment without taking the
//! controller mutex.

use portable_atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use zero_cross_core::{RelayState, Ticks};
use zero_cross_core::estimator::PeriodEstimate;
use zero_cross_core::telemetry::FrequencyTelemetry;

/// Relay output level last driven (true == energised).
static RELAY_ON: AtomicBool = AtomicBool::new(false);
/// Tick (+1) of the last accepted zero-cross edge (0 == never).
static LAST_EDGE_TICKS: AtomicU64 = AtomicU64::new(0);
/// Whether the period estimate is valid.
static MAINS_LOCKED: AtomicBool = AtomicBool::new(false);
/// Estimated mains frequency in millihertz (0 == unknown).
static MAINS_MILLIHERTZ: AtomicU32 = AtomicU32::new(0);
/// Tracks whether the USB operator console is attached.
static CONTROL_LINK_ATTACHED: AtomicBool = AtomicBool::new(false);

/// Point-in-time copy of every mirror.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    pub relay: RelayState,
    pub last_edge: Option<Ticks>,
    pub locked: bool,
    pub millihertz: u32,
    pub control_link_attached: bool,
}

fn encode_ticks(ticks: Ticks) -> u64 {
    ticks.wrapping_add(1)
}

fn decode_ticks(raw: u64) -> Option<Ticks> {
    if raw == 0 {
        None
    } else {
        Some(raw.wrapping_sub(1))
    }
}

pub fn record_relay_state(state: RelayState) {
    RELAY_ON.store(state.is_on(), Ordering::Relaxed);
}

pub fn relay_state() -> RelayState {
    RelayState::from_on(RELAY_ON.load(Ordering::Relaxed))
}

/// Records the timestamp of an accepted edge.
pub fn record_edge(timestamp: Ticks) {
    LAST_EDGE_TICKS.store(encode_ticks(timestamp), Ordering::Relaxed);
}

pub fn last_edge() -> Option<Ticks> {
    decode_ticks(LAST_EDGE_TICKS.load(Ordering::Relaxed))
}

/// Mirrors the current period estimate.
pub fn record_estimate(estimate: &PeriodEstimate) {
    MAINS_LOCKED.store(estimate.valid, Ordering::Relaxed);
    let millihertz = if estimate.valid {
        FrequencyTelemetry::new(estimate.half_cycle_ticks, estimate.frequency_hz).millihertz
    } else {
        0
    };
    MAINS_MILLIHERTZ.store(millihertz, Ordering::Relaxed);
}

/// Updates the cached control-link attachment flag.
pub fn set_control_link_attached(attached: bool) {
    CONTROL_LINK_ATTACHED.store(attached, Ordering::Relaxed);
}

pub fn heartbeat() -> Heartbeat {
    Heartbeat {
        relay: relay_state(),
        last_edge: last_edge(),
        locked: MAINS_LOCKED.load(Ordering::Relaxed),
        millihertz: MAINS_MILLIHERTZ.load(Ordering::Relaxed),
        control_link_attached: CONTROL_LINK_ATTACHED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_encoding_reserves_zero_for_never() {
        assert_eq!(decode_ticks(0), None);
        assert_eq!(decode_ticks(encode_ticks(0)), Some(0));
        assert_eq!(decode_ticks(encode_ticks(42_000)), Some(42_000));
    }

    #[test]
    fn estimate_mirror_drops_frequency_without_lock() {
        record_estimate(&PeriodEstimate {
            half_cycle_ticks: 10_000,
            frequency_hz: 50.0,
            valid: true,
            last_update: Some(0),
        });
        let beat = heartbeat();
        assert!(beat.locked);
        assert_eq!(beat.millihertz, 50_000);

        record_estimate(&PeriodEstimate::default());
        let beat = heartbeat();
        assert!(!beat.locked);
        assert_eq!(beat.millihertz, 0);
    }
}
