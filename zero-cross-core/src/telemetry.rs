//! Telemetry event catalog and the in-memory ring shared by firmware and host.
//!
//! The controller records every lock transition, toggle, and operator action
//! into a fixed-size [`TelemetryRecorder`]. The firmware drains new records
//! to `defmt` and the emulator prints them into transcripts.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::scheduler::{MissReason, MissedToggle, ScheduledToggle};
use crate::{RelayState, Ticks};

/// Monotonic (wrapping) identifier assigned to each record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    SignalLocked,
    LockLost,
    SignalLost,
    ToggleArmed(RelayState),
    ToggleFired(RelayState),
    ToggleMissed(RelayState),
    ForcedSwitch(RelayState),
    BurstChanged,
    StatsReset,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::SignalLocked => f.write_str("signal-locked"),
            TelemetryEventKind::LockLost => f.write_str("lock-lost"),
            TelemetryEventKind::SignalLost => f.write_str("signal-lost"),
            TelemetryEventKind::ToggleArmed(state) => write!(f, "toggle-armed {state}"),
            TelemetryEventKind::ToggleFired(state) => write!(f, "toggle-fired {state}"),
            TelemetryEventKind::ToggleMissed(state) => write!(f, "toggle-missed {state}"),
            TelemetryEventKind::ForcedSwitch(state) => write!(f, "forced-switch {state}"),
            TelemetryEventKind::BurstChanged => f.write_str("burst-changed"),
            TelemetryEventKind::StatsReset => f.write_str("stats-reset"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    Frequency(FrequencyTelemetry),
    Toggle(ToggleTelemetry),
    Miss(MissTelemetry),
    Burst(BurstTelemetry),
}

/// Estimator output at a lock transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrequencyTelemetry {
    pub half_cycle_ticks: Ticks,
    pub millihertz: u32,
}

impl FrequencyTelemetry {
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(half_cycle_ticks: Ticks, frequency_hz: f32) -> Self {
        let millihertz = if frequency_hz > 0.0 {
            (frequency_hz * 1_000.0 + 0.5) as u32
        } else {
            0
        };
        Self {
            half_cycle_ticks,
            millihertz,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ToggleTelemetry {
    pub target: Ticks,
    pub requested_at: Ticks,
    /// Ticks between the target and the poll that fired it.
    pub lateness: Option<Ticks>,
    /// Set when the toggle replaced another pending one.
    pub replaced: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MissTelemetry {
    pub target: Ticks,
    pub reason: MissReason,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BurstTelemetry {
    pub flip_point: Option<u8>,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Ticks,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Records written after `cursor` (all retained records when `None`).
    pub fn since(&self, cursor: Option<EventId>) -> impl Iterator<Item = &TelemetryRecord> {
        self.oldest_first().filter(move |record| match cursor {
            Some(cursor) => is_newer(record.id, cursor),
            None => true,
        })
    }

    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        details: TelemetryPayload,
        timestamp: Ticks,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details,
        });

        id
    }

    pub fn record_lock_change(
        &mut self,
        event: TelemetryEventKind,
        half_cycle_ticks: Ticks,
        frequency_hz: f32,
        timestamp: Ticks,
    ) -> EventId {
        let payload =
            TelemetryPayload::Frequency(FrequencyTelemetry::new(half_cycle_ticks, frequency_hz));
        self.record(event, payload, timestamp)
    }

    pub fn record_toggle_armed(
        &mut self,
        toggle: ScheduledToggle,
        replaced: bool,
        timestamp: Ticks,
    ) -> EventId {
        let payload = TelemetryPayload::Toggle(ToggleTelemetry {
            target: toggle.target_timestamp,
            requested_at: toggle.requested_at,
            lateness: None,
            replaced,
        });
        self.record(
            TelemetryEventKind::ToggleArmed(toggle.target_state),
            payload,
            timestamp,
        )
    }

    pub fn record_toggle_fired(
        &mut self,
        toggle: ScheduledToggle,
        lateness: Ticks,
        timestamp: Ticks,
    ) -> EventId {
        let payload = TelemetryPayload::Toggle(ToggleTelemetry {
            target: toggle.target_timestamp,
            requested_at: toggle.requested_at,
            lateness: Some(lateness),
            replaced: false,
        });
        self.record(
            TelemetryEventKind::ToggleFired(toggle.target_state),
            payload,
            timestamp,
        )
    }

    pub fn record_toggle_missed(&mut self, missed: MissedToggle, timestamp: Ticks) -> EventId {
        let payload = TelemetryPayload::Miss(MissTelemetry {
            target: missed.toggle.target_timestamp,
            reason: missed.reason,
        });
        self.record(
            TelemetryEventKind::ToggleMissed(missed.toggle.target_state),
            payload,
            timestamp,
        )
    }

    pub fn record_burst(&mut self, flip_point: Option<u8>, timestamp: Ticks) -> EventId {
        self.record(
            TelemetryEventKind::BurstChanged,
            TelemetryPayload::Burst(BurstTelemetry { flip_point }),
            timestamp,
        )
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapping comparison of event ids.
#[allow(clippy::cast_possible_wrap)]
const fn is_newer(id: EventId, cursor: EventId) -> bool {
    (id.wrapping_sub(cursor) as i32) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggle(target_state: RelayState) -> ScheduledToggle {
        ScheduledToggle {
            target_timestamp: 300,
            target_state,
            requested_at: 250,
        }
    }

    #[test]
    fn records_toggle_lifecycle() {
        let mut recorder = TelemetryRecorder::<8>::new();

        let armed = recorder.record_toggle_armed(toggle(RelayState::On), false, 250);
        let fired = recorder.record_toggle_fired(toggle(RelayState::On), 2, 302);
        assert_eq!((armed, fired), (0, 1));

        let record = recorder.latest().copied().expect("fired record");
        assert_eq!(record.event, TelemetryEventKind::ToggleFired(RelayState::On));
        match record.details {
            TelemetryPayload::Toggle(details) => {
                assert_eq!(details.target, 300);
                assert_eq!(details.lateness, Some(2));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn records_missed_toggle_reason() {
        let mut recorder = TelemetryRecorder::<8>::new();
        recorder.record_toggle_missed(
            MissedToggle {
                toggle: toggle(RelayState::Off),
                reason: MissReason::SignalLost,
            },
            600,
        );

        let record = recorder.latest().copied().expect("missed record");
        assert_eq!(record.event, TelemetryEventKind::ToggleMissed(RelayState::Off));
        assert_eq!(
            record.details,
            TelemetryPayload::Miss(MissTelemetry {
                target: 300,
                reason: MissReason::SignalLost,
            })
        );
    }

    #[test]
    fn frequency_payload_rounds_to_millihertz() {
        let payload = FrequencyTelemetry::new(10_000, 50.0);
        assert_eq!(payload.millihertz, 50_000);
        assert_eq!(FrequencyTelemetry::new(0, 0.0).millihertz, 0);
    }

    #[test]
    fn since_skips_drained_records() {
        let mut recorder = TelemetryRecorder::<4>::new();
        for timestamp in 0..6 {
            recorder.record(
                TelemetryEventKind::StatsReset,
                TelemetryPayload::None,
                timestamp,
            );
        }

        assert_eq!(recorder.len(), 4);
        let ids: [EventId; 2] = {
            let mut iter = recorder.since(Some(3)).map(|record| record.id);
            [
                iter.next().expect("first newer record"),
                iter.next().expect("second newer record"),
            ]
        };
        assert_eq!(ids, [4, 5]);
        assert_eq!(recorder.since(None).count(), 4);
        assert_eq!(recorder.since(Some(5)).count(), 0);
    }
}
