//! Text rendering for `status` and `stats`.
//!
//! [`StatusFormatter`] keeps the output identical between the firmware CDC
//! console and the emulator.

use core::fmt;

use crate::Ticks;
use crate::burst::BURST_WINDOW;
pub use crate::controller::StatusSnapshot;
use crate::stats::StatsSnapshot;

/// Renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the relay line (e.g. `relay state=on scheduler=armed next=off@4.2ms`).
    pub fn write_relay_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "relay state={} scheduler={}",
            self.snapshot.relay,
            self.snapshot.scheduler.label()
        )?;
        if let Some(toggle) = self.snapshot.pending {
            write!(writer, " next={}@", toggle.target_state)?;
            let remaining = toggle
                .target_timestamp
                .saturating_sub(self.snapshot.taken_at);
            write_ticks(writer, remaining, self.snapshot.ticks_per_second)?;
        }
        Ok(())
    }

    /// Writes the mains line (e.g. `mains lock=valid freq=50.00Hz half-cycle=10.0ms last-edge=-2.5ms`).
    pub fn write_mains_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let estimate = &self.snapshot.estimate;
        let lock = if self.snapshot.signal_lost {
            "lost"
        } else if estimate.valid {
            "valid"
        } else {
            "acquiring"
        };
        write!(writer, "mains lock={lock} freq=")?;
        if estimate.valid {
            write!(writer, "{:.2}Hz", estimate.frequency_hz)?;
        } else {
            writer.write_str("n/a")?;
        }
        writer.write_str(" half-cycle=")?;
        if estimate.half_cycle_ticks == 0 {
            writer.write_str("n/a")?;
        } else {
            write_ticks(
                writer,
                estimate.half_cycle_ticks,
                self.snapshot.ticks_per_second,
            )?;
        }

        match estimate.last_update {
            Some(last) => {
                writer.write_str(" last-edge=-")?;
                write_ticks(
                    writer,
                    self.snapshot.taken_at.saturating_sub(last),
                    self.snapshot.ticks_per_second,
                )
            }
            None => writer.write_str(" last-edge=never"),
        }
    }

    /// Writes the burst line (e.g. `burst duty=10/20 (50%)` or `burst off`).
    pub fn write_burst_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        match self.snapshot.burst {
            Some(burst) => write!(
                writer,
                "burst duty={}/{BURST_WINDOW} ({}%)",
                burst.flip_point(),
                burst.duty_percent()
            ),
            None => writer.write_str("burst off"),
        }
    }

    pub fn write_counters_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write_counters(
            writer,
            &self.snapshot.stats,
            self.snapshot.ticks_per_second,
        )
    }

    /// Writes every status line separated by `\r\n`.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        self.write_relay_line(writer)?;
        writer.write_str("\r\n")?;
        self.write_mains_line(writer)?;
        writer.write_str("\r\n")?;
        self.write_burst_line(writer)?;
        writer.write_str("\r\n")?;
        self.write_counters_line(writer)
    }
}

/// Writes the counters line (e.g. `counters edges=120 triggers=242 ...`).
pub fn write_counters<W: fmt::Write>(
    writer: &mut W,
    stats: &StatsSnapshot,
    ticks_per_second: u64,
) -> fmt::Result {
    write!(
        writer,
        "counters edges={} triggers={} rejected={} pulses={} missed-crossings={} toggles={} missed-toggles={} freq=",
        stats.edge_count,
        stats.trigger_count,
        stats.rejected_count,
        stats.pulse_count,
        stats.missed_crossing_count,
        stats.toggle_count,
        stats.missed_toggle_count,
    )?;
    write!(writer, "{:.2}Hz pulse-width=", stats.frequency_hz)?;
    match stats.last_pulse_width {
        Some(width) => write_ticks(writer, width, ticks_per_second),
        None => writer.write_str("n/a"),
    }
}

fn write_ticks<W: fmt::Write>(writer: &mut W, ticks: Ticks, ticks_per_second: u64) -> fmt::Result {
    if ticks_per_second == 0 {
        return write!(writer, "{ticks}t");
    }
    let micros = u128::from(ticks) * 1_000_000 / u128::from(ticks_per_second);
    if micros >= 1_000_000 {
        let millis = micros / 1_000;
        write!(writer, "{}.{}s", millis / 1_000, (millis % 1_000) / 100)
    } else if micros >= 1_000 {
        write!(writer, "{}.{}ms", micros / 1_000, (micros % 1_000) / 100)
    } else {
        write!(writer, "{micros}us")
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::string::String;

    use super::*;
    use crate::burst::BurstFire;
    use crate::estimator::PeriodEstimate;
    use crate::scheduler::{ScheduledToggle, SchedulerState};
    use crate::RelayState;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            taken_at: 2_500,
            ticks_per_second: 1_000_000,
            relay: RelayState::Off,
            scheduler: SchedulerState::Armed,
            pending: Some(ScheduledToggle {
                target_timestamp: 6_700,
                target_state: RelayState::On,
                requested_at: 2_500,
            }),
            estimate: PeriodEstimate {
                half_cycle_ticks: 10_000,
                frequency_hz: 50.0,
                valid: true,
                last_update: Some(0),
            },
            signal_lost: false,
            stats: StatsSnapshot {
                edge_count: 4,
                trigger_count: 8,
                pulse_count: 4,
                last_pulse_width: Some(1_200),
                frequency_hz: 50.0,
                ..StatsSnapshot::default()
            },
            burst: BurstFire::new(10).ok(),
        }
    }

    #[test]
    fn renders_relay_line() {
        let snapshot = snapshot();
        let mut line = String::new();
        StatusFormatter::new(&snapshot)
            .write_relay_line(&mut line)
            .expect("formatting");
        assert_eq!(line, "relay state=off scheduler=armed next=on@4.2ms");
    }

    #[test]
    fn renders_mains_line() {
        let snapshot = snapshot();
        let mut line = String::new();
        StatusFormatter::new(&snapshot)
            .write_mains_line(&mut line)
            .expect("formatting");
        assert_eq!(
            line,
            "mains lock=valid freq=50.00Hz half-cycle=10.0ms last-edge=-2.5ms"
        );
    }

    #[test]
    fn renders_lost_signal() {
        let mut snapshot = snapshot();
        snapshot.signal_lost = true;
        snapshot.estimate.valid = false;
        let mut line = String::new();
        StatusFormatter::new(&snapshot)
            .write_mains_line(&mut line)
            .expect("formatting");
        assert!(line.starts_with("mains lock=lost freq=n/a"));
    }

    #[test]
    fn renders_burst_and_counters() {
        let snapshot = snapshot();
        let mut text = String::new();
        StatusFormatter::new(&snapshot)
            .write_all(&mut text)
            .expect("formatting");

        let lines: std::vec::Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "burst duty=10/20 (50%)");
        assert!(lines[3].starts_with("counters edges=4 triggers=8 rejected=0 pulses=4"));
        assert!(lines[3].ends_with("freq=50.00Hz pulse-width=1.2ms"));
    }
}
