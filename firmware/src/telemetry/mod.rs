//! Telemetry logging helpers.
//!
//! The controller keeps structured records in its ring; this module turns
//! them into defmt lines on the target and stdout lines on the host so the
//! drain loop and tests share one formatting path.

use zero_cross_core::config::{ActiveLevel, ZeroCrossConfig};
use zero_cross_core::stats::StatsSnapshot;
use zero_cross_core::telemetry::{EventId, TelemetryEventKind, TelemetryPayload, TelemetryRecord};
use zero_cross_core::{RelayState, Ticks};

use crate::status::Heartbeat;

/// Flattened view of one record, with every timestamp in microseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub id: EventId,
    pub event: TelemetryEventKind,
    pub at_us: u64,
    pub detail: LogDetail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogDetail {
    None,
    Frequency { millihertz: u32, half_cycle_us: u64 },
    Toggle { target_us: u64, lateness_us: Option<u64> },
    Miss { target_us: u64, reason: &'static str },
    Burst { flip_point: Option<u8> },
}

/// Pin bindings and timing reported once at start-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigSummary {
    pub sense_pin: &'static str,
    pub sense_gpio: u8,
    pub sense_pull: &'static str,
    pub sense_active: &'static str,
    pub relay_pin: &'static str,
    pub relay_gpio: u8,
    pub relay_initial: RelayState,
    pub relay_polarity: &'static str,
    pub ticks_per_second: u64,
    pub debounce_us: u64,
    pub fire_tolerance_us: u64,
    pub timeout_half_cycles: u8,
}

impl ConfigSummary {
    /// `sense_pin` and `relay_pin` name the MCU pins the bindings landed on.
    #[must_use]
    pub fn new(
        config: &ZeroCrossConfig,
        sense_pin: &'static str,
        relay_pin: &'static str,
        relay_polarity: ActiveLevel,
    ) -> Self {
        let micros = |duration: core::time::Duration| {
            u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
        };
        Self {
            sense_pin,
            sense_gpio: config.zero_cross_pin.gpio,
            sense_pull: config.zero_cross_pin.pull.label(),
            sense_active: config.zero_cross_pin.active_level.label(),
            relay_pin,
            relay_gpio: config.relay_pin.gpio,
            relay_initial: config.relay_pin.initial_state,
            relay_polarity: relay_polarity.label(),
            ticks_per_second: config.ticks_per_second,
            debounce_us: micros(config.debounce),
            fire_tolerance_us: micros(config.fire_tolerance),
            timeout_half_cycles: config.timeout_multiple,
        }
    }
}

/// Converts ticks at `ticks_per_second` into microseconds.
#[must_use]
pub fn ticks_to_micros(ticks: Ticks, ticks_per_second: u64) -> u64 {
    if ticks_per_second == 0 {
        return 0;
    }
    let micros = u128::from(ticks) * 1_000_000 / u128::from(ticks_per_second);
    u64::try_from(micros).unwrap_or(u64::MAX)
}

#[must_use]
pub fn describe(record: &TelemetryRecord, ticks_per_second: u64) -> LogLine {
    let us = |ticks| ticks_to_micros(ticks, ticks_per_second);
    let detail = match record.details {
        TelemetryPayload::None => LogDetail::None,
        TelemetryPayload::Frequency(frequency) => LogDetail::Frequency {
            millihertz: frequency.millihertz,
            half_cycle_us: us(frequency.half_cycle_ticks),
        },
        TelemetryPayload::Toggle(toggle) => LogDetail::Toggle {
            target_us: us(toggle.target),
            lateness_us: toggle.lateness.map(us),
        },
        TelemetryPayload::Miss(miss) => LogDetail::Miss {
            target_us: us(miss.target),
            reason: miss.reason.label(),
        },
        TelemetryPayload::Burst(burst) => LogDetail::Burst {
            flip_point: burst.flip_point,
        },
    };

    LogLine {
        id: record.id,
        event: record.event,
        at_us: us(record.timestamp),
        detail,
    }
}

/// Logs one telemetry record.
pub fn log_record(record: &TelemetryRecord, ticks_per_second: u64) {
    emit_record(&describe(record, ticks_per_second));
}

/// Logs the periodic counters and status mirrors.
pub fn log_heartbeat(beat: &Heartbeat, stats: &StatsSnapshot) {
    emit_heartbeat(beat, stats);
}

/// Logs records the drain loop could not reach before the ring overwrote them.
pub fn log_config(summary: &ConfigSummary) {
    emit_config(summary);
}

pub fn log_dropped(count: u32) {
    emit_dropped(count);
}

#[cfg(target_os = "none")]
fn emit_record(line: &LogLine) {
    let event = defmt::Display2Format(&line.event);
    match line.detail {
        LogDetail::None => {
            defmt::info!("telemetry:{} {} t={}us", line.id, event, line.at_us);
        }
        LogDetail::Frequency {
            millihertz,
            half_cycle_us,
        } => {
            defmt::info!(
                "telemetry:{} {} t={}us f={}mHz half={}us",
                line.id,
                event,
                line.at_us,
                millihertz,
                half_cycle_us
            );
        }
        LogDetail::Toggle {
            target_us,
            lateness_us: Some(late),
        } => {
            defmt::info!(
                "telemetry:{} {} t={}us target={}us late={}us",
                line.id,
                event,
                line.at_us,
                target_us,
                late
            );
        }
        LogDetail::Toggle {
            target_us,
            lateness_us: None,
        } => {
            defmt::info!(
                "telemetry:{} {} t={}us target={}us",
                line.id,
                event,
                line.at_us,
                target_us
            );
        }
        LogDetail::Miss { target_us, reason } => {
            defmt::warn!(
                "telemetry:{} {} t={}us target={}us reason={}",
                line.id,
                event,
                line.at_us,
                target_us,
                reason
            );
        }
        LogDetail::Burst {
            flip_point: Some(flip_point),
        } => {
            defmt::info!(
                "telemetry:{} {} t={}us duty={}/20",
                line.id,
                event,
                line.at_us,
                flip_point
            );
        }
        LogDetail::Burst { flip_point: None } => {
            defmt::info!("telemetry:{} {} t={}us off", line.id, event, line.at_us);
        }
    }
}

#[cfg(not(target_os = "none"))]
fn emit_record(line: &LogLine) {
    let prefix = format!("telemetry:{} {} t={}us", line.id, line.event, line.at_us);
    match line.detail {
        LogDetail::None => println!("{prefix}"),
        LogDetail::Frequency {
            millihertz,
            half_cycle_us,
        } => println!("{prefix} f={millihertz}mHz half={half_cycle_us}us"),
        LogDetail::Toggle {
            target_us,
            lateness_us: Some(late),
        } => println!("{prefix} target={target_us}us late={late}us"),
        LogDetail::Toggle {
            target_us,
            lateness_us: None,
        } => println!("{prefix} target={target_us}us"),
        LogDetail::Miss { target_us, reason } => {
            println!("{prefix} target={target_us}us reason={reason}");
        }
        LogDetail::Burst {
            flip_point: Some(flip_point),
        } => println!("{prefix} duty={flip_point}/20"),
        LogDetail::Burst { flip_point: None } => println!("{prefix} off"),
    }
}

#[cfg(target_os = "none")]
fn emit_heartbeat(beat: &Heartbeat, stats: &StatsSnapshot) {
    defmt::info!(
        "heartbeat relay={} lock={} f={}mHz edges={} missed-crossings={} toggles={} missed-toggles={} usb={}",
        beat.relay.label(),
        beat.locked,
        beat.millihertz,
        stats.edge_count,
        stats.missed_crossing_count,
        stats.toggle_count,
        stats.missed_toggle_count,
        beat.control_link_attached
    );
}

#[cfg(not(target_os = "none"))]
fn emit_heartbeat(beat: &Heartbeat, stats: &StatsSnapshot) {
    println!(
        "heartbeat relay={} lock={} f={}mHz edges={} missed-crossings={} toggles={} missed-toggles={} usb={}",
        beat.relay,
        beat.locked,
        beat.millihertz,
        stats.edge_count,
        stats.missed_crossing_count,
        stats.toggle_count,
        stats.missed_toggle_count,
        beat.control_link_attached
    );
}

#[cfg(target_os = "none")]
fn emit_dropped(count: u32) {
    defmt::warn!("telemetry: {} records overwritten before drain", count);
}

#[cfg(not(target_os = "none"))]
fn emit_dropped(count: u32) {
    println!("telemetry: {count} records overwritten before drain");
}

#[cfg(target_os = "none")]
fn emit_config(summary: &ConfigSummary) {
    defmt::info!(
        "zero-cross: sense {}(gpio{}) pull={} active={}",
        summary.sense_pin,
        summary.sense_gpio,
        summary.sense_pull,
        summary.sense_active
    );
    defmt::info!(
        "zero-cross: relay {}(gpio{}) initial={} polarity={}",
        summary.relay_pin,
        summary.relay_gpio,
        summary.relay_initial.label(),
        summary.relay_polarity
    );
    defmt::info!(
        "zero-cross: tick={}Hz debounce={}us fire-tolerance={}us timeout={} half-cycles",
        summary.ticks_per_second,
        summary.debounce_us,
        summary.fire_tolerance_us,
        summary.timeout_half_cycles
    );
}

#[cfg(not(target_os = "none"))]
fn emit_config(summary: &ConfigSummary) {
    println!(
        "zero-cross: sense {}(gpio{}) pull={} active={}",
        summary.sense_pin, summary.sense_gpio, summary.sense_pull, summary.sense_active
    );
    println!(
        "zero-cross: relay {}(gpio{}) initial={} polarity={}",
        summary.relay_pin, summary.relay_gpio, summary.relay_initial, summary.relay_polarity
    );
    println!(
        "zero-cross: tick={}Hz debounce={}us fire-tolerance={}us timeout={} half-cycles",
        summary.ticks_per_second,
        summary.debounce_us,
        summary.fire_tolerance_us,
        summary.timeout_half_cycles
    );
}
