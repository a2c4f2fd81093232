use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use zero_cross_core::config::ZeroCrossConfig;
use zero_cross_core::controller::ZeroCrossRelay;
use zero_cross_core::repl::commands::{CommandExecutor, CommandOutcome};
use zero_cross_core::scheduler::RelayDriver;
use zero_cross_core::telemetry::{EventId, TelemetryPayload, TelemetryRecord};
use zero_cross_core::{RelayState, Ticks};

use crate::mains::{MainsProfile, MainsSimulator, SignalEdge, TICKS_PER_SECOND};

pub const DEFAULT_SEED: u64 = 0x5eed_0c0d;

/// Longest single `advance` step (one hour).
const MAX_ADVANCE_MS: u64 = 3_600_000;

/// Frequencies the simulated mains will accept.
const FREQUENCY_RANGE: std::ops::RangeInclusive<f64> = 1.0..=1_000.0;

pub const EMULATOR_HELP: &[&str] = &[
    "advance <ms>                  - run the virtual clock forward",
    "mains on|off                  - connect or disconnect the simulated mains",
    "mains freq=<hz>               - change the simulated mains frequency",
    "mains jitter=<us>             - change the crossing jitter bound",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Interactive,
    Steady,
    Outage,
    Burst,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "transcripts/emulator-interactive.log",
            TranscriptProfile::Steady => "transcripts/emulator-steady.log",
            TranscriptProfile::Outage => "transcripts/emulator-outage.log",
            TranscriptProfile::Burst => "transcripts/emulator-burst.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "Zero-Cross Relay Emulator interactive transcript",
            TranscriptProfile::Steady => "Zero-Cross Relay Emulator steady mains transcript",
            TranscriptProfile::Outage => "Zero-Cross Relay Emulator mains outage transcript",
            TranscriptProfile::Burst => "Zero-Cross Relay Emulator burst fire transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        [
            ("interactive", Self::Interactive),
            ("steady", Self::Steady),
            ("outage", Self::Outage),
            ("burst", Self::Burst),
        ]
        .into_iter()
        .find(|(name, _)| tag.eq_ignore_ascii_case(name))
        .map(|(_, profile)| profile)
        .ok_or_else(|| format!("Unknown profile `{tag}`"))
    }
}

/// Relay output of the emulated board.
#[derive(Debug, Default)]
pub struct HostRelay {
    state: RelayState,
    switch_count: u32,
}

impl HostRelay {
    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Number of writes that changed the output level.
    pub fn switch_count(&self) -> u32 {
        self.switch_count
    }
}

impl RelayDriver for HostRelay {
    fn set(&mut self, state: RelayState) {
        if state != self.state {
            self.switch_count += 1;
        }
        self.state = state;
    }
}

pub type EmulatedRelay = ZeroCrossRelay<HostRelay>;

#[derive(Clone, Copy, Debug, PartialEq)]
enum EmulatorCommand {
    Advance { millis: u64 },
    Mains { connected: bool },
    Frequency { hz: f64 },
    Jitter { micros: u32 },
}

pub struct Session {
    executor: CommandExecutor<EmulatedRelay>,
    mains: MainsSimulator,
    now: Ticks,
    telemetry_cursor: Option<EventId>,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    pub fn new(profile: TranscriptProfile, seed: u64) -> io::Result<Self> {
        let mut session = Self::detached(seed, MainsProfile::default());
        session.transcript = Some(TranscriptLogger::new(profile)?);
        Ok(session)
    }

    /// Session that keeps no transcript.
    pub fn detached(seed: u64, mains: MainsProfile) -> Self {
        let config = ZeroCrossConfig::default().with_ticks_per_second(TICKS_PER_SECOND);
        let relay = ZeroCrossRelay::new(config, HostRelay::default())
            .expect("default emulator configuration is valid");

        Self {
            executor: CommandExecutor::new(relay),
            mains: MainsSimulator::new(seed, mains, 0),
            now: 0,
            telemetry_cursor: None,
            transcript: None,
        }
    }

    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn relay(&self) -> &EmulatedRelay {
        self.executor.control()
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.log(TranscriptRole::Host, trimmed)?;

        let mut responses = match parse_emulator_command(trimmed) {
            Some(Ok(command)) => self.apply(command),
            Some(Err(message)) => vec![format!("ERR {message}")],
            None => self.execute_relay_command(trimmed),
        };
        responses.extend(self.drain_telemetry());

        for response in &responses {
            self.log(TranscriptRole::Emulator, response)?;
        }
        Ok(responses)
    }

    fn apply(&mut self, command: EmulatorCommand) -> Vec<String> {
        match command {
            EmulatorCommand::Advance { millis } => {
                let target = (millis <= MAX_ADVANCE_MS)
                    .then(|| millis * (TICKS_PER_SECOND / 1_000))
                    .and_then(|ticks| self.now.checked_add(ticks));
                let Some(target) = target else {
                    return vec![format!("ERR advance is limited to {MAX_ADVANCE_MS} ms")];
                };
                self.advance_to(target);
                vec![self.clock_line()]
            }
            EmulatorCommand::Mains { connected } => {
                self.mains.set_connected(connected, self.now);
                vec![format!(
                    "mains {}",
                    if connected { "connected" } else { "disconnected" }
                )]
            }
            EmulatorCommand::Frequency { hz } => {
                self.mains.set_frequency(hz);
                vec![format!("mains freq={hz:.2}Hz")]
            }
            EmulatorCommand::Jitter { micros } => {
                self.mains.set_jitter(micros);
                vec![format!("mains jitter={micros}us")]
            }
        }
    }

    fn execute_relay_command(&mut self, line: &str) -> Vec<String> {
        match self.executor.execute(line, self.now) {
            Ok(outcome) => {
                let show_emulator_help = matches!(outcome, CommandOutcome::Help(None));
                let mut lines: Vec<String> =
                    outcome.to_string().lines().map(str::to_owned).collect();
                if show_emulator_help {
                    lines.extend(EMULATOR_HELP.iter().map(|line| format!("  {line}")));
                }
                lines
            }
            Err(err) => vec![format!("ERR {err}")],
        }
    }

    /// Replays mains edges and relay deadlines in time order up to `target`.
    fn advance_to(&mut self, target: Ticks) {
        let mut stalled = false;
        loop {
            let edge_at = self.mains.next_edge_at().filter(|at| *at <= target);
            let deadline = self
                .relay()
                .next_deadline()
                .map(|deadline| deadline.max(self.now))
                .filter(|at| *at <= target && !stalled);

            match (edge_at, deadline) {
                (None, None) => break,
                (Some(edge), Some(deadline)) if deadline <= edge => {
                    stalled = self.poll_at(deadline);
                }
                (None, Some(deadline)) => stalled = self.poll_at(deadline),
                (Some(_), _) => {
                    if let Some(edge) = self.mains.pop_edge() {
                        self.feed_edge(edge);
                    }
                    stalled = false;
                }
            }
        }

        self.now = target;
        self.executor.control_mut().poll(target);
    }

    /// Returns `true` when the poll left the same deadline outstanding.
    fn poll_at(&mut self, deadline: Ticks) -> bool {
        self.now = deadline;
        let relay = self.executor.control_mut();
        relay.poll(deadline);
        relay.next_deadline().is_some_and(|next| next <= deadline)
    }

    fn feed_edge(&mut self, edge: SignalEdge) {
        self.now = edge.at;
        let relay = self.executor.control_mut();
        relay.on_raw_signal(edge.level_high, edge.at);
        relay.poll(edge.at);
    }

    fn drain_telemetry(&mut self) -> Vec<String> {
        let telemetry = self.executor.control().telemetry();
        let lines = telemetry
            .since(self.telemetry_cursor)
            .map(format_record)
            .collect();
        if let Some(latest) = telemetry.latest() {
            self.telemetry_cursor = Some(latest.id);
        }
        lines
    }

    fn clock_line(&self) -> String {
        let relay = self.relay();
        let estimate = relay.estimator().estimate();
        let mains = if estimate.valid {
            format!("{:.2}Hz locked", estimate.frequency_hz)
        } else {
            "unlocked".to_string()
        };
        format!(
            "t={}ms relay={} mains={}",
            millis(self.now),
            relay.relay_state(),
            mains
        )
    }

    fn log(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(self.now, role, line),
            None => Ok(()),
        }
    }
}

fn parse_emulator_command(line: &str) -> Option<Result<EmulatorCommand, String>> {
    let mut words = line.split_whitespace();
    let head = words.next()?;

    if head.eq_ignore_ascii_case("advance") {
        let millis = words
            .next()
            .map(|value| value.strip_suffix("ms").unwrap_or(value))
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|_| words.next().is_none());
        return Some(
            millis
                .map(|millis| EmulatorCommand::Advance { millis })
                .ok_or_else(|| "usage: advance <ms>".to_string()),
        );
    }

    if !head.eq_ignore_ascii_case("mains") {
        return None;
    }

    let argument = words.next().unwrap_or_default();
    if words.next().is_some() {
        return Some(Err("usage: mains on|off|freq=<hz>|jitter=<us>".to_string()));
    }
    let command = if argument.eq_ignore_ascii_case("on") {
        Ok(EmulatorCommand::Mains { connected: true })
    } else if argument.eq_ignore_ascii_case("off") {
        Ok(EmulatorCommand::Mains { connected: false })
    } else if let Some(value) = argument.strip_prefix("freq=") {
        value
            .parse::<f64>()
            .ok()
            .filter(|hz| FREQUENCY_RANGE.contains(hz))
            .map(|hz| EmulatorCommand::Frequency { hz })
            .ok_or_else(|| format!("invalid mains frequency `{value}`"))
    } else if let Some(value) = argument.strip_prefix("jitter=") {
        value
            .parse::<u32>()
            .map(|micros| EmulatorCommand::Jitter { micros })
            .map_err(|_| format!("invalid jitter `{value}`"))
    } else {
        Err("usage: mains on|off|freq=<hz>|jitter=<us>".to_string())
    };
    Some(command)
}

fn format_record(record: &TelemetryRecord) -> String {
    let detail = match record.details {
        TelemetryPayload::None => String::new(),
        TelemetryPayload::Frequency(frequency) => format!(
            " freq={}.{:03}Hz half-cycle={}ms",
            frequency.millihertz / 1_000,
            frequency.millihertz % 1_000,
            millis(frequency.half_cycle_ticks)
        ),
        TelemetryPayload::Toggle(toggle) => match toggle.lateness {
            Some(lateness) => format!(" target={}ms late={lateness}us", millis(toggle.target)),
            None => format!(
                " target={}ms{}",
                millis(toggle.target),
                if toggle.replaced { " (replaced)" } else { "" }
            ),
        },
        TelemetryPayload::Miss(miss) => format!(
            " target={}ms reason={}",
            millis(miss.target),
            miss.reason.label()
        ),
        TelemetryPayload::Burst(burst) => match burst.flip_point {
            Some(flip_point) => format!(" duty={flip_point}/20"),
            None => " off".to_string(),
        },
    };
    format!(
        "[{:>10}ms] #{} {}{}",
        millis(record.timestamp),
        record.id,
        record.event,
        detail
    )
}

fn millis(micros: Ticks) -> String {
    format!("{}.{:03}", micros / 1_000, micros % 1_000)
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# {}", profile.header())?;
        writeln!(logger.writer, "# Timestamps are virtual milliseconds")?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, now: Ticks, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            now / 1_000,
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
