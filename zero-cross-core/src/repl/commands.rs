//! High-level REPL command dispatcher.
//!
//! Parsed commands are applied to any [`RelayControl`] implementor: the
//! controller itself on the host, or a handle around the shared controller
//! mutex on the firmware. Outcomes render through `Display` so every front
//! end prints the same text.

use core::fmt;

use super::catalog::{self, CommandSpec};
use super::grammar::{self, BurstCommand, Command, StatsCommand};
use super::status::{StatusFormatter, StatusSnapshot, write_counters};
use crate::burst::{BURST_WINDOW, BurstError};
use crate::controller::ZeroCrossRelay;
use crate::scheduler::{RelayDriver, RequestOutcome, ScheduleError, ScheduledToggle};
use crate::stats::StatsSnapshot;
use crate::{RelayState, Ticks};

/// Operations the REPL needs from the relay controller.
pub trait RelayControl {
    fn request_relay(
        &mut self,
        state: RelayState,
        now: Ticks,
    ) -> Result<RequestOutcome, ScheduleError>;

    fn force_relay(&mut self, state: RelayState, now: Ticks) -> Option<ScheduledToggle>;

    fn set_burst(&mut self, flip_point: Option<u8>, now: Ticks) -> Result<(), BurstError>;

    fn reset_stats(&mut self, now: Ticks);

    fn snapshot(&self, now: Ticks) -> StatusSnapshot;
}

impl<D: RelayDriver, const TELEMETRY: usize> RelayControl for ZeroCrossRelay<D, TELEMETRY> {
    fn request_relay(
        &mut self,
        state: RelayState,
        now: Ticks,
    ) -> Result<RequestOutcome, ScheduleError> {
        self.request(state, now)
    }

    fn force_relay(&mut self, state: RelayState, now: Ticks) -> Option<ScheduledToggle> {
        self.force(state, now)
    }

    fn set_burst(&mut self, flip_point: Option<u8>, now: Ticks) -> Result<(), BurstError> {
        ZeroCrossRelay::set_burst(self, flip_point, now)
    }

    fn reset_stats(&mut self, now: Ticks) {
        ZeroCrossRelay::reset_stats(self, now);
    }

    fn snapshot(&self, now: Ticks) -> StatusSnapshot {
        ZeroCrossRelay::snapshot(self, now)
    }
}

/// Command execution successes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommandOutcome {
    Relay(RelayAck),
    Burst(BurstAck),
    Stats(StatsView),
    StatsReset,
    Status(StatusSnapshot),
    Help(Option<&'static CommandSpec>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayAck {
    Scheduled(RequestOutcome),
    Switched {
        state: RelayState,
        superseded: Option<ScheduledToggle>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BurstAck {
    pub flip_point: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatsView {
    pub stats: StatsSnapshot,
    pub ticks_per_second: u64,
}

/// Errors surfaced while executing a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError),
    UnknownTopic(&'a str),
    Schedule(ScheduleError),
    Burst(BurstError),
}

impl From<grammar::ParseError> for CommandError<'_> {
    fn from(error: grammar::ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<ScheduleError> for CommandError<'_> {
    fn from(error: ScheduleError) -> Self {
        Self::Schedule(error)
    }
}

impl From<BurstError> for CommandError<'_> {
    fn from(error: BurstError) -> Self {
        Self::Burst(error)
    }
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => write!(f, "{error}"),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
            CommandError::Schedule(error) => write!(f, "{error}"),
            CommandError::Burst(error) => write!(f, "{error}"),
        }
    }
}

/// Dispatches REPL commands into a [`RelayControl`].
pub struct CommandExecutor<C> {
    control: C,
}

impl<C: RelayControl> CommandExecutor<C> {
    pub const fn new(control: C) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    pub fn into_inner(self) -> C {
        self.control
    }

    /// Parses and executes one line.
    pub fn execute<'a>(
        &mut self,
        line: &'a str,
        now: Ticks,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        let command = grammar::parse(line)?;
        self.execute_command(command, now)
    }

    pub fn execute_command<'a>(
        &mut self,
        command: Command<'a>,
        now: Ticks,
    ) -> Result<CommandOutcome, CommandError<'a>> {
        match command {
            Command::Relay(args) if args.immediate => {
                let superseded = self.control.force_relay(args.state, now);
                Ok(CommandOutcome::Relay(RelayAck::Switched {
                    state: args.state,
                    superseded,
                }))
            }
            Command::Relay(args) => {
                let outcome = self.control.request_relay(args.state, now)?;
                Ok(CommandOutcome::Relay(RelayAck::Scheduled(outcome)))
            }
            Command::Burst(burst) => {
                let flip_point = match burst {
                    BurstCommand::Duty(flip_point) => Some(flip_point),
                    BurstCommand::Off => None,
                };
                self.control.set_burst(flip_point, now)?;
                Ok(CommandOutcome::Burst(BurstAck { flip_point }))
            }
            Command::Stats(StatsCommand::Show) => {
                let snapshot = self.control.snapshot(now);
                Ok(CommandOutcome::Stats(StatsView {
                    stats: snapshot.stats,
                    ticks_per_second: snapshot.ticks_per_second,
                }))
            }
            Command::Stats(StatsCommand::Reset) => {
                self.control.reset_stats(now);
                Ok(CommandOutcome::StatsReset)
            }
            Command::Status => Ok(CommandOutcome::Status(self.control.snapshot(now))),
            Command::Help(help) => match help.topic {
                None => Ok(CommandOutcome::Help(None)),
                Some(topic) => catalog::find(topic)
                    .map(|spec| CommandOutcome::Help(Some(spec)))
                    .ok_or(CommandError::UnknownTopic(topic)),
            },
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Relay(RelayAck::Scheduled(outcome)) => {
                let toggle = outcome.toggle();
                let verb = match outcome {
                    RequestOutcome::Armed(_) => "armed",
                    RequestOutcome::Replaced { .. } => "re-armed",
                    RequestOutcome::Unchanged(_) => "already armed",
                };
                write!(
                    f,
                    "relay {} {verb} for tick {}",
                    toggle.target_state, toggle.target_timestamp
                )
            }
            CommandOutcome::Relay(RelayAck::Switched { state, superseded }) => {
                write!(f, "relay {state} now")?;
                if superseded.is_some() {
                    f.write_str(" (pending toggle cancelled)")?;
                }
                Ok(())
            }
            CommandOutcome::Burst(BurstAck {
                flip_point: Some(flip_point),
            }) => write!(f, "burst duty={flip_point}/{BURST_WINDOW}"),
            CommandOutcome::Burst(BurstAck { flip_point: None }) => f.write_str("burst off"),
            CommandOutcome::Stats(view) => write_counters(f, &view.stats, view.ticks_per_second),
            CommandOutcome::StatsReset => f.write_str("counters reset"),
            CommandOutcome::Status(snapshot) => StatusFormatter::new(snapshot).write_all(f),
            CommandOutcome::Help(Some(spec)) => write!(f, "{}: {}", spec.usage, spec.summary),
            CommandOutcome::Help(None) => {
                f.write_str("commands:")?;
                for spec in catalog::commands() {
                    write!(f, "\r\n  {}", spec.usage)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;
    use std::vec::Vec;

    use super::*;
    use crate::config::ZeroCrossConfig;
    use crate::scheduler::NoopRelayDriver;

    #[derive(Default)]
    struct RecordingControl {
        requests: Vec<(RelayState, Ticks)>,
        forced: Vec<RelayState>,
        burst: Option<u8>,
        resets: usize,
    }

    impl RelayControl for RecordingControl {
        fn request_relay(
            &mut self,
            state: RelayState,
            now: Ticks,
        ) -> Result<RequestOutcome, ScheduleError> {
            self.requests.push((state, now));
            Ok(RequestOutcome::Armed(ScheduledToggle {
                target_timestamp: now + 10,
                target_state: state,
                requested_at: now,
            }))
        }

        fn force_relay(&mut self, state: RelayState, _now: Ticks) -> Option<ScheduledToggle> {
            self.forced.push(state);
            None
        }

        fn set_burst(&mut self, flip_point: Option<u8>, _now: Ticks) -> Result<(), BurstError> {
            if let Some(flip_point) = flip_point.filter(|value| *value > BURST_WINDOW) {
                return Err(BurstError::FlipPointOutOfRange { flip_point });
            }
            self.burst = flip_point;
            Ok(())
        }

        fn reset_stats(&mut self, _now: Ticks) {
            self.resets += 1;
        }

        fn snapshot(&self, now: Ticks) -> StatusSnapshot {
            let relay = ZeroCrossRelay::<_, 4>::new(ZeroCrossConfig::default(), NoopRelayDriver)
                .expect("valid config");
            relay.snapshot(now)
        }
    }

    #[test]
    fn relay_command_requests_synchronised_switch() {
        let mut executor = CommandExecutor::new(RecordingControl::default());
        let outcome = executor.execute("relay on", 40).expect("relay on");
        assert_eq!(executor.control().requests, [(RelayState::On, 40)]);
        assert_eq!(format!("{outcome}"), "relay on armed for tick 50");
    }

    #[test]
    fn relay_now_forces_switch() {
        let mut executor = CommandExecutor::new(RecordingControl::default());
        let outcome = executor.execute("relay off now", 0).expect("relay off now");
        assert_eq!(executor.control().forced, [RelayState::Off]);
        assert!(executor.control().requests.is_empty());
        assert_eq!(format!("{outcome}"), "relay off now");
    }

    #[test]
    fn burst_duty_is_validated_by_control() {
        let mut executor = CommandExecutor::new(RecordingControl::default());
        executor.execute("burst duty=12", 0).expect("burst");
        assert_eq!(executor.control().burst, Some(12));

        match executor.execute("burst duty=21", 0) {
            Err(CommandError::Burst(BurstError::FlipPointOutOfRange { flip_point })) => {
                assert_eq!(flip_point, 21);
            }
            other => panic!("unexpected burst result: {other:?}"),
        }

        executor.execute("burst off", 0).expect("burst off");
        assert_eq!(executor.control().burst, None);
    }

    #[test]
    fn stats_reset_is_forwarded() {
        let mut executor = CommandExecutor::new(RecordingControl::default());
        let outcome = executor.execute("stats reset", 0).expect("stats reset");
        assert_eq!(outcome, CommandOutcome::StatsReset);
        assert_eq!(executor.control().resets, 1);
    }

    #[test]
    fn help_lists_catalog() {
        let mut executor = CommandExecutor::new(RecordingControl::default());
        let text = format!("{}", executor.execute("help", 0).expect("help"));
        for spec in catalog::commands() {
            assert!(text.contains(spec.usage));
        }

        match executor.execute("help teleport", 0) {
            Err(CommandError::UnknownTopic(topic)) => assert_eq!(topic, "teleport"),
            other => panic!("unexpected help result: {other:?}"),
        }
    }

    #[test]
    fn parse_errors_are_reported() {
        let mut executor = CommandExecutor::new(RecordingControl::default());
        match executor.execute("relay sideways", 0) {
            Err(error @ CommandError::Parse(_)) => {
                assert_eq!(
                    format!("{error}"),
                    "expected relay on|off [now] at column 7"
                );
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn drives_real_controller() {
        let relay = ZeroCrossRelay::<_, 8>::new(
            ZeroCrossConfig::default().with_ticks_per_second(10_000),
            NoopRelayDriver,
        )
        .expect("valid config");
        let mut executor = CommandExecutor::new(relay);

        match executor.execute("relay on", 0) {
            Err(CommandError::Schedule(ScheduleError::NotReady)) => {}
            other => panic!("unexpected relay result: {other:?}"),
        }

        executor.execute("relay on now", 0).expect("forced switch");
        assert_eq!(executor.control().relay_state(), RelayState::On);

        let status = format!("{}", executor.execute("status", 5).expect("status"));
        assert!(status.starts_with("relay state=on scheduler=idle"));
    }
}
