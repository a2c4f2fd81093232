//! Operator REPL session for the USB CDC console.
//!
//! Bytes from the host are assembled into lines, executed against the shared
//! controller through [`CommandExecutor`], and the rendered reply is split
//! into CDC-sized frames for the USB task.

use core::cell::RefCell;
use core::fmt::{self, Write as _};
use core::str;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{String, Vec};
use zero_cross_core::burst::BurstError;
use zero_cross_core::controller::ZeroCrossRelay;
use zero_cross_core::repl::commands::{CommandExecutor, RelayControl};
use zero_cross_core::repl::status::StatusSnapshot;
use zero_cross_core::scheduler::{RelayDriver, RequestOutcome, ScheduleError, ScheduledToggle};
use zero_cross_core::{RelayState, Ticks};

/// Maximum number of bytes accepted on a single REPL line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;
/// Largest rendered reply (`status` is the longest).
pub const MAX_REPLY_LEN: usize = 512;
/// Bytes per CDC packet.
pub const FRAME_LEN: usize = 64;

pub type ReplFrame = Vec<u8, FRAME_LEN>;
pub type Reply = String<MAX_REPLY_LEN>;

const PROMPT: &str = "> ";

/// Errors surfaced while assembling a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplError {
    /// Encountered non-UTF-8 data in the assembled line buffer.
    InvalidUtf8,
    /// Input exceeded [`MAX_LINE_LEN`].
    LineOverflow,
}

impl fmt::Display for ReplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplError::InvalidUtf8 => f.write_str("line is not valid UTF-8"),
            ReplError::LineOverflow => write!(f, "line longer than {MAX_LINE_LEN} bytes"),
        }
    }
}

/// [`RelayControl`] over the controller shared with the interrupt-driven tasks.
///
/// Every call holds the mutex only for the duration of one controller method.
pub struct SharedControl<'a, M: RawMutex, D, const TELEMETRY: usize> {
    controller: &'a Mutex<M, RefCell<ZeroCrossRelay<D, TELEMETRY>>>,
}

impl<'a, M: RawMutex, D, const TELEMETRY: usize> SharedControl<'a, M, D, TELEMETRY> {
    pub const fn new(controller: &'a Mutex<M, RefCell<ZeroCrossRelay<D, TELEMETRY>>>) -> Self {
        Self { controller }
    }
}

impl<M: RawMutex, D: RelayDriver, const TELEMETRY: usize> RelayControl
    for SharedControl<'_, M, D, TELEMETRY>
{
    fn request_relay(
        &mut self,
        state: RelayState,
        now: Ticks,
    ) -> Result<RequestOutcome, ScheduleError> {
        self.controller
            .lock(|cell| cell.borrow_mut().request(state, now))
    }

    fn force_relay(&mut self, state: RelayState, now: Ticks) -> Option<ScheduledToggle> {
        self.controller.lock(|cell| cell.borrow_mut().force(state, now))
    }

    fn set_burst(&mut self, flip_point: Option<u8>, now: Ticks) -> Result<(), BurstError> {
        self.controller
            .lock(|cell| cell.borrow_mut().set_burst(flip_point, now))
    }

    fn reset_stats(&mut self, now: Ticks) {
        self.controller.lock(|cell| cell.borrow_mut().reset_stats(now));
    }

    fn snapshot(&self, now: Ticks) -> StatusSnapshot {
        self.controller.lock(|cell| cell.borrow().snapshot(now))
    }
}

/// Maintains REPL state for the CDC console.
pub struct ReplSession<C> {
    executor: CommandExecutor<C>,
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl<C: RelayControl> ReplSession<C> {
    pub fn new(executor: CommandExecutor<C>) -> Self {
        Self {
            executor,
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    pub fn executor(&self) -> &CommandExecutor<C> {
        &self.executor
    }

    /// Clears partial input after the host reconnects.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }

    /// Feeds one byte; returns the reply once a line completes.
    pub fn ingest(&mut self, byte: u8, now: Ticks) -> Option<Reply> {
        match byte {
            b'\r' | b'\n' => self.finish_line(now),
            0x08 | 0x7f => {
                self.buffer.pop();
                None
            }
            value => {
                if self.buffer.push(value).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }

    fn finish_line(&mut self, now: Ticks) -> Option<Reply> {
        if self.buffer.is_empty() && !self.overflowed {
            return None;
        }

        let mut reply = Reply::new();
        if let Err(error) = self.run_line(now, &mut reply) {
            reply.clear();
            // Truncated output is still worth sending.
            let _ = write!(reply, "error: {error}");
        }
        let _ = reply.push_str("\r\n");
        let _ = reply.push_str(PROMPT);

        self.reset();
        Some(reply)
    }

    fn run_line(&mut self, now: Ticks, reply: &mut Reply) -> Result<(), ReplError> {
        if self.overflowed {
            return Err(ReplError::LineOverflow);
        }
        let line =
            str::from_utf8(self.buffer.as_slice()).map_err(|_| ReplError::InvalidUtf8)?;

        match self.executor.execute(line, now) {
            Ok(outcome) => {
                // Overflow only truncates the reply.
                let _ = write!(reply, "{outcome}");
                Ok(())
            }
            Err(error) => {
                let _ = write!(reply, "error: {error}");
                Ok(())
            }
        }
    }
}

/// Splits a reply into CDC frames.
pub fn frames(reply: &str) -> impl Iterator<Item = ReplFrame> + '_ {
    reply.as_bytes().chunks(FRAME_LEN).map(|chunk| {
        let mut frame = ReplFrame::new();
        // Chunks never exceed the frame capacity.
        let _ = frame.extend_from_slice(chunk);
        frame
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use zero_cross_core::config::{ActiveLevel, ZeroCrossConfig};

    use crate::relay::RelayPin;

    type Controller = ZeroCrossRelay<RelayPin, 16>;

    fn controller() -> Mutex<NoopRawMutex, RefCell<Controller>> {
        let config = ZeroCrossConfig::default().with_ticks_per_second(10_000);
        let relay = ZeroCrossRelay::new(config, RelayPin::new(ActiveLevel::High))
            .expect("valid config");
        Mutex::new(RefCell::new(relay))
    }

    fn feed<C: RelayControl>(session: &mut ReplSession<C>, line: &str, now: Ticks) -> Reply {
        let mut reply = None;
        for byte in line.bytes() {
            reply = session.ingest(byte, now).or(reply);
        }
        reply.expect("line produced a reply")
    }

    fn lock(shared: &Mutex<NoopRawMutex, RefCell<Controller>>) {
        for timestamp in [0, 100, 200] {
            shared.lock(|cell| {
                let mut relay = cell.borrow_mut();
                relay.on_raw_signal(true, timestamp);
                relay.on_raw_signal(false, timestamp + 5);
            });
        }
    }

    #[test]
    fn routes_complete_lines_through_shared_controller() {
        let shared = controller();
        lock(&shared);
        let mut session = ReplSession::new(CommandExecutor::new(SharedControl::new(&shared)));

        let reply = feed(&mut session, "relay on\r", 250);
        assert_eq!(reply.as_str(), "relay on armed for tick 300\r\n> ");

        shared.lock(|cell| {
            cell.borrow_mut().poll(300);
            assert_eq!(cell.borrow().relay_state(), RelayState::On);
            assert!(cell.borrow().driver().is_set_high());
        });
    }

    #[test]
    fn blank_lines_are_ignored() {
        let shared = controller();
        let mut session = ReplSession::new(CommandExecutor::new(SharedControl::new(&shared)));
        assert!(session.ingest(b'\r', 0).is_none());
        assert!(session.ingest(b'\n', 0).is_none());
    }

    #[test]
    fn backspace_edits_line() {
        let shared = controller();
        let mut session = ReplSession::new(CommandExecutor::new(SharedControl::new(&shared)));
        let reply = feed(&mut session, "statsx\x08\n", 0);
        assert!(reply.starts_with("counters edges=0"));
    }

    #[test]
    fn command_errors_are_reported_inline() {
        let shared = controller();
        let mut session = ReplSession::new(CommandExecutor::new(SharedControl::new(&shared)));
        let reply = feed(&mut session, "relay on\n", 0);
        assert!(reply.starts_with("error: no zero-cross lock"));
    }

    #[test]
    fn overflow_is_reported_once_line_ends() {
        let shared = controller();
        let mut session = ReplSession::new(CommandExecutor::new(SharedControl::new(&shared)));
        for _ in 0..=MAX_LINE_LEN {
            assert!(session.ingest(b'a', 0).is_none());
        }
        let reply = session.ingest(b'\n', 0).expect("reply");
        assert!(reply.starts_with("error: line longer than 96 bytes"));

        let reply = feed(&mut session, "help status\n", 0);
        assert!(reply.starts_with("status: "));
    }

    #[test]
    fn replies_split_into_frames() {
        let text = "x".repeat(FRAME_LEN * 2 + 3);
        let sizes: std::vec::Vec<usize> = frames(&text).map(|frame| frame.len()).collect();
        assert_eq!(sizes, [FRAME_LEN, FRAME_LEN, 3]);
    }
}
