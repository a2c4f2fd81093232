use embassy_futures::select::select;
use embassy_time::{Instant, Timer};
use zero_cross_core::scheduler::PollOutcome;

use super::{RELAY_WAKE, SharedController};

/// Sleeps until the next toggle or loss-of-signal deadline, then polls.
#[embassy_executor::task]
pub async fn run(controller: &'static SharedController) -> ! {
    loop {
        let deadline = controller.lock(|cell| cell.borrow().next_deadline());
        match deadline {
            Some(ticks) => {
                select(Timer::at(Instant::from_ticks(ticks)), RELAY_WAKE.wait()).await;
            }
            None => RELAY_WAKE.wait().await,
        }

        let now = Instant::now().as_ticks();
        match controller.lock(|cell| cell.borrow_mut().poll(now)) {
            PollOutcome::Fired { toggle, lateness } => {
                defmt::debug!(
                    "relay: {} at t={} late={}t",
                    toggle.target_state.label(),
                    now,
                    lateness
                );
            }
            PollOutcome::Missed(missed) => {
                defmt::warn!(
                    "relay: dropped {} toggle ({})",
                    missed.toggle.target_state.label(),
                    missed.reason.label()
                );
            }
            PollOutcome::Idle | PollOutcome::Waiting { .. } => {}
        }
    }
}
