use embassy_stm32::exti::ExtiInput;
use embassy_time::Instant;

use super::{RELAY_WAKE, SharedController};
use crate::status;

/// Timestamps every transition of the sense input and feeds the controller.
#[embassy_executor::task]
pub async fn run(mut sense: ExtiInput<'static>, controller: &'static SharedController) -> ! {
    loop {
        sense.wait_for_any_edge().await;
        let now = Instant::now().as_ticks();
        let level_high = sense.is_high();

        let accepted = controller.lock(|cell| cell.borrow_mut().on_raw_signal(level_high, now));
        if let Some(edge) = accepted {
            status::record_edge(edge.timestamp);
            RELAY_WAKE.signal(());
        }
    }
}
