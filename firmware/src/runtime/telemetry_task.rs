use embassy_time::{Duration, Ticker};
use heapless::Vec;
use zero_cross_core::telemetry::{EventId, TelemetryRecord};

use super::SharedController;
use crate::{status, telemetry};

const DRAIN_PERIOD: Duration = Duration::from_millis(100);
/// Drain periods between heartbeat lines.
const HEARTBEAT_EVERY: u32 = 10;
/// Records copied out per critical section.
const DRAIN_BATCH: usize = 16;

/// Drains the controller's telemetry ring to the log.
#[embassy_executor::task]
pub async fn run(controller: &'static SharedController) -> ! {
    let mut ticker = Ticker::every(DRAIN_PERIOD);
    let mut cursor: Option<EventId> = None;
    let mut periods = 0u32;

    loop {
        ticker.next().await;

        let (batch, estimate, stats, ticks_per_second) = controller.lock(|cell| {
            let relay = cell.borrow();
            let mut batch: Vec<TelemetryRecord, DRAIN_BATCH> = Vec::new();
            for record in relay.telemetry().since(cursor) {
                if batch.push(*record).is_err() {
                    break;
                }
            }
            (
                batch,
                relay.estimator().estimate(),
                relay.stats().snapshot(),
                relay.config().ticks_per_second,
            )
        });

        for record in &batch {
            if let Some(previous) = cursor {
                let skipped = record.id.wrapping_sub(previous).wrapping_sub(1);
                if skipped > 0 {
                    telemetry::log_dropped(skipped);
                }
            }
            cursor = Some(record.id);
            telemetry::log_record(record, ticks_per_second);
        }

        status::record_estimate(&estimate);

        periods += 1;
        if periods >= HEARTBEAT_EVERY {
            periods = 0;
            telemetry::log_heartbeat(&status::heartbeat(), &stats);
        }
    }
}
