use embassy_time::Instant;
use zero_cross_core::repl::commands::CommandExecutor;

use super::{REPL_RX_QUEUE, REPL_TX_QUEUE, RELAY_WAKE, SharedController};
use crate::repl::{self, ReplSession, SharedControl};

#[embassy_executor::task]
pub async fn run(controller: &'static SharedController) -> ! {
    let executor = CommandExecutor::new(SharedControl::new(controller));
    let mut session = ReplSession::new(executor);
    let rx = REPL_RX_QUEUE.receiver();
    let tx = REPL_TX_QUEUE.sender();

    loop {
        let frame = rx.receive().await;
        tx.send(frame.clone()).await;

        for &byte in &frame {
            let now = Instant::now().as_ticks();
            let Some(reply) = session.ingest(byte, now) else {
                continue;
            };
            // Requests may have armed or cancelled a toggle.
            RELAY_WAKE.signal(());
            for out in repl::frames("\r\n").chain(repl::frames(&reply)) {
                tx.send(out).await;
            }
        }
    }
}
