use zero_cross_core::config::ZeroCrossConfig;
use zero_cross_core::controller::ZeroCrossRelay;
use zero_cross_core::repl::commands::{CommandError, CommandExecutor, CommandOutcome};
use zero_cross_core::scheduler::{NoopRelayDriver, PollOutcome, ScheduleError};
use zero_cross_core::{RelayState, Ticks};

type Executor = CommandExecutor<ZeroCrossRelay<NoopRelayDriver, 16>>;

fn executor() -> Executor {
    let relay = ZeroCrossRelay::new(
        ZeroCrossConfig::default().with_ticks_per_second(10_000),
        NoopRelayDriver,
    )
    .expect("valid config");
    CommandExecutor::new(relay)
}

fn feed_crossings(executor: &mut Executor, timestamps: &[Ticks]) {
    for &timestamp in timestamps {
        let relay = executor.control_mut();
        relay.on_raw_signal(true, timestamp);
        relay.on_raw_signal(false, timestamp + 5);
        relay.poll(timestamp + 5);
    }
}

#[test]
fn relay_on_waits_for_lock_then_switches_at_crossing() {
    let mut executor = executor();

    match executor.execute("relay on", 0) {
        Err(CommandError::Schedule(ScheduleError::NotReady)) => {}
        other => panic!("unexpected result before lock: {other:?}"),
    }

    feed_crossings(&mut executor, &[0, 100, 200]);
    let reply = executor.execute("relay on", 250).expect("relay on");
    assert_eq!(reply.to_string(), "relay on armed for tick 300");

    let status = executor.execute("status", 250).expect("status").to_string();
    assert!(status.starts_with("relay state=off scheduler=armed next=on@5.0ms"));
    assert!(status.contains("mains lock=valid freq=50.00Hz half-cycle=10.0ms"));

    assert!(matches!(
        executor.control_mut().poll(300),
        PollOutcome::Fired { .. }
    ));
    assert_eq!(executor.control().relay_state(), RelayState::On);
}

#[test]
fn burst_mode_cycles_relay_at_crossings() {
    let mut executor = executor();
    feed_crossings(&mut executor, &[0, 100, 200]);

    let reply = executor.execute("burst duty=10", 210).expect("burst");
    assert_eq!(reply.to_string(), "burst duty=10/20");

    let mut fired = 0;
    for index in 3..43 {
        let timestamp = index * 100;
        if matches!(executor.control_mut().poll(timestamp), PollOutcome::Fired { .. }) {
            fired += 1;
        }
        let relay = executor.control_mut();
        relay.on_raw_signal(true, timestamp);
        relay.on_raw_signal(false, timestamp + 5);
    }
    assert!(fired >= 2);

    let status = executor.execute("status", 4_300).expect("status").to_string();
    assert!(status.contains("burst duty=10/20 (50%)"));

    executor.execute("relay off now", 4_300).expect("relay off now");
    assert_eq!(executor.control().burst(), None);
    assert_eq!(executor.control().relay_state(), RelayState::Off);
}

#[test]
fn stats_reset_clears_counters() {
    let mut executor = executor();
    feed_crossings(&mut executor, &[0, 100, 200]);

    let before = executor.execute("stats", 210).expect("stats").to_string();
    assert!(before.starts_with("counters edges=3 triggers=6"));

    assert_eq!(
        executor.execute("STATS RESET", 220).expect("reset"),
        CommandOutcome::StatsReset
    );
    let after = executor.execute("stats", 230).expect("stats").to_string();
    assert!(after.starts_with("counters edges=0 triggers=0"));
    assert!(after.contains("freq=50.00Hz"));
}

#[test]
fn errors_render_operator_hints() {
    let mut executor = executor();
    let error = executor.execute("burst duty=25", 0).expect_err("out of range");
    assert!(matches!(error, CommandError::Burst(_)));

    let error = executor.execute("bogus", 0).expect_err("unknown command");
    assert_eq!(error.to_string(), "expected command at column 1");
}
