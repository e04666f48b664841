//! Integration test: intermediary retry budget under the async driver.
//!
//! The launcher below never answers by itself. Completions are delivered
//! later through the driver's command channel, the way a real transport
//! reports circuit builds that take several seconds.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use monetor_onion::circuit::{CircuitEvent, CircuitLauncher, ExtendInfo, IntermediaryCircuit};
use monetor_onion::intermediary::{IntermediaryCandidate, IntermediaryRegistry, Reachability};
use monetor_onion::INTERMEDIARY_MAX_RETRIES;
use monetor_payment::config::PaymentConfig;
use monetor_payment::driver::{self, DriverCommand};
use monetor_payment::funds::FundsSource;
use monetor_payment::scheduler::PaymentScheduler;
use monetor_types::payment::{Descriptor, Party, Position};
use monetor_types::PublicKey;

/// Launcher whose builds stay outstanding until the test resolves them.
#[derive(Clone, Default)]
struct SlowLauncher {
    launched: Arc<Mutex<Vec<ExtendInfo>>>,
}

impl SlowLauncher {
    fn count(&self) -> usize {
        self.launched.lock().expect("lock").len()
    }
}

impl CircuitLauncher for SlowLauncher {
    fn launch(&mut self, extend_info: &ExtendInfo) -> monetor_onion::Result<()> {
        self.launched.lock().expect("lock").push(extend_info.clone());
        Ok(())
    }
}

struct AlwaysFunded;

impl FundsSource for AlwaysFunded {
    fn has_enough_funds(&mut self) -> monetor_payment::Result<bool> {
        Ok(true)
    }
}

fn candidate(id: u8, position: Position) -> IntermediaryCandidate {
    let identity = PublicKey([id; 32]);
    IntermediaryCandidate {
        identity,
        nickname: format!("int{id}"),
        extend_info: ExtendInfo {
            identity,
            onion_key: [id; 32],
            addr: format!("198.51.100.{id}:9001"),
        },
        desc: Descriptor::new(u64::from(id), Party::Intermediary),
        position,
    }
}

#[tokio::test(start_paused = true)]
async fn slow_builds_are_never_launched_twice() {
    let launcher = SlowLauncher::default();
    let scheduler = PaymentScheduler::new(PaymentConfig::default(), launcher.clone(), AlwaysFunded);
    let (handle, task) = driver::spawn(scheduler, 1_700_000_000);

    handle
        .send(DriverCommand::Select(candidate(1, Position::Middle)))
        .await
        .expect("select");

    // Ten ticks pass while the first build is outstanding.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(launcher.count(), 1);

    let leg = launcher.launched.lock().expect("lock")[0].clone();
    handle
        .circuit_event(CircuitEvent::Opened(IntermediaryCircuit::new(leg.clone())))
        .await
        .expect("opened");
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(launcher.count(), 1);

    handle.shutdown();
    let scheduler = task.await.expect("join");
    let entry = scheduler.registry().get(&leg.address()).expect("entry");
    assert_eq!(entry.reachable(), Reachability::Yes);
    assert_eq!(entry.circuit_retries(), 0);
    assert!(!entry.launch_in_flight());
}

#[tokio::test(start_paused = true)]
async fn late_open_after_exhaustion_is_ignored() {
    let launcher = SlowLauncher::default();
    let scheduler = PaymentScheduler::new(PaymentConfig::default(), launcher.clone(), AlwaysFunded);
    let (handle, task) = driver::spawn(scheduler, 1_700_000_000);
    let target = candidate(2, Position::Exit);
    let addr = target.extend_info.address();
    handle
        .send(DriverCommand::Select(target))
        .await
        .expect("select");

    for _ in 0..INTERMEDIARY_MAX_RETRIES {
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle
            .circuit_event(CircuitEvent::Failed { addr })
            .await
            .expect("failed");
    }
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(launcher.count(), 3);

    // A build the transport finished after the budget ran out.
    let leg = launcher.launched.lock().expect("lock")[0].clone();
    handle
        .circuit_event(CircuitEvent::Opened(IntermediaryCircuit::new(leg)))
        .await
        .expect("late open");
    tokio::time::sleep(Duration::from_secs(2)).await;

    handle.shutdown();
    let scheduler = task.await.expect("join");
    let entry = scheduler.registry().get(&addr).expect("entry");
    assert_eq!(entry.reachable(), Reachability::No);
    assert_eq!(launcher.count(), 3);
}

#[test]
fn retry_counter_tracks_unreachable_state() {
    let mut registry = IntermediaryRegistry::new();
    let target = candidate(3, Position::Middle);
    let addr = target.extend_info.address();
    registry.select(target, 0);

    // Any run of failures, including ones with no launch outstanding.
    for delivered in 1..=10u32 {
        registry.on_circuit_failed(&addr);
        let entry = registry.get(&addr).expect("entry");
        assert!(entry.circuit_retries() <= INTERMEDIARY_MAX_RETRIES);
        assert_eq!(entry.circuit_retries(), delivered.min(INTERMEDIARY_MAX_RETRIES));
        assert_eq!(
            entry.reachable() == Reachability::No,
            entry.circuit_retries() == INTERMEDIARY_MAX_RETRIES
        );
    }

    // Re-selection is the only way back.
    registry.select(candidate(3, Position::Middle), 50);
    let entry = registry.get(&addr).expect("entry");
    assert_eq!(entry.reachable(), Reachability::Maybe);
    assert_eq!(entry.circuit_retries(), 0);
}
