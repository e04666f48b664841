//! Async driver for the payment scheduler.
//!
//! One task owns the [`PaymentScheduler`] and is the only writer of the
//! intermediary registry. It ticks once per second and applies commands
//! (circuit completions, selections, payment demand) between ticks.
//!
//! ```text
//! transport --CircuitEvent--+
//! selector  --Select--------+--> mpsc --> driver task --> watch<TickReport>
//! channels  --Demand--------+                 ^
//!                              interval(1s) --+
//! ```

use std::time::Duration;

use monetor_onion::circuit::{CircuitEvent, CircuitLauncher};
use monetor_onion::intermediary::IntermediaryCandidate;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::funds::FundsSource;
use crate::scheduler::{PaymentScheduler, TickReport};
use crate::{PaymentError, Result};

/// Scheduler tick period.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Command queue depth.
const COMMAND_BUFFER: usize = 256;

/// Work delivered to the driver task.
#[derive(Debug)]
pub enum DriverCommand {
    /// A circuit build finished.
    Circuit(CircuitEvent),
    /// Register a selected intermediary.
    Select(IntermediaryCandidate),
    /// Payment paths are wanted.
    RequestPaymentPath,
}

/// Handle to a running driver.
pub struct DriverHandle {
    commands: mpsc::Sender<DriverCommand>,
    reports: watch::Receiver<TickReport>,
    shutdown: broadcast::Sender<()>,
}

impl DriverHandle {
    /// Queue a command for the driver task.
    ///
    /// # Errors
    ///
    /// [`PaymentError::DriverStopped`] if the task has exited.
    pub async fn send(&self, command: DriverCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PaymentError::DriverStopped)
    }

    /// Deliver a circuit completion event.
    ///
    /// # Errors
    ///
    /// [`PaymentError::DriverStopped`] if the task has exited.
    pub async fn circuit_event(&self, event: CircuitEvent) -> Result<()> {
        self.send(DriverCommand::Circuit(event)).await
    }

    /// Report of the most recent tick.
    pub fn latest_report(&self) -> TickReport {
        self.reports.borrow().clone()
    }

    /// Watch tick reports as they are produced.
    pub fn subscribe_reports(&self) -> watch::Receiver<TickReport> {
        self.reports.clone()
    }

    /// Ask the driver task to stop after its current step.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Start the driver on the current tokio runtime.
///
/// `start_unix` is the Unix time corresponding to the first tick; later
/// tick times advance with the runtime clock. The join handle yields the
/// scheduler back once the driver stops.
pub fn spawn<L, F>(
    scheduler: PaymentScheduler<L, F>,
    start_unix: u64,
) -> (DriverHandle, JoinHandle<PaymentScheduler<L, F>>)
where
    L: CircuitLauncher + Send + 'static,
    F: FundsSource + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (report_tx, report_rx) = watch::channel(TickReport::default());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let task = tokio::spawn(run(scheduler, command_rx, report_tx, shutdown_rx, start_unix));
    let handle = DriverHandle {
        commands: command_tx,
        reports: report_rx,
        shutdown: shutdown_tx,
    };
    (handle, task)
}

/// Drive `scheduler` until shutdown or until every command sender is gone.
pub async fn run<L, F>(
    mut scheduler: PaymentScheduler<L, F>,
    mut commands: mpsc::Receiver<DriverCommand>,
    reports: watch::Sender<TickReport>,
    mut shutdown: broadcast::Receiver<()>,
    start_unix: u64,
) -> PaymentScheduler<L, F>
where
    L: CircuitLauncher,
    F: FundsSource,
{
    let started = Instant::now();
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(start_unix, "Payment driver started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = start_unix.saturating_add(started.elapsed().as_secs());
                let report = scheduler.tick(now);
                // No subscribers is fine.
                let _ = reports.send(report);
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("Command channel closed");
                    break;
                };
                apply(&mut scheduler, command, start_unix, started);
            }
            _ = shutdown.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Payment driver stopped");
    scheduler
}

fn apply<L, F>(
    scheduler: &mut PaymentScheduler<L, F>,
    command: DriverCommand,
    start_unix: u64,
    started: Instant,
) where
    L: CircuitLauncher,
    F: FundsSource,
{
    match command {
        DriverCommand::Circuit(event) => {
            scheduler.handle_event(&event);
        }
        DriverCommand::Select(candidate) => {
            let now = start_unix.saturating_add(started.elapsed().as_secs());
            scheduler.select(candidate, now);
        }
        DriverCommand::RequestPaymentPath => scheduler.request_payment_path(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentConfig;
    use monetor_onion::circuit::{ExtendInfo, IntermediaryCircuit};
    use monetor_onion::intermediary::Reachability;
    use monetor_types::payment::{Descriptor, Party, Position};
    use monetor_types::PublicKey;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedLauncher {
        launched: Arc<Mutex<Vec<ExtendInfo>>>,
    }

    impl SharedLauncher {
        fn count(&self) -> usize {
            self.launched.lock().expect("lock").len()
        }
    }

    impl CircuitLauncher for SharedLauncher {
        fn launch(&mut self, extend_info: &ExtendInfo) -> monetor_onion::Result<()> {
            self.launched.lock().expect("lock").push(extend_info.clone());
            Ok(())
        }
    }

    struct Enough;

    impl FundsSource for Enough {
        fn has_enough_funds(&mut self) -> Result<bool> {
            Ok(true)
        }
    }

    fn extend_info() -> ExtendInfo {
        ExtendInfo {
            identity: PublicKey([5; 32]),
            onion_key: [5; 32],
            addr: "10.0.5.1:9001".to_string(),
        }
    }

    fn candidate() -> IntermediaryCandidate {
        IntermediaryCandidate {
            identity: PublicKey([5; 32]),
            nickname: "int5".to_string(),
            extend_info: extend_info(),
            desc: Descriptor::new(5, Party::Intermediary),
            position: Position::Middle,
        }
    }

    type TestTask = JoinHandle<PaymentScheduler<SharedLauncher, Enough>>;

    fn start(launcher: SharedLauncher) -> (DriverHandle, TestTask) {
        let config = PaymentConfig {
            demand_on_start: false,
            ..Default::default()
        };
        spawn(PaymentScheduler::new(config, launcher, Enough), 1_000)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_advance_with_clock() {
        let (handle, task) = start(SharedLauncher::default());
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let report = handle.latest_report();
        assert_eq!(report.now, 1_003);
        assert!(report.funds_ok);

        handle.shutdown();
        let scheduler = task.await.expect("join");
        assert!(scheduler.funds_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_exhausted() {
        let launcher = SharedLauncher::default();
        let (handle, task) = start(launcher.clone());
        handle
            .send(DriverCommand::Select(candidate()))
            .await
            .expect("select");

        for attempt in 1..=3 {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            assert_eq!(launcher.count(), attempt);
            handle
                .circuit_event(CircuitEvent::Failed {
                    addr: extend_info().address(),
                })
                .await
                .expect("event");
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(launcher.count(), 3);

        handle.shutdown();
        let scheduler = task.await.expect("join");
        let entry = scheduler
            .registry()
            .get(&extend_info().address())
            .expect("entry");
        assert_eq!(entry.reachable(), Reachability::No);
        assert_eq!(entry.circuit_retries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_event_marks_reachable() {
        let launcher = SharedLauncher::default();
        let (handle, task) = start(launcher.clone());
        handle
            .send(DriverCommand::Select(candidate()))
            .await
            .expect("select");
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle
            .circuit_event(CircuitEvent::Opened(IntermediaryCircuit::new(extend_info())))
            .await
            .expect("event");
        tokio::time::sleep(Duration::from_secs(2)).await;

        drop(handle);
        let scheduler = task.await.expect("join");
        assert!(scheduler.registry().has_reachable(Position::Middle));
        assert_eq!(launcher.count(), 1);
    }

    #[tokio::test]
    async fn test_send_after_stop_fails() {
        let (handle, task) = start(SharedLauncher::default());
        handle.shutdown();
        task.await.expect("join");
        assert!(matches!(
            handle.send(DriverCommand::RequestPaymentPath).await,
            Err(PaymentError::DriverStopped)
        ));
    }
}
