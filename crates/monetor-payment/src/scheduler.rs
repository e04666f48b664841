//! Once-per-second payment maintenance.
//!
//! [`PaymentScheduler::tick`] runs three steps in fixed order. Each step
//! absorbs and logs its own failures, so a broken funds source never stops
//! circuit launches or epoch maintenance, and a bad tick never stops the
//! next one.

use monetor_crypto::codec::addr_to_hex;
use monetor_onion::circuit::{CircuitEvent, CircuitLauncher};
use monetor_onion::intermediary::{
    IntermediaryCandidate, IntermediaryRegistry, Reachability, SelectOutcome,
};
use monetor_types::payment::Position;
use monetor_types::Address;
use tracing::{debug, info, warn};

use crate::config::PaymentConfig;
use crate::funds::FundsSource;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Effective time of the tick after clamping.
    pub now: u64,
    pub funds_ok: bool,
    /// Intermediaries a circuit launch was issued for.
    pub launched: Vec<Address>,
    /// Set when this tick entered a new channel epoch.
    pub rotated_epoch: Option<u64>,
    /// Intermediaries evicted for age.
    pub pruned: usize,
    /// Failures absorbed across all steps.
    pub errors: usize,
}

/// Owns the intermediary registry and drives it from the per-second tick.
pub struct PaymentScheduler<L, F> {
    config: PaymentConfig,
    registry: IntermediaryRegistry,
    launcher: L,
    funds: F,
    funds_ok: bool,
    demand: bool,
    last_tick: Option<u64>,
    epoch: Option<u64>,
}

impl<L, F> PaymentScheduler<L, F>
where
    L: CircuitLauncher,
    F: FundsSource,
{
    pub fn new(config: PaymentConfig, launcher: L, funds: F) -> Self {
        let demand = config.demand_on_start;
        Self {
            config,
            registry: IntermediaryRegistry::new(),
            launcher,
            funds,
            funds_ok: false,
            demand,
            last_tick: None,
            epoch: None,
        }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    pub fn registry(&self) -> &IntermediaryRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut IntermediaryRegistry {
        &mut self.registry
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn funds_mut(&mut self) -> &mut F {
        &mut self.funds
    }

    /// Fund sufficiency as of the last tick.
    pub fn funds_ok(&self) -> bool {
        self.funds_ok
    }

    /// Current channel epoch, once the first tick has run.
    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    /// Whether an explicit request for payment paths is outstanding.
    pub fn has_demand(&self) -> bool {
        self.demand
    }

    /// Ask for circuits to intermediaries on the next tick.
    ///
    /// The request stays outstanding until every position has a reachable
    /// intermediary.
    pub fn request_payment_path(&mut self) {
        if !self.demand {
            debug!("Payment path requested");
        }
        self.demand = true;
    }

    /// Register a selected intermediary at time `now`.
    pub fn select(&mut self, candidate: IntermediaryCandidate, now: u64) -> SelectOutcome {
        self.registry.select(candidate, now)
    }

    /// Deliver a circuit completion event to the registry.
    pub fn handle_event(&mut self, event: &CircuitEvent) -> Option<Reachability> {
        self.registry.handle_event(event)
    }

    /// Run one scheduling pass.
    ///
    /// `now` is Unix seconds. A value lower than the previous tick's is
    /// treated as the previous value.
    pub fn tick(&mut self, now: u64) -> TickReport {
        let now = match self.last_tick {
            Some(last) if now < last => {
                warn!(now, last, "Clock went backwards; clamping tick time");
                last
            }
            _ => now,
        };
        self.last_tick = Some(now);

        let mut report = TickReport {
            now,
            ..Default::default()
        };
        self.check_funds(&mut report);
        self.launch_pending(&mut report);
        self.maintain(now, &mut report);
        report
    }

    fn check_funds(&mut self, report: &mut TickReport) {
        match self.funds.has_enough_funds() {
            Ok(ok) => {
                if ok != self.funds_ok {
                    info!(funds_ok = ok, "Fund sufficiency changed");
                }
                self.funds_ok = ok;
            }
            Err(e) => {
                warn!(error = %e, "Fund check failed");
                self.funds_ok = false;
                report.errors += 1;
            }
        }
        report.funds_ok = self.funds_ok;
    }

    fn launch_pending(&mut self, report: &mut TickReport) {
        if self.demand && Position::ALL.iter().all(|p| self.registry.has_reachable(*p)) {
            debug!("Payment path demand satisfied");
            self.demand = false;
        }

        for addr in self.registry.launch_candidates() {
            let Some(position) = self.registry.get(&addr).map(|e| e.linked_to()) else {
                continue;
            };
            let wanted =
                self.demand || (self.funds_ok && !self.registry.has_reachable(position));
            if !wanted {
                continue;
            }
            match self.registry.launch(&addr, &mut self.launcher) {
                Ok(()) => report.launched.push(addr),
                Err(e) => {
                    warn!(addr = %addr_to_hex(&addr), error = %e, "Intermediary launch failed");
                    report.errors += 1;
                }
            }
        }
    }

    fn maintain(&mut self, now: u64, report: &mut TickReport) {
        let epoch = now / self.config.epoch_secs.max(1);
        match self.epoch {
            Some(current) if epoch > current => {
                info!(epoch, previous = current, "Entered new channel epoch");
                self.epoch = Some(epoch);
                report.rotated_epoch = Some(epoch);
            }
            Some(_) => {}
            None => self.epoch = Some(epoch),
        }

        report.pruned = self
            .registry
            .prune_expired(now, self.config.intermediary_lifetime_secs);
    }
}
