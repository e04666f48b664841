//! Intermediary registry and reachability state machine.
//!
//! Each entry moves independently through three states:
//!
//! ```text
//!            select
//!              |
//!              v        opened
//!   +------> MAYBE ---------------> YES
//!   |          |  ^                  |
//!   | failed   |  |   failed (< 3)   |
//!   +----------+  +------------------+
//!              |
//!              | failed, retries == 3
//!              v
//!             NO   (left only by re-selection)
//! ```
//!
//! Entries are keyed by the address derived from the relay identity key, so
//! selecting the same relay twice updates one entry. A per-entry in-flight
//! flag keeps at most one circuit build outstanding per intermediary.
//! Evicting an entry with a build outstanding leaves its address orphaned:
//! no new build to that identity starts, and the stale completion is
//! dropped instead of landing on a re-selected entry.
//!
//! The registry is plain owned state. Callers that share it across threads
//! must serialise every mutation behind one lock around the whole registry.

use std::collections::{HashMap, HashSet};

use monetor_crypto::codec::{addr_to_hex, pk_to_addr};
use monetor_types::payment::{Descriptor, Position};
use monetor_types::{Address, PublicKey, MAX_NICKNAME_LEN};
use tracing::{debug, info, warn};

use crate::circuit::{CircuitEvent, CircuitLauncher, ExtendInfo, IntermediaryCircuit};
use crate::{OnionError, Result, INTERMEDIARY_MAX_RETRIES};

/// Whether a circuit to an intermediary can currently be built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reachability {
    /// Retry budget exhausted.
    No,
    /// A circuit to it is open.
    Yes,
    /// Not yet attempted, mid-attempt, or failed with budget left.
    Maybe,
}

/// A relay chosen to become an intermediary.
#[derive(Clone, Debug)]
pub struct IntermediaryCandidate {
    pub identity: PublicKey,
    pub nickname: String,
    pub extend_info: ExtendInfo,
    pub desc: Descriptor,
    pub position: Position,
}

/// A registered intermediary.
#[derive(Clone, Debug)]
pub struct Intermediary {
    identity: PublicKey,
    addr: Address,
    nickname: String,
    reachable: Reachability,
    chosen_at: u64,
    extend_info: ExtendInfo,
    desc: Descriptor,
    linked_to: Position,
    circuit_retries: u32,
    launch_in_flight: bool,
    circuit_id: Option<[u8; 16]>,
}

impl Intermediary {
    fn from_candidate(candidate: IntermediaryCandidate, now: u64) -> Self {
        let addr = pk_to_addr(&candidate.identity);
        Self {
            identity: candidate.identity,
            addr,
            nickname: bounded_nickname(candidate.nickname),
            reachable: Reachability::Maybe,
            chosen_at: now,
            extend_info: candidate.extend_info,
            desc: candidate.desc,
            linked_to: candidate.position,
            circuit_retries: 0,
            launch_in_flight: false,
            circuit_id: None,
        }
    }

    pub fn identity(&self) -> &PublicKey {
        &self.identity
    }

    /// Registry key.
    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn reachable(&self) -> Reachability {
        self.reachable
    }

    /// Unix time of selection.
    pub fn chosen_at(&self) -> u64 {
        self.chosen_at
    }

    pub fn extend_info(&self) -> &ExtendInfo {
        &self.extend_info
    }

    /// Payment descriptor used to address this intermediary.
    pub fn desc(&self) -> &Descriptor {
        &self.desc
    }

    /// Path position this intermediary pays for.
    pub fn linked_to(&self) -> Position {
        self.linked_to
    }

    pub fn circuit_retries(&self) -> u32 {
        self.circuit_retries
    }

    pub fn launch_in_flight(&self) -> bool {
        self.launch_in_flight
    }

    /// Identifier of the open circuit, if any.
    pub fn circuit_id(&self) -> Option<&[u8; 16]> {
        self.circuit_id.as_ref()
    }
}

fn bounded_nickname(mut nickname: String) -> String {
    if let Some((cut, _)) = nickname.char_indices().nth(MAX_NICKNAME_LEN) {
        nickname.truncate(cut);
    }
    nickname
}

/// What [`IntermediaryRegistry::select`] did with a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    /// New entry created.
    Inserted,
    /// Existing entry's metadata refreshed; state and counters kept.
    Updated,
    /// Exhausted entry replaced by a fresh one.
    Replaced,
}

/// The set of candidate intermediaries.
#[derive(Debug, Default)]
pub struct IntermediaryRegistry {
    entries: HashMap<Address, Intermediary>,
    /// Evicted while a build was outstanding; cleared by its completion.
    orphaned: HashSet<Address>,
}

impl IntermediaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a selected intermediary.
    ///
    /// Re-selecting an unreachable entry is the only way back from
    /// [`Reachability::No`]: the old entry is dropped and a fresh one starts
    /// in [`Reachability::Maybe`] with no retries spent.
    pub fn select(&mut self, candidate: IntermediaryCandidate, now: u64) -> SelectOutcome {
        let addr = pk_to_addr(&candidate.identity);
        match self.entries.get_mut(&addr) {
            Some(entry) if entry.reachable == Reachability::No => {
                info!(
                    addr = %addr_to_hex(&addr),
                    nickname = %candidate.nickname,
                    "Re-selected exhausted intermediary"
                );
                *entry = Intermediary::from_candidate(candidate, now);
                SelectOutcome::Replaced
            }
            Some(entry) => {
                entry.nickname = bounded_nickname(candidate.nickname);
                entry.extend_info = candidate.extend_info;
                entry.desc = candidate.desc;
                entry.linked_to = candidate.position;
                debug!(addr = %addr_to_hex(&addr), "Refreshed intermediary");
                SelectOutcome::Updated
            }
            None => {
                let entry = Intermediary::from_candidate(candidate, now);
                info!(
                    addr = %addr_to_hex(&addr),
                    nickname = %entry.nickname,
                    position = ?entry.linked_to,
                    "Selected intermediary"
                );
                self.entries.insert(addr, entry);
                SelectOutcome::Inserted
            }
        }
    }

    /// Ask the transport to build a leg to the intermediary at `addr`.
    ///
    /// The launcher is not contacted when the entry is unknown, exhausted,
    /// or already has a build outstanding. A launcher error is counted
    /// against the retry budget exactly like a failure callback.
    ///
    /// # Errors
    ///
    /// - [`OnionError::UnknownIntermediary`] if `addr` is not registered
    /// - [`OnionError::Unreachable`] if the entry is in [`Reachability::No`]
    /// - [`OnionError::LaunchInFlight`] if a build is already outstanding,
    ///   including one left over from an evicted entry
    /// - [`OnionError::CircuitBuildFailed`] if the launcher refused the build
    pub fn launch<L>(&mut self, addr: &Address, launcher: &mut L) -> Result<()>
    where
        L: CircuitLauncher + ?Sized,
    {
        if self.orphaned.contains(addr) {
            debug!(addr = %addr_to_hex(addr), "Launch blocked by orphaned build");
            return Err(OnionError::LaunchInFlight(addr_to_hex(addr)));
        }
        let entry = self
            .entries
            .get_mut(addr)
            .ok_or_else(|| OnionError::UnknownIntermediary(addr_to_hex(addr)))?;

        if entry.reachable == Reachability::No {
            return Err(OnionError::Unreachable {
                addr: addr_to_hex(addr),
                retries: entry.circuit_retries,
            });
        }
        if entry.launch_in_flight {
            debug!(addr = %addr_to_hex(addr), "Launch coalesced with outstanding build");
            return Err(OnionError::LaunchInFlight(addr_to_hex(addr)));
        }

        match launcher.launch(&entry.extend_info) {
            Ok(()) => {
                entry.launch_in_flight = true;
                debug!(
                    addr = %addr_to_hex(addr),
                    retries = entry.circuit_retries,
                    "Launched intermediary circuit"
                );
                Ok(())
            }
            Err(e) => {
                record_failure(entry);
                Err(OnionError::CircuitBuildFailed(format!(
                    "{}: {e}",
                    addr_to_hex(addr)
                )))
            }
        }
    }

    /// Apply a circuit-opened callback.
    ///
    /// Returns the entry's new state, or `None` if no entry matches.
    pub fn on_circuit_opened(&mut self, circuit: &IntermediaryCircuit) -> Option<Reachability> {
        let addr = circuit.intermediary();
        if self.settle_orphan(&addr) {
            return None;
        }
        let Some(entry) = self.entries.get_mut(&addr) else {
            debug!(addr = %addr_to_hex(&addr), "Circuit opened for unknown intermediary");
            return None;
        };
        entry.launch_in_flight = false;

        if entry.reachable == Reachability::No {
            debug!(
                addr = %addr_to_hex(&addr),
                "Late circuit completion for exhausted intermediary ignored"
            );
            return Some(Reachability::No);
        }

        entry.reachable = Reachability::Yes;
        entry.circuit_id = Some(*circuit.circuit_id());
        info!(
            addr = %addr_to_hex(&addr),
            nickname = %entry.nickname,
            "Intermediary circuit opened"
        );
        Some(Reachability::Yes)
    }

    /// Apply a circuit-failed or timeout callback.
    ///
    /// Returns the entry's new state, or `None` if no entry matches.
    pub fn on_circuit_failed(&mut self, addr: &Address) -> Option<Reachability> {
        if self.settle_orphan(addr) {
            return None;
        }
        let Some(entry) = self.entries.get_mut(addr) else {
            debug!(addr = %addr_to_hex(addr), "Circuit failed for unknown intermediary");
            return None;
        };
        Some(record_failure(entry))
    }

    /// Deliver a transport completion event.
    pub fn handle_event(&mut self, event: &CircuitEvent) -> Option<Reachability> {
        match event {
            CircuitEvent::Opened(circuit) => self.on_circuit_opened(circuit),
            CircuitEvent::Failed { addr } => self.on_circuit_failed(addr),
        }
    }

    pub fn get(&self, addr: &Address) -> Option<&Intermediary> {
        self.entries.get(addr)
    }

    /// Find the intermediary addressed by a payment descriptor.
    pub fn find_by_desc(&self, desc: &Descriptor) -> Option<&Intermediary> {
        self.entries.values().find(|e| &e.desc == desc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Intermediary> {
        self.entries.values()
    }

    /// Intermediaries with an open circuit for `position`.
    pub fn reachable(&self, position: Position) -> impl Iterator<Item = &Intermediary> {
        self.entries
            .values()
            .filter(move |e| e.linked_to == position && e.reachable == Reachability::Yes)
    }

    /// Whether any intermediary for `position` has an open circuit.
    pub fn has_reachable(&self, position: Position) -> bool {
        self.reachable(position).next().is_some()
    }

    /// Entries eligible for a new build: `Maybe` and nothing outstanding.
    pub fn launch_candidates(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self
            .entries
            .values()
            .filter(|e| e.reachable == Reachability::Maybe && !e.launch_in_flight)
            .filter(|e| !self.orphaned.contains(&e.addr))
            .map(|e| e.addr)
            .collect();
        out.sort();
        out
    }

    /// Whether a build for an evicted entry at `addr` is still outstanding.
    pub fn is_orphaned(&self, addr: &Address) -> bool {
        self.orphaned.contains(addr)
    }

    /// Evict an intermediary.
    pub fn remove(&mut self, addr: &Address) -> Option<Intermediary> {
        let removed = self.entries.remove(addr)?;
        debug!(addr = %addr_to_hex(addr), "Removed intermediary");
        self.orphan_if_in_flight(&removed);
        Some(removed)
    }

    /// Evict every intermediary selected more than `lifetime_secs` ago.
    ///
    /// Returns the number of evicted entries.
    pub fn prune_expired(&mut self, now: u64, lifetime_secs: u64) -> usize {
        let expired: Vec<Address> = self
            .entries
            .values()
            .filter(|e| now.saturating_sub(e.chosen_at) >= lifetime_secs)
            .map(|e| e.addr)
            .collect();
        for addr in &expired {
            if let Some(entry) = self.entries.remove(addr) {
                self.orphan_if_in_flight(&entry);
            }
        }
        let pruned = expired.len();
        if pruned > 0 {
            info!(pruned, remaining = self.entries.len(), "Pruned expired intermediaries");
        }
        pruned
    }

    fn orphan_if_in_flight(&mut self, entry: &Intermediary) {
        if entry.launch_in_flight {
            debug!(
                addr = %addr_to_hex(&entry.addr),
                "Evicted intermediary with build outstanding"
            );
            self.orphaned.insert(entry.addr);
        }
    }

    /// Consume a completion that belongs to an evicted entry's build.
    fn settle_orphan(&mut self, addr: &Address) -> bool {
        let settled = self.orphaned.remove(addr);
        if settled {
            debug!(addr = %addr_to_hex(addr), "Dropped completion of orphaned build");
        }
        settled
    }
}

fn record_failure(entry: &mut Intermediary) -> Reachability {
    entry.launch_in_flight = false;
    entry.circuit_id = None;
    if entry.reachable == Reachability::No {
        return Reachability::No;
    }

    entry.circuit_retries = (entry.circuit_retries + 1).min(INTERMEDIARY_MAX_RETRIES);
    if entry.circuit_retries >= INTERMEDIARY_MAX_RETRIES {
        entry.reachable = Reachability::No;
        warn!(
            addr = %addr_to_hex(&entry.addr),
            nickname = %entry.nickname,
            retries = entry.circuit_retries,
            "Intermediary retry budget exhausted"
        );
    } else {
        entry.reachable = Reachability::Maybe;
        debug!(
            addr = %addr_to_hex(&entry.addr),
            retries = entry.circuit_retries,
            "Intermediary circuit failed"
        );
    }
    entry.reachable
}
