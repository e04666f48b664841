//! Intermediary candidate selection from the relay cache.
//!
//! Candidates are drawn with probability proportional to advertised
//! bandwidth weight, subject to two hard constraints:
//!
//! - an identity already present in the registry is never drawn again
//! - a relay in the same `/24` as the relay being paid is never drawn, so the
//!   payee cannot also act as its own intermediary from a neighbouring host

use std::collections::HashSet;
use std::net::Ipv4Addr;

use monetor_crypto::codec::pk_to_addr;
use monetor_types::payment::{Descriptor, Party, Position};
use monetor_types::{Address, PublicKey};
use rand::Rng;
use tracing::debug;

use crate::circuit::ExtendInfo;
use crate::intermediary::{IntermediaryCandidate, IntermediaryRegistry};
use crate::{OnionError, Result};

/// Minimum weight given to any eligible relay.
const MIN_WEIGHT: f64 = 0.001;

/// A relay as advertised in the network directory.
#[derive(Clone, Debug, PartialEq)]
pub struct RelayDescriptor {
    pub identity: PublicKey,
    pub nickname: String,
    /// `ip:port`.
    pub ip_addr: String,
    pub onion_key: [u8; 32],
    /// Relative bandwidth weight from the directory.
    pub bandwidth_weight: f32,
    /// Controller-assigned id used as the payment descriptor.
    pub payment_id: u64,
}

impl RelayDescriptor {
    pub fn address(&self) -> Address {
        pk_to_addr(&self.identity)
    }

    fn extend_info(&self) -> ExtendInfo {
        ExtendInfo {
            identity: self.identity,
            onion_key: self.onion_key,
            addr: self.ip_addr.clone(),
        }
    }
}

/// Cached relay descriptors for selection.
#[derive(Debug, Default)]
pub struct RelayCache {
    relays: Vec<RelayDescriptor>,
}

impl RelayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(relays: Vec<RelayDescriptor>) -> Self {
        Self { relays }
    }

    /// Insert a descriptor, replacing any with the same identity.
    pub fn add(&mut self, relay: RelayDescriptor) {
        if let Some(existing) = self
            .relays
            .iter_mut()
            .find(|r| r.identity == relay.identity)
        {
            *existing = relay;
        } else {
            self.relays.push(relay);
        }
    }

    pub fn remove(&mut self, identity: &PublicKey) {
        self.relays.retain(|r| &r.identity != identity);
    }

    pub fn all(&self) -> &[RelayDescriptor] {
        &self.relays
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Relays whose bandwidth weight is at least `min_weight`.
    pub fn filter_by_min_weight(&self, min_weight: f32) -> Vec<&RelayDescriptor> {
        self.relays
            .iter()
            .filter(|r| r.bandwidth_weight >= min_weight)
            .collect()
    }
}

/// Tunables for intermediary selection.
#[derive(Clone, Debug, Default)]
pub struct SelectionConstraints {
    /// Relays below this weight are never chosen.
    pub min_weight: f32,
    /// Identities to skip in addition to those already registered.
    pub excluded: HashSet<Address>,
}

/// Draws intermediary candidates for a path position.
#[derive(Debug, Default)]
pub struct IntermediarySelector {
    constraints: SelectionConstraints,
}

impl IntermediarySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constraints(constraints: SelectionConstraints) -> Self {
        Self { constraints }
    }

    /// Pick one intermediary candidate to pay the relay at `paid_relay_ip`.
    ///
    /// # Errors
    ///
    /// [`OnionError::InsufficientRelays`] if no relay passes the constraints.
    pub fn select(
        &self,
        cache: &RelayCache,
        registry: &IntermediaryRegistry,
        position: Position,
        paid_relay_ip: &str,
    ) -> Result<IntermediaryCandidate> {
        let paid_subnet = extract_subnet_24(paid_relay_ip);

        let eligible: Vec<&RelayDescriptor> = cache
            .filter_by_min_weight(self.constraints.min_weight)
            .into_iter()
            .filter(|r| {
                let addr = r.address();
                if registry.get(&addr).is_some() || self.constraints.excluded.contains(&addr) {
                    return false;
                }
                match (paid_subnet, extract_subnet_24(&r.ip_addr)) {
                    (Some(paid), Some(own)) => paid != own,
                    _ => true,
                }
            })
            .collect();

        let chosen = weighted_select(&eligible)?;
        debug!(
            nickname = %chosen.nickname,
            position = ?position,
            eligible = eligible.len(),
            "Drew intermediary candidate"
        );

        Ok(IntermediaryCandidate {
            identity: chosen.identity,
            nickname: chosen.nickname.clone(),
            extend_info: chosen.extend_info(),
            desc: Descriptor::new(chosen.payment_id, Party::Intermediary),
            position,
        })
    }
}

/// First three octets of an `ip:port` string.
fn extract_subnet_24(addr_str: &str) -> Option<[u8; 3]> {
    let ip_part = addr_str.split(':').next()?;
    let ip: Ipv4Addr = ip_part.parse().ok()?;
    let octets = ip.octets();
    Some([octets[0], octets[1], octets[2]])
}

/// Advertised weight, with non-finite values treated as the floor.
fn selection_weight(relay: &RelayDescriptor) -> f64 {
    let weight = f64::from(relay.bandwidth_weight);
    if weight.is_finite() {
        weight.max(MIN_WEIGHT)
    } else {
        MIN_WEIGHT
    }
}

fn weighted_select<'a>(relays: &[&'a RelayDescriptor]) -> Result<&'a RelayDescriptor> {
    let Some(last) = relays.last() else {
        return Err(OnionError::InsufficientRelays { need: 1, have: 0 });
    };

    let total_weight: f64 = relays.iter().map(|r| selection_weight(r)).sum();
    if !total_weight.is_finite() {
        return Err(OnionError::InsufficientRelays { need: 1, have: 0 });
    }

    let mut rng = rand::thread_rng();
    let threshold: f64 = rng.gen_range(0.0..total_weight);

    let mut cumulative = 0.0;
    for relay in relays {
        cumulative += selection_weight(relay);
        if cumulative >= threshold {
            return Ok(relay);
        }
    }

    // Rounding left the threshold past the final sum.
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_relay(id: u8, ip: &str, weight: f32) -> RelayDescriptor {
        RelayDescriptor {
            identity: PublicKey([id; 32]),
            nickname: format!("relay{id}"),
            ip_addr: ip.to_string(),
            onion_key: [id; 32],
            bandwidth_weight: weight,
            payment_id: u64::from(id),
        }
    }

    #[test]
    fn test_extract_subnet_24() {
        assert_eq!(extract_subnet_24("192.168.1.100:9001"), Some([192, 168, 1]));
        assert_eq!(extract_subnet_24("10.0.0.1"), Some([10, 0, 0]));
        assert_eq!(extract_subnet_24("invalid"), None);
    }

    #[test]
    fn test_relay_cache_operations() {
        let mut cache = RelayCache::new();
        assert!(cache.is_empty());
        cache.add(make_relay(1, "10.0.1.1:9001", 1.0));
        cache.add(make_relay(2, "10.0.2.1:9001", 2.0));
        assert_eq!(cache.len(), 2);

        cache.add(make_relay(1, "10.0.1.1:9001", 5.0));
        assert_eq!(cache.len(), 2);
        assert!((cache.all()[0].bandwidth_weight - 5.0).abs() < f32::EPSILON);

        cache.remove(&PublicKey([1; 32]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.filter_by_min_weight(3.0).len(), 0);
    }

    #[test]
    fn test_select_builds_candidate() {
        let cache = RelayCache::from_descriptors(vec![make_relay(3, "10.0.3.1:9001", 1.0)]);
        let registry = IntermediaryRegistry::new();
        let candidate = IntermediarySelector::new()
            .select(&cache, &registry, Position::Exit, "10.9.9.9:9001")
            .expect("select");
        assert_eq!(candidate.identity, PublicKey([3; 32]));
        assert_eq!(candidate.position, Position::Exit);
        assert_eq!(candidate.desc, Descriptor::new(3, Party::Intermediary));
        assert_eq!(candidate.extend_info.addr, "10.0.3.1:9001");
    }

    #[test]
    fn test_select_skips_paid_subnet_and_registered() {
        let cache = RelayCache::from_descriptors(vec![
            make_relay(1, "10.0.1.1:9001", 100.0),
            make_relay(2, "10.0.2.1:9001", 100.0),
            make_relay(3, "10.0.3.1:9001", 0.1),
        ]);
        let mut registry = IntermediaryRegistry::new();
        let selector = IntermediarySelector::new();
        let first = selector
            .select(&cache, &registry, Position::Middle, "10.0.3.1:9001")
            .expect("first");
        assert_ne!(first.identity, PublicKey([3; 32]));

        let first_id = first.identity;
        registry.select(first, 0);
        for _ in 0..16 {
            let next = selector
                .select(&cache, &registry, Position::Middle, "10.0.3.200:9001")
                .expect("next");
            assert_ne!(next.identity, first_id);
            assert_ne!(next.identity, PublicKey([3; 32]));
        }
    }

    #[test]
    fn test_select_insufficient() {
        let cache = RelayCache::from_descriptors(vec![make_relay(1, "10.0.1.1:9001", 1.0)]);
        let registry = IntermediaryRegistry::new();
        let err = IntermediarySelector::new()
            .select(&cache, &registry, Position::Middle, "10.0.1.7:9001")
            .expect_err("only relay shares the paid subnet");
        assert!(matches!(err, OnionError::InsufficientRelays { need: 1, have: 0 }));
    }

    #[test]
    fn test_select_respects_constraints() {
        let cache = RelayCache::from_descriptors(vec![
            make_relay(1, "10.0.1.1:9001", 0.5),
            make_relay(2, "10.0.2.1:9001", 2.0),
            make_relay(4, "10.0.4.1:9001", 2.0),
        ]);
        let mut constraints = SelectionConstraints {
            min_weight: 1.0,
            ..Default::default()
        };
        constraints.excluded.insert(pk_to_addr(&PublicKey([4; 32])));
        let registry = IntermediaryRegistry::new();
        let selector = IntermediarySelector::with_constraints(constraints);
        for _ in 0..16 {
            let candidate = selector
                .select(&cache, &registry, Position::Middle, "192.168.0.1:9001")
                .expect("select");
            assert_eq!(candidate.identity, PublicKey([2; 32]));
        }
    }

    #[test]
    fn test_non_finite_weights_use_floor() {
        let cache = RelayCache::from_descriptors(vec![
            make_relay(1, "10.0.1.1:9001", f32::INFINITY),
            make_relay(2, "10.0.2.1:9001", f32::NAN),
        ]);
        let registry = IntermediaryRegistry::new();
        let selector = IntermediarySelector::new();
        for _ in 0..16 {
            let candidate = selector
                .select(&cache, &registry, Position::Middle, "192.168.0.1:9001")
                .expect("select");
            assert!([PublicKey([1; 32]), PublicKey([2; 32])].contains(&candidate.identity));
        }
        assert!((selection_weight(&cache.all()[0]) - MIN_WEIGHT).abs() < f64::EPSILON);
        assert!((selection_weight(&cache.all()[1]) - MIN_WEIGHT).abs() < f64::EPSILON);
    }

    #[test]
    fn test_infinite_weight_does_not_crowd_out_others() {
        let cache = RelayCache::from_descriptors(vec![
            make_relay(1, "10.0.1.1:9001", f32::INFINITY),
            make_relay(2, "10.0.2.1:9001", 1_000_000.0),
        ]);
        let registry = IntermediaryRegistry::new();
        let picked = IntermediarySelector::new()
            .select(&cache, &registry, Position::Exit, "192.168.0.1:9001")
            .expect("select");
        assert_eq!(picked.identity, PublicKey([2; 32]));
    }
}
