//! Intermediary circuit legs and the circuit-build collaborator.
//!
//! Building the circuit itself (extending a general circuit by one hop to
//! the intermediary) is the transport's job. The payment layer only asks for
//! a launch through [`CircuitLauncher`] and later learns the outcome through
//! a [`CircuitEvent`]:
//!
//! ```text
//! registry.launch(addr) --> CircuitLauncher::launch(extend_info)   (returns at once)
//!            ...
//! transport --> CircuitEvent::Opened(circuit) | CircuitEvent::Failed { addr }
//!           --> registry.handle_event(event)
//! ```

use std::time::Instant;

use monetor_crypto::codec::pk_to_addr;
use monetor_types::{Address, PublicKey};
use rand::RngCore;

use crate::Result;

/// Material needed to extend a circuit by one hop to an intermediary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendInfo {
    /// The intermediary's identity key.
    pub identity: PublicKey,
    /// The intermediary's onion key for the hop handshake.
    pub onion_key: [u8; 32],
    /// Network address, `ip:port`.
    pub addr: String,
}

impl ExtendInfo {
    /// Registry key of the intermediary this leg reaches.
    pub fn address(&self) -> Address {
        pk_to_addr(&self.identity)
    }
}

/// An opened circuit whose last hop is an intermediary.
#[derive(Clone, Debug)]
pub struct IntermediaryCircuit {
    circuit_id: [u8; 16],
    extend_info: ExtendInfo,
    opened_at: Instant,
}

impl IntermediaryCircuit {
    /// Record a freshly opened leg to the intermediary in `extend_info`.
    pub fn new(extend_info: ExtendInfo) -> Self {
        let mut circuit_id = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut circuit_id);
        Self {
            circuit_id,
            extend_info,
            opened_at: Instant::now(),
        }
    }

    /// Return the circuit identifier.
    pub fn circuit_id(&self) -> &[u8; 16] {
        &self.circuit_id
    }

    /// Return the extend info of the final hop.
    pub fn extend_info(&self) -> &ExtendInfo {
        &self.extend_info
    }

    /// Registry key of the intermediary at the end of this circuit.
    pub fn intermediary(&self) -> Address {
        self.extend_info.address()
    }

    /// Return the age of this circuit in seconds.
    pub fn age_secs(&self) -> u64 {
        self.opened_at.elapsed().as_secs()
    }
}

/// Completion notifications delivered by the transport.
#[derive(Clone, Debug)]
pub enum CircuitEvent {
    /// The leg to an intermediary is open.
    Opened(IntermediaryCircuit),
    /// The build to `addr` failed or timed out.
    Failed { addr: Address },
}

/// The circuit-build collaborator.
///
/// `launch` must not block: it starts the build and returns. The outcome is
/// reported later as a [`CircuitEvent`].
pub trait CircuitLauncher {
    /// Start building a circuit leg described by `extend_info`.
    ///
    /// An error means the build could not even be started.
    fn launch(&mut self, extend_info: &ExtendInfo) -> Result<()>;
}

impl<L: CircuitLauncher + ?Sized> CircuitLauncher for Box<L> {
    fn launch(&mut self, extend_info: &ExtendInfo) -> Result<()> {
        (**self).launch(extend_info)
    }
}
