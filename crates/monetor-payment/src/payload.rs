//! CBOR payloads for nanopayment messages.
//!
//! Payloads are encoded with [`ciborium`] before being handed to
//! [`PaymentTransport::send`](crate::facade::PaymentTransport::send) together
//! with their [`MessageType`](monetor_types::payment::MessageType).

use monetor_types::payment::NanoPublic;
use monetor_types::{ChainHash, Commitment};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{PaymentError, Result};

/// Body of `NanCliSetup1`: the payer publishes its chain and commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NanSetupPayload {
    pub epoch: u64,
    pub public: NanoPublic,
    pub commitment: Commitment,
}

/// Body of `NanCliPay1`: one revealed chain token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NanPayPayload {
    pub epoch: u64,
    /// 1-based payment number within the epoch.
    pub index: u32,
    pub token: ChainHash,
}

/// Serialize a payload to CBOR bytes.
///
/// # Errors
///
/// [`PaymentError::Serialization`] if the value cannot be encoded.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| PaymentError::Serialization(format!("CBOR serialization failed: {e}")))?;
    Ok(buf)
}

/// Deserialize a payload from CBOR bytes.
///
/// # Errors
///
/// [`PaymentError::Serialization`] if the bytes do not decode to `T`.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data)
        .map_err(|e| PaymentError::Serialization(format!("CBOR deserialization failed: {e}")))
}
