//! Payment-protocol addressing and token types.

use serde::{Deserialize, Serialize};

use crate::ChainHash;

/// Role of a payment-protocol counterparty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Party {
    Client = 0,
    Relay = 1,
    Intermediary = 2,
    Ledger = 3,
}

/// Opaque handle identifying a payment-protocol counterparty.
///
/// The controller maps descriptors to connections; the payment layer only
/// uses them as addressing keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    /// Identifier unique within `party`.
    pub id: u64,
    /// Counterparty role.
    pub party: Party,
}

impl Descriptor {
    pub fn new(id: u64, party: Party) -> Self {
        Self { id, party }
    }
}

/// Path position whose traffic an intermediary is used to pay for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Middle,
    Exit,
}

impl Position {
    /// Both payable positions, in path order.
    pub const ALL: [Position; 2] = [Position::Middle, Position::Exit];
}

/// Payment message types carried over intermediary circuits.
///
/// Naming follows `<protocol>_<sender>_<step>`: `Chn` for the channel
/// escrow protocol, `Nan` for nanopayment sub-channels; `Cli`, `Rel`, `Int`,
/// `End` and `Led` name the sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    AnyLedConfirm = 0x01,
    ChnEndSetup = 0x10,
    ChnEndEstab1 = 0x11,
    ChnIntEstab2 = 0x12,
    ChnEndEstab3 = 0x13,
    ChnIntEstab4 = 0x14,
    NanCliSetup1 = 0x20,
    NanIntSetup2 = 0x21,
    NanCliSetup3 = 0x22,
    NanIntSetup4 = 0x23,
    NanCliSetup5 = 0x24,
    NanIntSetup6 = 0x25,
    NanCliEstab1 = 0x30,
    NanRelEstab6 = 0x31,
    NanCliPay1 = 0x40,
    NanRelPay2 = 0x41,
    NanCliDestab1 = 0x50,
    NanIntDestab2 = 0x51,
    NanCliDpay1 = 0x52,
    NanIntDpay2 = 0x53,
    NanCliReqclose1 = 0x60,
    NanRelReqclose2 = 0x61,
    NanEndClose1 = 0x70,
    NanIntClose2 = 0x71,
    NanEndClose3 = 0x72,
    NanIntClose4 = 0x73,
    NanEndClose5 = 0x74,
    NanIntClose6 = 0x75,
    NanEndClose7 = 0x76,
    NanIntClose8 = 0x77,
}

impl MessageType {
    /// Wire code of this message type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        use MessageType::*;
        let ty = match code {
            0x01 => AnyLedConfirm,
            0x10 => ChnEndSetup,
            0x11 => ChnEndEstab1,
            0x12 => ChnIntEstab2,
            0x13 => ChnEndEstab3,
            0x14 => ChnIntEstab4,
            0x20 => NanCliSetup1,
            0x21 => NanIntSetup2,
            0x22 => NanCliSetup3,
            0x23 => NanIntSetup4,
            0x24 => NanCliSetup5,
            0x25 => NanIntSetup6,
            0x30 => NanCliEstab1,
            0x31 => NanRelEstab6,
            0x40 => NanCliPay1,
            0x41 => NanRelPay2,
            0x50 => NanCliDestab1,
            0x51 => NanIntDestab2,
            0x52 => NanCliDpay1,
            0x53 => NanIntDpay2,
            0x60 => NanCliReqclose1,
            0x61 => NanRelReqclose2,
            0x70 => NanEndClose1,
            0x71 => NanIntClose2,
            0x72 => NanEndClose3,
            0x73 => NanIntClose4,
            0x74 => NanEndClose5,
            0x75 => NanIntClose6,
            0x76 => NanEndClose7,
            0x77 => NanIntClose8,
            _ => return None,
        };
        Some(ty)
    }
}

/// Public half of a nanopayment channel, published at setup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NanoPublic {
    /// Amount debited from the payer per payment, tax included.
    pub val_from: u64,
    /// Amount credited to the payee per payment.
    pub val_to: u64,
    /// Number of payments the hash chain can fund.
    pub num_payments: u32,
    /// Committed hash-chain tail.
    pub hash_tail: ChainHash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_codes_roundtrip() {
        for code in 0u8..=0xFF {
            if let Some(ty) = MessageType::from_code(code) {
                assert_eq!(ty.code(), code);
            }
        }
        assert_eq!(MessageType::from_code(0x40), Some(MessageType::NanCliPay1));
        assert_eq!(MessageType::from_code(0xFF), None);
    }

    #[test]
    fn test_descriptor_equality() {
        let a = Descriptor::new(1, Party::Relay);
        let b = Descriptor::new(1, Party::Intermediary);
        assert_ne!(a, b);
        assert_eq!(a, Descriptor::new(1, Party::Relay));
    }

    #[test]
    fn test_positions() {
        assert_eq!(Position::ALL.len(), 2);
        assert_eq!(Position::ALL[0], Position::Middle);
    }
}
