//! Nanopayment channel state.
//!
//! The payer funds each epoch with a fresh hash chain of `nan_len + 1`
//! elements. Setup publishes the tail and a wallet commitment to the
//! intermediary (`NanCliSetup1`); each payment then reveals the next token
//! towards the head to the relay being paid (`NanCliPay1`). The payee admits
//! a token with one hash against the last token it accepted.
//!
//! ```text
//! payer                    intermediary              relay (payee)
//!   |-- NanCliSetup1 ------------>|                         |
//!   |       (tail, commitment)    |-- setup forwarded ----->|
//!   |-- NanCliPay1 (token 1) ---------------------------->  |  accept, alert
//!   |-- NanCliPay1 (token 2) ---------------------------->  |  accept, alert
//! ```

use monetor_crypto::codec::addr_to_hex;
use monetor_crypto::commitment::{commit_wallet, ChannelSecret};
use monetor_crypto::hash_chain::{ChainReceiver, HashChain};
use monetor_crypto::CryptoError;
use monetor_onion::intermediary::{Intermediary, Reachability};
use monetor_onion::OnionError;
use monetor_types::payment::{Descriptor, MessageType, NanoPublic};
use monetor_types::{Commitment, PublicKey, PublicParams};
use tracing::{debug, info};

use crate::config::PaymentConfig;
use crate::facade::PaymentTransport;
use crate::payload::{self, NanPayPayload, NanSetupPayload};
use crate::{PaymentError, Result};

/// Payer key material bound into every wallet commitment.
pub struct PayerIdentity {
    pub params: PublicParams,
    pub pk: PublicKey,
    pub wallet_key: [u8; 32],
}

/// Payer end of a nanopayment channel.
pub struct NanoChannel {
    relay: Descriptor,
    intermediary: Descriptor,
    params: PublicParams,
    pk: PublicKey,
    epsilon: u64,
    nan_val: u64,
    nan_len: u32,
    val_from: u64,
    epoch: u64,
    chain: HashChain,
    secret: ChannelSecret,
    public: NanoPublic,
    commitment: Commitment,
    spent: u32,
}

impl NanoChannel {
    /// Open a channel to `relay` through a reachable `intermediary` and send
    /// the setup message.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::Onion`] if the intermediary has no open circuit
    /// - [`PaymentError::Config`] if `config` fails validation or the
    ///   per-payment value overflows
    /// - [`PaymentError::Crypto`] on degenerate commitment parameters
    /// - [`PaymentError::Facade`] if the setup message cannot be sent
    pub fn open<T: PaymentTransport + ?Sized>(
        config: &PaymentConfig,
        payer: PayerIdentity,
        relay: Descriptor,
        intermediary: &Intermediary,
        epoch: u64,
        transport: &mut T,
    ) -> Result<Self> {
        if intermediary.reachable() != Reachability::Yes {
            return Err(OnionError::Unreachable {
                addr: addr_to_hex(intermediary.addr()),
                retries: intermediary.circuit_retries(),
            }
            .into());
        }
        config.validate()?;
        let val_from = config
            .val_from()
            .ok_or_else(|| PaymentError::Config("nan_val with tax overflows".to_string()))?;

        let (chain, public, secret) =
            fund_epoch(payer.wallet_key, config.nan_val, val_from, config.nan_len)?;
        let commitment = commit_wallet(&payer.params, &payer.pk, &secret, config.epsilon)?;

        let channel = Self {
            relay,
            intermediary: *intermediary.desc(),
            params: payer.params,
            pk: payer.pk,
            epsilon: config.epsilon,
            nan_val: config.nan_val,
            nan_len: config.nan_len,
            val_from,
            epoch,
            chain,
            secret,
            public,
            commitment,
            spent: 0,
        };
        channel.send_setup(transport)?;
        info!(
            epoch,
            intermediary = %addr_to_hex(intermediary.addr()),
            relay_id = relay.id,
            num_payments = channel.nan_len,
            "Opened nanopayment channel"
        );
        Ok(channel)
    }

    fn send_setup<T: PaymentTransport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        let body = payload::to_vec(&NanSetupPayload {
            epoch: self.epoch,
            public: self.public.clone(),
            commitment: self.commitment,
        })?;
        transport.send(&self.intermediary, MessageType::NanCliSetup1, &body)?;
        Ok(())
    }

    /// Release the next token to the relay.
    ///
    /// Returns the payment number within the epoch. The token is consumed
    /// only once the send succeeds.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::ChainExhausted`] once `nan_len` payments were made
    /// - [`PaymentError::Facade`] if the token cannot be sent
    pub fn pay<T: PaymentTransport + ?Sized>(&mut self, transport: &mut T) -> Result<u32> {
        if self.spent >= self.nan_len {
            return Err(PaymentError::ChainExhausted { spent: self.spent });
        }
        let index = self.spent + 1;
        let token = *self
            .chain
            .token(index as usize)
            .ok_or(PaymentError::ChainExhausted { spent: self.spent })?;

        let body = payload::to_vec(&NanPayPayload {
            epoch: self.epoch,
            index,
            token,
        })?;
        transport.send(&self.relay, MessageType::NanCliPay1, &body)?;
        self.spent = index;
        debug!(epoch = self.epoch, index, "Sent nanopayment");
        Ok(index)
    }

    /// Start epoch `epoch` with a fresh chain and send its setup.
    ///
    /// # Errors
    ///
    /// As for [`NanoChannel::open`]; on error the previous epoch stays active.
    pub fn rotate<T: PaymentTransport + ?Sized>(
        &mut self,
        epoch: u64,
        transport: &mut T,
    ) -> Result<()> {
        let (chain, public, secret) =
            fund_epoch(self.secret.wallet_key, self.nan_val, self.val_from, self.nan_len)?;
        let commitment = commit_wallet(&self.params, &self.pk, &secret, self.epsilon)?;

        let next = Self {
            relay: self.relay,
            intermediary: self.intermediary,
            params: self.params,
            pk: self.pk,
            epsilon: self.epsilon,
            nan_val: self.nan_val,
            nan_len: self.nan_len,
            val_from: self.val_from,
            epoch,
            chain,
            secret,
            public,
            commitment,
            spent: 0,
        };
        let previous_spent = self.spent;
        let previous = std::mem::replace(self, next);
        if let Err(e) = self.send_setup(transport) {
            *self = previous;
            return Err(e);
        }
        info!(epoch, previous_spent, "Rotated nanopayment channel");
        Ok(())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Payments made in the current epoch.
    pub fn spent(&self) -> u32 {
        self.spent
    }

    /// Payments left in the current epoch.
    pub fn remaining(&self) -> u32 {
        self.nan_len - self.spent
    }

    pub fn public(&self) -> &NanoPublic {
        &self.public
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    /// The committed channel secret for the current epoch.
    pub fn secret(&self) -> &ChannelSecret {
        &self.secret
    }
}

fn fund_epoch(
    wallet_key: [u8; 32],
    nan_val: u64,
    val_from: u64,
    nan_len: u32,
) -> Result<(HashChain, NanoPublic, ChannelSecret)> {
    let chain = HashChain::random(nan_len as usize + 1)?;
    let balance = val_from
        .checked_mul(u64::from(nan_len))
        .ok_or_else(|| PaymentError::Config("channel balance overflows".to_string()))?;
    let public = NanoPublic {
        val_from,
        val_to: nan_val,
        num_payments: nan_len,
        hash_tail: *chain.tail(),
    };
    let secret = ChannelSecret::new(wallet_key, balance, *chain.tail());
    Ok((chain, public, secret))
}

/// Payee end of a nanopayment channel.
#[derive(Debug)]
pub struct NanoPayee {
    payer: Descriptor,
    epoch: u64,
    public: NanoPublic,
    commitment: Commitment,
    receiver: ChainReceiver,
    earned: u64,
}

impl NanoPayee {
    /// Start accepting payments from `payer` under a setup message.
    pub fn from_setup(payer: Descriptor, setup: &NanSetupPayload) -> Self {
        Self {
            payer,
            epoch: setup.epoch,
            public: setup.public.clone(),
            commitment: setup.commitment,
            receiver: ChainReceiver::from_public(&setup.public),
            earned: 0,
        }
    }

    /// Switch to a newer epoch's chain. Stale setups are ignored.
    pub fn on_setup(&mut self, setup: &NanSetupPayload) -> bool {
        if setup.epoch <= self.epoch {
            debug!(epoch = setup.epoch, current = self.epoch, "Ignored stale setup");
            return false;
        }
        self.epoch = setup.epoch;
        self.public = setup.public.clone();
        self.commitment = setup.commitment;
        self.receiver = ChainReceiver::from_public(&setup.public);
        true
    }

    /// Admit one encoded `NanCliPay1` payload and alert the payer.
    ///
    /// Returns the number of payments accepted this epoch. A failed alert is
    /// reported after the payment has been credited.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::Serialization`] on an undecodable payload
    /// - [`PaymentError::InvalidToken`] for a wrong epoch, an out-of-order
    ///   index, a replay, or a token that does not extend the chain
    /// - [`PaymentError::Facade`] if the alert cannot be raised
    pub fn receive<T: PaymentTransport + ?Sized>(
        &mut self,
        body: &[u8],
        transport: &mut T,
    ) -> Result<u32> {
        let pay: NanPayPayload = payload::from_slice(body)?;
        if pay.epoch != self.epoch {
            return Err(PaymentError::InvalidToken(format!(
                "epoch {} does not match current epoch {}",
                pay.epoch, self.epoch
            )));
        }
        let expected = self.receiver.num_payments() + 1;
        if pay.index != expected {
            return Err(PaymentError::InvalidToken(format!(
                "payment {} received, expected {expected}",
                pay.index
            )));
        }

        let count = self.receiver.accept(&pay.token).map_err(|e| match e {
            CryptoError::InvalidToken(msg) => PaymentError::InvalidToken(msg),
            other => PaymentError::Crypto(other),
        })?;
        self.earned = self.earned.saturating_add(self.public.val_to);
        debug!(epoch = self.epoch, count, earned = self.earned, "Accepted nanopayment");

        transport.alert(&self.payer)?;
        Ok(count)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Payments accepted this epoch.
    pub fn num_payments(&self) -> u32 {
        self.receiver.num_payments()
    }

    /// Total value credited across epochs.
    pub fn earned(&self) -> u64 {
        self.earned
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }
}
