//! Send/alert facade over the payment message transport.
//!
//! Delivery is best effort: implementations must not block and must not
//! retry. Whether to retry is the caller's decision.

use monetor_types::payment::{Descriptor, MessageType};
use tracing::{debug, warn};

/// Transport delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FacadeError {
    #[error("send failed: {0}")]
    SendFailed(String),

    /// One or both legs of a two-party send failed. Legs that succeeded
    /// are not rolled back.
    #[error("send to {} of 2 recipients failed", .failed.len())]
    MultiSendFailed { failed: Vec<Descriptor> },

    #[error("alert failed: {0}")]
    AlertFailed(String),
}

/// Outbound payment message path.
pub trait PaymentTransport {
    /// Emit a typed payment message to one counterparty.
    fn send(
        &mut self,
        desc: &Descriptor,
        msg_type: MessageType,
        payload: &[u8],
    ) -> Result<(), FacadeError>;

    /// Emit the same message to two counterparties.
    ///
    /// Both sends are always attempted.
    fn send_multi(
        &mut self,
        a: &Descriptor,
        b: &Descriptor,
        msg_type: MessageType,
        payload: &[u8],
    ) -> Result<(), FacadeError> {
        let mut failed = Vec::new();
        for desc in [a, b] {
            if let Err(e) = self.send(desc, msg_type, payload) {
                warn!(id = desc.id, party = ?desc.party, error = %e, "Multi-send leg failed");
                failed.push(*desc);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(FacadeError::MultiSendFailed { failed })
        }
    }

    /// Raise a side-channel notification to a counterparty.
    fn alert(&mut self, desc: &Descriptor) -> Result<(), FacadeError>;
}

impl<T: PaymentTransport + ?Sized> PaymentTransport for Box<T> {
    fn send(
        &mut self,
        desc: &Descriptor,
        msg_type: MessageType,
        payload: &[u8],
    ) -> Result<(), FacadeError> {
        (**self).send(desc, msg_type, payload)
    }

    fn alert(&mut self, desc: &Descriptor) -> Result<(), FacadeError> {
        (**self).alert(desc)
    }
}

/// A message captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub desc: Descriptor,
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

/// In-memory transport that records traffic and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Vec<SentMessage>,
    alerts: Vec<Descriptor>,
    fail_sends_to: Vec<Descriptor>,
    fail_alerts: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send addressed to `desc` fail.
    pub fn fail_sends_to(&mut self, desc: Descriptor) {
        self.fail_sends_to.push(desc);
    }

    /// Make every alert fail.
    pub fn fail_alerts(&mut self, fail: bool) {
        self.fail_alerts = fail;
    }

    /// Successfully delivered messages, oldest first.
    pub fn sent(&self) -> &[SentMessage] {
        &self.sent
    }

    pub fn alerts(&self) -> &[Descriptor] {
        &self.alerts
    }

    /// Delivered messages of one type.
    pub fn sent_of_type(&self, msg_type: MessageType) -> Vec<&SentMessage> {
        self.sent.iter().filter(|m| m.msg_type == msg_type).collect()
    }
}

impl PaymentTransport for RecordingTransport {
    fn send(
        &mut self,
        desc: &Descriptor,
        msg_type: MessageType,
        payload: &[u8],
    ) -> Result<(), FacadeError> {
        if self.fail_sends_to.contains(desc) {
            return Err(FacadeError::SendFailed(format!(
                "{:?} {} unreachable",
                desc.party, desc.id
            )));
        }
        debug!(id = desc.id, msg_type = ?msg_type, len = payload.len(), "Recorded send");
        self.sent.push(SentMessage {
            desc: *desc,
            msg_type,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn alert(&mut self, desc: &Descriptor) -> Result<(), FacadeError> {
        if self.fail_alerts {
            return Err(FacadeError::AlertFailed(format!(
                "{:?} {} unreachable",
                desc.party, desc.id
            )));
        }
        self.alerts.push(*desc);
        Ok(())
    }
}
