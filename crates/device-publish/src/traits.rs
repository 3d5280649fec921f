use crate::Result;
use device_model::Envelope;

/// Sink for outbound device messages.
pub trait Publisher {
    /// Deliver one batch of envelopes. No retries are attempted.
    fn publish(&mut self, envelopes: &[Envelope]) -> Result<()>;
}
