use crate::{Publisher, PublishError, Result};
use device_model::Envelope;

/// In-memory publisher that records every batch it receives.
#[derive(Debug, Default)]
pub struct MockPublisher {
    batches: Vec<Vec<Envelope>>,
    fail_with: Option<String>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every call fails with a transport error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            batches: Vec::new(),
            fail_with: Some(message.into()),
        }
    }

    pub fn batches(&self) -> &[Vec<Envelope>] {
        &self.batches
    }

    /// All envelopes published so far, flattened in order.
    pub fn envelopes(&self) -> impl Iterator<Item = &Envelope> {
        self.batches.iter().flatten()
    }
}

impl Publisher for MockPublisher {
    fn publish(&mut self, envelopes: &[Envelope]) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(PublishError::Transport {
                url: "mock://".to_string(),
                message: message.clone(),
            });
        }
        self.batches.push(envelopes.to_vec());
        Ok(())
    }
}
