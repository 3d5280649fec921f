use crate::{PlatformConfig, PublishError, Publisher, Result};
use device_model::{encode_envelopes, Envelope};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Publishes envelopes to the platform's incoming-messages endpoint.
pub struct HttpPublisher {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpPublisher {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PublishError::Config(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            url: config.incoming_url(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Publisher for HttpPublisher {
    fn publish(&mut self, envelopes: &[Envelope]) -> Result<()> {
        let body = encode_envelopes(envelopes)?;
        debug!(url = %self.url, count = envelopes.len(), "publishing device messages");

        let resp = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| PublishError::Transport {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(PublishError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}
