use thiserror::Error;

pub type Result<T, E = PublishError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("platform config: {0}")]
    Config(String),
    #[error("encoding envelopes: {0}")]
    Encode(#[from] device_model::Error),
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("could not publish message to {url}: status {status}, body {body:?}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}
