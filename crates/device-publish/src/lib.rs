//! device-publish: delivery of device message envelopes to the platform
//!
//! The [`Publisher`] trait has two feature-gated backends, both enabled by
//! default: `http` posts batches to the platform with a bearer credential,
//! and `mock` records them in memory so flows can be tested without a network.

mod error;
pub use error::{PublishError, Result};

mod config;
pub use config::{PlatformConfig, ENV_API_KEY, ENV_API_URL, ENV_SITE_ID};

mod traits;
pub use traits::Publisher;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockPublisher;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpPublisher;
