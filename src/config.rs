//! Configuration file model.
//!
//! ```json
//! {
//!   "listen": "0.0.0.0:4000",
//!   "registryApi": true,
//!   "refreshIntervalMs": 30000,
//!   "forwardHeaders": ["authorization"],
//!   "endpoints": [
//!     { "url": "http://localhost:4001/graphql", "prefix": "records" },
//!     { "url": "http://localhost:4002/graphql", "discoveryQuery": "{ _service { sdl } }" }
//!   ]
//! }
//! ```

use crate::discovery::DEFAULT_DISCOVERY_TIMEOUT;
use crate::error::Result;
use crate::executor::{DEFAULT_ACK_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::registry::EndpointDescriptor;
use crate::subscription::{OverflowPolicy, DEFAULT_BUFFER_CAPACITY};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Address the binary listens on when nothing else is configured
pub const DEFAULT_LISTEN: &str = "0.0.0.0:4000";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub listen: String,
    /// Seed endpoints registered before the first reload
    pub endpoints: Vec<EndpointDescriptor>,
    /// Expose the registry API as local GraphQL fields
    pub registry_api: bool,
    pub discovery_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    /// Background refresh interval; no refresh loop when absent
    pub refresh_interval_ms: Option<u64>,
    pub subscription_buffer: usize,
    pub subscription_overflow: OverflowPolicy,
    pub forward_headers: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            endpoints: Vec::new(),
            registry_api: false,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT.as_millis() as u64,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT.as_millis() as u64,
            refresh_interval_ms: None,
            subscription_buffer: DEFAULT_BUFFER_CAPACITY,
            subscription_overflow: OverflowPolicy::default(),
            forward_headers: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}
