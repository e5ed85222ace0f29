//! Session-wide settings.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::http::CachePolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Request timeout in seconds, applied to requests built by the session.
    pub timeout_interval: u64,
    /// Largest chunk read from a request body stream at a time.
    pub upload_chunk_size: usize,
    /// Socket read buffer size used by the HTTP/1.1 transport.
    pub read_buffer_size: usize,
    /// Sent when a request does not carry its own `User-Agent`.
    pub user_agent: Option<String>,
    /// Headers added to every request unless the request sets them itself.
    pub additional_headers: Vec<(String, String)>,
    pub cache_policy: CachePolicy,
    pub allow_cellular: bool,
    pub handle_cookies: bool,
    pub allow_pipelining: bool,
    /// Worker threads of the transport's runtime.
    pub worker_threads: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_interval: 60,
            upload_chunk_size: crate::body::DEFAULT_CHUNK_SIZE,
            read_buffer_size: 8 * 1024,
            user_agent: None,
            additional_headers: Vec::new(),
            cache_policy: CachePolicy::default(),
            allow_cellular: true,
            handle_cookies: true,
            allow_pipelining: false,
            worker_threads: 2,
        }
    }
}

impl SessionConfig {
    pub fn from_json(raw: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_interval)
    }
}
