//
// Copyright 2017-2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Server configuration

use crate::{ChatError, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port the relay listens on when no address is configured
pub const DEFAULT_PORT: u16 = 12345;

/// Server configuration
///
/// Use the builder pattern methods to customize the configuration.
///
/// # Example
///
/// ```
/// use chatrelay_service::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_max_name_length(16)
///     .with_write_timeout(Some(Duration::from_secs(5)));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum length of a single inbound line in bytes
    ///
    /// Longer lines are discarded up to the next newline.
    pub max_line_length: usize,

    /// Maximum length of a display name in characters
    pub max_name_length: usize,

    /// Timeout for a single write to a peer
    ///
    /// `None` lets a stalled peer block the registry for as long as the
    /// write takes. With a timeout, an expired write counts as a failed
    /// send and the peer is deregistered.
    pub write_timeout: Option<Duration>,

    /// Delay after a failed `accept` before trying again
    pub accept_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_line_length: 8192,
            max_name_length: 32,
            write_timeout: None,
            accept_backoff: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the maximum inbound line length
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Set the maximum display name length
    pub fn with_max_name_length(mut self, max: usize) -> Self {
        self.max_name_length = max;
        self
    }

    /// Set the per-write timeout
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the accept error back-off
    pub fn with_accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_line_length == 0 {
            return Err(ChatError::InvalidConfig(
                "max_line_length must be greater than 0".to_string(),
            ));
        }

        if self.max_name_length == 0 {
            return Err(ChatError::InvalidConfig(
                "max_name_length must be greater than 0".to_string(),
            ));
        }

        if self.max_name_length > self.max_line_length {
            return Err(ChatError::InvalidConfig(
                "max_name_length must not exceed max_line_length".to_string(),
            ));
        }

        if matches!(self.write_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(ChatError::InvalidConfig(
                "write_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
