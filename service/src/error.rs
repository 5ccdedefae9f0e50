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

//! Error types for the chat relay

use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat relay error types
#[derive(Debug, Error)]
pub enum ChatError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection has been closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// A write did not complete within the configured timeout
    #[error("Write timed out")]
    WriteTimeout,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// Server was started twice
    #[error("Server already running")]
    AlreadyRunning,

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error with a message
    #[error("{0}")]
    Other(String),
}

impl ChatError {
    /// Check if the error means the peer can no longer be reached
    ///
    /// Transport errors end the session unconditionally; they are never
    /// retried.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            ChatError::Io(_) | ChatError::ConnectionClosed | ChatError::WriteTimeout
        )
    }
}

/// Registry mutation failures
///
/// These are recovered locally by the session (re-prompt or a reply to the
/// sender) and never end a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another registered session already holds the name
    #[error("Name '{0}' is already taken")]
    NameTaken(String),

    /// The session has no registry entry
    #[error("Session is not registered")]
    NotRegistered,

    /// The session already has a registry entry
    #[error("Session is already registered")]
    AlreadyRegistered,

    /// The registry has been shut down and accepts no new sessions
    #[error("Registry is closed")]
    Closed,
}
