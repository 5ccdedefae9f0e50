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

//! Core types for the chat relay

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unique identifier for a session (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Session lifecycle state
///
/// A session only ever moves forward through these states:
///
/// ```text
/// Connected → Naming → Active → Closed
///     └──────────┴────────┴──────↗
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Socket accepted, welcome not yet sent
    Connected,
    /// Waiting for a unique `/nick`
    Naming,
    /// Registered and relaying traffic
    Active,
    /// Deregistered and closed (terminal)
    Closed,
}

impl SessionState {
    /// Check if the session is in its terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if the session holds a registered display name
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Naming => write!(f, "naming"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Registry entry snapshot (independent of the live registry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session ID
    pub id: SessionId,
    /// Peer address
    pub origin: SocketAddr,
    /// Display name at the time of the snapshot
    pub name: String,
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Number of registered sessions
    pub active_sessions: usize,
    /// Total connections since server start
    pub total_connections: u64,
    /// Server bind address
    pub bind_address: SocketAddr,
    /// Server uptime
    pub uptime: Duration,
    /// Server start time
    pub started_at: Instant,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChatServer {{ active: {}, total: {}, addr: {}, uptime: {:?} }}",
            self.active_sessions, self.total_connections, self.bind_address, self.uptime
        )
    }
}
