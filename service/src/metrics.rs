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

//! Lock-free relay metrics
//!
//! Counters here back [`ChatServer::snapshot`](crate::ChatServer::snapshot)
//! and tests. Every update is mirrored to the `metrics` facade so an
//! installed exporter sees the same numbers under `chatrelay.*`.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,

    // Traffic
    lines_received: AtomicU64,
    messages_relayed: AtomicU64,

    // Failures
    send_failures: AtomicU64,
    name_conflicts: AtomicU64,
    accept_errors: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            messages_relayed: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            name_conflicts: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record a new connection being accepted
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        counter!("chatrelay.connections.total").increment(1);
        gauge!("chatrelay.connections.active").increment(1.0);
    }

    /// Record a session handler finishing
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        gauge!("chatrelay.connections.active").decrement(1.0);
    }

    /// Get the current number of open connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Record an inbound line
    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        counter!("chatrelay.lines.received").increment(1);
    }

    /// Record a line delivered to one recipient
    pub fn message_relayed(&self) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
        counter!("chatrelay.messages.relayed").increment(1);
    }

    /// Record a delivery that failed and cost the recipient its session
    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
        counter!("chatrelay.errors.send").increment(1);
    }

    /// Record a registration or rename refused because the name was taken
    pub fn name_conflict(&self) {
        self.name_conflicts.fetch_add(1, Ordering::Relaxed);
        counter!("chatrelay.names.conflicts").increment(1);
    }

    /// Record a failed `accept`
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("chatrelay.errors.accept").increment(1);
    }

    /// Get a point-in-time view of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            name_conflicts: self.name_conflicts.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since server start
    pub total_connections: u64,
    /// Currently open connections
    pub active_connections: u64,
    /// Inbound lines across all sessions
    pub lines_received: u64,
    /// Per-recipient deliveries
    pub messages_relayed: u64,
    /// Deliveries that failed
    pub send_failures: u64,
    /// Refused registrations and renames
    pub name_conflicts: u64,
    /// Failed accepts
    pub accept_errors: u64,
    /// Server uptime
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Calculate deliveries per second
    pub fn messages_relayed_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.messages_relayed as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.send_failures + self.accept_errors
    }
}
