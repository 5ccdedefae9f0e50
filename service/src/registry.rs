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

//! Client registry
//!
//! The registry is the single source of truth for who is online. It maps
//! each registered session to its origin, display name and write handle,
//! and every read, mutation and fan-out goes through one lock:
//!
//! - registration and rename check and update names atomically, so two
//!   sessions can never hold the same name
//! - removal is idempotent and announces the departure exactly once
//! - iteration for delivery runs under the same lock as mutation, so a
//!   broadcast never sees a half-applied rename or a half-closed peer
//!
//! The lock is held across each per-recipient write. A stalled recipient
//! therefore stalls delivery, registration and renames for everyone until
//! its write completes or fails; configure
//! [`ServerConfig::write_timeout`](crate::ServerConfig::write_timeout) to
//! bound that stall.
//!
//! [`close_all`](ClientRegistry::close_all) closes the registry for good:
//! later registrations are refused and sessions still choosing a name are
//! woken through [`closed`](ClientRegistry::closed).

use crate::{ChatConnection, RegistryError, Result, ServerMetrics, SessionId, SessionInfo, notice};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Registered session
struct Entry {
    origin: SocketAddr,
    name: String,
    connection: ChatConnection,
}

impl Entry {
    fn info(&self, id: SessionId) -> SessionInfo {
        SessionInfo {
            id,
            origin: self.origin,
            name: self.name.clone(),
        }
    }
}

/// Registry contents, only reachable through the lock
#[derive(Default)]
pub(crate) struct Sessions {
    entries: BTreeMap<SessionId, Entry>,
}

impl Sessions {
    fn name_taken(&self, name: &str, except: Option<SessionId>) -> bool {
        self.entries
            .iter()
            .any(|(id, entry)| Some(*id) != except && entry.name == name)
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<(SessionId, ChatConnection)> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, entry)| (*id, entry.connection.clone()))
    }

    pub(crate) fn connection(&self, id: SessionId) -> Option<ChatConnection> {
        self.entries.get(&id).map(|entry| entry.connection.clone())
    }

    /// Visit every session except `excluded` in id order
    ///
    /// Returns the sessions whose visit failed.
    pub(crate) async fn for_each_except<F, Fut>(
        &self,
        excluded: Option<SessionId>,
        mut visit: F,
    ) -> Vec<SessionId>
    where
        F: FnMut(SessionInfo, ChatConnection) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut failed = Vec::new();
        for (id, entry) in &self.entries {
            if Some(*id) == excluded {
                continue;
            }
            if let Err(e) = visit(entry.info(*id), entry.connection.clone()).await {
                debug!(session_id = %id, error = %e, "Session visit failed");
                failed.push(*id);
            }
        }
        failed
    }
}

/// Process-wide registry of named sessions
pub struct ClientRegistry {
    sessions: Mutex<Sessions>,
    metrics: Arc<ServerMetrics>,
    shutdown: CancellationToken,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Sessions> {
        self.sessions.lock().await
    }

    /// Register a session under `name`
    ///
    /// The name check and the insert happen under one lock; of any number of
    /// concurrent attempts at the same name exactly one succeeds. Fails with
    /// [`RegistryError::Closed`] once [`close_all`](Self::close_all) has run.
    pub async fn try_register(
        &self,
        connection: &ChatConnection,
        name: &str,
    ) -> std::result::Result<(), RegistryError> {
        let mut sessions = self.sessions.lock().await;
        let id = connection.id();

        if self.shutdown.is_cancelled() {
            return Err(RegistryError::Closed);
        }
        if sessions.entries.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered);
        }
        if sessions.name_taken(name, None) {
            self.metrics.name_conflict();
            return Err(RegistryError::NameTaken(name.to_string()));
        }

        sessions.entries.insert(
            id,
            Entry {
                origin: connection.origin(),
                name: name.to_string(),
                connection: connection.clone(),
            },
        );
        info!(session_id = %id, name, "Session registered");
        Ok(())
    }

    /// Change a registered session's name, returning the old one
    pub async fn try_rename(
        &self,
        id: SessionId,
        new_name: &str,
    ) -> std::result::Result<String, RegistryError> {
        let mut sessions = self.sessions.lock().await;

        if !sessions.entries.contains_key(&id) {
            return Err(RegistryError::NotRegistered);
        }
        if sessions.name_taken(new_name, Some(id)) {
            self.metrics.name_conflict();
            return Err(RegistryError::NameTaken(new_name.to_string()));
        }

        let entry = sessions
            .entries
            .get_mut(&id)
            .ok_or(RegistryError::NotRegistered)?;
        let old = std::mem::replace(&mut entry.name, new_name.to_string());
        info!(session_id = %id, old = %old, new = new_name, "Session renamed");
        Ok(old)
    }

    /// Deregister a session
    ///
    /// Closes the session's connection and tells everyone left that it
    /// departed. Returns the name it held, or `None` if it was not
    /// registered; racing callers therefore produce one departure notice.
    pub async fn remove(&self, id: SessionId) -> Option<String> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.entries.remove(&id)?;
        let name = entry.name.clone();
        self.retire_locked(&mut sessions, id, entry).await;
        Some(name)
    }

    /// Copy of every registered name, in registration-id order
    pub async fn snapshot(&self) -> Vec<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .entries
            .values()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Copy of every registry entry, in registration-id order
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        sessions
            .entries
            .iter()
            .map(|(id, entry)| entry.info(*id))
            .collect()
    }

    /// Get the current name of a session
    pub async fn name_of(&self, id: SessionId) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions.entries.get(&id).map(|entry| entry.name.clone())
    }

    /// Check if any session holds `name`
    pub async fn contains_name(&self, name: &str) -> bool {
        self.sessions.lock().await.name_taken(name, None)
    }

    /// Get the number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.entries.len()
    }

    /// Check if no session is registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.entries.is_empty()
    }

    /// Apply `visit` to every registered session except `excluded`
    ///
    /// Runs entirely under the registry lock. A session whose visit returns
    /// an error is treated as dead: it is deregistered and its departure is
    /// announced before the lock is released.
    pub async fn for_each_except<F, Fut>(&self, excluded: Option<SessionId>, visit: F)
    where
        F: FnMut(SessionInfo, ChatConnection) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut sessions = self.sessions.lock().await;
        let failed = sessions.for_each_except(excluded, visit).await;
        self.reap_locked(&mut sessions, failed).await;
    }

    /// Check if [`close_all`](Self::close_all) has run
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait until the registry is closed
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Deregister and close every session, then refuse new registrations
    ///
    /// Each peer gets `notice` first, best effort. No departure notices are
    /// sent. Returns how many sessions were closed.
    pub async fn close_all(&self, notice: &str) -> usize {
        let mut sessions = self.sessions.lock().await;
        self.shutdown.cancel();
        let entries = std::mem::take(&mut sessions.entries);
        let count = entries.len();
        for (id, entry) in entries {
            if let Err(e) = entry.connection.send_line(notice).await {
                debug!(session_id = %id, error = %e, "Failed to deliver shutdown notice");
            }
            entry.connection.close().await;
        }
        info!(count, "Closed all sessions");
        count
    }

    /// Deliver `text` to every session except `excluded`, returning failures
    pub(crate) async fn deliver_locked(
        &self,
        sessions: &Sessions,
        text: &str,
        excluded: Option<SessionId>,
    ) -> Vec<SessionId> {
        let metrics = &self.metrics;
        sessions
            .for_each_except(excluded, |_, connection| async move {
                let result = connection.send_line(text).await;
                match &result {
                    Ok(()) => metrics.message_relayed(),
                    Err(_) => metrics.send_failed(),
                }
                result
            })
            .await
    }

    /// Deregister sessions whose delivery failed
    ///
    /// Each departure is announced to the survivors; sessions that fail to
    /// receive an announcement join the queue. Runs under the caller's lock.
    pub(crate) async fn reap_locked(&self, sessions: &mut Sessions, failed: Vec<SessionId>) {
        let mut dead: VecDeque<SessionId> = failed.into();
        while let Some(id) = dead.pop_front() {
            let Some(entry) = sessions.entries.remove(&id) else {
                continue;
            };
            warn!(session_id = %id, name = %entry.name, "Dropping session after failed send");
            entry.connection.close().await;
            let departure = notice::departed(&entry.name);
            dead.extend(self.deliver_locked(sessions, &departure, None).await);
        }
    }

    async fn retire_locked(&self, sessions: &mut Sessions, id: SessionId, entry: Entry) {
        info!(session_id = %id, name = %entry.name, "Session deregistered");
        entry.connection.close().await;
        let departure = notice::departed(&entry.name);
        let failed = self.deliver_locked(sessions, &departure, None).await;
        self.reap_locked(sessions, failed).await;
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .sessions
            .try_lock()
            .map(|sessions| sessions.entries.len().to_string())
            .unwrap_or_else(|_| "<locked>".to_string());
        f.debug_struct("ClientRegistry")
            .field("session_count", &count)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::LineCodec;
    use futures_util::StreamExt;
    use tokio::io::{DuplexStream, duplex};
    use tokio_util::codec::FramedRead;

    pub(crate) type Peer = FramedRead<DuplexStream, LineCodec>;

    pub(crate) fn connection(id: u64) -> (ChatConnection, Peer) {
        let (server, client) = duplex(4096);
        let origin: SocketAddr = format!("127.0.0.1:{}", 50000 + id).parse().unwrap();
        let conn = ChatConnection::new(server, SessionId::new(id), origin, None);
        (conn, FramedRead::new(client, LineCodec::default()))
    }

    pub(crate) async fn next_line(peer: &mut Peer) -> Option<String> {
        tokio::time::timeout(std::time::Duration::from_millis(200), peer.next())
            .await
            .ok()
            .flatten()
            .and_then(|line| line.ok())
    }

    fn registry() -> ClientRegistry {
        ClientRegistry::new(Arc::new(ServerMetrics::new()))
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_name() {
        let registry = registry();
        let (a, _pa) = connection(1);
        let (b, _pb) = connection(2);

        registry.try_register(&a, "alice").await.unwrap();
        assert_eq!(
            registry.try_register(&b, "alice").await,
            Err(RegistryError::NameTaken("alice".to_string()))
        );
        assert_eq!(
            registry.try_register(&a, "alice2").await,
            Err(RegistryError::AlreadyRegistered)
        );
        assert_eq!(registry.snapshot().await, vec!["alice"]);
        assert_eq!(registry.metrics().snapshot().name_conflicts, 1);
    }

    #[tokio::test]
    async fn test_concurrent_registration_has_one_winner() {
        let registry = Arc::new(registry());
        let mut peers = Vec::new();
        let mut tasks = Vec::new();

        for id in 1..=16 {
            let (conn, peer) = connection(id);
            peers.push(peer);
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.try_register(&conn, "same").await.is_ok()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.snapshot().await, vec!["same"]);
    }

    #[tokio::test]
    async fn test_rename() {
        let registry = registry();
        let (a, _pa) = connection(1);
        let (b, _pb) = connection(2);
        registry.try_register(&a, "alice").await.unwrap();
        registry.try_register(&b, "bob").await.unwrap();

        assert_eq!(
            registry.try_rename(a.id(), "bob").await,
            Err(RegistryError::NameTaken("bob".to_string()))
        );
        assert_eq!(registry.name_of(a.id()).await.as_deref(), Some("alice"));

        assert_eq!(registry.try_rename(a.id(), "carol").await.unwrap(), "alice");
        assert_eq!(registry.snapshot().await, vec!["carol", "bob"]);
        assert!(!registry.contains_name("alice").await);

        assert_eq!(
            registry.try_rename(SessionId::new(99), "dave").await,
            Err(RegistryError::NotRegistered)
        );
    }

    #[tokio::test]
    async fn test_remove_is_idempotent_with_one_departure() {
        let registry = registry();
        let (a, _pa) = connection(1);
        let (b, mut pb) = connection(2);
        registry.try_register(&a, "alice").await.unwrap();
        registry.try_register(&b, "bob").await.unwrap();

        assert_eq!(registry.remove(a.id()).await.as_deref(), Some("alice"));
        assert_eq!(registry.remove(a.id()).await, None);

        assert!(a.is_closed());
        assert_eq!(next_line(&mut pb).await.as_deref(), Some("*** alice disconnected"));
        assert_eq!(next_line(&mut pb).await, None);
        assert_eq!(registry.snapshot().await, vec!["bob"]);
    }

    #[tokio::test]
    async fn test_racing_removals_announce_once() {
        let registry = Arc::new(registry());
        let (a, _pa) = connection(1);
        let (b, mut pb) = connection(2);
        registry.try_register(&a, "alice").await.unwrap();
        registry.try_register(&b, "bob").await.unwrap();

        let first = tokio::spawn({
            let registry = registry.clone();
            async move { registry.remove(SessionId::new(1)).await }
        });
        let second = tokio::spawn({
            let registry = registry.clone();
            async move { registry.remove(SessionId::new(1)).await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
        assert_eq!(next_line(&mut pb).await.as_deref(), Some("*** alice disconnected"));
        assert_eq!(next_line(&mut pb).await, None);
    }

    #[tokio::test]
    async fn test_for_each_except_reaps_failed_visits() {
        let registry = registry();
        let (a, mut pa) = connection(1);
        let (b, pb) = connection(2);
        let (c, mut pc) = connection(3);
        registry.try_register(&a, "alice").await.unwrap();
        registry.try_register(&b, "bob").await.unwrap();
        registry.try_register(&c, "carol").await.unwrap();
        drop(pb);

        let mut visited = Vec::new();
        registry
            .for_each_except(Some(a.id()), |info, connection| {
                visited.push(info.name.clone());
                async move { connection.send_line("ping").await }
            })
            .await;

        assert_eq!(visited, vec!["bob", "carol"]);
        assert_eq!(registry.snapshot().await, vec!["alice", "carol"]);
        assert_eq!(next_line(&mut pc).await.as_deref(), Some("ping"));
        assert_eq!(next_line(&mut pa).await.as_deref(), Some("*** bob disconnected"));
        assert_eq!(next_line(&mut pc).await.as_deref(), Some("*** bob disconnected"));
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = registry();
        let (a, mut pa) = connection(1);
        let (b, mut pb) = connection(2);
        registry.try_register(&a, "alice").await.unwrap();
        registry.try_register(&b, "bob").await.unwrap();

        assert_eq!(registry.close_all(notice::SHUTDOWN).await, 2);
        assert!(registry.is_empty().await);
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(next_line(&mut pa).await.as_deref(), Some(notice::SHUTDOWN));
        assert_eq!(next_line(&mut pb).await.as_deref(), Some(notice::SHUTDOWN));
        assert_eq!(next_line(&mut pa).await, None);
    }

    #[tokio::test]
    async fn test_close_all_refuses_later_registration() {
        let registry = registry();
        let (a, _pa) = connection(1);
        assert!(!registry.is_closed());

        assert_eq!(registry.close_all(notice::SHUTDOWN).await, 0);
        assert!(registry.is_closed());
        tokio::time::timeout(std::time::Duration::from_millis(100), registry.closed())
            .await
            .unwrap();

        assert_eq!(
            registry.try_register(&a, "alice").await,
            Err(RegistryError::Closed)
        );
        assert!(registry.is_empty().await);
    }
}
