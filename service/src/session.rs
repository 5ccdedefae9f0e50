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

//! Session handler
//!
//! One [`SessionHandler`] drives one connection from accept to close:
//!
//! 1. `Connected → Naming`: send the welcome prompt
//! 2. `Naming`: wait for a `/nick` whose name the registry accepts
//! 3. `Active`: relay chat lines and dispatch commands
//! 4. `Closed`: deregister, close, announce the departure
//!
//! The session ends when the peer closes the stream, a read fails, the user
//! quits, the registry drops the session after a failed send, or the
//! registry is closed for shutdown.

use crate::{
    ChatConnection, ChatError, ClientRegistry, Command, CommandDispatcher, Flow, RegistryError,
    Result, SessionId, SessionState, command::name_is_word, command::name_too_long, notice,
};
use futures_util::{Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name given to a session that sends `/nick` without one
pub fn fallback_name(origin: SocketAddr) -> String {
    format!("user{}", origin.port())
}

/// Per-connection state machine
pub struct SessionHandler<R> {
    id: SessionId,
    connection: ChatConnection,
    reader: R,
    registry: Arc<ClientRegistry>,
    dispatcher: CommandDispatcher,
    max_name_length: usize,
    state: SessionState,
}

impl<R> SessionHandler<R>
where
    R: Stream<Item = Result<String>> + Unpin,
{
    /// Create a handler for a freshly accepted connection
    pub fn new(
        connection: ChatConnection,
        reader: R,
        registry: Arc<ClientRegistry>,
        max_name_length: usize,
    ) -> Self {
        Self {
            id: connection.id(),
            dispatcher: CommandDispatcher::new(registry.clone(), max_name_length),
            connection,
            reader,
            registry,
            max_name_length,
            state: SessionState::Connected,
        }
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion
    pub async fn run(mut self) {
        info!(session_id = %self.id, origin = %self.connection.origin(), "Session started");

        match self.drive().await {
            Ok(()) => {}
            Err(e) if e.is_transport_error() => {
                debug!(session_id = %self.id, error = %e, "Session transport ended")
            }
            Err(e) => warn!(session_id = %self.id, error = %e, "Session failed"),
        }

        self.close().await;
    }

    async fn drive(&mut self) -> Result<()> {
        self.transition(SessionState::Naming);
        self.connection.send_line(notice::WELCOME).await?;

        if !self.negotiate_name().await? {
            return Ok(());
        }
        self.relay().await
    }

    /// Read the next line, or `None` once the stream, the connection or the
    /// registry is closed
    async fn next_line(&mut self) -> Result<Option<String>> {
        let line = tokio::select! {
            line = self.reader.next() => line.transpose()?,
            _ = self.connection.closed() => None,
            _ = self.registry.closed() => {
                debug!(session_id = %self.id, "Registry closed, ending session");
                None
            }
        };
        if line.is_some() {
            self.registry.metrics().line_received();
        }
        Ok(line)
    }

    /// Handshake loop; returns `false` if the peer left before naming itself
    async fn negotiate_name(&mut self) -> Result<bool> {
        loop {
            let Some(line) = self.next_line().await? else {
                self.notify_shutdown().await;
                return Ok(false);
            };

            let name = match Command::parse(line.trim()) {
                Some(Command::Nick(name)) => {
                    name.unwrap_or_else(|| fallback_name(self.connection.origin()))
                }
                _ => {
                    self.connection.send_line(notice::NICK_REQUIRED).await?;
                    continue;
                }
            };

            if !name_is_word(&name) {
                self.connection.send_line(notice::NICK_USAGE).await?;
                continue;
            }
            if name_too_long(&name, self.max_name_length) {
                self.connection
                    .send_line(&notice::nick_too_long(self.max_name_length))
                    .await?;
                continue;
            }

            match self.registry.try_register(&self.connection, &name).await {
                Ok(()) => {
                    self.transition(SessionState::Active);
                    self.registry
                        .broadcast(&notice::joined(&name), Some(self.id))
                        .await;
                    self.registry
                        .send_to(self.id, &notice::registered_as(&name))
                        .await;
                    self.registry.send_to(self.id, notice::HELP_HINT).await;
                    return Ok(true);
                }
                Err(RegistryError::NameTaken(taken)) => {
                    debug!(session_id = %self.id, name = %taken, "Handshake name taken");
                    self.connection
                        .send_line(&notice::nick_taken_during_handshake(&taken))
                        .await?;
                    self.connection.send_line(notice::NICK_RETRY).await?;
                }
                Err(RegistryError::Closed) => {
                    self.notify_shutdown().await;
                    return Ok(false);
                }
                Err(e) => return Err(ChatError::Other(e.to_string())),
            }
        }
    }

    /// Tell an unnamed peer the server is going away, best effort
    ///
    /// Registered peers get the notice from the registry itself.
    async fn notify_shutdown(&self) {
        if !self.registry.is_closed() || self.connection.is_closed() {
            return;
        }
        if let Err(e) = self.connection.send_line(notice::SHUTDOWN).await {
            debug!(session_id = %self.id, error = %e, "Failed to deliver shutdown notice");
        }
    }

    /// Active loop: chat lines and commands until the session ends
    async fn relay(&mut self) -> Result<()> {
        loop {
            let Some(line) = self.next_line().await? else {
                return Ok(());
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Command::parse(line) {
                Some(command) => {
                    if self.dispatcher.dispatch(self.id, command).await == Flow::Quit {
                        return Ok(());
                    }
                }
                None => {
                    let Some(name) = self.registry.name_of(self.id).await else {
                        return Ok(());
                    };
                    debug!(session_id = %self.id, "Relaying chat line");
                    self.registry
                        .broadcast(&notice::chat(&name, line), Some(self.id))
                        .await;
                }
            }
        }
    }

    /// Enter `Closed`; safe to call more than once
    async fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.transition(SessionState::Closed);

        if let Some(name) = self.registry.remove(self.id).await {
            info!(session_id = %self.id, name = %name, "Session left");
        }
        self.connection.close().await;
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session_id = %self.id, from = %self.state, to = %next, "Session state change");
        self.state = next;
    }
}

impl<R> std::fmt::Debug for SessionHandler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("origin", &self.connection.origin())
            .finish()
    }
}
