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

//! Write side of a chat connection
//!
//! The read half of a socket belongs to its session handler alone. The write
//! half is wrapped in a [`ChatConnection`], a cheap clonable handle that both
//! the session handler and the registry hold, so either may write to or
//! close the peer.

use crate::{ChatError, LineCodec, Result, ServerConfig, SessionId};
use futures_util::SinkExt;
use metrics::{counter, histogram};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// Upper bound on how long closing a connection may wait for buffered output
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Line stream over the read half of an accepted socket
pub type LineReader = FramedRead<OwnedReadHalf, LineCodec>;

/// Shared write handle for one session
#[derive(Clone)]
pub struct ChatConnection {
    writer: Arc<Mutex<FramedWrite<BoxedWriter, LineCodec>>>,

    id: SessionId,
    origin: SocketAddr,
    created_at: Instant,
    write_timeout: Option<Duration>,

    closed: CancellationToken,
    lines_sent: Arc<AtomicU64>,
}

impl ChatConnection {
    /// Wrap any byte sink as a chat connection
    pub fn new<W>(
        writer: W,
        id: SessionId,
        origin: SocketAddr,
        write_timeout: Option<Duration>,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        Self {
            writer: Arc::new(Mutex::new(FramedWrite::new(writer, LineCodec::default()))),
            id,
            origin,
            created_at: Instant::now(),
            write_timeout,
            closed: CancellationToken::new(),
            lines_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Split an accepted socket into a shared write handle and a line reader
    #[instrument(skip(socket, config), fields(session_id = %id))]
    pub fn split(
        socket: TcpStream,
        id: SessionId,
        config: &ServerConfig,
    ) -> Result<(Self, LineReader)> {
        let origin = socket.peer_addr()?;
        let (read_half, write_half) = socket.into_split();

        debug!(origin = %origin, "Splitting connection");

        let reader = FramedRead::new(read_half, LineCodec::new(config.max_line_length));
        let connection = Self::new(write_half, id, origin, config.write_timeout);
        Ok((connection, reader))
    }

    /// Get the session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the peer address
    pub fn origin(&self) -> SocketAddr {
        self.origin
    }

    /// Get when the connection was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get the number of lines written so far
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent.load(Ordering::Relaxed)
    }

    /// Check if the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait until the connection is closed by any holder of the handle
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Write one line, appending the newline terminator
    #[instrument(skip(self, text), fields(session_id = %self.id))]
    pub async fn send_line(&self, text: &str) -> Result<()> {
        if self.is_closed() {
            return Err(ChatError::ConnectionClosed);
        }

        let start = Instant::now();
        let write = async {
            let mut writer = self.writer.lock().await;
            SinkExt::<&str>::send(&mut *writer, text).await
        };
        let result = match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .unwrap_or(Err(ChatError::WriteTimeout)),
            None => write.await,
        };

        match result {
            Ok(()) => {
                self.lines_sent.fetch_add(1, Ordering::Relaxed);
                counter!("chatrelay.lines.sent").increment(1);
                histogram!("chatrelay.line.send_duration").record(start.elapsed().as_secs_f64());
                trace!("Line sent");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to send line");
                Err(e)
            }
        }
    }

    /// Close the connection
    ///
    /// Wakes anything waiting in [`closed`](Self::closed) and shuts down the
    /// write half. Calling this more than once is a no-op.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();

        let shutdown = async {
            let mut writer = self.writer.lock().await;
            SinkExt::<&str>::close(&mut *writer).await
        };
        match tokio::time::timeout(CLOSE_GRACE, shutdown).await {
            Ok(Ok(())) => debug!("Connection closed"),
            Ok(Err(e)) => debug!(error = %e, "Connection closed with error"),
            Err(_) => debug!("Connection close timed out"),
        }
    }
}

impl std::fmt::Debug for ChatConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConnection")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::io::duplex;

    fn origin() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        let (server, client) = duplex(1024);
        let conn = ChatConnection::new(server, SessionId::new(1), origin(), None);
        let mut peer = FramedRead::new(client, LineCodec::default());

        conn.send_line("hello").await.unwrap();
        conn.send_line("world").await.unwrap();

        assert_eq!(peer.next().await.unwrap().unwrap(), "hello");
        assert_eq!(peer.next().await.unwrap().unwrap(), "world");
        assert_eq!(conn.lines_sent(), 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_sends() {
        let (server, client) = duplex(1024);
        let conn = ChatConnection::new(server, SessionId::new(1), origin(), None);
        let mut peer = FramedRead::new(client, LineCodec::default());

        conn.close().await;
        conn.close().await;

        assert!(conn.is_closed());
        assert!(matches!(
            conn.send_line("late").await,
            Err(ChatError::ConnectionClosed)
        ));
        assert!(peer.next().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_wakes_clones() {
        let (server, _client) = duplex(1024);
        let conn = ChatConnection::new(server, SessionId::new(1), origin(), None);
        let watcher = conn.clone();

        let waiter = tokio::spawn(async move { watcher.closed().await });
        conn.close().await;
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_fails() {
        let (server, client) = duplex(64);
        let conn = ChatConnection::new(server, SessionId::new(1), origin(), None);
        drop(client);

        let err = conn.send_line("anyone there?").await.unwrap_err();
        assert!(err.is_transport_error());
    }

    #[tokio::test]
    async fn test_write_timeout_on_stalled_peer() {
        let (server, _client) = duplex(8);
        let conn = ChatConnection::new(
            server,
            SessionId::new(1),
            origin(),
            Some(Duration::from_millis(50)),
        );

        let err = conn.send_line(&"x".repeat(64)).await.unwrap_err();
        assert!(matches!(err, ChatError::WriteTimeout));
    }
}
