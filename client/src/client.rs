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

//! Line-oriented chat client implementation

use crate::{ClientConfig, ClientError, Result};
use chatrelay_service::LineCodec;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Printed when the server closes the connection
pub const DISCONNECTED: &str = "*** Disconnected from server";

/// Printed when a line could not be sent
pub const SEND_FAILED: &str = "*** Failed to send, exiting";

const QUIT: &str = "/quit";

/// Why a chat session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `/quit`
    Quit,
    /// Input ran out; `/quit` was sent on the user's behalf
    EndOfInput,
    /// The interrupt signal fired; `/quit` was sent best-effort
    Interrupted,
    /// The server closed the connection
    Disconnected,
    /// A line could not be written to the server
    SendFailed,
}

/// Chat client over any byte stream pair
pub struct ChatClient<R, W> {
    lines: FramedRead<R, LineCodec>,
    sink: FramedWrite<W, LineCodec>,
}

impl ChatClient<OwnedReadHalf, OwnedWriteHalf> {
    /// Connect to the configured server
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        info!("Connecting to {}", config.address());

        let stream = timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| ClientError::ConnectionTimeout)??;

        let (reader, writer) = stream.into_split();
        Ok(Self::from_parts(reader, writer, config.max_line_length))
    }
}

impl<R, W> ChatClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Build a client over an existing reader and writer
    pub fn from_parts(reader: R, writer: W, max_line_length: usize) -> Self {
        Self {
            lines: FramedRead::new(reader, LineCodec::new(max_line_length)),
            sink: FramedWrite::new(writer, LineCodec::new(max_line_length)),
        }
    }

    /// Send one line to the server
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        SinkExt::<&str>::send(&mut self.sink, line).await?;
        Ok(())
    }

    /// Relay between the server and the user until the session ends
    ///
    /// Server lines are written to `output` as they arrive. Non-empty lines
    /// from `input` are forwarded to the server. `interrupt` resolving counts
    /// as a request to leave.
    pub async fn run<I, O, S>(mut self, input: I, output: &mut O, interrupt: S) -> Result<SessionEnd>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let mut input = input.lines();
        tokio::pin!(interrupt);

        let end = loop {
            tokio::select! {
                line = self.lines.next() => match line {
                    Some(Ok(line)) => {
                        output.write_all(line.as_bytes()).await?;
                        output.write_all(b"\n").await?;
                        output.flush().await?;
                    }
                    Some(Err(e)) => {
                        debug!("Read from server failed: {}", e);
                        break Self::report(output, DISCONNECTED, SessionEnd::Disconnected).await?;
                    }
                    None => {
                        break Self::report(output, DISCONNECTED, SessionEnd::Disconnected).await?;
                    }
                },
                line = input.next_line() => match line? {
                    Some(line) if line.is_empty() => {}
                    Some(line) => {
                        if let Err(e) = self.send_line(&line).await {
                            warn!("Send failed: {}", e);
                            break Self::report(output, SEND_FAILED, SessionEnd::SendFailed).await?;
                        }
                        if line.trim().eq_ignore_ascii_case(QUIT) {
                            break SessionEnd::Quit;
                        }
                    }
                    None => {
                        self.leave().await;
                        break SessionEnd::EndOfInput;
                    }
                },
                _ = &mut interrupt => {
                    self.leave().await;
                    break SessionEnd::Interrupted;
                }
            }
        };

        if let Err(e) = SinkExt::<&str>::close(&mut self.sink).await {
            debug!("Close failed: {}", e);
        }
        info!("Chat session ended: {:?}", end);
        Ok(end)
    }

    async fn report<O>(output: &mut O, text: &str, end: SessionEnd) -> Result<SessionEnd>
    where
        O: AsyncWrite + Unpin,
    {
        output.write_all(text.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        Ok(end)
    }

    /// Best-effort `/quit`
    async fn leave(&mut self) {
        if let Err(e) = self.send_line(QUIT).await {
            debug!("Could not send quit: {}", e);
        }
    }
}

impl<R, W> std::fmt::Debug for ChatClient<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient").finish_non_exhaustive()
    }
}
