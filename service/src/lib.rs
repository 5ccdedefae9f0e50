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

//! Chat Relay Server Implementation
//!
//! This crate provides an async, line-oriented multi-user chat relay. Clients
//! connect over plain TCP, pick a unique nickname, and then every line they
//! send is either a slash command or a chat message relayed to everyone else.
//!
//! - One task per connection, no cap on concurrent sessions
//! - One registry lock guarding names, membership and fan-out
//! - A failed write to any recipient deregisters that recipient
//! - Lines are reassembled across reads and capped in length
//!
//! # Architecture
//!
//! ```text
//! ChatServer (accept loop)
//!     ↓
//! SessionHandler (one per connection) → CommandDispatcher
//!     ↓                                      ↓
//! ClientRegistry (names, broadcast, unicast) ←
//!     ↓
//! ChatConnection (framed writer, LineCodec)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use chatrelay_service::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let server = ChatServer::new(config).await?;
//!     server.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod codec;
mod command;
mod config;
mod connection;
mod error;
mod metrics;
pub mod notice;
mod registry;
mod sender;
mod server;
mod session;
mod types;

pub use codec::LineCodec;
pub use command::{Command, CommandDispatcher, Flow, PrivateMessage, name_is_word, name_too_long};
pub use config::{DEFAULT_PORT, ServerConfig};
pub use connection::{ChatConnection, LineReader};
pub use error::{ChatError, RegistryError, Result};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use registry::ClientRegistry;
pub use server::ChatServer;
pub use session::{SessionHandler, fallback_name};
pub use types::{ServerSnapshot, SessionId, SessionInfo, SessionState};
