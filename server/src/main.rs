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

//! Chat relay server
//!
//! Listens on `0.0.0.0:12345` until interrupted. Set `RUST_LOG` to change the
//! log level.

use chatrelay_service::{ChatServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = ChatServer::new(ServerConfig::default()).await?;
    server.start().await?;

    tracing::info!("Chat server listening on {}", server.bind_address());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received");

    server.shutdown().await?;

    let metrics = server.metrics().snapshot();
    tracing::info!(
        total_connections = metrics.total_connections,
        messages_relayed = metrics.messages_relayed,
        errors = metrics.total_errors(),
        "Server stopped"
    );

    Ok(())
}
