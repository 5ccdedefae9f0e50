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

//! # Chat Relay Client
//!
//! Minimal line-oriented client for the chat relay. Every line the server
//! sends is printed as-is; every non-empty line typed by the user is sent.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chatrelay_client::{ChatClient, ClientConfig};
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("localhost", 12345);
//!     let client = ChatClient::connect(&config).await?;
//!
//!     let input = BufReader::new(tokio::io::stdin());
//!     let mut output = tokio::io::stdout();
//!     let interrupt = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     client.run(input, &mut output, interrupt).await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;

pub use client::{ChatClient, DISCONNECTED, SEND_FAILED, SessionEnd};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
