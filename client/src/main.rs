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

//! Chat relay command line client

use chatrelay_client::{ChatClient, ClientConfig};
use clap::Parser;
use clap::error::ErrorKind;
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: chatrelay-client HOST PORT";

#[derive(Parser, Debug)]
#[command(name = "chatrelay-client")]
#[command(about = "Connect to a chat relay server")]
#[command(version)]
struct Args {
    /// Server hostname or IP address
    host: String,

    /// Server port
    port: u16,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => {
            println!("{}", USAGE);
            return Ok(ExitCode::FAILURE);
        }
    };

    // Chat output owns stdout; diagnostics go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::new(args.host, args.port);
    let client = ChatClient::connect(&config).await?;

    let input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Unable to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let end = client.run(input, &mut output, interrupt).await?;
    tracing::debug!("Exiting after {:?}", end);

    // A blocked stdin read would otherwise hold up runtime shutdown
    std::process::exit(0)
}
