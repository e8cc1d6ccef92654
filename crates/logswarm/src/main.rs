//! logswarm - gossip chat over discovered append-only logs
//!
//! Every line read from stdin is appended to our own log; every message
//! seen on any log in the swarm is printed to stdout.

use clap::Parser;
use logswarm::config::Config;
use logswarm::events::render_event;
use logswarm::input::forward_lines;
use logswarm::node::Node;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();

    // Initialize logging; stdout is reserved for the chat
    let default_level = if config.verbose { "logswarm=debug" } else { "logswarm=info" };
    let filter = EnvFilter::from_default_env().add_directive(default_level.parse().unwrap());
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    info!("logswarm v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {:#}", e);
        return ExitCode::FAILURE;
    }

    let (node, mut events) = match Node::start(config).await {
        Ok(started) => started,
        Err(e) => {
            error!("Failed to start node: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", render_event(&event));
        }
    });

    let mut status = ExitCode::SUCCESS;
    tokio::select! {
        result = forward_lines(&node, BufReader::new(tokio::io::stdin())) => {
            if let Err(e) = result {
                error!("Failed to read input: {}", e);
                status = ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    node.shutdown();
    drop(node);
    // Let already queued events reach stdout
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        debug!("Event printer did not drain in time");
    }
    status
}
