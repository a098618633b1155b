#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use helix_relay::config::{self, Config};
use helix_relay::logging;
use helix_relay::websocket;

/// HeliX relay -- in-memory WebSocket relay for end-to-end encrypted chat
#[derive(Parser, Debug)]
#[command(name = "helix-relay")]
#[command(about = "An in-memory WebSocket relay for end-to-end encrypted chat and file transfer")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,

    /// Listen address, overriding the configured `host`.
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overriding the configured `port`.
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Verbose frame and routing logs.
    #[arg(long, short = 'd')]
    debug: bool,
}

impl Cli {
    fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.host.clone_from(host);
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if self.debug {
            cfg.debug = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load()?;
    cli.apply_overrides(&mut cfg);

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Listen: {}:{}", cfg.host, cfg.port);
                println!("  TLS enabled: {}", cfg.security.transport.tls.enabled);
                println!(
                    "  Connections per IP: {} per {}s",
                    cfg.rate_limit.max_connections_per_ip, cfg.rate_limit.connection_window_secs
                );
                println!(
                    "  Messages per connection: {} per {}s",
                    cfg.rate_limit.max_messages_per_connection, cfg.rate_limit.message_window_secs
                );
                println!("  Max message size: {} bytes", cfg.relay.max_message_size);
                match cfg.relay.max_file_size_bytes {
                    Some(max) => println!("  Max file size: {max} bytes"),
                    None => println!("  Max file size: unlimited"),
                }
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    logging::init_with_config(&cfg.logging, cfg.debug);
    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        debug = cfg.debug,
        tls = cfg.security.transport.tls.enabled,
        "Starting HeliX relay"
    );

    websocket::run_server(cfg).await
}
