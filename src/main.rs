#![cfg_attr(not(test), deny(clippy::panic))]

use arena_server::config;
use arena_server::logging;
use arena_server::server::{ArenaServer, TraceTransport};
use clap::Parser;

/// Arena Server -- room/session engine for a real-time multiplayer arena game
#[derive(Parser, Debug)]
#[command(name = "arena-server")]
#[command(about = "Room/session engine for a real-time multiplayer arena game server")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate(&cfg);
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Rooms: {}", cfg.server.rooms.len());
                println!("  Tick interval: {}ms", cfg.server.tick_ms);
                println!("  Resume delay: {:?}", cfg.server.resume_delay_secs);
                println!("  Intermission: {}s", cfg.server.intermission_secs);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }
    validation_result.map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    logging::init_with_config(&cfg.logging);
    tracing::info!(
        rooms = cfg.server.rooms.len(),
        tick_ms = cfg.server.tick_ms,
        "starting arena server"
    );

    let server = ArenaServer::start(&cfg, |_| Box::new(TraceTransport));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    server.shutdown().await;
    Ok(())
}
