//! Transcript hub server example
//!
//! Run with: cargo run --example hub_server [BIND_ADDR] [--backup FILE]
//!
//! Examples:
//!   cargo run --example hub_server                              # binds to 0.0.0.0:9000
//!   cargo run --example hub_server localhost                    # binds to 127.0.0.1:9000
//!   cargo run --example hub_server 127.0.0.1:9100               # binds to 127.0.0.1:9100
//!   cargo run --example hub_server --backup transcripts.jsonl   # JSONL backup of finals
//!
//! ## Feeding transcripts into a room
//!
//!   cargo run --example room_feed ws://localhost:9000 "Assembly Hall"
//!
//! ## Watching every room at once
//!
//!   cargo run --example tour_viewer ws://localhost:9000
//!
//! ## Features
//!
//! - Late-joiner support: viewers receive a full snapshot before live entries
//! - Per-room ordering: every viewer sees a room's lines in append order
//! - Backpressure: a viewer that stops reading is disconnected, not buffered forever
//! - Liveness: silent connections are pinged and eventually swept

use std::net::SocketAddr;
use std::path::PathBuf;

use transcript_hub::{HubConfig, HubServer};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:9000
/// - "localhost:9100" -> 127.0.0.1:9100
/// - "127.0.0.1" -> 127.0.0.1:9000
/// - "0.0.0.0:9000" -> 0.0.0.0:9000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 9000;

    // Replace "localhost" with "127.0.0.1"
    let normalized = arg.replace("localhost", "127.0.0.1");

    // Try parsing as SocketAddr first (includes port)
    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    // Try parsing as IP address without port
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: hub_server [BIND_ADDR] [--backup FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR      Address to bind to (default: 0.0.0.0:9000)");
    eprintln!("  --backup FILE  Append finalized entries to FILE as JSONL");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  hub_server                             # binds to 0.0.0.0:9000");
    eprintln!("  hub_server localhost                   # binds to 127.0.0.1:9000");
    eprintln!("  hub_server 127.0.0.1:9100              # binds to 127.0.0.1:9100");
    eprintln!("  hub_server --backup transcripts.jsonl  # with durable backup");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut backup_path: Option<PathBuf> = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--backup" => match iter.next() {
                Some(path) => backup_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("Error: --backup requires a file path");
                    eprintln!();
                    print_usage();
                    std::process::exit(1);
                }
            },
            other => match parse_bind_addr(other) {
                Ok(addr) => bind_addr = Some(addr),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    eprintln!();
                    print_usage();
                    std::process::exit(1);
                }
            },
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("transcript_hub=debug".parse()?)
                .add_directive("hub_server=debug".parse()?),
        )
        .init();

    let mut config = HubConfig::default();
    if let Some(addr) = bind_addr {
        config = config.bind(addr);
    }
    if let Some(path) = backup_path {
        config = config.backup_path(path);
    }

    println!("Starting transcript hub on {}", config.bind_addr);
    println!();
    println!("=== Feed a room ===");
    println!("cargo run --example room_feed ws://localhost:9000 \"Assembly Hall\"");
    println!();
    println!("=== Watch every room ===");
    println!("cargo run --example tour_viewer ws://localhost:9000");
    println!();

    let server = HubServer::bind(config).await?;

    // Run with Ctrl+C handling
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
