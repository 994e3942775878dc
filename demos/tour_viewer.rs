//! All-rooms viewer example
//!
//! Connects to a transcript hub, registers as a viewer, prints the snapshot
//! it joins with, then follows every room live. On Ctrl+C it asks the hub
//! for a point-in-time export before closing.
//!
//! Run with: cargo run --example tour_viewer [SERVER_URL] [--export FILE]
//!
//! Examples:
//!   cargo run --example tour_viewer
//!   cargo run --example tour_viewer ws://localhost:9000
//!   cargo run --example tour_viewer ws://localhost:9000 --export tour.json

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use transcript_hub::protocol::RoomPresence;
use transcript_hub::ServerMessage;

fn print_message(msg: &ServerMessage) {
    match msg {
        ServerMessage::Snapshot {
            session_start,
            rooms,
        } => {
            let lines: usize = rooms.values().map(|v| v.len()).sum();
            println!(
                "Snapshot: {} rooms, {} lines (session started {})",
                rooms.len(),
                lines,
                session_start
            );
            for (room, entries) in rooms {
                match entries.last() {
                    Some(last) => {
                        println!("  [{}] {} lines, last: {}", room, entries.len(), last.text)
                    }
                    None => println!("  [{}] no lines yet", room),
                }
            }
        }
        ServerMessage::Entry(entry) => println!("[{}] {}", entry.room, entry.text),
        ServerMessage::Interim { room, text, .. } => println!("[{}] {} ...", room, text),
        ServerMessage::RoomStatus { room, status } => {
            let word = match status {
                RoomPresence::Connected => "live",
                RoomPresence::Disconnected => "offline",
            };
            println!("[{}] room is {}", room, word);
        }
        ServerMessage::Export(snapshot) => {
            let lines: usize = snapshot.rooms.values().map(|v| v.len()).sum();
            println!(
                "Export at {}: {} rooms, {} lines",
                snapshot.export_time,
                snapshot.rooms.len(),
                lines
            );
        }
        ServerMessage::Error { message } => eprintln!("Hub error: {}", message),
    }
}

fn print_usage() {
    eprintln!("Usage: tour_viewer [SERVER_URL] [--export FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  SERVER_URL     Hub WebSocket URL (default: ws://127.0.0.1:9000)");
    eprintln!("  --export FILE  On Ctrl+C, write the hub's export to FILE as JSON");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut url = "ws://127.0.0.1:9000".to_string();
    let mut export_file: Option<String> = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--export" => match iter.next() {
                Some(path) => export_file = Some(path.clone()),
                None => {
                    eprintln!("Error: --export requires a file path");
                    eprintln!();
                    print_usage();
                    std::process::exit(1);
                }
            },
            other => url = other.to_string(),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (mut ws, _) = connect_async(&url).await?;
    println!("Connected to {}", url);

    ws.send(Message::Text(
        r#"{"type":"register","role":"viewer"}"#.into(),
    ))
    .await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            frame = ws.next() => {
                match frame {
                    None | Some(Ok(Message::Close(_))) => {
                        println!("Hub closed the connection");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        eprintln!("Connection error: {}", e);
                        return Ok(());
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(msg) => print_message(&msg),
                            Err(e) => eprintln!("Unparseable frame: {} ({})", text, e),
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // One parting export so the tour isn't lost
    println!("\nRequesting export...");
    ws.send(Message::Text(r#"{"type":"export"}"#.into())).await?;

    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(frame) = ws.next().await {
            if let Ok(Message::Text(text)) = frame {
                if let Ok(ServerMessage::Export(snapshot)) =
                    serde_json::from_str::<ServerMessage>(text.as_str())
                {
                    return Some(snapshot);
                }
            }
        }
        None
    })
    .await;

    match waited {
        Ok(Some(snapshot)) => {
            print_message(&ServerMessage::Export(snapshot.clone()));
            if let Some(path) = export_file {
                std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
                println!("Wrote {}", path);
            }
        }
        _ => println!("No export reply before close"),
    }

    let _ = ws.close(None).await;
    Ok(())
}
