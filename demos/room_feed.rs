//! Scripted producer example
//!
//! Connects to a transcript hub, registers as a producer for one room, and
//! feeds it a looping scripted tour: a couple of interim drafts per line,
//! then the finalized line.
//!
//! Run with: cargo run --example room_feed [SERVER_URL] [ROOM] [--mobile]
//!
//! Examples:
//!   cargo run --example room_feed                                    # Assembly Hall via localhost
//!   cargo run --example room_feed ws://localhost:9000 "Map Room"
//!   cargo run --example room_feed ws://localhost:9000 "Map Room" --mobile

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const SCRIPT: &[&str] = &[
    "Welcome everyone, please gather around the model of the original building.",
    "Construction began in 1887 and took nearly eleven years to complete.",
    "The ceiling fresco you see above was restored twice, most recently in 2009.",
    "Notice the carved oak panels along the east wall, each one tells a story.",
    "We'll pause here for two minutes so you can take photographs.",
    "Our next stop is just through the archway on your left.",
];

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Loop the script forever, interims first, then the final line
async fn feed_script(sink: &mut WsSink, room: &str) -> Result<(), WsError> {
    loop {
        for line in SCRIPT {
            let words: Vec<&str> = line.split_whitespace().collect();

            // Two partial drafts, like a recognizer still listening
            for cut in [words.len() / 3, 2 * words.len() / 3] {
                if cut == 0 {
                    continue;
                }
                let interim = json!({
                    "type": "interim",
                    "room": room,
                    "text": words[..cut].join(" "),
                    "timestamp": now_secs(),
                });
                sink.send(Message::Text(interim.to_string().into())).await?;
                tokio::time::sleep(Duration::from_millis(400)).await;
            }

            let fin = json!({
                "type": "final",
                "room": room,
                "text": line,
                "timestamp": now_secs(),
            });
            sink.send(Message::Text(fin.to_string().into())).await?;
            println!("-> {}", line);
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

fn print_usage() {
    eprintln!("Usage: room_feed [SERVER_URL] [ROOM] [--mobile]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  SERVER_URL  Hub WebSocket URL (default: ws://127.0.0.1:9000)");
    eprintln!("  ROOM        Room to feed (default: \"Assembly Hall\")");
    eprintln!("  --mobile    Register as a mobile source instead of an agent");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mobile = args.iter().any(|a| a == "--mobile");
    let positional: Vec<&String> = args
        .iter()
        .skip(1)
        .filter(|a| !a.starts_with("--"))
        .collect();
    let url = positional
        .first()
        .map(|s| s.as_str())
        .unwrap_or("ws://127.0.0.1:9000");
    let room = positional
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("Assembly Hall");

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (ws, _) = connect_async(url).await?;
    println!("Connected to {}", url);
    let (mut sink, mut stream) = ws.split();

    let source = if mobile { "mobile" } else { "agent" };
    let register = json!({
        "type": "register",
        "role": "producer",
        "room": room,
        "source": source,
    });
    sink.send(Message::Text(register.to_string().into())).await?;
    println!("Feeding '{}' as {} producer", room, source);

    // Print anything the hub sends back; for a producer that is mostly
    // error replies
    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => println!("<- {}", text),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        result = feed_script(&mut sink, room) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nStopping feed...");
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    reader.abort();

    Ok(())
}
