use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use futures_util::{Sink, SinkExt, StreamExt};
use std::path::PathBuf;
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, error};

use crate::signaling::{ClientMessage, SdpPayload, ServerMessage};

#[derive(Parser, Debug)]
#[command(name = "beach-pier", version)]
#[command(about = "Beach Pier negotiation relay and probe client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Address to bind the relay to
    #[arg(long, env = "BEACH_PIER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to start the relay on
    #[arg(short, long, env = "BEACH_PIER_PORT", default_value_t = 80)]
    pub port: u16,

    /// Default tracing filter when RUST_LOG is unset
    #[arg(short, long, env = "BEACH_PIER_LOG", default_value = "info")]
    pub log_level: String,

    /// Seconds to wait after shutdown before exiting
    #[arg(long, env = "BEACH_PIER_SHUTDOWN_GRACE_SECS", default_value_t = 1)]
    pub shutdown_grace_secs: u64,

    /// Worker program launched when a browser finds no free worker
    #[arg(long, env = "BEACH_PIER_RENDERER")]
    pub renderer: Option<PathBuf>,

    /// Argument passed to the worker program (repeatable)
    #[arg(long = "renderer-arg", allow_hyphen_values = true)]
    pub renderer_args: Vec<String>,

    /// Working directory for the worker program
    #[arg(long, env = "BEACH_PIER_RENDERER_DIR")]
    pub renderer_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a running relay and walk through a negotiation by hand
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Relay WebSocket URL
    #[arg(short, long, default_value = "ws://localhost:80")]
    pub url: String,

    /// Connection id to open
    #[arg(short, long)]
    pub connection_id: String,

    /// Send an offer with this SDP after connecting
    #[arg(long)]
    pub offer_sdp: Option<String>,

    /// Seconds to keep printing relayed messages
    #[arg(short, long, default_value_t = 5)]
    pub wait_secs: u64,
}

async fn send_message<S>(write: &mut S, message: &ClientMessage) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message)?;
    write.send(Message::Text(text.into())).await?;
    Ok(())
}

fn print_message(message: &ServerMessage) -> Result<()> {
    println!("{}", serde_json::to_string(message)?);
    Ok(())
}

pub async fn run_probe(args: ProbeArgs) -> Result<()> {
    let ProbeArgs {
        url,
        connection_id,
        offer_sdp,
        wait_secs,
    } = args;
    debug!("Connecting to {} for connection id {}", url, connection_id);

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("Failed to connect to {}: {}", url, e);
            return Err(anyhow::anyhow!("Connection failed: {}", e));
        }
        Err(_) => {
            error!("Connection timeout after 5 seconds");
            return Err(anyhow::anyhow!(
                "Connection timeout - is the relay running?"
            ));
        }
    };
    let (mut write, mut read) = ws_stream.split();

    send_message(
        &mut write,
        &ClientMessage::Connect {
            connection_id: connection_id.clone(),
        },
    )
    .await?;

    let polite = timeout(Duration::from_secs(5), async {
        while let Some(frame) = read.next().await {
            if let Message::Text(text) = frame? {
                let message: ServerMessage = serde_json::from_str(&text)?;
                match message {
                    ServerMessage::Connect { polite, .. } => return Ok::<_, anyhow::Error>(polite),
                    ServerMessage::Error { message } => {
                        return Err(anyhow::anyhow!("Connect rejected: {}", message));
                    }
                    other => print_message(&other)?,
                }
            }
        }
        Err(anyhow::anyhow!("Relay closed the connection"))
    })
    .await
    .map_err(|_| anyhow::anyhow!("Timed out waiting for connect acknowledgement"))??;

    eprintln!(
        "connected to {} as {}",
        connection_id,
        if polite { "polite" } else { "impolite" }
    );

    if let Some(sdp) = offer_sdp {
        send_message(
            &mut write,
            &ClientMessage::Offer {
                data: SdpPayload {
                    connection_id: connection_id.clone(),
                    sdp,
                },
            },
        )
        .await?;
    }

    let deadline = Instant::now() + Duration::from_secs(wait_secs);
    loop {
        match timeout_at(deadline, read.next()).await {
            Err(_) => break,
            Ok(None) => return Err(anyhow::anyhow!("Relay closed the connection")),
            Ok(Some(frame)) => {
                if let Message::Text(text) = frame? {
                    let message: ServerMessage = serde_json::from_str(&text)?;
                    print_message(&message)?;
                }
            }
        }
    }

    send_message(
        &mut write,
        &ClientMessage::Disconnect {
            connection_id: connection_id.clone(),
        },
    )
    .await?;

    timeout(Duration::from_secs(5), async {
        while let Some(frame) = read.next().await {
            if let Message::Text(text) = frame? {
                let message: ServerMessage = serde_json::from_str(&text)?;
                if let ServerMessage::Disconnect { connection_id: ref acked } = message {
                    if *acked == connection_id {
                        return Ok::<_, anyhow::Error>(());
                    }
                }
                print_message(&message)?;
            }
        }
        Ok(())
    })
    .await
    .map_err(|_| anyhow::anyhow!("Timed out waiting for disconnect acknowledgement"))??;

    let _ = write.close().await;
    Ok(())
}
