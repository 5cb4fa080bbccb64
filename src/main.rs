//! NoteLink - pair a phone with the browser companion
//!
//! Scan the QR code shown by the browser, start a local endpoint for it, and
//! announce that endpoint through the rendezvous relay.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notelink_core::{PairingConfig, PairingRequest};
use notelink_pairing::{
    payload, ChannelHandoff, PairingController, PairingPhase, RelayClient, ScanOutcome,
};
use notelink_server::HttpEndpointLauncher;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// NoteLink - pair this device with a browser companion
#[derive(Parser, Debug)]
#[command(name = "notelink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pair using a scanned code (or one code per stdin line)
    Pair(PairArgs),
    /// Render a pairing code as a terminal QR code
    Qr(QrArgs),
}

#[derive(clap::Args, Debug)]
struct PairArgs {
    /// Scanned pairing payload; read from stdin when omitted
    payload: Option<String>,

    /// Local endpoint port (0 picks a free port)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Interface the local endpoint binds to
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Host announced to the browser (default: primary LAN address)
    #[arg(long)]
    advertise_host: Option<String>,

    /// Relay connect timeout in seconds
    #[arg(long, default_value = "10")]
    relay_timeout_secs: u64,
}

#[derive(clap::Args, Debug)]
struct QrArgs {
    /// Rendezvous session identifier
    #[arg(long)]
    session_id: String,

    /// Bearer token the local endpoint will require
    #[arg(long)]
    token: String,

    /// Relay websocket address (ws:// or wss://)
    #[arg(long)]
    relay: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.into())
                // Frame-level chatter from the websocket stack
                .add_directive("tungstenite=warn".parse()?),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    match args.command {
        Command::Pair(pair) => run_pair(pair).await,
        Command::Qr(qr) => show_qr(qr),
    }
}

async fn run_pair(args: PairArgs) -> Result<()> {
    info!("NoteLink v{}", env!("CARGO_PKG_VERSION"));

    let config = PairingConfig::new()
        .with_bind_address(args.bind)
        .with_port(args.port)
        .with_advertise_host(args.advertise_host)
        .with_relay_connect_timeout(Duration::from_secs(args.relay_timeout_secs));

    let launcher = Arc::new(HttpEndpointLauncher::new(config.clone()));
    let (handoff, mut paired) = ChannelHandoff::new();
    let controller = PairingController::new(
        launcher.clone(),
        Arc::new(handoff),
        RelayClient::from_config(&config),
    );
    let mut status = controller.subscribe();

    // A payload on the command line is a single scan; stdin allows rescans
    let single_scan = args.payload.is_some();
    let mut stdin_open = !single_scan;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    match &args.payload {
        Some(raw) => {
            if let ScanOutcome::Rejected(e) = controller.on_scan(raw) {
                anyhow::bail!(e);
            }
        }
        None => {
            println!();
            println!("  Waiting for a pairing code, one scan per line");
            println!();
        }
    }

    let endpoint = loop {
        tokio::select! {
            result = &mut paired => {
                break result.context("Pairing stopped before hand-off")?;
            }
            changed = status.changed() => {
                changed.context("Pairing controller went away")?;
                let current = status.borrow_and_update().clone();
                if current.phase != PairingPhase::Idle {
                    continue;
                }
                if let Some(error) = current.error {
                    if !stdin_open {
                        anyhow::bail!(error);
                    }
                    eprintln!("  Pairing failed: {}", error);
                    eprintln!("  Scan again to retry");
                    controller.dismiss_error();
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read scan input")? {
                    Some(raw) if raw.trim().is_empty() => {}
                    Some(raw) => match controller.on_scan(&raw) {
                        ScanOutcome::Started(id) => info!("Scan accepted (attempt {})", id),
                        ScanOutcome::Ignored => println!("  Pairing in progress, scan ignored"),
                        // Reported through the status watch
                        ScanOutcome::Rejected(_) => {}
                    },
                    None => {
                        stdin_open = false;
                        if !controller.status().phase.is_in_flight() {
                            anyhow::bail!("Input closed before pairing completed");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.cancel();
                launcher.shutdown().await;
                info!("Pairing cancelled");
                return Ok(());
            }
        }
    };

    println!();
    println!("  ✓ Paired with browser companion");
    println!("  Serving at {}", endpoint.base_url());
    println!("  Press Ctrl+C to stop");
    println!();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutting down...");
    launcher.shutdown().await;
    Ok(())
}

fn show_qr(args: QrArgs) -> Result<()> {
    let request = PairingRequest::new(args.session_id, args.token, args.relay);
    let encoded = request.to_payload();

    // Refuse to render a code the phone would reject
    payload::parse(&encoded).context("Pairing code would not validate")?;

    println!();
    for line in render_pairing_code(&encoded)?.lines() {
        println!("  {}", line);
    }
    println!();
    println!("  Session {} via {}", request.session_id, request.relay_address);
    println!("  {}", encoded);
    println!();
    Ok(())
}

/// Pairing payload as a terminal QR code, two modules per character cell
fn render_pairing_code(encoded: &str) -> Result<String> {
    use qrcode::render::unicode::Dense1x2;
    use qrcode::{EcLevel, QrCode};

    let code = QrCode::with_error_correction_level(encoded.as_bytes(), EcLevel::M)
        .context("Pairing code is too long for a QR code")?;

    Ok(code
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}
