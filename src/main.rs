//! ==============================================================================
//! main.rs - cyberdeck kiosk host entry point
//! ==============================================================================
//!
//! purpose:
//!     runs the leaderboard kiosk on the raspberry pi. a badge is scanned on
//!     the serial link, the player is looked up on the high score server and
//!     the result is shown on the kiosk page. only one badge is served at a
//!     time.
//!
//! responsibilities:
//!     - load configuration and start logging
//!     - serve the kiosk page and its display socket
//!     - read badge scans from the serial link and hand them to the controller
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                   kiosk host (this file)                    │
//!     │  ┌─────────────┐        ┌──────────────┐                    │
//!     │  │ serial loop │        │  web server  │                    │
//!     │  │ (ingest.rs) │        │ (port 3000)  │◀──── kiosk page    │
//!     │  └──────┬──────┘        └──────┬───────┘      (websocket)   │
//!     │         │ scans                │ name / esc                 │
//!     │         └──────────┬───────────┘                            │
//!     │              ┌─────┴──────┐                                 │
//!     │              │ controller │──▶ watchdog (idle timer)        │
//!     │              └─────┬──────┘                                 │
//!     └────────────────────┼────────────────────────────────────────┘
//!                          │ http (json, double encoded)
//!                   ┌──────┴──────┐
//!                   │ leaderboard │
//!                   │   server    │
//!                   └─────────────┘
//!
//! ==============================================================================

mod config;
mod controller;
mod display;
mod domain;
mod ingest;
mod leaderboard;
mod serial;
mod server;
mod watchdog;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::controller::SessionController;
use crate::display::Display;
use crate::leaderboard::HttpLeaderboard;

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Cyberdeck Kiosk Host");
    println!("  \"One Badge At A Time\"");
    println!("===========================================================");

    // step 1: load configuration
    let config = config::KioskConfig::load_or_default();
    config.print_summary();

    // step 2: logging (RUST_LOG wins over the config file)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // step 3: leaderboard client and controller
    let leaderboard = HttpLeaderboard::new(&config.leaderboard)?;
    let controller = SessionController::new(leaderboard, Display::new(), config.session.clone());

    // step 4: start the web server in background
    let web_controller = controller.clone();
    let bind = config.display.bind.clone();
    let static_dir = config.display.static_dir.clone();
    tokio::spawn(async move {
        tracing::info!(%bind, "kiosk page and display socket live");
        if let Err(e) = server::run_server(web_controller, &bind, &static_dir).await {
            tracing::error!(error = %e, "web server stopped");
        }
    });

    // step 5: serial ingestion loop
    let show_scans = config.logging.show_scan_data;
    let mut lines = serial::spawn_reader(config.serial.clone());
    tracing::info!(path = %config.serial.path, "waiting for badge scans");

    while let Some(line) = lines.recv().await {
        if show_scans {
            tracing::info!(%line, "serial");
        }
        let Some(scan) = ingest::parse_scan(&line) else {
            continue;
        };
        let controller = controller.clone();
        tokio::spawn(async move { controller.on_scan(scan).await });
    }

    tracing::info!("badge reader closed, shutting down");
    Ok(())
}
