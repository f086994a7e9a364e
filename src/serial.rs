//! ==============================================================================
//! serial.rs - badge reader link
//! ==============================================================================
//!
//! purpose:
//!     reads the badge reader's serial stream and hands out one text line at
//!     a time. framing is `\r\n`; bytes are decoded lossily as utf-8.
//!
//! design philosophy:
//!     - "Compile Anywhere": without the `hardware` feature the link is read
//!       as a plain file (a usb cdc tty such as /dev/ttyACM0), or from stdin
//!       when the path is "-".
//!     - on the Pi, the `hardware` feature opens the port through `rppal` so
//!       the baud rate and framing are set explicitly.
//!     - a broken link is logged and reopened after a delay; it never takes
//!       the process down.
//!
//! relationships:
//!     - configured by: config.rs (SerialConfig)
//!     - feeds: main.rs -> ingest.rs
//!
//! ==============================================================================

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::SerialConfig;

/// longest line kept before the partial line is thrown away
const MAX_LINE: usize = 4096;

/// splits a byte stream into lines
///
/// used instead of `AsyncBufReadExt::lines` because the rppal uart is read on
/// a blocking thread, and `lines` fails on invalid utf-8 with no length cap.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// feed raw bytes, returning every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                if !self.overflowed {
                    let text = String::from_utf8_lossy(&self.pending);
                    lines.push(text.trim_end_matches('\r').to_string());
                }
                self.pending.clear();
                self.overflowed = false;
            } else if self.pending.len() < MAX_LINE {
                self.pending.push(byte);
            } else {
                self.overflowed = true;
            }
        }
        lines
    }
}

/// start reading the configured link; lines arrive on the returned channel
pub fn spawn_reader(config: SerialConfig) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(run_reader(config, tx));
    rx
}

async fn run_reader(config: SerialConfig, tx: mpsc::Sender<String>) {
    let reopen_delay = Duration::from_secs(config.reopen_delay_seconds);

    loop {
        let result = if config.path == "-" {
            tracing::info!("reading badge scans from stdin");
            pump(tokio::io::stdin(), &tx).await
        } else {
            read_port(&config, &tx).await
        };

        if tx.is_closed() {
            return;
        }

        match result {
            Ok(()) if config.path == "-" => {
                tracing::info!("stdin closed, badge reader stopped");
                return;
            }
            Ok(()) => tracing::warn!(path = %config.path, "serial link closed"),
            Err(e) => tracing::warn!(path = %config.path, error = %e, "serial link error"),
        }

        tokio::time::sleep(reopen_delay).await;
    }
}

/// copy lines from an async reader until it ends
pub async fn pump<R>(mut reader: R, tx: &mpsc::Sender<String>) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut lines = LineBuffer::new();
    let mut buf = [0u8; 256];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        for line in lines.push(&buf[..n]) {
            if tx.send(line).await.is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(not(feature = "hardware"))]
async fn read_port(config: &SerialConfig, tx: &mpsc::Sender<String>) -> std::io::Result<()> {
    let file = tokio::fs::File::open(&config.path).await?;
    tracing::info!(path = %config.path, "serial link open (file mode)");
    pump(file, tx).await
}

#[cfg(feature = "hardware")]
async fn read_port(config: &SerialConfig, tx: &mpsc::Sender<String>) -> std::io::Result<()> {
    use rppal::uart::{Parity, Uart};

    let path = config.path.clone();
    let baud_rate = config.baud_rate;
    let tx = tx.clone();

    // rppal reads block, so the port lives on its own thread
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let to_io = |e: rppal::uart::Error| std::io::Error::new(std::io::ErrorKind::Other, e);

        let mut uart = Uart::with_path(&path, baud_rate, Parity::None, 8, 1).map_err(to_io)?;
        uart.set_read_mode(1, Duration::ZERO).map_err(to_io)?;
        tracing::info!(path = %path, baud_rate, "serial link open (uart)");

        let mut lines = LineBuffer::new();
        let mut buf = [0u8; 256];
        loop {
            let n = uart.read(&mut buf).map_err(to_io)?;
            for line in lines.push(&buf[..n]) {
                if tx.blocking_send(line).is_err() {
                    return Ok(());
                }
            }
        }
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}
