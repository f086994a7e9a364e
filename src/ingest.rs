//! ==============================================================================
//! ingest.rs - badge scan line parser
//! ==============================================================================
//!
//! purpose:
//!     turns one line from the badge reader into a `ScanRecord`.
//!     anything that is not a complete record is dropped here, so the
//!     session controller only ever sees well-formed scans.
//!
//! relationships:
//!     - fed by: serial.rs (one framed line at a time)
//!     - feeds: controller.rs (SessionController::on_scan)
//!
//! ==============================================================================

use crate::domain::ScanRecord;

/// parse a raw serial line, returning `None` for malformed input
pub fn parse_scan(line: &str) -> Option<ScanRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let scan: ScanRecord = match serde_json::from_str(line) {
        Ok(scan) => scan,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed scan line");
            return None;
        }
    };

    if scan.device_id.trim().is_empty() {
        tracing::debug!("dropping scan without a device id");
        return None;
    }

    Some(scan)
}
