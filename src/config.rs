//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `kiosk.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - SerialConfig: Badge reader link (device path, baud rate).
//!     - LeaderboardConfig: Remote high score service address and timeout.
//!     - DisplayConfig: Listener for the kiosk page and display socket.
//!     - SessionConfig: Watchdog delays and prompt texts.
//!     - LoggingConfig: Log filter and scan echo toggle.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct KioskConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConfig {
    /// tty path of the badge reader, or "-" for stdin
    pub path: String,
    pub baud_rate: u32,
    /// wait before reopening a failed link
    pub reopen_delay_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub bind: String,
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// armed when a scan is accepted
    pub lookup_timeout_seconds: u64,
    /// armed after a rejected nickname
    pub retry_timeout_seconds: u64,
    /// armed after a new nickname is registered
    pub welcome_timeout_seconds: u64,
    pub idle_prompt: String,
    pub name_prompt: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_scan_data: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            reopen_delay_seconds: 5,
        }
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            // high score server has a static address on the local network
            base_url: "http://192.168.1.150:3001".to_string(),
            request_timeout_seconds: 5,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            static_dir: "public".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_seconds: 15,
            retry_timeout_seconds: 20,
            welcome_timeout_seconds: 10,
            idle_prompt: "<<< THROW BALLOON!".to_string(),
            name_prompt: "ENTER YOUR NICKNAME:".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_scan_data: true,
        }
    }
}

impl SessionConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_seconds)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_seconds)
    }

    pub fn welcome_timeout(&self) -> Duration {
        Duration::from_secs(self.welcome_timeout_seconds)
    }
}

impl LeaderboardConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl KioskConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    /// Parse configuration from toml text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("kiosk.toml"),
            std::path::PathBuf::from("..").join("config").join("kiosk.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          KIOSK CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Serial: {} @ {}", self.serial.path, self.serial.baud_rate);
        println!("│ Leaderboard: {}", self.leaderboard.base_url);
        println!("│ Display: {}", self.display.bind);
        println!(
            "│ Timeouts: {}s / {}s / {}s",
            self.session.lookup_timeout_seconds,
            self.session.retry_timeout_seconds,
            self.session.welcome_timeout_seconds
        );
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
