//! Configuration file support for stkflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (STKFLASH_*)
//! 3. Local config file (./stkflash.toml)
//! 4. Global config file (~/.config/stkflash/config.toml)
//!
//! USB devices the user chose to remember live in a separate ports file
//! (./stkflash_ports.toml or ~/.config/stkflash/ports.toml) so saving them
//! never rewrites a hand-edited config.

use crate::CliError;
use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stkflash::{Part, TxEnable};

const LOCAL_CONFIG: &str = "stkflash.toml";
const LOCAL_PORTS: &str = "stkflash_ports.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
    /// Direction-enable line for half-duplex adapters.
    pub tx_enable: Option<TxEnable>,
    /// Drive the direction-enable line active-low.
    #[serde(default)]
    pub tx_enable_inverted: bool,
}

/// Port-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Known USB devices for auto-detection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

/// Programming session defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Part the board must report (e.g. "atmega328p"). Unset accepts any.
    pub part: Option<String>,
    /// Verify after programming.
    #[serde(default)]
    pub verify: bool,
    /// Do not pulse the reset line before a session.
    #[serde(default)]
    pub no_reset: bool,
    /// Delay after releasing reset, in milliseconds.
    pub reset_settle_ms: Option<u64>,
    /// Sleep between polls of the receive buffer, in microseconds.
    pub poll_interval_us: Option<u64>,
    /// Empty polls tolerated per expected byte.
    pub rx_wait_ticks: Option<u32>,
}

/// Remembered USB devices, stored apart from the main config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KnownDevices {
    #[serde(default)]
    usb_device: Vec<UsbDevice>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Programming configuration.
    #[serde(default)]
    pub program: ProgramConfig,
}

impl Config {
    /// Load configuration from all available sources.
    ///
    /// Unreadable or invalid files are reported and skipped.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global);
            }
        }

        if let Some(local) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local);
        }

        config.load_known_devices();
        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// An explicitly named file must exist and parse.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| {
            CliError::Config(format!("invalid config file {}: {e}", path.display()))
        })?;
        debug!("Loaded config from {}", path.display());

        config.load_known_devices();
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    fn load_known_devices(&mut self) {
        let candidates = [
            Some(PathBuf::from(LOCAL_PORTS)),
            Self::global_config_dir().map(|dir| dir.join("ports.toml")),
        ];

        for path in candidates.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|content| toml::from_str::<KnownDevices>(&content).ok());
            match parsed {
                Some(known) => {
                    debug!(
                        "Loaded {} remembered device(s) from {}",
                        known.usb_device.len(),
                        path.display()
                    );
                    for device in known.usb_device {
                        if !self.port.usb_device.contains(&device) {
                            self.port.usb_device.push(device);
                        }
                    }
                    return;
                },
                None => warn!("Ignoring unreadable ports file {}", path.display()),
            }
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "stkflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Set values in `other` win.
    fn merge(&mut self, other: Self) {
        let conn = other.port.connection;
        if conn.serial.is_some() {
            self.port.connection.serial = conn.serial;
        }
        if conn.baud.is_some() {
            self.port.connection.baud = conn.baud;
        }
        if conn.tx_enable.is_some() {
            self.port.connection.tx_enable = conn.tx_enable;
        }
        self.port.connection.tx_enable_inverted |= conn.tx_enable_inverted;
        self.port.usb_device.extend(other.port.usb_device);

        let program = other.program;
        if program.part.is_some() {
            self.program.part = program.part;
        }
        self.program.verify |= program.verify;
        self.program.no_reset |= program.no_reset;
        if program.reset_settle_ms.is_some() {
            self.program.reset_settle_ms = program.reset_settle_ms;
        }
        if program.poll_interval_us.is_some() {
            self.program.poll_interval_us = program.poll_interval_us;
        }
        if program.rx_wait_ticks.is_some() {
            self.program.rx_wait_ticks = program.rx_wait_ticks;
        }
    }

    /// Resolve the configured part name.
    pub fn part(&self) -> anyhow::Result<Option<Part>> {
        match &self.program.part {
            None => Ok(None),
            Some(name) => Part::from_name(name)
                .map(Some)
                .ok_or_else(|| CliError::Config(format!("unknown part '{name}'")).into()),
        }
    }

    /// Configured reset settle time.
    pub fn reset_settle(&self) -> Option<Duration> {
        self.program.reset_settle_ms.map(Duration::from_millis)
    }

    /// Configured receive poll interval.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.program.poll_interval_us.map(Duration::from_micros)
    }

    /// Save USB device for future auto-detection.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        let device = UsbDevice { vid, pid };
        if self.port.usb_device.contains(&device) {
            return Ok(());
        }

        // Stay next to a local config when there is one.
        let path = if Path::new(LOCAL_PORTS).exists() || Path::new(LOCAL_CONFIG).exists() {
            PathBuf::from(LOCAL_PORTS)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("ports.toml")
        } else {
            PathBuf::from(LOCAL_PORTS)
        };

        self.port.usb_device.push(device);
        Self::write_known_devices(&path, &self.port.usb_device)?;
        info!("Saved USB device {vid:04X}:{pid:04X} to {}", path.display());
        Ok(())
    }

    fn write_known_devices(path: &Path, devices: &[UsbDevice]) -> anyhow::Result<()> {
        let known = KnownDevices {
            usb_device: devices.to_vec(),
        };
        fs::write(path, toml::to_string_pretty(&known)?)?;
        Ok(())
    }
}
