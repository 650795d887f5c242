//! Server configuration
//!
//! Loaded once from TOML at startup and turned into the immutable pieces
//! the pipeline runs on: a validated [`Topology`], serial line settings,
//! and buffer sizing. Two layouts are accepted:
//!
//! - explicit: `[canvas]` plus one `[[panels]]` table per panel
//! - grid shorthand: `[display]` with a panel type and a row/column count,
//!   expanded row-major with sequential addresses

use std::path::Path;

use embassy_time::Duration;
use log::info;
use serde::Deserialize;

use flipdisc_core::buffer::BufferConfig;
use flipdisc_core::config::{
    CanvasSize, DataBits, PanelConfig, Parity, SerialSettings, StopBits, Topology, DEFAULT_BAUD,
};

use crate::error::ConfigError;

/// Grid shorthand: identical panels in rows and columns
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GridConfig {
    /// "7x7", "14x7" or "28x7"
    pub panel_type: String,
    #[serde(default = "one")]
    pub columns: u16,
    #[serde(default = "one")]
    pub rows: u16,
}

/// `[serial]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. /dev/ttyUSB0
    pub device: String,
    pub baud: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub timeout_ms: u32,
    /// Capture writes in memory instead of opening the device
    pub mock: bool,
    /// Settling delay between panel writes, in microseconds
    pub interpanel_us: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: String::from("/dev/ttyUSB0"),
            baud: DEFAULT_BAUD,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: 1,
            timeout_ms: 1000,
            mock: true,
            interpanel_us: 0,
        }
    }
}

/// `[runtime]` table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub target_fps: u32,
    /// Display time the frame buffer may hold, in seconds
    pub buffer_duration_s: f64,
    /// Minimum gap between ticks, in ms
    pub frame_gap_ms: u64,
    /// Reject overlapping panels and mixed or unsupported panel sizes
    pub strict: bool,
    /// Seconds between status log lines, 0 to disable
    pub status_interval_s: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            buffer_duration_s: 0.5,
            frame_gap_ms: 0,
            strict: true,
            status_interval_s: 10,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub canvas: Option<CanvasSize>,
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
    #[serde(default)]
    pub display: Option<GridConfig>,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Default for ServerConfig {
    /// A single 28x7 panel on a mock link
    fn default() -> Self {
        Self {
            canvas: None,
            panels: Vec::new(),
            display: Some(GridConfig {
                panel_type: String::from("28x7"),
                columns: 1,
                rows: 1,
            }),
            serial: SerialConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

fn one() -> u16 {
    1
}

impl ServerConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Build and validate the panel topology
    ///
    /// The explicit layout wins when both are present. Half of an explicit
    /// layout is an error rather than a silent fall back to `[display]`.
    pub fn topology(&self) -> Result<Topology, ConfigError> {
        match (self.canvas, self.panels.is_empty()) {
            (Some(canvas), false) => {
                return Ok(Topology::new(
                    canvas,
                    self.panels.clone(),
                    self.runtime.strict,
                )?);
            }
            (Some(_), true) => {
                return Err(ConfigError::IncompleteLayout("[canvas] has no [[panels]]"));
            }
            (None, false) => {
                return Err(ConfigError::IncompleteLayout("[[panels]] given without [canvas]"));
            }
            (None, true) => {}
        }
        let grid = self.display.as_ref().ok_or(ConfigError::MissingLayout)?;
        let (w, h) = parse_panel_type(&grid.panel_type)?;
        Ok(Topology::grid(w, h, grid.columns, grid.rows)?)
    }

    /// Serial line settings
    pub fn serial_settings(&self) -> Result<SerialSettings, ConfigError> {
        let serial = &self.serial;
        if serial.baud == 0 {
            return Err(ConfigError::Serial("baud must be > 0"));
        }
        // Start, end and command bytes all use the high bit
        if serial.data_bits != 8 {
            return Err(ConfigError::Serial("data_bits must be 8"));
        }
        Ok(SerialSettings {
            baud: serial.baud,
            data_bits: DataBits::from_count(serial.data_bits)
                .ok_or(ConfigError::Serial("data_bits must be 8"))?,
            parity: serial.parity,
            stop_bits: StopBits::from_count(serial.stop_bits)
                .ok_or(ConfigError::Serial("stop_bits must be 1 or 2"))?,
            timeout_ms: serial.timeout_ms,
        })
    }

    /// Frame buffer sizing
    pub fn buffer_config(&self) -> Result<BufferConfig, ConfigError> {
        let runtime = &self.runtime;
        if runtime.target_fps == 0 {
            return Err(ConfigError::Runtime("target_fps must be > 0"));
        }
        if !(runtime.buffer_duration_s.is_finite() && runtime.buffer_duration_s > 0.0) {
            return Err(ConfigError::Runtime("buffer_duration_s must be > 0"));
        }
        Ok(BufferConfig {
            target_fps: runtime.target_fps,
            buffer_duration_ms: (runtime.buffer_duration_s * 1000.0).round() as u32,
        })
    }

    pub fn frame_gap(&self) -> Duration {
        Duration::from_millis(self.runtime.frame_gap_ms)
    }

    pub fn interpanel_delay(&self) -> Duration {
        Duration::from_micros(self.serial.interpanel_us)
    }

    /// Status log period, `None` when disabled
    pub fn status_interval(&self) -> Option<Duration> {
        match self.runtime.status_interval_s {
            0 => None,
            s => Some(Duration::from_secs(s)),
        }
    }
}

/// Parse "WxH" panel type names
fn parse_panel_type(name: &str) -> Result<(u16, u16), ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "7x7" => Ok((7, 7)),
        "14x7" => Ok((14, 7)),
        "28x7" => Ok((28, 7)),
        _ => Err(ConfigError::PanelType(name.to_string())),
    }
}

/// Log a summary of the loaded configuration
pub fn log_config_summary(config: &ServerConfig, topology: &Topology) {
    let canvas = topology.canvas();
    info!(
        "Config: canvas {}x{}, {} panels, strict={}",
        canvas.width,
        canvas.height,
        topology.panels().len(),
        topology.is_strict()
    );
    for panel in topology.panels() {
        info!(
            "  panel '{}': addr={} origin=({},{}) size={}x{} orientation={:?}",
            panel.id,
            panel.address,
            panel.origin.x,
            panel.origin.y,
            panel.size.w,
            panel.size.h,
            panel.orientation
        );
    }
    info!(
        "  serial: {} @ {} baud, parity={:?}, {} data, {} stop, mock={}, interpanel={}us",
        config.serial.device,
        config.serial.baud,
        config.serial.parity,
        config.serial.data_bits,
        config.serial.stop_bits,
        config.serial.mock,
        config.serial.interpanel_us
    );
    info!(
        "  runtime: {} fps, {}s buffer, {}ms frame gap",
        config.runtime.target_fps, config.runtime.buffer_duration_s, config.runtime.frame_gap_ms
    );
}
