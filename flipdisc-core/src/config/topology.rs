//! Panel topology
//!
//! A topology is the canvas size plus the ordered list of panels cut out of
//! it. It is validated once, at construction, and is immutable afterwards:
//! a server must never start with a topology that fails validation.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rows on every supported panel
pub const PANEL_ROWS: u16 = 7;

/// Rows one column byte can carry
pub const MAX_PANEL_ROWS: u16 = 8;

/// Supported panel widths (one data byte per column)
pub const PANEL_WIDTHS: [u16; 3] = [7, 14, 28];

/// Per-panel transform from canvas space to panel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Orientation {
    #[default]
    Normal,
    /// 90° clockwise
    #[cfg_attr(feature = "serde", serde(alias = "cw", alias = "rot90cw"))]
    Rot90,
    Rot180,
    /// 90° counter-clockwise
    #[cfg_attr(feature = "serde", serde(alias = "ccw", alias = "rot90ccw"))]
    Rot270,
    /// Mirror left/right
    FlipH,
    /// Mirror top/bottom
    FlipV,
}

impl Orientation {
    /// Whether the transform swaps width and height
    pub fn swaps_axes(self) -> bool {
        matches!(self, Orientation::Rot90 | Orientation::Rot270)
    }
}

/// Error for an unrecognised orientation name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOrientation;

impl FromStr for Orientation {
    type Err = UnknownOrientation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const NAMES: [(&str, Orientation); 10] = [
            ("normal", Orientation::Normal),
            ("rot90", Orientation::Rot90),
            ("cw", Orientation::Rot90),
            ("rot90cw", Orientation::Rot90),
            ("rot180", Orientation::Rot180),
            ("rot270", Orientation::Rot270),
            ("ccw", Orientation::Rot270),
            ("rot90ccw", Orientation::Rot270),
            ("fliph", Orientation::FlipH),
            ("flipv", Orientation::FlipV),
        ];
        let s = s.trim();
        NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, orientation)| *orientation)
            .ok_or(UnknownOrientation)
    }
}

/// Position within the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    pub x: u16,
    pub y: u16,
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Size {
    pub w: u16,
    pub h: u16,
}

/// Canvas dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CanvasSize {
    pub width: u16,
    pub height: u16,
}

/// One physical panel on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PanelConfig {
    /// Human-readable identifier
    pub id: String,
    /// Bus address (0–255)
    pub address: u8,
    /// Top-left corner of the panel's slice of the canvas
    pub origin: Point,
    /// Size of the slice in canvas space
    pub size: Size,
    #[cfg_attr(feature = "serde", serde(default))]
    pub orientation: Orientation,
}

impl PanelConfig {
    /// Size in panel space, after orientation
    pub fn physical_size(&self) -> Size {
        if self.orientation.swaps_axes() {
            Size {
                w: self.size.h,
                h: self.size.w,
            }
        } else {
            self.size
        }
    }

    fn right(&self) -> u32 {
        self.origin.x as u32 + self.size.w as u32
    }

    fn bottom(&self) -> u32 {
        self.origin.y as u32 + self.size.h as u32
    }

    fn overlaps(&self, other: &PanelConfig) -> bool {
        (self.origin.x as u32) < other.right()
            && (other.origin.x as u32) < self.right()
            && (self.origin.y as u32) < other.bottom()
            && (other.origin.y as u32) < self.bottom()
    }
}

/// Topology validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopologyError {
    /// Canvas width or height is zero
    EmptyCanvas,
    /// No panels configured
    NoPanels,
    /// Panel has zero width or height
    EmptyPanel { index: usize },
    /// Panel slice extends past the canvas
    PanelOutOfBounds { index: usize },
    /// Two panels share a bus address
    DuplicateAddress { address: u8 },
    /// Two panels cover the same pixels (strict only)
    Overlap { first: usize, second: usize },
    /// Panel width has no bus command, or its columns do not fit a byte
    UnsupportedPanelSize { index: usize },
    /// Panel is not exactly 7 rows (strict only)
    NonStandardHeight { index: usize },
    /// Panels mix width classes (strict only)
    MixedWidthClass { index: usize },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::EmptyCanvas => f.write_str("canvas has zero width or height"),
            TopologyError::NoPanels => f.write_str("no panels configured"),
            TopologyError::EmptyPanel { index } => write!(f, "panel #{} has zero size", index),
            TopologyError::PanelOutOfBounds { index } => {
                write!(f, "panel #{} extends outside the canvas", index)
            }
            TopologyError::DuplicateAddress { address } => {
                write!(f, "duplicate panel address {}", address)
            }
            TopologyError::Overlap { first, second } => {
                write!(f, "panels #{} and #{} overlap", first, second)
            }
            TopologyError::UnsupportedPanelSize { index } => write!(
                f,
                "panel #{} must be 7, 14 or 28 columns of at most {} rows",
                index, MAX_PANEL_ROWS
            ),
            TopologyError::NonStandardHeight { index } => {
                write!(f, "panel #{} must be {} rows tall", index, PANEL_ROWS)
            }
            TopologyError::MixedWidthClass { index } => {
                write!(f, "panel #{} uses a different width class", index)
            }
        }
    }
}

impl core::error::Error for TopologyError {}

/// Validated, immutable canvas + panel layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    canvas: CanvasSize,
    panels: Vec<PanelConfig>,
    strict: bool,
}

impl Topology {
    /// Validate and build a topology
    ///
    /// Always checks that every panel lies inside the canvas, that bus
    /// addresses are unique and that every panel, after orientation, is 7, 14
    /// or 28 columns of at most 8 rows. With `strict` it also rejects
    /// overlapping panels and requires every panel to be exactly 7 rows of
    /// the same width.
    pub fn new(
        canvas: CanvasSize,
        panels: Vec<PanelConfig>,
        strict: bool,
    ) -> Result<Self, TopologyError> {
        if canvas.width == 0 || canvas.height == 0 {
            return Err(TopologyError::EmptyCanvas);
        }
        if panels.is_empty() {
            return Err(TopologyError::NoPanels);
        }

        let mut seen = [false; 256];
        for (index, panel) in panels.iter().enumerate() {
            if panel.size.w == 0 || panel.size.h == 0 {
                return Err(TopologyError::EmptyPanel { index });
            }
            if panel.right() > canvas.width as u32 || panel.bottom() > canvas.height as u32 {
                return Err(TopologyError::PanelOutOfBounds { index });
            }
            let phys = panel.physical_size();
            if !PANEL_WIDTHS.contains(&phys.w) || phys.h > MAX_PANEL_ROWS {
                return Err(TopologyError::UnsupportedPanelSize { index });
            }
            let slot = &mut seen[panel.address as usize];
            if *slot {
                return Err(TopologyError::DuplicateAddress {
                    address: panel.address,
                });
            }
            *slot = true;
        }

        if strict {
            let class = panels[0].physical_size().w;
            for (index, panel) in panels.iter().enumerate() {
                let phys = panel.physical_size();
                if phys.h != PANEL_ROWS {
                    return Err(TopologyError::NonStandardHeight { index });
                }
                if phys.w != class {
                    return Err(TopologyError::MixedWidthClass { index });
                }
            }
            for (first, a) in panels.iter().enumerate() {
                for (offset, b) in panels[first + 1..].iter().enumerate() {
                    if a.overlaps(b) {
                        return Err(TopologyError::Overlap {
                            first,
                            second: first + 1 + offset,
                        });
                    }
                }
            }
        }

        Ok(Self {
            canvas,
            panels,
            strict,
        })
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Panels in configuration order
    pub fn panels(&self) -> &[PanelConfig] {
        &self.panels
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Generate a row-major grid of identical panels
    ///
    /// Panel `(row, col)` gets id `panel_{row}_{col}` and address
    /// `row * columns + col`.
    pub fn grid(
        panel_width: u16,
        panel_height: u16,
        columns: u16,
        rows: u16,
    ) -> Result<Self, TopologyError> {
        let width = panel_width as u32 * columns as u32;
        let height = panel_height as u32 * rows as u32;
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(TopologyError::PanelOutOfBounds { index: 0 });
        }
        if columns as u32 * rows as u32 > 256 {
            return Err(TopologyError::DuplicateAddress { address: u8::MAX });
        }

        let mut panels = Vec::new();
        for row in 0..rows {
            for col in 0..columns {
                panels.push(PanelConfig {
                    id: alloc::format!("panel_{}_{}", row, col),
                    address: (row * columns + col) as u8,
                    origin: Point {
                        x: col * panel_width,
                        y: row * panel_height,
                    },
                    size: Size {
                        w: panel_width,
                        h: panel_height,
                    },
                    orientation: Orientation::Normal,
                });
            }
        }
        let canvas = CanvasSize {
            width: width as u16,
            height: height as u16,
        };
        Self::new(canvas, panels, true)
    }
}
