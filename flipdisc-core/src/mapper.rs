//! Canvas → panel mapping
//!
//! For each configured panel, in topology order:
//!
//! 1. Slice the panel's rectangle out of the canvas
//! 2. Apply the panel's orientation to that local slice
//! 3. Pack the result MSB-first, rows padded to a byte
//!
//! Rotations by 90° and 270° swap the slice's width and height, so the
//! packed rows always use the post-orientation width.

use alloc::vec::Vec;
use core::fmt;

use flipdisc_protocol::bits::{fold_columns, get_bit, stride};
use flipdisc_protocol::frame::MAX_DATA_BYTES;
use flipdisc_protocol::{BusFrame, EncodeError, RefreshMode};

use crate::canvas::Canvas;
use crate::config::Topology;
use crate::grid::Grid;

/// Mapping failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MapError {
    /// Packed canvas length does not match its dimensions
    CanvasSize { expected: usize, actual: usize },
    /// Panel rectangle leaves the canvas
    PanelOutOfBounds { index: usize },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::CanvasSize { expected, actual } => write!(
                f,
                "canvas data is {} bytes, expected {}",
                actual, expected
            ),
            MapError::PanelOutOfBounds { index } => {
                write!(f, "panel #{} lies outside the canvas", index)
            }
        }
    }
}

impl core::error::Error for MapError {}

/// One panel's share of a canvas, in panel space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelPayload {
    pub address: u8,
    /// Width after orientation
    pub width: u16,
    /// Height after orientation
    pub height: u16,
    /// MSB-first packed rows, `height * stride(width)` bytes
    pub rows: Vec<u8>,
}

impl PanelPayload {
    pub fn stride(&self) -> usize {
        stride(self.width as usize)
    }

    pub fn pixel(&self, x: u16, y: u16) -> bool {
        x < self.width
            && y < self.height
            && get_bit(&self.rows, self.stride(), x as usize, y as usize)
    }

    /// Column-folded bytes for the bus, bit 0 = top row
    pub fn column_bytes(&self) -> Result<heapless::Vec<u8, MAX_DATA_BYTES>, EncodeError> {
        fold_columns(&self.rows, self.width as usize, self.height as usize)
    }

    /// Frame this payload for the bus
    pub fn encode(&self, mode: RefreshMode) -> Result<BusFrame, EncodeError> {
        BusFrame::panel(self.address, &self.column_bytes()?, mode)
    }
}

/// Splits canvases into per-panel payloads for a fixed topology
#[derive(Debug, Clone)]
pub struct PanelMapper {
    topology: Topology,
}

impl PanelMapper {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Map a canvas to one payload per panel, in topology order
    pub fn map(&self, canvas: &Canvas) -> Result<Vec<PanelPayload>, MapError> {
        let grid = Grid::unpack(
            canvas.as_bytes(),
            canvas.width() as usize,
            canvas.height() as usize,
        );

        let mut payloads = Vec::with_capacity(self.topology.panels().len());
        for (index, panel) in self.topology.panels().iter().enumerate() {
            let local = grid
                .slice(
                    panel.origin.x as usize,
                    panel.origin.y as usize,
                    panel.size.w as usize,
                    panel.size.h as usize,
                )
                .ok_or(MapError::PanelOutOfBounds { index })?
                .oriented(panel.orientation);

            payloads.push(PanelPayload {
                address: panel.address,
                width: local.width() as u16,
                height: local.height() as u16,
                rows: local.pack(),
            });
        }
        Ok(payloads)
    }
}
