//! Canvas storage and diagnostic patterns

use alloc::vec;
use alloc::vec::Vec;
use core::str::FromStr;

use flipdisc_protocol::bits::{get_bit, set_bit, stride};

use crate::config::CanvasSize;
use crate::mapper::MapError;

/// Full-canvas 1-bit bitmap
///
/// Rows are packed MSB-first and padded to a byte boundary. The buffer
/// length is always `height * stride(width)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u16,
    height: u16,
    bits: Vec<u8>,
}

impl Canvas {
    /// All-off canvas
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            bits: vec![0; Self::packed_len(width, height)],
        }
    }

    /// Canvas matching a topology's size
    pub fn for_size(size: CanvasSize) -> Self {
        Self::new(size.width, size.height)
    }

    /// Wrap already-packed rows
    pub fn from_packed(width: u16, height: u16, bits: Vec<u8>) -> Result<Self, MapError> {
        let expected = Self::packed_len(width, height);
        if bits.len() != expected {
            return Err(MapError::CanvasSize {
                expected,
                actual: bits.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    /// Bytes a `width × height` canvas occupies
    pub fn packed_len(width: u16, height: u16) -> usize {
        stride(width as usize) * height as usize
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn size(&self) -> CanvasSize {
        CanvasSize {
            width: self.width,
            height: self.height,
        }
    }

    pub fn stride(&self) -> usize {
        stride(self.width as usize)
    }

    /// Packed rows
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn pixel(&self, x: u16, y: u16) -> bool {
        x < self.width && y < self.height && get_bit(&self.bits, self.stride(), x as usize, y as usize)
    }

    /// Set one pixel; out-of-range coordinates are ignored
    pub fn set_pixel(&mut self, x: u16, y: u16, on: bool) {
        if x < self.width && y < self.height {
            let s = self.stride();
            set_bit(&mut self.bits, s, x as usize, y as usize, on);
        }
    }

    /// Turn every pixel on or off
    pub fn fill(&mut self, on: bool) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_pixel(x, y, on);
            }
        }
    }

    /// Flip every pixel (padding bits stay zero)
    pub fn invert(&mut self) {
        for y in 0..self.height {
            for x in 0..self.width {
                let on = self.pixel(x, y);
                self.set_pixel(x, y, !on);
            }
        }
    }

    /// Number of lit pixels
    pub fn count_on(&self) -> usize {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| self.pixel(x, y))
            .count()
    }
}

/// One queued canvas frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Producer sequence number (wraps)
    pub seq: u32,
    /// Requested display time in ms, 0 = server cadence
    pub duration_ms: u16,
    pub canvas: Canvas,
}

impl Frame {
    pub fn new(seq: u32, canvas: Canvas) -> Self {
        Self {
            seq,
            duration_ms: 0,
            canvas,
        }
    }

    pub fn with_duration(mut self, duration_ms: u16) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Diagnostic patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TestPattern {
    /// Pixels where `(x + y)` is even
    Checkerboard,
    /// Outer ring of pixels
    Border,
    /// Everything on
    Solid,
    /// Everything off
    Clear,
}

/// Error for an unrecognised pattern name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownPattern;

impl FromStr for TestPattern {
    type Err = UnknownPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [
            ("checkerboard", TestPattern::Checkerboard),
            ("border", TestPattern::Border),
            ("solid", TestPattern::Solid),
            ("clear", TestPattern::Clear),
        ]
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(s))
        .map(|(_, pattern)| pattern)
        .ok_or(UnknownPattern)
    }
}

/// Render a diagnostic pattern
pub fn create_test_pattern(width: u16, height: u16, pattern: TestPattern) -> Canvas {
    let mut canvas = Canvas::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let on = match pattern {
                TestPattern::Checkerboard => (x as u32 + y as u32) % 2 == 0,
                TestPattern::Border => x == 0 || y == 0 || x == width - 1 || y == height - 1,
                TestPattern::Solid => true,
                TestPattern::Clear => false,
            };
            canvas.set_pixel(x, y, on);
        }
    }
    canvas
}
