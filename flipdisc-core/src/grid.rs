//! Boolean pixel grid
//!
//! The mapper unpacks each panel's slice into a grid, applies the panel's
//! orientation, and packs it again. Keeping the transforms on plain bools
//! makes them easy to compose and to test.

use alloc::vec;
use alloc::vec::Vec;

use flipdisc_protocol::bits::{get_bit, set_bit, stride};

use crate::config::Orientation;

/// Row-major grid of pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl Grid {
    /// All-off grid
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    /// Unpack MSB-first packed rows
    ///
    /// Missing bytes read as off.
    pub fn unpack(packed: &[u8], width: usize, height: usize) -> Self {
        let s = stride(width);
        let mut grid = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                grid.cells[y * width + x] = get_bit(packed, s, x, y);
            }
        }
        grid
    }

    /// Pack to MSB-first rows, zero-padded to a byte boundary
    pub fn pack(&self) -> Vec<u8> {
        let s = stride(self.width);
        let mut out = vec![0u8; s * self.height];
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    set_bit(&mut out, s, x, y, true);
                }
            }
        }
        out
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.cells[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = on;
        }
    }

    /// Copy out the `w × h` rectangle at `(x0, y0)`
    ///
    /// Returns `None` if the rectangle leaves the grid.
    pub fn slice(&self, x0: usize, y0: usize, w: usize, h: usize) -> Option<Self> {
        if x0 + w > self.width || y0 + h > self.height {
            return None;
        }
        let mut out = Self::new(w, h);
        for y in 0..h {
            let src = (y0 + y) * self.width + x0;
            out.cells[y * w..(y + 1) * w].copy_from_slice(&self.cells[src..src + w]);
        }
        Some(out)
    }

    /// Apply a panel orientation
    pub fn oriented(&self, orientation: Orientation) -> Self {
        let (w, h) = (self.width, self.height);
        match orientation {
            Orientation::Normal => self.clone(),
            Orientation::Rot180 => self.map_from(w, h, |x, y| (w - 1 - x, h - 1 - y)),
            // Output is h wide; output (x, y) comes from source (y, h - 1 - x)
            Orientation::Rot90 => self.map_from(h, w, |x, y| (y, h - 1 - x)),
            Orientation::Rot270 => self.map_from(h, w, |x, y| (w - 1 - y, x)),
            Orientation::FlipH => self.map_from(w, h, |x, y| (w - 1 - x, y)),
            Orientation::FlipV => self.map_from(w, h, |x, y| (x, h - 1 - y)),
        }
    }

    fn map_from<F>(&self, out_w: usize, out_h: usize, source: F) -> Self
    where
        F: Fn(usize, usize) -> (usize, usize),
    {
        let mut out = Self::new(out_w, out_h);
        for y in 0..out_h {
            for x in 0..out_w {
                let (sx, sy) = source(x, y);
                out.cells[y * out_w + x] = self.get(sx, sy);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_grid() -> impl Strategy<Value = Grid> {
        (1usize..20, 1usize..20).prop_flat_map(|(w, h)| {
            proptest::collection::vec(any::<bool>(), w * h).prop_map(move |cells| Grid {
                width: w,
                height: h,
                cells,
            })
        })
    }

    #[test]
    fn test_pack_pads_rows() {
        let mut grid = Grid::new(9, 2);
        grid.set(0, 0, true);
        grid.set(8, 1, true);
        assert_eq!(grid.pack(), vec![0x80, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn test_rot90_is_clockwise() {
        // 3x2:  A . .      rotated:  . A
        //       . . B                . .
        //                            B .
        let mut grid = Grid::new(3, 2);
        grid.set(0, 0, true);
        grid.set(2, 1, true);
        let r = grid.oriented(Orientation::Rot90);
        assert_eq!((r.width(), r.height()), (2, 3));
        assert!(r.get(1, 0));
        assert!(r.get(0, 2));
        assert_eq!(r.cells.iter().filter(|&&c| c).count(), 2);
    }

    #[test]
    fn test_rot270_is_counter_clockwise() {
        let mut grid = Grid::new(3, 2);
        grid.set(0, 0, true);
        let r = grid.oriented(Orientation::Rot270);
        assert_eq!((r.width(), r.height()), (2, 3));
        assert!(r.get(0, 2));
    }

    #[test]
    fn test_flips() {
        let mut grid = Grid::new(4, 2);
        grid.set(0, 0, true);
        assert!(grid.oriented(Orientation::FlipH).get(3, 0));
        assert!(grid.oriented(Orientation::FlipV).get(0, 1));
        assert!(grid.oriented(Orientation::Rot180).get(3, 1));
    }

    #[test]
    fn test_slice_bounds() {
        let grid = Grid::new(28, 7);
        assert!(grid.slice(0, 0, 28, 7).is_some());
        assert!(grid.slice(1, 0, 28, 7).is_none());
        assert!(grid.slice(0, 1, 28, 7).is_none());
    }

    proptest! {
        #[test]
        fn prop_pack_unpack_roundtrip(grid in arb_grid()) {
            let packed = grid.pack();
            prop_assert_eq!(packed.len(), stride(grid.width()) * grid.height());
            prop_assert_eq!(Grid::unpack(&packed, grid.width(), grid.height()), grid);
        }

        #[test]
        fn prop_rot180_is_fliph_then_flipv(grid in arb_grid()) {
            let rotated = grid.oriented(Orientation::Rot180);
            let h_then_v = grid.oriented(Orientation::FlipH).oriented(Orientation::FlipV);
            let v_then_h = grid.oriented(Orientation::FlipV).oriented(Orientation::FlipH);
            prop_assert_eq!(&rotated, &h_then_v);
            prop_assert_eq!(&rotated, &v_then_h);
        }

        #[test]
        fn prop_rot180_twice_is_identity(grid in arb_grid()) {
            let twice = grid.oriented(Orientation::Rot180).oriented(Orientation::Rot180);
            prop_assert_eq!(twice, grid);
        }

        #[test]
        fn prop_rot90_then_rot270_is_identity(grid in arb_grid()) {
            let a = grid.oriented(Orientation::Rot90).oriented(Orientation::Rot270);
            let b = grid.oriented(Orientation::Rot270).oriented(Orientation::Rot90);
            prop_assert_eq!(&a, &grid);
            prop_assert_eq!(&b, &grid);
        }
    }
}
