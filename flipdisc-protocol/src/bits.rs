//! Packed 1-bit bitmap helpers
//!
//! Canvases and panel payloads are stored row-major, eight pixels per byte,
//! MSB-first, each row padded to a byte boundary. The panel bus wants the
//! same pixels column-folded instead: one byte per column, bit 0 = top row.

use heapless::Vec;

use crate::command::EncodeError;
use crate::frame::MAX_DATA_BYTES;

/// Bytes per packed row
pub const fn stride(width: usize) -> usize {
    (width + 7) / 8
}

/// Read one pixel from a packed bitmap
///
/// Out-of-range coordinates read as off.
pub fn get_bit(bits: &[u8], stride: usize, x: usize, y: usize) -> bool {
    bits.get(y * stride + x / 8)
        .map_or(false, |byte| byte & (0x80 >> (x % 8)) != 0)
}

/// Write one pixel into a packed bitmap
///
/// Out-of-range coordinates are ignored.
pub fn set_bit(bits: &mut [u8], stride: usize, x: usize, y: usize, on: bool) {
    if let Some(byte) = bits.get_mut(y * stride + x / 8) {
        let mask = 0x80 >> (x % 8);
        if on {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}

/// Fold row-major packed rows into one byte per column
///
/// Bit `y` of column byte `x` is pixel `(x, y)`, so the top row lands in
/// the least significant bit. A column holds at most 8 rows and a panel at
/// most [`MAX_DATA_BYTES`] columns.
pub fn fold_columns(
    rows: &[u8],
    width: usize,
    height: usize,
) -> Result<Vec<u8, MAX_DATA_BYTES>, EncodeError> {
    if height > 8 {
        return Err(EncodeError::ColumnTooTall);
    }
    if width > MAX_DATA_BYTES {
        return Err(EncodeError::UnsupportedDataWidth(width));
    }
    let row_stride = stride(width);
    if rows.len() < row_stride * height {
        return Err(EncodeError::ShortRows);
    }

    let mut columns = Vec::new();
    for x in 0..width {
        let mut column = 0u8;
        for y in 0..height {
            if get_bit(rows, row_stride, x, y) {
                column |= 1 << y;
            }
        }
        columns
            .push(column)
            .map_err(|_| EncodeError::UnsupportedDataWidth(width))?;
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stride() {
        assert_eq!(stride(0), 0);
        assert_eq!(stride(1), 1);
        assert_eq!(stride(8), 1);
        assert_eq!(stride(9), 2);
        assert_eq!(stride(28), 4);
    }

    #[test]
    fn test_msb_first() {
        let mut bits = [0u8; 2];
        set_bit(&mut bits, 2, 0, 0, true);
        set_bit(&mut bits, 2, 9, 0, true);
        assert_eq!(bits, [0x80, 0x40]);
        assert!(get_bit(&bits, 2, 0, 0));
        assert!(!get_bit(&bits, 2, 1, 0));
        assert!(!get_bit(&bits, 2, 100, 100));
    }

    #[test]
    fn test_fold_top_row_is_bit_zero() {
        // 28x7, only (0, 0) lit
        let mut rows = [0u8; 4 * 7];
        set_bit(&mut rows, 4, 0, 0, true);
        let columns = fold_columns(&rows, 28, 7).unwrap();
        assert_eq!(columns.len(), 28);
        assert_eq!(columns[0], 0b0000_0001);
        assert!(columns[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_fold_row_weights() {
        let mut rows = [0u8; 7];
        set_bit(&mut rows, 1, 0, 3, true);
        set_bit(&mut rows, 1, 1, 6, true);
        let columns = fold_columns(&rows, 7, 7).unwrap();
        assert_eq!(columns[0], 0x08);
        assert_eq!(columns[1], 0x40);
    }

    #[test]
    fn test_fold_limits() {
        assert_eq!(fold_columns(&[0; 9], 7, 9), Err(EncodeError::ColumnTooTall));
        assert_eq!(
            fold_columns(&[0; 35], 29, 7),
            Err(EncodeError::UnsupportedDataWidth(29))
        );
        assert_eq!(fold_columns(&[0; 3], 7, 7), Err(EncodeError::ShortRows));
    }

    proptest! {
        #[test]
        fn prop_set_then_get(width in 1usize..64, height in 1usize..16, x in 0usize..64, y in 0usize..16) {
            prop_assume!(x < width && y < height);
            let s = stride(width);
            let mut bits = [0u8; 8 * 16];
            set_bit(&mut bits, s, x, y, true);
            prop_assert!(get_bit(&bits, s, x, y));
            prop_assert_eq!(bits.iter().map(|b| b.count_ones()).sum::<u32>(), 1);
            set_bit(&mut bits, s, x, y, false);
            prop_assert!(bits.iter().all(|&b| b == 0));
        }

        #[test]
        fn prop_fold_preserves_pixels(rows in proptest::collection::vec(any::<u8>(), 28)) {
            let columns = fold_columns(&rows, 28, 7).unwrap();
            for x in 0..28 {
                for y in 0..7 {
                    prop_assert_eq!(get_bit(&rows, 4, x, y), columns[x] & (1 << y) != 0);
                }
            }
        }
    }
}
