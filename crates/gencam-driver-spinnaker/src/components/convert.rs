//! Raw-to-processed frame conversion.
//!
//! Transport buffers arrive stride-aligned: each pixel row is padded to the
//! transport alignment (X padding) and extra rows may trail the image (Y
//! padding). Consumers expect tightly packed pixels, so every captured
//! frame goes through `unpack` before it leaves the driver.
//!
//! On the hardware path the `RawImage` is copied out of the SDK buffer and
//! the SDK image handle is released immediately afterwards; the raw buffer
//! here is always owned.

use anyhow::{ensure, Result};
use gencam_core::{Frame, PixelFormat};

/// One captured frame as delivered by the transport: dimensions, padding
/// geometry and the padded pixel buffer.
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Image width in pixels (excluding padding).
    pub width: u32,

    /// Image height in rows (excluding padding).
    pub height: u32,

    /// Bytes per row including X padding.
    pub stride: usize,

    /// Padding pixels appended to each row.
    pub x_padding: u32,

    /// Padding rows appended after the image.
    pub y_padding: u32,

    /// Pixel format of the payload.
    pub format: PixelFormat,

    /// Driver-assigned sequence number.
    pub frame_id: u64,

    /// Padded pixel data, at least `stride * height` bytes.
    pub data: Vec<u8>,
}

/// Copy a padded raw buffer into a tightly packed [`Frame`].
///
/// Walks the buffer row by row at `stride` intervals, keeping the leading
/// `width * bytes_per_pixel` bytes of each row and dropping trailing
/// padding rows.
pub fn unpack(raw: &RawImage) -> Result<Frame> {
    let bpp = raw.format.bytes_per_pixel();
    let packed_row = raw.width as usize * bpp;

    ensure!(
        raw.stride >= packed_row,
        "stride {} smaller than packed row ({} px x {} B)",
        raw.stride,
        raw.width,
        bpp
    );
    ensure!(
        raw.data.len() >= raw.stride * raw.height as usize,
        "raw buffer {} B too small for {} rows of stride {}",
        raw.data.len(),
        raw.height,
        raw.stride
    );

    let mut packed = Vec::with_capacity(packed_row * raw.height as usize);
    for row in raw.data.chunks_exact(raw.stride).take(raw.height as usize) {
        packed.extend_from_slice(&row[..packed_row]);
    }

    Ok(Frame {
        width: raw.width,
        height: raw.height,
        format: raw.format,
        sequence: raw.frame_id,
        data: packed,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn padded_mono8(width: u32, height: u32, stride: usize, y_padding: u32) -> RawImage {
        let mut data = vec![0xEEu8; stride * (height + y_padding) as usize];
        for y in 0..height {
            for x in 0..width {
                data[y as usize * stride + x as usize] = (x + y) as u8;
            }
        }
        RawImage {
            width,
            height,
            stride,
            x_padding: (stride - width as usize) as u32,
            y_padding,
            format: PixelFormat::Mono8,
            frame_id: 3,
            data,
        }
    }

    #[test]
    fn strips_x_and_y_padding() {
        let raw = padded_mono8(5, 4, 8, 2);
        let frame = unpack(&raw).unwrap();

        assert_eq!(frame.width, 5);
        assert_eq!(frame.height, 4);
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.data.len(), 20);
        // Pixel values survive, padding bytes (0xEE) do not.
        assert_eq!(frame.get(0, 0), Some(0));
        assert_eq!(frame.get(4, 3), Some(7));
        assert!(frame.data.iter().all(|&b| b != 0xEE));
    }

    #[test]
    fn tight_buffer_passes_through() {
        let raw = padded_mono8(4, 2, 4, 0);
        let frame = unpack(&raw).unwrap();
        assert_eq!(frame.data, vec![0, 1, 2, 3, 1, 2, 3, 4]);
    }

    #[test]
    fn mono16_rows_keep_byte_order() {
        let width = 3u32;
        let height = 2u32;
        let stride = 8usize; // 6 payload bytes + 2 padding
        let mut data = vec![0u8; stride * height as usize];
        for y in 0..height {
            for x in 0..width {
                let value = (100 * y + x) as u16;
                let offset = y as usize * stride + x as usize * 2;
                data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
        let raw = RawImage {
            width,
            height,
            stride,
            x_padding: 1,
            y_padding: 0,
            format: PixelFormat::Mono16,
            frame_id: 0,
            data,
        };

        let frame = unpack(&raw).unwrap();
        assert_eq!(frame.get(2, 1), Some(102));
        assert_eq!(frame.as_u16_slice().unwrap().len(), 6);
    }

    #[test]
    fn stride_smaller_than_row_errors() {
        let mut raw = padded_mono8(8, 2, 8, 0);
        raw.stride = 4;
        assert!(unpack(&raw).is_err());
    }

    #[test]
    fn short_buffer_errors() {
        let mut raw = padded_mono8(4, 4, 8, 0);
        raw.data.truncate(8);
        assert!(unpack(&raw).is_err());
    }
}
