use image::{Rgb, RgbImage};

/// Decodes a chroma-subsampled planar color buffer (YCbCr 4:2:0 semi-planar:
/// a full-resolution luma plane followed by a half-resolution interleaved
/// chroma plane) into an RGB image.
///
/// This is a boundary adapter; the detection pipeline itself never reads
/// color data, only the debug overlay does. Returns `None` when the buffer
/// is too short for the claimed dimensions or the dimensions are odd (the
/// subsampled chroma plane requires even extents).
pub fn ycbcr_420sp_to_rgb(data: &[u8], width: usize, height: usize) -> Option<RgbImage> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return None;
    }
    let num_pixels = width * height;
    if data.len() < num_pixels + num_pixels / 2 {
        return None;
    }
    let mut rgb = RgbImage::new(width as u32, height as u32);
    for i in 0..height {
        for j in 0..width {
            let y = 1.164f32 * f32::from(data[i * width + j]) - 16.0;
            let u = f32::from(data[num_pixels + 2 * (j / 2) + (i / 2) * width]) - 128.0;
            let v = f32::from(data[num_pixels + 2 * (j / 2) + 1 + (i / 2) * width]) - 128.0;

            let b = (y + 1.596 * v) as i32;
            let g = (y - 0.392 * u - 0.813 * v) as i32;
            let r = (y + 2.017 * u) as i32;

            rgb.put_pixel(
                j as u32,
                i as u32,
                Rgb([
                    r.clamp(0, 255) as u8,
                    g.clamp(0, 255) as u8,
                    b.clamp(0, 255) as u8,
                ]),
            );
        }
    }
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::ycbcr_420sp_to_rgb;

    fn frame_2x2(luma: u8, cb: u8, cr: u8) -> Vec<u8> {
        vec![luma, luma, luma, luma, cb, cr]
    }

    #[test]
    fn neutral_chroma_produces_gray() {
        let rgb = ycbcr_420sp_to_rgb(&frame_2x2(16, 128, 128), 2, 2).unwrap();
        // 1.164 * 16 - 16 = 2.624, truncated per channel.
        assert_eq!(rgb.get_pixel(0, 0).0, [2, 2, 2]);
        let rgb = ycbcr_420sp_to_rgb(&frame_2x2(235, 128, 128), 2, 2).unwrap();
        assert_eq!(rgb.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn saturated_cb_shifts_channels() {
        let rgb = ycbcr_420sp_to_rgb(&frame_2x2(128, 255, 128), 2, 2).unwrap();
        // y = 132.992, u = 127: r clamps at 255, g = 83.2, b = 132.9.
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 83, 132]);
    }

    #[test]
    fn rejects_short_buffers_and_odd_dimensions() {
        assert!(ycbcr_420sp_to_rgb(&[0; 5], 2, 2).is_none());
        assert!(ycbcr_420sp_to_rgb(&[0; 18], 3, 4).is_none());
    }
}
