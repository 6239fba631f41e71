use crate::PixelRect;
use derive_more::{Deref, DerefMut};
use float_ord::FloatOrd;
use image::{ImageBuffer, Luma};

type FloatBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// The float image type used throughout this crate, for both depth maps and
/// residual maps.
///
/// This is a thin wrapper around a contiguous f32 buffer. The pixel value 0
/// means "invalid/unknown" for depth maps, and filters below preserve that
/// convention. NaN values coming from a sensor behave as invalid everywhere:
/// every comparison that admits a pixel is written so that NaN fails it.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct FloatImage(pub FloatBuffer);

impl FloatImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self(ImageBuffer::from_pixel(
            width as u32,
            height as u32,
            Luma([0.0]),
        ))
    }

    /// Copies a caller-owned row-major buffer. The caller keeps ownership of
    /// the source; nothing borrows from it after this returns.
    pub fn from_slice(data: &[f32], width: usize, height: usize) -> Self {
        assert_eq!(data.len(), width * height);
        Self(
            ImageBuffer::from_raw(width as u32, height as u32, data.to_vec())
                .expect("buffer length was just checked against the dimensions"),
        )
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.get_pixel(x as u32, y as u32)[0]
    }

    pub fn put(&mut self, x: usize, y: usize, pixel_value: f32) {
        self.put_pixel(x as u32, y as u32, Luma([pixel_value]));
    }

    pub fn row(&self, y: usize) -> &[f32] {
        let width = self.width();
        &self.0.as_raw()[y * width..(y + 1) * width]
    }

    /// Zeroes out the sensor's noisy edge bands: top/bottom bands of
    /// `height_fraction * height` rows and left/right bands of
    /// `width_fraction * width` columns.
    pub fn zero_border(&mut self, height_fraction: f32, width_fraction: f32) {
        let width = self.width();
        let height = self.height();
        let edge_height = (f64::from(height_fraction) * height as f64) as usize;
        let edge_width = (f64::from(width_fraction) * width as f64) as usize;
        let edge_height = edge_height.min(height);
        let edge_width = edge_width.min(width);
        let buffer: &mut [f32] = &mut self.0;
        for row in buffer.chunks_exact_mut(width).take(edge_height) {
            row.fill(0.0);
        }
        for row in buffer
            .chunks_exact_mut(width)
            .skip(height - edge_height)
        {
            row.fill(0.0);
        }
        for row in buffer.chunks_exact_mut(width) {
            row[..edge_width].fill(0.0);
            row[width - edge_width..].fill(0.0);
        }
    }

    /// Marks every pixel beyond `max_range` invalid (0), leaving everything
    /// else untouched.
    pub fn clamp_far(&mut self, max_range: f32) {
        let buffer: &mut [f32] = &mut self.0;
        for value in buffer.iter_mut() {
            if *value > max_range {
                *value = 0.0;
            }
        }
    }

    /// The minimum valid (strictly positive) value inside a rectangle, or
    /// `None` if the rectangle covers no valid pixel.
    pub fn min_positive_in(&self, rect: &PixelRect) -> Option<f32> {
        let x_end = (rect.right() as usize).min(self.width());
        let y_end = (rect.bottom() as usize).min(self.height());
        (rect.y as usize..y_end)
            .flat_map(|y| self.row(y)[rect.x as usize..x_end].iter().copied())
            .filter(|&d| d > 0.0)
            .map(FloatOrd)
            .min()
            .map(|m| m.0)
    }
}

#[cfg(test)]
mod tests {
    use super::FloatImage;
    use crate::PixelRect;

    #[test]
    fn zero_border_clears_edge_bands() {
        let mut image = FloatImage::from_slice(&[1.0; 80], 10, 8);
        image.zero_border(0.25, 0.1);
        // edge_height = 2, edge_width = 1
        assert_eq!(image.get(5, 0), 0.0);
        assert_eq!(image.get(5, 1), 0.0);
        assert_eq!(image.get(5, 6), 0.0);
        assert_eq!(image.get(0, 4), 0.0);
        assert_eq!(image.get(9, 4), 0.0);
        assert_eq!(image.get(5, 4), 1.0);
        assert_eq!(image.get(1, 2), 1.0);
    }

    #[test]
    fn clamp_far_invalidates_distant_pixels() {
        let mut image = FloatImage::from_slice(&[0.5, 1.5, 1.6, 0.0], 4, 1);
        image.clamp_far(1.5);
        assert_eq!(image.row(0), &[0.5, 1.5, 0.0, 0.0]);
    }

    #[test]
    fn min_positive_skips_invalid_pixels() {
        let mut image = FloatImage::new(4, 4);
        image.put(1, 1, 0.9);
        image.put(2, 2, 1.2);
        let whole = PixelRect {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
        };
        assert_eq!(image.min_positive_in(&whole), Some(0.9));
        let empty_corner = PixelRect {
            x: 3,
            y: 3,
            width: 1,
            height: 1,
        };
        assert_eq!(image.min_positive_in(&empty_corner), None);
    }
}
