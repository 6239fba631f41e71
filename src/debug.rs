use crate::color::ycbcr_420sp_to_rgb;
use crate::image::FloatImage;
use crate::{FloorObject, FloorObjectDetector, Frame, PixelRect};
use image::imageops::{resize, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use log::*;
use std::path::Path;

// Matches the residual scaling the dataset tooling expects.
const RESIDUAL_SCALE: f32 = 3000.0;

impl FloorObjectDetector {
    /// Writes the frame's debug artifacts: the scaled residual map and, when
    /// color is available, the color image resized to depth resolution with
    /// the detected rectangles and projected corners marked.
    ///
    /// Strictly a side path: failures are logged and never affect the frame
    /// result.
    pub(crate) fn write_debug_artifacts(
        &self,
        directory: &Path,
        frame: &Frame,
        residual: &FloatImage,
        objects: &[FloorObject],
    ) {
        let stamp = format!("{:.0}", frame.timestamp * 1e9);
        let residual_vis = GrayImage::from_fn(
            residual.width() as u32,
            residual.height() as u32,
            |x, y| {
                let value = residual.get(x as usize, y as usize) * RESIDUAL_SCALE;
                Luma([value.clamp(0.0, 255.0) as u8])
            },
        );
        let residual_path = directory.join(format!("{}-diff-filtered.png", stamp));
        if let Err(error) = residual_vis.save(&residual_path) {
            warn!("failed to write {}: {}", residual_path.display(), error);
        }

        let color = match &frame.color {
            Some(color) => color,
            None => return,
        };
        let decoded = match ycbcr_420sp_to_rgb(color.data, color.width, color.height) {
            Some(decoded) => decoded,
            None => {
                warn!("color frame failed to decode, skipping overlay");
                return;
            }
        };
        let mut annotated = resize(
            &decoded,
            residual.width() as u32,
            residual.height() as u32,
            FilterType::Triangle,
        );
        for object in objects {
            draw_rect(&mut annotated, &object.rect, Rgb([255, 255, 0]));
            draw_dot(&mut annotated, object.rect.right(), object.rect.y, Rgb([255, 0, 0]));
            draw_dot(
                &mut annotated,
                object.rect.right(),
                object.rect.bottom(),
                Rgb([0, 255, 0]),
            );
        }
        let overlay_path = directory.join(format!("{}-contours.png", stamp));
        if let Err(error) = annotated.save(&overlay_path) {
            warn!("failed to write {}: {}", overlay_path.display(), error);
        }
    }
}

fn draw_rect(image: &mut RgbImage, rect: &PixelRect, color: Rgb<u8>) {
    let right = rect.right().min(image.width().saturating_sub(1));
    let bottom = rect.bottom().min(image.height().saturating_sub(1));
    for x in rect.x..=right {
        image.put_pixel(x, rect.y.min(bottom), color);
        image.put_pixel(x, bottom, color);
    }
    for y in rect.y..=bottom {
        image.put_pixel(rect.x.min(right), y, color);
        image.put_pixel(right, y, color);
    }
}

fn draw_dot(image: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let px = x as i64 + dx;
            let py = y as i64 + dy;
            if px >= 0 && py >= 0 && (px as u32) < image.width() && (py as u32) < image.height() {
                image.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}
