use crate::image::FloatImage;
use crate::{FloorObjectDetector, PixelRect};
use image::GrayImage;
use log::*;

/// A raised-pixel connected component: its pixel count and bounding
/// rectangle, both in depth-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Component {
    pub area: usize,
    pub rect: PixelRect,
}

/// Thresholds the residual map into a binary mask of raised pixels.
/// Invalid pixels carry residual 0 and can never pass the threshold.
pub(crate) fn raised_mask(residual: &FloatImage, threshold: f32) -> GrayImage {
    GrayImage::from_fn(residual.width() as u32, residual.height() as u32, |x, y| {
        if residual.get(x as usize, y as usize) > threshold {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}

/// Extracts 8-connected components of mask pixels in raster discovery
/// order. The unraised background is never a component, so every entry is a
/// real candidate region; the order is deterministic for a fixed mask.
pub(crate) fn find_components(mask: &GrayImage) -> Vec<Component> {
    let width = mask.width() as usize;
    let height = mask.height() as usize;
    let data = mask.as_raw();
    let mut visited = vec![false; width * height];
    let mut components = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for start_y in 0..height {
        for start_x in 0..width {
            let start_index = start_y * width + start_x;
            if data[start_index] == 0 || visited[start_index] {
                continue;
            }
            visited[start_index] = true;
            stack.push((start_x, start_y));
            let (mut min_x, mut max_x) = (start_x, start_x);
            let (mut min_y, mut max_y) = (start_y, start_y);
            let mut area = 0usize;
            while let Some((x, y)) = stack.pop() {
                area += 1;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        let neighbor = ny as usize * width + nx as usize;
                        if data[neighbor] != 0 && !visited[neighbor] {
                            visited[neighbor] = true;
                            stack.push((nx as usize, ny as usize));
                        }
                    }
                }
            }
            components.push(Component {
                area,
                rect: PixelRect {
                    x: min_x as u32,
                    y: min_y as u32,
                    width: (max_x - min_x + 1) as u32,
                    height: (max_y - min_y + 1) as u32,
                },
            });
        }
    }
    components
}

impl FloorObjectDetector {
    /// Segments the residual map into candidate raised-object rectangles,
    /// dropping components smaller than `min_area` pixels (a component of
    /// exactly `min_area` pixels is kept).
    pub(crate) fn raised_rects(&self, residual: &FloatImage) -> Vec<PixelRect> {
        let mask = raised_mask(residual, self.residual_threshold);
        let components = find_components(&mask);
        let rects: Vec<PixelRect> = components
            .iter()
            .filter(|component| component.area >= self.min_area)
            .map(|component| component.rect)
            .collect();
        trace!(
            "{} raised components, {} above the {}-pixel area threshold",
            components.len(),
            rects.len(),
            self.min_area
        );
        rects
    }
}
