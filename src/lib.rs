//! Floor-plane fitting and raised-object detection for depth cameras.
//!
//! Given a synchronized depth and color frame plus per-stream camera
//! intrinsics, the pipeline fits a planar floor model from a band of
//! near-floor depth samples, computes each pixel's perpendicular distance
//! from that plane, segments contiguous above-threshold regions into raised
//! object candidates, and reports each candidate's footprint as 3D points in
//! camera-centered coordinates.
//!
//! The pipeline is synchronous and single-threaded: one call per frame,
//! caller-owned buffers that are never retained, and a single piece of
//! cross-call state (the frame-rate gate timestamp). Concurrent use of one
//! detector instance requires external mutual exclusion.

mod band;
mod color;
mod debug;
mod image;
mod plane;
mod project;
mod segment;

pub use crate::band::Orientation;
pub use crate::color::ycbcr_420sp_to_rgb;

use crate::image::FloatImage;
use crate::plane::FloorPlane;
use log::*;
use nalgebra::Point3;
use std::path::PathBuf;

/// Pinhole intrinsics mapping pixel coordinates to normalized camera rays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// Horizontal component of the normalized camera ray through a pixel.
    pub fn ray_x(&self, px: f64) -> f64 {
        (px - self.cx) / self.fx
    }

    /// Vertical component of the normalized camera ray through a pixel.
    pub fn ray_y(&self, py: f64) -> f64 {
        (py - self.cy) / self.fy
    }

    fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// A chroma-subsampled planar color buffer (full-resolution luma plane
/// followed by a half-resolution interleaved chroma plane).
#[derive(Debug, Clone, Copy)]
pub struct ColorFrame<'a> {
    pub data: &'a [u8],
    pub width: usize,
    pub height: usize,
}

/// One sensor frame. The pipeline only reads from it and retains nothing
/// past the call.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Monotonic capture time in seconds. Must be positive.
    pub timestamp: f64,
    /// Row-major depth buffer in meters, `depth_width * depth_height` long.
    /// 0 means invalid/unknown.
    pub depth: &'a [f32],
    pub depth_width: usize,
    pub depth_height: usize,
    pub depth_intrinsics: Intrinsics,
    /// Optional color image; only the debug overlay reads it.
    pub color: Option<ColorFrame<'a>>,
    pub color_intrinsics: Option<Intrinsics>,
}

/// An axis-aligned rectangle in depth-pixel coordinates, with an exclusive
/// bottom-right corner like OpenCV's `Rect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// First column to the right of the rectangle.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// First row below the rectangle.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// A detected raised object: its pixel-space bounding rectangle, the
/// top-right and bottom-right corners back-projected onto the floor plane in
/// camera-frame meters, and the minimum valid depth observed inside the
/// rectangle. Every float is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct FloorObject {
    pub rect: PixelRect,
    pub top_right: Point3<f32>,
    pub bottom_right: Point3<f32>,
    pub min_depth: f32,
}

/// The two historical flat output encodings; see
/// [`FloorObjectDetector::process_frame_flat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `[K, X1,Y1,Z1, X2,Y2,Z2, ...]`: two 3D corners per object.
    CornerPair,
    /// `[K, tlX, tlY, brX, brY, minDepth, ...]`: normalized-plane rectangle
    /// corners plus the minimum depth inside the rectangle (legacy).
    PlanarRect,
}

/// Why a frame produced no result.
///
/// The first four kinds are routine per-frame conditions: the caller simply
/// waits for the next frame. The remaining kinds are violated preconditions,
/// which indicate a caller bug and are never mapped to an empty result.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("frame arrived before the minimum inter-frame interval elapsed")]
    RateLimited,
    #[error("only {found} floor samples found, need at least {needed}")]
    InsufficientEvidence { found: usize, needed: usize },
    #[error("floor sample geometry is degenerate; the normal matrix is singular")]
    DegeneratePlane,
    #[error("a bounding rectangle corner back-projects with a zero denominator")]
    DegenerateProjection,
    #[error("color resolution must match depth resolution for planar-rect output")]
    UnsupportedColorRatio,
    #[error("timestamp must be positive and finite, got {0}")]
    InvalidTimestamp(f64),
    #[error("image dimensions must be positive")]
    InvalidDimensions,
    #[error("buffer holds {actual} elements but the dimensions require {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("camera intrinsics must be strictly positive and finite")]
    InvalidIntrinsics,
}

impl Error {
    /// True for the routine per-frame rejections that resolve to "no result
    /// for this frame" rather than a caller error.
    pub fn is_frame_rejection(&self) -> bool {
        matches!(
            self,
            Error::RateLimited
                | Error::InsufficientEvidence { .. }
                | Error::DegeneratePlane
                | Error::DegenerateProjection
                | Error::UnsupportedColorRatio
        )
    }
}

/// The floor-level object detector.
///
/// All tunables are public fields; the named constructors
/// [`FloorObjectDetector::portrait`] and [`FloorObjectDetector::landscape`]
/// carry the two historical parameter sets. Neither set is more correct;
/// they reflect different camera mounts and frame resolutions.
///
/// The only cross-call state is the rate-gate timestamp, initialized to zero
/// and restored by [`FloorObjectDetector::reset`].
#[derive(Debug, Clone)]
pub struct FloorObjectDetector {
    /// Maximum number of frames to process per second. Must be positive.
    pub target_fps: f64,
    /// Depth beyond which pixels are treated as invalid, in meters.
    pub max_range: f32,
    /// Fraction of the image height zeroed at the top and bottom edges.
    pub edge_height_fraction: f32,
    /// Fraction of the image width zeroed at the left and right edges.
    pub edge_width_fraction: f32,
    /// Which way scan lines run through the floor band.
    pub orientation: Orientation,
    /// Start of the floor band as a fraction of the scanned extent.
    pub band_start_fraction: f32,
    /// End of the floor band as a fraction of the scanned extent.
    pub band_end_fraction: f32,
    /// Lower limit on the depth of floor pixels, in meters.
    pub floor_min_depth: f32,
    /// Maximum depth difference between neighboring pixels of one run.
    pub smoothness: f32,
    /// Minimum dominant-run length for a scan line to contribute samples.
    pub min_run_length: usize,
    /// Number of samples taken from each qualifying scan line.
    pub samples_per_line: usize,
    /// Minimum total sample count required to attempt the plane fit.
    pub min_samples: usize,
    /// Residual magnitude above which a pixel counts as raised, in meters.
    pub residual_threshold: f32,
    /// Minimum component size in pixels; exactly this size is kept.
    pub min_area: usize,
    /// Flat output encoding used by `process_frame_flat`.
    pub output: OutputFormat,
    /// When set, debug artifacts are written into this directory.
    pub debug_dir: Option<PathBuf>,

    prev_timestamp: f64,
}

impl Default for FloorObjectDetector {
    fn default() -> Self {
        Self::portrait()
    }
}

impl FloorObjectDetector {
    /// Parameters for the portrait camera mount: the floor band runs along
    /// image columns near the right edge, at up to 10 frames per second.
    pub fn portrait() -> Self {
        Self {
            target_fps: 10.0,
            max_range: 1.5,
            edge_height_fraction: 0.075,
            edge_width_fraction: 0.1,
            orientation: Orientation::Columns,
            band_start_fraction: 0.80,
            band_end_fraction: 0.88,
            floor_min_depth: 0.65,
            smoothness: 0.03,
            min_run_length: 20,
            samples_per_line: 14,
            min_samples: 50,
            residual_threshold: 0.035,
            min_area: 150,
            output: OutputFormat::CornerPair,
            debug_dir: None,
            prev_timestamp: 0.0,
        }
    }

    /// Parameters for the legacy landscape mount: the floor band runs along
    /// rows near the bottom of the frame, at one frame per second, with the
    /// legacy planar-rect output.
    pub fn landscape() -> Self {
        Self {
            target_fps: 1.0,
            max_range: 1.5,
            edge_height_fraction: 0.0,
            edge_width_fraction: 0.0,
            orientation: Orientation::Rows,
            band_start_fraction: 0.78,
            band_end_fraction: 0.89,
            floor_min_depth: 0.0,
            smoothness: 0.03,
            min_run_length: 100,
            samples_per_line: 7,
            min_samples: 100,
            residual_threshold: 0.03,
            min_area: 1000,
            output: OutputFormat::PlanarRect,
            debug_dir: None,
            prev_timestamp: 0.0,
        }
    }

    /// Forgets the last accepted timestamp, so the next frame is admitted
    /// regardless of how soon it arrives after the previous one.
    pub fn reset(&mut self) {
        self.prev_timestamp = 0.0;
    }

    /// Runs the full pipeline on one frame.
    ///
    /// Routine rejections (rate gating, insufficient floor evidence, a
    /// degenerate fit or projection) come back as errors for which
    /// [`Error::is_frame_rejection`] is true; the caller retries on the next
    /// frame. An empty vector is a valid result: the floor was found and
    /// nothing is standing on it.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Vec<FloorObject>, Error> {
        debug_assert!(self.target_fps > 0.0);
        self.validate(frame)?;
        if frame.timestamp < self.prev_timestamp + 1.0 / self.target_fps {
            return Err(Error::RateLimited);
        }
        self.prev_timestamp = frame.timestamp;
        trace!("accepted frame at {:.6}", frame.timestamp);

        let mut depth = FloatImage::from_slice(frame.depth, frame.depth_width, frame.depth_height);
        depth.zero_border(self.edge_height_fraction, self.edge_width_fraction);
        depth.clamp_far(self.max_range);

        let samples = self.collect_floor_samples(&depth, &frame.depth_intrinsics);
        if samples.len() < self.min_samples {
            return Err(Error::InsufficientEvidence {
                found: samples.len(),
                needed: self.min_samples,
            });
        }
        let plane = FloorPlane::fit(&samples)?;
        let residual = plane.residual_map(&depth, &frame.depth_intrinsics);
        let rects = self.raised_rects(&residual);
        let objects = self.project_objects(&rects, &plane, &frame.depth_intrinsics, &depth)?;
        if let Some(directory) = self.debug_dir.clone() {
            self.write_debug_artifacts(&directory, frame, &residual, &objects);
        }
        info!(
            "frame {:.3}: {} raised objects on the floor plane",
            frame.timestamp,
            objects.len()
        );
        Ok(objects)
    }

    /// Runs the pipeline and serializes the result into the configured flat
    /// float layout, mapping every routine rejection to `Ok(None)`. Only
    /// precondition violations surface as errors.
    ///
    /// With [`OutputFormat::PlanarRect`], a color image whose resolution
    /// differs from the depth resolution is unsupported and yields no
    /// result, matching the legacy entry point's contract.
    pub fn process_frame_flat(&mut self, frame: &Frame) -> Result<Option<Vec<f32>>, Error> {
        let unsupported_ratio = self.output == OutputFormat::PlanarRect
            && frame.color.map_or(false, |color| {
                (color.width, color.height) != (frame.depth_width, frame.depth_height)
            });
        let result = if unsupported_ratio {
            Err(Error::UnsupportedColorRatio)
        } else {
            self.process_frame(frame)
        };
        match result {
            Ok(objects) => Ok(Some(self.encode(&objects, &frame.depth_intrinsics))),
            Err(error) if error.is_frame_rejection() => {
                debug!("no result for this frame: {}", error);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    fn validate(&self, frame: &Frame) -> Result<(), Error> {
        if !(frame.timestamp.is_finite() && frame.timestamp > 0.0) {
            return Err(Error::InvalidTimestamp(frame.timestamp));
        }
        if frame.depth_width == 0 || frame.depth_height == 0 {
            return Err(Error::InvalidDimensions);
        }
        let expected = frame.depth_width * frame.depth_height;
        if frame.depth.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: frame.depth.len(),
            });
        }
        if !frame.depth_intrinsics.is_valid() {
            return Err(Error::InvalidIntrinsics);
        }
        if let Some(color) = &frame.color {
            if color.width == 0 || color.height == 0 {
                return Err(Error::InvalidDimensions);
            }
            let expected = color.width * color.height * 3 / 2;
            if color.data.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: color.data.len(),
                });
            }
        }
        if let Some(intrinsics) = &frame.color_intrinsics {
            if !intrinsics.is_valid() {
                return Err(Error::InvalidIntrinsics);
            }
        }
        Ok(())
    }
}
