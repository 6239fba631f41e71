use crate::image::FloatImage;
use crate::{FloorObjectDetector, Intrinsics};
use log::*;
use nalgebra::Vector3;

/// Which way scan lines run through the floor band.
///
/// A portrait-mounted camera sees the floor along image columns; a
/// landscape-mounted one sees it along rows near the bottom of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Columns,
    Rows,
}

/// One floor-plane sample: a camera-ray direction row scaled by the observed
/// depth, `((px - cx) * d / fx, (py - cy) * d / fy, 1)`, together with the
/// depth itself. Consumed by the plane fit and then discarded.
pub(crate) struct FloorSample {
    pub direction: Vector3<f64>,
    pub depth: f64,
}

/// A contiguous run of depth-continuous pixels along one scan line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Run {
    pub start: usize,
    pub len: usize,
}

/// Finds the longest run of floor-like pixels along a line.
///
/// A pixel joins the current run when its depth exceeds `floor_min_depth`
/// and differs from the run's reference depth (the previous admitted pixel)
/// by less than `smoothness`. A pixel above the floor minimum that fails the
/// smoothness check starts a new run; one below it breaks the run outright.
/// Ties go to the earliest run, which keeps the result deterministic.
pub(crate) fn dominant_run(line: &[f32], floor_min_depth: f32, smoothness: f32) -> Option<Run> {
    fn commit(candidate: Option<Run>, best: &mut Option<Run>) {
        if let Some(run) = candidate {
            if best.map_or(true, |b| run.len > b.len) {
                *best = Some(run);
            }
        }
    }
    let mut best: Option<Run> = None;
    let mut current: Option<Run> = None;
    let mut run_depth = 0.0f32;
    for (i, &depth) in line.iter().enumerate() {
        if depth > floor_min_depth {
            match current.as_mut() {
                Some(run) if (depth - run_depth).abs() < smoothness => {
                    run.len += 1;
                    run_depth = depth;
                }
                _ => {
                    commit(current.take(), &mut best);
                    current = Some(Run { start: i, len: 1 });
                    run_depth = depth;
                }
            }
        } else {
            commit(current.take(), &mut best);
        }
    }
    commit(current.take(), &mut best);
    best
}

impl FloorObjectDetector {
    /// Scans the configured floor band and accumulates plane-fit samples.
    ///
    /// Each line in the band contributes `samples_per_line` samples spaced
    /// evenly across the interior 10%-80% of its dominant run, or nothing at
    /// all when the dominant run is shorter than `min_run_length` (run edges
    /// are noisy, hence the interior restriction).
    pub(crate) fn collect_floor_samples(
        &self,
        depth: &FloatImage,
        intrinsics: &Intrinsics,
    ) -> Vec<FloorSample> {
        let width = depth.width();
        let height = depth.height();
        let (extent, line_len) = match self.orientation {
            Orientation::Columns => (width, height),
            Orientation::Rows => (height, width),
        };
        let band_start = (f64::from(self.band_start_fraction) * extent as f64) as usize;
        let band_end = ((f64::from(self.band_end_fraction) * extent as f64) as usize).min(extent);
        if band_start >= band_end || self.samples_per_line == 0 {
            return Vec::new();
        }
        let mut samples = Vec::with_capacity((band_end - band_start) * self.samples_per_line);
        let mut line = vec![0.0f32; line_len];
        for line_index in band_start..band_end {
            match self.orientation {
                Orientation::Columns => {
                    for (y, value) in line.iter_mut().enumerate() {
                        *value = depth.get(line_index, y);
                    }
                }
                Orientation::Rows => line.copy_from_slice(depth.row(line_index)),
            }
            let run = match dominant_run(&line, self.floor_min_depth, self.smoothness) {
                Some(run) if run.len >= self.min_run_length => run,
                _ => continue,
            };
            for k in 0..self.samples_per_line {
                let fraction = 0.1 + 0.7 * k as f64 / self.samples_per_line as f64;
                let index = run.start + (fraction * run.len as f64) as usize;
                let depth_value = f64::from(line[index]);
                let (px, py) = match self.orientation {
                    Orientation::Columns => (line_index, index),
                    Orientation::Rows => (index, line_index),
                };
                samples.push(FloorSample {
                    direction: Vector3::new(
                        intrinsics.ray_x(px as f64) * depth_value,
                        intrinsics.ray_y(py as f64) * depth_value,
                        1.0,
                    ),
                    depth: depth_value,
                });
            }
        }
        trace!(
            "collected {} floor samples from {} scan lines",
            samples.len(),
            band_end - band_start
        );
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::{dominant_run, Run};
    use crate::image::FloatImage;
    use crate::{FloorObjectDetector, Intrinsics};

    #[test]
    fn dominant_run_picks_longest_group() {
        let line = [0.0, 0.0, 5.0, 5.0, 5.0, 0.0, 6.0, 6.0, 6.0, 6.0, 0.0];
        let run = dominant_run(&line, 0.5, 0.03).unwrap();
        assert_eq!(run, Run { start: 6, len: 4 });
    }

    #[test]
    fn depth_jump_starts_a_new_run() {
        let line = [1.0, 1.0, 1.2, 1.2, 1.2];
        let run = dominant_run(&line, 0.5, 0.03).unwrap();
        assert_eq!(run, Run { start: 2, len: 3 });
    }

    #[test]
    fn run_reference_depth_follows_the_latest_pixel() {
        // Total drift exceeds the smoothness threshold but each step is
        // below it, so the whole line is one run.
        let line = [1.0, 1.01, 1.02, 1.03, 1.04];
        let run = dominant_run(&line, 0.5, 0.03).unwrap();
        assert_eq!(run, Run { start: 0, len: 5 });
    }

    #[test]
    fn no_run_below_floor_minimum() {
        assert_eq!(dominant_run(&[0.1, 0.2, 0.3], 0.5, 0.03), None);
    }

    #[test]
    fn band_scan_samples_every_qualifying_line() {
        let detector = FloorObjectDetector::portrait();
        let intrinsics = Intrinsics {
            fx: 50.0,
            fy: 50.0,
            cx: 20.0,
            cy: 20.0,
        };
        let mut depth = FloatImage::from_slice(&[1.0; 1600], 40, 40);
        depth.zero_border(detector.edge_height_fraction, detector.edge_width_fraction);
        let samples = detector.collect_floor_samples(&depth, &intrinsics);
        // Band covers columns 32..35, each with a 34-pixel valid run.
        assert_eq!(samples.len(), 3 * detector.samples_per_line);
        for sample in &samples {
            assert_eq!(sample.depth, 1.0);
            assert_eq!(sample.direction.z, 1.0);
        }
    }
}
