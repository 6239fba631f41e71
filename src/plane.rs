use crate::band::FloorSample;
use crate::image::FloatImage;
use crate::{Error, Intrinsics};
use log::*;
use nalgebra::{Matrix3, Point3, Vector3};

/// The fitted floor plane, expressed in the depth-prediction form
/// `d = a * x_n * d + b * y_n * d + c` where `(x_n, y_n)` is the normalized
/// ray of a pixel and `d` its depth. Valid only for the frame it was fitted
/// on; a fresh plane is computed for every accepted frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorPlane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl FloorPlane {
    /// Least-squares fit through the accumulated floor samples by solving
    /// the normal equations `(AᵀA)⁻¹ Aᵀ b`.
    ///
    /// Degenerate sample geometry makes `AᵀA` singular; that, or any
    /// non-finite coefficient, rejects the frame instead of letting garbage
    /// coefficients through.
    pub(crate) fn fit(samples: &[FloorSample]) -> Result<Self, Error> {
        let mut normal = Matrix3::<f64>::zeros();
        let mut rhs = Vector3::<f64>::zeros();
        for sample in samples {
            normal += sample.direction * sample.direction.transpose();
            rhs += sample.direction * sample.depth;
        }
        let inverse = normal.try_inverse().ok_or(Error::DegeneratePlane)?;
        let coefficients = inverse * rhs;
        let plane = Self {
            a: coefficients.x,
            b: coefficients.y,
            c: coefficients.z,
        };
        if !(plane.a.is_finite() && plane.b.is_finite() && plane.c.is_finite()) {
            return Err(Error::DegeneratePlane);
        }
        debug!(
            "fitted floor plane a={:.5} b={:.5} c={:.5} from {} samples",
            plane.a,
            plane.b,
            plane.c,
            samples.len()
        );
        Ok(plane)
    }

    /// Signed perpendicular distance from the plane for every valid pixel.
    ///
    /// Invalid (zero) depth pixels stay 0 in the output, which downstream
    /// thresholding treats as "not raised".
    pub(crate) fn residual_map(&self, depth: &FloatImage, intrinsics: &Intrinsics) -> FloatImage {
        let width = depth.width();
        let height = depth.height();
        let ray_x: Vec<f64> = (0..width).map(|x| intrinsics.ray_x(x as f64)).collect();
        let ray_y: Vec<f64> = (0..height).map(|y| intrinsics.ray_y(y as f64)).collect();
        let norm = (self.a * self.a + self.b * self.b + 1.0).sqrt();
        let mut residual = FloatImage::new(width, height);
        let output: &mut [f32] = &mut residual.0;
        for (y, row) in (0..height).zip(output.chunks_exact_mut(width)) {
            let source = depth.row(y);
            for x in 0..width {
                let d = f64::from(source[x]);
                if d > 0.0 {
                    row[x] =
                        (((self.a * ray_x[x] + self.b * ray_y[y]) * d + self.c - d) / norm) as f32;
                }
            }
        }
        residual
    }

    /// Back-projects a pixel onto the plane, recovering the camera-frame 3D
    /// point where the pixel's ray meets the floor.
    ///
    /// Returns `None` for the singular ray whose denominator vanishes (the
    /// ray parallel to the plane) and for any non-finite result.
    pub(crate) fn back_project(
        &self,
        px: f64,
        py: f64,
        intrinsics: &Intrinsics,
    ) -> Option<Point3<f32>> {
        let x_n = intrinsics.ray_x(px);
        let y_n = intrinsics.ray_y(py);
        let denominator = 1.0 - x_n * self.a - y_n * self.b;
        if denominator == 0.0 {
            return None;
        }
        let depth = self.c / denominator;
        let point = Point3::new((x_n * depth) as f32, (y_n * depth) as f32, depth as f32);
        if point.iter().all(|v| v.is_finite()) {
            Some(point)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FloorPlane;
    use crate::band::FloorSample;
    use crate::image::FloatImage;
    use crate::{Error, Intrinsics};
    use nalgebra::Vector3;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    const INTRINSICS: Intrinsics = Intrinsics {
        fx: 500.0,
        fy: 500.0,
        cx: 160.0,
        cy: 120.0,
    };

    fn plane_samples(a: f64, b: f64, c: f64, noise: f64) -> Vec<FloorSample> {
        let mut rng = Pcg64::from_seed([7; 32]);
        let mut samples = Vec::new();
        for px in (40..280).step_by(12) {
            for py in (30..230).step_by(10) {
                let x_n = INTRINSICS.ray_x(f64::from(px));
                let y_n = INTRINSICS.ray_y(f64::from(py));
                let depth =
                    c / (1.0 - a * x_n - b * y_n) + rng.gen_range(-noise..=noise);
                samples.push(FloorSample {
                    direction: Vector3::new(x_n * depth, y_n * depth, 1.0),
                    depth,
                });
            }
        }
        samples
    }

    #[test]
    fn fit_recovers_known_plane_under_noise() {
        let samples = plane_samples(0.05, 0.3, 1.0, 0.01);
        let plane = FloorPlane::fit(&samples).unwrap();
        assert!((plane.a - 0.05).abs() < 1e-2);
        assert!((plane.b - 0.3).abs() < 1e-2);
        assert!((plane.c - 1.0).abs() < 1e-2);
    }

    #[test]
    fn fit_rejects_degenerate_geometry() {
        // Every sample on the same ray: the normal matrix is rank one.
        let samples: Vec<FloorSample> = (0..100)
            .map(|_| FloorSample {
                direction: Vector3::new(0.1, 0.2, 1.0),
                depth: 1.0,
            })
            .collect();
        assert_eq!(FloorPlane::fit(&samples), Err(Error::DegeneratePlane));
    }

    #[test]
    fn residual_is_zero_on_plane_and_masked_off_plane() {
        let plane = FloorPlane {
            a: 0.0,
            b: 0.0,
            c: 1.0,
        };
        let mut depth = FloatImage::from_slice(&[1.0; 12], 4, 3);
        depth.put(1, 1, 0.9);
        depth.put(2, 2, 0.0);
        let residual = plane.residual_map(&depth, &INTRINSICS);
        assert!(residual.get(0, 0).abs() < 1e-6);
        assert!((residual.get(1, 1) - 0.1).abs() < 1e-6);
        assert_eq!(residual.get(2, 2), 0.0);
    }

    #[test]
    fn back_projection_on_fronto_parallel_plane() {
        let plane = FloorPlane {
            a: 0.0,
            b: 0.0,
            c: 1.0,
        };
        let point = plane.back_project(100.0, 60.0, &INTRINSICS).unwrap();
        assert!((point.x + 0.12).abs() < 1e-6);
        assert!((point.y + 0.12).abs() < 1e-6);
        assert!((point.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn back_projection_singular_ray_is_rejected() {
        // (660 - 160) / 500 is exactly 1, so the denominator vanishes.
        let plane = FloorPlane {
            a: 1.0,
            b: 0.0,
            c: 1.0,
        };
        assert_eq!(plane.back_project(660.0, 120.0, &INTRINSICS), None);
    }
}
