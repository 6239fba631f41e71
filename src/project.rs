use crate::image::FloatImage;
use crate::plane::FloorPlane;
use crate::{Error, FloorObject, FloorObjectDetector, Intrinsics, OutputFormat, PixelRect};

impl FloorObjectDetector {
    /// Lifts each bounding rectangle into the output record: the top-right
    /// and bottom-right corners back-projected onto the floor plane, plus the
    /// minimum valid depth observed inside the rectangle.
    ///
    /// A single degenerate corner rejects the whole frame; it means the
    /// plane fit cannot be trusted for any rectangle in this frame.
    pub(crate) fn project_objects(
        &self,
        rects: &[PixelRect],
        plane: &FloorPlane,
        intrinsics: &Intrinsics,
        depth: &FloatImage,
    ) -> Result<Vec<FloorObject>, Error> {
        let mut objects = Vec::with_capacity(rects.len());
        for &rect in rects {
            let right = f64::from(rect.right());
            let top_right = plane
                .back_project(right, f64::from(rect.y), intrinsics)
                .ok_or(Error::DegenerateProjection)?;
            let bottom_right = plane
                .back_project(right, f64::from(rect.bottom()), intrinsics)
                .ok_or(Error::DegenerateProjection)?;
            objects.push(FloorObject {
                rect,
                top_right,
                bottom_right,
                min_depth: depth.min_positive_in(&rect).unwrap_or(0.0),
            });
        }
        Ok(objects)
    }

    /// Serializes detections into the flat float layout of the configured
    /// output format.
    pub(crate) fn encode(&self, objects: &[FloorObject], intrinsics: &Intrinsics) -> Vec<f32> {
        match self.output {
            OutputFormat::CornerPair => encode_corner_pairs(objects),
            OutputFormat::PlanarRect => encode_planar_rects(objects, intrinsics),
        }
    }
}

/// `[K, X1,Y1,Z1, X2,Y2,Z2, ...]`: two 3D camera-frame corners per object.
pub(crate) fn encode_corner_pairs(objects: &[FloorObject]) -> Vec<f32> {
    let mut out = Vec::with_capacity(1 + 6 * objects.len());
    out.push(objects.len() as f32);
    for object in objects {
        out.extend_from_slice(&[
            object.top_right.x,
            object.top_right.y,
            object.top_right.z,
            object.bottom_right.x,
            object.bottom_right.y,
            object.bottom_right.z,
        ]);
    }
    out
}

/// `[K, tlX, tlY, brX, brY, minDepth, ...]`: the legacy layout with
/// normalized-plane rectangle corners and the minimum valid depth inside the
/// rectangle.
pub(crate) fn encode_planar_rects(objects: &[FloorObject], intrinsics: &Intrinsics) -> Vec<f32> {
    let mut out = Vec::with_capacity(1 + 5 * objects.len());
    out.push(objects.len() as f32);
    for object in objects {
        let rect = object.rect;
        out.extend_from_slice(&[
            intrinsics.ray_x(f64::from(rect.x)) as f32,
            intrinsics.ray_y(f64::from(rect.y)) as f32,
            intrinsics.ray_x(f64::from(rect.right())) as f32,
            intrinsics.ray_y(f64::from(rect.bottom())) as f32,
            object.min_depth,
        ]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{encode_corner_pairs, encode_planar_rects};
    use crate::image::FloatImage;
    use crate::plane::FloorPlane;
    use crate::{Error, FloorObjectDetector, Intrinsics, PixelRect};

    const INTRINSICS: Intrinsics = Intrinsics {
        fx: 500.0,
        fy: 500.0,
        cx: 160.0,
        cy: 120.0,
    };

    const PLANE: FloorPlane = FloorPlane {
        a: 0.0,
        b: 0.0,
        c: 1.0,
    };

    fn depth_with_min(rect: &PixelRect, min_depth: f32) -> FloatImage {
        let mut depth = FloatImage::from_slice(&vec![1.0; 320 * 240], 320, 240);
        depth.put(rect.x as usize + 1, rect.y as usize + 1, min_depth);
        depth
    }

    #[test]
    fn projects_right_corners_onto_the_plane() {
        let detector = FloorObjectDetector::portrait();
        let rect = PixelRect {
            x: 60,
            y: 60,
            width: 40,
            height: 40,
        };
        let depth = depth_with_min(&rect, 0.9);
        let objects = detector
            .project_objects(&[rect], &PLANE, &INTRINSICS, &depth)
            .unwrap();
        assert_eq!(objects.len(), 1);
        let object = &objects[0];
        assert!((object.top_right.x + 0.12).abs() < 1e-6);
        assert!((object.top_right.y + 0.12).abs() < 1e-6);
        assert!((object.top_right.z - 1.0).abs() < 1e-6);
        assert!((object.bottom_right.y + 0.04).abs() < 1e-6);
        assert!((object.min_depth - 0.9).abs() < 1e-6);
    }

    #[test]
    fn degenerate_corner_rejects_the_frame() {
        let detector = FloorObjectDetector::portrait();
        let plane = FloorPlane {
            a: 1.0,
            b: 0.0,
            c: 1.0,
        };
        // right() lands on pixel 660 whose ray is exactly singular.
        let rect = PixelRect {
            x: 600,
            y: 100,
            width: 60,
            height: 40,
        };
        let depth = FloatImage::new(700, 300);
        assert_eq!(
            detector.project_objects(&[rect], &plane, &INTRINSICS, &depth),
            Err(Error::DegenerateProjection)
        );
    }

    #[test]
    fn corner_pair_layout() {
        let detector = FloorObjectDetector::portrait();
        let rect = PixelRect {
            x: 60,
            y: 60,
            width: 40,
            height: 40,
        };
        let depth = depth_with_min(&rect, 0.9);
        let objects = detector
            .project_objects(&[rect], &PLANE, &INTRINSICS, &depth)
            .unwrap();
        let flat = encode_corner_pairs(&objects);
        assert_eq!(flat.len(), 7);
        assert_eq!(flat[0], 1.0);
        assert_eq!(flat[1], objects[0].top_right.x);
        assert_eq!(flat[6], objects[0].bottom_right.z);
    }

    #[test]
    fn planar_rect_layout() {
        let detector = FloorObjectDetector::portrait();
        let rect = PixelRect {
            x: 60,
            y: 60,
            width: 40,
            height: 40,
        };
        let depth = depth_with_min(&rect, 0.9);
        let objects = detector
            .project_objects(&[rect], &PLANE, &INTRINSICS, &depth)
            .unwrap();
        let flat = encode_planar_rects(&objects, &INTRINSICS);
        assert_eq!(flat.len(), 6);
        assert_eq!(flat[0], 1.0);
        assert!((flat[1] + 0.2).abs() < 1e-6); // (60 - 160) / 500
        assert!((flat[3] + 0.12).abs() < 1e-6); // (100 - 160) / 500
        assert!((flat[5] - 0.9).abs() < 1e-6);
    }
}
