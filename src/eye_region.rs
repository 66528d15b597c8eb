use nalgebra::{Matrix4, Vector2};

use crate::geometry::{horizontal_flip, BoundingBox};

/// Inter-corner distances below this floor are treated as this value, so a
/// degenerate pair of corners yields a tiny valid crop instead of NaN.
const MIN_CORNER_DISTANCE: f32 = 1.0e-4;

/// Crop transform for one eye.
///
/// `p0` and `p1` are the eye corner points in image space, `rotation` is the
/// face's rotate-at-center matrix, `margin` scales the inter-corner distance
/// into the crop half-extent. The mirrored eye sets `flip` so both eyes
/// present the same canonical orientation to the landmark detector.
///
/// Stateless: recomputed every frame from the tracker-stabilized mesh, so
/// eye crops inherit the face region's stability.
pub fn eye_crop_matrix(
    p0: Vector2<f32>,
    p1: Vector2<f32>,
    rotation: &Matrix4<f32>,
    margin: f32,
    flip: bool,
) -> Matrix4<f32> {
    let mid = (p0 + p1) / 2.0;
    let dist = (p1 - p0).norm().max(MIN_CORNER_DISTANCE);
    let bounds = BoundingBox::from_center_half_extent(mid, Vector2::new(dist, dist) * margin);

    let mut m = bounds.crop_matrix() * rotation;
    if flip {
        m *= horizontal_flip();
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{rotate_at_center, transform_point};
    use crate::types::Point3D;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn crop_is_centered_on_corner_midpoint() {
        let m = eye_crop_matrix(
            Vector2::new(0.3, 0.4),
            Vector2::new(0.5, 0.4),
            &rotate_at_center(0.0),
            1.2,
            false,
        );
        let c = transform_point(&m, Point3D::new(0.5, 0.5, 0.0));
        assert!(close(c.x, 0.4) && close(c.y, 0.4), "crop center at ({}, {})", c.x, c.y);
    }

    #[test]
    fn crop_extent_scales_with_corner_distance() {
        let m = eye_crop_matrix(
            Vector2::new(0.3, 0.4),
            Vector2::new(0.5, 0.4),
            &rotate_at_center(0.0),
            1.2,
            false,
        );
        let left = transform_point(&m, Point3D::new(0.0, 0.5, 0.0));
        let right = transform_point(&m, Point3D::new(1.0, 0.5, 0.0));
        // distance 0.2, half extent 0.24 per side
        assert!(close(right.x - left.x, 0.48), "crop width {}", right.x - left.x);
    }

    #[test]
    fn flipped_eye_mirrors_crop_coordinates() {
        let p0 = Vector2::new(0.6, 0.45);
        let p1 = Vector2::new(0.72, 0.45);
        let rot = rotate_at_center(0.3);
        let plain = eye_crop_matrix(p0, p1, &rot, 1.2, false);
        let mirrored = eye_crop_matrix(p0, p1, &rot, 1.2, true);

        // the mirrored transform at (x, y) lands where the plain one does
        // at (1-x, y): same crop region, opposite horizontal orientation
        let a = transform_point(&mirrored, Point3D::new(0.2, 0.7, 0.0));
        let b = transform_point(&plain, Point3D::new(0.8, 0.7, 0.0));
        assert!(close(a.x, b.x) && close(a.y, b.y), "({}, {}) vs ({}, {})", a.x, a.y, b.x, b.y);
    }

    #[test]
    fn coincident_corners_produce_finite_crop() {
        let p = Vector2::new(0.5, 0.5);
        let m = eye_crop_matrix(p, p, &rotate_at_center(0.0), 1.2, false);
        let q = transform_point(&m, Point3D::new(0.0, 0.0, 0.0));
        assert!(q.x.is_finite() && q.y.is_finite());
        assert!(m.try_inverse().is_some(), "degenerate crop must stay invertible");
    }
}
