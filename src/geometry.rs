use nalgebra::{Matrix4, Point3, Vector2, Vector3};
use std::f32::consts::FRAC_PI_2;

use crate::types::Point3D;

/// Axis-aligned bounding box used to track the face region.
/// Coordinates are normalized image UV (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vector2<f32>,
    pub max: Vector2<f32>,
}

impl BoundingBox {
    pub fn new(min: Vector2<f32>, max: Vector2<f32>) -> Self {
        Self { min, max }
    }

    /// Box of the given full size centered at `center`.
    pub fn from_center_extent(center: Vector2<f32>, extent: Vector2<f32>) -> Self {
        Self {
            min: center - extent / 2.0,
            max: center + extent / 2.0,
        }
    }

    /// Box reaching `half` out from `center` on each side.
    pub fn from_center_half_extent(center: Vector2<f32>, half: Vector2<f32>) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Vector2<f32> {
        (self.min + self.max) / 2.0
    }

    pub fn extent(&self) -> Vector2<f32> {
        self.max - self.min
    }

    /// Box area; zero for degenerate boxes.
    pub fn area(&self) -> f32 {
        let e = self.extent();
        e.x.max(0.0) * e.y.max(0.0)
    }

    /// Same center, both sides grown to the longer one.
    pub fn squarified(&self) -> Self {
        let e = self.extent();
        let side = e.x.max(e.y);
        Self::from_center_extent(self.center(), Vector2::new(side, side))
    }

    /// Same center, extent multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self::from_center_extent(self.center(), self.extent() * factor)
    }

    /// Intersection-over-union. Returns 0 when the union is degenerate,
    /// so disjoint or empty boxes never produce NaN.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let p0 = self.min.sup(&other.min);
        let p1 = self.max.inf(&other.max);
        let inner = (p1.x - p0.x).max(0.0) * (p1.y - p0.y).max(0.0);
        let union = self.area() + other.area() - inner;
        if union <= 0.0 {
            return 0.0;
        }
        inner / union
    }

    /// Maps the unit square onto this box (no rotation).
    pub fn crop_matrix(&self) -> Matrix4<f32> {
        translate(self.min) * scale(self.extent())
    }
}

pub fn translate(v: Vector2<f32>) -> Matrix4<f32> {
    Matrix4::new_translation(&Vector3::new(v.x, v.y, 0.0))
}

pub fn scale(v: Vector2<f32>) -> Matrix4<f32> {
    Matrix4::new_nonuniform_scaling(&Vector3::new(v.x, v.y, 1.0))
}

/// Rotation about the center of the unit square, so rotating a crop
/// does not translate its content.
pub fn rotate_at_center(angle: f32) -> Matrix4<f32> {
    translate(Vector2::new(0.5, 0.5))
        * Matrix4::new_rotation(Vector3::new(0.0, 0.0, angle))
        * translate(Vector2::new(-0.5, -0.5))
}

/// Mirror about the vertical centerline of the unit square.
pub fn horizontal_flip() -> Matrix4<f32> {
    translate(Vector2::new(1.0, 0.0)) * scale(Vector2::new(-1.0, 1.0))
}

/// Crop transform: translation, then scale, then rotation at the crop center.
/// The order is fixed; callers depend on rotation happening inside the crop.
pub fn crop_matrix(angle: f32, scale_v: Vector2<f32>, offset: Vector2<f32>) -> Matrix4<f32> {
    translate(offset) * scale(scale_v) * rotate_at_center(angle)
}

/// Roll angle of a face whose up direction (mouth toward eyes) is `up`,
/// in y-down image coordinates. Zero for an upright face.
pub fn roll_angle(up: Vector2<f32>) -> f32 {
    up.y.atan2(up.x) + FRAC_PI_2
}

/// Applies a crop matrix to a point in crop-local space.
pub fn transform_point(m: &Matrix4<f32>, p: Point3D) -> Point3D {
    let q = m.transform_point(&Point3::new(p.x, p.y, p.z));
    Point3D::new(q.x, q.y, q.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn iou_of_box_with_itself_is_one() {
        let b = BoundingBox::new(Vector2::new(0.1, 0.2), Vector2::new(0.6, 0.9));
        assert!(close(b.iou(&b), 1.0), "self IOU was {}", b.iou(&b));
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(Vector2::new(0.0, 0.0), Vector2::new(0.2, 0.2));
        let b = BoundingBox::new(Vector2::new(0.5, 0.5), Vector2::new(0.9, 0.9));
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_is_symmetric_and_bounded() {
        let a = BoundingBox::new(Vector2::new(0.0, 0.0), Vector2::new(0.5, 0.5));
        let b = BoundingBox::new(Vector2::new(0.25, 0.25), Vector2::new(0.75, 0.75));
        let ab = a.iou(&b);
        let ba = b.iou(&a);
        assert!(close(ab, ba), "iou(a,b)={} iou(b,a)={}", ab, ba);
        assert!(ab > 0.0 && ab < 1.0, "partial overlap IOU out of range: {}", ab);
    }

    #[test]
    fn iou_of_degenerate_boxes_is_zero() {
        let empty = BoundingBox::new(Vector2::new(0.3, 0.3), Vector2::new(0.3, 0.3));
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn squarified_grows_shorter_side() {
        let b = BoundingBox::new(Vector2::new(0.0, 0.0), Vector2::new(0.4, 0.2));
        let s = b.squarified();
        assert!(close(s.extent().x, 0.4));
        assert!(close(s.extent().y, 0.4));
        assert!(close(s.center().x, b.center().x));
        assert!(close(s.center().y, b.center().y));
    }

    #[test]
    fn scaled_keeps_center() {
        let b = BoundingBox::new(Vector2::new(0.2, 0.2), Vector2::new(0.6, 0.6));
        let s = b.scaled(1.5);
        assert!(close(s.center().x, 0.4));
        assert!(close(s.extent().x, 0.6));
    }

    #[test]
    fn crop_matrix_round_trips() {
        let m = crop_matrix(0.5, Vector2::new(2.0, 3.0), Vector2::new(0.1, 0.2));
        let inv = m.try_inverse().expect("crop matrix must be invertible");
        let p = Point3D::new(0.3, 0.7, 0.0);
        let q = transform_point(&inv, transform_point(&m, p));
        assert!(close(q.x, p.x) && close(q.y, p.y), "round trip gave ({}, {})", q.x, q.y);
    }

    #[test]
    fn rotation_at_center_fixes_crop_center() {
        let m = rotate_at_center(1.2);
        let c = transform_point(&m, Point3D::new(0.5, 0.5, 0.0));
        assert!(close(c.x, 0.5) && close(c.y, 0.5), "center moved to ({}, {})", c.x, c.y);
    }

    #[test]
    fn horizontal_flip_mirrors_unit_square() {
        let m = horizontal_flip();
        let p = transform_point(&m, Point3D::new(0.2, 0.7, 0.0));
        assert!(close(p.x, 0.8) && close(p.y, 0.7));
    }

    #[test]
    fn roll_angle_is_zero_for_upright_face() {
        // y-down coordinates: the up direction of an upright face points to -y
        let a = roll_angle(Vector2::new(0.0, -1.0));
        assert!(close(a, 0.0), "upright roll angle was {}", a);
    }
}
