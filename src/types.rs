use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Represents a single 3D landmark vertex
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn xy(&self) -> Vector2<f32> {
        Vector2::new(self.x, self.y)
    }
}

/// Represents the result of a landmark inference, indexed positionally
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: Vec<Point3D>,
}

impl Landmarks {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Coarse keypoints reported by the face detector alongside each box.
/// Only the four the region tracker consumes are carried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionKeypoints {
    pub left_eye: Vector2<f32>,
    pub right_eye: Vector2<f32>,
    pub nose: Vector2<f32>,
    pub mouth: Vector2<f32>,
}

/// One face detector output. Coordinates are normalized image UV
/// (origin top-left, y down), extent is the full box size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub score: f32,
    pub center: Vector2<f32>,
    pub extent: Vector2<f32>,
    pub keypoints: DetectionKeypoints,
}
