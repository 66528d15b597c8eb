use nalgebra::{Matrix4, Vector2};

use crate::geometry::{crop_matrix, roll_angle, transform_point, BoundingBox};
use crate::types::{Detection, Point3D};

/// Thresholds and margins of the region tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    /// Below this overlap a fresh detection replaces the tracked region.
    pub iou_threshold: f32,
    /// Margin applied to a detection-seeded region. Detections hug the
    /// face tightly; the crop must also contain the landmarks near the edge.
    pub detection_margin: f32,
    /// Margin applied to a landmark-derived region.
    pub tracking_margin: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            detection_margin: 1.75,
            tracking_margin: 1.5,
        }
    }
}

/// The stabilized face region: square box plus roll angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub bounds: BoundingBox,
    pub angle: f32,
}

/// Tracks the face region across frames.
///
/// Uninitialized until the first accepted detection. Once tracking, a new
/// detection only replaces the region when it no longer overlaps the
/// tracked one: small detector noise must not move the crop, the
/// landmark-driven `step` estimate is the stable one.
pub struct FaceTracker {
    settings: TrackerSettings,
    region: Option<Region>,
}

impl FaceTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            region: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.region.is_some()
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn reset(&mut self) {
        self.region = None;
    }

    /// The region a detection would seed: squarified and padded so the
    /// whole face fits the crop.
    pub fn region_from_detection(&self, det: &Detection) -> BoundingBox {
        BoundingBox::from_center_extent(det.center, det.extent)
            .squarified()
            .scaled(self.settings.detection_margin)
    }

    /// Accepts the detection when uninitialized or when it has drifted away
    /// from the tracked region. Returns whether the region was replaced.
    pub fn try_update_with_detection(&mut self, det: &Detection) -> bool {
        let candidate = self.region_from_detection(det);
        let replace = match &self.region {
            None => true,
            Some(r) => r.bounds.iou(&candidate) < self.settings.iou_threshold,
        };
        if replace {
            let angle = roll_angle(det.keypoints.nose - det.keypoints.mouth);
            self.region = Some(Region {
                bounds: candidate,
                angle,
            });
        }
        replace
    }

    /// Transform handed to the crop stage: unit square -> image UV.
    pub fn crop_matrix(&self) -> Option<Matrix4<f32>> {
        self.region
            .as_ref()
            .map(|r| crop_matrix(r.angle, r.bounds.extent(), r.bounds.min))
    }

    /// Maps a point from crop-local space back to image space.
    pub fn transform(&self, p: Point3D) -> Option<Point3D> {
        self.crop_matrix().map(|m| transform_point(&m, p))
    }

    /// Hands tracking over to the landmark-derived estimate: the filtered
    /// mesh bounds become next frame's region, the roll angle comes from
    /// the mesh's up direction (mouth toward eyes).
    pub fn step(&mut self, landmark_bounds: BoundingBox, up: Vector2<f32>) {
        if self.region.is_none() {
            return;
        }
        self.region = Some(Region {
            bounds: landmark_bounds
                .squarified()
                .scaled(self.settings.tracking_margin),
            angle: roll_angle(up),
        });
    }
}
