use anyhow::{bail, Context, Result};
use image::{ImageBuffer, Rgb};
use nalgebra::Matrix4;

use crate::config::PipelineConfig;
use crate::crop::warp_crop;
use crate::detector::{
    BlazeFaceDetector, EyeLandmarkDetector, FaceDetector, FaceMeshDetector, LandmarkDetector,
};
use crate::eye_region::eye_crop_matrix;
use crate::filter::LandmarkFilter;
use crate::geometry::{rotate_at_center, transform_point, BoundingBox};
use crate::topology;
use crate::tracker::{FaceTracker, Region};
use crate::types::{Landmarks, Point3D};

pub const FACE_CROP_SIZE: u32 = 192;
pub const EYE_CROP_SIZE: u32 = 64;

/// Per-frame face tracking pipeline.
///
/// Owns the three detectors, the region tracker and the landmark filter.
/// `process_frame` runs the stages in a fixed order; frame N's stabilized
/// region seeds frame N+1's crop, so one instance must only ever see one
/// frame at a time, in order.
pub struct FacePipeline {
    config: PipelineConfig,
    face_detector: Box<dyn FaceDetector>,
    mesh_detector: Box<dyn LandmarkDetector>,
    left_eye_detector: Box<dyn LandmarkDetector>,
    right_eye_detector: Box<dyn LandmarkDetector>,
    tracker: FaceTracker,
    filter: LandmarkFilter,

    face_crop_matrix: Option<Matrix4<f32>>,
    left_eye_crop_matrix: Option<Matrix4<f32>>,
    right_eye_crop_matrix: Option<Matrix4<f32>>,
    face_crop: Option<ImageBuffer<Rgb<u8>, Vec<u8>>>,
    left_eye_crop: Option<ImageBuffer<Rgb<u8>, Vec<u8>>>,
    right_eye_crop: Option<ImageBuffer<Rgb<u8>, Vec<u8>>>,
    raw_face: Landmarks,
    raw_left_eye: Landmarks,
    raw_right_eye: Landmarks,
    refined: Landmarks,
}

impl FacePipeline {
    pub fn new(
        config: PipelineConfig,
        face_detector: Box<dyn FaceDetector>,
        mesh_detector: Box<dyn LandmarkDetector>,
        left_eye_detector: Box<dyn LandmarkDetector>,
        right_eye_detector: Box<dyn LandmarkDetector>,
    ) -> Self {
        let tracker = FaceTracker::new(config.tracker_settings());
        let filter = LandmarkFilter::new(
            config.filter.min_cutoff,
            config.filter.beta,
            config.filter.d_cutoff,
        );
        Self {
            config,
            face_detector,
            mesh_detector,
            left_eye_detector,
            right_eye_detector,
            tracker,
            filter,
            face_crop_matrix: None,
            left_eye_crop_matrix: None,
            right_eye_crop_matrix: None,
            face_crop: None,
            left_eye_crop: None,
            right_eye_crop: None,
            raw_face: Landmarks::new(),
            raw_left_eye: Landmarks::new(),
            raw_right_eye: Landmarks::new(),
            refined: Landmarks::new(),
        }
    }

    /// Builds the pipeline with the ONNX detectors named in the config.
    pub fn with_onnx(config: PipelineConfig) -> Result<Self> {
        let face = BlazeFaceDetector::new(&config.models.face_detection)
            .with_context(|| format!("loading {}", config.models.face_detection))?;
        let mesh = FaceMeshDetector::new(&config.models.face_mesh)
            .with_context(|| format!("loading {}", config.models.face_mesh))?;
        let eye_l = EyeLandmarkDetector::new(&config.models.iris)
            .with_context(|| format!("loading {}", config.models.iris))?;
        let eye_r = EyeLandmarkDetector::new(&config.models.iris)
            .with_context(|| format!("loading {}", config.models.iris))?;
        Ok(Self::new(
            config,
            Box::new(face),
            Box::new(mesh),
            Box::new(eye_l),
            Box::new(eye_r),
        ))
    }

    /// Runs one frame through the pipeline. Returns false when the frame
    /// was skipped for low detection confidence; all state, including the
    /// previous region, is left untouched in that case.
    pub fn process_frame(
        &mut self,
        frame: &ImageBuffer<Rgb<u8>, Vec<u8>>,
        dt: f32,
    ) -> Result<bool> {
        // Face detection; only the highest-confidence face is tracked.
        let detections = self.face_detector.detect(frame)?;
        let best = detections
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score));
        let detection = match best {
            Some(d) if d.score >= self.config.score_threshold => d,
            _ => return Ok(false),
        };

        // Region hysteresis: the detection only wins when it has drifted
        // away from the tracked region.
        self.tracker.try_update_with_detection(&detection);

        // Face crop and mesh detection.
        let face_mtx = self
            .tracker
            .crop_matrix()
            .context("tracker has no region after an accepted detection")?;
        let face_crop = warp_crop(frame, &face_mtx, FACE_CROP_SIZE);
        let raw_face = self.mesh_detector.detect(&face_crop)?;
        if raw_face.len() < topology::FACE_VERTEX_COUNT {
            bail!(
                "face mesh returned {} vertices, expected {}",
                raw_face.len(),
                topology::FACE_VERTEX_COUNT
            );
        }

        // Eye corner vertices back in image space.
        let to_image = |p: Point3D| transform_point(&face_mtx, p);
        let eye_l0 = to_image(raw_face.points[topology::LEFT_EYE_OUTER]).xy();
        let eye_l1 = to_image(raw_face.points[topology::LEFT_EYE_INNER]).xy();
        let eye_r0 = to_image(raw_face.points[topology::RIGHT_EYE_INNER]).xy();
        let eye_r1 = to_image(raw_face.points[topology::RIGHT_EYE_OUTER]).xy();

        // Eye crops share the face rotation; the right eye is mirrored so
        // both present the same orientation to the detector.
        let angle = self
            .tracker
            .region()
            .context("tracker has no region after an accepted detection")?
            .angle;
        let rotation = rotate_at_center(angle);
        let left_mtx = eye_crop_matrix(eye_l0, eye_l1, &rotation, self.config.eye_margin, false);
        let right_mtx = eye_crop_matrix(eye_r0, eye_r1, &rotation, self.config.eye_margin, true);
        let left_crop = warp_crop(frame, &left_mtx, EYE_CROP_SIZE);
        let right_crop = warp_crop(frame, &right_mtx, EYE_CROP_SIZE);
        let raw_left_eye = self.left_eye_detector.detect(&left_crop)?;
        let raw_right_eye = self.right_eye_detector.detect(&right_crop)?;

        // Fuse everything into one image-space vertex set: coarse mesh
        // vertices, with the eye-ring slots replaced by the eye detector's
        // sharper estimates.
        let mut refined = Landmarks {
            points: raw_face.points.iter().map(|&p| to_image(p)).collect(),
        };
        fuse_eye(&mut refined, &raw_left_eye, &left_mtx, &topology::LEFT_EYE_TO_FACE)?;
        fuse_eye(&mut refined, &raw_right_eye, &right_mtx, &topology::RIGHT_EYE_TO_FACE)?;

        // Temporal smoothing, then hand the region over to the filtered
        // mesh for next frame.
        self.filter.apply(&mut refined.points, dt);
        let bounds = landmark_bounds(&refined);
        let up = refined.points[topology::MID_EYES].xy() - refined.points[topology::UPPER_LIP].xy();
        self.tracker.step(bounds, up);

        self.face_crop_matrix = Some(face_mtx);
        self.left_eye_crop_matrix = Some(left_mtx);
        self.right_eye_crop_matrix = Some(right_mtx);
        self.face_crop = Some(face_crop);
        self.left_eye_crop = Some(left_crop);
        self.right_eye_crop = Some(right_crop);
        self.raw_face = raw_face;
        self.raw_left_eye = raw_left_eye;
        self.raw_right_eye = raw_right_eye;
        self.refined = refined;

        Ok(true)
    }

    /// Drops all tracking, filter and output state, as if freshly built.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.filter.reset();
        self.face_crop_matrix = None;
        self.left_eye_crop_matrix = None;
        self.right_eye_crop_matrix = None;
        self.face_crop = None;
        self.left_eye_crop = None;
        self.right_eye_crop = None;
        self.raw_face = Landmarks::new();
        self.raw_left_eye = Landmarks::new();
        self.raw_right_eye = Landmarks::new();
        self.refined = Landmarks::new();
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    pub fn region(&self) -> Option<&Region> {
        self.tracker.region()
    }

    /// The crop transform used for the last processed frame.
    pub fn face_crop_matrix(&self) -> Option<&Matrix4<f32>> {
        self.face_crop_matrix.as_ref()
    }

    pub fn left_eye_crop_matrix(&self) -> Option<&Matrix4<f32>> {
        self.left_eye_crop_matrix.as_ref()
    }

    pub fn right_eye_crop_matrix(&self) -> Option<&Matrix4<f32>> {
        self.right_eye_crop_matrix.as_ref()
    }

    pub fn cropped_face(&self) -> Option<&ImageBuffer<Rgb<u8>, Vec<u8>>> {
        self.face_crop.as_ref()
    }

    pub fn cropped_left_eye(&self) -> Option<&ImageBuffer<Rgb<u8>, Vec<u8>>> {
        self.left_eye_crop.as_ref()
    }

    pub fn cropped_right_eye(&self) -> Option<&ImageBuffer<Rgb<u8>, Vec<u8>>> {
        self.right_eye_crop.as_ref()
    }

    /// Raw face mesh output, crop-local UV.
    pub fn raw_face_landmarks(&self) -> &Landmarks {
        &self.raw_face
    }

    pub fn raw_left_eye_landmarks(&self) -> &Landmarks {
        &self.raw_left_eye
    }

    pub fn raw_right_eye_landmarks(&self) -> &Landmarks {
        &self.raw_right_eye
    }

    /// Fused and filtered vertex set in image space.
    pub fn refined_landmarks(&self) -> &Landmarks {
        &self.refined
    }

    /// Fused and filtered vertex set in face-crop-local coordinates.
    pub fn refined_crop_local(&self) -> Option<Landmarks> {
        let inv = self.face_crop_matrix.as_ref()?.try_inverse()?;
        Some(Landmarks {
            points: self
                .refined
                .points
                .iter()
                .map(|&p| transform_point(&inv, p))
                .collect(),
        })
    }
}

/// Replaces the mapped face-mesh slots with eye vertices carried from
/// eye-crop UV into image space. The mirrored eye's matrix already folds
/// in the horizontal flip, so the same mapping works for both.
fn fuse_eye(
    refined: &mut Landmarks,
    eye: &Landmarks,
    eye_mtx: &Matrix4<f32>,
    table: &[(usize, usize)],
) -> Result<()> {
    for &(eye_idx, face_idx) in table {
        let p = eye
            .points
            .get(eye_idx)
            .with_context(|| format!("eye landmark set too short for index {}", eye_idx))?;
        refined.points[face_idx] = transform_point(eye_mtx, *p);
    }
    Ok(())
}

fn landmark_bounds(landmarks: &Landmarks) -> BoundingBox {
    let mut min = nalgebra::Vector2::new(f32::MAX, f32::MAX);
    let mut max = nalgebra::Vector2::new(f32::MIN, f32::MIN);
    for p in &landmarks.points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    BoundingBox::new(min, max)
}
