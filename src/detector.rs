use anyhow::{bail, Result};
use image::{imageops::FilterType, ImageBuffer, Rgb};
use nalgebra::Vector2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::topology;
use crate::types::{Detection, DetectionKeypoints, Landmarks, Point3D};

/// Coarse face detector boundary: one frame in, scored boxes out.
pub trait FaceDetector {
    fn detect(&mut self, frame: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> Result<Vec<Detection>>;
}

/// Landmark detector boundary: one fixed-size crop in, one landmark set out.
/// Output coordinates are crop-local UV in the unit square.
pub trait LandmarkDetector {
    fn detect(&mut self, crop: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> Result<Landmarks>;
}

fn load_session(model_path: &str) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .with_execution_providers([
            ort::execution_providers::CPUExecutionProvider::default().build(),
        ])?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Resize to `size` and normalize to [-1, 1], NHWC layout.
fn preprocess(frame: &ImageBuffer<Rgb<u8>, Vec<u8>>, size: u32) -> Vec<f32> {
    let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);
    let mut input_data = Vec::with_capacity((size * size * 3) as usize);
    for y in 0..size {
        for x in 0..size {
            let pixel = resized.get_pixel(x, y);
            input_data.push(pixel[0] as f32 / 127.5 - 1.0);
            input_data.push(pixel[1] as f32 / 127.5 - 1.0);
            input_data.push(pixel[2] as f32 / 127.5 - 1.0);
        }
    }
    input_data
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-80.0, 80.0)).exp())
}

// ===========================================================================
// BlazeFace-style face detector (128x128 SSD anchor decode)
// ===========================================================================

const FACE_INPUT_SIZE: u32 = 128;
const REGRESSOR_WIDTH: usize = 16;

/// Scores below this are decode noise, dropped before the pipeline even
/// sees them. The real confidence threshold lives in the pipeline config.
const DECODE_SCORE_FLOOR: f32 = 0.1;

pub struct BlazeFaceDetector {
    session: Session,
    anchors: Vec<Vector2<f32>>,
}

impl BlazeFaceDetector {
    pub fn new(model_path: &str) -> Result<Self> {
        let session = load_session(model_path)?;
        let anchors = generate_anchors(FACE_INPUT_SIZE as usize);
        Ok(Self { session, anchors })
    }

    fn decode(anchors: &[Vector2<f32>], scores_raw: &[f32], boxes_raw: &[f32]) -> Vec<Detection> {
        let scale = FACE_INPUT_SIZE as f32;
        let mut detections = Vec::new();

        for (i, anchor) in anchors.iter().enumerate() {
            let score = sigmoid(scores_raw[i]);
            if score < DECODE_SCORE_FLOOR {
                continue;
            }

            let r = &boxes_raw[i * REGRESSOR_WIDTH..(i + 1) * REGRESSOR_WIDTH];
            let center = anchor + Vector2::new(r[0], r[1]) / scale;
            let extent = Vector2::new(r[2], r[3]) / scale;

            // keypoint slots of the detector output: left eye, right eye,
            // nose tip, mouth center (ear tragions unused)
            let kp = |j: usize| anchor + Vector2::new(r[4 + j * 2], r[5 + j * 2]) / scale;

            detections.push(Detection {
                score,
                center,
                extent,
                keypoints: DetectionKeypoints {
                    left_eye: kp(0),
                    right_eye: kp(1),
                    nose: kp(2),
                    mouth: kp(3),
                },
            });
        }
        detections
    }
}

impl FaceDetector for BlazeFaceDetector {
    fn detect(&mut self, frame: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> Result<Vec<Detection>> {
        let input_data = preprocess(frame, FACE_INPUT_SIZE);
        let shape = vec![1, FACE_INPUT_SIZE as usize, FACE_INPUT_SIZE as usize, 3];
        let input = Tensor::from_array((shape, input_data))?;
        let outputs = self.session.run(ort::inputs![input])?;

        let (_, out0) = outputs[0].try_extract_tensor::<f32>()?;
        let (_, out1) = outputs[1].try_extract_tensor::<f32>()?;

        // output order differs between model conversions; the score tensor
        // is the one with a single value per anchor
        let n = self.anchors.len();
        let (scores_raw, boxes_raw) = if out0.len() == n { (out0, out1) } else { (out1, out0) };
        if scores_raw.len() != n || boxes_raw.len() != n * REGRESSOR_WIDTH {
            bail!(
                "unexpected face detector output sizes: {} / {}",
                scores_raw.len(),
                boxes_raw.len()
            );
        }

        Ok(Self::decode(&self.anchors, scores_raw, boxes_raw))
    }
}

/// SSD anchor grid for the 128x128 face detector: stride 8 with 2 anchors
/// per cell, then stride 16 with 6, all unit-sized.
fn generate_anchors(input_size: usize) -> Vec<Vector2<f32>> {
    let mut anchors = Vec::new();
    for (stride, per_cell) in [(8usize, 2usize), (16, 6)] {
        let cells = input_size / stride;
        for v in 0..cells {
            for u in 0..cells {
                let cx = (u as f32 + 0.5) * stride as f32 / input_size as f32;
                let cy = (v as f32 + 0.5) * stride as f32 / input_size as f32;
                for _ in 0..per_cell {
                    anchors.push(Vector2::new(cx, cy));
                }
            }
        }
    }
    anchors
}

// ===========================================================================
// Face mesh landmark detector (192x192 -> 468 vertices)
// ===========================================================================

const MESH_INPUT_SIZE: u32 = 192;

pub struct FaceMeshDetector {
    session: Session,
}

impl FaceMeshDetector {
    pub fn new(model_path: &str) -> Result<Self> {
        Ok(Self {
            session: load_session(model_path)?,
        })
    }
}

impl LandmarkDetector for FaceMeshDetector {
    fn detect(&mut self, crop: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> Result<Landmarks> {
        let input_data = preprocess(crop, MESH_INPUT_SIZE);
        let shape = vec![1, MESH_INPUT_SIZE as usize, MESH_INPUT_SIZE as usize, 3];
        let input = Tensor::from_array((shape, input_data))?;
        let outputs = self.session.run(ort::inputs![input])?;

        let (_, vertices) = outputs[0].try_extract_tensor::<f32>()?;
        if vertices.len() < topology::FACE_VERTEX_COUNT * 3 {
            bail!(
                "face mesh output too short: {} floats for {} vertices",
                vertices.len(),
                topology::FACE_VERTEX_COUNT
            );
        }

        // model space is crop pixels; hand out crop-local UV
        let scale = MESH_INPUT_SIZE as f32;
        let mut points = Vec::with_capacity(topology::FACE_VERTEX_COUNT);
        for i in 0..topology::FACE_VERTEX_COUNT {
            points.push(Point3D::new(
                vertices[i * 3] / scale,
                vertices[i * 3 + 1] / scale,
                vertices[i * 3 + 2] / scale,
            ));
        }
        Ok(Landmarks { points })
    }
}

// ===========================================================================
// Eye/iris landmark detector (64x64 -> 71 contour + 5 iris vertices)
// ===========================================================================

const EYE_INPUT_SIZE: u32 = 64;

pub struct EyeLandmarkDetector {
    session: Session,
}

impl EyeLandmarkDetector {
    pub fn new(model_path: &str) -> Result<Self> {
        Ok(Self {
            session: load_session(model_path)?,
        })
    }
}

impl LandmarkDetector for EyeLandmarkDetector {
    fn detect(&mut self, crop: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> Result<Landmarks> {
        let input_data = preprocess(crop, EYE_INPUT_SIZE);
        let shape = vec![1, EYE_INPUT_SIZE as usize, EYE_INPUT_SIZE as usize, 3];
        let input = Tensor::from_array((shape, input_data))?;
        let outputs = self.session.run(ort::inputs![input])?;

        let (_, out0) = outputs[0].try_extract_tensor::<f32>()?;
        let (_, out1) = outputs[1].try_extract_tensor::<f32>()?;

        let contour_len = topology::EYE_CONTOUR_VERTEX_COUNT * 3;
        let iris_len = topology::IRIS_VERTEX_COUNT * 3;
        let (contour, iris) = if out0.len() >= contour_len && out1.len() >= iris_len {
            (out0, out1)
        } else if out1.len() >= contour_len && out0.len() >= iris_len {
            (out1, out0)
        } else {
            bail!("unexpected eye detector output sizes: {} / {}", out0.len(), out1.len());
        };

        let scale = EYE_INPUT_SIZE as f32;
        let mut points = Vec::with_capacity(topology::EYE_VERTEX_COUNT);
        for i in 0..topology::EYE_CONTOUR_VERTEX_COUNT {
            points.push(Point3D::new(
                contour[i * 3] / scale,
                contour[i * 3 + 1] / scale,
                contour[i * 3 + 2] / scale,
            ));
        }
        for i in 0..topology::IRIS_VERTEX_COUNT {
            points.push(Point3D::new(
                iris[i * 3] / scale,
                iris[i * 3 + 1] / scale,
                iris[i * 3 + 2] / scale,
            ));
        }
        Ok(Landmarks { points })
    }
}
