use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::tracker::TrackerSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames whose best detection scores below this are skipped entirely.
    pub score_threshold: f32,
    /// Detection-vs-tracked-region overlap below which the detection wins.
    pub iou_threshold: f32,
    /// Margin on a detection-seeded region.
    pub detection_margin: f32,
    /// Margin on a landmark-derived region.
    pub tracking_margin: f32,
    /// Eye crop half-extent as a multiple of the inter-corner distance.
    pub eye_margin: f32,
    pub filter: FilterSettings,
    pub models: ModelPaths,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub min_cutoff: f32,
    pub beta: f32,
    pub d_cutoff: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub face_detection: String,
    pub face_mesh: String,
    pub iris: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            iou_threshold: 0.5,
            detection_margin: 1.75,
            tracking_margin: 1.5,
            eye_margin: 1.2,
            filter: FilterSettings::default(),
            models: ModelPaths::default(),
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_cutoff: 1.5,
            beta: 0.3,
            d_cutoff: 1.0,
        }
    }
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            face_detection: "models/face_detection.onnx".to_string(),
            face_mesh: "models/face_mesh.onnx".to_string(),
            iris: "models/iris.onnx".to_string(),
        }
    }
}

impl PipelineConfig {
    const PATH: &'static str = "facetrack.json";

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            iou_threshold: self.iou_threshold,
            detection_margin: self.detection_margin,
            tracking_margin: self.tracking_margin,
        }
    }

    pub fn load() -> Result<Self> {
        let config = if Path::new(Self::PATH).exists() {
            let content = fs::read_to_string(Self::PATH)?;
            match serde_json::from_str::<PipelineConfig>(&content) {
                Ok(c) => c,
                Err(e) => {
                    println!("Error parsing {}: {}. Loading defaults.", Self::PATH, e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        // write back so new fields show up in the file
        config.save()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(Self::PATH, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tracking_constants() {
        let c = PipelineConfig::default();
        assert_eq!(c.score_threshold, 0.5);
        assert_eq!(c.iou_threshold, 0.5);
        assert_eq!(c.detection_margin, 1.75);
        assert_eq!(c.tracking_margin, 1.5);
        assert_eq!(c.eye_margin, 1.2);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let c: PipelineConfig = serde_json::from_str(r#"{"score_threshold": 0.7}"#).unwrap();
        assert_eq!(c.score_threshold, 0.7);
        assert_eq!(c.iou_threshold, 0.5);
        assert_eq!(c.filter.beta, FilterSettings::default().beta);
    }
}
