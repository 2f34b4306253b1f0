//! Micro-feature detection (lacunae, crypts, structural patches).
//!
//! Detection itself is delegated to a [`Detector`] backend. The stage crops
//! the grayscale image to the iris bounding box, runs the detector on the
//! crop, keeps detections whose centre falls on the iris, and maps them back
//! to image coordinates.

use std::path::PathBuf;
use std::sync::Arc;

use image::{imageops, GrayImage};
use irisatlas_spec::{ExtensionResult, StageIdentity};
use serde_json::{json, Map, Value};

use crate::context::ContextSnapshot;
use crate::error::StageError;
use crate::stage::Extension;

use super::{enabled, DISABLED_WARNING};

pub const NAME: &str = "micro_features";
pub const VERSION: &str = "1";

/// One detection in crop coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// `[x1, y1, x2, y2]`.
    pub bbox: [f64; 4],
    pub class_id: u32,
    pub confidence: f64,
}

/// Inference parameters passed to the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParams {
    pub weights_path: PathBuf,
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub image_size: u32,
    pub device: String,
}

/// An object detector backend.
pub trait Detector: Send + Sync {
    fn detect(&self, crop: &GrayImage, params: &DetectorParams) -> Result<Vec<Detection>, StageError>;
}

/// The micro-features stage.
#[derive(Clone, Default)]
pub struct MicroFeatures {
    detector: Option<Arc<dyn Detector>>,
}

impl MicroFeatures {
    /// Creates the stage without a detector backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the stage with a detector backend.
    pub fn with_detector(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector: Some(detector),
        }
    }
}

impl Extension for MicroFeatures {
    fn identity(&self) -> StageIdentity {
        StageIdentity::new(NAME, VERSION)
    }

    fn run(&self, ctx: &ContextSnapshot) -> Result<ExtensionResult, StageError> {
        let settings = ctx.stage_settings(NAME);
        if !enabled(&settings) {
            return Ok(ExtensionResult::skipped(DISABLED_WARNING));
        }

        let weights = settings
            .get("weights_path")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if weights.is_empty() {
            return Ok(ExtensionResult::failed(
                "Missing detector weights path for micro_features extension.",
            ));
        }
        let weights = PathBuf::from(weights);
        if !weights.exists() {
            return Ok(ExtensionResult::failed(format!(
                "Detector weights not found: {}",
                weights.display()
            )));
        }

        let Some((x_min, y_min, x_max, y_max)) = iris_bounds(&ctx.iris_mask) else {
            return Ok(ExtensionResult::skipped(
                "Iris mask empty; micro feature detection skipped.",
            ));
        };

        let Some(detector) = &self.detector else {
            return Ok(ExtensionResult::failed(
                "no detector backend available for micro_features",
            ));
        };

        let crop_width = x_max - x_min + 1;
        let crop_height = y_max - y_min + 1;
        let crop = imageops::crop_imm(&*ctx.grayscale, x_min, y_min, crop_width, crop_height).to_image();

        let params = DetectorParams {
            weights_path: weights,
            confidence_threshold: settings
                .get("confidence_threshold")
                .and_then(Value::as_f64)
                .unwrap_or(0.25),
            iou_threshold: settings.get("iou_threshold").and_then(Value::as_f64).unwrap_or(0.45),
            image_size: settings
                .get("imgsz")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(640),
            device: ctx.device.clone(),
        };
        let detections = detector.detect(&crop, &params)?;

        let class_names = settings
            .get("class_names")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(default_class_names);

        let (width, height) = ctx.grayscale.dimensions();
        let mut boxes = Vec::new();
        let mut box_area_sum = 0.0;
        let mut lacunae_count = 0u64;
        let mut crypt_count = 0u64;

        for det in detections {
            let [x1, y1, x2, y2] = det.bbox;
            let cx = ((x1 + x2) / 2.0).round();
            let cy = ((y1 + y2) / 2.0).round();
            if cx < 0.0 || cy < 0.0 || cx >= f64::from(crop_width) || cy >= f64::from(crop_height) {
                continue;
            }
            if ctx.iris_mask.get_pixel(x_min + cx as u32, y_min + cy as u32).0[0] == 0 {
                continue;
            }

            let gx1 = (x1.round() + f64::from(x_min)).max(0.0);
            let gy1 = (y1.round() + f64::from(y_min)).max(0.0);
            let gx2 = (x2.round() + f64::from(x_min)).min(f64::from(width) - 1.0);
            let gy2 = (y2.round() + f64::from(y_min)).min(f64::from(height) - 1.0);
            if gx2 <= gx1 || gy2 <= gy1 {
                continue;
            }

            let label = class_names
                .get(&det.class_id.to_string())
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class_{}", det.class_id));
            match label.as_str() {
                "lacunae" => lacunae_count += 1,
                "crypt" => crypt_count += 1,
                _ => {}
            }

            box_area_sum += (gx2 - gx1) * (gy2 - gy1);
            boxes.push(json!({
                "bbox": [gx1 as i64, gy1 as i64, gx2 as i64, gy2 as i64],
                "label": label,
                "confidence": (det.confidence * 1e6).round() / 1e6,
            }));
        }

        let iris_area = ctx.iris_mask.pixels().filter(|p| p.0[0] > 0).count() as f64;
        let area_ratio = if iris_area > 0.0 { box_area_sum / iris_area } else { 0.0 };

        let model_version = settings
            .get("model_version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        Ok(ExtensionResult::success(json!({
            "micro_feature_boxes": boxes,
            "micro_feature_metrics": {
                "lacunae_count": lacunae_count,
                "crypt_count": crypt_count,
                "area_ratio": area_ratio,
                "density_per_sector": {},
            },
        }))
        .with_model_version(model_version))
    }
}

fn default_class_names() -> Map<String, Value> {
    let mut names = Map::new();
    names.insert("0".into(), json!("lacunae"));
    names.insert("1".into(), json!("crypt"));
    names.insert("2".into(), json!("structural_patch"));
    names
}

/// Inclusive bounding box of the non-zero pixels.
fn iris_bounds(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds
}
