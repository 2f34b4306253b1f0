//! Clock-sector mapping of the iris region.
//!
//! Angles are measured from 12 o'clock, clockwise, in image coordinates
//! (origin top-left). Sector `k` (1-based) covers `[(k-1), k) * 360/n`
//! degrees.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use image::{DynamicImage, GrayImage, Luma};
use irisatlas_spec::{ExtensionResult, StageIdentity};
use serde::Serialize;
use serde_json::{json, Value};

use crate::context::ContextSnapshot;
use crate::error::StageError;
use crate::overlay::write_png;
use crate::segmentation::{COLLARETTE, CONTRACTION_FURROWS, IRIS, SCURF_RIM};
use crate::stage::Extension;

use super::{enabled, DISABLED_WARNING};

pub const NAME: &str = "sector_mapping";
pub const VERSION: &str = "1";

/// File written when `generate_heatmap` is set.
pub const HEATMAP_FILENAME: &str = "sector_heatmap.png";

/// Minimum iris area for a usable centre estimate.
const MIN_IRIS_PIXELS: usize = 5;

#[derive(Debug, Clone, Default, Serialize)]
struct SectorMetrics {
    iris_pixels: u64,
    collarette_pixels: u64,
    scurf_rim_pixels: u64,
    contraction_furrows_pixels: u64,
    micro_feature_count: u64,
    micro_feature_labels: BTreeMap<String, u64>,
    radius: f64,
}

/// Iris centre and radius estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrisGeometry {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
}

/// The sector mapping stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectorMapping;

impl Extension for SectorMapping {
    fn identity(&self) -> StageIdentity {
        StageIdentity::new(NAME, VERSION).optional_requires([super::micro_features::NAME])
    }

    fn run(&self, ctx: &ContextSnapshot) -> Result<ExtensionResult, StageError> {
        let settings = ctx.stage_settings(NAME);
        if !enabled(&settings) {
            return Ok(ExtensionResult::skipped(DISABLED_WARNING));
        }

        let schema = settings.get("schema").cloned().unwrap_or(json!(12));
        let sector_count = match schema.as_u64() {
            Some(n @ (12 | 24)) => n as usize,
            _ => {
                return Ok(ExtensionResult::failed(format!(
                    "Unsupported sector schema '{}'. Expected 12 or 24.",
                    schema
                )))
            }
        };

        let iris_points: Vec<(u32, u32)> = ctx
            .mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == IRIS)
            .map(|(x, y, _)| (x, y))
            .collect();
        if iris_points.is_empty() {
            return Ok(ExtensionResult::skipped(
                "Iris region missing; sector mapping skipped.",
            ));
        }
        let Some(geometry) = estimate_geometry(&iris_points) else {
            return Ok(ExtensionResult::skipped(
                "Unable to estimate iris center; sector mapping skipped.",
            ));
        };

        let mut sectors = vec![
            SectorMetrics {
                radius: geometry.radius,
                ..SectorMetrics::default()
            };
            sector_count
        ];

        for (x, y, pixel) in ctx.mask.enumerate_pixels() {
            let label = pixel.0[0];
            if !(IRIS..=CONTRACTION_FURROWS).contains(&label) {
                continue;
            }
            let metrics = &mut sectors[sector_index(f64::from(x), f64::from(y), &geometry, sector_count)];
            match label {
                IRIS => metrics.iris_pixels += 1,
                COLLARETTE => metrics.collarette_pixels += 1,
                SCURF_RIM => metrics.scurf_rim_pixels += 1,
                _ => metrics.contraction_furrows_pixels += 1,
            }
        }

        let boxes = ctx
            .prior_output(super::micro_features::NAME)
            .and_then(|out| out.get("micro_feature_boxes"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for detection in &boxes {
            let Some([x1, y1, x2, y2]) = bbox(detection) else {
                continue;
            };
            let idx = sector_index(0.5 * (x1 + x2), 0.5 * (y1 + y2), &geometry, sector_count);
            let label = detection
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            sectors[idx].micro_feature_count += 1;
            *sectors[idx].micro_feature_labels.entry(label).or_insert(0) += 1;
        }

        let heatmap_path = if settings
            .get("generate_heatmap")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let path = ctx.output_dir.join(HEATMAP_FILENAME);
            let heatmap = render_heatmap(&ctx.iris_mask, &geometry, sector_count);
            write_png(&path, &DynamicImage::ImageLuma8(heatmap))
                .map_err(|err| StageError::msg(err.to_string()))?;
            Some(path.display().to_string())
        } else {
            None
        };

        let mut density = serde_json::Map::new();
        for (i, metrics) in sectors.iter().enumerate() {
            density.insert(format!("sector_{}", i + 1), serde_json::to_value(metrics)?);
        }

        Ok(ExtensionResult::success(json!({
            "sector_density_metrics": density,
            "geometry": {
                "center_x": geometry.center_x,
                "center_y": geometry.center_y,
                "radius": geometry.radius,
                "sector_count": sector_count,
                "coordinate_system": {
                    "origin": "top_left",
                    "zero_angle": "12_oclock",
                    "direction": "clockwise",
                },
            },
            "sector_overlay_path": heatmap_path,
        })))
    }
}

/// Centroid of the iris pixels and the largest distance from it.
pub fn estimate_geometry(points: &[(u32, u32)]) -> Option<IrisGeometry> {
    if points.len() < MIN_IRIS_PIXELS {
        return None;
    }
    let n = points.len() as f64;
    let center_x = points.iter().map(|&(x, _)| f64::from(x)).sum::<f64>() / n;
    let center_y = points.iter().map(|&(_, y)| f64::from(y)).sum::<f64>() / n;
    let radius = points
        .iter()
        .map(|&(x, y)| (f64::from(x) - center_x).hypot(f64::from(y) - center_y))
        .fold(0.0, f64::max);
    Some(IrisGeometry {
        center_x,
        center_y,
        radius,
    })
}

/// Zero-based sector of a point.
pub fn sector_index(x: f64, y: f64, geometry: &IrisGeometry, sector_count: usize) -> usize {
    let dx = x - geometry.center_x;
    let dy = geometry.center_y - y;
    let angle = dx.atan2(dy).rem_euclid(TAU);
    let idx = (angle / TAU * sector_count as f64).floor() as usize;
    idx.min(sector_count - 1)
}

fn bbox(detection: &Value) -> Option<[f64; 4]> {
    let coords = detection.get("bbox")?.as_array()?;
    if coords.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, value) in out.iter_mut().zip(coords) {
        *slot = value.as_f64()?;
    }
    Some(out)
}

fn render_heatmap(iris_mask: &GrayImage, geometry: &IrisGeometry, sector_count: usize) -> GrayImage {
    let step = 255 / sector_count.max(1);
    GrayImage::from_fn(iris_mask.width(), iris_mask.height(), |x, y| {
        if iris_mask.get_pixel(x, y).0[0] == 0 {
            return Luma([0]);
        }
        let idx = sector_index(f64::from(x), f64::from(y), geometry, sector_count);
        Luma([((idx + 1) * step).min(255) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{context_with, square_iris_mask};
    use irisatlas_spec::ExtensionStatus;

    fn geometry() -> IrisGeometry {
        IrisGeometry {
            center_x: 10.0,
            center_y: 10.0,
            radius: 5.0,
        }
    }

    #[test]
    fn test_sector_index_clockwise_from_noon() {
        let g = geometry();
        assert_eq!(sector_index(10.5, 0.0, &g, 12), 0); // just right of 12 o'clock
        assert_eq!(sector_index(20.0, 10.0, &g, 12), 3); // 3 o'clock
        assert_eq!(sector_index(10.0, 20.0, &g, 12), 6); // 6 o'clock
        assert_eq!(sector_index(0.0, 10.0, &g, 12), 9); // 9 o'clock
        assert_eq!(sector_index(9.5, 0.0, &g, 24), 23);
    }

    #[test]
    fn test_rejects_unknown_schema() {
        let ctx = context_with(square_iris_mask(), json!({"extensions": {"sector_mapping": {"schema": 7}}}));
        let result = SectorMapping.run(&ctx).unwrap();
        assert_eq!(result.status, ExtensionStatus::Failed);
        assert_eq!(
            result.warning.as_deref(),
            Some("Unsupported sector schema '7'. Expected 12 or 24.")
        );
    }

    #[test]
    fn test_counts_cover_whole_iris() {
        let ctx = context_with(square_iris_mask(), json!({}));
        let result = SectorMapping.run(&ctx).unwrap();
        assert_eq!(result.status, ExtensionStatus::Success);

        let sectors = result.payload["sector_density_metrics"].as_object().unwrap();
        assert_eq!(sectors.len(), 12);
        let total: u64 = sectors
            .values()
            .map(|s| s["iris_pixels"].as_u64().unwrap())
            .sum();
        assert_eq!(total, 16);
        assert_eq!(result.payload["geometry"]["center_x"], json!(3.5));
        assert!(result.payload["sector_overlay_path"].is_null());
    }

    #[test]
    fn test_counts_micro_feature_boxes() {
        let mut ctx = context_with(square_iris_mask(), json!({"extensions": {"sector_mapping": {"schema": 24}}}));
        ctx.extension_outputs.insert(
            "micro_features".into(),
            json!({"micro_feature_boxes": [
                {"bbox": [4, 2, 5, 3], "label": "crypt"},
                {"bbox": [4, 2, 5, 3], "label": "crypt"},
                {"bbox": [2, 4, 3, 5], "label": "lacunae"}
            ]}),
        );
        let result = SectorMapping.run(&ctx).unwrap();
        let sectors = result.payload["sector_density_metrics"].as_object().unwrap();
        let total: u64 = sectors
            .values()
            .map(|s| s["micro_feature_count"].as_u64().unwrap())
            .sum();
        assert_eq!(total, 3);
        let crypts: u64 = sectors
            .values()
            .filter_map(|s| s["micro_feature_labels"].get("crypt"))
            .map(|v| v.as_u64().unwrap())
            .sum();
        assert_eq!(crypts, 2);
    }

    #[test]
    fn test_heatmap_written_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_with(
            square_iris_mask(),
            json!({"extensions": {"sector_mapping": {"generate_heatmap": true}}}),
        );
        ctx.output_dir = dir.path().to_path_buf();
        let result = SectorMapping.run(&ctx).unwrap();
        let path = result.payload["sector_overlay_path"].as_str().unwrap();
        assert!(std::path::Path::new(path).exists());
    }
}
