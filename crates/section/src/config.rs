use std::{fs, path::Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SectionError};

/// Upper bound on the number of layers an extrusion may be split into
pub const MAX_EXTRUSION_LAYERS: usize = 10_000;

/// How grayscale input is split into foreground and background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "level", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Fixed luma level
    Fixed(u8),
    /// Level picked per image with Otsu's method
    Otsu,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::Fixed(128)
    }
}

/// Which side of the threshold counts as section material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Foreground {
    /// Pixels brighter than the level
    #[default]
    Bright,
    /// Pixels at or below the level (dark ink on white paper)
    Dark,
}

/// How the extracted polygons are combined into the section that gets meshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompositionPolicy {
    /// Only the first (largest) polygon is the section
    #[default]
    Primary,
    /// The first polygon, minus every other polygon it contains
    PrimaryWithHoles,
    /// All polygons; nesting depth decides material (even) or hole (odd)
    EvenOdd,
}

/// Per-job parameters. Every field takes part in the job's cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SectionConfig {
    /// Skeleton components with fewer pixels are dropped as noise
    pub minimum_connected_pixels: u32,
    /// Vertices turning less than this many degrees are merged away
    #[schemars(range(min = 0.0, max = 180.0))]
    pub minimum_corner_angle: f64,
    /// Physical width of the section's bounding box
    pub bbox_x: f64,
    /// Physical height of the section's bounding box
    pub bbox_y: f64,
    /// Maximum element edge length
    pub mesh_size: f64,
    /// Extrusion depth, if a prismatic mesh is wanted
    pub extrude: Option<f64>,
    pub threshold: ThresholdPolicy,
    pub foreground: Foreground,
    /// Douglas-Peucker tolerance in pixels applied before corner merging
    pub simplify_tolerance: f64,
    pub composition: CompositionPolicy,
    /// Allowed relative difference between meshed area and polygon area
    pub area_tolerance: f64,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            minimum_connected_pixels: 50,
            minimum_corner_angle: 15.0,
            bbox_x: 100.0,
            bbox_y: 100.0,
            mesh_size: 10.0,
            extrude: None,
            threshold: ThresholdPolicy::default(),
            foreground: Foreground::default(),
            simplify_tolerance: 1.0,
            composition: CompositionPolicy::default(),
            area_tolerance: 0.01,
        }
    }
}

impl SectionConfig {
    /// Override the target bounding box
    pub fn with_bbox(mut self, bbox_x: f64, bbox_y: f64) -> Self {
        self.bbox_x = bbox_x;
        self.bbox_y = bbox_y;
        self
    }

    pub fn with_mesh_size(mut self, mesh_size: f64) -> Self {
        self.mesh_size = mesh_size;
        self
    }

    pub fn with_minimum_connected_pixels(mut self, pixels: u32) -> Self {
        self.minimum_connected_pixels = pixels;
        self
    }

    pub fn with_extrude(mut self, depth: Option<f64>) -> Self {
        self.extrude = depth;
        self
    }

    pub fn with_composition(mut self, composition: CompositionPolicy) -> Self {
        self.composition = composition;
        self
    }

    /// Reject values no stage can work with
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SectionError::InvalidConfig(format!(
                    "{name} must be a positive finite number, got {value}"
                )))
            }
        }

        positive("bbox_x", self.bbox_x)?;
        positive("bbox_y", self.bbox_y)?;
        positive("mesh_size", self.mesh_size)?;
        if let Some(depth) = self.extrude {
            positive("extrude", depth)?;
            let layers = (depth / self.mesh_size).ceil();
            if layers > MAX_EXTRUSION_LAYERS as f64 {
                return Err(SectionError::InvalidConfig(format!(
                    "extruding {depth} with mesh_size {} needs {layers} layers, more than {MAX_EXTRUSION_LAYERS}",
                    self.mesh_size
                )));
            }
        }
        if !(0.0..180.0).contains(&self.minimum_corner_angle) {
            return Err(SectionError::InvalidConfig(format!(
                "minimum_corner_angle must be in [0, 180), got {}",
                self.minimum_corner_angle
            )));
        }
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(SectionError::InvalidConfig(format!(
                "simplify_tolerance must be a non-negative finite number, got {}",
                self.simplify_tolerance
            )));
        }
        positive("area_tolerance", self.area_tolerance)?;
        Ok(())
    }

    /// JSON schema for config files
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SectionConfig)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => Err(SectionError::InvalidConfig(format!(
                "unsupported config format for {}; use .toml or .json",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = SectionConfig::default();
        assert_eq!(config.minimum_connected_pixels, 50);
        assert_eq!(config.minimum_corner_angle, 15.0);
        assert_eq!((config.bbox_x, config.bbox_y), (100.0, 100.0));
        assert_eq!(config.mesh_size, 10.0);
        assert_eq!(config.extrude, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = SectionConfig::from_toml("bbox_x = 40.0\nmesh_size = 2.5\n")
            .expect("Should parse partial config");
        assert_eq!(config.bbox_x, 40.0);
        assert_eq!(config.mesh_size, 2.5);
        assert_eq!(config.bbox_y, 100.0);
        assert_eq!(config.composition, CompositionPolicy::Primary);
    }

    #[test]
    fn test_json_policies() {
        let config = SectionConfig::from_json(
            r#"{"threshold": {"type": "otsu"}, "foreground": "dark", "composition": "even_odd"}"#,
        )
        .expect("Should parse policies");
        assert_eq!(config.threshold, ThresholdPolicy::Otsu);
        assert_eq!(config.foreground, Foreground::Dark);
        assert_eq!(config.composition, CompositionPolicy::EvenOdd);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(SectionConfig::default().with_mesh_size(0.0).validate().is_err());
        assert!(SectionConfig::default().with_bbox(f64::NAN, 1.0).validate().is_err());
        assert!(SectionConfig::default().with_extrude(Some(-1.0)).validate().is_err());

        let mut config = SectionConfig::default();
        config.minimum_corner_angle = 180.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extrusion_layer_count_is_bounded() {
        let deep = SectionConfig::default().with_mesh_size(1e-3).with_extrude(Some(1e9));
        let err = deep.validate().expect_err("far too many layers");
        assert!(matches!(err, SectionError::InvalidConfig(_)));

        let at_limit = SectionConfig::default()
            .with_mesh_size(1.0)
            .with_extrude(Some(MAX_EXTRUSION_LAYERS as f64));
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "bbox_x: 1").expect("write");
        let err = SectionConfig::from_file(&path).expect_err("yaml is unsupported");
        assert!(matches!(err, SectionError::InvalidConfig(_)));
    }
}
