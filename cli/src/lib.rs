use schemars::JsonSchema;
use section::{FailureKind, JobOutcome, SectionConfig, SectionError, SectionProperties};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Section(#[from] SectionError),
    #[error("Manifest lists no images")]
    EmptyManifest,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// A batch of images analysed with one configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Manifest {
    /// Image paths, relative to the manifest file
    pub images: Vec<String>,
    #[serde(default)]
    pub config: SectionConfig,
    /// Directory for one GeoJSON outline per image
    #[serde(default)]
    pub geojson_dir: Option<String>,
}

impl Manifest {
    /// Load a manifest from TOML string
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let manifest: Manifest = toml::from_str(content)?;
        manifest.checked()
    }

    /// Load a manifest from JSON string
    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let manifest: Manifest = serde_json::from_str(content)?;
        manifest.checked()
    }

    fn checked(self) -> Result<Self, CliError> {
        if self.images.is_empty() {
            return Err(CliError::EmptyManifest);
        }
        Ok(self)
    }

    /// Auto-detect file format and load the manifest
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&fs::read_to_string(path_ref)?),
            Some("json") => Self::from_json(&fs::read_to_string(path_ref)?),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    /// Image paths resolved against the directory holding the manifest
    pub fn resolve_images(&self, manifest_path: &Path) -> Vec<PathBuf> {
        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        self.images.iter().map(|image| base.join(image)).collect()
    }

    /// Convert the manifest to TOML string
    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Save the manifest to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        fs::write(path, serde_json::to_string_pretty(&self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureReport {
    pub kind: FailureKind,
    pub message: String,
}

/// What the CLI prints for one image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageReport {
    pub image: String,
    pub job: String,
    pub state: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<SectionProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

impl ImageReport {
    pub fn new(image: &Path, outcome: &JobOutcome) -> Self {
        let (properties, failure) = match &outcome.result {
            Ok(properties) => (Some(*properties), None),
            Err(e) => (
                None,
                Some(FailureReport {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            ),
        };
        Self {
            image: image.display().to_string(),
            job: outcome.job.key().to_string(),
            state: outcome.job.state().to_string(),
            cached: outcome.cached,
            properties,
            failure,
        }
    }

    /// The report block shown to users
    pub fn render_text(&self) -> String {
        let body = match (&self.properties, &self.failure) {
            (Some(properties), _) => properties.to_string(),
            (None, Some(failure)) => format!("error ({}): {}", failure.kind, failure.message),
            (None, None) => "no result".to_string(),
        };
        format!("== {} ==\n{}", self.image, body)
    }

    pub fn is_success(&self) -> bool {
        self.properties.is_some()
    }
}
