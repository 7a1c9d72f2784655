use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SectionError {
    #[error("Failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Upload payload is not valid base64: {0}")]
    PayloadEncoding(#[from] base64::DecodeError),

    #[error("Malformed upload payload: {0}")]
    MalformedPayload(String),

    #[error("Image contains no foreground pixels after binarization")]
    EmptyImage,

    #[error("No polygon found: no skeleton component reaches {minimum_connected_pixels} pixels (largest has {largest_component})")]
    NoPolygonFound {
        minimum_connected_pixels: u32,
        largest_component: usize,
    },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Mesh generation failed: {0}")]
    MeshGenerationFailed(String),

    #[error("Mesh generation did not finish within {timeout:?}")]
    MeshGenerationTimeout { timeout: Duration },

    #[error("Integration error: {0}")]
    Integration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid job state transition: {0}")]
    StateTransition(String),
}

/// Coarse failure classification rendered by callers as a human-readable kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize,
    Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Decode,
    EmptyImage,
    NoPolygonFound,
    DegenerateGeometry,
    MeshGenerationFailed,
    MeshGenerationTimeout,
    Integration,
    InvalidConfig,
    Internal,
}

impl SectionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ImageDecode(_) | Self::PayloadEncoding(_) | Self::MalformedPayload(_) => {
                FailureKind::Decode
            }
            Self::EmptyImage => FailureKind::EmptyImage,
            Self::NoPolygonFound { .. } => FailureKind::NoPolygonFound,
            Self::DegenerateGeometry(_) => FailureKind::DegenerateGeometry,
            Self::MeshGenerationFailed(_) => FailureKind::MeshGenerationFailed,
            Self::MeshGenerationTimeout { .. } => FailureKind::MeshGenerationTimeout,
            Self::Integration(_) => FailureKind::Integration,
            Self::InvalidConfig(_) | Self::Toml(_) => FailureKind::InvalidConfig,
            Self::Serialization(_) | Self::Io(_) | Self::Join(_) | Self::StateTransition(_) => {
                FailureKind::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SectionError>;
