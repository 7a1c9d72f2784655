use image::{DynamicImage, GrayImage};

use crate::{
    config::SectionConfig,
    error::Result,
    types::{Mesh, Polygon},
    worker::MeshRequest,
};

/// Trait for turning an uploaded payload into pixels
pub trait ImageDecoder: Send + Sync {
    /// Decode an upload (envelope or raw encoded bytes) into an image
    fn decode(&self, payload: &[u8]) -> Result<DynamicImage>;
}

/// Trait for skeletonization algorithms
pub trait SkeletonExtractor: Send + Sync {
    /// Reduce the image to a same-size binary skeleton (255 = set)
    fn extract_skeleton(&self, image: &DynamicImage, config: &SectionConfig) -> Result<GrayImage>;
}

/// Trait for turning a skeleton into vector rings
pub trait PolygonExtractor: Send + Sync {
    /// Extract rings ordered by descending source component size
    fn extract_polygons(&self, skeleton: &GrayImage, config: &SectionConfig) -> Result<Vec<Polygon>>;
}

/// Trait for meshing engines.
///
/// Implementations are assumed to hold process-global state; only the
/// orchestrator's mesh gate calls them.
pub trait MeshBackend: Send + Sync {
    fn generate(&self, request: &MeshRequest) -> Result<Mesh>;
}

/// Area and second moments integrated over a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrated {
    pub area: f64,
    pub ix: f64,
    pub iy: f64,
    pub ixy: f64,
}

/// Trait for numerical integration of section properties
pub trait PropertyIntegrator: Send + Sync {
    /// Integrate about axes through `centroid`
    fn integrate(&self, mesh: &Mesh, centroid: [f64; 2]) -> Result<Integrated>;
}
