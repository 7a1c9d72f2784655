//! Mesh worker protocol.
//!
//! A worker process reads one [`MeshRequest`] as JSON from its input and
//! answers with one [`MeshResponse`]. Running the backend out of process lets
//! the orchestrator kill a mesher that overruns its time limit.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    error::{Result, SectionError},
    traits::MeshBackend,
    types::{Mesh, Section},
};

/// Cap on vertices refinement may add beyond the densified boundary
pub const DEFAULT_MAX_ADDITIONAL_VERTICES: usize = 200_000;

/// Everything the mesh backend needs for one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshRequest {
    pub section: Section,
    pub mesh_size: f64,
    pub extrude: Option<f64>,
    #[serde(default = "default_max_additional_vertices")]
    pub max_additional_vertices: usize,
}

fn default_max_additional_vertices() -> usize {
    DEFAULT_MAX_ADDITIONAL_VERTICES
}

impl MeshRequest {
    pub fn new(section: Section, mesh_size: f64, extrude: Option<f64>) -> Self {
        Self {
            section,
            mesh_size,
            extrude,
            max_additional_vertices: DEFAULT_MAX_ADDITIONAL_VERTICES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MeshResponse {
    Ok { mesh: Mesh },
    Failed { message: String },
}

impl MeshResponse {
    /// Back into the error the backend would have returned in-process
    pub fn into_result(self) -> Result<Mesh> {
        match self {
            Self::Ok { mesh } => Ok(mesh),
            Self::Failed { message } => Err(SectionError::MeshGenerationFailed(message)),
        }
    }
}

/// Serve a single request.
///
/// Backend failures are reported in the response; only I/O and malformed
/// requests surface as errors.
pub fn serve<R: Read, W: Write>(mut reader: R, mut writer: W, backend: &dyn MeshBackend) -> Result<()> {
    let mut input = String::new();
    reader.read_to_string(&mut input)?;
    let request: MeshRequest = serde_json::from_str(&input)?;
    debug!(
        "Worker meshing {} shape(s) at mesh size {}",
        request.section.shapes.len(),
        request.mesh_size
    );

    let response = match backend.generate(&request) {
        Ok(mesh) => MeshResponse::Ok { mesh },
        Err(e) => {
            error!("Worker mesh generation failed: {}", e);
            MeshResponse::Failed { message: e.to_string() }
        }
    };
    serde_json::to_writer(&mut writer, &response)?;
    writer.flush()?;
    Ok(())
}
