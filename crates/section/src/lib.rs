//! # Section Properties from Images
//!
//! Turns a raster drawing of a cross-section into its engineering section
//! properties: area, centroid and the area moments of inertia about the
//! centroidal axes.
//!
//! ## Stages
//!
//! - **Skeletonize**: binarize and reduce the outline to a one pixel skeleton
//! - **Polygonize**: trace skeleton components into vector rings
//! - **Scale**: map pixel rings onto the physical bounding box
//! - **Mesh**: constrained Delaunay triangulation of the section (optionally extruded)
//! - **Integrate**: exact second-moment sums over the mesh triangles
//!
//! The mesh backend is treated as non-reentrant; the [`Orchestrator`] is the
//! only caller and admits one meshing call at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use section::{Orchestrator, SectionConfig};
//!
//! # async fn demo() -> section::Result<()> {
//! let orchestrator = Orchestrator::builder().build();
//! let config = SectionConfig::default().with_bbox(40.0, 20.0);
//!
//! let image = image::open("profile.png")?;
//! let properties = orchestrator.run(image, &config).await?;
//! println!("{properties}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Stages
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use section::{Orchestrator, SectionPipeline, MeshIsolation, WorkerCommand};
//!
//! let orchestrator = Orchestrator::builder()
//!     .pipeline(SectionPipeline::builder().with_centerline_skeleton().build())
//!     .isolation(MeshIsolation::Subprocess(
//!         WorkerCommand::new("section_cli").arg("mesh-worker"),
//!     ))
//!     .mesh_timeout(Duration::from_secs(30))
//!     .build();
//! ```

pub mod error;
pub mod config;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod orchestrator;
pub mod worker;
pub mod io;

pub use error::{FailureKind, Result, SectionError};
pub use config::{CompositionPolicy, Foreground, MAX_EXTRUSION_LAYERS, SectionConfig, ThresholdPolicy};
pub use types::*;
pub use traits::*;
pub use algorithms::*;
pub use pipeline::{SectionPipeline, builder::PipelineBuilder};
pub use orchestrator::{
    Job, JobKey, JobOutcome, JobState, LockScope, MeshGate, MeshIsolation, MeshPermit, Orchestrator,
    OrchestratorBuilder, ResultCache, WorkerCommand,
};
pub use worker::{MeshRequest, MeshResponse};
