//! Job execution around the stage pipeline.
//!
//! Every stage except meshing runs concurrently across jobs on the blocking
//! pool. Meshing goes through the [`MeshGate`], which admits one backend call
//! at a time. Completed results are memoized by [`JobKey`].

pub mod cache;
pub mod gate;
pub mod job;

use std::{sync::Arc, time::Duration};

use image::DynamicImage;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::{
    algorithms::SpadeMeshBackend,
    config::SectionConfig,
    error::{Result, SectionError},
    pipeline::SectionPipeline,
    traits::MeshBackend,
    types::{Section, SectionProperties},
    worker::MeshRequest,
};

pub use cache::ResultCache;
pub use gate::{LockScope, MeshGate, MeshIsolation, MeshPermit, WorkerCommand};
pub use job::{Job, JobKey, JobState};

/// Everything known about a finished job
#[derive(Debug)]
pub struct JobOutcome {
    pub job: Job,
    /// Served from the result cache without running any stage
    pub cached: bool,
    /// The composed section, once scaling succeeded
    pub section: Option<Section>,
    pub result: Result<SectionProperties>,
}

enum Input {
    Image(DynamicImage),
    Upload(Vec<u8>),
}

pub struct Orchestrator {
    pipeline: Arc<SectionPipeline>,
    gate: MeshGate,
    lock_scope: LockScope,
    cache: Option<ResultCache>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn gate(&self) -> &MeshGate {
        &self.gate
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Compute the properties of a decoded image
    pub async fn run(&self, image: DynamicImage, config: &SectionConfig) -> Result<SectionProperties> {
        self.process(image, config).await.result
    }

    pub async fn process(&self, image: DynamicImage, config: &SectionConfig) -> JobOutcome {
        let key = JobKey::derive(&image, config);
        self.execute(key, Input::Image(image), config).await
    }

    /// Like [`process`](Self::process), starting from the encoded upload
    pub async fn process_upload(&self, payload: Vec<u8>, config: &SectionConfig) -> JobOutcome {
        let key = JobKey::derive_upload(&payload, config);
        self.execute(key, Input::Upload(payload), config).await
    }

    /// One job per image, all submitted at once. Results keep submission order.
    pub async fn run_batch(
        self: &Arc<Self>,
        images: Vec<DynamicImage>,
        config: &SectionConfig,
    ) -> Vec<Result<SectionProperties>> {
        let handles: Vec<_> = images
            .into_iter()
            .map(|image| {
                let orchestrator = Arc::clone(self);
                let config = config.clone();
                tokio::spawn(async move { orchestrator.run(image, &config).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(settle(handle.await));
        }
        results
    }

    async fn execute(&self, key: JobKey, input: Input, config: &SectionConfig) -> JobOutcome {
        let mut job = Job::new(key);
        let mut section = None;
        info!("Job {} received", job.key().short());

        let result = self.drive(&mut job, &mut section, input, config).await;
        let cached = matches!(result, Ok((_, true)));
        let result = match result {
            Ok((properties, _)) => {
                info!(
                    "Job {} completed{}: area {}",
                    job.key().short(),
                    if cached { " from cache" } else { "" },
                    properties.area
                );
                Ok(properties)
            }
            Err(e) => {
                let stage = job.state();
                job.fail(e.kind());
                warn!("Job {} failed while {}: {}", job.key().short(), stage, e);
                Err(e)
            }
        };

        JobOutcome {
            job,
            cached,
            section,
            result,
        }
    }

    /// Returns the properties and whether they came from the cache
    async fn drive(
        &self,
        job: &mut Job,
        section_slot: &mut Option<Section>,
        input: Input,
        config: &SectionConfig,
    ) -> Result<(SectionProperties, bool)> {
        config.validate()?;

        if let Some(properties) = self.cache.as_ref().and_then(|cache| cache.get(job.key())) {
            job.advance(JobState::Completed)?;
            return Ok((properties, true));
        }

        let job_permit = match self.lock_scope {
            LockScope::Job => {
                debug!("Job {} waiting for the mesh lock", job.key().short());
                Some(self.gate.acquire().await)
            }
            LockScope::Meshing => None,
        };

        let pipeline = Arc::clone(&self.pipeline);
        let stage_config = config.clone();
        let mut staged = job.clone();
        let (staged, prepared) = tokio::task::spawn_blocking(move || {
            let prepared = prepare(&pipeline, &mut staged, input, &stage_config);
            (staged, prepared)
        })
        .await?;
        *job = staged;
        let section = prepared?;
        *section_slot = Some(section.clone());

        job.advance(JobState::Meshing)?;
        let request = MeshRequest::new(section.clone(), config.mesh_size, config.extrude);
        let mesh = match &job_permit {
            Some(permit) => permit.mesh(request).await?,
            None => {
                debug!("Job {} waiting for the mesh lock", job.key().short());
                self.gate.acquire().await.mesh(request).await?
            }
        };
        debug!(
            "Job {} meshed: {} nodes, {} elements",
            job.key().short(),
            mesh.nodes.len(),
            mesh.elements.len()
        );

        job.advance(JobState::Integrating)?;
        let pipeline = Arc::clone(&self.pipeline);
        let stage_config = config.clone();
        let properties =
            tokio::task::spawn_blocking(move || pipeline.integrate(&mesh, &section, &stage_config)).await??;
        drop(job_permit);

        if let Some(cache) = &self.cache {
            cache.insert(job.key(), properties);
        }
        job.advance(JobState::Completed)?;
        Ok((properties, false))
    }
}

/// A batch slot's result, with a lost task reported as its own join failure
fn settle<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    joined.unwrap_or_else(|e| {
        error!("Batch job task failed: {}", e);
        Err(SectionError::Join(e))
    })
}

/// Decode through scaling, recording each state on the job
fn prepare(pipeline: &SectionPipeline, job: &mut Job, input: Input, config: &SectionConfig) -> Result<Section> {
    let image = match input {
        Input::Image(image) => image,
        Input::Upload(payload) => {
            job.advance(JobState::Decoding)?;
            pipeline.decode(&payload)?
        }
    };

    job.advance(JobState::Skeletonizing)?;
    let skeleton = pipeline.skeletonize(&image, config)?;

    job.advance(JobState::Polygonizing)?;
    let polygons = pipeline.polygonize(&skeleton, config)?;
    debug!("Job {} found {} polygon(s)", job.key().short(), polygons.len());

    job.advance(JobState::Scaling)?;
    let (_, section) = pipeline.scale(&polygons, config)?;
    Ok(section)
}

/// Builder for orchestrators with a fluent API
pub struct OrchestratorBuilder {
    pipeline: Option<SectionPipeline>,
    backend: Option<Arc<dyn MeshBackend>>,
    isolation: MeshIsolation,
    mesh_timeout: Option<Duration>,
    lock_scope: LockScope,
    cache: Option<ResultCache>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            backend: None,
            isolation: MeshIsolation::default(),
            mesh_timeout: None,
            lock_scope: LockScope::default(),
            cache: Some(ResultCache::in_memory()),
        }
    }

    pub fn pipeline(mut self, pipeline: SectionPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Set the mesh backend (replaces the default spade mesher)
    pub fn mesh_backend<B>(mut self, backend: B) -> Self
    where
        B: MeshBackend + 'static,
    {
        self.backend = Some(Arc::new(backend));
        self
    }

    pub fn isolation(mut self, isolation: MeshIsolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn mesh_timeout(mut self, timeout: Duration) -> Self {
        self.mesh_timeout = Some(timeout);
        self
    }

    pub fn lock_scope(mut self, scope: LockScope) -> Self {
        self.lock_scope = scope;
        self
    }

    pub fn cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Disable memoization
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn build(self) -> Orchestrator {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(SpadeMeshBackend::default()));
        Orchestrator {
            pipeline: Arc::new(self.pipeline.unwrap_or_default()),
            gate: MeshGate::new(backend, self.isolation, self.mesh_timeout),
            lock_scope: self.lock_scope,
            cache: self.cache,
        }
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
