use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::SectionConfig,
    error::{FailureKind, Result, SectionError},
};

/// Content address of a job: SHA-256 over the pixels and the configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn derive(image: &DynamicImage, config: &SectionConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"image");
        hasher.update(image.width().to_le_bytes());
        hasher.update(image.height().to_le_bytes());
        hasher.update(format!("{:?}", image.color()).as_bytes());

        let pixels = image.as_bytes();
        hasher.update((pixels.len() as u64).to_le_bytes());
        hasher.update(pixels);

        Self::finish(hasher, config)
    }

    /// Key of an undecoded upload, so repeated uploads skip decoding too
    pub fn derive_upload(payload: &[u8], config: &SectionConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"upload");
        hasher.update((payload.len() as u64).to_le_bytes());
        hasher.update(payload);
        Self::finish(hasher, config)
    }

    fn finish(mut hasher: Sha256, config: &SectionConfig) -> Self {
        // plain data never fails to serialize; Debug is the lossless fallback
        let config = serde_json::to_vec(config).unwrap_or_else(|_| format!("{config:?}").into_bytes());
        hasher.update(config);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Lowercase hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading digits, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum JobState {
    Received,
    Decoding,
    Skeletonizing,
    Polygonizing,
    Scaling,
    Meshing,
    Integrating,
    Completed,
    Failed(FailureKind),
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Decoding => 1,
            Self::Skeletonizing => 2,
            Self::Polygonizing => 3,
            Self::Scaling => 4,
            Self::Meshing => 5,
            Self::Integrating => 6,
            Self::Completed | Self::Failed(_) => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::Decoding => f.write_str("decoding"),
            Self::Skeletonizing => f.write_str("skeletonizing"),
            Self::Polygonizing => f.write_str("polygonizing"),
            Self::Scaling => f.write_str("scaling"),
            Self::Meshing => f.write_str("meshing"),
            Self::Integrating => f.write_str("integrating"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// One submission and the states it went through.
///
/// States only move forward; terminal states are final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    key: JobKey,
    history: Vec<JobState>,
}

impl Job {
    pub fn new(key: JobKey) -> Self {
        Self {
            key,
            history: vec![JobState::Received],
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn state(&self) -> JobState {
        self.history.last().copied().unwrap_or(JobState::Received)
    }

    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    pub fn advance(&mut self, next: JobState) -> Result<()> {
        let current = self.state();
        if current.is_terminal() || next.rank() <= current.rank() {
            return Err(SectionError::StateTransition(format!(
                "job {} cannot move from {current} to {next}",
                self.key
            )));
        }
        self.history.push(next);
        Ok(())
    }

    /// Record a failure; a job that already finished keeps its outcome
    pub fn fail(&mut self, kind: FailureKind) {
        if !self.state().is_terminal() {
            self.history.push(JobState::Failed(kind));
        }
    }
}
