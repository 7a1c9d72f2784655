use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use tracing::{debug, warn};

use crate::{error::Result, orchestrator::job::JobKey, types::SectionProperties};

/// Memo of completed jobs keyed by content address.
///
/// With a directory attached, each entry is also written to `<key>.json`
/// so results survive restarts.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<JobKey, SectionProperties>>,
    dir: Option<PathBuf>,
}

impl ResultCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache backed by `dir`, created if missing
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            entries: RwLock::default(),
            dir: Some(dir),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn entry_path(&self, key: &JobKey) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(format!("{key}.json")))
    }

    pub fn get(&self, key: &JobKey) -> Option<SectionProperties> {
        let cached = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied();
        if cached.is_some() {
            return cached;
        }

        let path = self.entry_path(key)?;
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<SectionProperties>(&content) {
            Ok(properties) => {
                debug!("Loaded cached result from {}", path.display());
                self.entries
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.clone(), properties);
                Some(properties)
            }
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store a result. Disk write failures are logged, never returned.
    pub fn insert(&self, key: &JobKey, properties: SectionProperties) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), properties);

        if let Some(path) = self.entry_path(key) {
            let written = serde_json::to_vec_pretty(&properties)
                .map_err(std::io::Error::from)
                .and_then(|bytes| fs::write(&path, bytes));
            if let Err(e) = written {
                warn!("Failed to write cache entry {}: {}", path.display(), e);
            }
        }
    }

    /// Entries held in memory
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
