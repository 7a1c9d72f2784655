use std::{
    path::PathBuf,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::AsyncWriteExt,
    process::Command,
    sync::{Mutex, MutexGuard},
    time::Instant,
};
use tracing::{debug, warn};

use crate::{
    error::{Result, SectionError},
    traits::MeshBackend,
    types::Mesh,
    worker::{MeshRequest, MeshResponse},
};

/// How long the mesh lock is held for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// Only around the backend call
    #[default]
    Meshing,
    /// From the first stage to the last
    Job,
}

/// Program that speaks the worker protocol on stdin/stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Where the backend runs
#[derive(Debug, Clone, Default)]
pub enum MeshIsolation {
    /// On the blocking thread pool; a timed out call is abandoned
    #[default]
    InProcess,
    /// In a child process that is killed on timeout
    Subprocess(WorkerCommand),
}

/// Sole entry point to the mesh backend.
///
/// The lock is a FIFO-fair tokio mutex, so waiters are served in arrival
/// order and a waiter can be cancelled by dropping its future. In-process
/// calls also hold a second lock from inside the blocking thread, so a call
/// abandoned on timeout keeps the backend closed until the thread returns.
pub struct MeshGate {
    lock: Mutex<()>,
    backend_busy: Arc<Mutex<()>>,
    backend: Arc<dyn MeshBackend>,
    isolation: MeshIsolation,
    timeout: Option<Duration>,
    invocations: AtomicUsize,
}

/// Proof of holding a gate's mesh lock. Only [`MeshGate::acquire`] makes one.
pub struct MeshPermit<'a> {
    gate: &'a MeshGate,
    _guard: MutexGuard<'a, ()>,
}

impl MeshPermit<'_> {
    /// Run the backend under this permit
    pub async fn mesh(&self, request: MeshRequest) -> Result<Mesh> {
        self.gate.mesh(request).await
    }
}

impl MeshGate {
    pub fn new(backend: Arc<dyn MeshBackend>, isolation: MeshIsolation, timeout: Option<Duration>) -> Self {
        Self {
            lock: Mutex::new(()),
            backend_busy: Arc::new(Mutex::new(())),
            backend,
            isolation,
            timeout,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Wait for the mesh lock
    pub async fn acquire(&self) -> MeshPermit<'_> {
        MeshPermit {
            gate: self,
            _guard: self.lock.lock().await,
        }
    }

    /// Backend calls made so far, including failed and timed out ones
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn mesh(&self, request: MeshRequest) -> Result<Mesh> {
        let call = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Mesh call #{} ({:?})", call, self.isolation);

        match &self.isolation {
            MeshIsolation::InProcess => self.mesh_in_process(request).await,
            MeshIsolation::Subprocess(command) => self.mesh_in_subprocess(command, &request).await,
        }
    }

    async fn mesh_in_process(&self, request: MeshRequest) -> Result<Mesh> {
        let Some(limit) = self.timeout else {
            let busy = Arc::clone(&self.backend_busy).lock_owned().await;
            let backend = Arc::clone(&self.backend);
            return tokio::task::spawn_blocking(move || {
                let _busy = busy;
                backend.generate(&request)
            })
            .await?;
        };

        // waiting out an abandoned call counts against this call's limit
        let deadline = Instant::now() + limit;
        let waiting = Arc::clone(&self.backend_busy).lock_owned();
        let Ok(busy) = tokio::time::timeout_at(deadline, waiting).await else {
            warn!("An abandoned mesh call still occupies the backend after {:?}", limit);
            return Err(SectionError::MeshGenerationTimeout { timeout: limit });
        };
        let backend = Arc::clone(&self.backend);
        let task = tokio::task::spawn_blocking(move || {
            let _busy = busy;
            backend.generate(&request)
        });

        match tokio::time::timeout_at(deadline, task).await {
            Ok(joined) => joined?,
            Err(_) => {
                // the thread keeps the backend closed until it returns
                warn!("Mesh backend exceeded {:?}; abandoning the worker thread", limit);
                Err(SectionError::MeshGenerationTimeout { timeout: limit })
            }
        }
    }

    async fn mesh_in_subprocess(&self, command: &WorkerCommand, request: &MeshRequest) -> Result<Mesh> {
        let input = serde_json::to_vec(request)?;
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SectionError::MeshGenerationFailed("worker stdin unavailable".into()))?;

        let exchange = async move {
            // a worker that exits without reading its input reports through its status
            if let Err(e) = stdin.write_all(&input).await {
                debug!("Worker closed stdin early: {}", e);
            }
            drop(stdin);
            child.wait_with_output().await
        };

        // dropping `exchange` drops the child, which kills it
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!("Mesh worker {} exceeded {:?}; killed", command.program.display(), limit);
                    return Err(SectionError::MeshGenerationTimeout { timeout: limit });
                }
            },
            None => exchange.await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SectionError::MeshGenerationFailed(format!(
                "worker exited with {}: {}",
                output.status,
                stderr.lines().last().unwrap_or("").trim()
            )));
        }
        let response: MeshResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| SectionError::MeshGenerationFailed(format!("malformed worker response: {e}")))?;
        response.into_result()
    }
}
