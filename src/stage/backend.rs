//! Boundary to the inference runtime.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use ndarray::{Array4, ArrayD};
use parking_lot::Mutex;

use crate::error::{InferenceError, InferenceResult};
use crate::stage::StageKind;

/// A loaded network that can execute one input tensor.
///
/// Implementations are shared across worker threads, so `run` must be
/// reentrant or guard its own state.
pub trait InferenceBackend: Send + Sync {
    /// Expected input layout as (batch, channels, height, width).
    fn input_shape(&self) -> [usize; 4];

    fn is_loaded(&self) -> bool {
        true
    }

    fn run(&self, input: Array4<f32>) -> InferenceResult<Vec<ArrayD<f32>>>;
}

type Outputs = InferenceResult<Vec<ArrayD<f32>>>;

/// One bounded call waiting for a worker.
struct Job {
    input: Array4<f32>,
    deadline: Instant,
    reply: Sender<Outputs>,
}

/// Fixed set of threads that run bounded calls for one model.
///
/// Threads are spawned on the first bounded call and exit once every
/// handle to the model is dropped. A stalled backend can occupy at most
/// `workers` threads; further calls queue and time out.
struct WorkerPool {
    workers: usize,
    queue: Mutex<Option<Sender<Job>>>,
}

impl WorkerPool {
    fn new(workers: usize) -> Self {
        Self {
            workers,
            queue: Mutex::new(None),
        }
    }

    fn spawned(&self) -> usize {
        if self.queue.lock().is_some() { self.workers } else { 0 }
    }

    fn sender(
        &self,
        name: &str,
        backend: &Arc<dyn InferenceBackend>,
    ) -> InferenceResult<Sender<Job>> {
        let mut queue = self.queue.lock();
        if let Some(sender) = queue.as_ref() {
            return Ok(sender.clone());
        }

        let (sender, recv) = crossbeam::channel::bounded(self.workers);
        for index in 0..self.workers {
            let backend = Arc::clone(backend);
            let recv: Receiver<Job> = recv.clone();
            thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    for job in recv {
                        // The caller has already reported a timeout for this one.
                        if Instant::now() >= job.deadline {
                            continue;
                        }
                        job.reply.send(backend.run(job.input)).ok();
                    }
                })
                .map_err(|e| {
                    InferenceError::backend(format!("failed to spawn inference worker: {e}"))
                })?;
        }
        *queue = Some(sender.clone());
        Ok(sender)
    }
}

/// Cheaply clonable, read-only handle to a loaded model.
#[derive(Clone)]
pub struct ModelHandle {
    name: Arc<str>,
    backend: Arc<dyn InferenceBackend>,
    pool: Arc<WorkerPool>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("input_shape", &self.backend.input_shape())
            .field("workers", &self.pool.workers)
            .finish()
    }
}

impl ModelHandle {
    pub fn new<B: InferenceBackend + 'static>(name: &str, backend: B) -> Self {
        Self::from_arc(name, Arc::new(backend))
    }

    /// Wrap a shared backend. Bounded calls get one worker per available core.
    pub fn from_arc(name: &str, backend: Arc<dyn InferenceBackend>) -> Self {
        let workers = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::with_workers(name, backend, workers)
    }

    /// Wrap a shared backend with a fixed number of worker threads for
    /// bounded calls.
    pub fn with_workers(
        name: &str,
        backend: Arc<dyn InferenceBackend>,
        workers: NonZeroUsize,
    ) -> Self {
        Self {
            name: Arc::from(name),
            backend,
            pool: Arc::new(WorkerPool::new(workers.get())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.backend.input_shape()
    }

    /// Model input as (width, height).
    pub fn input_size(&self) -> InferenceResult<(u32, u32)> {
        let [_, _, height, width] = self.backend.input_shape();
        let dimension = |value: usize| {
            u32::try_from(value).map_err(|_| {
                InferenceError::InvalidInput(format!(
                    "{} model input dimension {value} does not fit in u32",
                    self.name
                ))
            })
        };
        Ok((dimension(width)?, dimension(height)?))
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_loaded()
    }

    /// Worker threads currently serving bounded calls for this model.
    pub fn worker_threads(&self) -> usize {
        self.pool.spawned()
    }

    /// Execute `input`, giving up after `budget` when one is set.
    ///
    /// A bounded call is queued to the model's worker threads. When the
    /// budget expires the caller gets [`InferenceError::StageTimeout`]; a
    /// call still queued at that point is dropped unrun, and a call already
    /// running finishes on its worker with the result discarded.
    pub fn execute(
        &self,
        stage: StageKind,
        input: Array4<f32>,
        budget: Option<Duration>,
    ) -> Outputs {
        if !self.backend.is_loaded() {
            return Err(InferenceError::ModelNotLoaded(stage));
        }
        let expected = self.backend.input_shape();
        if input.shape() != expected.as_slice() {
            return Err(InferenceError::InputShapeMismatch {
                expected: expected.to_vec(),
                actual: input.shape().to_vec(),
            });
        }

        let Some(budget) = budget else {
            return self.backend.run(input);
        };

        let timeout = || InferenceError::StageTimeout {
            stage,
            budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        };
        let deadline = Instant::now() + budget;
        let queue = self.pool.sender(&self.name, &self.backend)?;
        let (reply, recv) = crossbeam::channel::bounded(1);
        let job = Job {
            input,
            deadline,
            reply,
        };
        match queue.send_timeout(job, budget) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(timeout()),
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(InferenceError::backend("inference workers have exited"));
            }
        }

        match recv.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(timeout()),
            Err(RecvTimeoutError::Disconnected) => {
                // Dropped unrun because the deadline passed while queued.
                if Instant::now() >= deadline {
                    Err(timeout())
                } else {
                    Err(InferenceError::backend("inference worker exited without a result"))
                }
            }
        }
    }
}
