//! The worker pool: generate, featurize, publish.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use prexsyn_chem::ChemistryEngine;
use prexsyn_core::{ChemicalSpaceDefinition, GenerationError, Synthesis, SynthesisGenerator};
use prexsyn_featurize::{FeaturizerSet, Sample};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::queue::{BoundedQueue, PopError, PushOutcome};

/// Pause after a failed route so a worker that can never succeed does not
/// spin.
const FAILURE_BACKOFF: Duration = Duration::from_millis(1);

/// One published route and its features.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineItem {
    /// Index of the worker that produced it.
    pub worker: usize,
    pub synthesis: Synthesis,
    pub sample: Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        })
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Items published to the queue.
    pub produced: u64,
    /// Items evicted by `DropOldest`.
    pub dropped: u64,
    /// Routes abandoned after exhausting their retry budget.
    pub exhausted: u64,
    /// Routes that failed for any other reason.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    produced: AtomicU64,
    dropped: AtomicU64,
    exhausted: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            produced: self.produced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Fixed pool of worker threads feeding one bounded queue.
///
/// Workers share the chemical space, featurizers and engine read-only; the
/// queue is the only shared mutable state. Lifecycle is
/// `Idle -> Running -> Stopped`; dropping a running pipeline stops it.
pub struct DataPipeline {
    config: PipelineConfig,
    space: Arc<ChemicalSpaceDefinition>,
    featurizers: Arc<FeaturizerSet>,
    engine: Arc<dyn ChemistryEngine>,
    queue: Arc<BoundedQueue<PipelineItem>>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    state: PipelineState,
}

impl DataPipeline {
    pub fn new(
        config: PipelineConfig,
        space: Arc<ChemicalSpaceDefinition>,
        featurizers: Arc<FeaturizerSet>,
        engine: Arc<dyn ChemistryEngine>,
    ) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(BoundedQueue::new(config.capacity, config.overflow));
        Ok(Self {
            config,
            space,
            featurizers,
            engine,
            queue,
            counters: Arc::new(Counters::default()),
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            state: PipelineState::Idle,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Items waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Spawn the workers.
    ///
    /// Every worker's generator is built before any thread starts, so an
    /// invalid option leaves the pipeline idle.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        let generators = (0..self.config.num_workers)
            .map(|worker| {
                SynthesisGenerator::new(
                    Arc::clone(&self.space),
                    Arc::clone(&self.engine),
                    self.config.worker_option(worker),
                )
                .map_err(|e| PipelineError::Configuration(format!("worker {worker}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        self.running.store(true, Ordering::Release);
        self.state = PipelineState::Running;
        for (worker, generator) in generators.into_iter().enumerate() {
            let context = WorkerContext {
                worker,
                generator,
                featurizers: Arc::clone(&self.featurizers),
                engine: Arc::clone(&self.engine),
                queue: Arc::clone(&self.queue),
                counters: Arc::clone(&self.counters),
                running: Arc::clone(&self.running),
            };
            let handle = thread::Builder::new()
                .name(format!("prexsyn-worker-{worker}"))
                .spawn(move || context.run());
            match handle {
                Ok(handle) => self.workers.push(handle),
                Err(source) => {
                    self.shutdown();
                    return Err(PipelineError::Spawn { worker, source });
                }
            }
        }
        info!(
            workers = self.config.num_workers,
            capacity = self.config.capacity,
            "pipeline started"
        );
        Ok(())
    }

    /// Signal the workers, close the queue and join them. Stopping twice is a
    /// no-op.
    pub fn stop(&mut self) {
        match self.state {
            PipelineState::Stopped => {}
            PipelineState::Idle => {
                self.queue.close();
                self.state = PipelineState::Stopped;
            }
            PipelineState::Running => {
                self.shutdown();
                info!(stats = ?self.counters.snapshot(), "pipeline stopped");
            }
        }
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        self.queue.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("pipeline worker panicked");
            }
        }
        self.state = PipelineState::Stopped;
    }

    /// Wait up to `timeout` for one item.
    ///
    /// After [`stop`](Self::stop), items still queued are returned first;
    /// then [`PipelineError::Closed`].
    pub fn get(&self, timeout: Duration) -> Result<PipelineItem> {
        if self.state == PipelineState::Idle {
            return Err(PipelineError::InvalidState {
                operation: "read from",
                state: self.state,
            });
        }
        self.queue.pop_timeout(timeout).map_err(|e| match e {
            PopError::Timeout => PipelineError::Timeout(timeout),
            PopError::Closed => PipelineError::Closed,
        })
    }

    /// Collect up to `n` items within `timeout` in total.
    ///
    /// Returns what arrived; fails only when nothing did.
    pub fn get_many(&self, n: usize, timeout: Duration) -> Result<Vec<PipelineItem>> {
        let deadline = Instant::now() + timeout;
        let mut items = Vec::with_capacity(n);
        while items.len() < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.get(remaining) {
                Ok(item) => items.push(item),
                Err(e) if items.is_empty() => return Err(e),
                Err(_) => break,
            }
        }
        Ok(items)
    }
}

impl Drop for DataPipeline {
    fn drop(&mut self) {
        if self.state == PipelineState::Running {
            self.shutdown();
        }
    }
}

impl fmt::Debug for DataPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPipeline")
            .field("state", &self.state)
            .field("workers", &self.config.num_workers)
            .field("queued", &self.queue.len())
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

struct WorkerContext {
    worker: usize,
    generator: SynthesisGenerator,
    featurizers: Arc<FeaturizerSet>,
    engine: Arc<dyn ChemistryEngine>,
    queue: Arc<BoundedQueue<PipelineItem>>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
}

impl WorkerContext {
    fn run(mut self) {
        let worker = self.worker;
        info!(worker, "worker started");
        while self.running.load(Ordering::Acquire) {
            let synthesis = match self.generator.next() {
                Ok(synthesis) => synthesis,
                Err(e) => {
                    self.record_failure(&e);
                    thread::sleep(FAILURE_BACKOFF);
                    continue;
                }
            };
            let sample = self.featurizers.compute(&synthesis, self.engine.as_ref());
            let item = PipelineItem {
                worker,
                synthesis,
                sample,
            };
            match self.queue.push(item) {
                PushOutcome::Pushed => {
                    self.counters.produced.fetch_add(1, Ordering::Relaxed);
                }
                PushOutcome::Evicted => {
                    self.counters.produced.fetch_add(1, Ordering::Relaxed);
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
                PushOutcome::Closed => break,
            }
        }
        info!(worker, "worker stopped");
    }

    fn record_failure(&self, error: &GenerationError) {
        let counter = match error {
            GenerationError::Exhausted { .. } => &self.counters.exhausted,
            _ => &self.counters.failed,
        };
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        // First failure and then every thousandth, per counter.
        if n == 1 || n % 1000 == 0 {
            warn!(worker = self.worker, failures = n, error = %error, "route generation failed");
        }
    }
}
