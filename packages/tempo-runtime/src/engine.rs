/// Engine workers: auto-paced inference loops with per-window heartbeats.
///
/// Each worker owns its inference session exclusively. The session is
/// created and warmed up on the worker's own thread, the worker then parks
/// on the shared start barrier, and the bounded inference loop begins at a
/// clock zero common to every worker. Heartbeats accumulate in a private
/// list and are handed to the supervisor by value when the thread ends.
use crate::error::EngineError;
use std::path::PathBuf;
use std::sync::Barrier;
use std::time::{Duration, Instant};
use tempo_policy::Device;

/// Batches run during the optional warmup phase.
const WARMUP_BATCHES: usize = 5;

/// One workload as the supervisor schedules it.
#[derive(Debug, Clone)]
pub struct Workload {
    pub name: String,
    pub device: Device,
    /// Images/sec the pacing loop throttles to; zero or negative disables
    /// pacing and the worker runs free.
    pub target_tp: f64,
    pub batch_size: usize,
    pub engine_file: PathBuf,
    pub input_shape: Vec<usize>,
    pub output_shapes: Vec<Vec<usize>>,
}

/// Periodic per-worker measurement.
///
/// `observed_tp` divides the window's images by wall time (pacing sleeps
/// included); `actual_tp` divides by operation time alone and is what the
/// Refine controller consumes.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    pub observed_tp: f64,
    pub actual_tp: f64,
}

/// One opened engine: runs a single batch end to end (preprocess, submit,
/// synchronise). Owned by exactly one worker thread.
pub trait InferenceSession: Send {
    fn run_batch(&mut self) -> Result<(), EngineError>;
}

/// Opens inference sessions. Shared read-only across workers; each call
/// produces an independently owned session.
pub trait InferenceBackend: Send + Sync {
    fn open(&self, workload: &Workload) -> Result<Box<dyn InferenceSession>, EngineError>;
}

/// Stand-in for the accelerator runtime: every batch costs a fixed
/// latency. Deterministic, hardware-free, and enough to exercise the whole
/// closed loop.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    pub batch_latency: Duration,
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self {
            batch_latency: Duration::from_millis(5),
        }
    }
}

impl InferenceBackend for SyntheticBackend {
    fn open(&self, workload: &Workload) -> Result<Box<dyn InferenceSession>, EngineError> {
        log::debug!(
            "Opening synthetic session for '{}' on {} ({:?}/batch)",
            workload.name, workload.device, self.batch_latency
        );
        Ok(Box::new(SyntheticSession {
            latency: self.batch_latency,
        }))
    }
}

struct SyntheticSession {
    latency: Duration,
}

impl InferenceSession for SyntheticSession {
    fn run_batch(&mut self) -> Result<(), EngineError> {
        std::thread::sleep(self.latency);
        Ok(())
    }
}

/// Timing knobs of one run, shared by workers and sampler.
#[derive(Debug, Clone)]
pub struct RunTiming {
    pub duration: Duration,
    pub heartbeat: Duration,
    pub warmup: bool,
}

/// Runs one workload to duration expiry and returns its heartbeats.
///
/// The session is opened (and optionally warmed up) before the barrier so
/// clock zero excludes setup cost; the barrier is reached even when the
/// open fails, otherwise the remaining workers would wait forever. On a
/// batch error the worker stops and contributes no heartbeats.
pub fn run_worker(
    workload: &Workload,
    backend: &dyn InferenceBackend,
    barrier: &Barrier,
    timing: &RunTiming,
) -> Result<Vec<Heartbeat>, EngineError> {
    let session = open_and_warmup(workload, backend, timing.warmup);

    log::debug!("'{}' waiting at the barrier...", workload.name);
    barrier.wait();

    let mut session = session?;
    log::info!("▶️  Begin running engine '{}'", workload.name);

    let batch = workload.batch_size as f64;
    let mut heartbeats = Vec::new();
    let mut window_batches: u64 = 0;
    let mut total_batches: u64 = 0;
    let mut op_time = Duration::ZERO;

    let start = Instant::now();
    let mut hb_start = Instant::now();

    while start.elapsed() < timing.duration {
        let op_start = Instant::now();
        session.run_batch()?;
        op_time += op_start.elapsed();
        window_batches += 1;
        total_batches += 1;

        // Heartbeat handling
        let window = hb_start.elapsed();
        if window >= timing.heartbeat {
            let images = window_batches as f64 * batch;
            let hb = Heartbeat {
                observed_tp: images / window.as_secs_f64(),
                actual_tp: images / op_time.as_secs_f64(),
            };
            log::info!(
                "💓 Heartbeat for '{}': {:.2} img/s (actual: {:.2} img/s)",
                workload.name, hb.observed_tp, hb.actual_tp
            );
            heartbeats.push(hb);
            window_batches = 0;
            op_time = Duration::ZERO;
            hb_start = Instant::now();
        }

        // Auto-pacing: sleep off any lead over the target schedule. Sleeps
        // widen wall time but never op time.
        if workload.target_tp > 0.0 {
            let schedule = total_batches as f64 * batch / workload.target_tp;
            let lead = schedule - start.elapsed().as_secs_f64();
            if lead > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(lead));
            }
        }
    }

    log::info!(
        "⏹️  Finished running engine '{}' (duration expired)",
        workload.name
    );
    Ok(heartbeats)
}

fn open_and_warmup(
    workload: &Workload,
    backend: &dyn InferenceBackend,
    warmup: bool,
) -> Result<Box<dyn InferenceSession>, EngineError> {
    let mut session = backend.open(workload)?;
    if warmup {
        log::debug!("Warmup phase for '{}'...", workload.name);
        for _ in 0..WARMUP_BATCHES {
            session.run_batch()?;
        }
        log::debug!("Warmup phase completed for '{}'", workload.name);
    }
    Ok(session)
}
