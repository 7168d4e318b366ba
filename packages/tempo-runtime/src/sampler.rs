/// Power/frequency sampler: the N+1'th context of every run.
///
/// Reads the rails every `interval`, aggregates running and partial-window
/// power sums, and emits one record per heartbeat with the running average
/// mW per rail plus the last-read clocks. A failed rail read is logged and
/// leaves that rail's sums untouched for the tick; no zero is injected.
use crate::sensor::{PowerSensor, Rail};
use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Barrier;
use std::time::{Duration, Instant};

/// Aggregated telemetry emitted every heartbeat interval.
#[derive(Debug, Clone, Copy)]
pub struct PowerRecord {
    /// Average mW per rail since the start of the run.
    pub rails_mw: [f64; 3],
    pub gpu_freq: f64,
    pub cpu0_freq: f64,
    pub cpu4_freq: f64,
}

impl PowerRecord {
    pub fn rail_mw(&self, rail: Rail) -> f64 {
        self.rails_mw[rail.index()]
    }
}

/// Sampler knobs: tick interval, heartbeat cadence, run duration, and an
/// optional per-tick trace CSV.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub interval: Duration,
    pub heartbeat: Duration,
    pub duration: Duration,
    pub trace_path: Option<PathBuf>,
}

/// Runs the sampling loop until duration expiry and returns the emitted
/// records. Parks on the start barrier first, like every worker.
pub fn run_sampler(
    sensor: &mut dyn PowerSensor,
    config: &SamplerConfig,
    barrier: &Barrier,
) -> Vec<PowerRecord> {
    let mut trace = config.trace_path.as_ref().and_then(|path| {
        match File::create(path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                if let Err(e) = writeln!(writer, "timestamp,VDD_IN,VDD_CPU_GPU_CV,VDD_SOC") {
                    log::error!("❌ Failed to write power trace header: {e}");
                    return None;
                }
                Some(writer)
            }
            Err(e) => {
                log::error!("❌ Failed to create power trace {}: {e}", path.display());
                None
            }
        }
    });

    log::debug!("Sampler waiting at the barrier...");
    barrier.wait();

    let mut total_mw = [0.0f64; 3];
    let mut partial_mw = [0.0f64; 3];
    let mut total_ticks: u64 = 0;
    let mut partial_ticks: u64 = 0;
    let mut records = Vec::new();
    let mut last_gpu = 0.0f64;
    let mut last_cpu0 = 0.0f64;
    let mut last_cpu4 = 0.0f64;

    let start = Instant::now();
    let mut hb_start = Instant::now();

    while start.elapsed() < config.duration {
        // Heartbeat handling
        if hb_start.elapsed() >= config.heartbeat && total_ticks > 0 {
            match sensor.read_gpu_freq() {
                Ok(f) => last_gpu = f as f64,
                Err(e) => log::error!("❌ {e}"),
            }
            match sensor.read_cpu0_freq() {
                Ok(f) => last_cpu0 = f as f64,
                Err(e) => log::error!("❌ {e}"),
            }
            match sensor.read_cpu4_freq() {
                Ok(f) => last_cpu4 = f as f64,
                Err(e) => log::error!("❌ {e}"),
            }

            let mut rails_mw = [0.0f64; 3];
            for rail in Rail::ALL {
                let i = rail.index();
                rails_mw[i] = total_mw[i] / total_ticks as f64;
                log::debug!(
                    "{}: avg {:.2} mW (window {:.2} mW)",
                    rail.label(),
                    rails_mw[i],
                    partial_mw[i] / partial_ticks.max(1) as f64
                );
                partial_mw[i] = 0.0;
            }
            partial_ticks = 0;

            log::info!(
                "💓 Sampler heartbeat: VDD_IN {:.2} mW, gpu {:.0} Hz, cpu0 {:.0} kHz",
                rails_mw[0], last_gpu, last_cpu0
            );
            records.push(PowerRecord {
                rails_mw,
                gpu_freq: last_gpu,
                cpu0_freq: last_cpu0,
                cpu4_freq: last_cpu4,
            });
            hb_start = Instant::now();
        }

        // One tick: instantaneous mW per rail from (µA, mV) pairs.
        let mut instant_mw = [0.0f64; 3];
        for rail in Rail::ALL {
            match sensor.read_rail(rail) {
                Ok((curr, volt)) => {
                    let power = curr as f64 * (volt as f64 / 1000.0);
                    let i = rail.index();
                    instant_mw[i] = power;
                    total_mw[i] += power;
                    partial_mw[i] += power;
                }
                Err(e) => log::error!("❌ Sensor read failed for {}: {e}", rail.label()),
            }
        }

        let mut trace_broken = false;
        if let Some(writer) = trace.as_mut() {
            let ts = Local::now().format("%d/%m/%Y-%H:%M:%S");
            if let Err(e) = writeln!(
                writer,
                "{ts},{},{},{}",
                instant_mw[0], instant_mw[1], instant_mw[2]
            ) {
                log::error!("❌ Power trace write failed, disabling trace: {e}");
                trace_broken = true;
            }
        }
        if trace_broken {
            trace = None;
        }

        total_ticks += 1;
        partial_ticks += 1;
        std::thread::sleep(config.interval);
    }

    log::debug!("Finished running sampler (duration expired)");
    records
}
