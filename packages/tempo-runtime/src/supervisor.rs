/// Execution supervisor: one bounded, barrier-synchronised run.
///
/// Spawns one worker thread per workload plus the sampler, releases them
/// through a single-use start barrier so every context shares clock zero,
/// joins them all after duration expiry, and aggregates their privately
/// owned heartbeat lists into one result. A failing worker is isolated:
/// its row is marked failed, everyone else keeps running.
use crate::engine::{run_worker, Heartbeat, InferenceBackend, RunTiming, Workload};
use crate::sampler::{run_sampler, PowerRecord, SamplerConfig};
use crate::sensor::PowerSensor;
use std::path::PathBuf;
use std::sync::Barrier;
use std::time::Duration;
use tempo_policy::Observation;

/// Timing and telemetry knobs of one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub duration: Duration,
    pub heartbeat: Duration,
    pub sampler_interval: Duration,
    pub warmup: bool,
    pub power_trace: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(35),
            heartbeat: Duration::from_secs(10),
            sampler_interval: Duration::from_millis(500),
            warmup: false,
            power_trace: None,
        }
    }
}

/// One app's share of a run result. A failed worker keeps its identity but
/// carries no heartbeats; its exported row holds null throughput.
#[derive(Debug, Clone)]
pub struct AppResult {
    pub name: String,
    pub device: tempo_policy::Device,
    pub target_tp: f64,
    pub heartbeats: Vec<Heartbeat>,
    pub failed: bool,
}

impl AppResult {
    pub fn last_heartbeat(&self) -> Option<Heartbeat> {
        self.heartbeats.last().copied()
    }

    fn failed(workload: &Workload) -> Self {
        Self {
            name: workload.name.clone(),
            device: workload.device,
            target_tp: workload.target_tp,
            heartbeats: Vec::new(),
            failed: true,
        }
    }
}

/// Consolidated result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub apps: Vec<AppResult>,
    pub power: Vec<PowerRecord>,
    pub cpu_freq_khz: u64,
    pub gpu_freq_hz: u64,
}

impl RunOutcome {
    pub fn last_power(&self) -> Option<&PowerRecord> {
        self.power.last()
    }

    /// Refine input: the last actual throughput of every app that produced
    /// heartbeats. Failed workers contribute nothing.
    pub fn observations(&self) -> Vec<Observation> {
        self.apps
            .iter()
            .filter_map(|app| {
                app.last_heartbeat().map(|hb| Observation {
                    name: app.name.clone(),
                    target_tp: app.target_tp,
                    actual_tp: hb.actual_tp,
                })
            })
            .collect()
    }
}

/// Runs every workload plus the sampler for the bounded duration and
/// returns the aggregate. The actuator must already have programmed the
/// frequencies recorded here; nothing touches it during the run.
pub fn execute(
    workloads: &[Workload],
    backend: &dyn InferenceBackend,
    sensor: &mut dyn PowerSensor,
    settings: &RunSettings,
    cpu_freq_khz: u64,
    gpu_freq_hz: u64,
) -> RunOutcome {
    log::info!(
        "🚦 Beginning execution: {} workloads for {:?} (heartbeat {:?})",
        workloads.len(),
        settings.duration,
        settings.heartbeat
    );
    for workload in workloads {
        log::info!(
            "   '{}' on {} targeting {:.2} img/s (batch {})",
            workload.name, workload.device, workload.target_tp, workload.batch_size
        );
    }

    let barrier = Barrier::new(workloads.len() + 1);
    let timing = RunTiming {
        duration: settings.duration,
        heartbeat: settings.heartbeat,
        warmup: settings.warmup,
    };
    let sampler_config = SamplerConfig {
        interval: settings.sampler_interval,
        heartbeat: settings.heartbeat,
        duration: settings.duration,
        trace_path: settings.power_trace.clone(),
    };

    let mut apps = Vec::with_capacity(workloads.len());
    let mut power = Vec::new();

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workloads.len());
        for workload in workloads {
            let barrier = &barrier;
            let timing = &timing;
            handles.push(scope.spawn(move || run_worker(workload, backend, barrier, timing)));
        }
        let sampler_handle = scope.spawn(|| run_sampler(sensor, &sampler_config, &barrier));

        for (workload, handle) in workloads.iter().zip(handles) {
            let heartbeats: Vec<Heartbeat> = match handle.join() {
                Ok(Ok(heartbeats)) => heartbeats,
                Ok(Err(e)) => {
                    log::error!("❌ Engine execution error for '{}': {e}", workload.name);
                    apps.push(AppResult::failed(workload));
                    continue;
                }
                Err(_) => {
                    log::error!("❌ Worker thread for '{}' panicked", workload.name);
                    apps.push(AppResult::failed(workload));
                    continue;
                }
            };
            apps.push(AppResult {
                name: workload.name.clone(),
                device: workload.device,
                target_tp: workload.target_tp,
                heartbeats,
                failed: false,
            });
        }

        power = match sampler_handle.join() {
            Ok(records) => records,
            Err(_) => {
                log::error!("❌ Sampler thread panicked");
                Vec::new()
            }
        };
    });

    log::info!("🏁 Configuration execution completed");
    RunOutcome {
        apps,
        power,
        cpu_freq_khz,
        gpu_freq_hz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InferenceSession, SyntheticBackend};
    use crate::error::EngineError;
    use crate::sensor::MockSensor;
    use std::time::Instant;
    use tempo_policy::Device;

    fn workload(name: &str, target_tp: f64) -> Workload {
        Workload {
            name: name.to_string(),
            device: Device::Gpu,
            target_tp,
            batch_size: 2,
            engine_file: format!("engines/{name}/gpu.engine").into(),
            input_shape: vec![2, 3, 224, 224],
            output_shapes: vec![vec![2, 1000]],
        }
    }

    fn settings(duration_ms: u64, heartbeat_ms: u64) -> RunSettings {
        RunSettings {
            duration: Duration::from_millis(duration_ms),
            heartbeat: Duration::from_millis(heartbeat_ms),
            sampler_interval: Duration::from_millis(10),
            warmup: false,
            power_trace: None,
        }
    }

    #[test]
    fn test_parallel_run_collects_everything() {
        let backend = SyntheticBackend {
            batch_latency: Duration::from_millis(2),
        };
        let mut sensor = MockSensor::default();
        let workloads = vec![workload("a", -1.0), workload("b", 50.0)];

        let outcome = execute(
            &workloads,
            &backend,
            &mut sensor,
            &settings(250, 60),
            729_600,
            408_000_000,
        );

        assert_eq!(outcome.apps.len(), 2);
        for app in &outcome.apps {
            assert!(!app.failed);
            assert!(app.last_heartbeat().is_some());
        }
        assert!(!outcome.power.is_empty());
        assert_eq!(outcome.observations().len(), 2);
    }

    #[test]
    fn test_duration_bound() {
        let backend = SyntheticBackend {
            batch_latency: Duration::from_millis(2),
        };
        let mut sensor = MockSensor::default();
        let workloads = vec![workload("a", -1.0)];
        let settings = settings(200, 50);

        let start = Instant::now();
        execute(&workloads, &backend, &mut sensor, &settings, 729_600, 408_000_000);
        assert!(start.elapsed() < settings.duration + Duration::from_millis(150));
    }

    /// Backend that fails one named workload and serves the rest.
    struct PartialBackend {
        poison: String,
        inner: SyntheticBackend,
    }

    impl InferenceBackend for PartialBackend {
        fn open(&self, w: &Workload) -> Result<Box<dyn InferenceSession>, EngineError> {
            if w.name == self.poison {
                return Err(EngineError::Load {
                    name: w.name.clone(),
                    path: w.engine_file.clone(),
                    reason: "poisoned".to_string(),
                });
            }
            self.inner.open(w)
        }
    }

    #[test]
    fn test_failed_worker_is_isolated() {
        let backend = PartialBackend {
            poison: "bad".to_string(),
            inner: SyntheticBackend {
                batch_latency: Duration::from_millis(2),
            },
        };
        let mut sensor = MockSensor::default();
        let workloads = vec![workload("good", -1.0), workload("bad", 20.0)];

        let outcome = execute(
            &workloads,
            &backend,
            &mut sensor,
            &settings(250, 60),
            729_600,
            408_000_000,
        );

        let good = outcome.apps.iter().find(|a| a.name == "good").unwrap();
        let bad = outcome.apps.iter().find(|a| a.name == "bad").unwrap();
        assert!(!good.failed);
        assert!(good.last_heartbeat().is_some());
        assert!(bad.failed);
        assert!(bad.heartbeats.is_empty());

        // Refine input skips the failed worker entirely.
        let observations = outcome.observations();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].name, "good");
    }
}
