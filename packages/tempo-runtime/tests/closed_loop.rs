/// Full runtime loop from a config file on disk: parse, supervise a
/// barrier-synchronised run with a failing worker, refine from the
/// surviving observations, and export the result CSV.
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tempo_policy::refine;
use tempo_runtime::{
    execute, export_results, EngineError, InferenceBackend, InferenceSession, MockSensor,
    RunConfig, RunSettings, SyntheticBackend, Workload, RESULT_HEADER,
};

fn write_engine_info(dir: &std::path::Path, name: &str) -> String {
    let info_dir = dir.join("engine_info").join(name);
    fs::create_dir_all(&info_dir).unwrap();
    let path = info_dir.join(format!("{name}.json"));
    fs::write(
        &path,
        format!(r#"{{"name": "{name}", "input_shape": "2,3,224,224", "output_shapes": "2,1000"}}"#),
    )
    .unwrap();
    path.to_string_lossy().to_string()
}

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let alpha_info = write_engine_info(dir, "alpha");
    let beta_info = write_engine_info(dir, "beta");
    let config = format!(
        r#"{{
            "frequencies": {{"cpu": "729600", "gpu": "408000000", "maxn": "False"}},
            "models": [
                {{"name": "alpha", "engineinfo": "{alpha_info}", "enginepath": "engines/alpha/", "device": "GPU", "throughput": 50.0}},
                {{"name": "beta", "engineinfo": "{beta_info}", "enginepath": "engines/beta/", "device": "DLA0", "throughput": 10.0}}
            ]
        }}"#
    );
    let path = dir.join("config.json");
    fs::write(&path, config).unwrap();
    path
}

/// Fails `beta` at open time, serves everything else synthetically.
struct PoisonBackend(SyntheticBackend);

impl InferenceBackend for PoisonBackend {
    fn open(&self, workload: &Workload) -> Result<Box<dyn InferenceSession>, EngineError> {
        if workload.name == "beta" {
            return Err(EngineError::Load {
                name: workload.name.clone(),
                path: workload.engine_file.clone(),
                reason: "corrupt engine".to_string(),
            });
        }
        self.0.open(workload)
    }
}

#[test]
fn config_to_csv_with_isolated_worker_failure() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(dir.path());

    let config = RunConfig::load(&config_path).unwrap();
    let cpu_khz = config.frequencies.cpu_khz().unwrap();
    let gpu_hz = config.frequencies.gpu_hz().unwrap();
    assert!(!config.frequencies.maxn());

    let workloads: Vec<Workload> = config
        .models
        .iter()
        .map(|m| m.load_workload().unwrap())
        .collect();
    assert_eq!(workloads[0].batch_size, 2);

    let backend = PoisonBackend(SyntheticBackend {
        batch_latency: Duration::from_millis(2),
    });
    let mut sensor = MockSensor::default();
    let settings = RunSettings {
        duration: Duration::from_millis(300),
        heartbeat: Duration::from_millis(80),
        sampler_interval: Duration::from_millis(10),
        warmup: false,
        power_trace: None,
    };

    let start = Instant::now();
    let outcome = execute(&workloads, &backend, &mut sensor, &settings, cpu_khz, gpu_hz);
    assert!(start.elapsed() < settings.duration + Duration::from_millis(200));

    // The healthy worker heartbeats, the poisoned one is isolated.
    let alpha = outcome.apps.iter().find(|a| a.name == "alpha").unwrap();
    let beta = outcome.apps.iter().find(|a| a.name == "beta").unwrap();
    assert!(!alpha.failed);
    assert!(alpha.last_heartbeat().is_some());
    assert!(beta.failed);
    assert!(beta.heartbeats.is_empty());
    assert!(!outcome.power.is_empty());

    // Refine sees only the surviving observation and stays on-ladder.
    let observations = outcome.observations();
    assert_eq!(observations.len(), 1);
    let (new_cpu, new_gpu) = refine(&observations, cpu_khz, gpu_hz);
    assert!(tempo_policy::CPU_LADDER_KHZ.contains(&new_cpu));
    assert!(tempo_policy::GPU_LADDER_HZ.contains(&new_gpu));

    // Export: header plus one row per app, nulls for the failed one.
    let out_path = dir.path().join("out/results.csv");
    export_results(&outcome, &out_path).unwrap();
    let content = fs::read_to_string(&out_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], RESULT_HEADER);
    assert_eq!(lines.len(), 3);
    let beta_row = lines.iter().find(|l| l.starts_with("beta,")).unwrap();
    assert!(beta_row.contains(",,,"));
    let alpha_row = lines.iter().find(|l| l.starts_with("alpha,")).unwrap();
    assert!(alpha_row.starts_with("alpha,GPU,729600,408000000,50.00,"));
}
