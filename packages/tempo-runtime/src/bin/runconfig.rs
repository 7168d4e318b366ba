//! `runconfig` — execute an inference workload configuration.
//!
//! Programs the configured CPU/GPU frequencies, runs every model with the
//! power sampler for the bounded duration, logs the refined frequencies,
//! exports the per-app result CSV, and parks the clocks again. Extra
//! rounds re-program the refined frequencies and re-run.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tempo_policy::refine;
use tempo_runtime::{
    execute, export_results, MockSensor, PowerSensor, RunConfig, RunOutcome, RunSettings,
    SyntheticBackend, SysConfig, SysfsActuator, SysfsSensor,
};

#[derive(Parser, Debug)]
#[command(name = "runconfig", version, about = "Run a workload configuration")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.json")]
    config_path: PathBuf,

    /// Path to the output CSV
    #[arg(long, default_value = "out/config_output.csv")]
    output_path: PathBuf,

    /// Wall-clock seconds each run executes for
    #[arg(long, default_value_t = 35)]
    duration: u64,

    /// Run/refine rounds; every round after the first re-programs the
    /// refined frequencies before running again
    #[arg(long, default_value_t = 1)]
    rounds: u32,

    /// Optional per-tick power trace CSV
    #[arg(long)]
    power_trace: Option<PathBuf>,

    /// Read telemetry from the deterministic mock instead of the board
    #[arg(long)]
    mock_sensors: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("🚀 Tempo runconfig v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = RunConfig::load(&args.config_path)?;
    let mut cpu_khz = config.frequencies.cpu_khz()?;
    let mut gpu_hz = config.frequencies.gpu_hz()?;
    let maxn = config.frequencies.maxn();

    let workloads = config
        .models
        .iter()
        .map(|model| model.load_workload())
        .collect::<Result<Vec<_>>>()?;

    let mut sys = SysConfig::new(SysfsActuator::default());
    sys.init(maxn);
    sys.apply(cpu_khz, gpu_hz, maxn);

    let backend = SyntheticBackend::default();
    let mut sensor: Box<dyn PowerSensor> = if args.mock_sensors {
        log::info!("🧪 Using mock telemetry");
        Box::new(MockSensor::default())
    } else {
        Box::new(SysfsSensor::default())
    };

    let settings = RunSettings {
        duration: Duration::from_secs(args.duration),
        power_trace: args.power_trace.clone(),
        ..Default::default()
    };

    let mut run_round = |cpu_khz: &mut u64, gpu_hz: &mut u64| -> RunOutcome {
        let outcome = execute(
            &workloads,
            &backend,
            sensor.as_mut(),
            &settings,
            *cpu_khz,
            *gpu_hz,
        );
        let (new_cpu, new_gpu) = refine(&outcome.observations(), *cpu_khz, *gpu_hz);
        log::info!("🔁 Refining results:");
        log::info!("   New CPU frequency: {new_cpu}");
        log::info!("   New GPU frequency: {new_gpu}");
        *cpu_khz = new_cpu;
        *gpu_hz = new_gpu;
        outcome
    };

    let rounds = args.rounds.max(1);
    let mut outcome = run_round(&mut cpu_khz, &mut gpu_hz);
    for round in 1..rounds {
        log::info!("🔄 Round {} of {}: re-programming refined frequencies", round + 1, rounds);
        sys.apply(cpu_khz, gpu_hz, maxn);
        outcome = run_round(&mut cpu_khz, &mut gpu_hz);
    }

    export_results(&outcome, &args.output_path)?;
    sys.restore(maxn);

    log::info!("✅ runconfig finished");
    Ok(())
}
