//! `decide` — build a run configuration from an apps file.
//!
//! Loads the per-app profiles, runs the placement/frequency planner, and
//! writes the configuration JSON that `runconfig` consumes.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tempo_policy::{plan, ProfileStore};
use tempo_runtime::{AppsFile, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "decide", version, about = "Plan a workload configuration")]
struct Args {
    /// Path to the apps JSON file ({"apps": [{"name", "tp"}]})
    #[arg(long, default_value = "apps.json")]
    apps_path: PathBuf,

    /// Base directory of the per-app profile records
    #[arg(long, default_value = "engine_info")]
    engine_info: PathBuf,

    /// Directory holding the compiled engines the config will reference
    #[arg(long, default_value = "../benchmark/engines")]
    engine_dir: String,

    /// Where to write the resulting configuration
    #[arg(long, default_value = "config.json")]
    output_path: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("🚀 Tempo decide v{} starting...", env!("CARGO_PKG_VERSION"));

    let apps_file = AppsFile::load(&args.apps_path)?;
    let store = ProfileStore::new(&args.engine_info);

    let mut apps = Vec::with_capacity(apps_file.apps.len());
    for target in &apps_file.apps {
        log::info!(
            "Initializing app '{}' with target throughput {}",
            target.name,
            target.tp
        );
        let profile = store.load_app(&target.name)?;
        apps.push((profile, target.tp));
    }
    log::info!("✅ Successfully read {} apps", apps.len());

    let plan = plan(&apps);
    for placement in &plan.placements {
        if placement.unachievable {
            log::warn!(
                "⚠️  '{}' cannot reach {:.2} img/s on any device, best-effort placement on {}",
                placement.name,
                placement.target_tp,
                placement.device
            );
        } else {
            log::info!(
                "📌 '{}' -> {} at {:.2} img/s",
                placement.name,
                placement.device,
                placement.target_tp
            );
        }
    }

    let config = RunConfig::from_plan(
        &plan,
        &args.engine_dir,
        &args.engine_info.to_string_lossy(),
    );
    config.save(&args.output_path)?;

    log::info!("✅ decide finished");
    Ok(())
}
