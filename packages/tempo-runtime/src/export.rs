/// Run-result CSV export: one row per app, fixed column order, floats to
/// two decimals. Failed workers leave their throughput cells empty.
use crate::sampler::PowerRecord;
use crate::supervisor::RunOutcome;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const RESULT_HEADER: &str = "engine_name,device,cpu,gpu,target,throughput,\
actual_throughput,vdd_in,vdd_cpu_gpu_cv,vdd_soc,run_gpu_freq,run_cpu0_freq,run_cpu4_freq";

pub fn export_results(outcome: &RunOutcome, path: &Path) -> Result<()> {
    log::info!("💾 Exporting run results to {}", path.display());

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating output directory {}", dir.display()))?;
        }
    }

    let file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{RESULT_HEADER}")?;

    // Rail averages and run frequencies come from the sampler's final
    // record and repeat on every row.
    let power = match outcome.last_power() {
        Some(record) => *record,
        None => {
            log::warn!("⚠️  No sampler records for this run, exporting zero telemetry");
            PowerRecord {
                rails_mw: [0.0; 3],
                gpu_freq: 0.0,
                cpu0_freq: 0.0,
                cpu4_freq: 0.0,
            }
        }
    };

    for app in &outcome.apps {
        let (throughput, actual) = match app.last_heartbeat() {
            Some(hb) => (format!("{:.2}", hb.observed_tp), format!("{:.2}", hb.actual_tp)),
            None => (String::new(), String::new()),
        };
        writeln!(
            writer,
            "{},{},{},{},{:.2},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
            app.name,
            app.device,
            outcome.cpu_freq_khz,
            outcome.gpu_freq_hz,
            app.target_tp,
            throughput,
            actual,
            power.rails_mw[0],
            power.rails_mw[1],
            power.rails_mw[2],
            power.gpu_freq,
            power.cpu0_freq,
            power.cpu4_freq,
        )?;
    }

    writer.flush()?;
    log::info!("💾 Run results exported to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Heartbeat;
    use crate::supervisor::AppResult;
    use tempfile::TempDir;
    use tempo_policy::Device;

    fn outcome() -> RunOutcome {
        RunOutcome {
            apps: vec![
                AppResult {
                    name: "alpha".into(),
                    device: Device::Gpu,
                    target_tp: 20.0,
                    heartbeats: vec![Heartbeat {
                        observed_tp: 19.5,
                        actual_tp: 24.25,
                    }],
                    failed: false,
                },
                AppResult {
                    name: "beta".into(),
                    device: Device::Dla1,
                    target_tp: 10.0,
                    heartbeats: Vec::new(),
                    failed: true,
                },
            ],
            power: vec![PowerRecord {
                rails_mw: [5000.0, 3210.987, 1500.5],
                gpu_freq: 408_000_000.0,
                cpu0_freq: 729_600.0,
                cpu4_freq: 729_600.0,
            }],
            cpu_freq_khz: 729_600,
            gpu_freq_hz: 408_000_000,
        }
    }

    #[test]
    fn test_export_rows_and_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        export_results(&outcome(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], RESULT_HEADER);
        assert_eq!(
            lines[1],
            "alpha,GPU,729600,408000000,20.00,19.50,24.25,5000.00,3210.99,1500.50,408000000.00,729600.00,729600.00"
        );
    }

    #[test]
    fn test_failed_app_has_null_throughput_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        export_results(&outcome(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let beta = content.lines().find(|l| l.starts_with("beta")).unwrap();
        assert!(beta.starts_with("beta,DLA1,729600,408000000,10.00,,,"));
    }

    #[test]
    fn test_creates_missing_output_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/results.csv");
        export_results(&outcome(), &path).unwrap();
        assert!(path.exists());
    }
}
