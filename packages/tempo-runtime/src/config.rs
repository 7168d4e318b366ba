/// Run-configuration and apps-file JSON surfaces.
///
/// The run config is the contract between the Decide step and the
/// execution runtime: frequencies to program (string-encoded, as the
/// planner writes them) plus one model entry per workload. Parse errors
/// here are fatal to the CLI.
use crate::engine::Workload;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tempo_policy::{Device, EngineInfo, Plan};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub frequencies: Frequencies,
    pub models: Vec<ModelSpec>,
}

/// Frequencies carried as decimal strings, the format the planner emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frequencies {
    pub cpu: String,
    pub gpu: String,
    pub maxn: String,
}

impl Frequencies {
    pub fn cpu_khz(&self) -> Result<u64> {
        self.cpu
            .parse()
            .with_context(|| format!("bad CPU frequency '{}'", self.cpu))
    }

    pub fn gpu_hz(&self) -> Result<u64> {
        self.gpu
            .parse()
            .with_context(|| format!("bad GPU frequency '{}'", self.gpu))
    }

    /// Anything but the literal "False" enables the second CPU cluster.
    pub fn maxn(&self) -> bool {
        self.maxn != "False"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub engineinfo: String,
    pub enginepath: String,
    pub device: Device,
    pub throughput: f64,
}

impl ModelSpec {
    /// Engine artifact inside `enginepath`, selected by assigned device.
    pub fn engine_file(&self) -> PathBuf {
        let artifact = match self.device {
            Device::Gpu => "gpu.engine",
            Device::Dla0 => "dla0.engine",
            Device::Dla1 => "dla1.engine",
        };
        Path::new(&self.enginepath).join(artifact)
    }

    /// Resolves the engine-info record into a ready-to-run workload.
    pub fn load_workload(&self) -> Result<Workload> {
        let info = EngineInfo::load(Path::new(&self.engineinfo))
            .with_context(|| format!("engine info for '{}'", self.name))?;
        let input_shape = info.input_dims()?;
        let output_shapes = info.output_dims()?;
        let batch_size = *input_shape
            .first()
            .with_context(|| format!("empty input shape for '{}'", self.name))?;

        Ok(Workload {
            name: self.name.clone(),
            device: self.device,
            target_tp: self.throughput,
            batch_size,
            engine_file: self.engine_file(),
            input_shape,
            output_shapes,
        })
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("📄 Reading config from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::info!("⚙️  Config: {} models, cpu={} kHz, gpu={} Hz, maxn={}",
            config.models.len(),
            config.frequencies.cpu,
            config.frequencies.gpu,
            config.frequencies.maxn());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        log::info!("💾 Wrote configuration to {}", path.display());
        Ok(())
    }

    /// Builds the run config a plan describes, using the planner's path
    /// layout: engines under `<engine_dir>/<name>/`, info records under
    /// `<info_dir>/<name>/<name>.json`.
    pub fn from_plan(plan: &Plan, engine_dir: &str, info_dir: &str) -> Self {
        let models = plan
            .placements
            .iter()
            .map(|p| ModelSpec {
                name: p.name.clone(),
                engineinfo: format!("{}/{}/{}.json", info_dir.trim_end_matches('/'), p.name, p.name),
                enginepath: format!("{}/{}/", engine_dir.trim_end_matches('/'), p.name),
                device: p.device,
                throughput: p.target_tp,
            })
            .collect();

        RunConfig {
            frequencies: Frequencies {
                cpu: plan.cpu_freq_khz.to_string(),
                gpu: plan.gpu_freq_hz.to_string(),
                maxn: "True".to_string(),
            },
            models,
        }
    }
}

/// Decide input: `{ "apps": [ {"name", "tp"} ] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppsFile {
    pub apps: Vec<AppTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppTarget {
    pub name: String,
    pub tp: f64,
}

impl AppsFile {
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("📄 Reading apps from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading apps file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing apps file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{
        "frequencies": {"cpu": "729600", "gpu": "408000000", "maxn": "True"},
        "models": [
            {
                "name": "resnet",
                "engineinfo": "engine_info/resnet/resnet.json",
                "enginepath": "engines/resnet/",
                "device": "DLA0",
                "throughput": 25.0
            }
        ]
    }"#;

    #[test]
    fn test_parse_run_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, CONFIG).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.frequencies.cpu_khz().unwrap(), 729_600);
        assert_eq!(config.frequencies.gpu_hz().unwrap(), 408_000_000);
        assert!(config.frequencies.maxn());
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].device, Device::Dla0);
    }

    #[test]
    fn test_maxn_false_literal() {
        let f = Frequencies {
            cpu: "729600".into(),
            gpu: "408000000".into(),
            maxn: "False".into(),
        };
        assert!(!f.maxn());
    }

    #[test]
    fn test_engine_file_per_device() {
        let mut spec = ModelSpec {
            name: "m".into(),
            engineinfo: "i.json".into(),
            enginepath: "engines/m/".into(),
            device: Device::Gpu,
            throughput: 10.0,
        };
        assert!(spec.engine_file().ends_with("gpu.engine"));
        spec.device = Device::Dla1;
        assert!(spec.engine_file().ends_with("dla1.engine"));
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(RunConfig::load(&path).is_err());
    }
}
