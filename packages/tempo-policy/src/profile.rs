/// Per-app profile records seeded by the offline benchmark harness.
///
/// A profile bundles everything the planner needs to know about one app:
/// - I/O tensor shapes (from the engine-info record)
/// - DLA-mappable subgraphs (from the engine build log; only the count
///   matters, each subgraph consumes one unit of DLA capacity)
/// - measured throughput and performance-per-watt per (device, frequency)
/// - slowdown fractions per concurrency level (from the shared table)
///
/// Profiles are value types, loaded once and shared read-only across the
/// run; no locking is needed.
use crate::error::{PolicyError, Result};
use crate::ladder::gpu_ladder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Compute device a measurement row refers to. The two DLA cores share one
/// measurement table; core selection happens later, in the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accel {
    Gpu,
    Dla,
}

/// Engine-info record: `{name, input_shape: "a,b,c,d",
/// output_shapes: "a,b;a,b,c,d"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub input_shape: String,
    pub output_shapes: String,
}

impl EngineInfo {
    pub fn load(path: &Path) -> Result<Self> {
        let app = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let content = read_record(&app, path)?;
        serde_json::from_str(&content)
            .map_err(|e| PolicyError::malformed(&app, format!("engine info: {e}")))
    }

    /// Input shape as ordered dimensions; the first dimension is the batch
    /// size.
    pub fn input_dims(&self) -> Result<Vec<usize>> {
        parse_dims(&self.name, &self.input_shape)
    }

    pub fn output_dims(&self) -> Result<Vec<Vec<usize>>> {
        self.output_shapes
            .split(';')
            .map(|s| parse_dims(&self.name, s))
            .collect()
    }
}

fn parse_dims(app: &str, shape: &str) -> Result<Vec<usize>> {
    shape
        .split(',')
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .map_err(|_| PolicyError::malformed(app, format!("bad shape '{shape}'")))
        })
        .collect()
}

/// Immutable per-app profile.
#[derive(Debug, Clone)]
pub struct AppProfile {
    pub name: String,
    pub input_shape: Vec<usize>,
    pub output_shapes: Vec<Vec<usize>>,
    pub dla_subgraphs: Vec<String>,

    throughput_gpu: BTreeMap<u64, f64>,
    throughput_dla: BTreeMap<u64, f64>,
    max_tp_gpu: f64,
    max_tp_dla: f64,
    ppw_ratio: BTreeMap<u64, f64>,
    slowdown: BTreeMap<u32, f64>,
}

impl AppProfile {
    /// Measured images/sec at (device, frequency). Missing entries read as
    /// zero: the device cannot reach any target there.
    pub fn throughput_at(&self, accel: Accel, freq_hz: u64) -> f64 {
        let table = match accel {
            Accel::Gpu => &self.throughput_gpu,
            Accel::Dla => &self.throughput_dla,
        };
        table.get(&freq_hz).copied().unwrap_or(0.0)
    }

    pub fn max_throughput(&self, accel: Accel) -> f64 {
        match accel {
            Accel::Gpu => self.max_tp_gpu,
            Accel::Dla => self.max_tp_dla,
        }
    }

    /// Arithmetic mean of the DLA/GPU performance-per-watt ratio over all
    /// frequencies present. Above 1.0 the DLA is the more efficient device
    /// for this app.
    pub fn avg_ppw_ratio(&self) -> f64 {
        if self.ppw_ratio.is_empty() {
            return 0.0;
        }
        self.ppw_ratio.values().sum::<f64>() / self.ppw_ratio.len() as f64
    }

    /// Throughput retention factor when `numapps` apps co-execute.
    /// A single app runs unhindered; a missing concurrency entry disables
    /// the factor with a warning (planning must not fail here).
    pub fn slowdown_factor(&self, numapps: usize) -> f64 {
        if numapps <= 1 {
            return 1.0;
        }
        match self.slowdown.get(&(numapps as u32)) {
            Some(s) => 1.0 - s,
            None => {
                log::warn!(
                    "⚠️  No slowdown entry for '{}' at concurrency {}, assuming none",
                    self.name,
                    numapps
                );
                1.0
            }
        }
    }

    /// Minimum GPU-ladder frequency at which `accel` still delivers
    /// `target_tp` after the slowdown factor, or `None` if no entry does.
    pub fn min_freq_for(&self, accel: Accel, target_tp: f64, factor: f64) -> Option<u64> {
        gpu_ladder()
            .steps()
            .iter()
            .copied()
            .find(|&f| self.throughput_at(accel, f) * factor >= target_tp)
    }

    /// Writes the engine-info JSON the runtime consumes.
    pub fn export_io(&self, dir: &Path) -> Result<()> {
        let info = EngineInfo {
            name: self.name.clone(),
            input_shape: join_dims(&self.input_shape),
            output_shapes: self
                .output_shapes
                .iter()
                .map(|s| join_dims(s))
                .collect::<Vec<_>>()
                .join(";"),
        };
        let path = dir.join(format!("{}.json", self.name));
        let content = serde_json::to_string_pretty(&info)
            .map_err(|e| PolicyError::malformed(&self.name, e.to_string()))?;
        fs::write(&path, content)?;
        Ok(())
    }
}

fn join_dims(dims: &[usize]) -> String {
    dims.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Loads immutable profile records from a base directory laid out as
/// `<base>/<app>/<app>.{json,log,csv}` plus a shared `<base>/slowdowns.json`.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    base: PathBuf,
}

impl ProfileStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn load_app(&self, name: &str) -> Result<AppProfile> {
        let app_dir = self.base.join(name);
        let info_path = app_dir.join(format!("{name}.json"));
        let log_path = app_dir.join(format!("{name}.log"));
        let csv_path = app_dir.join(format!("{name}.csv"));
        let slowdown_path = self.base.join("slowdowns.json");

        log::debug!("Reading profile records for '{}' from {:?}", name, app_dir);

        let info = EngineInfo::load(&info_path)?;
        let dla_subgraphs = read_subgraphs(name, &log_path)?;
        let tables = read_measurements(name, &csv_path)?;
        let slowdown = read_slowdowns(name, &slowdown_path)?;

        let profile = AppProfile {
            name: name.to_string(),
            input_shape: info.input_dims()?,
            output_shapes: info.output_dims()?,
            dla_subgraphs,
            throughput_gpu: tables.throughput_gpu,
            throughput_dla: tables.throughput_dla,
            max_tp_gpu: tables.max_tp_gpu,
            max_tp_dla: tables.max_tp_dla,
            ppw_ratio: tables.ppw_ratio,
            slowdown,
        };

        log::info!(
            "📖 Loaded profile '{}' ({} DLA subgraphs, avg PPW ratio {:.3})",
            profile.name,
            profile.dla_subgraphs.len(),
            profile.avg_ppw_ratio()
        );
        Ok(profile)
    }
}

fn read_record(app: &str, path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PolicyError::ProfileNotFound {
                app: app.to_string(),
                path: path.to_path_buf(),
            }
        } else {
            PolicyError::Io(e)
        }
    })
}

/// Engine build log: every `[DlaLayer]` line names one DLA-mapped subgraph.
fn read_subgraphs(app: &str, path: &Path) -> Result<Vec<String>> {
    let content = read_record(app, path)?;
    Ok(content
        .lines()
        .filter_map(|line| {
            line.split_once("[DlaLayer]")
                .map(|(_, rest)| rest.trim().to_string())
        })
        .collect())
}

struct MeasurementTables {
    throughput_gpu: BTreeMap<u64, f64>,
    throughput_dla: BTreeMap<u64, f64>,
    max_tp_gpu: f64,
    max_tp_dla: f64,
    ppw_ratio: BTreeMap<u64, f64>,
}

/// Measurement CSV: `Device,Frequency,Throughput,VDD_CPU_GPU_CV_Avg`, one
/// row per (device, frequency). PPW = throughput / compute-rail power.
fn read_measurements(app: &str, path: &Path) -> Result<MeasurementTables> {
    let content = read_record(app, path)?;
    let mut lines = content.lines();
    let header = lines
        .next()
        .ok_or_else(|| PolicyError::malformed(app, "empty measurement CSV"))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let col = |name: &str| -> Result<usize> {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| PolicyError::malformed(app, format!("missing CSV column '{name}'")))
    };
    let device_col = col("Device")?;
    let freq_col = col("Frequency")?;
    let tp_col = col("Throughput")?;
    let power_col = col("VDD_CPU_GPU_CV_Avg")?;

    let mut throughput_gpu = BTreeMap::new();
    let mut throughput_dla = BTreeMap::new();
    let mut ppw_gpu = BTreeMap::new();
    let mut ppw_dla = BTreeMap::new();
    let mut max_tp_gpu = 0.0f64;
    let mut max_tp_dla = 0.0f64;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();

        let accel = if field(app, &fields, device_col, line)?
            .to_ascii_lowercase()
            .contains("dla")
        {
            Accel::Dla
        } else {
            Accel::Gpu
        };
        let freq: u64 = field(app, &fields, freq_col, line)?
            .parse()
            .map_err(|_| PolicyError::malformed(app, format!("bad frequency in '{line}'")))?;
        if !gpu_ladder().contains(freq) {
            return Err(PolicyError::malformed(
                app,
                format!("frequency {freq} is not on the GPU ladder"),
            ));
        }
        let throughput: f64 = field(app, &fields, tp_col, line)?
            .parse()
            .map_err(|_| PolicyError::malformed(app, format!("bad throughput in '{line}'")))?;
        let power: f64 = field(app, &fields, power_col, line)?
            .parse()
            .map_err(|_| PolicyError::malformed(app, format!("bad power in '{line}'")))?;

        let ppw = throughput / power;
        match accel {
            Accel::Gpu => {
                throughput_gpu.insert(freq, throughput);
                ppw_gpu.insert(freq, ppw);
                max_tp_gpu = max_tp_gpu.max(throughput);
            }
            Accel::Dla => {
                throughput_dla.insert(freq, throughput);
                ppw_dla.insert(freq, ppw);
                max_tp_dla = max_tp_dla.max(throughput);
            }
        }
    }

    // Ratio is defined where both devices were measured at the frequency.
    let mut ppw_ratio = BTreeMap::new();
    for (freq, dla) in &ppw_dla {
        if let Some(gpu) = ppw_gpu.get(freq) {
            ppw_ratio.insert(*freq, dla / gpu);
        }
    }

    Ok(MeasurementTables {
        throughput_gpu,
        throughput_dla,
        max_tp_gpu,
        max_tp_dla,
        ppw_ratio,
    })
}

fn field<'a>(app: &str, fields: &[&'a str], idx: usize, line: &str) -> Result<&'a str> {
    fields
        .get(idx)
        .copied()
        .ok_or_else(|| PolicyError::malformed(app, format!("short CSV row '{line}'")))
}

/// Shared slowdown table: `{app: {"n": fraction}}`, n = total concurrent
/// apps, fraction in [0, 1).
fn read_slowdowns(app: &str, path: &Path) -> Result<BTreeMap<u32, f64>> {
    let content = read_record(app, path)?;
    let table: std::collections::HashMap<String, BTreeMap<String, f64>> =
        serde_json::from_str(&content)
            .map_err(|e| PolicyError::malformed(app, format!("slowdown table: {e}")))?;
    let entry = table
        .get(app)
        .ok_or_else(|| PolicyError::SlowdownMissing(app.to_string()))?;

    let mut slowdown = BTreeMap::new();
    for (key, value) in entry {
        let n: u32 = key
            .parse()
            .map_err(|_| PolicyError::malformed(app, format!("bad concurrency key '{key}'")))?;
        slowdown.insert(n, *value);
    }
    Ok(slowdown)
}
