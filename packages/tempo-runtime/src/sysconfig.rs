/// Frequency actuation: the process-wide capability that programs CPU and
/// GPU clocks through sysfs.
///
/// All writes funnel through the `FrequencyActuator` trait so the policy
/// layer is testable against a mock and swappable on other hardware.
/// Actuation failures are logged and tolerated; the run then proceeds at
/// whatever frequency the OS governor picks. Writes happen strictly
/// between runs, never while workers execute.
use crate::error::ActuatorError;
use std::fs;
use std::path::{Path, PathBuf};
use tempo_policy::{cpu_ladder, gpu_ladder, BASE_CPU_FREQ_KHZ};

/// Primary CPU cluster index.
pub const PRIMARY_CPU_INDEX: u32 = 0;

/// Second cluster programmed in MAXN mode. Index 4 on the reference board;
/// a config constant rather than a scattered literal.
pub const MAXN_CPU_INDEX: u32 = 4;

/// CPU min/max window installed before userspace control takes over.
pub const CPU_WINDOW_MIN_KHZ: u64 = 268_800;
pub const CPU_WINDOW_MAX_KHZ: u64 = 1_984_000;

/// GPU frequency the device is parked at after a run.
pub const RESTORE_GPU_FREQ_HZ: u64 = 408_000_000;

/// Low-level clock control operations.
pub trait FrequencyActuator: Send {
    fn set_cpu_governor(&mut self, cpu: u32, governor: &str) -> Result<(), ActuatorError>;
    fn set_cpu_freq(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError>;
    fn set_cpu_freq_min(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError>;
    fn set_cpu_freq_max(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError>;
    fn set_gpu_freq_min(&mut self, hz: u64) -> Result<(), ActuatorError>;
    fn set_gpu_freq_max(&mut self, hz: u64) -> Result<(), ActuatorError>;
}

/// Actuator writing the real cpufreq/devfreq files.
#[derive(Debug, Clone)]
pub struct SysfsActuator {
    gpu_devfreq: PathBuf,
}

impl Default for SysfsActuator {
    fn default() -> Self {
        Self {
            gpu_devfreq: "/sys/devices/gpu.0/devfreq/17000000.ga10b".into(),
        }
    }
}

impl SysfsActuator {
    pub fn with_gpu_devfreq(path: impl Into<PathBuf>) -> Self {
        Self {
            gpu_devfreq: path.into(),
        }
    }

    fn cpu_file(cpu: u32, file: &str) -> PathBuf {
        PathBuf::from(format!("/sys/devices/system/cpu/cpu{cpu}/cpufreq/{file}"))
    }
}

fn write_sysfs(path: &Path, value: &str) -> Result<(), ActuatorError> {
    fs::write(path, value).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ActuatorError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => ActuatorError::PathMissing {
            path: path.to_path_buf(),
        },
        _ => ActuatorError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

impl FrequencyActuator for SysfsActuator {
    fn set_cpu_governor(&mut self, cpu: u32, governor: &str) -> Result<(), ActuatorError> {
        write_sysfs(&Self::cpu_file(cpu, "scaling_governor"), governor)
    }

    fn set_cpu_freq(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError> {
        write_sysfs(&Self::cpu_file(cpu, "scaling_setspeed"), &khz.to_string())
    }

    fn set_cpu_freq_min(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError> {
        write_sysfs(&Self::cpu_file(cpu, "scaling_min_freq"), &khz.to_string())
    }

    fn set_cpu_freq_max(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError> {
        write_sysfs(&Self::cpu_file(cpu, "scaling_max_freq"), &khz.to_string())
    }

    fn set_gpu_freq_min(&mut self, hz: u64) -> Result<(), ActuatorError> {
        write_sysfs(&self.gpu_devfreq.join("min_freq"), &hz.to_string())
    }

    fn set_gpu_freq_max(&mut self, hz: u64) -> Result<(), ActuatorError> {
        write_sysfs(&self.gpu_devfreq.join("max_freq"), &hz.to_string())
    }
}

/// Records every write instead of touching the system. Test backend.
#[derive(Debug, Default)]
pub struct MockActuator {
    pub writes: Vec<(String, String)>,
}

impl MockActuator {
    fn record(&mut self, target: impl Into<String>, value: impl ToString) -> Result<(), ActuatorError> {
        self.writes.push((target.into(), value.to_string()));
        Ok(())
    }
}

impl FrequencyActuator for MockActuator {
    fn set_cpu_governor(&mut self, cpu: u32, governor: &str) -> Result<(), ActuatorError> {
        self.record(format!("cpu{cpu}/governor"), governor)
    }

    fn set_cpu_freq(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError> {
        self.record(format!("cpu{cpu}/setspeed"), khz)
    }

    fn set_cpu_freq_min(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError> {
        self.record(format!("cpu{cpu}/min_freq"), khz)
    }

    fn set_cpu_freq_max(&mut self, cpu: u32, khz: u64) -> Result<(), ActuatorError> {
        self.record(format!("cpu{cpu}/max_freq"), khz)
    }

    fn set_gpu_freq_min(&mut self, hz: u64) -> Result<(), ActuatorError> {
        self.record("gpu/min_freq", hz)
    }

    fn set_gpu_freq_max(&mut self, hz: u64) -> Result<(), ActuatorError> {
        self.record("gpu/max_freq", hz)
    }
}

/// Policy layer over the raw actuator: install the CPU window, program a
/// (cpu, gpu) pair for a run, and park the clocks afterwards.
pub struct SysConfig<A: FrequencyActuator> {
    actuator: A,
}

impl<A: FrequencyActuator> SysConfig<A> {
    pub fn new(actuator: A) -> Self {
        Self { actuator }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    fn clusters(maxn: bool) -> &'static [u32] {
        if maxn {
            &[PRIMARY_CPU_INDEX, MAXN_CPU_INDEX]
        } else {
            &[PRIMARY_CPU_INDEX]
        }
    }

    fn tolerate(result: Result<(), ActuatorError>) {
        if let Err(e) = result {
            log::error!("❌ {e}");
        }
    }

    /// Installs the CPU min/max window on every active cluster.
    pub fn init(&mut self, maxn: bool) {
        log::info!(
            "🔧 Setting min/max CPU frequencies: {} -> {}",
            CPU_WINDOW_MIN_KHZ, CPU_WINDOW_MAX_KHZ
        );
        for &cpu in Self::clusters(maxn) {
            Self::tolerate(self.actuator.set_cpu_freq_min(cpu, CPU_WINDOW_MIN_KHZ));
            Self::tolerate(self.actuator.set_cpu_freq_max(cpu, CPU_WINDOW_MAX_KHZ));
        }
    }

    /// Programs the run frequencies: userspace governor plus setspeed per
    /// cluster, GPU pinned by writing min and max. Off-ladder values are
    /// rejected before anything is written.
    pub fn apply(&mut self, cpu_khz: u64, gpu_hz: u64, maxn: bool) {
        if !cpu_ladder().contains(cpu_khz) {
            log::error!("❌ CPU frequency {cpu_khz} is not an available frequency");
            return;
        }
        if !gpu_ladder().contains(gpu_hz) {
            log::error!("❌ GPU frequency {gpu_hz} is not an available frequency");
            return;
        }

        for &cpu in Self::clusters(maxn) {
            log::debug!("Setting CPU {cpu} frequency: {cpu_khz}");
            Self::tolerate(self.actuator.set_cpu_governor(cpu, "userspace"));
            Self::tolerate(self.actuator.set_cpu_freq(cpu, cpu_khz));
        }

        log::debug!("Setting GPU frequency: {gpu_hz}");
        Self::tolerate(self.actuator.set_gpu_freq_min(gpu_hz));
        Self::tolerate(self.actuator.set_gpu_freq_max(gpu_hz));
        log::info!("🔧 Programmed cpu={cpu_khz} kHz, gpu={gpu_hz} Hz (maxn={maxn})");
    }

    /// Parks the clocks after the last run.
    pub fn restore(&mut self, maxn: bool) {
        log::info!("🔧 Restoring CPU/GPU frequencies");
        for &cpu in Self::clusters(maxn) {
            Self::tolerate(self.actuator.set_cpu_governor(cpu, "userspace"));
            Self::tolerate(self.actuator.set_cpu_freq(cpu, BASE_CPU_FREQ_KHZ));
        }
        Self::tolerate(self.actuator.set_gpu_freq_min(RESTORE_GPU_FREQ_HZ));
        Self::tolerate(self.actuator.set_gpu_freq_max(RESTORE_GPU_FREQ_HZ));
    }
}
