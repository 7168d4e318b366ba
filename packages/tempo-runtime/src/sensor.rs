/// Power and frequency telemetry sources.
///
/// The board exposes three INA3221 rails through hwmon (current in µA,
/// voltage in mV) and the running CPU/GPU clocks through cpufreq/devfreq.
/// All reads go through the `PowerSensor` capability so the sampler can run
/// against real sysfs paths or a deterministic mock.
use crate::error::SensorError;
use std::fs;
use std::path::{Path, PathBuf};

/// Monitored voltage rails, in CSV column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rail {
    VddIn,
    VddCpuGpuCv,
    VddSoc,
}

impl Rail {
    pub const ALL: [Rail; 3] = [Rail::VddIn, Rail::VddCpuGpuCv, Rail::VddSoc];

    pub fn label(&self) -> &'static str {
        match self {
            Rail::VddIn => "VDD_IN",
            Rail::VddCpuGpuCv => "VDD_CPU_GPU_CV",
            Rail::VddSoc => "VDD_SOC",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Rail::VddIn => 0,
            Rail::VddCpuGpuCv => 1,
            Rail::VddSoc => 2,
        }
    }
}

/// Read-only telemetry capability used by the sampler.
pub trait PowerSensor: Send {
    /// Returns (current µA, voltage mV) for the rail.
    fn read_rail(&mut self, rail: Rail) -> Result<(u64, u64), SensorError>;

    fn read_gpu_freq(&mut self) -> Result<u64, SensorError>;
    fn read_cpu0_freq(&mut self) -> Result<u64, SensorError>;
    fn read_cpu4_freq(&mut self) -> Result<u64, SensorError>;
}

/// Sysfs locations of every telemetry file. Defaults match the reference
/// board; all paths are overridable for other hardware revisions.
#[derive(Debug, Clone)]
pub struct SensorPaths {
    pub rails: [(PathBuf, PathBuf); 3],
    pub gpu_freq: PathBuf,
    pub cpu0_freq: PathBuf,
    pub cpu4_freq: PathBuf,
}

impl Default for SensorPaths {
    fn default() -> Self {
        let hwmon = "/sys/bus/i2c/drivers/ina3221/1-0040/hwmon/hwmon4";
        Self {
            rails: [
                (
                    format!("{hwmon}/curr1_input").into(),
                    format!("{hwmon}/in1_input").into(),
                ),
                (
                    format!("{hwmon}/curr2_input").into(),
                    format!("{hwmon}/in2_input").into(),
                ),
                (
                    format!("{hwmon}/curr3_input").into(),
                    format!("{hwmon}/in3_input").into(),
                ),
            ],
            gpu_freq: "/sys/devices/gpu.0/devfreq/17000000.ga10b/target_freq".into(),
            // Per-cluster clocks are read from the last core of each
            // cluster.
            cpu0_freq: "/sys/devices/system/cpu/cpu3/cpufreq/scaling_cur_freq".into(),
            cpu4_freq: "/sys/devices/system/cpu/cpu7/cpufreq/scaling_cur_freq".into(),
        }
    }
}

/// Sensor backend reading the real sysfs files.
#[derive(Debug, Clone, Default)]
pub struct SysfsSensor {
    paths: SensorPaths,
}

impl SysfsSensor {
    pub fn new(paths: SensorPaths) -> Self {
        Self { paths }
    }
}

fn read_value(path: &Path) -> Result<u64, SensorError> {
    let content = fs::read_to_string(path).map_err(|source| SensorError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    content.trim().parse().map_err(|_| SensorError::Parse {
        path: path.to_path_buf(),
    })
}

impl PowerSensor for SysfsSensor {
    fn read_rail(&mut self, rail: Rail) -> Result<(u64, u64), SensorError> {
        let (curr_path, volt_path) = &self.paths.rails[rail.index()];
        let curr = read_value(curr_path)?;
        let volt = read_value(volt_path)?;
        Ok((curr, volt))
    }

    fn read_gpu_freq(&mut self) -> Result<u64, SensorError> {
        read_value(&self.paths.gpu_freq)
    }

    fn read_cpu0_freq(&mut self) -> Result<u64, SensorError> {
        read_value(&self.paths.cpu0_freq)
    }

    fn read_cpu4_freq(&mut self) -> Result<u64, SensorError> {
        read_value(&self.paths.cpu4_freq)
    }
}

/// Deterministic sensor for tests and hardware-free runs: rail readings
/// follow a small repeating sequence, frequency reads return fixed values.
#[derive(Debug, Clone)]
pub struct MockSensor {
    tick: u64,
    pub gpu_freq: u64,
    pub cpu0_freq: u64,
    pub cpu4_freq: u64,
}

impl Default for MockSensor {
    fn default() -> Self {
        Self {
            tick: 0,
            gpu_freq: 408_000_000,
            cpu0_freq: 729_600,
            cpu4_freq: 729_600,
        }
    }
}

impl PowerSensor for MockSensor {
    fn read_rail(&mut self, rail: Rail) -> Result<(u64, u64), SensorError> {
        self.tick = self.tick.wrapping_add(1);
        // A gentle sawtooth per rail keeps averages non-trivial but exact.
        let curr = 100 + (self.tick % 10) * 10 + rail.index() as u64 * 50;
        let volt = 5000;
        Ok((curr, volt))
    }

    fn read_gpu_freq(&mut self) -> Result<u64, SensorError> {
        Ok(self.gpu_freq)
    }

    fn read_cpu0_freq(&mut self) -> Result<u64, SensorError> {
        Ok(self.cpu0_freq)
    }

    fn read_cpu4_freq(&mut self) -> Result<u64, SensorError> {
        Ok(self.cpu4_freq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sysfs_sensor_reads_values() {
        let dir = TempDir::new().unwrap();
        let curr = dir.path().join("curr1_input");
        let volt = dir.path().join("in1_input");
        std::fs::write(&curr, "1520\n").unwrap();
        std::fs::write(&volt, "5008\n").unwrap();

        let mut paths = SensorPaths::default();
        paths.rails[0] = (curr, volt);
        let mut sensor = SysfsSensor::new(paths);

        assert_eq!(sensor.read_rail(Rail::VddIn).unwrap(), (1520, 5008));
    }

    #[test]
    fn test_missing_sensor_is_read_error() {
        let dir = TempDir::new().unwrap();
        let mut paths = SensorPaths::default();
        paths.gpu_freq = dir.path().join("missing");
        let mut sensor = SysfsSensor::new(paths);

        assert!(matches!(
            sensor.read_gpu_freq(),
            Err(SensorError::Read { .. })
        ));
    }

    #[test]
    fn test_garbage_sensor_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("freq");
        std::fs::write(&path, "not-a-number").unwrap();
        let mut paths = SensorPaths::default();
        paths.gpu_freq = path;
        let mut sensor = SysfsSensor::new(paths);

        assert!(matches!(
            sensor.read_gpu_freq(),
            Err(SensorError::Parse { .. })
        ));
    }

    #[test]
    fn test_mock_sensor_is_deterministic() {
        let mut a = MockSensor::default();
        let mut b = MockSensor::default();
        for rail in Rail::ALL {
            assert_eq!(a.read_rail(rail).unwrap(), b.read_rail(rail).unwrap());
        }
    }
}
