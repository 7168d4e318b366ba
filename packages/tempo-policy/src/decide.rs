/// Decide step: device placement and initial frequency selection.
///
/// Given the set of co-scheduled apps and their target throughputs, picks
/// the most power-efficient device capable of each target (respecting DLA
/// core capacities) and the lowest GPU frequency that still meets every
/// target. The CPU starts at the base frequency; the Refine controller
/// moves it afterwards.
use crate::ladder::{gpu_ladder, BASE_CPU_FREQ_KHZ, MAX_GPU_FREQ_HZ};
use crate::profile::{Accel, AppProfile};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subgraph units each DLA core can host within one configuration.
pub const DLA_CAPACITY: u32 = 16;

/// Average PPW ratio above which an app prefers the DLA.
pub const DLA_PPW_THRESHOLD: f64 = 1.0;

/// Compute device an app is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    #[serde(rename = "GPU")]
    Gpu,
    #[serde(rename = "DLA0")]
    Dla0,
    #[serde(rename = "DLA1")]
    Dla1,
}

impl Device {
    pub fn accel(&self) -> Accel {
        match self {
            Device::Gpu => Accel::Gpu,
            Device::Dla0 | Device::Dla1 => Accel::Dla,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Gpu => write!(f, "GPU"),
            Device::Dla0 => write!(f, "DLA0"),
            Device::Dla1 => write!(f, "DLA1"),
        }
    }
}

/// One app's slot in a plan.
#[derive(Debug, Clone)]
pub struct AppPlacement {
    pub name: String,
    pub device: Device,
    pub target_tp: f64,
    /// Set when no (device, frequency) pair reaches the target; the app is
    /// still placed on its best device and the ladder runs at the top.
    pub unachievable: bool,
}

/// Output of the Decide step.
#[derive(Debug, Clone)]
pub struct Plan {
    pub placements: Vec<AppPlacement>,
    pub cpu_freq_khz: u64,
    pub gpu_freq_hz: u64,
}

/// Builds a placement and minimum frequency pair for a set of
/// (profile, target throughput) apps. Never fails: unachievable targets are
/// flagged, not rejected.
pub fn plan(apps: &[(AppProfile, f64)]) -> Plan {
    log::info!("🧭 Building configuration for {} apps", apps.len());

    let numapps = apps.len();
    let mut dla0_capacity = DLA_CAPACITY;
    let mut dla1_capacity = DLA_CAPACITY;

    // Apps that profit most from the DLA go last, after lower-ratio apps
    // have taken the DLA capacity they would waste. Stable sort keeps ties
    // in insertion order.
    let mut ordered: Vec<&(AppProfile, f64)> = apps.iter().collect();
    ordered.sort_by(|a, b| a.0.avg_ppw_ratio().total_cmp(&b.0.avg_ppw_ratio()));

    let mut placements = Vec::with_capacity(numapps);
    let mut min_running_freq: u64 = 0;

    for (profile, target_tp) in ordered {
        let factor = profile.slowdown_factor(numapps);
        let (candidate, mut unachievable) = analyze(profile, *target_tp, factor);

        let device = match candidate {
            Accel::Dla => {
                let units = profile.dla_subgraphs.len() as u32;
                if units <= dla0_capacity {
                    dla0_capacity -= units;
                    log::debug!(
                        "Allocated '{}' to DLA0 (remaining capacity: {})",
                        profile.name,
                        dla0_capacity
                    );
                    Device::Dla0
                } else if units <= dla1_capacity {
                    dla1_capacity -= units;
                    log::debug!(
                        "Allocated '{}' to DLA1 (remaining capacity: {})",
                        profile.name,
                        dla1_capacity
                    );
                    Device::Dla1
                } else {
                    log::debug!("Allocated '{}' to GPU (no capacity on DLAs)", profile.name);
                    Device::Gpu
                }
            }
            Accel::Gpu => {
                log::debug!("Allocated '{}' to GPU", profile.name);
                Device::Gpu
            }
        };

        // Minimum frequency on the device the app actually landed on; a
        // capacity fallback re-evaluates against the GPU table.
        let min_freq = match profile.min_freq_for(device.accel(), *target_tp, factor) {
            Some(f) => f,
            None => {
                unachievable = true;
                log::warn!(
                    "⚠️  App '{}' is unachievable (target throughput: {})",
                    profile.name,
                    target_tp
                );
                MAX_GPU_FREQ_HZ
            }
        };
        min_running_freq = min_running_freq.max(min_freq);

        placements.push(AppPlacement {
            name: profile.name.clone(),
            device,
            target_tp: *target_tp,
            unachievable,
        });
    }

    let gpu_freq_hz = if placements.is_empty() {
        gpu_ladder().min()
    } else {
        min_running_freq
    };

    log::info!(
        "🧭 Plan ready: gpu={} Hz, cpu={} kHz",
        gpu_freq_hz,
        BASE_CPU_FREQ_KHZ
    );

    Plan {
        placements,
        cpu_freq_khz: BASE_CPU_FREQ_KHZ,
        gpu_freq_hz,
    }
}

/// Candidate device for one app:
/// - DLA when its PPW ratio favours it and the DLA can reach the target;
/// - else GPU when the GPU can reach the target;
/// - else whichever device peaks higher, and the target is unachievable.
fn analyze(profile: &AppProfile, target_tp: f64, factor: f64) -> (Accel, bool) {
    if profile.avg_ppw_ratio() > DLA_PPW_THRESHOLD
        && profile.max_throughput(Accel::Dla) * factor >= target_tp
    {
        (Accel::Dla, false)
    } else if profile.max_throughput(Accel::Gpu) * factor >= target_tp {
        (Accel::Gpu, false)
    } else if profile.max_throughput(Accel::Dla) > profile.max_throughput(Accel::Gpu) {
        (Accel::Dla, true)
    } else {
        (Accel::Gpu, true)
    }
}
