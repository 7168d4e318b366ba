/// Refine step: multiplicative feedback adjustment of CPU/GPU frequencies.
///
/// Stateless: each invocation looks only at the worst target/actual ratio
/// from the last run and the currently programmed frequencies. The GPU
/// ladder is exhausted before the CPU ladder is touched, and at most one
/// axis moves per invocation, which keeps the loop from oscillating in two
/// dimensions at once. Drift is bounded by the discrete ladders and the
/// clipping at their ends.
use crate::ladder::{cpu_ladder, gpu_ladder};

/// GPU frequency scales throughput roughly linearly on the reference
/// hardware; the CPU needs a steeper exponent to show the same effect.
pub const GPU_FACTOR: f64 = 1.0;
pub const CPU_FACTOR: f64 = 1.71;

/// Last observed delivery of one app: the target and the throughput
/// measured without pacing sleep (`actual`). Apps whose worker produced no
/// heartbeats are simply not observations.
#[derive(Debug, Clone)]
pub struct Observation {
    pub name: String,
    pub target_tp: f64,
    pub actual_tp: f64,
}

/// Returns the next `(cpu_freq_khz, gpu_freq_hz)` on the discrete ladders.
///
/// `delta = max(target/actual)` over the observations; above 1.0 the run
/// under-delivered and a frequency is promoted, otherwise one is demoted.
/// The round-up always picks the smallest ladder entry strictly greater
/// than `freq × delta^factor`; on the decelerate branch this means a value
/// landing exactly on the entry below the current one keeps the current
/// frequency (and a delta of exactly 1.0 rounds up to the next entry).
pub fn refine(observations: &[Observation], cpu_freq_khz: u64, gpu_freq_hz: u64) -> (u64, u64) {
    if observations.is_empty() {
        log::warn!("⚠️  Refine called with no observations, keeping frequencies");
        return (cpu_freq_khz, gpu_freq_hz);
    }

    let mut delta = 0.0f64;
    for obs in observations {
        let ratio = obs.target_tp / obs.actual_tp;
        delta = delta.max(ratio);
    }

    let cpu = cpu_ladder();
    let gpu = gpu_ladder();
    let mut new_cpu = cpu_freq_khz;
    let mut new_gpu = gpu_freq_hz;

    if delta > 1.0 {
        // Accelerate
        if gpu_freq_hz != gpu.max() {
            let raw = gpu_freq_hz as f64 * delta.powf(GPU_FACTOR);
            new_gpu = gpu.next_above(raw).unwrap_or(gpu.max());
        } else if cpu_freq_khz != cpu.max() {
            let raw = cpu_freq_khz as f64 * delta.powf(CPU_FACTOR);
            new_cpu = cpu.next_above(raw).unwrap_or(cpu.max());
        }
        // Both at the top: saturated, no change.
    } else {
        // Decelerate
        if gpu_freq_hz != gpu.min() {
            let raw = gpu_freq_hz as f64 * delta.powf(GPU_FACTOR);
            new_gpu = gpu.next_above(raw).unwrap_or(gpu.min());
        } else if cpu_freq_khz != cpu.min() {
            let raw = cpu_freq_khz as f64 * delta.powf(CPU_FACTOR);
            new_cpu = cpu.next_above(raw).unwrap_or(cpu.min());
        }
        // Both at the bottom: saturated, no change.
    }

    log::debug!(
        "Refine: delta={:.3}, cpu {} -> {}, gpu {} -> {}",
        delta,
        cpu_freq_khz,
        new_cpu,
        gpu_freq_hz,
        new_gpu
    );
    (new_cpu, new_gpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::{BASE_CPU_FREQ_KHZ, CPU_LADDER_KHZ, GPU_LADDER_HZ};
    use proptest::prelude::*;

    fn obs(target: f64, actual: f64) -> Observation {
        Observation {
            name: "app".to_string(),
            target_tp: target,
            actual_tp: actual,
        }
    }

    #[test]
    fn test_under_delivery_promotes_gpu() {
        // delta = 20/18 ≈ 1.11; 408e6 * 1.11 ≈ 453e6 → 510 MHz.
        let (cpu, gpu) = refine(&[obs(20.0, 18.0)], BASE_CPU_FREQ_KHZ, 408_000_000);
        assert_eq!(gpu, 510_000_000);
        assert_eq!(cpu, BASE_CPU_FREQ_KHZ);
    }

    #[test]
    fn test_over_delivery_demotes_gpu_one_step() {
        // delta = 0.7; 510e6 * 0.7 = 357e6 → 408 MHz, one entry down.
        let (cpu, gpu) = refine(&[obs(7.0, 10.0)], BASE_CPU_FREQ_KHZ, 510_000_000);
        assert_eq!(gpu, 408_000_000);
        assert_eq!(cpu, BASE_CPU_FREQ_KHZ);
    }

    #[test]
    fn test_gpu_saturated_promotes_cpu() {
        // delta = 1.5 with the GPU pinned at the top moves the CPU instead.
        let (cpu, gpu) = refine(&[obs(30.0, 20.0)], BASE_CPU_FREQ_KHZ, 918_000_000);
        assert_eq!(gpu, 918_000_000);
        assert!(cpu > BASE_CPU_FREQ_KHZ);
        assert!(CPU_LADDER_KHZ.contains(&cpu));
    }

    #[test]
    fn test_fully_saturated_acceleration() {
        let top_cpu = *CPU_LADDER_KHZ.last().unwrap();
        let (cpu, gpu) = refine(&[obs(30.0, 20.0)], top_cpu, 918_000_000);
        assert_eq!((cpu, gpu), (top_cpu, 918_000_000));
    }

    #[test]
    fn test_gpu_at_min_demotes_cpu() {
        let (cpu, gpu) = refine(&[obs(5.0, 10.0)], BASE_CPU_FREQ_KHZ, 306_000_000);
        assert_eq!(gpu, 306_000_000);
        assert!(cpu < BASE_CPU_FREQ_KHZ);
        assert!(CPU_LADDER_KHZ.contains(&cpu));
    }

    #[test]
    fn test_fully_saturated_deceleration() {
        let bottom_cpu = CPU_LADDER_KHZ[0];
        let (cpu, gpu) = refine(&[obs(5.0, 10.0)], bottom_cpu, 306_000_000);
        assert_eq!((cpu, gpu), (bottom_cpu, 306_000_000));
    }

    #[test]
    fn test_worst_app_dominates_delta() {
        // One over-delivering app cannot mask an under-delivering one.
        let (cpu, gpu) = refine(
            &[obs(10.0, 20.0), obs(20.0, 15.0)],
            BASE_CPU_FREQ_KHZ,
            408_000_000,
        );
        assert!(gpu > 408_000_000);
        assert_eq!(cpu, BASE_CPU_FREQ_KHZ);
    }

    #[test]
    fn test_decelerate_round_up_can_hold_frequency() {
        // delta = 0.8 from 510 MHz: raw = 408e6 lands exactly on a ladder
        // entry, and the strictly-greater round-up returns 510 MHz again.
        let (_, gpu) = refine(&[obs(8.0, 10.0)], BASE_CPU_FREQ_KHZ, 510_000_000);
        assert_eq!(gpu, 510_000_000);
    }

    #[test]
    fn test_no_observations_keeps_frequencies() {
        let (cpu, gpu) = refine(&[], BASE_CPU_FREQ_KHZ, 612_000_000);
        assert_eq!((cpu, gpu), (BASE_CPU_FREQ_KHZ, 612_000_000));
    }

    proptest! {
        /// At most one axis changes per invocation, and outputs stay on
        /// their ladders.
        #[test]
        fn prop_single_axis_and_ladder_closure(
            cpu_idx in 0usize..CPU_LADDER_KHZ.len(),
            gpu_idx in 0usize..GPU_LADDER_HZ.len(),
            target in 1.0f64..200.0,
            actual in 1.0f64..200.0,
        ) {
            let cpu_in = CPU_LADDER_KHZ[cpu_idx];
            let gpu_in = GPU_LADDER_HZ[gpu_idx];
            let (cpu_out, gpu_out) = refine(&[obs(target, actual)], cpu_in, gpu_in);

            prop_assert!(CPU_LADDER_KHZ.contains(&cpu_out));
            prop_assert!(GPU_LADDER_HZ.contains(&gpu_out));
            let changed =
                usize::from(cpu_out != cpu_in) + usize::from(gpu_out != gpu_in);
            prop_assert!(changed <= 1);
        }
    }
}
