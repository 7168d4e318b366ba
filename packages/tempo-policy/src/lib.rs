/*!
# Tempo Policy

Closed-loop execution policy for a heterogeneous edge device hosting one
GPU and two DLA cores. The crate is the pure half of the system: it loads
per-app benchmark profiles, decides device placement and the minimum
CPU/GPU frequencies that satisfy a set of throughput targets, and refines
those frequencies from observed throughput. Driving the actual hardware is
the runtime crate's job.

## Pipeline

```text
ProfileStore → decide::plan → (runtime executes) → refine::refine → …
```

- **Profiles** are immutable per-app records seeded offline: throughput and
  performance-per-watt per (device, frequency), DLA subgraph counts, and
  concurrency slowdown fractions.
- **Decide** places each app on the most power-efficient device able to meet
  its target (DLA capacity permitting) and picks the lowest GPU-ladder
  frequency that covers every target.
- **Refine** nudges one frequency axis per run from the worst
  target/actual ratio, quantised onto the hardware ladders.
*/

mod decide;
mod error;
mod ladder;
mod profile;
mod refine;

pub use decide::{plan, AppPlacement, Device, Plan, DLA_CAPACITY, DLA_PPW_THRESHOLD};
pub use error::{PolicyError, Result};
pub use ladder::{
    cpu_ladder, gpu_ladder, Ladder, BASE_CPU_FREQ_KHZ, CPU_LADDER_KHZ, GPU_LADDER_HZ,
    MAX_GPU_FREQ_HZ,
};
pub use profile::{Accel, AppProfile, EngineInfo, ProfileStore};
pub use refine::{refine, Observation, CPU_FACTOR, GPU_FACTOR};
