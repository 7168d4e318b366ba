/*!
# Tempo Runtime

Execution half of the Tempo policy loop. Where `tempo-policy` decides and
refines, this crate actually runs: it programs CPU/GPU clocks through
sysfs, supervises one auto-paced inference worker per app plus a power
sampler behind a shared start barrier, and exports the consolidated run
results as CSV.

## Architecture

```text
config.json ──► SysConfig (actuator) ──► supervisor::execute
                                              │
                     ┌────────────────────────┼──────────────┐
                  worker 'a'              worker 'b'       sampler
                 (heartbeats)            (heartbeats)    (power records)
                     └────────────────────────┼──────────────┘
                                              ▼
                                   RunOutcome ──► refine ──► CSV
```

Hardware specifics stay behind three seams: `FrequencyActuator` (sysfs
clock writes), `PowerSensor` (INA3221 rails + current clocks), and
`InferenceBackend` (an opaque run-one-batch primitive). Each has a real
sysfs/synthetic implementation and a mock for tests.
*/

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod sampler;
pub mod sensor;
pub mod supervisor;
pub mod sysconfig;

pub use config::{AppsFile, AppTarget, Frequencies, ModelSpec, RunConfig};
pub use engine::{Heartbeat, InferenceBackend, InferenceSession, SyntheticBackend, Workload};
pub use error::{ActuatorError, EngineError, SensorError};
pub use export::{export_results, RESULT_HEADER};
pub use sampler::{PowerRecord, SamplerConfig};
pub use sensor::{MockSensor, PowerSensor, Rail, SensorPaths, SysfsSensor};
pub use supervisor::{execute, AppResult, RunOutcome, RunSettings};
pub use sysconfig::{
    FrequencyActuator, MockActuator, SysConfig, SysfsActuator, MAXN_CPU_INDEX,
    PRIMARY_CPU_INDEX,
};
