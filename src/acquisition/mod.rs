pub mod discharge;
pub mod orchestrator;

pub use discharge::{DischargeStateTracker, DischargeThresholds};
pub use orchestrator::{AcquisitionError, AcquisitionOrchestrator};
