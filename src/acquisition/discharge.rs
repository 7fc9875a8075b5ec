use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{BatchResult, DischargePhase};

/// Current thresholds (A) of the discharge hysteresis band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DischargeThresholds {
    /// Below this the system is discharging
    pub start_discharge_current: f64,
    /// Above this the discharge is over
    pub end_discharge_current: f64,
}

impl Default for DischargeThresholds {
    fn default() -> Self {
        Self {
            start_discharge_current: -8.0,
            end_discharge_current: -4.0,
        }
    }
}

/// Discharge phase detection from one reference module's pack current.
///
/// Currents inside `[start, end]` leave the phase alone, so a current hovering
/// around a single threshold cannot make the phase oscillate. The charge-side
/// phases are never entered; all non-discharge current is floating charge.
#[derive(Debug, Clone)]
pub struct DischargeStateTracker {
    thresholds: DischargeThresholds,
    reference_module: u8,
    phase: DischargePhase,
}

impl DischargeStateTracker {
    pub fn new(thresholds: DischargeThresholds, reference_module: u8) -> Self {
        Self {
            thresholds,
            reference_module,
            phase: DischargePhase::default(),
        }
    }

    pub fn phase(&self) -> DischargePhase {
        self.phase
    }

    /// Advance one cycle with the reference current (A)
    pub fn step(&mut self, current: f64) -> DischargePhase {
        use DischargePhase::*;

        let next = if current < self.thresholds.start_discharge_current {
            match self.phase {
                FloatingCharge | ChargeStart | ChargeInProgress => DischargeStart,
                DischargeStart | DischargeInProgress => DischargeInProgress,
                other => other,
            }
        } else if current > self.thresholds.end_discharge_current {
            match self.phase {
                DischargeInProgress => DischargeComplete,
                _ => FloatingCharge,
            }
        } else {
            self.phase
        };

        if next != self.phase {
            info!(from = %self.phase, to = %next, current, "discharge phase changed");
            self.phase = next;
        }
        self.phase
    }

    /// Advance from a batch. A failed reference module leaves the phase as is.
    pub fn observe(&mut self, batch: &BatchResult) -> DischargePhase {
        match batch.module(self.reference_module) {
            Some(snapshot) if snapshot.is_success() => self.step(snapshot.current_a),
            _ => self.phase,
        }
    }
}
