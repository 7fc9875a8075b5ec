use serde::{Deserialize, Serialize};
use validator::Validate;

use super::snapshot::CELL_SLOTS;

/// Static description of one battery rack and its alarm thresholds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RackConfig {
    pub rack_id: i32,
    pub name: String,
    #[validate(range(min = 1, max = 247))]
    pub installed_modules: u8,
    /// Nominal cell voltage (V)
    pub nominal_voltage: f64,
    /// Cell high-voltage threshold (V)
    pub high_voltage: f64,
    /// Cell low-voltage threshold (V)
    pub low_voltage: f64,
    /// Cell high-temperature threshold (°C)
    pub high_temperature: f64,
    /// Cell high-impedance threshold (mΩ)
    pub high_impedance: f64,
    /// Per-module overrides; modules without an entry use all cell slots
    #[serde(default)]
    #[validate(nested)]
    pub modules: Vec<ModuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModuleConfig {
    pub module_id: u8,
    #[validate(range(min = 1, max = 16))]
    pub installed_cells: u8,
}

impl RackConfig {
    /// Module indices polled every cycle (1..=installed_modules)
    pub fn module_ids(&self) -> impl Iterator<Item = u8> {
        1..=self.installed_modules
    }

    pub fn installed_cells(&self, module_id: u8) -> u8 {
        self.modules
            .iter()
            .find(|m| m.module_id == module_id)
            .map(|m| m.installed_cells)
            .unwrap_or(CELL_SLOTS as u8)
            .min(CELL_SLOTS as u8)
    }
}

impl Default for RackConfig {
    fn default() -> Self {
        Self {
            rack_id: 1,
            name: "main bat".to_string(),
            installed_modules: 8,
            nominal_voltage: 1.2,
            high_voltage: 3.65,
            low_voltage: 2.99,
            high_temperature: 65.0,
            high_impedance: 10.0,
            modules: Vec::new(),
        }
    }
}
