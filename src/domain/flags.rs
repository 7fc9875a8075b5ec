//! Bit-field registers reported by the BMS.
//!
//! Every flag register is one 16-bit word made of two stacked bytes: the low
//! byte carries bits 0-7, the high byte bits 8-15. Bits that have no defined
//! meaning are dropped on decode.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Access to the two stacked bytes of a flag word
pub trait StackedBytes {
    fn word(&self) -> u16;

    fn low_byte(&self) -> u8 {
        (self.word() & 0x00FF) as u8
    }

    fn high_byte(&self) -> u8 {
        (self.word() >> 8) as u8
    }
}

bitflags! {
    /// Warning flag word (register offset 5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WarningFlags: u16 {
        const CELL_OVER_VOLTAGE = 1 << 0;
        const CELL_UNDER_VOLTAGE = 1 << 1;
        const PACK_OVER_VOLTAGE = 1 << 2;
        const PACK_UNDER_VOLTAGE = 1 << 3;
        const CHARGE_OVER_CURRENT = 1 << 4;
        const DISCHARGE_OVER_CURRENT = 1 << 5;
        const CELL_OVER_TEMPERATURE = 1 << 6;
        const CELL_UNDER_TEMPERATURE = 1 << 7;
        const ENV_OVER_TEMPERATURE = 1 << 8;
        const ENV_UNDER_TEMPERATURE = 1 << 9;
        const PCB_OVER_TEMPERATURE = 1 << 10;
        const SOC_LOW = 1 << 11;
        const CELL_VOLTAGE_DIFFERENCE = 1 << 12;
    }
}

bitflags! {
    /// Protection flag word (register offset 6)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ProtectionFlags: u16 {
        const CELL_OVER_VOLTAGE = 1 << 0;
        const CELL_UNDER_VOLTAGE = 1 << 1;
        const PACK_OVER_VOLTAGE = 1 << 2;
        const PACK_UNDER_VOLTAGE = 1 << 3;
        const SHORT_CIRCUIT = 1 << 4;
        // bit 5 reserved
        const CHARGE_OVER_TEMPERATURE = 1 << 6;
        const CHARGE_UNDER_TEMPERATURE = 1 << 7;
        const DISCHARGE_OVER_TEMPERATURE = 1 << 8;
        const DISCHARGE_UNDER_TEMPERATURE = 1 << 9;
        const CHARGE_OVER_CURRENT = 1 << 10;
        const DISCHARGE_OVER_CURRENT = 1 << 11;
        const ANTI_THEFT_LOCK = 1 << 12;
    }
}

bitflags! {
    /// Fault status word (register offset 7)
    ///
    /// The low byte holds hardware faults, the high byte the operating status
    /// of the pack (charging, MOS state, ...).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FaultFlags: u16 {
        const FRONT_END_SAMPLE_ERROR = 1 << 0;
        const TEMP_SENSOR_DISCONNECTED = 1 << 1;
        const INVERSE_CONNECTION_ERROR = 1 << 2;
        const CHARGING = 1 << 8;
        const DISCHARGING = 1 << 9;
        const CHARGE_MOS_CONNECTED = 1 << 10;
        const DISCHARGE_MOS_CONNECTED = 1 << 11;
        const CURRENT_LIMIT_ENABLED = 1 << 12;
        const FULLY_CHARGED = 1 << 13;
        const MODULE_DEGRADED = 1 << 14;
        const MODULE_OUT_OF_OPERATION = 1 << 15;
    }
}

impl FaultFlags {
    /// Bits that describe an actual fault rather than an operating status
    pub const ERRORS: Self = Self::FRONT_END_SAMPLE_ERROR
        .union(Self::TEMP_SENSOR_DISCONNECTED)
        .union(Self::INVERSE_CONNECTION_ERROR)
        .union(Self::MODULE_DEGRADED)
        .union(Self::MODULE_OUT_OF_OPERATION);

    pub fn has_error(&self) -> bool {
        self.intersects(Self::ERRORS)
    }
}

bitflags! {
    /// Cell under-voltage state (register offset 50), bit n = cell n
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CellUvState: u16 {
        const _ = !0;
    }
}

impl CellUvState {
    /// Whether cell `index` (0-based) reports under-voltage
    pub fn is_under_voltage(&self, index: usize) -> bool {
        index < 16 && self.bits() & (1 << index) != 0
    }

    /// Indices of all cells currently flagged
    pub fn flagged_cells(&self) -> impl Iterator<Item = usize> + '_ {
        (0..16).filter(move |i| self.is_under_voltage(*i))
    }
}

impl StackedBytes for WarningFlags {
    fn word(&self) -> u16 {
        self.bits()
    }
}

impl StackedBytes for ProtectionFlags {
    fn word(&self) -> u16 {
        self.bits()
    }
}

impl StackedBytes for FaultFlags {
    fn word(&self) -> u16 {
        self.bits()
    }
}

impl StackedBytes for CellUvState {
    fn word(&self) -> u16 {
        self.bits()
    }
}
