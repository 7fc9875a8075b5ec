use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of cell-level alarm, with the codes used by the alarm log
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlarmKind {
    HighVoltage,
    LowVoltage,
    HighImpedance,
    HighTemperature,
    /// Listed in the alarm dictionary; not evaluated per cell.
    Discharge,
}

impl AlarmKind {
    /// Kinds evaluated against every cell reading
    pub const EVALUATED: [AlarmKind; 4] = [
        AlarmKind::HighVoltage,
        AlarmKind::LowVoltage,
        AlarmKind::HighImpedance,
        AlarmKind::HighTemperature,
    ];

    pub fn code(&self) -> i32 {
        match self {
            Self::HighVoltage => 1,
            Self::LowVoltage => 2,
            Self::HighImpedance => 3,
            Self::HighTemperature => 4,
            Self::Discharge => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|k| k.code() == code)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::HighVoltage => "high voltage alarm",
            Self::LowVoltage => "low voltage alarm",
            Self::HighImpedance => "high impedance alarm",
            Self::HighTemperature => "high temperature alarm",
            Self::Discharge => "discharge alarm",
        }
    }
}

/// Identity of one alarm stream: one kind on one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlarmKey {
    pub rack_id: i32,
    pub module_id: u8,
    pub cell_number: u8,
    pub kind: AlarmKind,
}

/// One row of the append-only alarm log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: AlarmKind,
    pub rack_id: i32,
    pub module_id: u8,
    pub cell_number: u8,
    pub resolved: bool,
}

impl AlarmRecord {
    pub fn new(key: AlarmKey, timestamp: DateTime<Utc>, resolved: bool) -> Self {
        Self {
            timestamp,
            kind: key.kind,
            rack_id: key.rack_id,
            module_id: key.module_id,
            cell_number: key.cell_number,
            resolved,
        }
    }

    pub fn key(&self) -> AlarmKey {
        AlarmKey {
            rack_id: self.rack_id,
            module_id: self.module_id,
            cell_number: self.cell_number,
            kind: self.kind,
        }
    }
}
