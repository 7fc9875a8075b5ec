use serde::{Deserialize, Serialize};

/// Charge/discharge phase of the battery system.
///
/// The integer codes are what the telemetry log stores in its `state` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
    strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DischargePhase {
    #[default]
    FloatingCharge,
    ChargeStart,
    ChargeInProgress,
    ChargeComplete,
    DischargeStart,
    DischargeInProgress,
    DischargeComplete,
}

/// State code stored for rows of a module that could not be read
pub const UNREAD_STATE_CODE: i32 = 0;

impl DischargePhase {
    pub fn code(&self) -> i32 {
        match self {
            Self::FloatingCharge => 1,
            Self::ChargeStart => 2,
            Self::ChargeInProgress => 3,
            Self::ChargeComplete => 4,
            Self::DischargeStart => 5,
            Self::DischargeInProgress => 6,
            Self::DischargeComplete => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_codes_are_unique() {
        let codes: Vec<i32> = DischargePhase::iter().map(|p| p.code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(!codes.contains(&UNREAD_STATE_CODE));
    }

    #[test]
    fn test_display() {
        assert_eq!(DischargePhase::FloatingCharge.to_string(), "floating_charge");
        assert_eq!(DischargePhase::DischargeComplete.to_string(), "discharge_complete");
    }
}
