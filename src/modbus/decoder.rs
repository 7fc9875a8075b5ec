//! Register map and parser for the BMS telemetry block.
//!
//! The whole telemetry of a module is read as one contiguous block of input
//! registers. Offsets below are relative to [`BLOCK_BASE_ADDRESS`].

use chrono::{DateTime, Utc};

use super::error::DecodeError;
use crate::domain::{
    CellUvState, FaultFlags, ModuleSnapshot, ProtectionFlags, ReadStatus, WarningFlags,
    CELL_SLOTS,
};

/// First input register of the telemetry block
pub const BLOCK_BASE_ADDRESS: u16 = 0x0FFF;
/// Words in the telemetry block
pub const BLOCK_LEN: usize = 51;

/// Word offsets inside the block
pub mod offset {
    pub const PACK_VOLTAGE: usize = 0;
    pub const CURRENT: usize = 1;
    pub const REMAINING_CAPACITY: usize = 2;
    pub const AVG_CELL_TEMP: usize = 3;
    pub const AMBIENT_TEMP: usize = 4;
    pub const WARNING_FLAGS: usize = 5;
    pub const PROTECTION_FLAGS: usize = 6;
    pub const FAULT_FLAGS: usize = 7;
    pub const SOC: usize = 8;
    pub const CIRCULATE_COUNT: usize = 9;
    pub const SOH: usize = 10;
    pub const PCB_TEMP: usize = 11;
    pub const HISTORY_DISCHARGE_CAPACITY: usize = 12;
    pub const INSTALLED_CELL_COUNT: usize = 13;
    pub const CELL_VOLTAGES: usize = 14;
    pub const TEMP_SENSOR_COUNT: usize = 30;
    pub const CELL_TEMPS: usize = 31;
    pub const FULL_CAPACITY: usize = 47;
    pub const REMAIN_CHARGE_TIME: usize = 48;
    pub const REMAIN_DISCHARGE_TIME: usize = 49;
    pub const CELL_UV_STATE: usize = 50;
}

/// Raw value of 0 A on the current register
pub const CURRENT_ZERO_OFFSET: i32 = 10_000;
/// Raw value of 0 °C on temperature registers
pub const TEMP_ZERO_OFFSET: i32 = 400;

const PACK_VOLTAGE_DIVISOR: f64 = 100.0;
const TENTHS: f64 = 10.0;
/// Cell voltages are reported in mV
const CELL_VOLTAGE_DIVISOR: f64 = 1000.0;

fn scaled(raw: u16, divisor: f64) -> f64 {
    raw as f64 / divisor
}

fn offset_scaled(raw: u16, zero: i32, divisor: f64) -> f64 {
    (raw as i32 - zero) as f64 / divisor
}

/// Decode a telemetry block, stamping the snapshot with the current time
pub fn decode(raw: &[u16], module_id: u8) -> Result<ModuleSnapshot, DecodeError> {
    decode_at(raw, module_id, Utc::now())
}

/// Decode a telemetry block into a [`ReadStatus::Success`] snapshot
pub fn decode_at(
    raw: &[u16],
    module_id: u8,
    timestamp: DateTime<Utc>,
) -> Result<ModuleSnapshot, DecodeError> {
    if raw.len() != BLOCK_LEN {
        return Err(DecodeError::LengthMismatch {
            expected: BLOCK_LEN,
            actual: raw.len(),
        });
    }

    let mut cell_voltages_v = [0.0; CELL_SLOTS];
    let mut cell_temps_c = [0.0; CELL_SLOTS];
    for i in 0..CELL_SLOTS {
        cell_voltages_v[i] = scaled(raw[offset::CELL_VOLTAGES + i], CELL_VOLTAGE_DIVISOR);
        cell_temps_c[i] = offset_scaled(raw[offset::CELL_TEMPS + i], TEMP_ZERO_OFFSET, TENTHS);
    }

    Ok(ModuleSnapshot {
        module_id,
        pack_voltage_v: scaled(raw[offset::PACK_VOLTAGE], PACK_VOLTAGE_DIVISOR),
        current_a: offset_scaled(raw[offset::CURRENT], CURRENT_ZERO_OFFSET, TENTHS),
        remaining_capacity_ah: scaled(raw[offset::REMAINING_CAPACITY], TENTHS),
        avg_cell_temp_c: offset_scaled(raw[offset::AVG_CELL_TEMP], TEMP_ZERO_OFFSET, TENTHS),
        ambient_temp_c: offset_scaled(raw[offset::AMBIENT_TEMP], TEMP_ZERO_OFFSET, TENTHS),
        warning_flags: WarningFlags::from_bits_truncate(raw[offset::WARNING_FLAGS]),
        protection_flags: ProtectionFlags::from_bits_truncate(raw[offset::PROTECTION_FLAGS]),
        fault_flags: FaultFlags::from_bits_truncate(raw[offset::FAULT_FLAGS]),
        soc_percent: raw[offset::SOC] as f64,
        soh_percent: raw[offset::SOH] as f64,
        circulate_count: raw[offset::CIRCULATE_COUNT],
        pcb_temp_c: offset_scaled(raw[offset::PCB_TEMP], TEMP_ZERO_OFFSET, TENTHS),
        history_discharge_capacity: raw[offset::HISTORY_DISCHARGE_CAPACITY],
        installed_cell_count: raw[offset::INSTALLED_CELL_COUNT],
        cell_voltages_v,
        temp_sensor_count: raw[offset::TEMP_SENSOR_COUNT],
        cell_temps_c,
        full_capacity: raw[offset::FULL_CAPACITY],
        remain_charge_time_min: raw[offset::REMAIN_CHARGE_TIME],
        remain_discharge_time_min: raw[offset::REMAIN_DISCHARGE_TIME],
        cell_uv_state: CellUvState::from_bits_retain(raw[offset::CELL_UV_STATE]),
        status: ReadStatus::Success,
        timestamp,
    })
}

/// Raw register value for a current in amps
pub fn encode_current(amps: f64) -> u16 {
    ((amps * TENTHS).round() as i32 + CURRENT_ZERO_OFFSET).clamp(0, u16::MAX as i32) as u16
}

/// Raw register value for a temperature in °C
pub fn encode_temperature(celsius: f64) -> u16 {
    ((celsius * TENTHS).round() as i32 + TEMP_ZERO_OFFSET).clamp(0, u16::MAX as i32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_block() -> Vec<u16> {
        let mut raw = vec![0u16; BLOCK_LEN];
        raw[offset::PACK_VOLTAGE] = 5000;
        raw[offset::CURRENT] = 9200;
        raw[offset::REMAINING_CAPACITY] = 1234;
        raw[offset::AVG_CELL_TEMP] = 650;
        raw[offset::AMBIENT_TEMP] = 380;
        raw[offset::WARNING_FLAGS] = 0b0000_1000_0000_0001;
        raw[offset::PROTECTION_FLAGS] = 0b0000_0000_0001_0000;
        raw[offset::FAULT_FLAGS] = 0b0000_0011_0000_0010;
        raw[offset::SOC] = 87;
        raw[offset::CIRCULATE_COUNT] = 42;
        raw[offset::SOH] = 98;
        raw[offset::PCB_TEMP] = 700;
        raw[offset::HISTORY_DISCHARGE_CAPACITY] = 321;
        raw[offset::INSTALLED_CELL_COUNT] = 16;
        for i in 0..CELL_SLOTS {
            raw[offset::CELL_VOLTAGES + i] = 3300 + i as u16;
            raw[offset::CELL_TEMPS + i] = 650;
        }
        raw[offset::TEMP_SENSOR_COUNT] = 4;
        raw[offset::FULL_CAPACITY] = 100;
        raw[offset::REMAIN_CHARGE_TIME] = 15;
        raw[offset::REMAIN_DISCHARGE_TIME] = 240;
        raw[offset::CELL_UV_STATE] = 0b1000_0000_0000_0100;
        raw
    }

    #[test]
    fn test_decode_sample_block() {
        let s = decode(&sample_block(), 3).unwrap();

        assert_eq!(s.module_id, 3);
        assert_eq!(s.status, ReadStatus::Success);
        assert_close(s.pack_voltage_v, 50.0);
        assert_close(s.current_a, -80.0);
        assert_close(s.remaining_capacity_ah, 123.4);
        assert_close(s.avg_cell_temp_c, 25.0);
        assert_close(s.ambient_temp_c, -2.0);
        assert_close(s.soc_percent, 87.0);
        assert_close(s.soh_percent, 98.0);
        assert_eq!(s.circulate_count, 42);
        assert_close(s.pcb_temp_c, 30.0);
        assert_eq!(s.history_discharge_capacity, 321);
        assert_eq!(s.installed_cell_count, 16);
        assert_close(s.cell_voltages_v[0], 3.3);
        assert_close(s.cell_voltages_v[15], 3.315);
        assert_eq!(s.temp_sensor_count, 4);
        assert_close(s.cell_temps_c[7], 25.0);
        assert_eq!(s.full_capacity, 100);
        assert_eq!(s.remain_charge_time_min, 15);
        assert_eq!(s.remain_discharge_time_min, 240);
    }

    #[test]
    fn test_decode_flag_words() {
        let s = decode(&sample_block(), 1).unwrap();

        assert_eq!(
            s.warning_flags,
            WarningFlags::CELL_OVER_VOLTAGE | WarningFlags::SOC_LOW
        );
        assert_eq!(s.protection_flags, ProtectionFlags::SHORT_CIRCUIT);
        assert_eq!(
            s.fault_flags,
            FaultFlags::TEMP_SENSOR_DISCONNECTED
                | FaultFlags::CHARGING
                | FaultFlags::DISCHARGING
        );
        assert!(s.cell_uv_state.is_under_voltage(2));
        assert!(s.cell_uv_state.is_under_voltage(15));
        assert!(!s.cell_uv_state.is_under_voltage(0));
    }

    #[test]
    fn test_undefined_flag_bits_are_dropped() {
        let mut raw = sample_block();
        // bit 5 of the protection word is reserved
        raw[offset::PROTECTION_FLAGS] = 1 << 5;
        raw[offset::WARNING_FLAGS] = 0xE000;
        let s = decode(&raw, 1).unwrap();
        assert!(s.protection_flags.is_empty());
        assert!(s.warning_flags.is_empty());
    }

    #[rstest]
    #[case(10_000, 0.0)]
    #[case(9_200, -80.0)]
    #[case(10_055, 5.5)]
    #[case(0, -1000.0)]
    fn test_current_offset(#[case] raw_current: u16, #[case] expected: f64) {
        let mut raw = sample_block();
        raw[offset::CURRENT] = raw_current;
        assert_close(decode(&raw, 1).unwrap().current_a, expected);
    }

    #[rstest]
    #[case(400, 0.0)]
    #[case(0, -40.0)]
    #[case(1650, 125.0)]
    fn test_temperature_offset(#[case] raw_temp: u16, #[case] expected: f64) {
        let mut raw = sample_block();
        raw[offset::AVG_CELL_TEMP] = raw_temp;
        assert_close(decode(&raw, 1).unwrap().avg_cell_temp_c, expected);
    }

    #[rstest]
    #[case(0)]
    #[case(50)]
    #[case(52)]
    fn test_wrong_length_is_rejected(#[case] len: usize) {
        let raw = vec![0u16; len];
        assert_eq!(
            decode(&raw, 1).unwrap_err(),
            DecodeError::LengthMismatch {
                expected: BLOCK_LEN,
                actual: len
            }
        );
    }

    #[test]
    fn test_encode_helpers_match_decoder() {
        assert_eq!(encode_current(-80.0), 9200);
        assert_eq!(encode_current(0.0), 10_000);
        assert_eq!(encode_temperature(25.0), 650);
        assert_eq!(encode_temperature(-40.0), 0);
    }

    proptest! {
        #[test]
        fn prop_decode_is_deterministic(
            raw in proptest::collection::vec(any::<u16>(), BLOCK_LEN),
            module_id in 1u8..=32,
        ) {
            let ts = Utc::now();
            let a = decode_at(&raw, module_id, ts).unwrap();
            let b = decode_at(&raw, module_id, ts).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_flag_bytes_stack(word in any::<u16>()) {
            let mut raw = vec![0u16; BLOCK_LEN];
            raw[offset::CELL_UV_STATE] = word;
            let s = decode(&raw, 1).unwrap();
            prop_assert_eq!(s.cell_uv_state.bits(), word);
        }
    }
}
