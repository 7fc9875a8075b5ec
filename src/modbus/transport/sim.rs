use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::io;
use std::time::Duration;

use super::RegisterTransport;
use crate::domain::{FaultFlags, CELL_SLOTS};
use crate::modbus::decoder::{encode_current, encode_temperature, offset, BLOCK_BASE_ADDRESS, BLOCK_LEN};

const NOMINAL_CELL_MV: u16 = 3300;
const CELL_SPREAD_MV: u16 = 50;
const CELLS_PER_MODULE: u16 = 16;
const TEMP_SENSORS: u16 = 4;

#[derive(Debug)]
struct SimState {
    selected: Option<u8>,
    rng: StdRng,
    offline: HashSet<u8>,
    current_a: f64,
}

/// Register transport that synthesises plausible BMS telemetry blocks
#[derive(Debug)]
pub struct SimulatedTransport {
    state: Mutex<SimState>,
    latency: Duration,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible register values
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(SimState {
                selected: None,
                rng,
                offline: HashSet::new(),
                current_a: 0.0,
            }),
            latency: Duration::from_millis(20),
        }
    }

    /// Pack current reported by every module (negative = discharge)
    pub fn set_current(&self, amps: f64) {
        self.state.lock().current_a = amps;
    }

    /// Make `unit` stop answering, or bring it back
    pub fn set_offline(&self, unit: u8, offline: bool) {
        let mut st = self.state.lock();
        if offline {
            st.offline.insert(unit);
        } else {
            st.offline.remove(&unit);
        }
    }

    fn block_for(st: &mut SimState, unit: u8) -> Vec<u16> {
        let mut raw = vec![0u16; BLOCK_LEN];
        let base_mv = NOMINAL_CELL_MV + (unit as u16 % 5) * 10;

        let mut cell_sum_mv: u32 = 0;
        for i in 0..CELL_SLOTS {
            let mv = if (i as u16) < CELLS_PER_MODULE {
                base_mv - CELL_SPREAD_MV + st.rng.gen_range(0..=2 * CELL_SPREAD_MV)
            } else {
                0
            };
            cell_sum_mv += mv as u32;
            raw[offset::CELL_VOLTAGES + i] = mv;
        }

        let avg_temp: f64 = st.rng.gen_range(20.0..40.0);
        for i in 0..CELL_SLOTS {
            raw[offset::CELL_TEMPS + i] = if (i as u16) < TEMP_SENSORS {
                encode_temperature(avg_temp + st.rng.gen_range(-1.0..1.0))
            } else {
                0
            };
        }

        let soc: u16 = st.rng.gen_range(20..=80);
        let mut fault = FaultFlags::CHARGE_MOS_CONNECTED | FaultFlags::DISCHARGE_MOS_CONNECTED;
        if st.current_a < 0.0 {
            fault |= FaultFlags::DISCHARGING;
        } else if st.current_a > 0.0 {
            fault |= FaultFlags::CHARGING;
        }

        raw[offset::PACK_VOLTAGE] = (cell_sum_mv / 10) as u16;
        raw[offset::CURRENT] = encode_current(st.current_a);
        raw[offset::REMAINING_CAPACITY] = soc * 10;
        raw[offset::AVG_CELL_TEMP] = encode_temperature(avg_temp);
        raw[offset::AMBIENT_TEMP] = encode_temperature(st.rng.gen_range(18.0..28.0));
        raw[offset::FAULT_FLAGS] = fault.bits();
        raw[offset::SOC] = soc;
        raw[offset::CIRCULATE_COUNT] = 120 + unit as u16;
        raw[offset::SOH] = st.rng.gen_range(80..=100);
        raw[offset::PCB_TEMP] = encode_temperature(avg_temp + 5.0);
        raw[offset::HISTORY_DISCHARGE_CAPACITY] = 1000;
        raw[offset::INSTALLED_CELL_COUNT] = CELLS_PER_MODULE;
        raw[offset::TEMP_SENSOR_COUNT] = TEMP_SENSORS;
        raw[offset::FULL_CAPACITY] = 100;
        raw[offset::REMAIN_CHARGE_TIME] = (100 - soc) * 2;
        raw[offset::REMAIN_DISCHARGE_TIME] = soc * 6;
        raw
    }
}

#[async_trait]
impl RegisterTransport for SimulatedTransport {
    async fn select_target(&self, unit: u8) -> io::Result<()> {
        self.state.lock().selected = Some(unit);
        Ok(())
    }

    async fn read_input_registers(&self, start: u16, count: u16) -> io::Result<Vec<u16>> {
        tokio::time::sleep(self.latency).await;

        let mut st = self.state.lock();
        let unit = st
            .selected
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no unit selected"))?;

        if st.offline.contains(&unit) {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("unit {unit} did not respond"),
            ));
        }

        let block = Self::block_for(&mut st, unit);
        let from = start.wrapping_sub(BLOCK_BASE_ADDRESS) as usize;
        let to = from + count as usize;
        if start < BLOCK_BASE_ADDRESS || to > BLOCK_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("illegal data address {start:#06x}+{count}"),
            ));
        }
        Ok(block[from..to].to_vec())
    }
}
