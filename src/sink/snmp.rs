//! OID-keyed value cache read by the SNMP agent.
//!
//! Layout below the enterprise prefix, per module `m`:
//!
//! | OID | Content |
//! |---|---|
//! | `m.1.{1..16}` | cell voltage, mV |
//! | `m.2.{1..14}` | pack information |
//! | `m.3.{1..11}` | alarm indicators and raw flag words |
//! | `m.4.{1..6}` | alarm thresholds |
//!
//! Temperatures are in 0.1 °C, currents in 0.1 A, voltages in 0.01 V unless
//! noted. A module that failed to read publishes zeros.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::TelemetrySink;
use crate::alarms::VOLTAGE_MARGIN;
use crate::domain::{
    BatchResult, DischargePhase, ModuleSnapshot, ProtectionFlags, RackConfig, StackedBytes,
    WarningFlags, CELL_SLOTS,
};
use crate::repo::RackCache;

pub const DEFAULT_ENTERPRISE_OID: &str = "1.3.6.1.4.1.64016";

const GROUP_CELLS: u32 = 1;
const GROUP_PACK: u32 = 2;
const GROUP_ALARMS: u32 = 3;
const GROUP_PARAMS: u32 = 4;

const SOC_LOW_ALARM_PERCENT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SnmpValue {
    Gauge(u32),
    Integer(i32),
}

impl SnmpValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            SnmpValue::Gauge(v) => *v as i64,
            SnmpValue::Integer(v) => *v as i64,
        }
    }
}

fn gauge(value: f64) -> SnmpValue {
    SnmpValue::Gauge(value.round().max(0.0) as u32)
}

fn integer(value: f64) -> SnmpValue {
    SnmpValue::Integer(value.round() as i32)
}

fn flag(set: bool) -> SnmpValue {
    SnmpValue::Gauge(set as u32)
}

pub struct SnmpValueCache {
    enterprise_oid: String,
    rack: Arc<RackCache>,
    values: RwLock<BTreeMap<String, SnmpValue>>,
}

impl SnmpValueCache {
    /// Threshold OIDs follow whatever `rack` holds when a batch arrives
    pub fn new(enterprise_oid: impl Into<String>, rack: Arc<RackCache>) -> Self {
        Self {
            enterprise_oid: enterprise_oid.into(),
            rack,
            values: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn oid(&self, module_id: u8, group: u32, index: u32) -> String {
        format!("{}.{}.{}.{}", self.enterprise_oid, module_id, group, index)
    }

    pub fn get(&self, oid: &str) -> Option<SnmpValue> {
        self.values.read().get(oid).copied()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every published OID with its value
    pub fn entries(&self) -> Vec<(String, SnmpValue)> {
        self.values
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    fn module_values(&self, s: &ModuleSnapshot, rack: &RackConfig) -> Vec<(String, SnmpValue)> {
        let m = s.module_id;
        let mut out = Vec::with_capacity(CELL_SLOTS + 30);

        for (i, volts) in s.cell_voltages_v.iter().enumerate() {
            out.push((self.oid(m, GROUP_CELLS, i as u32 + 1), gauge(volts * 1000.0)));
        }

        let installed = s.installed_cell_voltages();
        let (max_v, min_v, avg_v, sum_v) = if installed.is_empty() {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let sum: f64 = installed.iter().sum();
            (
                installed.iter().copied().fold(f64::MIN, f64::max),
                installed.iter().copied().fold(f64::MAX, f64::min),
                sum / installed.len() as f64,
                sum,
            )
        };

        let pack = [
            gauge(max_v * 1000.0),
            gauge(min_v * 1000.0),
            gauge(avg_v * 1000.0),
            integer(s.avg_cell_temp_c * 10.0),
            integer(s.ambient_temp_c * 10.0),
            gauge(sum_v * 100.0),
            gauge(s.pack_voltage_v * 100.0),
            gauge(s.current_a.max(0.0) * 10.0),
            gauge((-s.current_a).max(0.0) * 10.0),
            gauge(s.soc_percent),
            gauge(s.soh_percent),
            SnmpValue::Gauge(s.full_capacity as u32),
            gauge(s.remaining_capacity_ah * 10.0),
            SnmpValue::Gauge(s.fault_flags.word() as u32),
        ];
        for (i, value) in pack.into_iter().enumerate() {
            out.push((self.oid(m, GROUP_PACK, i as u32 + 1), value));
        }

        let w = s.warning_flags;
        let p = s.protection_flags;
        let alarms = [
            (
                1,
                flag(w.contains(WarningFlags::CELL_OVER_VOLTAGE)
                    || p.contains(ProtectionFlags::CELL_OVER_VOLTAGE)),
            ),
            (
                2,
                flag(w.contains(WarningFlags::CELL_UNDER_VOLTAGE)
                    || p.contains(ProtectionFlags::CELL_UNDER_VOLTAGE)
                    || !s.cell_uv_state.is_empty()),
            ),
            (3, SnmpValue::Gauge(w.word() as u32)),
            (4, SnmpValue::Gauge(p.word() as u32)),
            (5, SnmpValue::Gauge(s.fault_flags.word() as u32)),
            (6, SnmpValue::Gauge(s.cell_uv_state.word() as u32)),
            (
                7,
                flag(w.contains(WarningFlags::PACK_OVER_VOLTAGE)
                    || p.contains(ProtectionFlags::PACK_OVER_VOLTAGE)),
            ),
            (
                8,
                flag(w.contains(WarningFlags::PACK_UNDER_VOLTAGE)
                    || p.contains(ProtectionFlags::PACK_UNDER_VOLTAGE)),
            ),
            (
                9,
                flag(w.contains(WarningFlags::CHARGE_OVER_CURRENT)
                    || p.contains(ProtectionFlags::CHARGE_OVER_CURRENT)),
            ),
            (
                10,
                flag(w.contains(WarningFlags::DISCHARGE_OVER_CURRENT)
                    || p.contains(ProtectionFlags::DISCHARGE_OVER_CURRENT)),
            ),
            (11, flag(w.contains(WarningFlags::SOC_LOW))),
        ];
        for (index, value) in alarms {
            out.push((self.oid(m, GROUP_ALARMS, index), value));
        }

        let params = [
            (1, gauge((rack.high_voltage + VOLTAGE_MARGIN) * 1000.0)),
            (2, gauge(rack.high_voltage * 1000.0)),
            (3, gauge((rack.low_voltage - VOLTAGE_MARGIN) * 1000.0)),
            (4, gauge(rack.low_voltage * 1000.0)),
            (6, SnmpValue::Gauge(SOC_LOW_ALARM_PERCENT)),
        ];
        for (index, value) in params {
            out.push((self.oid(m, GROUP_PARAMS, index), value));
        }

        out
    }

    pub fn update(&self, batch: &BatchResult, phase: DischargePhase) {
        let rack = self.rack.current();
        let mut fresh: Vec<(String, SnmpValue)> = batch
            .modules
            .values()
            .flat_map(|s| self.module_values(s, &rack))
            .collect();

        fresh.push((
            format!("{}.0.1", self.enterprise_oid),
            SnmpValue::Integer(phase.code()),
        ));
        fresh.push((
            format!("{}.0.2", self.enterprise_oid),
            SnmpValue::Gauge(batch.summary.success as u32),
        ));
        fresh.push((
            format!("{}.0.3", self.enterprise_oid),
            SnmpValue::Gauge(batch.summary.failed as u32),
        ));

        let mut values = self.values.write();
        values.extend(fresh);
    }
}

#[async_trait]
impl TelemetrySink for SnmpValueCache {
    fn name(&self) -> &'static str {
        "snmp"
    }

    async fn on_batch_result(&self, batch: &BatchResult, phase: DischargePhase) -> Result<()> {
        self.update(batch, phase);
        Ok(())
    }
}
