use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use std::io;
use tokio::sync::Mutex;
use tokio_modbus::client::{rtu, Context};
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tracing::info;

use super::RegisterTransport;
use crate::config::{BusConfig, SerialParity};

/// Modbus RTU client on a serial line
pub struct RtuTransport {
    context: Mutex<Context>,
}

impl RtuTransport {
    /// Open the serial port and attach an RTU client context to it
    pub fn open(cfg: &BusConfig) -> Result<Self> {
        let builder = tokio_serial::new(&cfg.port_path, cfg.baud_rate)
            .data_bits(data_bits(cfg.data_bits)?)
            .stop_bits(stop_bits(cfg.stop_bits)?)
            .parity(parity(cfg.parity));

        let port = SerialStream::open(&builder)
            .with_context(|| format!("Failed to open serial port {}", cfg.port_path))?;

        info!(
            port = %cfg.port_path,
            baud_rate = cfg.baud_rate,
            "serial bus opened"
        );

        // unit is re-selected before every request
        let ctx = rtu::attach_slave(port, Slave(1));

        Ok(Self {
            context: Mutex::new(ctx),
        })
    }
}

#[async_trait]
impl RegisterTransport for RtuTransport {
    async fn select_target(&self, unit: u8) -> io::Result<()> {
        self.context.lock().await.set_slave(Slave(unit));
        Ok(())
    }

    async fn read_input_registers(&self, start: u16, count: u16) -> io::Result<Vec<u16>> {
        self.context
            .lock()
            .await
            .read_input_registers(start, count)
            .await
    }
}

fn parity(parity: SerialParity) -> Parity {
    match parity {
        SerialParity::None => Parity::None,
        SerialParity::Odd => Parity::Odd,
        SerialParity::Even => Parity::Even,
    }
}

fn data_bits(bits: u8) -> Result<DataBits> {
    Ok(match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        other => anyhow::bail!("unsupported data bits: {other}"),
    })
}

fn stop_bits(bits: u8) -> Result<StopBits> {
    Ok(match bits {
        1 => StopBits::One,
        2 => StopBits::Two,
        other => anyhow::bail!("unsupported stop bits: {other}"),
    })
}
