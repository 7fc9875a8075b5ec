//! Register transaction primitive used by the module reader.
//!
//! Framing and CRC live below this trait (`tokio-modbus` for real hardware).

use async_trait::async_trait;
use std::io;
use std::sync::Arc;

use crate::config::{BusConfig, TransportKind};

#[cfg(feature = "modbus")]
pub mod rtu;
#[cfg(feature = "sim")]
pub mod sim;

#[cfg(feature = "modbus")]
pub use rtu::RtuTransport;
#[cfg(feature = "sim")]
pub use sim::SimulatedTransport;

/// One physical bus. Callers must hold the bus lease while using it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegisterTransport: Send + Sync {
    /// Address subsequent requests to `unit`
    async fn select_target(&self, unit: u8) -> io::Result<()>;

    /// Read `count` input registers starting at `start` from the selected unit
    async fn read_input_registers(&self, start: u16, count: u16) -> io::Result<Vec<u16>>;
}

/// Build the transport selected in the bus configuration
pub fn build_transport(cfg: &BusConfig) -> anyhow::Result<Arc<dyn RegisterTransport>> {
    match cfg.transport {
        TransportKind::Simulated => {
            #[cfg(feature = "sim")]
            {
                tracing::info!(
                    offline_units = ?cfg.simulated_offline_units,
                    "using simulated register transport"
                );
                let transport = SimulatedTransport::new();
                for unit in &cfg.simulated_offline_units {
                    transport.set_offline(*unit, true);
                }
                Ok(Arc::new(transport))
            }
            #[cfg(not(feature = "sim"))]
            {
                anyhow::bail!("simulated transport requested but the `sim` feature is disabled")
            }
        }
        TransportKind::Rtu => {
            #[cfg(feature = "modbus")]
            {
                Ok(Arc::new(RtuTransport::open(cfg)?))
            }
            #[cfg(not(feature = "modbus"))]
            {
                anyhow::bail!("RTU transport requested but the `modbus` feature is disabled")
            }
        }
    }
}
