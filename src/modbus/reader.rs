use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, warn};

use super::bus_lock::BusLock;
use super::decoder::{self, BLOCK_BASE_ADDRESS, BLOCK_LEN};
use super::error::BusError;
use super::metrics::BusMetrics;
use super::transport::RegisterTransport;
use crate::domain::ModuleSnapshot;

/// Something that can produce one module's snapshot per cycle
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Never fails; an unreachable module yields a `Failed` snapshot
    async fn read_module(&self, module_id: u8) -> ModuleSnapshot;
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub base_address: u16,
    pub unit_id_offset: u8,
    pub request_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before retry n is `n * backoff_step`
    pub backoff_step: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            base_address: BLOCK_BASE_ADDRESS,
            unit_id_offset: 0,
            request_timeout: Duration::from_secs(2),
            max_retries: 3,
            backoff_step: Duration::from_secs(1),
        }
    }
}

/// Reads the telemetry block of one module over the shared bus
pub struct ModuleReader {
    transport: Arc<dyn RegisterTransport>,
    lock: BusLock,
    metrics: Arc<BusMetrics>,
    config: ReaderConfig,
}

impl ModuleReader {
    pub fn new(
        transport: Arc<dyn RegisterTransport>,
        lock: BusLock,
        metrics: Arc<BusMetrics>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            transport,
            lock,
            metrics,
            config,
        }
    }

    fn unit_address(&self, module_id: u8) -> u8 {
        module_id.wrapping_add(self.config.unit_id_offset)
    }

    /// One locked transaction: select, read, decode
    async fn transaction(&self, module_id: u8) -> Result<ModuleSnapshot, BusError> {
        let unit = self.unit_address(module_id);
        let lease = self.lock.acquire(module_id).await?;

        let started = Instant::now();
        let response = timeout(self.config.request_timeout, async {
            self.transport.select_target(unit).await?;
            self.transport
                .read_input_registers(self.config.base_address, BLOCK_LEN as u16)
                .await
        })
        .await;
        let elapsed = started.elapsed();
        self.lock.release(lease);

        let registers = match response {
            Ok(Ok(registers)) => registers,
            Ok(Err(source)) => {
                self.metrics.record_failure(elapsed);
                return Err(BusError::Transport { unit, source });
            }
            Err(_) => {
                self.metrics.record_failure(elapsed);
                return Err(BusError::RequestTimeout {
                    unit,
                    timeout_ms: self.config.request_timeout.as_millis() as u64,
                });
            }
        };

        match decoder::decode(&registers, module_id) {
            Ok(snapshot) => {
                self.metrics.record_success(elapsed);
                Ok(snapshot)
            }
            Err(source) => {
                self.metrics.record_failure(elapsed);
                Err(BusError::Decode { module_id, source })
            }
        }
    }
}

#[async_trait]
impl ModuleSource for ModuleReader {
    async fn read_module(&self, module_id: u8) -> ModuleSnapshot {
        let max_attempts = self.config.max_retries + 1;

        for attempt in 1..=max_attempts {
            match self.transaction(module_id).await {
                Ok(snapshot) => {
                    if attempt > 1 {
                        debug!(module_id, attempt, "module read succeeded after retry");
                    }
                    return snapshot;
                }
                Err(e) => {
                    warn!(module_id, attempt, error = %e, "module read failed");
                    if attempt < max_attempts {
                        sleep(self.config.backoff_step * attempt).await;
                    }
                }
            }
        }

        error!(
            module_id,
            attempts = max_attempts,
            "module unreachable, reporting zeroed snapshot"
        );
        ModuleSnapshot::failed(module_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReadStatus, CELL_SLOTS};
    use crate::modbus::bus_lock::BusLockConfig;
    use crate::modbus::decoder::offset;
    use crate::modbus::transport::MockRegisterTransport;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn block() -> Vec<u16> {
        let mut raw = vec![0u16; BLOCK_LEN];
        raw[offset::PACK_VOLTAGE] = 5300;
        raw[offset::CURRENT] = 10_000;
        raw[offset::SOC] = 64;
        raw[offset::INSTALLED_CELL_COUNT] = 16;
        for i in 0..CELL_SLOTS {
            raw[offset::CELL_VOLTAGES + i] = 3312;
        }
        raw
    }

    fn no_response() -> io::Error {
        io::Error::new(io::ErrorKind::TimedOut, "no response")
    }

    fn reader(mock: MockRegisterTransport) -> (ModuleReader, BusLock, Arc<BusMetrics>) {
        let lock = BusLock::new(BusLockConfig::default());
        let metrics = Arc::new(BusMetrics::new());
        let reader = ModuleReader::new(
            Arc::new(mock),
            lock.clone(),
            Arc::clone(&metrics),
            ReaderConfig::default(),
        );
        (reader, lock, metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_read() {
        let mut mock = MockRegisterTransport::new();
        mock.expect_select_target()
            .withf(|unit| *unit == 4)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_read_input_registers()
            .withf(|start, count| *start == 0x0FFF && *count == 51)
            .times(1)
            .returning(|_, _| Ok(block()));

        let (reader, lock, metrics) = reader(mock);
        let snapshot = reader.read_module(4).await;

        assert_eq!(snapshot.status, ReadStatus::Success);
        assert_eq!(snapshot.module_id, 4);
        assert!((snapshot.pack_voltage_v - 53.0).abs() < 1e-9);
        assert!(!lock.is_locked());

        let stats = metrics.snapshot();
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_id_offset_applied() {
        let mut mock = MockRegisterTransport::new();
        mock.expect_select_target()
            .withf(|unit| *unit == 12)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_read_input_registers()
            .returning(|_, _| Ok(block()));

        let reader = ModuleReader::new(
            Arc::new(mock),
            BusLock::new(BusLockConfig::default()),
            Arc::new(BusMetrics::new()),
            ReaderConfig {
                unit_id_offset: 10,
                ..Default::default()
            },
        );
        assert!(reader.read_module(2).await.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut mock = MockRegisterTransport::new();
        mock.expect_select_target().returning(|_| Ok(()));
        mock.expect_read_input_registers().returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(no_response())
            } else {
                Ok(block())
            }
        });

        let (reader, _lock, metrics) = reader(mock);
        let started = Instant::now();
        let snapshot = reader.read_module(1).await;

        assert!(snapshot.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // backoff 1s + 2s
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));

        let stats = metrics.snapshot();
        assert_eq!(stats.failed_requests, 2);
        assert_eq!(stats.successful_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_yield_failed_snapshot() {
        let mut mock = MockRegisterTransport::new();
        mock.expect_select_target().returning(|_| Ok(()));
        mock.expect_read_input_registers()
            .times(4)
            .returning(|_, _| Err(no_response()));

        let (reader, lock, metrics) = reader(mock);
        let started = Instant::now();
        let snapshot = reader.read_module(7).await;

        assert_eq!(snapshot, ModuleSnapshot::failed_at(7, snapshot.timestamp));
        assert_eq!(snapshot.status, ReadStatus::Failed);
        // backoff 1s + 2s + 3s
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(!lock.is_locked());
        assert_eq!(metrics.snapshot().failed_requests, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_block_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut mock = MockRegisterTransport::new();
        mock.expect_select_target().returning(|_| Ok(()));
        mock.expect_read_input_registers().returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec![0u16; 50])
            } else {
                Ok(block())
            }
        });

        let (reader, _lock, _metrics) = reader(mock);
        assert!(reader.read_module(1).await.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_timeout_counts_as_attempt() {
        let mut mock = MockRegisterTransport::new();
        mock.expect_select_target().returning(|_| Ok(()));
        mock.expect_read_input_registers()
            .times(1)
            .returning(|_, _| Ok(block()));

        let (reader, lock, _metrics) = reader(mock);
        let foreign = lock.acquire(99).await.unwrap();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            drop(foreign);
        });

        let started = Instant::now();
        let snapshot = reader.read_module(1).await;

        assert!(snapshot.is_success());
        // first attempt waited 1s for the lock, then backed off 1s
        assert!(started.elapsed() >= Duration::from_millis(2500));
    }

    struct StalledTransport;

    #[async_trait]
    impl RegisterTransport for StalledTransport {
        async fn select_target(&self, _unit: u8) -> io::Result<()> {
            Ok(())
        }

        async fn read_input_registers(&self, _start: u16, _count: u16) -> io::Result<Vec<u16>> {
            sleep(Duration::from_secs(60)).await;
            Ok(block())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_releases_bus() {
        let lock = BusLock::new(BusLockConfig::default());
        let metrics = Arc::new(BusMetrics::new());
        let reader = ModuleReader::new(
            Arc::new(StalledTransport),
            lock.clone(),
            Arc::clone(&metrics),
            ReaderConfig {
                max_retries: 1,
                ..Default::default()
            },
        );

        let started = Instant::now();
        let snapshot = reader.read_module(1).await;

        assert_eq!(snapshot.status, ReadStatus::Failed);
        // two 2s timeouts and one 1s backoff
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
        assert!(!lock.is_locked());
        assert_eq!(metrics.snapshot().failed_requests, 2);
    }
}
