//! # Serial bus lock
//!
//! The RS-485 line is half-duplex and shared by every battery module, so only
//! one register transaction may be in flight at a time. [`BusLock`] hands out
//! [`BusLease`] tokens for that:
//!
//! - `acquire` polls at a fixed interval for a bounded number of attempts and
//!   then fails with [`BusError::LockTimeout`] naming the waiting module.
//! - Dropping the lease releases the bus, so every exit path of a
//!   transaction gives the line back.
//! - Each lease arms an expiry timer. If the holder hangs past `lease_ttl` the
//!   timer frees the bus. The timer is aborted on release and only ever frees
//!   the generation it was armed for, so it cannot release a newer holder.
//!
//! Waiters are served in whatever order their polls land; there is no queue.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::error::BusError;

/// Bus lock timing
#[derive(Debug, Clone, Copy)]
pub struct BusLockConfig {
    /// Delay between two acquisition attempts
    pub poll_interval: Duration,
    /// Number of re-polls before giving up
    pub max_attempts: u32,
    /// Hard expiry of a lease
    pub lease_ttl: Duration,
}

impl Default for BusLockConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 10,
            lease_ttl: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Holder {
    generation: u64,
    owner: u8,
}

#[derive(Debug, Default)]
struct LockState {
    holder: Option<Holder>,
    next_generation: u64,
}

/// Releases the bus if `generation` still holds it. Returns whether it did.
fn release_generation(state: &Mutex<LockState>, generation: u64) -> bool {
    let mut st = state.lock();
    match st.holder {
        Some(holder) if holder.generation == generation => {
            st.holder = None;
            true
        }
        _ => false,
    }
}

/// Exclusive access guard for the shared serial transport
#[derive(Debug, Clone)]
pub struct BusLock {
    state: Arc<Mutex<LockState>>,
    config: BusLockConfig,
}

impl BusLock {
    pub fn new(config: BusLockConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(LockState::default())),
            config,
        }
    }

    /// Wait for the bus on behalf of module `owner`
    pub async fn acquire(&self, owner: u8) -> Result<BusLease, BusError> {
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            if let Some(lease) = self.try_acquire(owner) {
                debug!(
                    module_id = owner,
                    generation = lease.generation,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "bus lease acquired"
                );
                return Ok(lease);
            }

            if attempts >= self.config.max_attempts {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(
                    module_id = owner,
                    holder = ?self.holder(),
                    waited_ms,
                    "bus lock acquisition timed out"
                );
                return Err(BusError::LockTimeout { owner, waited_ms });
            }

            attempts += 1;
            sleep(self.config.poll_interval).await;
        }
    }

    /// Take the bus if it is free right now
    pub fn try_acquire(&self, owner: u8) -> Option<BusLease> {
        let generation = {
            let mut st = self.state.lock();
            if st.holder.is_some() {
                return None;
            }
            st.next_generation += 1;
            let generation = st.next_generation;
            st.holder = Some(Holder { generation, owner });
            generation
        };

        let ttl = self.config.lease_ttl;
        let state = Arc::clone(&self.state);
        let expiry = tokio::spawn(async move {
            sleep(ttl).await;
            if release_generation(&state, generation) {
                warn!(
                    module_id = owner,
                    generation,
                    ttl_ms = ttl.as_millis() as u64,
                    "bus lease expired, forcing release"
                );
            }
        });

        Some(BusLease {
            owner,
            generation,
            acquired_at: Instant::now(),
            state: Arc::clone(&self.state),
            expiry,
        })
    }

    /// Give the bus back. Same as dropping the lease.
    pub fn release(&self, lease: BusLease) {
        drop(lease);
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().holder.is_some()
    }

    /// Module currently holding the bus
    pub fn holder(&self) -> Option<u8> {
        self.state.lock().holder.map(|h| h.owner)
    }
}

/// Ownership token for one bus transaction
#[derive(Debug)]
pub struct BusLease {
    owner: u8,
    generation: u64,
    acquired_at: Instant,
    state: Arc<Mutex<LockState>>,
    expiry: JoinHandle<()>,
}

impl BusLease {
    pub fn owner(&self) -> u8 {
        self.owner
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// True once the expiry timer has taken the bus away from this lease
    pub fn is_expired(&self) -> bool {
        !matches!(
            self.state.lock().holder,
            Some(holder) if holder.generation == self.generation
        )
    }
}

impl Drop for BusLease {
    fn drop(&mut self) {
        self.expiry.abort();
        if release_generation(&self.state, self.generation) {
            debug!(
                module_id = self.owner,
                generation = self.generation,
                held_ms = self.held_for().as_millis() as u64,
                "bus lease released"
            );
        } else {
            warn!(
                module_id = self.owner,
                generation = self.generation,
                "bus lease was already force-released"
            );
        }
    }
}
