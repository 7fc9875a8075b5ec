use parking_lot::RwLock;
use tracing::{debug, warn};

use super::RackConfigSource;
use crate::domain::RackConfig;

/// Last known rack reference data, read by every sink of a cycle
#[derive(Debug)]
pub struct RackCache {
    current: RwLock<RackConfig>,
}

impl RackCache {
    pub fn new(rack: RackConfig) -> Self {
        Self {
            current: RwLock::new(rack),
        }
    }

    pub fn current(&self) -> RackConfig {
        self.current.read().clone()
    }

    /// Reload from `source`, keeping the cached copy on failure
    pub async fn reload(&self, source: &dyn RackConfigSource) -> RackConfig {
        match source.load_rack().await {
            Ok(rack) => {
                debug!(rack_id = rack.rack_id, "rack configuration reloaded");
                *self.current.write() = rack.clone();
                rack
            }
            Err(e) => {
                warn!(error = %e, "rack configuration reload failed, using cached copy");
                self.current()
            }
        }
    }
}
