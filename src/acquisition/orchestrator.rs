use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::domain::{BatchResult, ModuleSnapshot};
use crate::modbus::ModuleSource;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("no module result could be salvaged out of {modules} read tasks")]
    NothingSalvaged { modules: usize },
}

/// Reads every configured module once per cycle
pub struct AcquisitionOrchestrator {
    source: Arc<dyn ModuleSource>,
    module_ids: Vec<u8>,
}

impl AcquisitionOrchestrator {
    pub fn new(source: Arc<dyn ModuleSource>, module_ids: impl IntoIterator<Item = u8>) -> Self {
        Self {
            source,
            module_ids: module_ids.into_iter().collect(),
        }
    }

    pub fn module_ids(&self) -> &[u8] {
        &self.module_ids
    }

    /// Issue every module read at once and collect each task on its own.
    ///
    /// The bus lock serializes the reads. A task that panics or gets
    /// cancelled is reported as a failed module; the cycle only fails when
    /// not a single task produced a snapshot.
    pub async fn run_cycle(&self) -> Result<BatchResult, AcquisitionError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("cycle", %cycle_id);

        async {
            let tasks: Vec<(u8, JoinHandle<ModuleSnapshot>)> = self
                .module_ids
                .iter()
                .map(|&module_id| {
                    let source = Arc::clone(&self.source);
                    let task = tokio::spawn(
                        async move { source.read_module(module_id).await }
                            .instrument(info_span!("module", module_id)),
                    );
                    (module_id, task)
                })
                .collect();

            let mut snapshots = Vec::with_capacity(tasks.len());
            let mut salvaged = 0usize;
            for (module_id, task) in tasks {
                match task.await {
                    Ok(snapshot) => {
                        salvaged += 1;
                        snapshots.push(snapshot);
                    }
                    Err(e) => {
                        error!(module_id, error = %e, "module read task aborted");
                        snapshots.push(ModuleSnapshot::failed(module_id));
                    }
                }
            }

            if salvaged == 0 {
                error!(modules = self.module_ids.len(), "polling cycle produced no results");
                return Err(AcquisitionError::NothingSalvaged {
                    modules: self.module_ids.len(),
                });
            }

            let batch = BatchResult::new(cycle_id, started_at, snapshots);
            info!(
                total = batch.summary.total,
                success = batch.summary.success,
                failed = batch.summary.failed,
                elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
                "polling cycle complete"
            );
            Ok(batch)
        }
        .instrument(span)
        .await
    }
}
