use crate::{RunId, RunMode, RunRecord, RunStatus, StoreError, WorkflowId};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Persistence for run records
///
/// Implementations must keep status monotonic: once a record is terminal,
/// only repeated updates with the same status are accepted (and merge
/// their metadata); anything else is `StoreError::InvalidTransition`.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(
        &self,
        workflow_id: WorkflowId,
        mode: RunMode,
        status: RunStatus,
        metadata: Map<String, Value>,
    ) -> Result<RunRecord, StoreError>;

    /// Set the status and merge `extra` into the stored metadata
    async fn update_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        extra: Map<String, Value>,
    ) -> Result<RunRecord, StoreError>;

    async fn find_by_id(&self, run_id: RunId) -> Result<Option<RunRecord>, StoreError>;

    async fn find_by_workflow(&self, workflow_id: WorkflowId) -> Result<Vec<RunRecord>, StoreError>;
}

/// Apply a status update to a record in place, enforcing monotonic status
pub fn apply_status_update(
    record: &mut RunRecord,
    status: RunStatus,
    extra: Map<String, Value>,
) -> Result<(), StoreError> {
    if record.status != status {
        if !record.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                run_id: record.run_id,
                from: record.status,
                to: status,
            });
        }
        record.status = status;
        if status.is_terminal() {
            record.completed_at = Some(chrono::Utc::now());
        }
    }
    record.metadata.extend(extra);
    Ok(())
}
