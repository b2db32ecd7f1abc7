use async_trait::async_trait;
use relaycore::{
    apply_status_update, RunId, RunMode, RunRecord, RunStatus, RunStore, StoreError, WorkflowId,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Run records kept in process memory
#[derive(Default)]
pub struct InMemoryRunStore {
    records: RwLock<HashMap<RunId, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(
        &self,
        workflow_id: WorkflowId,
        mode: RunMode,
        status: RunStatus,
        metadata: Map<String, Value>,
    ) -> Result<RunRecord, StoreError> {
        let record = RunRecord::new(workflow_id, mode, status, metadata);
        self.records
            .write()
            .await
            .insert(record.run_id, record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        extra: Map<String, Value>,
    ) -> Result<RunRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&run_id)
            .ok_or(StoreError::NotFound(run_id))?;
        apply_status_update(record, status, extra)?;
        Ok(record.clone())
    }

    async fn find_by_id(&self, run_id: RunId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.records.read().await.get(&run_id).cloned())
    }

    async fn find_by_workflow(&self, workflow_id: WorkflowId) -> Result<Vec<RunRecord>, StoreError> {
        let records = self.records.read().await;
        let mut runs: Vec<RunRecord> = records
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }
}

/// One pretty-printed JSON file per run inside a directory
pub struct JsonFileRunStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on the files
    write_lock: Mutex<()>,
}

impl JsonFileRunStore {
    /// Open (and create if needed) the directory holding run files
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    async fn read(&self, run_id: RunId) -> Result<Option<RunRecord>, StoreError> {
        match tokio::fs::read(self.path_for(run_id)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, record: &RunRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_vec_pretty(record)?;
        let path = self.path_for(record.run_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for JsonFileRunStore {
    async fn create(
        &self,
        workflow_id: WorkflowId,
        mode: RunMode,
        status: RunStatus,
        metadata: Map<String, Value>,
    ) -> Result<RunRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let record = RunRecord::new(workflow_id, mode, status, metadata);
        self.write(&record).await?;
        Ok(record)
    }

    async fn update_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        extra: Map<String, Value>,
    ) -> Result<RunRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read(run_id).await?.ok_or(StoreError::NotFound(run_id))?;
        apply_status_update(&mut record, status, extra)?;
        self.write(&record).await?;
        Ok(record)
    }

    async fn find_by_id(&self, run_id: RunId) -> Result<Option<RunRecord>, StoreError> {
        self.read(run_id).await
    }

    async fn find_by_workflow(&self, workflow_id: WorkflowId) -> Result<Vec<RunRecord>, StoreError> {
        let mut runs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<RunRecord>(&raw) {
                Ok(record) if record.workflow_id == workflow_id => runs.push(record),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable run file {}: {}", path.display(), e),
            }
        }

        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }
}
