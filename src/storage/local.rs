// src/storage/local.rs

//! Local store implementation.
//!
//! Keeps creatives and source state in memory with optional JSON-file
//! persistence for CLI runs:
//!
//! ```text
//! {root}/
//! ├── creatives.json        # all persisted creatives
//! └── sources.json          # per-source run state
//! ```
//!
//! Transactions clone the current table, apply their writes to the clone
//! and swap it in at commit, so readers never observe a half-applied
//! insert+deactivate pair and a dropped transaction leaves no trace.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{CreativeStatus, NormalizedCreative, SourceState};
use crate::storage::{CreativeStore, SourceStateStore, StoreTx};

/// One persisted creative row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRow {
    /// Store-assigned internal id
    pub id: u64,
    /// The creative payload
    pub creative: NormalizedCreative,
    /// First insert time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    next_id: u64,
    rows: Vec<StoredRow>,
    sources: HashMap<String, SourceState>,
}

impl Tables {
    fn find_by_key(&self, source_id: &str, external_id: &str) -> Option<usize> {
        self.rows.iter().position(|r| {
            r.creative.source_id == source_id && r.creative.external_id == external_id
        })
    }

    fn find_by_hash(&self, hash: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.creative.content_hash == hash)
    }

    fn upsert(&mut self, record: &NormalizedCreative) {
        let now = Utc::now();
        let slot = self
            .find_by_hash(&record.content_hash)
            .or_else(|| self.find_by_key(&record.source_id, &record.external_id));

        match slot {
            Some(i) => {
                self.rows[i].creative = record.clone();
                self.rows[i].updated_at = now;
            }
            None => {
                self.next_id += 1;
                self.rows.push(StoredRow {
                    id: self.next_id,
                    creative: record.clone(),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
    }
}

/// Local storage backend implementing both store traits.
#[derive(Clone)]
pub struct LocalStore {
    tables: Arc<Mutex<Tables>>,
    root_dir: Option<PathBuf>,
}

impl LocalStore {
    /// Create an in-memory store (tests, dry runs).
    pub fn in_memory() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            root_dir: None,
        }
    }

    /// Open a file-backed store rooted at the given directory, loading any
    /// previously persisted data.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir: PathBuf = root_dir.into();
        let mut tables = Tables::default();

        if let Some(rows) = read_json::<Vec<StoredRow>>(&root_dir.join("creatives.json")).await? {
            tables.next_id = rows.iter().map(|r| r.id).max().unwrap_or(0);
            tables.rows = rows;
        }
        if let Some(sources) =
            read_json::<HashMap<String, SourceState>>(&root_dir.join("sources.json")).await?
        {
            tables.sources = sources;
        }

        Ok(Self {
            tables: Arc::new(Mutex::new(tables)),
            root_dir: Some(root_dir),
        })
    }

    /// Snapshot a row by internal id (diagnostics, tests).
    pub fn row(&self, id: u64) -> Option<StoredRow> {
        let tables = self.lock();
        tables.rows.iter().find(|r| r.id == id).cloned()
    }

    /// All rows for one source, cloned out.
    pub fn rows_for_source(&self, source_id: &str) -> Vec<StoredRow> {
        let tables = self.lock();
        tables
            .rows
            .iter()
            .filter(|r| r.creative.source_id == source_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A poisoned lock means a writer panicked mid-update; propagating
        // the panic is the only sound option for an in-process store.
        self.tables.lock().expect("store lock poisoned")
    }

    async fn flush(&self) -> Result<()> {
        let Some(root) = &self.root_dir else {
            return Ok(());
        };
        let (rows, sources) = {
            let tables = self.lock();
            (tables.rows.clone(), tables.sources.clone())
        };
        write_json(&root.join("creatives.json"), &rows).await?;
        write_json(&root.join("sources.json"), &sources).await?;
        Ok(())
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_json<T: Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read JSON, returning None if the file doesn't exist.
async fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Transaction over a private clone of the tables.
struct LocalTx {
    store: LocalStore,
    shadow: Tables,
}

#[async_trait]
impl StoreTx for LocalTx {
    async fn bulk_upsert(&mut self, records: &[NormalizedCreative]) -> Result<usize> {
        for record in records {
            self.shadow.upsert(record);
        }
        Ok(records.len())
    }

    async fn bulk_update_status(
        &mut self,
        source_id: &str,
        external_ids: &[String],
        status: CreativeStatus,
    ) -> Result<usize> {
        let wanted: HashSet<&str> = external_ids.iter().map(String::as_str).collect();
        let now = Utc::now();
        let mut affected = 0;
        for row in &mut self.shadow.rows {
            if row.creative.source_id == source_id
                && wanted.contains(row.creative.external_id.as_str())
                && row.creative.status != status
            {
                row.creative.status = status;
                row.updated_at = now;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        {
            let mut tables = self.store.lock();
            *tables = std::mem::take(&mut self.shadow);
        }
        self.store.flush().await
    }
}

#[async_trait]
impl CreativeStore for LocalStore {
    async fn exists_by_hash(&self, hash: &str) -> Result<bool> {
        Ok(self.lock().find_by_hash(hash).is_some())
    }

    async fn existing_external_ids(&self, source_id: &str) -> Result<HashSet<String>> {
        let tables = self.lock();
        Ok(tables
            .rows
            .iter()
            .filter(|r| r.creative.source_id == source_id)
            .map(|r| r.creative.external_id.clone())
            .collect())
    }

    async fn local_ids_by_external(
        &self,
        source_id: &str,
        external_ids: &[String],
    ) -> Result<Vec<u64>> {
        let wanted: HashSet<&str> = external_ids.iter().map(String::as_str).collect();
        let tables = self.lock();
        Ok(tables
            .rows
            .iter()
            .filter(|r| {
                r.creative.source_id == source_id
                    && wanted.contains(r.creative.external_id.as_str())
            })
            .map(|r| r.id)
            .collect())
    }

    async fn count_for_source(&self, source_id: &str) -> Result<usize> {
        let tables = self.lock();
        Ok(tables
            .rows
            .iter()
            .filter(|r| r.creative.source_id == source_id)
            .count())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let shadow = self.lock().clone();
        Ok(Box::new(LocalTx {
            store: self.clone(),
            shadow,
        }))
    }

    async fn purge_inactive(&self, source_id: &str, older_than_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let removed = {
            let mut tables = self.lock();
            let before = tables.rows.len();
            tables.rows.retain(|r| {
                !(r.creative.source_id == source_id
                    && r.creative.status == CreativeStatus::Inactive
                    && r.updated_at < cutoff)
            });
            before - tables.rows.len()
        };
        self.flush().await?;
        Ok(removed)
    }
}

#[async_trait]
impl SourceStateStore for LocalStore {
    async fn load(&self, source_id: &str) -> Result<Option<SourceState>> {
        Ok(self.lock().sources.get(source_id).cloned())
    }

    async fn save(&self, state: &SourceState) -> Result<()> {
        {
            let mut tables = self.lock();
            let mut stamped = state.clone();
            stamped.updated_at = Utc::now();
            tables.sources.insert(state.source_id.clone(), stamped);
        }
        self.flush().await
    }
}

#[cfg(test)]
impl LocalStore {
    /// Insert source state verbatim, without stamping `updated_at`.
    pub(crate) fn insert_state_raw(&self, state: SourceState) {
        self.lock().sources.insert(state.source_id.clone(), state);
    }
}
