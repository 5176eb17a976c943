//! In-memory [`Store`] implementation for tests.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`, which keeps
//! insertion order for [`find_all`](Store::find_all).

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::ProjectRecord;

use super::Store;

pub struct InMemoryStore {
    records: RwLock<Vec<ProjectRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<ProjectRecord>>> {
        self.records
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<ProjectRecord>>> {
        self.records
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert(records: &mut Vec<ProjectRecord>, record: &ProjectRecord) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record.clone(),
        None => records.push(record.clone()),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_all(&self) -> Result<Vec<ProjectRecord>> {
        Ok(self.read()?.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ProjectRecord>> {
        Ok(self.read()?.iter().find(|r| r.id == id).cloned())
    }

    async fn save(&self, record: &ProjectRecord) -> Result<()> {
        let mut stored = self.write()?;
        upsert(&mut stored, record);
        Ok(())
    }

    async fn insert(&self, record: &ProjectRecord) -> Result<bool> {
        let mut stored = self.write()?;
        if stored.iter().any(|r| r.id == record.id) {
            return Ok(false);
        }
        stored.push(record.clone());
        Ok(true)
    }

    async fn save_all(&self, records: &[ProjectRecord]) -> Result<()> {
        let mut stored = self.write()?;
        for record in records {
            upsert(&mut stored, record);
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let mut stored = self.write()?;
        let before = stored.len();
        stored.retain(|r| r.id != id);
        Ok(stored.len() != before)
    }

    async fn delete_all(&self) -> Result<()> {
        let mut stored = self.write()?;
        stored.clear();
        Ok(())
    }
}
