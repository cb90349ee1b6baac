use super::{Record, RecordStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-process store with the same contract as the SQLite tables.
#[derive(Debug)]
pub struct MemoryStore<R> {
    records: Mutex<BTreeMap<String, R>>,
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, R>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn get(&self, key: &str) -> anyhow::Result<Option<R>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, record: R) -> anyhow::Result<()> {
        self.lock().insert(record.key().to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    async fn get_all(&self) -> anyhow::Result<Vec<R>> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.lock().clear();
        Ok(())
    }
}
