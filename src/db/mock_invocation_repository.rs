use crate::db::invocation_repository::InvocationRepository;
use crate::models::invocation::InvocationRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory repository that records how it was called.
#[derive(Clone, Default)]
pub struct MockInvocationRepository {
    records: Arc<Mutex<HashMap<Uuid, InvocationRecord>>>,
    pub creates: Arc<Mutex<usize>>,
    pub saves: Arc<Mutex<usize>>,
    pub fail_create: bool,
    /// Panics on the n-th call to `save` (1-based).
    pub panic_on_save: Option<usize>,
}

impl MockInvocationRepository {
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    pub fn panicking_on_save(n: usize) -> Self {
        Self {
            panic_on_save: Some(n),
            ..Default::default()
        }
    }

    pub fn create_count(&self) -> usize {
        *self.creates.lock().unwrap()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    pub fn all(&self) -> Vec<InvocationRecord> {
        let mut records: Vec<_> = self.records.lock().unwrap().values().cloned().collect();
        records.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        records
    }

    /// The single stored record; panics when there is not exactly one.
    pub fn only(&self) -> InvocationRecord {
        let records = self.all();
        assert_eq!(records.len(), 1, "expected exactly one invocation");
        records.into_iter().next().unwrap()
    }

    pub fn insert(&self, record: InvocationRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }
}

#[async_trait]
impl InvocationRepository for MockInvocationRepository {
    async fn create(&self, record: &InvocationRecord) -> Result<(), sqlx::Error> {
        *self.creates.lock().unwrap() += 1;
        if self.fail_create {
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &InvocationRecord) -> Result<(), sqlx::Error> {
        let count = {
            let mut saves = self.saves.lock().unwrap();
            *saves += 1;
            *saves
        };
        if self.panic_on_save == Some(count) {
            panic!("save #{count} blew up");
        }
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(sqlx::Error::RowNotFound),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<InvocationRecord>, sqlx::Error> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<InvocationRecord>, sqlx::Error> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.all().into_iter().take(limit).collect())
    }
}
