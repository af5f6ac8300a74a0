use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::turn::TurnEntry;
use crate::errors::ApplicationError;

/// Persistence boundary for the conversation's turn log.
///
/// `append` must be durable once it returns `Ok`; callers issue the next model
/// request only after that. `snapshot` returns a point-in-time copy that later
/// appends do not affect.
#[async_trait]
pub trait TurnLogStore: Send + Sync {
    async fn append(&self, entry: TurnEntry) -> Result<(), ApplicationError>;
    async fn snapshot(&self) -> Result<Vec<TurnEntry>, ApplicationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryTurnLog {
    entries: Arc<Mutex<Vec<TurnEntry>>>,
}

impl InMemoryTurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TurnEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TurnLogStore for InMemoryTurnLog {
    async fn append(&self, entry: TurnEntry) -> Result<(), ApplicationError> {
        entry.validate()?;
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<TurnEntry>, ApplicationError> {
        Ok(self.entries())
    }
}
