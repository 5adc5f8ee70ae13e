use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ChangeSet, MatchRepository};
use crate::error::StoreError;
use crate::types::{Match, MatchId, NewMatch};

/// Process-local store. A commit applies its writes to a clone and swaps it
/// in under the write lock, so readers never see half a command.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    matches: Arc<RwLock<HashMap<MatchId, Match>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.matches.read().await.is_empty()
    }
}

#[async_trait]
impl MatchRepository for InMemoryStore {
    async fn load(&self, match_id: &MatchId) -> Result<Option<Match>, StoreError> {
        Ok(self.matches.read().await.get(match_id).cloned())
    }

    async fn create(&self, new_match: NewMatch) -> Result<Match, StoreError> {
        let mut matches = self.matches.write().await;
        if matches.contains_key(&new_match.id) {
            return Err(StoreError::DuplicateMatch);
        }
        let created = Match::new(new_match);
        matches.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<i64, StoreError> {
        let mut matches = self.matches.write().await;
        let current = matches
            .get(&changes.match_id)
            .ok_or(StoreError::MissingMatch)?;
        if current.version != changes.expected_version {
            return Err(StoreError::VersionMismatch);
        }

        let mut next = current.clone();
        for write in &changes.writes {
            next.apply(write);
        }
        next.version += 1;
        let version = next.version;
        matches.insert(changes.match_id.clone(), next);

        debug!(
            match_id = %changes.match_id,
            writes = changes.writes.len(),
            version,
            "Committed change set"
        );
        Ok(version)
    }

    async fn delete(&self, match_id: &MatchId) -> Result<bool, StoreError> {
        Ok(self.matches.write().await.remove(match_id).is_some())
    }
}
