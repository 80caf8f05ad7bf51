use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use super::BlocklistStore;
use crate::error::Result;
use crate::number::{normalize, normalize_strict, suffix_matches};
use crate::types::{block_reason_or_default, BlockedNumber};

/// In-memory blocklist
///
/// DashMap shards give per-key write serialization, which is all the
/// consistency the blocklist needs.
#[derive(Default)]
pub struct MemoryBlocklistStore {
    entries: DashMap<String, BlockedNumber>,
}

impl MemoryBlocklistStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl BlocklistStore for MemoryBlocklistStore {
    async fn contains(&self, number: &str) -> Result<bool> {
        Ok(self.entries.contains_key(&normalize(number)))
    }

    async fn reason_for(&self, number: &str) -> Result<Option<String>> {
        Ok(self.entries.get(&normalize(number)).map(|e| e.reason.clone()))
    }

    async fn add(&self, number: &str, reason: &str) -> Result<BlockedNumber> {
        let normalized = normalize_strict(number)?;
        let entry = BlockedNumber {
            number: normalized.clone(),
            reason: block_reason_or_default(reason).to_string(),
            created_at: Utc::now(),
        };
        self.entries.insert(normalized, entry.clone());
        debug!(number = %entry.number, "Number blocked (memory)");
        Ok(entry)
    }

    async fn remove(&self, number: &str) -> Result<bool> {
        Ok(self.entries.remove(&normalize(number)).is_some())
    }

    async fn list(&self) -> Result<Vec<BlockedNumber>> {
        let mut all: Vec<BlockedNumber> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.number.cmp(&b.number)));
        Ok(all)
    }

    async fn find_match(
        &self,
        number: &str,
        min_suffix_digits: usize,
    ) -> Result<Option<BlockedNumber>> {
        let normalized = normalize(number);
        if normalized.is_empty() {
            return Ok(None);
        }
        if let Some(exact) = self.entries.get(&normalized) {
            return Ok(Some(exact.clone()));
        }
        let best = self
            .entries
            .iter()
            .filter(|e| suffix_matches(e.key(), &normalized, min_suffix_digits))
            .max_by(|a, b| {
                a.key()
                    .len()
                    .cmp(&b.key().len())
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .map(|e| e.value().clone());
        Ok(best)
    }
}
