//! Blocklist storage
//!
//! Pure data access: no policy lives here. Every method normalizes its input
//! with [`crate::number::normalize`], so writes and lookups agree on keys.
//! Storage failures surface as `StoreUnavailable`; turning them into an
//! "allow" verdict is the decision engine's job.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::BlockedNumber;

pub use memory::MemoryBlocklistStore;
pub use sqlite::SqliteBlocklistStore;

/// Blocklist storage trait
#[async_trait]
pub trait BlocklistStore: Send + Sync {
    /// Exact membership on the normalized form
    async fn contains(&self, number: &str) -> Result<bool>;

    /// Stored reason for the normalized form, if blocked
    async fn reason_for(&self, number: &str) -> Result<Option<String>>;

    /// Insert or replace (last write wins on reason and timestamp). A blank
    /// reason is stored as [`crate::types::DEFAULT_BLOCK_REASON`].
    async fn add(&self, number: &str, reason: &str) -> Result<BlockedNumber>;

    /// Remove a number; `false` when it was not blocked
    async fn remove(&self, number: &str) -> Result<bool>;

    /// All entries, newest first
    async fn list(&self) -> Result<Vec<BlockedNumber>>;

    /// Entry equal to the normalized number or, failing that, the longest
    /// entry sharing at least `min_suffix_digits` trailing digits with it.
    async fn find_match(
        &self,
        number: &str,
        min_suffix_digits: usize,
    ) -> Result<Option<BlockedNumber>>;
}
