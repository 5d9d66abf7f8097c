//! Transaction tracking store for the outbox.
//!
//! When transactions are enabled, recorded outbox entries are written through
//! to a [`TransactionStore`] keyed by the inbound message id, so the outbound
//! set can be reconstructed even if the process restarts between record and
//! flush. The storage format is the store's concern; the in-memory
//! implementation here backs tests and non-durable deployments.

use dashmap::DashMap;

use super::OutboxEntry;
use crate::error::BusError;

/// Durable tracking of outbox entries, keyed by correlation id.
///
/// Writes must be atomic per entry. Two concurrent inbound messages never
/// share a correlation id, so implementations only need to serialize access
/// within one correlation id's entry set.
pub trait TransactionStore: Send + Sync {
    /// Appends an entry under its correlation id.
    fn append(&self, entry: OutboxEntry) -> Result<(), BusError>;

    /// Returns all tracked entries for a correlation id, completed or not,
    /// in the order they were recorded.
    fn entries(&self, correlation_id: &str) -> Result<Vec<OutboxEntry>, BusError>;

    /// Marks one entry completed after a successful transport hand-off.
    fn mark_complete(&self, correlation_id: &str, message_id: &str) -> Result<(), BusError>;

    /// Drops the whole entry set once every entry has been dispatched.
    fn remove(&self, correlation_id: &str) -> Result<(), BusError>;
}

/// In-memory [`TransactionStore`] over a concurrent map.
///
/// The map's per-shard locking gives the required per-correlation-id write
/// atomicity.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    entries: DashMap<String, Vec<OutboxEntry>>,
}

impl InMemoryTransactionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of correlation ids with tracked entries.
    #[must_use]
    pub fn tracked_correlations(&self) -> usize {
        self.entries.len()
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn append(&self, entry: OutboxEntry) -> Result<(), BusError> {
        self.entries
            .entry(entry.correlation_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    fn entries(&self, correlation_id: &str) -> Result<Vec<OutboxEntry>, BusError> {
        Ok(self
            .entries
            .get(correlation_id)
            .map(|set| set.clone())
            .unwrap_or_default())
    }

    fn mark_complete(&self, correlation_id: &str, message_id: &str) -> Result<(), BusError> {
        if let Some(mut set) = self.entries.get_mut(correlation_id) {
            if let Some(entry) = set.iter_mut().find(|e| e.message.message_id == message_id) {
                entry.completed = true;
            }
        }
        Ok(())
    }

    fn remove(&self, correlation_id: &str) -> Result<(), BusError> {
        self.entries.remove(correlation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use relay_core::RawMessage;

    use super::*;

    fn entry(correlation: &str, message_id: &str) -> OutboxEntry {
        OutboxEntry::new(correlation, RawMessage::new(message_id, Vec::new()))
    }

    #[test]
    fn append_and_read_back_in_order() {
        let store = InMemoryTransactionStore::new();
        store.append(entry("m-1", "out-a")).unwrap();
        store.append(entry("m-1", "out-b")).unwrap();

        let entries = store.entries("m-1").unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.message.message_id.as_str()).collect();
        assert_eq!(ids, vec!["out-a", "out-b"]);
    }

    #[test]
    fn correlations_are_isolated() {
        let store = InMemoryTransactionStore::new();
        store.append(entry("m-1", "out-a")).unwrap();
        store.append(entry("m-2", "out-b")).unwrap();

        assert_eq!(store.entries("m-1").unwrap().len(), 1);
        assert_eq!(store.entries("m-2").unwrap().len(), 1);
        assert_eq!(store.tracked_correlations(), 2);
    }

    #[test]
    fn mark_complete_flips_one_entry() {
        let store = InMemoryTransactionStore::new();
        store.append(entry("m-1", "out-a")).unwrap();
        store.append(entry("m-1", "out-b")).unwrap();

        store.mark_complete("m-1", "out-a").unwrap();

        let entries = store.entries("m-1").unwrap();
        assert!(entries[0].completed);
        assert!(!entries[1].completed);
    }

    #[test]
    fn remove_drops_the_set() {
        let store = InMemoryTransactionStore::new();
        store.append(entry("m-1", "out-a")).unwrap();
        store.remove("m-1").unwrap();

        assert!(store.entries("m-1").unwrap().is_empty());
        assert_eq!(store.tracked_correlations(), 0);
    }

    #[test]
    fn unknown_correlation_reads_empty() {
        let store = InMemoryTransactionStore::new();
        assert!(store.entries("ghost").unwrap().is_empty());
        store.mark_complete("ghost", "out-x").unwrap();
        store.remove("ghost").unwrap();
    }
}
