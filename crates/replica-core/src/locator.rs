//! Checkpoint discovery.

use crate::error::Result;
use crate::normalize::nonce_from_tags;
use crate::source::CheckpointRegistry;
use replica_types::Checkpoint;
use std::sync::Arc;
use tracing::{debug, info};

/// Finds checkpoint transactions through the registry.
///
/// Pages arrive newest first, so the first entry that qualifies is the
/// most recent qualifying checkpoint and the walk stops there.
#[derive(Clone)]
pub struct CheckpointLocator {
    registry: Arc<dyn CheckpointRegistry>,
    page_size: usize,
}

impl CheckpointLocator {
    pub fn new(registry: Arc<dyn CheckpointRegistry>, page_size: usize) -> Self {
        Self {
            registry,
            page_size,
        }
    }

    /// The most recent checkpoint of the process, whatever its nonce.
    pub async fn locate_latest(&self, process_id: &str) -> Result<Option<Checkpoint>> {
        let page = self.registry.checkpoint_page(process_id, 1, None).await?;
        let checkpoint = page.entries.into_iter().next().map(|entry| Checkpoint {
            nonce: nonce_from_tags(&entry.tags),
            tx_id: entry.tx_id,
        });
        debug!(process_id, ?checkpoint, "latest checkpoint");
        Ok(checkpoint)
    }

    /// The most recent checkpoint whose nonce is at most `max_nonce`.
    ///
    /// Entries without a parsable nonce never qualify. Registry errors
    /// propagate immediately.
    pub async fn locate_at_or_before(
        &self,
        process_id: &str,
        max_nonce: u64,
    ) -> Result<Option<Checkpoint>> {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = self
                .registry
                .checkpoint_page(process_id, self.page_size, cursor.clone())
                .await?;
            pages += 1;
            if page.entries.is_empty() {
                break;
            }

            let found = page.entries.iter().find_map(|entry| {
                nonce_from_tags(&entry.tags)
                    .filter(|&nonce| nonce <= max_nonce)
                    .map(|nonce| Checkpoint {
                        tx_id: entry.tx_id.clone(),
                        nonce: Some(nonce),
                    })
            });
            if let Some(checkpoint) = found {
                info!(
                    process_id,
                    tx_id = %checkpoint.tx_id,
                    nonce = ?checkpoint.nonce,
                    max_nonce,
                    pages,
                    "found checkpoint at or before target nonce"
                );
                return Ok(Some(checkpoint));
            }

            match page.next_cursor() {
                Some(next) if page.page_info.has_next_page => cursor = Some(next),
                _ => break,
            }
        }
        info!(process_id, max_nonce, pages, "no checkpoint at or before target nonce");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplicaError;
    use crate::testing::{checkpoint_tx, MockRegistry, TEST_PROCESS};

    #[tokio::test]
    async fn test_descending_search_returns_first_match() {
        let registry = Arc::new(MockRegistry::from_pages(&[&[50], &[40], &[30]]));
        let locator = CheckpointLocator::new(registry.clone(), 20);
        let found = locator
            .locate_at_or_before(TEST_PROCESS, 42)
            .await
            .unwrap()
            .expect("checkpoint 40 qualifies");
        assert_eq!(found.nonce, Some(40));
        assert_eq!(found.tx_id, checkpoint_tx(40));
        // Stopped after the second page.
        assert_eq!(registry.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_match_within_a_page() {
        let registry = Arc::new(MockRegistry::from_pages(&[&[90, 60, 45, 41, 12]]));
        let locator = CheckpointLocator::new(registry, 20);
        let found = locator.locate_at_or_before(TEST_PROCESS, 42).await.unwrap();
        assert_eq!(found.and_then(|c| c.nonce), Some(41));
    }

    #[tokio::test]
    async fn test_exhausts_pages_before_giving_up() {
        let registry = Arc::new(MockRegistry::from_pages(&[&[50, 49], &[48], &[47]]));
        let locator = CheckpointLocator::new(registry.clone(), 20);
        assert_eq!(locator.locate_at_or_before(TEST_PROCESS, 10).await.unwrap(), None);
        assert_eq!(registry.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_entries_without_nonce_never_qualify() {
        use replica_types::Tag;
        let registry = Arc::new(MockRegistry::from_entries(vec![vec![
            ("untagged".to_string(), vec![Tag::new("Type", "Checkpoint")]),
            ("garbled".to_string(), vec![Tag::new("Nonce", "soon")]),
            ("ckpt-5".to_string(), vec![Tag::new("Ordinate", "5")]),
        ]]));
        let locator = CheckpointLocator::new(registry, 20);
        let found = locator.locate_at_or_before(TEST_PROCESS, 10).await.unwrap().unwrap();
        assert_eq!(found.tx_id, "ckpt-5");
        assert_eq!(found.nonce, Some(5));
    }

    #[tokio::test]
    async fn test_latest() {
        let registry = Arc::new(MockRegistry::from_pages(&[&[50, 40]]));
        let locator = CheckpointLocator::new(registry, 20);
        let latest = locator.locate_latest(TEST_PROCESS).await.unwrap().unwrap();
        assert_eq!(latest.nonce, Some(50));

        let empty = Arc::new(MockRegistry::from_pages(&[]));
        let locator = CheckpointLocator::new(empty, 20);
        assert_eq!(locator.locate_latest(TEST_PROCESS).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_registry_errors_propagate() {
        let registry = Arc::new(MockRegistry::from_pages(&[&[50]]));
        registry.fail_all();
        let locator = CheckpointLocator::new(registry, 20);
        let err = locator.locate_at_or_before(TEST_PROCESS, 42).await.unwrap_err();
        assert!(matches!(err, ReplicaError::Network(_)));
    }
}
