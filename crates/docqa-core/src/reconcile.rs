//! Reclaiming documents stuck in `processing`.
//!
//! An ingestion run that dies mid-flight (process killed, host restarted)
//! leaves its document in `processing`, where the compare-and-set claim
//! refuses to pick it up again. [`reclaim_stale`] moves such documents to
//! `failed` once they have not been touched for `older_than_secs`, which
//! makes them claimable by the next ingestion trigger.

use crate::models::{now_ts, DocumentEvent};
use crate::store::Store;

/// Fail every `processing` document idle for longer than `older_than_secs`.
///
/// Returns the ids that were reclaimed. A document that finishes between
/// the scan and the transition is left alone.
#[tracing::instrument(skip(store))]
pub async fn reclaim_stale(
    store: &dyn Store,
    older_than_secs: i64,
) -> anyhow::Result<Vec<String>> {
    let now = now_ts();
    let stale = store
        .stale_processing_documents(now - older_than_secs)
        .await?;

    let mut reclaimed = Vec::with_capacity(stale.len());
    for id in stale {
        if store.transition_document(&id, DocumentEvent::Fail, now).await? {
            tracing::warn!(document_id = %id, "reclaimed stale processing document");
            reclaimed.push(id);
        }
    }
    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentStatus;
    use crate::store::memory::InMemoryStore;
    use crate::testing::sample_document;

    #[tokio::test]
    async fn stale_documents_become_failed() {
        let store = InMemoryStore::new();
        for id in ["stuck", "busy", "done"] {
            store.insert_document(&sample_document(id, "alice")).await.unwrap();
        }
        let now = now_ts();
        store.transition_document("stuck", DocumentEvent::Begin, now - 7200).await.unwrap();
        store.transition_document("busy", DocumentEvent::Begin, now).await.unwrap();
        store.transition_document("done", DocumentEvent::Begin, now - 7200).await.unwrap();
        store.transition_document("done", DocumentEvent::Complete, now - 7000).await.unwrap();

        let reclaimed = reclaim_stale(&store, 1800).await.unwrap();
        assert_eq!(reclaimed, vec!["stuck".to_string()]);

        let status = |id: &'static str| {
            let store = &store;
            async move { store.get_document(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status("stuck").await, DocumentStatus::Failed);
        assert_eq!(status("busy").await, DocumentStatus::Processing);
        assert_eq!(status("done").await, DocumentStatus::Completed);

        assert!(store
            .transition_document("stuck", DocumentEvent::Begin, now)
            .await
            .unwrap());
    }
}
