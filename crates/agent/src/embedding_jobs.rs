//! Background embedding refresh
//!
//! Merges that touch searchable fields schedule a job here instead of
//! embedding inline. The worker owns its own error channel: failures are
//! logged and never reach the request that caused them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use contact_agent_core::{Contact, ContactStore, EmbeddingClient};

/// Re-embed one contact's searchable text
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingJob {
    pub contact_id: Uuid,
    pub text: String,
}

impl EmbeddingJob {
    pub fn for_contact(contact: &Contact) -> Self {
        Self {
            contact_id: contact.id,
            text: contact.searchable_text(),
        }
    }
}

/// Sending side of the embedding worker
#[derive(Clone)]
pub struct EmbeddingJobQueue {
    tx: mpsc::Sender<EmbeddingJob>,
}

impl EmbeddingJobQueue {
    /// Start the worker. It exits once every queue handle is dropped.
    pub fn spawn(
        client: Arc<dyn EmbeddingClient>,
        store: Arc<dyn ContactStore>,
        capacity: usize,
        timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, client, store, timeout));
        tracing::info!(capacity, "Embedding worker started");
        (Self { tx }, handle)
    }

    /// Queue a refresh; returns false when the job was dropped
    pub fn schedule(&self, contact: &Contact) -> bool {
        let job = EmbeddingJob::for_contact(contact);
        if job.text.trim().is_empty() {
            return false;
        }
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(contact_id = %job.contact_id, "Embedding queue full, dropping job");
                false
            },
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(contact_id = %job.contact_id, "Embedding worker stopped, dropping job");
                false
            },
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<EmbeddingJob>,
    client: Arc<dyn EmbeddingClient>,
    store: Arc<dyn ContactStore>,
    timeout: Duration,
) {
    let mut processed = 0u64;
    let mut failed = 0u64;

    while let Some(job) = rx.recv().await {
        let embedding = match tokio::time::timeout(timeout, client.embed(&job.text)).await {
            Ok(Ok(embedding)) => embedding,
            Ok(Err(e)) => {
                failed += 1;
                tracing::warn!(contact_id = %job.contact_id, error = %e, "Embedding failed");
                continue;
            },
            Err(_) => {
                failed += 1;
                tracing::warn!(contact_id = %job.contact_id, "Embedding timed out");
                continue;
            },
        };

        match store.set_embedding(job.contact_id, embedding).await {
            Ok(()) => {
                processed += 1;
                tracing::debug!(contact_id = %job.contact_id, "Contact embedding refreshed");
            },
            Err(e) => {
                failed += 1;
                tracing::warn!(contact_id = %job.contact_id, error = %e, "Failed to store embedding");
            },
        }
    }

    tracing::info!(processed, failed, "Embedding worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingEmbedder, StaticEmbedder};
    use contact_agent_persistence::InMemoryContactStore;

    #[tokio::test]
    async fn test_worker_stores_embedding() {
        let store = Arc::new(InMemoryContactStore::new());
        let owner = Uuid::new_v4();
        let contact = store
            .insert_contact(Contact::new(owner, "Ana Souza").with_company("Acme"))
            .await
            .unwrap();

        let embedder = Arc::new(StaticEmbedder::new(vec![1.0, 0.0]));
        let (queue, handle) =
            EmbeddingJobQueue::spawn(embedder.clone(), store.clone(), 8, Duration::from_secs(1));

        assert!(queue.schedule(&contact));
        drop(queue);
        handle.await.unwrap();

        assert_eq!(embedder.call_count(), 1);
        let hits = store.search_by_embedding(owner, &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].contact.id, contact.id);
    }

    #[tokio::test]
    async fn test_worker_survives_failures() {
        let store = Arc::new(InMemoryContactStore::new());
        let owner = Uuid::new_v4();
        let contact = store
            .insert_contact(Contact::new(owner, "Bruno"))
            .await
            .unwrap();

        let (queue, handle) = EmbeddingJobQueue::spawn(
            Arc::new(FailingEmbedder),
            store.clone(),
            8,
            Duration::from_secs(1),
        );
        assert!(queue.schedule(&contact));
        assert!(queue.schedule(&contact));
        drop(queue);
        handle.await.unwrap();

        let hits = store.search_by_embedding(owner, &[1.0], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_job() {
        let (tx, _rx) = mpsc::channel(1);
        let queue = EmbeddingJobQueue { tx };
        let contact = Contact::new(Uuid::new_v4(), "Carla");

        assert!(queue.schedule(&contact));
        assert!(!queue.schedule(&contact));
    }
}
