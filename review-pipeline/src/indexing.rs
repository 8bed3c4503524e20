use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, error, info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{knowledge_chunk::KnowledgeChunk, knowledge_document::KnowledgeDocument},
    },
    utils::{
        chunker::chunk_text,
        config::AppConfig,
        embedding::{Embedder, EmbeddingTask},
    },
};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_ATTEMPTS: usize = 3;

/// Deletes are not queued: `KnowledgeDocument::delete_with_chunks` drops a document and its
/// chunks together, and a rebuild racing with it writes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexJob {
    /// (Re)build the chunk set of a document.
    Index(String),
}

impl IndexJob {
    pub fn document_id(&self) -> &str {
        match self {
            IndexJob::Index(id) => id,
        }
    }
}

/// Cheap handle used by request handlers and the review flow to schedule indexing.
#[derive(Clone)]
pub struct IndexingQueue {
    sender: UnboundedSender<IndexJob>,
}

impl IndexingQueue {
    pub fn new() -> (Self, UnboundedReceiver<IndexJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, job: IndexJob) -> Result<(), AppError> {
        debug!(?job, "indexing job queued");
        self.sender
            .send(job)
            .map_err(|err| AppError::Processing(format!("indexing worker is gone: {:?}", err.0)))
    }
}

#[derive(Debug, Default)]
pub struct IndexingStats {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
}

impl IndexingStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Chunks documents, embeds the chunks and swaps them in atomically.
pub struct DocumentIndexer {
    db: Arc<SurrealDbClient>,
    embedder: Arc<dyn Embedder>,
    chunk_max_chars: usize,
    retry_interval: Duration,
    attempts: usize,
    stats: Arc<IndexingStats>,
}

impl DocumentIndexer {
    pub fn new(db: Arc<SurrealDbClient>, embedder: Arc<dyn Embedder>, chunk_max_chars: usize) -> Self {
        Self {
            db,
            embedder,
            chunk_max_chars,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            attempts: DEFAULT_ATTEMPTS,
            stats: Arc::new(IndexingStats::default()),
        }
    }

    pub fn from_config(
        db: Arc<SurrealDbClient>,
        embedder: Arc<dyn Embedder>,
        config: &AppConfig,
    ) -> Self {
        Self::new(db, embedder, config.chunk_max_chars)
    }

    pub fn with_retry(mut self, interval: Duration, attempts: usize) -> Self {
        self.retry_interval = interval;
        self.attempts = attempts.max(1);
        self
    }

    pub fn stats(&self) -> Arc<IndexingStats> {
        self.stats.clone()
    }

    /// Returns the number of chunks written. Unknown documents are skipped.
    pub async fn index_document(&self, document_id: &str) -> Result<usize, AppError> {
        let Some(document) = self.db.get_item::<KnowledgeDocument>(document_id).await? else {
            warn!(%document_id, "document vanished before indexing, skipping");
            return Ok(0);
        };

        let pieces = chunk_text(&document.full_text, self.chunk_max_chars);
        let mut chunks = Vec::with_capacity(pieces.len());
        for (order_index, text) in pieces.into_iter().enumerate() {
            let embedding = self
                .embedder
                .embed(&text, EmbeddingTask::RetrievalDocument)
                .await?;
            chunks.push(KnowledgeChunk::new(
                &document,
                text,
                order_index as u32,
                embedding,
            ));
        }

        let count = chunks.len();
        if !KnowledgeChunk::replace_for_document(&self.db, &document.id, chunks).await? {
            warn!(%document_id, "document deleted while indexing, chunks discarded");
            return Ok(0);
        }
        info!(%document_id, chunk_count = count, corpus = %document.corpus, "document indexed");
        Ok(count)
    }

    async fn run_once(&self, job: &IndexJob) -> Result<(), AppError> {
        match job {
            IndexJob::Index(id) => self.index_document(id).await.map(|_| ()),
        }
    }

    /// Runs one job with a fixed retry interval.
    pub async fn process(&self, job: &IndexJob) -> Result<(), AppError> {
        let strategy = FixedInterval::new(self.retry_interval).take(self.attempts.saturating_sub(1));
        Retry::spawn(strategy, || self.run_once(job)).await
    }

    pub async fn run_worker(&self, mut receiver: UnboundedReceiver<IndexJob>) {
        info!("indexing worker started");
        while let Some(job) = receiver.recv().await {
            match self.process(&job).await {
                Ok(()) => {
                    self.stats.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        document_id = job.document_id(),
                        attempts = self.attempts,
                        error = %err,
                        "indexing job failed"
                    );
                }
            }
        }
        info!("indexing queue closed, worker stopping");
    }

    pub fn spawn(self: Arc<Self>, receiver: UnboundedReceiver<IndexJob>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_worker(receiver).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{
        storage::types::knowledge_document::DocumentKind,
        utils::embedding::EmbeddingProvider,
    };
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    struct FlakyEmbedder {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(AppError::Embedding("provider unavailable".into()));
            }
            Ok(vec![0.1, 0.2, 0.3])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    async fn memory_db() -> Arc<SurrealDbClient> {
        Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        )
    }

    async fn stored_document(db: &SurrealDbClient, text: &str) -> KnowledgeDocument {
        let document = KnowledgeDocument::new(
            DocumentKind::Tutorial,
            "Guide".into(),
            text.into(),
            Some("thread-1".into()),
            json!({}),
        );
        db.store_item(document.clone()).await.expect("store document");
        document
    }

    fn indexer(db: Arc<SurrealDbClient>, embedder: Arc<dyn Embedder>) -> DocumentIndexer {
        DocumentIndexer::new(db, embedder, 40).with_retry(Duration::from_millis(0), 3)
    }

    #[tokio::test]
    async fn indexing_writes_ordered_chunks_with_document_scope() {
        let db = memory_db().await;
        let document = stored_document(
            &db,
            "First sentence is here. Second sentence follows it. Third one closes.",
        )
        .await;
        let indexer = indexer(db.clone(), Arc::new(EmbeddingProvider::new_hashed(3)));

        let count = indexer.index_document(&document.id).await.expect("index");
        assert_eq!(count, 3);

        let chunks = KnowledgeChunk::get_by_document_id(&db, &document.id)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].order_index, 0);
        assert_eq!(chunks[0].text, "First sentence is here.");
        assert!(chunks.iter().all(|c| c.scope.as_deref() == Some("thread-1")));

        let again = indexer.index_document(&document.id).await.expect("reindex");
        assert_eq!(again, 3);
        let chunks = KnowledgeChunk::get_by_document_id(&db, &document.id)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn unknown_document_is_a_no_op() {
        let db = memory_db().await;
        let indexer = indexer(db, Arc::new(EmbeddingProvider::new_hashed(3)));

        let count = indexer.index_document("missing").await.expect("no-op");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn transient_embedding_failures_are_retried() {
        let db = memory_db().await;
        let document = stored_document(&db, "Only sentence.").await;
        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let indexer = indexer(db.clone(), embedder.clone());

        indexer
            .process(&IndexJob::Index(document.id.clone()))
            .await
            .expect("third attempt succeeds");

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        let chunks = KnowledgeChunk::get_by_document_id(&db, &document.id)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn worker_counts_processed_and_failed_jobs() {
        let db = memory_db().await;
        let document = stored_document(&db, "Only sentence.").await;
        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            fail_first: 3,
        });
        let indexer = Arc::new(indexer(db.clone(), embedder));
        let stats = indexer.stats();
        let (queue, receiver) = IndexingQueue::new();

        queue
            .enqueue(IndexJob::Index(document.id.clone()))
            .expect("enqueue first");
        queue
            .enqueue(IndexJob::Index(document.id.clone()))
            .expect("enqueue second");
        drop(queue);

        indexer.spawn(receiver).await.expect("worker exits");

        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.processed(), 1);
        let chunks = KnowledgeChunk::get_by_document_id(&db, &document.id)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 1);
    }

    /// Deletes the document the first time it is asked for a vector.
    struct DeletingEmbedder {
        db: Arc<SurrealDbClient>,
        document_id: String,
    }

    #[async_trait]
    impl Embedder for DeletingEmbedder {
        async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, AppError> {
            KnowledgeDocument::delete_with_chunks(&self.db, &self.document_id).await?;
            Ok(vec![0.1, 0.2, 0.3])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn document_deleted_mid_indexing_leaves_no_chunks() {
        let db = memory_db().await;
        let document = stored_document(&db, "Only sentence.").await;
        let embedder = Arc::new(DeletingEmbedder {
            db: db.clone(),
            document_id: document.id.clone(),
        });
        let indexer = indexer(db.clone(), embedder);

        let written = indexer.index_document(&document.id).await.expect("index");

        assert_eq!(written, 0);
        assert!(db
            .get_item::<KnowledgeDocument>(&document.id)
            .await
            .expect("fetch document")
            .is_none());
        assert!(KnowledgeChunk::get_by_document_id(&db, &document.id)
            .await
            .expect("chunks")
            .is_empty());
    }
}
