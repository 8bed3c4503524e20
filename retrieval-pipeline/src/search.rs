use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use common::{
    error::AppError,
    storage::types::{
        knowledge_document::{Corpus, KnowledgeDocument},
        thread_setting::SearchMode,
    },
    utils::{
        config::{AppConfig, RetrievalSettings},
        embedding::{Embedder, EmbeddingTask},
    },
};

use crate::{
    index::KnowledgeIndex,
    parents::resolve_parents,
    scoring::{rank_hybrid, FusedCandidate, ScopeRule},
};

/// Parent document handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub scope: Option<String>,
}

impl From<KnowledgeDocument> for RetrievedDocument {
    fn from(document: KnowledgeDocument) -> Self {
        Self {
            id: document.id,
            title: document.title,
            content: document.full_text,
            scope: document.scope,
        }
    }
}

/// Hybrid search over one corpus at a time, built once at startup and shared.
#[derive(Clone)]
pub struct KnowledgeSearch {
    index: Arc<dyn KnowledgeIndex>,
    embedder: Arc<dyn Embedder>,
    tutorial: RetrievalSettings,
    world_book: RetrievalSettings,
}

impl KnowledgeSearch {
    pub fn new(
        index: Arc<dyn KnowledgeIndex>,
        embedder: Arc<dyn Embedder>,
        tutorial: RetrievalSettings,
        world_book: RetrievalSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            tutorial,
            world_book,
        }
    }

    pub fn from_config(
        index: Arc<dyn KnowledgeIndex>,
        embedder: Arc<dyn Embedder>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            index,
            embedder,
            config.tutorial_retrieval.clone(),
            config.world_book_retrieval.clone(),
        )
    }

    pub fn settings_for(&self, corpus: Corpus) -> &RetrievalSettings {
        match corpus {
            Corpus::Tutorial => &self.tutorial,
            Corpus::WorldBook => &self.world_book,
        }
    }

    /// Searches `corpus` on behalf of `thread_id` and returns parent documents.
    ///
    /// Never fails: provider and store errors are logged and produce an empty list.
    #[instrument(skip_all, fields(corpus = %corpus, thread_id = thread_id.unwrap_or("-")))]
    pub async fn search(
        &self,
        query: &str,
        thread_id: Option<&str>,
        corpus: Corpus,
    ) -> Vec<RetrievedDocument> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let query_vector = match self.embedder.embed(query, EmbeddingTask::RetrievalQuery).await {
            Ok(vector) => vector,
            Err(err) => {
                warn!(error = %err, "query embedding failed, returning no results");
                return Vec::new();
            }
        };

        let mode = match thread_id {
            Some(thread_id) => self.index.search_mode(thread_id).await.unwrap_or_else(|err| {
                warn!(error = %err, %thread_id, "search mode lookup failed, using ISOLATED");
                SearchMode::Isolated
            }),
            None => SearchMode::Isolated,
        };

        let settings = self.settings_for(corpus);
        let ranked = match self
            .search_chunks(query, query_vector, ScopeRule::new(mode, thread_id), corpus, settings)
            .await
        {
            Ok(ranked) => ranked,
            Err(err) => {
                error!(error = %err, "hybrid search failed");
                return Vec::new();
            }
        };

        let chunk_ids: Vec<String> = ranked.iter().map(|c| c.chunk_id.clone()).collect();
        let documents = match resolve_parents(self.index.as_ref(), &chunk_ids, settings.max_parent_docs).await
        {
            Ok(documents) => documents,
            Err(err) => {
                error!(error = %err, "parent resolution failed");
                return Vec::new();
            }
        };

        info!(
            target: "rag_trace",
            query,
            mode = mode.as_str(),
            chunks = ?chunk_ids,
            titles = ?documents.iter().map(|d| d.title.as_str()).collect::<Vec<_>>(),
            "search completed"
        );

        documents.into_iter().map(RetrievedDocument::from).collect()
    }

    /// Runs both candidate queries concurrently and returns the fused, scope-filtered ranking.
    pub async fn search_chunks(
        &self,
        query_text: &str,
        query_vector: Vec<f32>,
        rule: ScopeRule<'_>,
        corpus: Corpus,
        settings: &RetrievalSettings,
    ) -> Result<Vec<FusedCandidate>, AppError> {
        let (dense, lexical) = tokio::try_join!(
            self.index.query_dense(query_vector, corpus, settings.top_k_vector),
            self.index.query_lexical(query_text, corpus, settings.top_k_fts),
        )?;

        Ok(rank_hybrid(
            &dense,
            &lexical,
            rule,
            settings.rrf_k,
            settings.final_k,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use common::{
        storage::{
            db::SurrealDbClient,
            types::{
                knowledge_chunk::KnowledgeChunk,
                knowledge_document::DocumentKind,
                thread_setting::ThreadSetting,
            },
        },
        utils::embedding::EmbeddingProvider,
    };
    use serde_json::json;
    use uuid::Uuid;

    use crate::scoring::Candidate;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, AppError> {
            Err(AppError::Embedding("provider unavailable".into()))
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, AppError> {
            Ok(self.0.clone())
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    /// In-memory index with fixed candidate lists.
    #[derive(Default)]
    struct FakeIndex {
        dense: Vec<Candidate>,
        lexical: Vec<Candidate>,
        owners: HashMap<String, String>,
        documents: Vec<KnowledgeDocument>,
        mode: Option<SearchMode>,
        fail_store: bool,
        store_calls: AtomicUsize,
    }

    #[async_trait]
    impl KnowledgeIndex for FakeIndex {
        async fn query_dense(
            &self,
            _embedding: Vec<f32>,
            _corpus: Corpus,
            top_k: usize,
        ) -> Result<Vec<Candidate>, AppError> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_store {
                return Err(AppError::InternalError("store down".into()));
            }
            Ok(self.dense.iter().take(top_k).cloned().collect())
        }

        async fn query_lexical(
            &self,
            _text: &str,
            _corpus: Corpus,
            top_k: usize,
        ) -> Result<Vec<Candidate>, AppError> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.lexical.iter().take(top_k).cloned().collect())
        }

        async fn chunk_owners(
            &self,
            chunk_ids: &[String],
        ) -> Result<HashMap<String, String>, AppError> {
            Ok(chunk_ids
                .iter()
                .filter_map(|id| self.owners.get(id).map(|doc| (id.clone(), doc.clone())))
                .collect())
        }

        async fn get_documents(&self, ids: &[String]) -> Result<Vec<KnowledgeDocument>, AppError> {
            Ok(ids
                .iter()
                .filter_map(|id| self.documents.iter().find(|d| &d.id == id).cloned())
                .collect())
        }

        async fn search_mode(&self, _thread_id: &str) -> Result<SearchMode, AppError> {
            self.mode
                .ok_or_else(|| AppError::InternalError("settings table unavailable".into()))
        }
    }

    fn doc(id: &str, scope: Option<&str>) -> KnowledgeDocument {
        let mut document = KnowledgeDocument::new(
            DocumentKind::Tutorial,
            id.to_uppercase(),
            format!("{id} content"),
            scope.map(str::to_string),
            json!({}),
        );
        document.id = id.to_string();
        document
    }

    fn fake_index(mode: Option<SearchMode>) -> FakeIndex {
        FakeIndex {
            dense: vec![
                Candidate::new("c-foreign", Some("t2")),
                Candidate::new("c-own", Some("t1")),
            ],
            lexical: vec![
                Candidate::new("c-global", None),
                Candidate::new("c-own-2", Some("t1")),
            ],
            owners: HashMap::from([
                ("c-foreign".to_string(), "foreign".to_string()),
                ("c-own".to_string(), "own".to_string()),
                ("c-own-2".to_string(), "own".to_string()),
                ("c-global".to_string(), "global".to_string()),
            ]),
            documents: vec![
                doc("foreign", Some("t2")),
                doc("own", Some("t1")),
                doc("global", None),
            ],
            mode,
            ..FakeIndex::default()
        }
    }

    fn search_with(index: FakeIndex, embedder: Arc<dyn Embedder>) -> (KnowledgeSearch, Arc<FakeIndex>) {
        let index = Arc::new(index);
        let search = KnowledgeSearch::new(
            index.clone(),
            embedder,
            RetrievalSettings::tutorial(),
            RetrievalSettings::world_book(),
        );
        (search, index)
    }

    fn titles(documents: &[RetrievedDocument]) -> Vec<&str> {
        documents.iter().map(|d| d.title.as_str()).collect()
    }

    #[tokio::test]
    async fn embedding_failure_fails_fast_without_store_queries() {
        let (search, index) = search_with(fake_index(None), Arc::new(FailingEmbedder));

        let results = search.search("how do I install", Some("t1"), Corpus::Tutorial).await;

        assert!(results.is_empty());
        assert_eq!(index.store_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_mode_defaults_to_isolated() {
        let (search, _) = search_with(fake_index(None), Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])));

        let results = search.search("install", Some("t1"), Corpus::Tutorial).await;

        assert_eq!(titles(&results), vec!["OWN", "GLOBAL"]);
    }

    #[tokio::test]
    async fn priority_mode_returns_foreign_documents_after_own() {
        let (search, _) = search_with(
            fake_index(Some(SearchMode::Priority)),
            Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])),
        );

        let results = search.search("install", Some("t1"), Corpus::Tutorial).await;

        assert_eq!(titles(&results), vec!["OWN", "FOREIGN", "GLOBAL"]);
    }

    #[tokio::test]
    async fn store_failure_yields_empty_results() {
        let mut index = fake_index(Some(SearchMode::Priority));
        index.fail_store = true;
        let (search, _) = search_with(index, Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])));

        assert!(search
            .search("install", Some("t1"), Corpus::Tutorial)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn end_to_end_against_surrealdb() {
        let db = SurrealDbClient::memory("search_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        db.ensure_initialized(3).await.expect("indexes");

        let own = KnowledgeDocument::new(
            DocumentKind::Tutorial,
            "Launcher install".into(),
            "Download the launcher and run the installer.".into(),
            Some("thread-1".into()),
            json!({}),
        );
        let foreign = KnowledgeDocument::new(
            DocumentKind::Tutorial,
            "Launcher crash".into(),
            "If the launcher crashes, delete the cache folder.".into(),
            Some("thread-2".into()),
            json!({}),
        );
        let global = KnowledgeDocument::new(
            DocumentKind::Tutorial,
            "General FAQ".into(),
            "The launcher needs a recent graphics driver.".into(),
            None,
            json!({}),
        );

        for (document, embedding) in [
            (&own, vec![0.9, 0.1, 0.0]),
            (&foreign, vec![0.95, 0.05, 0.0]),
            (&global, vec![0.5, 0.5, 0.0]),
        ] {
            db.store_item(document.clone()).await.expect("store doc");
            let chunk = KnowledgeChunk::new(document, document.full_text.clone(), 0, embedding);
            KnowledgeChunk::replace_for_document(&db, &document.id, vec![chunk])
                .await
                .expect("store chunks");
        }

        let db = Arc::new(db);
        let search = KnowledgeSearch::new(
            db.clone(),
            Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])),
            RetrievalSettings::tutorial(),
            RetrievalSettings::world_book(),
        );

        let isolated = search.search("launcher", Some("thread-1"), Corpus::Tutorial).await;
        assert_eq!(titles(&isolated), vec!["Launcher install", "General FAQ"]);

        ThreadSetting::set_search_mode(&db, "thread-1", SearchMode::Priority)
            .await
            .expect("set mode");
        let priority = search.search("launcher", Some("thread-1"), Corpus::Tutorial).await;
        assert_eq!(priority.first().map(|d| d.title.as_str()), Some("Launcher install"));
        assert_eq!(priority.len(), 3);

        let hashed = KnowledgeSearch::new(
            db,
            Arc::new(EmbeddingProvider::new_hashed(3)),
            RetrievalSettings::tutorial(),
            RetrievalSettings::world_book(),
        );
        assert!(hashed
            .search("launcher", Some("thread-1"), Corpus::WorldBook)
            .await
            .is_empty());
    }
}
