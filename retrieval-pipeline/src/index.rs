use std::collections::HashMap;

use async_trait::async_trait;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            knowledge_chunk::KnowledgeChunk,
            knowledge_document::{Corpus, KnowledgeDocument},
            thread_setting::{SearchMode, ThreadSetting},
        },
    },
};

use crate::{
    candidates::{find_chunks_by_fts, find_chunks_by_vector},
    scoring::Candidate,
};

/// Store operations the search path depends on.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    async fn query_dense(
        &self,
        embedding: Vec<f32>,
        corpus: Corpus,
        top_k: usize,
    ) -> Result<Vec<Candidate>, AppError>;

    async fn query_lexical(
        &self,
        text: &str,
        corpus: Corpus,
        top_k: usize,
    ) -> Result<Vec<Candidate>, AppError>;

    /// Chunk id to owning document id. Unknown chunks are absent.
    async fn chunk_owners(&self, chunk_ids: &[String]) -> Result<HashMap<String, String>, AppError>;

    /// Documents in the order of `ids`, skipping unknown ones.
    async fn get_documents(&self, ids: &[String]) -> Result<Vec<KnowledgeDocument>, AppError>;

    async fn search_mode(&self, thread_id: &str) -> Result<SearchMode, AppError>;
}

#[async_trait]
impl KnowledgeIndex for SurrealDbClient {
    async fn query_dense(
        &self,
        embedding: Vec<f32>,
        corpus: Corpus,
        top_k: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        find_chunks_by_vector(top_k, embedding, corpus, self).await
    }

    async fn query_lexical(
        &self,
        text: &str,
        corpus: Corpus,
        top_k: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        find_chunks_by_fts(top_k, text, corpus, self).await
    }

    async fn chunk_owners(&self, chunk_ids: &[String]) -> Result<HashMap<String, String>, AppError> {
        KnowledgeChunk::owners(self, chunk_ids).await
    }

    async fn get_documents(&self, ids: &[String]) -> Result<Vec<KnowledgeDocument>, AppError> {
        KnowledgeDocument::get_many_ordered(self, ids).await
    }

    async fn search_mode(&self, thread_id: &str) -> Result<SearchMode, AppError> {
        ThreadSetting::get_search_mode(self, thread_id).await
    }
}
