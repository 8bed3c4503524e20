use serde::Deserialize;
use tracing::debug;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{knowledge_document::Corpus, serde_helpers::deserialize_flexible_id},
    },
};

use crate::scoring::Candidate;

#[derive(Debug, Deserialize)]
struct DenseRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    #[serde(default)]
    scope: Option<String>,
    #[allow(dead_code)]
    distance: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct FtsScoreRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    #[serde(default)]
    scope: Option<String>,
    #[allow(dead_code)]
    fts_score: Option<f32>,
}

/// Nearest chunks of `corpus` by embedding distance, closest first.
pub async fn find_chunks_by_vector(
    take: usize,
    embedding: Vec<f32>,
    corpus: Corpus,
    db_client: &SurrealDbClient,
) -> Result<Vec<Candidate>, AppError> {
    if take == 0 || embedding.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT id, scope, vector::distance::knn() AS distance \
         FROM knowledge_chunk \
         WHERE corpus = $corpus AND embedding <|{take},40|> $embedding \
         ORDER BY distance ASC"
    );

    let rows: Vec<DenseRow> = db_client
        .query(sql)
        .bind(("corpus", corpus))
        .bind(("embedding", embedding))
        .await?
        .take(0)?;

    debug!(corpus = %corpus, limit = take, hits = rows.len(), "dense candidates");

    Ok(rows
        .into_iter()
        .take(take)
        .map(|row| Candidate {
            chunk_id: row.id,
            scope: row.scope,
        })
        .collect())
}

/// Chunks of `corpus` matching `terms` in the BM25 index, best score first.
pub async fn find_chunks_by_fts(
    take: usize,
    terms: &str,
    corpus: Corpus,
    db_client: &SurrealDbClient,
) -> Result<Vec<Candidate>, AppError> {
    if take == 0 || terms.trim().is_empty() {
        return Ok(Vec::new());
    }

    let sql = "SELECT id, scope, \
               IF search::score(0) != NONE THEN search::score(0) ELSE 0 END AS fts_score \
               FROM knowledge_chunk \
               WHERE (text @0@ $terms) AND corpus = $corpus \
               ORDER BY fts_score DESC \
               LIMIT $limit";

    let rows: Vec<FtsScoreRow> = db_client
        .query(sql)
        .bind(("terms", terms.to_owned()))
        .bind(("corpus", corpus))
        .bind(("limit", take as i64))
        .await?
        .take(0)?;

    debug!(corpus = %corpus, limit = take, hits = rows.len(), "lexical candidates");

    Ok(rows
        .into_iter()
        .map(|row| Candidate {
            chunk_id: row.id,
            scope: row.scope,
        })
        .collect())
}
