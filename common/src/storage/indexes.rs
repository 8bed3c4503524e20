use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::{error::AppError, storage::db::SurrealDbClient};

pub const FTS_ANALYZER_NAME: &str = "knowledge_fts_analyzer";

#[derive(Clone, Copy)]
struct HnswIndexSpec {
    index_name: &'static str,
    table: &'static str,
    options: &'static str,
}

impl HnswIndexSpec {
    fn definition_if_not_exists(&self, dimension: usize) -> String {
        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} \
             FIELDS embedding HNSW DIMENSION {dimension} {options};",
            index = self.index_name,
            table = self.table,
            options = self.options,
        )
    }

    fn definition_overwrite(&self, dimension: usize) -> String {
        format!(
            "DEFINE INDEX OVERWRITE {index} ON TABLE {table} \
             FIELDS embedding HNSW DIMENSION {dimension} {options};",
            index = self.index_name,
            table = self.table,
            options = self.options,
        )
    }
}

#[derive(Clone, Copy)]
struct FieldIndexSpec {
    index_name: &'static str,
    table: &'static str,
    field: &'static str,
    analyzer: Option<&'static str>,
}

impl FieldIndexSpec {
    fn definition(&self) -> String {
        let analyzer_clause = self
            .analyzer
            .map(|analyzer| format!(" SEARCH ANALYZER {analyzer} BM25"))
            .unwrap_or_default();

        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {field}{analyzer_clause};",
            index = self.index_name,
            table = self.table,
            field = self.field,
        )
    }
}

const CHUNK_HNSW_INDEX: HnswIndexSpec = HnswIndexSpec {
    index_name: "idx_embedding_knowledge_chunk",
    table: "knowledge_chunk",
    options: "DIST COSINE TYPE F32 EFC 100 M 8",
};

const fn field_index_specs() -> [FieldIndexSpec; 4] {
    [
        FieldIndexSpec {
            index_name: "knowledge_chunk_fts_text_idx",
            table: "knowledge_chunk",
            field: "text",
            analyzer: Some(FTS_ANALYZER_NAME),
        },
        FieldIndexSpec {
            index_name: "knowledge_chunk_document_idx",
            table: "knowledge_chunk",
            field: "document_id",
            analyzer: None,
        },
        FieldIndexSpec {
            index_name: "pending_submission_status_idx",
            table: "pending_submission",
            field: "status",
            analyzer: None,
        },
        FieldIndexSpec {
            index_name: "pending_submission_message_idx",
            table: "pending_submission",
            field: "review_message_id",
            analyzer: None,
        },
    ]
}

/// Build the analyzer, lookup, FTS and HNSW indexes.
/// Idempotent: safe to call multiple times and will overwrite the HNSW definition when the dimension changes.
pub async fn ensure_runtime_indexes(
    db: &SurrealDbClient,
    embedding_dimension: usize,
) -> Result<(), AppError> {
    ensure_runtime_indexes_inner(db, embedding_dimension)
        .await
        .map_err(|err| AppError::InternalError(err.to_string()))
}

async fn ensure_runtime_indexes_inner(
    db: &SurrealDbClient,
    embedding_dimension: usize,
) -> Result<()> {
    create_fts_analyzer(db).await?;

    for spec in field_index_specs() {
        run_definition(db, spec.definition(), spec.index_name, spec.table).await?;
    }

    ensure_hnsw_index(db, &CHUNK_HNSW_INDEX, embedding_dimension).await
}

async fn ensure_hnsw_index(
    db: &SurrealDbClient,
    spec: &HnswIndexSpec,
    dimension: usize,
) -> Result<()> {
    let definition = match current_hnsw_dimension(db, spec).await? {
        Some(existing) if existing != dimension as u64 => {
            info!(
                index = spec.index_name,
                table = spec.table,
                existing_dimension = existing,
                target_dimension = dimension,
                "Overwriting HNSW index to match new embedding dimension"
            );
            spec.definition_overwrite(dimension)
        }
        _ => spec.definition_if_not_exists(dimension),
    };

    run_definition(db, definition, spec.index_name, spec.table).await
}

async fn current_hnsw_dimension(db: &SurrealDbClient, spec: &HnswIndexSpec) -> Result<Option<u64>> {
    let info_query = format!("INFO FOR TABLE {table};", table = spec.table);
    let mut response = db
        .client
        .query(info_query)
        .await
        .with_context(|| format!("fetching table info for {}", spec.table))?;

    let info: surrealdb::Value = response
        .take(0)
        .context("failed to take table info response")?;

    let info_json: Value =
        serde_json::to_value(info).context("serializing table info to JSON for parsing")?;

    Ok(info_json
        .get("Object")
        .and_then(|o| o.get("indexes"))
        .and_then(|i| i.get("Object"))
        .and_then(|i| i.get(spec.index_name))
        .and_then(|details| details.get("Strand"))
        .and_then(Value::as_str)
        .and_then(extract_dimension))
}

fn extract_dimension(definition: &str) -> Option<u64> {
    definition
        .split("DIMENSION")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|token| token.trim_end_matches(';').parse::<u64>().ok())
}

async fn create_fts_analyzer(db: &SurrealDbClient) -> Result<()> {
    let analyzer_query = format!(
        "DEFINE ANALYZER IF NOT EXISTS {analyzer}
            TOKENIZERS class
            FILTERS lowercase, ascii, snowball(english);",
        analyzer = FTS_ANALYZER_NAME
    );

    let res = db
        .client
        .query(analyzer_query)
        .await
        .context("creating FTS analyzer")?;

    res.check().context("failed to create FTS analyzer")?;
    Ok(())
}

async fn run_definition(
    db: &SurrealDbClient,
    definition: String,
    index_name: &str,
    table: &str,
) -> Result<()> {
    let res = db
        .client
        .query(definition)
        .await
        .with_context(|| format!("creating index {index_name} on table {table}"))?;
    res.check()
        .with_context(|| format!("index definition failed for {index_name} on {table}"))?;

    info!(index = %index_name, table = %table, "Index ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn extract_dimension_parses_value() {
        let definition = "DEFINE INDEX idx_embedding_knowledge_chunk ON TABLE knowledge_chunk FIELDS embedding HNSW DIMENSION 1536 DIST COSINE TYPE F32 EFC 100 M 8;";
        assert_eq!(extract_dimension(definition), Some(1536));
        assert_eq!(extract_dimension("DEFINE INDEX plain ON TABLE t FIELDS f;"), None);
    }

    #[test]
    fn fts_definition_mentions_analyzer() {
        let specs = field_index_specs();
        let fts = specs
            .iter()
            .find(|spec| spec.analyzer.is_some())
            .expect("one FTS spec");
        let definition = fts.definition();

        assert!(definition.contains("SEARCH ANALYZER knowledge_fts_analyzer BM25"));
        assert!(definition.starts_with("DEFINE INDEX IF NOT EXISTS knowledge_chunk_fts_text_idx"));
    }

    #[tokio::test]
    async fn ensure_runtime_indexes_is_idempotent() {
        let namespace = "indexes_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("in-memory db");

        ensure_runtime_indexes(&db, 1536)
            .await
            .expect("initial index creation");

        ensure_runtime_indexes(&db, 1536)
            .await
            .expect("second index creation");
    }

    #[tokio::test]
    async fn ensure_hnsw_index_overwrites_dimension() {
        let namespace = "indexes_dim";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("in-memory db");

        ensure_runtime_indexes(&db, 1536)
            .await
            .expect("initial index creation");

        ensure_runtime_indexes(&db, 128)
            .await
            .expect("overwritten index creation");
    }
}
