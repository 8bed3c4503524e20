use std::collections::HashMap;

use surrealdb::sql::Thing;
use tracing::debug;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::knowledge_document::{Corpus, KnowledgeDocument};

stored_object!(KnowledgeChunk, "knowledge_chunk", {
    document_id: String,
    corpus: Corpus,
    scope: Option<String>,
    text: String,
    order_index: u32,
    embedding: Vec<f32>
});

#[derive(Debug, Deserialize)]
struct ChunkOwnerRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    document_id: String,
}

impl KnowledgeChunk {
    /// Creates a chunk owned by `document`, inheriting its corpus and scope.
    pub fn new(
        document: &KnowledgeDocument,
        text: String,
        order_index: u32,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id: document.id.clone(),
            corpus: document.corpus,
            scope: document.scope.clone(),
            text,
            order_index,
            embedding,
        }
    }

    /// Swaps the chunk set of a document: old chunks are deleted and the new ones
    /// inserted in a single transaction, so readers never see a partial set.
    ///
    /// The document must still exist when the transaction runs. Returns `false`
    /// and writes nothing when it was deleted in the meantime.
    pub async fn replace_for_document(
        db: &SurrealDbClient,
        document_id: &str,
        chunks: Vec<Self>,
    ) -> Result<bool, AppError> {
        if chunks.iter().any(|chunk| chunk.document_id != document_id) {
            return Err(AppError::Validation(format!(
                "chunk set for {document_id} contains chunks of another document"
            )));
        }

        let count = chunks.len();
        let query = if chunks.is_empty() {
            "BEGIN TRANSACTION;
             IF array::len((SELECT id FROM type::thing($document_table, $document_id))) == 0 { THROW 'document is gone'; };
             DELETE knowledge_chunk WHERE document_id = $document_id;
             COMMIT TRANSACTION;"
        } else {
            "BEGIN TRANSACTION;
             IF array::len((SELECT id FROM type::thing($document_table, $document_id))) == 0 { THROW 'document is gone'; };
             DELETE knowledge_chunk WHERE document_id = $document_id;
             INSERT INTO knowledge_chunk $chunks;
             COMMIT TRANSACTION;"
        };

        let committed = match db
            .client
            .query(query)
            .bind(("document_table", KnowledgeDocument::table_name()))
            .bind(("document_id", document_id.to_owned()))
            .bind(("chunks", chunks))
            .await
        {
            Ok(response) => response.check().map(|_| ()),
            Err(err) => Err(err),
        };

        if let Err(err) = committed {
            if db.get_item::<KnowledgeDocument>(document_id).await?.is_none() {
                debug!(%document_id, "document deleted before its chunks were written");
                return Ok(false);
            }
            return Err(AppError::Database(err));
        }

        debug!(%document_id, chunk_count = count, "chunk set replaced");
        Ok(true)
    }

    /// Chunk set of a document in order. Read back by tests only.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn get_by_document_id(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE document_id = $document_id ORDER BY order_index ASC")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_owned()))
            .await?
            .take(0)?;

        Ok(chunks)
    }

    /// Maps chunk ids to their owning document ids. Unknown chunk ids are absent from the map.
    pub async fn owners(
        db: &SurrealDbClient,
        chunk_ids: &[String],
    ) -> Result<HashMap<String, String>, AppError> {
        if chunk_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let things: Vec<Thing> = chunk_ids
            .iter()
            .map(|id| Thing::from((Self::table_name(), id.as_str())))
            .collect();

        let rows: Vec<ChunkOwnerRow> = db
            .client
            .query("SELECT id, document_id FROM type::table($table) WHERE id IN $things")
            .bind(("table", Self::table_name()))
            .bind(("things", things))
            .await?
            .take(0)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.id, row.document_id))
            .collect())
    }
}
