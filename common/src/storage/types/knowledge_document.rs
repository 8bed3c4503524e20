use std::{collections::HashMap, fmt, str::FromStr};

use surrealdb::sql::Thing;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Search corpus a document (and its chunks) belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Corpus {
    #[default]
    Tutorial,
    WorldBook,
}

impl Corpus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Tutorial => "tutorial",
            Corpus::WorldBook => "world_book",
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Corpus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tutorial" => Ok(Corpus::Tutorial),
            "world_book" => Ok(Corpus::WorldBook),
            other => Err(AppError::Validation(format!("unknown corpus '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Tutorial,
    GeneralKnowledge,
    CommunityMember,
}

impl DocumentKind {
    pub fn corpus(&self) -> Corpus {
        match self {
            DocumentKind::Tutorial => Corpus::Tutorial,
            DocumentKind::GeneralKnowledge | DocumentKind::CommunityMember => Corpus::WorldBook,
        }
    }
}

stored_object!(KnowledgeDocument, "knowledge_document", {
    kind: DocumentKind,
    corpus: Corpus,
    title: String,
    full_text: String,
    scope: Option<String>,
    external_id: Option<String>,
    natural_key: Option<String>,
    metadata: serde_json::Value
});

impl KnowledgeDocument {
    pub fn new(
        kind: DocumentKind,
        title: String,
        full_text: String,
        scope: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            kind,
            corpus: kind.corpus(),
            title,
            full_text,
            scope,
            external_id: None,
            natural_key: None,
            metadata,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Keys the document by a natural identity and derives a stable record id from it,
    /// so two writers for the same key always address the same row.
    pub fn with_natural_key(mut self, natural_key: impl Into<String>) -> Self {
        let key = natural_key.into();
        self.id = Self::id_for_natural_key(self.kind, &key);
        self.natural_key = Some(key);
        self
    }

    pub fn id_for_natural_key(kind: DocumentKind, natural_key: &str) -> String {
        let prefix = match kind {
            DocumentKind::Tutorial => "tutorial",
            DocumentKind::GeneralKnowledge => "knowledge",
            DocumentKind::CommunityMember => "member",
        };
        format!("{prefix}_{natural_key}")
    }

    /// Fetches documents and returns them in the order of `ids`; unknown ids are skipped.
    pub async fn get_many_ordered(
        db: &SurrealDbClient,
        ids: &[String],
    ) -> Result<Vec<Self>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let things: Vec<Thing> = ids
            .iter()
            .map(|id| Thing::from((Self::table_name(), id.as_str())))
            .collect();

        let documents: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE id IN $things")
            .bind(("table", Self::table_name()))
            .bind(("things", things))
            .await?
            .take(0)?;

        let mut by_id: HashMap<String, Self> = documents
            .into_iter()
            .map(|document| (document.id.clone(), document))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Removes the document together with its chunk set in one transaction.
    pub async fn delete_with_chunks(db: &SurrealDbClient, id: &str) -> Result<bool, AppError> {
        let existing = db.get_item::<Self>(id).await?;
        if existing.is_none() {
            return Ok(false);
        }

        db.client
            .query(
                "BEGIN TRANSACTION;
                 DELETE knowledge_chunk WHERE document_id = $document_id;
                 DELETE type::thing($table, $document_id);
                 COMMIT TRANSACTION;",
            )
            .bind(("table", Self::table_name()))
            .bind(("document_id", id.to_owned()))
            .await?
            .check()?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::knowledge_chunk::KnowledgeChunk;
    use serde_json::json;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb")
    }

    #[test]
    fn kind_determines_corpus() {
        let tutorial = KnowledgeDocument::new(
            DocumentKind::Tutorial,
            "Install guide".into(),
            "Step one.".into(),
            Some("thread-1".into()),
            json!({}),
        );
        assert_eq!(tutorial.corpus, Corpus::Tutorial);

        let member = KnowledgeDocument::new(
            DocumentKind::CommunityMember,
            "Alice".into(),
            "Likes tea.".into(),
            None,
            json!({}),
        )
        .with_natural_key("42");
        assert_eq!(member.corpus, Corpus::WorldBook);
        assert_eq!(member.id, "member_42");
        assert_eq!(member.natural_key.as_deref(), Some("42"));
    }

    #[test]
    fn corpus_parses_from_wire_names() {
        assert_eq!("world_book".parse::<Corpus>().ok(), Some(Corpus::WorldBook));
        assert!("books".parse::<Corpus>().is_err());
    }

    #[tokio::test]
    async fn get_many_ordered_follows_requested_order() {
        let db = memory_db().await;
        let mut ids = Vec::new();
        for title in ["first", "second", "third"] {
            let doc = KnowledgeDocument::new(
                DocumentKind::Tutorial,
                title.into(),
                format!("{title} body"),
                None,
                json!({}),
            );
            ids.push(doc.id.clone());
            db.store_item(doc).await.expect("store");
        }

        let requested = vec![ids[2].clone(), "missing".to_string(), ids[0].clone()];
        let docs = KnowledgeDocument::get_many_ordered(&db, &requested)
            .await
            .expect("fetch");

        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "first"]);
    }

    #[tokio::test]
    async fn delete_with_chunks_removes_chunk_set() {
        let db = memory_db().await;
        let doc = KnowledgeDocument::new(
            DocumentKind::Tutorial,
            "Guide".into(),
            "Body.".into(),
            None,
            json!({}),
        );
        db.store_item(doc.clone()).await.expect("store doc");
        let chunk = KnowledgeChunk::new(&doc, "Body.".into(), 0, vec![0.1, 0.2, 0.3]);
        db.store_item(chunk.clone()).await.expect("store chunk");

        let removed = KnowledgeDocument::delete_with_chunks(&db, &doc.id)
            .await
            .expect("delete");
        assert!(removed);

        let chunk_after = db
            .get_item::<KnowledgeChunk>(&chunk.id)
            .await
            .expect("fetch chunk");
        assert!(chunk_after.is_none());
        assert!(!KnowledgeDocument::delete_with_chunks(&db, &doc.id)
            .await
            .expect("second delete"));
    }
}
