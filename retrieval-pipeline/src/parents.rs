use std::collections::{HashMap, HashSet};

use common::{error::AppError, storage::types::knowledge_document::KnowledgeDocument};

use crate::index::KnowledgeIndex;

/// Maps ranked chunk ids to their parent ids, keeping each parent at the position of its
/// first chunk, then caps the list at `max_parents`. Chunks without an owner are skipped.
pub fn unique_parent_ids(
    ordered_chunk_ids: &[String],
    owners: &HashMap<String, String>,
    max_parents: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    ordered_chunk_ids
        .iter()
        .filter_map(|chunk_id| owners.get(chunk_id))
        .filter(|document_id| seen.insert(document_id.as_str()))
        .take(max_parents)
        .cloned()
        .collect()
}

/// Resolves ranked chunk ids into unique parent documents in rank order.
pub async fn resolve_parents<I>(
    index: &I,
    ordered_chunk_ids: &[String],
    max_parents: usize,
) -> Result<Vec<KnowledgeDocument>, AppError>
where
    I: KnowledgeIndex + ?Sized,
{
    if ordered_chunk_ids.is_empty() || max_parents == 0 {
        return Ok(Vec::new());
    }

    let owners = index.chunk_owners(ordered_chunk_ids).await?;
    let parent_ids = unique_parent_ids(ordered_chunk_ids, &owners, max_parents);
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }

    index.get_documents(&parent_ids).await
}
