use std::sync::Arc;

use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use retrieval_pipeline::KnowledgeSearch;
use review_pipeline::{IndexingQueue, ReviewLedger};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub search: Arc<KnowledgeSearch>,
    pub ledger: Arc<ReviewLedger>,
    pub indexing: IndexingQueue,
}

impl ApiState {
    pub fn new(
        config: &AppConfig,
        db: Arc<SurrealDbClient>,
        search: Arc<KnowledgeSearch>,
        ledger: Arc<ReviewLedger>,
        indexing: IndexingQueue,
    ) -> Self {
        Self {
            db,
            config: config.clone(),
            search,
            ledger,
            indexing,
        }
    }
}
