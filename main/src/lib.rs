//! Process wiring shared by the `server`, `worker` and `main` binaries.

use std::{sync::Arc, time::Duration};

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    error::AppError,
    storage::db::SurrealDbClient,
    utils::{
        config::AppConfig,
        embedding::{Embedder, EmbeddingProvider},
    },
};
use retrieval_pipeline::KnowledgeSearch;
use review_pipeline::{
    DiscordMessenger, DocumentIndexer, IndexJob, IndexingQueue, Messenger, ReviewLedger,
    SurrealCoinLedger,
};
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// Long-lived services, built once at startup and shared by reference.
pub struct Services {
    pub config: AppConfig,
    pub db: Arc<SurrealDbClient>,
    pub search: Arc<KnowledgeSearch>,
    pub ledger: Arc<ReviewLedger>,
    pub indexing: IndexingQueue,
    pub indexer: Arc<DocumentIndexer>,
}

impl Services {
    /// Connects to SurrealDB, bootstraps indexes and wires every service.
    pub async fn connect(
        config: AppConfig,
    ) -> Result<(Self, UnboundedReceiver<IndexJob>), AppError> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        let messenger = Arc::new(DiscordMessenger::from_config(&config));
        Self::assemble(config, db, messenger).await
    }

    pub async fn assemble(
        config: AppConfig,
        db: Arc<SurrealDbClient>,
        messenger: Arc<dyn Messenger>,
    ) -> Result<(Self, UnboundedReceiver<IndexJob>), AppError> {
        let embedder = Arc::new(EmbeddingProvider::from_config(&config));
        info!(
            embedding_backend = embedder.backend_label(),
            embedding_dimension = embedder.dimension(),
            "Embedding provider initialized"
        );

        db.ensure_initialized(embedder.dimension()).await?;

        let (indexing, jobs) = IndexingQueue::new();
        let search = Arc::new(KnowledgeSearch::from_config(
            db.clone(),
            embedder.clone(),
            &config,
        ));
        let ledger = Arc::new(ReviewLedger::new(
            db.clone(),
            messenger,
            Arc::new(SurrealCoinLedger::new(db.clone())),
            indexing.clone(),
            config.review.clone(),
        ));
        let indexer = Arc::new(DocumentIndexer::from_config(db.clone(), embedder, &config));

        Ok((
            Self {
                config,
                db,
                search,
                ledger,
                indexing,
                indexer,
            },
            jobs,
        ))
    }

    pub fn router(&self) -> Router {
        let api_state = ApiState::new(
            &self.config,
            self.db.clone(),
            self.search.clone(),
            self.ledger.clone(),
            self.indexing.clone(),
        );

        Router::new()
            .nest("/api/v1", api_routes_v1(&api_state))
            .layer(TraceLayer::new_for_http())
            .with_state(api_state)
    }

    pub fn spawn_indexer(&self, jobs: UnboundedReceiver<IndexJob>) -> JoinHandle<()> {
        self.indexer.clone().spawn(jobs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.config.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::utils::config::EmbeddingBackend;
    use review_pipeline::messaging::{ReviewCard, Voter};
    use std::collections::HashMap;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct OfflineMessenger;

    #[async_trait::async_trait]
    impl Messenger for OfflineMessenger {
        async fn post_review(
            &self,
            channel_id: &str,
            _card: &ReviewCard,
            _reactions: &[String],
        ) -> Result<i64, AppError> {
            Err(AppError::StaleReference(format!("channel {channel_id}")))
        }

        async fn edit_review(
            &self,
            _channel_id: &str,
            _message_id: i64,
            _card: &ReviewCard,
        ) -> Result<(), AppError> {
            Ok(())
        }

        async fn send_dm(&self, _user_id: &str, _content: &str) -> Result<(), AppError> {
            Ok(())
        }

        async fn reaction_counts(
            &self,
            _channel_id: &str,
            _message_id: i64,
        ) -> Result<Option<HashMap<String, u32>>, AppError> {
            Ok(None)
        }

        async fn reaction_voters(
            &self,
            _channel_id: &str,
            _message_id: i64,
            _emoji: &str,
        ) -> Result<Option<Vec<Voter>>, AppError> {
            Ok(None)
        }

        async fn channel_exists(&self, _channel_id: &str) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    async fn services() -> (Services, UnboundedReceiver<IndexJob>) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        let config = AppConfig {
            embedding_backend: EmbeddingBackend::Hashed,
            embedding_dimensions: 8,
            sweep_interval_secs: 0,
            ..AppConfig::default()
        };
        Services::assemble(config, db, Arc::new(OfflineMessenger))
            .await
            .expect("services")
    }

    #[tokio::test]
    async fn router_serves_probes_under_api_prefix() {
        let (services, _jobs) = services().await;

        let response = services
            .router()
            .oneshot(
                Request::get("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(services.sweep_interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn indexer_worker_drains_the_queue() {
        let (services, jobs) = services().await;
        let stats = services.indexer.stats();
        let handle = services.spawn_indexer(jobs);

        services
            .indexing
            .enqueue(IndexJob::Index("missing".into()))
            .expect("enqueue");
        let Services {
            indexing, ledger, ..
        } = services;
        drop(indexing);
        drop(ledger);

        handle.await.expect("worker stops once every sender is gone");
        assert_eq!(stats.processed(), 1);
    }
}
