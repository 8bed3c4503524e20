use common::utils::config::get_config;
use community_knowledge::{init_tracing, Services};
use tracing::info;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = get_config()?;
    let (services, jobs) = Services::connect(config).await?;

    // Approvals triggered over HTTP enqueue in-process, so the indexer runs here too.
    let _indexer = services.spawn_indexer(jobs);

    let app = services.router();

    info!("Starting server listening on 0.0.0.0:{}", services.config.http_port);
    let serve_address = format!("0.0.0.0:{}", services.config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
