use common::utils::config::get_config;
use community_knowledge::{init_tracing, Services};
use review_pipeline::run_sweeper_loop;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = get_config()?;
    let (services, jobs) = Services::connect(config).await?;

    let indexer = services.spawn_indexer(jobs);
    let sweeper = tokio::spawn(run_sweeper_loop(
        services.ledger.clone(),
        services.sweep_interval(),
    ));

    let app = services.router();
    info!("Starting server listening on 0.0.0.0:{}", services.config.http_port);
    let serve_address = format!("0.0.0.0:{}", services.config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        result = sweeper => {
            error!("Sweeper stopped unexpectedly: {:?}", result);
        }
        result = indexer => {
            error!("Indexing worker stopped unexpectedly: {:?}", result);
        }
    }

    Ok(())
}
