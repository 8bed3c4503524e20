use common::utils::config::get_config;
use community_knowledge::{init_tracing, Services};
use review_pipeline::run_sweeper_loop;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = get_config()?;
    let (services, jobs) = Services::connect(config).await?;

    let _indexer = services.spawn_indexer(jobs);
    run_sweeper_loop(services.ledger.clone(), services.sweep_interval()).await;

    Ok(())
}
