/*!
 * Dose Kernel - Main Entry Point
 *
 * Wires the pipeline to its collaborators:
 * - Postgres order store
 * - Compound service and virtual-individual catalogue
 * - External simulation process
 * - Downstream delivery endpoint
 */

use anyhow::Context;
use dose_kernel::precheck::ModelCatalog;
use dose_kernel::process::platform_supervisor;
use dose_kernel::{
    config, init_tracing, CompoundClient, DeliveryClient, IndividualClient, JobScheduler,
    OrderStore, PgOrderStore, PrecheckPipeline, ProcessExecutor, ResultDispatcher,
    SimulationRunner,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Dose kernel starting...");
    let config = config::load().context("loading configuration")?;

    info!("Connecting order store...");
    let store: Arc<dyn OrderStore> = Arc::new(
        PgOrderStore::connect(
            &config.database.url,
            config.database.max_connections,
            config.database.acquire_timeout,
        )
        .await
        .context("connecting to the order database")?,
    );

    info!("Initializing lookup clients...");
    let compounds = Arc::new(CompoundClient::new(&config.compounds)?);
    let individuals = Arc::new(IndividualClient::new(&config.individuals)?);
    let pipeline = Arc::new(PrecheckPipeline::new(
        compounds,
        individuals,
        &config.precheck,
    ));
    info!(models = pipeline.catalog().len(), "Precheck pipeline ready");

    info!("Initializing simulation runner...");
    let executor = Arc::new(ProcessExecutor::new(
        config.simulation.clone(),
        platform_supervisor(),
    ));
    let runner = SimulationRunner::new(
        executor,
        store.clone(),
        ModelCatalog::new(config.precheck.models.clone()),
        &config.simulation,
    );

    let mut scheduler = JobScheduler::new(
        store.clone(),
        pipeline,
        Arc::new(runner.clone()),
        config.scheduler.clone(),
    );
    scheduler.start().await.context("starting the job scheduler")?;

    let sink = Arc::new(DeliveryClient::new(&config.delivery)?);
    let dispatcher = ResultDispatcher::new(store, sink, config.dispatch.clone()).spawn();

    info!("Dose kernel ready - press Ctrl+C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;

    info!("Shutting down...");
    scheduler.stop().await;
    dispatcher.shutdown().await;
    runner.drain().await;
    info!("Dose kernel stopped");
    Ok(())
}
