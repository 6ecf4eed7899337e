//! Worker daemon: wires configuration, logging, the shared
//! [`ProcessContext`], and one pool of workers per pipeline stage, mirroring
//! the teacher agent binary's `main`/`async_main` split and
//! `tracing_subscriber::FmtSubscriber` setup.

use std::sync::Arc;

use archivist_bus::nsq::NsqBus;
use archivist_bus::Bus;
use archivist_catalog::Client as CatalogClient;
use archivist_config::Config;
use archivist_diskres::DiskReservation;
use archivist_inflight::InFlightRegistry;
use archivist_objectstore::Client as ObjectStoreClient;
use archivist_pipeline::cleanup::CleanupStage;
use archivist_pipeline::delete::DeleteStage;
use archivist_pipeline::fetch::FetchStage;
use archivist_pipeline::fixity::FixityStage;
use archivist_pipeline::record::RecordStage;
use archivist_pipeline::restore::RestoreStage;
use archivist_pipeline::store::StoreStage;
use archivist_pipeline::unpack::UnpackStage;
use archivist_pipeline::{run_worker, ProcessContext, Stage};
use clap::Parser;

fn main() -> Result<(), anyhow::Error> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let config = Config::parse();
    config.validate()?;
    tracing::info!(working_dir = %config.working_dir.display(), "started!");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async_main(config));
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result
}

async fn async_main(config: Config) -> Result<(), anyhow::Error> {
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
    let s3 = aws_sdk_s3::Client::new(&aws_config);

    let store = Arc::new(ObjectStoreClient::new(s3));
    let catalog = Arc::new(CatalogClient::new(
        config.catalog_url.to_string(),
        config.catalog_user.clone(),
        config.catalog_key.clone(),
    )?);
    let disk = Arc::new(DiskReservation::new(&config.working_dir, 10 * 1024 * 1024 * 1024)?);
    let inflight = Arc::new(InFlightRegistry::new());

    let ctx = ProcessContext::new(
        store,
        catalog,
        disk,
        inflight,
        config.working_dir.clone(),
        config.preservation_bucket.clone(),
        "Archivist".to_string(),
        config.restore_to_test_buckets,
    );

    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });

    // `NsqBus` carries no per-topic state (the topic is a call argument on
    // `publish`/`consume`, not a field), so one instance is shared across
    // every stage's worker pool rather than rebuilt per topic.
    let bus: Arc<dyn Bus> = Arc::new(NsqBus::new(
        config.nsq_http_address.clone(),
        config.nsq_tcp_address.clone(),
        config.nsq_channel.clone(),
    ));

    let mut handles = Vec::new();
    spawn_pool(
        &mut handles,
        &bus,
        &ctx,
        archivist_pipeline::TOPIC_FETCH,
        config.fetch_workers,
        Arc::new(FetchStage),
    );
    spawn_pool(
        &mut handles,
        &bus,
        &ctx,
        archivist_pipeline::TOPIC_UNPACK,
        config.unpack_workers,
        Arc::new(UnpackStage),
    );
    spawn_pool(
        &mut handles,
        &bus,
        &ctx,
        archivist_pipeline::TOPIC_STORE,
        config.store_workers,
        Arc::new(StoreStage),
    );
    spawn_pool(
        &mut handles,
        &bus,
        &ctx,
        archivist_pipeline::TOPIC_RECORD,
        config.record_workers,
        Arc::new(RecordStage),
    );
    spawn_pool(
        &mut handles,
        &bus,
        &ctx,
        archivist_pipeline::TOPIC_CLEANUP,
        config.cleanup_workers,
        Arc::new(CleanupStage { delete_on_success: false }),
    );
    spawn_pool(
        &mut handles,
        &bus,
        &ctx,
        archivist_pipeline::TOPIC_RESTORE,
        config.restore_workers,
        Arc::new(RestoreStage),
    );
    spawn_pool(
        &mut handles,
        &bus,
        &ctx,
        archivist_pipeline::TOPIC_DELETE,
        config.delete_workers,
        Arc::new(DeleteStage),
    );
    spawn_pool(
        &mut handles,
        &bus,
        &ctx,
        archivist_pipeline::TOPIC_FIXITY,
        config.fixity_workers,
        Arc::new(FixityStage),
    );

    for handle in handles {
        handle.await.ok();
    }

    tracing::info!("all workers shut down");
    Ok(())
}

fn spawn_pool(
    handles: &mut Vec<tokio::task::JoinHandle<()>>,
    bus: &Arc<dyn Bus>,
    ctx: &ProcessContext,
    topic: &'static str,
    count: usize,
    stage: Arc<dyn Stage>,
) {
    for _ in 0..count {
        let bus = bus.clone();
        let stage = stage.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            run_worker(bus, topic, stage, ctx).await;
        }));
    }
}
