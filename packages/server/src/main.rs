use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mq::{MqConfig, init_mq};
use tracing::{info, warn};

use server::config::AppConfig;
use server::consumers::{consume_judge_results, consume_status_updates, consume_worker_dlq};
use server::dlq::run_reconciler;
use server::state::AppState;
use server::{build_router, database, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = database::init_db(&config.database.url)
        .await
        .context("Failed to initialize database")?;

    if config.seed_demo_data {
        seed::seed_demo_data(&db)
            .await
            .context("Failed to seed demo data")?;
    }

    let mq = if config.mq.enabled {
        let mq = Arc::new(
            init_mq(MqConfig {
                url: config.mq.url.clone(),
                pool_size: config.mq.pool_size,
            })
            .await
            .context("Failed to initialize MQ")?,
        );

        info!(
            queue_name = %config.mq.queue_name,
            status_queue_name = %config.mq.status_queue_name,
            result_queue_name = %config.mq.result_queue_name,
            dlq_queue_name = %config.mq.dlq_queue_name,
            "MQ connected"
        );

        tokio::spawn(consume_status_updates(
            db.clone(),
            Arc::clone(&mq),
            config.mq.clone(),
        ));
        tokio::spawn(consume_judge_results(
            db.clone(),
            Arc::clone(&mq),
            config.mq.clone(),
        ));
        tokio::spawn(consume_worker_dlq(
            db.clone(),
            Arc::clone(&mq),
            config.mq.dlq_queue_name.clone(),
        ));

        Some(mq)
    } else {
        warn!("MQ disabled; accepted submissions will not be judged");
        None
    };

    tokio::spawn(run_reconciler(db.clone(), mq.clone(), config.mq.clone()));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState { config, db, mq };
    let app = build_router(state);

    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
