use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tracing::{error, info, warn};

use jobflow::api;
use jobflow::clients::{HttpAuthenticator, LogMailer, ReqwestHttpClient};
use jobflow::config;
use jobflow::db;
use jobflow::jobs::{JobRunner, StepExecutor, StepWorker};
use jobflow::queue::PgQueue;
use jobflow::scheduler::{load_descriptions, Scheduler, SweepOutcome};
use jobflow::store::{PgCronStore, PgJobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    jobflow::init_tracing();

    let auth_url = cfg.require_auth_url()?.to_string();
    let api_addr = cfg.admin_addr.clone();

    info!(
        worker_id = %cfg.worker_id,
        queue = %cfg.queue,
        workers = cfg.workers,
        visibility_secs = cfg.visibility_secs,
        http_timeout_secs = cfg.http_timeout.as_secs(),
        scheduler = cfg.scheduler_enabled,
        purge_interval_secs = cfg.purge_interval.as_secs(),
        api = %api_addr.clone().unwrap_or_else(|| "disabled".to_string()),
        migrate_on_startup = cfg.migrate_on_startup,
        "jobflow worker starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let queue = Arc::new(PgQueue::new(pool.clone(), &cfg.queue, cfg.visibility_secs));
    let runner = JobRunner::new(
        Arc::new(PgJobStore::new(pool.clone())),
        queue.clone(),
        Arc::new(LogMailer),
    );
    let scheduler = Scheduler::new(Arc::new(PgCronStore::new(pool.clone())), runner.clone());
    let executor = StepExecutor::new(
        runner.clone(),
        Arc::new(ReqwestHttpClient::new(cfg.http_timeout)?),
        Arc::new(HttpAuthenticator::new(&auth_url, cfg.http_timeout)?),
    );

    // Declared templates are applied once per start.
    if let Some(path) = cfg.cron_file.as_deref() {
        match load_descriptions(path) {
            Ok(descriptions) => match scheduler.reconcile(descriptions).await {
                Ok(report) => info!(
                    created = report.created.len(),
                    updated = report.updated.len(),
                    deleted = report.deleted.len(),
                    "cron file applied"
                ),
                Err(e) => error!(path, error = %e, "cron file rejected"),
            },
            Err(e) => error!(path, error = %e, "cron file unreadable"),
        }
    }

    // ---- API task ----
    let app = api::router(api::ApiState {
        runner: runner.clone(),
        scheduler: scheduler.clone(),
    });
    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(%addr, "api listening");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Scheduler task ----
    let scheduler_enabled = cfg.scheduler_enabled;
    let scheduler_handle = tokio::spawn(async move {
        if !scheduler_enabled {
            std::future::pending::<()>().await;
        }
        loop {
            // wake shortly after each minute boundary
            let now = Utc::now();
            let wait = 60 - u64::from(now.second()) + 1;
            tokio::time::sleep(Duration::from_secs(wait)).await;

            match scheduler.sweep(Utc::now()).await {
                Ok(SweepOutcome::Skipped) => {}
                Ok(SweepOutcome::Completed(c)) if c.failed > 0 => {
                    warn!(fired = c.fired, failed = c.failed, "sweep had failures")
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "sweep failed"),
            }
        }
        #[allow(unreachable_code)]
        Ok::<(), anyhow::Error>(())
    });

    // ---- Purge task ----
    let purge_interval = cfg.purge_interval;
    let purge_runner = runner.clone();
    let purge_handle = tokio::spawn(async move {
        loop {
            if let Err(e) = purge_runner.purge_expired(Utc::now()).await {
                error!(error = %e, "purge failed");
            }
            tokio::time::sleep(purge_interval).await;
        }
        #[allow(unreachable_code)]
        Ok::<(), anyhow::Error>(())
    });

    // ---- Worker pool ----
    let mut pool_set = tokio::task::JoinSet::new();
    for i in 0..cfg.workers {
        let worker = StepWorker::new(
            format!("{}-{}", cfg.worker_id, i),
            queue.clone(),
            executor.clone(),
        );
        pool_set.spawn(async move {
            info!(worker_id = %worker.id(), "step worker started");
            worker.run().await;
        });
    }
    let workers_handle = tokio::spawn(async move {
        while let Some(res) = pool_set.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "step worker stopped");
            }
        }
        Ok::<(), anyhow::Error>(())
    });

    tokio::select! {
        res = api_handle => res??,
        res = scheduler_handle => res??,
        res = purge_handle => res??,
        res = workers_handle => res??,
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    Ok(())
}
