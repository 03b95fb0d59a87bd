use std::env;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use jobflow::clients::LogMailer;
use jobflow::jobs::JobRunner;
use jobflow::queue::PgQueue;
use jobflow::scheduler::{load_descriptions, Scheduler, SweepOutcome};
use jobflow::store::{PgCronStore, PgJobStore};

const USAGE: &str = "jobflowctl <command>\n\
     Commands:\n\
     - sweep                 fire every due cron template now\n\
     - purge                 delete jobs past their destroy_at\n\
     - fire <template_id>    create a job from a template right away\n\
     - reconcile <file.json> make cron templates match the file\n\
     - show <job_id>         print a job as JSON\n\
     - unlock                clear a wedged scheduler table lock\n\
     \n\
     Uses DATABASE_URL or TEST_DATABASE_URL; JOBFLOW_QUEUE picks the queue.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    jobflow::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let url = env::var("DATABASE_URL")
        .or_else(|_| env::var("TEST_DATABASE_URL"))
        .context("DATABASE_URL or TEST_DATABASE_URL must be set")?;
    let queue_name = env::var("JOBFLOW_QUEUE").unwrap_or_else(|_| "AsyncJobs".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;

    let runner = JobRunner::new(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgQueue::new(pool.clone(), &queue_name, 30)),
        Arc::new(LogMailer),
    );
    let scheduler = Scheduler::new(Arc::new(PgCronStore::new(pool.clone())), runner.clone());

    match args[1].as_str() {
        "sweep" => match scheduler.sweep(Utc::now()).await? {
            SweepOutcome::Skipped => println!("sweep skipped: table lock is held"),
            SweepOutcome::Completed(c) => println!(
                "sweep done: fired={} skipped={} failed={}",
                c.fired, c.skipped, c.failed
            ),
        },
        "purge" => {
            let n = runner.purge_expired(Utc::now()).await?;
            println!("purged {n} expired jobs");
        }
        "fire" => {
            let id = arg(&args, 2, "fire <template_id>")?;
            let t = scheduler.fire_now(id).await?;
            println!(
                "fired {} -> job {}",
                t.id,
                t.last_fired_job_id.map(|j| j.to_string()).unwrap_or_default()
            );
        }
        "reconcile" => {
            let path = arg(&args, 2, "reconcile <file.json>")?;
            let report = scheduler.reconcile(load_descriptions(path)?).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "show" => {
            let id: Uuid = arg(&args, 2, "show <job_id>")?.parse()?;
            match runner.get(id).await? {
                Some(job) => println!("{}", serde_json::to_string_pretty(&job.redacted())?),
                None => {
                    eprintln!("job {id} not found");
                    std::process::exit(1);
                }
            }
        }
        "unlock" => {
            scheduler.lock().release().await?;
            println!("table lock cleared");
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn arg<'a>(args: &'a [String], i: usize, usage: &str) -> anyhow::Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("usage: jobflowctl {usage}"))
}
