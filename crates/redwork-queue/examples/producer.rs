//! Submit one job of each kind to the namespace configured in the environment.
//!
//! `cargo run -p redwork-queue --example producer`

use tracing::{error, info};

use redwork_queue::logging::{init_tracing, DEFAULT_DIRECTIVE};
use redwork_queue::{Args, Enqueuer, QueueConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing(DEFAULT_DIRECTIVE);

    let config = QueueConfig::from_env();
    info!("Queue config: {:?}", config);

    let enqueuer = match Enqueuer::from_config(&config) {
        Ok(e) => e,
        Err(e) => {
            error!("Failed to create enqueuer: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&enqueuer).await {
        error!("Enqueue failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(enqueuer: &Enqueuer) -> redwork_queue::QueueResult<()> {
    let args = Args::new().with("addr", "a@b.com").with("template", "welcome");

    let job = enqueuer.enqueue("send_email", args.clone()).await?;
    info!(job_id = %job.id, "Enqueued send_email");

    let job = enqueuer.enqueue_in("send_digest", 300, args.clone()).await?;
    info!(job_id = %job.id, "Scheduled send_digest in 5 minutes");

    for attempt in 1..=2 {
        let queued = enqueuer
            .enqueue_unique("rebuild_index", Args::new().with("shard", 7))
            .await?;
        info!(attempt, queued, "Submitted unique rebuild_index");
    }

    let queued = enqueuer
        .enqueue_unique_in("nightly_report", 3600, Args::new())
        .await?;
    info!(queued, "Submitted unique nightly_report");

    Ok(())
}
