use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use prompt_studio::{
    DeliveryMode, Orchestrator, Settings,
    jobs::{OrchestratorOptions, Pipeline},
    storage::{Delivery, ImageLibrary, LocalFileStorage},
    telemetry, web,
};

const IMAGES_URL_PREFIX: &str = "/images";
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init().map_err(|err| anyhow::anyhow!(err))?;
    let settings = Settings::from_env().context("invalid configuration")?;

    let missing = settings.missing_credentials();
    if !missing.is_empty() {
        warn!(missing = ?missing, "credentials are missing, affected API calls will fail");
    }

    let delivery = match settings.delivery {
        DeliveryMode::Inline => Delivery::Inline,
        DeliveryMode::Files => {
            info!(dir = %settings.output_dir.display(), "saving images to disk");
            Delivery::Files(ImageLibrary::new(LocalFileStorage::new(
                settings.output_dir.clone(),
                IMAGES_URL_PREFIX.to_string(),
            )))
        }
    };

    let pipeline = Pipeline::from_settings(&settings, delivery).context("failed to build API clients")?;
    let options = OrchestratorOptions::from(&settings);
    let orchestrator = Orchestrator::start(pipeline, options);
    let sweeper = orchestrator.spawn_sweeper(options.task_ttl.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL));

    let router = web::router(orchestrator.clone());
    let bind_address = format!("0.0.0.0:{}", settings.port);
    let tcp_listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    info!("Prompt Studio server started at http://{}", bind_address);

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Shutting down.");
    orchestrator.shutdown().await;
    let _ = sweeper.await;
    Ok(())
}
