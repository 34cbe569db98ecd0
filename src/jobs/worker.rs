use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_channel::Receiver;
use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::model::{JobId, JobState};
use super::registry::{JobRegistry, TransitionError};
use super::Pipeline;
use crate::error::{GenerationError, PersistenceError};
use crate::generator::GenerationRequest;
use crate::storage::ImageContext;

#[derive(Error, Debug)]
enum JobFailure {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("saving failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Consumes queued job ids one at a time until cancelled or the queue closes.
pub(crate) async fn run(
    cancel_token: CancellationToken,
    queue: Receiver<JobId>,
    registry: Arc<JobRegistry>,
    pipeline: Arc<Pipeline>,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Worker cancelled");
                break;
            },
            next = queue.recv() => {
                match next {
                    Err(_) => {
                        debug!("Job queue closed");
                        break;
                    },
                    Ok(job_id) => {
                        process(&registry, &pipeline, job_id)
                            .instrument(info_span!("job", job_id = %job_id))
                            .await;
                    }
                }
            }
        }
    }
    info!("Worker stopped.");
}

async fn process(registry: &JobRegistry, pipeline: &Pipeline, job_id: JobId) {
    let outcome = AssertUnwindSafe(execute(registry, pipeline, job_id))
        .catch_unwind()
        .await;

    let description = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(JobFailure::Transition(TransitionError::Missing))) => {
            info!("job expired before it finished");
            return;
        }
        Ok(Err(err)) => err.to_string(),
        Err(panic) => format!("unexpected failure: {}", panic_message(panic.as_ref())),
    };

    error!(error = %description, "job failed");
    let result = registry.transition(&job_id, JobState::Error, format!("Error: {description}"), |job| {
        job.error = Some(description.clone());
    });
    if let Err(err) = result {
        warn!(error = %err, "could not record job failure");
    }
}

async fn execute(registry: &JobRegistry, pipeline: &Pipeline, job_id: JobId) -> Result<(), JobFailure> {
    let job = registry.get(&job_id).ok_or(TransitionError::Missing)?;
    let style = job.style();
    info!(prompt = %job.original_prompt, style = style.key, "job started");

    let improved_prompt = if job.improve {
        registry.transition(&job_id, JobState::ImprovingPrompt, "Improving the prompt...", |_| {})?;
        let outcome = pipeline.improver.improve(&job.original_prompt).await;
        if outcome.succeeded {
            outcome.improved
        } else {
            warn!(policy = ?pipeline.fallback, "improvement failed, using fallback prompt");
            pipeline.fallback.apply(&job.original_prompt)
        }
    } else {
        job.original_prompt.clone()
    };

    let full_prompt = style.compose(&improved_prompt);
    debug!(full_prompt = %full_prompt, "prompt composed");
    registry.transition(&job_id, JobState::Generating, "Generating the image...", |job| {
        job.improved_prompt = Some(improved_prompt.clone());
        job.full_prompt = Some(full_prompt.clone());
    })?;

    let request = GenerationRequest {
        prompt: full_prompt.clone(),
        negative_prompt: Some(style.negative.to_string()),
        width: job.width,
        height: job.height,
        samples: job.samples,
    };
    let artifacts = pipeline.generator.generate(&request).await?;
    if artifacts.is_empty() {
        return Err(GenerationError::NoArtifacts.into());
    }
    info!(artifacts = artifacts.len(), "generation finished");

    registry.transition(
        &job_id,
        JobState::Saving,
        format!("Saving {} image(s)...", artifacts.len()),
        |_| {},
    )?;
    let context = ImageContext {
        naming_hint: &job.original_prompt,
        original_prompt: &job.original_prompt,
        improved_prompt: &improved_prompt,
        style_name: style.name,
        full_prompt: &full_prompt,
    };
    let references = pipeline.delivery.materialize(&artifacts, &context).await?;

    registry.transition(&job_id, JobState::Completed, "Done!", |job| {
        job.result = references;
    })?;
    info!("job completed");
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
