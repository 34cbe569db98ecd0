mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::Semaphore;

use common::{CORRUPT_MARKER, FAIL_MARKER, FakeGenerator, FakeImprover, IMPROVED_SUFFIX, PANIC_MARKER, finish};
use prompt_studio::improver::FallbackPolicy;
use prompt_studio::jobs::{OrchestratorOptions, Pipeline};
use prompt_studio::storage::{Delivery, ImageLibrary, LocalFileStorage, METADATA_FILE};
use prompt_studio::{JobRequest, JobState, OrchestratorError, styles};

#[tokio::test]
async fn submitted_job_is_visible_immediately() {
    let orchestrator = common::start(
        FakeImprover::succeeding(),
        FakeGenerator::with_delay(Duration::from_millis(100)),
        Delivery::Inline,
    );

    let job_id = orchestrator.submit(JobRequest::new("a lighthouse")).unwrap();
    let job = orchestrator.get_status(&job_id).unwrap();

    assert_eq!(job.id, job_id);
    assert!(!job.state.is_terminal());
    assert!(job.result.is_empty());
    assert_eq!(job.original_prompt, "a lighthouse");
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);
    let missing = uuid::Uuid::new_v4();

    let err = orchestrator.get_status(&missing).unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(id) if id == missing));
}

#[tokio::test]
async fn blank_prompt_is_rejected_without_creating_a_job() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);

    let err = orchestrator.submit(JobRequest::new("   \n")).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidInput(_)));

    let err = orchestrator.submit(JobRequest::new("fox").samples(0)).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidInput(_)));

    let err = orchestrator.submit(JobRequest::new("fox").size(0, 512)).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidInput(_)));

    assert_eq!(orchestrator.job_count(), 0);
}

#[tokio::test]
async fn prompt_is_trimmed_and_unknown_style_falls_back() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);

    let job_id = orchestrator
        .submit(JobRequest::new("  quiet harbor  ").style("vaporwave"))
        .unwrap();
    let job = orchestrator.get_status(&job_id).unwrap();

    assert_eq!(job.original_prompt, "quiet harbor");
    assert_eq!(job.style_key, styles::DEFAULT_STYLE);
    assert_eq!(job.style_name, "Realism");
}

#[tokio::test]
async fn styles_are_listed_default_first() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);
    let listed = orchestrator.list_styles();

    assert_eq!(listed.len(), 8);
    assert_eq!(listed[0].key, styles::DEFAULT_STYLE);
    assert!(listed.iter().any(|style| style.key == "anime" && style.name == "Anime"));
}

#[tokio::test]
async fn anime_job_composes_improved_prompt_with_style() {
    let improver = FakeImprover::succeeding();
    let generator = FakeGenerator::new();
    let orchestrator = common::start(improver.clone(), generator.clone(), Delivery::Inline);

    let job_id = orchestrator
        .submit(JobRequest::new("кот на крыше").style("anime"))
        .unwrap();
    let job = finish(&orchestrator, &job_id).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.message, "Done!");
    assert_eq!(improver.calls(), 1);

    let improved = job.improved_prompt.as_deref().unwrap();
    assert!(improved.ends_with(IMPROVED_SUFFIX));
    let full = job.full_prompt.as_deref().unwrap();
    assert!(full.contains(improved));
    assert!(full.contains(styles::get("anime").unwrap().prompt));
    assert_eq!(generator.prompts(), vec![full.to_string()]);

    assert_eq!(job.result.len(), 1);
    assert!(job.result[0].starts_with("data:image/png;base64,"));
    assert!(job.error.is_none());
}

#[tokio::test]
async fn improvement_disabled_skips_the_improver() {
    let improver = FakeImprover::succeeding();
    let orchestrator = common::start(improver.clone(), FakeGenerator::new(), Delivery::Inline);

    let job_id = orchestrator
        .submit(JobRequest::new("a red fox").improve(false))
        .unwrap();
    let job = finish(&orchestrator, &job_id).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(improver.calls(), 0);
    assert_eq!(job.improved_prompt.as_deref(), Some("a red fox"));
    assert_eq!(
        job.full_prompt.as_deref(),
        Some(styles::resolve("realistic").compose("a red fox").as_str())
    );
}

#[tokio::test]
async fn improver_failure_keeps_the_original_prompt() {
    let improver = FakeImprover::failing();
    let orchestrator = common::start(improver.clone(), FakeGenerator::new(), Delivery::Inline);

    let job_id = orchestrator.submit(JobRequest::new("Лес у реки")).unwrap();
    let job = finish(&orchestrator, &job_id).await;

    assert_eq!(improver.calls(), 1);
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.improved_prompt.as_deref(), Some("Лес у реки"));
}

#[tokio::test]
async fn glossary_fallback_translates_known_words() {
    let pipeline = Pipeline::new(FakeImprover::failing(), FakeGenerator::new(), Delivery::Inline)
        .with_fallback(FallbackPolicy::Glossary);
    let orchestrator = common::start_with(pipeline, OrchestratorOptions::default());

    let job_id = orchestrator.submit(JobRequest::new("Ночь, лес и луна")).unwrap();
    let job = finish(&orchestrator, &job_id).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.improved_prompt.as_deref(), Some("night, forest и moon"));
}

#[tokio::test]
async fn generator_failure_marks_the_job_as_errored() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);

    let job_id = orchestrator
        .submit(JobRequest::new(format!("castle {FAIL_MARKER}")).improve(false))
        .unwrap();
    let job = finish(&orchestrator, &job_id).await;

    assert_eq!(job.state, JobState::Error);
    assert!(job.result.is_empty());
    let error = job.error.as_deref().unwrap();
    assert!(error.contains("invalid_prompts"), "{error}");
    assert!(job.message.starts_with("Error:"));
    assert!(job.full_prompt.is_some());
}

#[tokio::test]
async fn undecodable_artifact_fails_while_saving() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);

    let job_id = orchestrator
        .submit(JobRequest::new(format!("harbor {CORRUPT_MARKER}")).improve(false))
        .unwrap();
    let job = finish(&orchestrator, &job_id).await;

    assert_eq!(job.state, JobState::Error);
    assert!(job.result.is_empty());
    let error = job.error.as_deref().unwrap();
    assert!(error.starts_with("saving failed"), "{error}");
    assert!(job.message.starts_with("Error: saving failed"));
}

#[tokio::test]
async fn panicking_generator_fails_only_that_job() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);

    let doomed = orchestrator
        .submit(JobRequest::new(format!("volcano {PANIC_MARKER}")).improve(false))
        .unwrap();
    let healthy = orchestrator.submit(JobRequest::new("meadow").improve(false)).unwrap();

    let doomed = finish(&orchestrator, &doomed).await;
    assert_eq!(doomed.state, JobState::Error);
    assert!(doomed.error.as_deref().unwrap().contains("generator exploded"));

    let healthy = finish(&orchestrator, &healthy).await;
    assert_eq!(healthy.state, JobState::Completed);
}

#[tokio::test]
async fn samples_produce_one_reference_each() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);

    let job_id = orchestrator
        .submit(JobRequest::new("tulips").improve(false).samples(3))
        .unwrap();
    let job = finish(&orchestrator, &job_id).await;

    assert_eq!(job.result.len(), 3);
    assert_ne!(job.result[0], job.result[1]);
}

#[tokio::test]
async fn jobs_run_one_at_a_time_in_submission_order() {
    let generator = FakeGenerator::with_delay(Duration::from_millis(20));
    let orchestrator = common::start(FakeImprover::succeeding(), generator.clone(), Delivery::Inline);

    let prompts = ["first", "second", "third", "fourth"];
    let ids: Vec<_> = prompts
        .iter()
        .map(|prompt| orchestrator.submit(JobRequest::new(*prompt).improve(false)).unwrap())
        .collect();
    for id in &ids {
        assert_eq!(finish(&orchestrator, id).await.state, JobState::Completed);
    }

    let seen: Vec<String> = generator
        .prompts()
        .iter()
        .map(|full| full.split(',').next().unwrap().to_string())
        .collect();
    assert_eq!(seen, prompts);
    assert_eq!(generator.max_active(), 1);
}

#[tokio::test]
async fn snapshots_stay_consistent_while_polling() {
    let orchestrator = common::start(
        FakeImprover::succeeding(),
        FakeGenerator::with_delay(Duration::from_millis(30)),
        Delivery::Inline,
    );
    let job_id = orchestrator.submit(JobRequest::new("harbor at dawn")).unwrap();

    let mut last_state = JobState::Starting;
    let mut seen_live = false;
    loop {
        let job = orchestrator.get_status(&job_id).unwrap();
        assert!(job.is_consistent(), "{job:?}");
        assert!(
            job.state == last_state || last_state.can_advance_to(job.state),
            "{last_state} -> {}",
            job.state
        );
        seen_live |= !job.state.is_terminal();
        last_state = job.state;
        if job.state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(seen_live);
    assert_eq!(last_state, JobState::Completed);
}

#[tokio::test]
async fn full_queue_rejects_new_jobs() {
    let gate = Arc::new(Semaphore::new(0));
    let generator = FakeGenerator::gated(gate.clone());
    let options = OrchestratorOptions {
        queue_capacity: 1,
        ..OrchestratorOptions::default()
    };
    let orchestrator = common::start_with(
        Pipeline::new(FakeImprover::succeeding(), generator, Delivery::Inline),
        options,
    );

    let running = orchestrator.submit(JobRequest::new("one").improve(false)).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.get_status(&running).unwrap().state != JobState::Generating {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    let queued = orchestrator.submit(JobRequest::new("two").improve(false)).unwrap();
    let err = orchestrator.submit(JobRequest::new("three").improve(false)).unwrap_err();
    assert!(matches!(err, OrchestratorError::QueueFull));
    assert_eq!(orchestrator.job_count(), 2);

    gate.add_permits(1);
    assert_eq!(finish(&orchestrator, &running).await.state, JobState::Completed);
    assert_eq!(finish(&orchestrator, &queued).await.state, JobState::Completed);
}

#[tokio::test]
async fn stale_jobs_expire_after_ttl() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);
    let job_id = orchestrator.submit(JobRequest::new("dunes").improve(false)).unwrap();
    finish(&orchestrator, &job_id).await;

    let ttl = Duration::from_secs(3600);
    let now = Utc::now();
    assert_eq!(orchestrator.expire_stale(now + TimeDelta::seconds(3599), ttl), 0);
    assert!(orchestrator.get_status(&job_id).is_ok());

    assert_eq!(orchestrator.expire_stale(now + TimeDelta::seconds(3601), ttl), 1);
    assert!(matches!(
        orchestrator.get_status(&job_id),
        Err(OrchestratorError::NotFound(_))
    ));
    assert_eq!(orchestrator.expire_stale(now + TimeDelta::seconds(3601), ttl), 0);
}

#[tokio::test]
async fn file_delivery_writes_images_and_gallery() {
    let dir = tempfile::tempdir().unwrap();
    let library = ImageLibrary::new(LocalFileStorage::new(
        dir.path().to_path_buf(),
        "/images".to_string(),
    ));
    let orchestrator = common::start(
        FakeImprover::succeeding(),
        FakeGenerator::new(),
        Delivery::Files(library.clone()),
    );

    let job_id = orchestrator
        .submit(JobRequest::new("Snowy Peak!").style("watercolor").samples(2))
        .unwrap();
    let job = finish(&orchestrator, &job_id).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result.len(), 2);
    for reference in &job.result {
        let file_name = reference.strip_prefix("/images/").unwrap();
        assert!(file_name.starts_with("Snowy_Peak_"), "{file_name}");
        assert!(dir.path().join(file_name).is_file());
    }
    assert!(dir.path().join(METADATA_FILE).is_file());

    let gallery = library.list_images(10).await.unwrap();
    assert_eq!(gallery.len(), 2);
    assert!(gallery.iter().all(|entry| entry.original_prompt.as_deref() == Some("Snowy Peak!")));
    assert!(gallery.iter().all(|entry| entry.style.as_deref() == Some("Watercolor")));
}

#[tokio::test]
async fn shutdown_closes_the_queue() {
    let orchestrator = common::start(FakeImprover::succeeding(), FakeGenerator::new(), Delivery::Inline);
    let job_id = orchestrator.submit(JobRequest::new("pier").improve(false)).unwrap();
    finish(&orchestrator, &job_id).await;

    orchestrator.shutdown().await;

    let err = orchestrator.submit(JobRequest::new("late")).unwrap_err();
    assert!(matches!(err, OrchestratorError::Closed));
    assert_eq!(orchestrator.get_status(&job_id).unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn jobs_expired_in_flight_do_not_stall_the_worker() {
    let gate = Arc::new(Semaphore::new(0));
    let orchestrator = common::start(
        FakeImprover::succeeding(),
        FakeGenerator::gated(gate.clone()),
        Delivery::Inline,
    );

    let running = orchestrator.submit(JobRequest::new("first").improve(false)).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.get_status(&running).unwrap().state != JobState::Generating {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    let queued = orchestrator.submit(JobRequest::new("second").improve(false)).unwrap();

    let later = Utc::now() + TimeDelta::seconds(3601);
    assert_eq!(orchestrator.expire_stale(later, Duration::from_secs(3600)), 2);
    gate.add_permits(1);

    let next = orchestrator.submit(JobRequest::new("third").improve(false)).unwrap();
    assert_eq!(finish(&orchestrator, &next).await.state, JobState::Completed);
    assert!(orchestrator.get_status(&running).is_err());
    assert!(orchestrator.get_status(&queued).is_err());
    assert_eq!(orchestrator.job_count(), 1);
}
