pub mod error;
pub mod handlers;

use axum::{
    Router,
    middleware,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::jobs::Orchestrator;

/// Builds the HTTP front end. Gallery routes exist only with file delivery.
pub fn router(orchestrator: Orchestrator) -> Router {
    let mut router: Router<Orchestrator> = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/generate", post(handlers::generate))
        .route("/status/{job_id}", get(handlers::status))
        .route("/api/styles", get(handlers::list_styles));

    if let Some(library) = orchestrator.delivery().library() {
        let images = Router::new()
            .fallback_service(ServeDir::new(library.storage().base_dir()))
            .layer(middleware::from_fn(handlers::only_png_files));
        router = router
            .route("/api/images", get(handlers::list_images))
            .nest("/images", images);
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}
