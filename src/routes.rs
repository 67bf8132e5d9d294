// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, exam},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, students, exam, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool + config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new().route("/login", post(auth::login));

    let student_routes = Router::new()
        .route("/{id}", put(auth::update_biodata))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let exam_routes = Router::new()
        .route("/start", post(exam::start_exam))
        .route("/questions", get(exam::list_questions))
        .route("/{submission_id}/submit", post(exam::submit_exam))
        .route("/{submission_id}/result", get(exam::exam_result))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route(
            "/questions/{id}",
            axum::routing::patch(admin::update_question).delete(admin::delete_question),
        )
        .route(
            "/students",
            get(admin::list_students).post(admin::create_student),
        )
        .route("/students/import", post(admin::import_students))
        .route(
            "/students/{id}",
            axum::routing::patch(admin::update_student).delete(admin::delete_student),
        )
        .route("/submissions", get(admin::list_submissions))
        .route(
            "/submissions/bulk-archive",
            post(admin::bulk_archive_submissions),
        )
        .route(
            "/submissions/archived",
            get(admin::list_archived_submissions),
        )
        .route("/submissions/archived/clear", post(admin::clear_archive))
        .route(
            "/submissions/archived/{id}",
            delete(admin::purge_archived_submission),
        )
        .route("/submissions/{id}", delete(admin::archive_submission))
        .route("/submissions/{id}/details", get(admin::submission_details))
        .route(
            "/settings",
            get(admin::get_settings).patch(admin::update_settings),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/students", student_routes)
        .nest("/api/exam", exam_routes)
        .nest("/api/admin", admin_routes)
        // Exam clients read the settings (duration, notes, threshold) without
        // a token.
        .route("/api/settings", get(admin::get_settings))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
