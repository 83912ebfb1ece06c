// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{admin, profile, quiz, session},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Upper bound of a multipart quiz submission, images included.
const ADMIN_BODY_LIMIT: usize = 25 * 1024 * 1024;

/// Assembles the main application router.
///
/// * Student routes require a valid identity token.
/// * Admin routes additionally require the admin flag on the caller's profile.
/// * Normalized images are served from the upload directory.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
        HeaderValue::from_static("http://localhost:5173"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_quizzes))
        .route("/{id}/leaderboard", get(quiz::get_leaderboard))
        .route("/{id}/solutions", get(quiz::get_solutions))
        .route("/{id}/session", get(session::get_session))
        .route("/{id}/session/start", post(session::start))
        .route("/{id}/session/answer", put(session::select_answer))
        .route("/{id}/session/navigate", put(session::navigate))
        .route("/{id}/session/pause", post(session::pause))
        .route("/{id}/session/resume", post(session::resume))
        .route("/{id}/session/submit", post(session::submit))
        .route("/{id}/session/reattempt", post(session::reattempt))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let profile_routes = Router::new()
        .route("/me", get(profile::get_me))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let leaderboard_routes = Router::new().route("/daily", get(quiz::daily_leaderboard));

    let admin_routes = Router::new()
        .route("/quizzes/parse", post(admin::parse_questions))
        .route(
            "/quizzes",
            get(admin::list_quizzes).post(admin::create_quiz),
        )
        .route(
            "/quizzes/{id}",
            get(admin::get_quiz)
                .put(admin::update_quiz)
                .delete(admin::delete_quiz),
        )
        .route("/quizzes/{id}/export", get(admin::export_quiz))
        .layer(DefaultBodyLimit::max(ADMIN_BODY_LIMIT))
        // Auth first, then the admin check
        .layer(middleware::from_fn_with_state(state.clone(), admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/profile", profile_routes)
        .nest("/api/leaderboard", leaderboard_routes)
        .nest("/api/admin", admin_routes)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
