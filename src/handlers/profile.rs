// src/handlers/profile.rs

use axum::{Json, extract::State, response::IntoResponse};

use crate::{
    error::AppError,
    models::profile::{ANONYMOUS, MeResponse},
    state::AppState,
    utils::jwt::CurrentUser,
};

/// Get current user's profile and quiz statistics.
///
/// Users the identity provider has not created a profile for yet are
/// reported as anonymous non-admins.
pub async fn get_me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.store.get_profile(user.id).await?;
    let attempts = state.store.list_user_attempts(user.id).await?;
    let sessions = state.store.list_user_sessions(user.id).await?;

    Ok(Json(MeResponse {
        id: user.id,
        display_name: profile
            .as_ref()
            .map(|p| p.public_name())
            .unwrap_or_else(|| ANONYMOUS.to_string()),
        is_admin: profile.is_some_and(|p| p.is_admin),
        quizzes_taken: attempts.len(),
        total_score: attempts.iter().map(|a| a.score as i64).sum(),
        in_progress: sessions.len(),
    }))
}
