// src/handlers/session.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{error::AppError, state::AppState, utils::jwt::CurrentUser};

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    /// 0-based question position.
    pub question: usize,
    /// 0-based option index.
    pub option: usize,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub question: usize,
}

/// Loads the caller's session of a quiz.
///
/// Shows whether starting will resume a stored session, or the result
/// when the quiz was already submitted.
pub async fn get_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let runner = state.sessions.open(user.id, id).await?;
    Ok(Json(runner.view().await))
}

pub async fn start(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let runner = state.sessions.open(user.id, id).await?;
    Ok(Json(runner.start().await?))
}

pub async fn select_answer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let runner = state.sessions.open(user.id, id).await?;
    Ok(Json(runner.select_answer(req.question, req.option).await?))
}

pub async fn navigate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<NavigateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let runner = state.sessions.open(user.id, id).await?;
    Ok(Json(runner.navigate(req.question).await?))
}

pub async fn pause(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let runner = state.sessions.open(user.id, id).await?;
    Ok(Json(runner.pause().await?))
}

pub async fn resume(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let runner = state.sessions.open(user.id, id).await?;
    Ok(Json(runner.resume().await?))
}

/// Submits the attempt. Repeated calls return the same result.
pub async fn submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let runner = state.sessions.open(user.id, id).await?;
    Ok(Json(runner.submit().await?))
}

/// Deletes the caller's attempt and session and returns to the start screen.
pub async fn reattempt(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let runner = state.sessions.open(user.id, id).await?;
    Ok(Json(runner.reattempt().await?))
}
