// src/handlers/quiz.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        attempt::{AnswerOutcome, AttemptResult, SolutionItem, SolutionsReview},
        quiz::{DashboardQuiz, Quiz, QuizDay, QuizProgress},
    },
    services::leaderboard,
    state::AppState,
    store::QuizStore,
    utils::jwt::CurrentUser,
};

/// Loads a quiz visible to students; drafts count as missing.
pub(crate) async fn published_quiz(store: &dyn QuizStore, id: i64) -> Result<Quiz, AppError> {
    store
        .get_quiz(id)
        .await?
        .filter(|q| !q.is_draft)
        .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Published quizzes grouped by date, newest first, with the caller's progress.
pub async fn list_quizzes(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let listings = state.store.list_quizzes(false, None).await?;

    let attempts: HashMap<i64, (i32, i32)> = state
        .store
        .list_user_attempts(user.id)
        .await?
        .into_iter()
        .map(|a| (a.quiz_id, (a.score, a.total_questions)))
        .collect();
    let sessions: HashMap<i64, i32> = state
        .store
        .list_user_sessions(user.id)
        .await?
        .into_iter()
        .map(|s| (s.quiz_id, s.time_left_seconds))
        .collect();

    let mut days: Vec<QuizDay> = Vec::new();
    for listing in listings {
        let id = listing.quiz.id;
        let progress = match (attempts.get(&id), sessions.get(&id)) {
            (Some(&(score, total_questions)), _) => QuizProgress::Completed {
                score,
                total_questions,
            },
            (None, Some(&time_left_seconds)) => QuizProgress::InProgress { time_left_seconds },
            (None, None) => QuizProgress::NotStarted,
        };
        let entry = DashboardQuiz { listing, progress };

        match days.last_mut() {
            Some(day) if day.date == entry.listing.quiz.quiz_date => day.quizzes.push(entry),
            _ => days.push(QuizDay {
                date: entry.listing.quiz.quiz_date,
                quizzes: vec![entry],
            }),
        }
    }

    Ok(Json(days))
}

/// Top attempts of a quiz plus the caller's rank and percentile.
pub async fn get_leaderboard(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    published_quiz(state.store.as_ref(), id).await?;
    let board = leaderboard::quiz_leaderboard(
        state.store.as_ref(),
        id,
        user.id,
        state.config.leaderboard_limit,
    )
    .await?;
    Ok(Json(board))
}

/// Today's best attempts across all quizzes.
pub async fn daily_leaderboard(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let entries = leaderboard::daily_leaderboard(state.store.as_ref(), Utc::now()).await?;
    Ok(Json(entries))
}

/// Questions with solutions next to the caller's answers.
/// Only available once the caller has an attempt.
pub async fn get_solutions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = published_quiz(state.store.as_ref(), id).await?;
    let attempt = state
        .store
        .get_attempt(user.id, id)
        .await?
        .ok_or(AppError::NotFound("No attempt found for this quiz".to_string()))?;
    let questions = state.store.list_questions(id).await?;

    let items = questions
        .into_iter()
        .map(|question| {
            let answer = attempt
                .answers
                .iter()
                .find(|a| a.question_id == question.id)
                .cloned();
            let outcome = answer
                .as_ref()
                .map(|a| a.outcome())
                .unwrap_or(AnswerOutcome::Unattempted);
            SolutionItem {
                question,
                answer,
                outcome,
            }
        })
        .collect();

    Ok(Json(SolutionsReview {
        quiz,
        result: AttemptResult::from(&attempt),
        items,
    }))
}
