// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::ADMIN_QUIZ_LIST_LIMIT,
    error::AppError,
    models::question::QuestionDraft,
    services::{
        authoring::{Authoring, ImageSlot, PendingImage, PublishedQuiz, QuizSubmission},
        parser::{self, NO_QUESTIONS_WARNING},
    },
    state::AppState,
    utils::image::ImageUpload,
};

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub questions: Vec<QuestionDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Parses bulk question text for review before saving.
/// Malformed blocks are skipped; an empty result carries a warning.
pub async fn parse_questions(Json(req): Json<ParseRequest>) -> Result<impl IntoResponse, AppError> {
    let questions: Vec<QuestionDraft> = parser::parse_bulk(&req.text)
        .into_iter()
        .map(QuestionDraft::from)
        .collect();
    let warning = questions
        .is_empty()
        .then(|| NO_QUESTIONS_WARNING.to_string());
    Ok(Json(ParseResponse { questions, warning }))
}

/// Lists quizzes including drafts, newest quiz date first.
/// Admin only.
pub async fn list_quizzes(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let quizzes = state
        .store
        .list_quizzes(true, Some(ADMIN_QUIZ_LIST_LIMIT))
        .await?;
    Ok(Json(quizzes))
}

/// A quiz with its full questions, for editing.
pub async fn get_quiz(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = state
        .store
        .get_quiz(id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
    let questions = state.store.list_questions(id).await?;
    Ok(Json(PublishedQuiz { quiz, questions }))
}

/// Questions of a quiz in the bulk text format.
pub async fn export_quiz(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if state.store.get_quiz(id).await?.is_none() {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }
    let drafts: Vec<QuestionDraft> = state
        .store
        .list_questions(id)
        .await?
        .iter()
        .map(QuestionDraft::from)
        .collect();
    Ok(parser::serialize_bulk(&drafts))
}

/// Reads the `quiz` JSON part and the `image_<n>` / `solution_image_<n>` file parts.
async fn read_submission(
    mut multipart: Multipart,
) -> Result<(QuizSubmission, Vec<PendingImage>), AppError> {
    let mut submission: Option<QuizSubmission> = None;
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name == "quiz" {
            let text = field.text().await?;
            submission = Some(serde_json::from_str(&text)?);
            continue;
        }

        let slot = if let Some(n) = name.strip_prefix("solution_image_") {
            Some((ImageSlot::Solution, n))
        } else {
            name.strip_prefix("image_").map(|n| (ImageSlot::Question, n))
        };
        let Some((slot, n)) = slot else {
            tracing::debug!("Ignoring unexpected multipart field {}", name);
            continue;
        };
        let question: usize = n
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid image field: {}", name)))?;

        let file_name = field.file_name().unwrap_or("image").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            continue;
        }
        images.push(PendingImage {
            question,
            slot,
            upload: ImageUpload {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            },
        });
    }

    let submission =
        submission.ok_or(AppError::BadRequest("Missing quiz data".to_string()))?;
    Ok((submission, images))
}

fn authoring(state: &AppState) -> Authoring<'_> {
    Authoring {
        store: state.store.as_ref(),
        objects: state.objects.as_ref(),
        limits: state.config.image_limits,
    }
}

/// Creates a quiz from a multipart submission.
/// Admin only.
pub async fn create_quiz(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let (submission, images) = read_submission(multipart).await?;
    let published = authoring(&state).publish(None, submission, images).await?;
    Ok((StatusCode::CREATED, Json(published)))
}

/// Updates a quiz and replaces its question set.
/// Running sessions of the quiz are dropped so they reload the new questions.
pub async fn update_quiz(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let (submission, images) = read_submission(multipart).await?;
    let published = authoring(&state).publish(Some(id), submission, images).await?;
    state.sessions.forget_quiz(id).await;
    Ok(Json(published))
}

/// Deletes a quiz with its questions, attempts and sessions.
/// Admin only.
pub async fn delete_quiz(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete_quiz(id).await? {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }
    state.sessions.forget_quiz(id).await;
    tracing::info!("Deleted quiz {}", id);
    Ok(StatusCode::NO_CONTENT)
}
