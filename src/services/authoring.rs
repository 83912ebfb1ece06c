// src/services/authoring.rs

//! Publishing and editing quizzes from the admin console.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{Question, QuestionDraft, QuestionRecord},
        quiz::{Quiz, QuizDraft},
    },
    store::{ObjectStore, QuizStore},
    utils::image::{self, ImageLimits, ImageUpload},
};

/// Most options a question may carry (letters A to D).
pub const MAX_OPTIONS: usize = 4;

/// The `quiz` part of a publish request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuizSubmission {
    #[serde(flatten)]
    pub quiz: QuizDraft,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Question,
    Solution,
}

/// A new image for the `question`-th entry (0-based) of a submission.
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub question: usize,
    pub slot: ImageSlot,
    pub upload: ImageUpload,
}

/// A published or updated quiz with its questions in order.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedQuiz {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

fn reference(value: &Option<String>, n: usize) -> Result<Option<String>, AppError> {
    let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.starts_with('/') || Url::parse(value).is_ok() {
        Ok(Some(value.to_string()))
    } else {
        Err(AppError::BadRequest(format!(
            "Question {} has an invalid image reference.",
            n
        )))
    }
}

/// Checks a submission and turns its questions into ordered records.
///
/// Blank options are dropped and the correct index follows its option.
pub fn validate_submission(submission: &QuizSubmission) -> Result<Vec<QuestionRecord>, AppError> {
    if submission.quiz.title.trim().is_empty() {
        return Err(AppError::BadRequest("Please enter a quiz title.".to_string()));
    }
    if submission.questions.is_empty() {
        return Err(AppError::BadRequest("Add at least one question.".to_string()));
    }

    submission
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let n = i + 1;
            let text = q.question_text.trim();
            if text.is_empty() {
                return Err(AppError::BadRequest(format!("Question {} has no text.", n)));
            }

            let kept: Vec<(usize, &str)> = q
                .options
                .iter()
                .enumerate()
                .map(|(idx, o)| (idx, o.trim()))
                .filter(|(_, o)| !o.is_empty())
                .collect();
            if kept.len() < 2 {
                return Err(AppError::BadRequest(format!(
                    "Question {} needs at least 2 options.",
                    n
                )));
            }
            if kept.len() > MAX_OPTIONS {
                return Err(AppError::BadRequest(format!(
                    "Question {} can have at most {} options.",
                    n, MAX_OPTIONS
                )));
            }
            let correct = kept
                .iter()
                .position(|(idx, _)| *idx == q.correct_option)
                .ok_or_else(|| {
                    AppError::BadRequest(format!("Question {} has no correct option.", n))
                })?;

            Ok(QuestionRecord {
                id: q.id,
                sort_order: n as i32,
                question_text: text.to_string(),
                options: kept.into_iter().map(|(_, o)| o.to_string()).collect(),
                correct_option: correct as i32,
                solution: q.solution.trim().to_string(),
                solution_image_url: reference(&q.solution_image_url, n)?,
                image_url: reference(&q.image_url, n)?,
            })
        })
        .collect()
}

/// Object name of an uploaded image: `<millis>-<uuid>.<ext>`.
fn object_name(upload: &ImageUpload) -> String {
    format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        upload.extension().to_ascii_lowercase()
    )
}

pub struct Authoring<'a> {
    pub store: &'a dyn QuizStore,
    pub objects: &'a dyn ObjectStore,
    pub limits: ImageLimits,
}

impl Authoring<'_> {
    /// Creates (`quiz_id` = `None`) or updates a quiz with its questions.
    ///
    /// Images are normalized and uploaded one by one before any question is
    /// written. When creating, an image failure deletes the new quiz again.
    pub async fn publish(
        &self,
        quiz_id: Option<i64>,
        submission: QuizSubmission,
        images: Vec<PendingImage>,
    ) -> Result<PublishedQuiz, AppError> {
        let mut records = validate_submission(&submission)?;
        if let Some(stray) = images.iter().find(|img| img.question >= records.len()) {
            return Err(AppError::BadRequest(format!(
                "Image for question {} has no matching question.",
                stray.question + 1
            )));
        }
        let draft = submission.quiz.normalized();
        draft.validate()?;

        let quiz = match quiz_id {
            Some(id) => self.store.update_quiz(id, &draft).await?,
            None => self.store.create_quiz(&draft).await?,
        };
        if let Err(e) = self.attach_images(&mut records, images).await {
            if quiz_id.is_none() {
                tracing::warn!("Image upload failed, rolling back quiz {}: {}", quiz.id, e);
                if let Err(rollback) = self.store.delete_quiz(quiz.id).await {
                    tracing::error!("Rollback of quiz {} failed: {}", quiz.id, rollback);
                }
            }
            return Err(e);
        }

        let questions = self.store.replace_questions(quiz.id, &records).await?;

        tracing::info!(
            "Saved quiz {} ({}) with {} questions{}",
            quiz.id,
            quiz.title,
            questions.len(),
            if quiz.is_draft { " as draft" } else { "" }
        );
        Ok(PublishedQuiz { quiz, questions })
    }

    async fn attach_images(
        &self,
        records: &mut [QuestionRecord],
        images: Vec<PendingImage>,
    ) -> Result<(), AppError> {
        for pending in images {
            let normalized = image::normalize(pending.upload, self.limits).await?;
            let name = object_name(&normalized);
            let url = self
                .objects
                .upload(&name, normalized.bytes, &normalized.content_type)
                .await?;
            let record = &mut records[pending.question];
            match pending.slot {
                ImageSlot::Question => record.image_url = Some(url),
                ImageSlot::Solution => record.solution_image_url = Some(url),
            }
        }
        Ok(())
    }
}
