// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use super::QuizStore;
use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, NewAttempt},
        profile::Profile,
        question::{Question, QuestionRecord},
        quiz::{Quiz, QuizDraft, QuizListing},
        session::SessionSnapshot,
    },
};

const QUIZ_COLUMNS: &str = "id, title, subject, quiz_date, duration_minutes, negative_marking, negative_marks, is_draft, created_at";
const QUESTION_COLUMNS: &str = "id, quiz_id, sort_order, question_text, options, correct_option, solution, solution_image_url, image_url";
const ATTEMPT_COLUMNS: &str = "id, user_id, quiz_id, score, total_questions, time_taken_seconds, answers, completed_at";
const SESSION_COLUMNS: &str = "user_id, quiz_id, answers, time_left_seconds, current_question, last_saved_at";

/// `QuizStore` backed by the PostgreSQL schema in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn create_quiz(&self, draft: &QuizDraft) -> Result<Quiz, AppError> {
        let sql = format!(
            r#"
            INSERT INTO quizzes
            (title, subject, quiz_date, duration_minutes, negative_marking, negative_marks, is_draft)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {QUIZ_COLUMNS}
            "#
        );
        let quiz = sqlx::query_as::<_, Quiz>(&sql)
            .bind(&draft.title)
            .bind(&draft.subject)
            .bind(draft.quiz_date)
            .bind(draft.duration_minutes)
            .bind(draft.negative_marking)
            .bind(draft.negative_marks)
            .bind(draft.is_draft)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create quiz: {:?}", e);
                AppError::from(e)
            })?;
        Ok(quiz)
    }

    async fn update_quiz(&self, id: i64, draft: &QuizDraft) -> Result<Quiz, AppError> {
        let sql = format!(
            r#"
            UPDATE quizzes SET
                title = $1, subject = $2, quiz_date = $3, duration_minutes = $4,
                negative_marking = $5, negative_marks = $6, is_draft = $7
            WHERE id = $8
            RETURNING {QUIZ_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Quiz>(&sql)
            .bind(&draft.title)
            .bind(&draft.subject)
            .bind(draft.quiz_date)
            .bind(draft.duration_minutes)
            .bind(draft.negative_marking)
            .bind(draft.negative_marks)
            .bind(draft.is_draft)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update quiz {}: {:?}", id, e);
                AppError::from(e)
            })?
            .ok_or(AppError::NotFound("Quiz not found".to_string()))
    }

    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        let sql = format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1");
        Ok(sqlx::query_as::<_, Quiz>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_quizzes(
        &self,
        include_drafts: bool,
        limit: Option<i64>,
    ) -> Result<Vec<QuizListing>, AppError> {
        // LIMIT NULL means no limit.
        let listings = sqlx::query_as::<_, QuizListing>(
            r#"
            SELECT
                q.id, q.title, q.subject, q.quiz_date, q.duration_minutes,
                q.negative_marking, q.negative_marks, q.is_draft, q.created_at,
                (SELECT COUNT(*) FROM questions WHERE quiz_id = q.id) AS question_count
            FROM quizzes q
            WHERE $1 OR NOT q.is_draft
            ORDER BY q.quiz_date DESC, q.id DESC
            LIMIT $2
            "#,
        )
        .bind(include_drafts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list quizzes: {:?}", e);
            AppError::from(e)
        })?;
        Ok(listings)
    }

    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete quiz {}: {:?}", id, e);
                AppError::from(e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE quiz_id = $1 ORDER BY sort_order, id"
        );
        Ok(sqlx::query_as::<_, Question>(&sql)
            .bind(quiz_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn replace_questions(
        &self,
        quiz_id: i64,
        records: &[QuestionRecord],
    ) -> Result<Vec<Question>, AppError> {
        let update_sql = format!(
            r#"
            UPDATE questions SET
                sort_order = $1, question_text = $2, options = $3, correct_option = $4,
                solution = $5, solution_image_url = $6, image_url = $7
            WHERE id = $8 AND quiz_id = $9
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        let insert_sql = format!(
            r#"
            INSERT INTO questions
            (sort_order, question_text, options, correct_option, solution, solution_image_url, image_url, quiz_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {QUESTION_COLUMNS}
            "#
        );

        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(records.len());

        for record in records {
            let updated = match record.id {
                Some(id) => {
                    sqlx::query_as::<_, Question>(&update_sql)
                        .bind(record.sort_order)
                        .bind(&record.question_text)
                        .bind(Json(&record.options))
                        .bind(record.correct_option)
                        .bind(&record.solution)
                        .bind(&record.solution_image_url)
                        .bind(&record.image_url)
                        .bind(id)
                        .bind(quiz_id)
                        .fetch_optional(&mut *tx)
                        .await?
                }
                None => None,
            };

            let question = match updated {
                Some(question) => question,
                None => {
                    sqlx::query_as::<_, Question>(&insert_sql)
                        .bind(record.sort_order)
                        .bind(&record.question_text)
                        .bind(Json(&record.options))
                        .bind(record.correct_option)
                        .bind(&record.solution)
                        .bind(&record.solution_image_url)
                        .bind(&record.image_url)
                        .bind(quiz_id)
                        .fetch_one(&mut *tx)
                        .await?
                }
            };
            saved.push(question);
        }

        let kept: Vec<i64> = saved.iter().map(|q| q.id).collect();
        let removed = sqlx::query("DELETE FROM questions WHERE quiz_id = $1 AND NOT (id = ANY($2))")
            .bind(quiz_id)
            .bind(&kept)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed > 0 {
            tracing::info!("Removed {} stale questions from quiz {}", removed, quiz_id);
        }

        // The (quiz_id, sort_order) constraint is deferred to here.
        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to save questions of quiz {}: {:?}", quiz_id, e);
            AppError::from(e)
        })?;
        Ok(saved)
    }

    async fn get_attempt(&self, user_id: Uuid, quiz_id: i64) -> Result<Option<Attempt>, AppError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE user_id = $1 AND quiz_id = $2"
        );
        Ok(sqlx::query_as::<_, Attempt>(&sql)
            .bind(user_id)
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn upsert_attempt(&self, attempt: &NewAttempt) -> Result<Attempt, AppError> {
        let sql = format!(
            r#"
            INSERT INTO quiz_attempts
            (user_id, quiz_id, score, total_questions, time_taken_seconds, answers, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id, quiz_id) DO UPDATE SET
                score = EXCLUDED.score,
                total_questions = EXCLUDED.total_questions,
                time_taken_seconds = EXCLUDED.time_taken_seconds,
                answers = EXCLUDED.answers,
                completed_at = EXCLUDED.completed_at
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Attempt>(&sql)
            .bind(attempt.user_id)
            .bind(attempt.quiz_id)
            .bind(attempt.score)
            .bind(attempt.total_questions)
            .bind(attempt.time_taken_seconds)
            .bind(Json(&attempt.answers))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to upsert attempt: {:?}", e);
                AppError::from(e)
            })
    }

    async fn delete_attempt(&self, user_id: Uuid, quiz_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM quiz_attempts WHERE user_id = $1 AND quiz_id = $2")
            .bind(user_id)
            .bind(quiz_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_user_attempts(&self, user_id: Uuid) -> Result<Vec<Attempt>, AppError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE user_id = $1 ORDER BY completed_at DESC"
        );
        Ok(sqlx::query_as::<_, Attempt>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn top_attempts(&self, quiz_id: i64, limit: i64) -> Result<Vec<Attempt>, AppError> {
        let sql = format!(
            r#"
            SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
            WHERE quiz_id = $1
            ORDER BY score DESC, time_taken_seconds ASC
            LIMIT $2
            "#
        );
        Ok(sqlx::query_as::<_, Attempt>(&sql)
            .bind(quiz_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn attempts_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let sql = format!(
            r#"
            SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
            WHERE completed_at >= $1
            ORDER BY score DESC, time_taken_seconds ASC
            LIMIT $2
            "#
        );
        Ok(sqlx::query_as::<_, Attempt>(&sql)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_attempts(&self, quiz_id: i64) -> Result<i64, AppError> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1")
                .bind(quiz_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn count_ahead(
        &self,
        quiz_id: i64,
        score: i32,
        time_taken_seconds: i32,
    ) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM quiz_attempts
            WHERE quiz_id = $1
              AND (score > $2 OR (score = $2 AND time_taken_seconds < $3))
            "#,
        )
        .bind(quiz_id)
        .bind(score)
        .bind(time_taken_seconds)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_session(
        &self,
        user_id: Uuid,
        quiz_id: i64,
    ) -> Result<Option<SessionSnapshot>, AppError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE user_id = $1 AND quiz_id = $2"
        );
        Ok(sqlx::query_as::<_, SessionSnapshot>(&sql)
            .bind(user_id)
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO quiz_sessions
            (user_id, quiz_id, answers, time_left_seconds, current_question, last_saved_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, quiz_id) DO UPDATE SET
                answers = EXCLUDED.answers,
                time_left_seconds = EXCLUDED.time_left_seconds,
                current_question = EXCLUDED.current_question,
                last_saved_at = EXCLUDED.last_saved_at
            "#,
        )
        .bind(snapshot.user_id)
        .bind(snapshot.quiz_id)
        .bind(&snapshot.answers)
        .bind(snapshot.time_left_seconds)
        .bind(snapshot.current_question)
        .bind(snapshot.last_saved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_session(&self, user_id: Uuid, quiz_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM quiz_sessions WHERE user_id = $1 AND quiz_id = $2")
            .bind(user_id)
            .bind(quiz_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_user_sessions(&self, user_id: Uuid) -> Result<Vec<SessionSnapshot>, AppError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE user_id = $1");
        Ok(sqlx::query_as::<_, SessionSnapshot>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        Ok(sqlx::query_as::<_, Profile>(
            "SELECT id, display_name, is_admin, created_at FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(sqlx::query_as::<_, Profile>(
            "SELECT id, display_name, is_admin, created_at FROM profiles WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?)
    }
}
