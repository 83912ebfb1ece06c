// src/store/memory.rs

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;
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
    services::scoring::{compare_attempts, rank_among},
};

#[derive(Default)]
struct Inner {
    quizzes: BTreeMap<i64, Quiz>,
    questions: BTreeMap<i64, Question>,
    attempts: HashMap<(Uuid, i64), Attempt>,
    sessions: HashMap<(Uuid, i64), SessionSnapshot>,
    profiles: HashMap<Uuid, Profile>,
    next_quiz_id: i64,
    next_question_id: i64,
    next_attempt_id: i64,
}

/// Process-local `QuizStore`, used by tests and local runs without a database.
///
/// `set_offline(true)` makes every call fail, which is how callers' handling
/// of persistence errors is exercised. `set_attempt_latency` delays attempt
/// writes to widen races around them.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
    session_writes: AtomicUsize,
    attempt_writes: AtomicUsize,
    attempt_latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful `save_session` calls so far.
    pub fn session_writes(&self) -> usize {
        self.session_writes.load(Ordering::SeqCst)
    }

    /// Number of successful `upsert_attempt` calls so far.
    pub fn attempt_writes(&self) -> usize {
        self.attempt_writes.load(Ordering::SeqCst)
    }

    pub fn set_attempt_latency(&self, latency: Duration) {
        self.attempt_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.inner.write().await.profiles.insert(profile.id, profile);
    }

    fn online(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError("store is offline".to_string()));
        }
        Ok(())
    }
}

fn quiz_from_draft(id: i64, draft: &QuizDraft, created_at: Option<DateTime<Utc>>) -> Quiz {
    Quiz {
        id,
        title: draft.title.clone(),
        subject: draft.subject.clone(),
        quiz_date: draft.quiz_date,
        duration_minutes: draft.duration_minutes,
        negative_marking: draft.negative_marking,
        negative_marks: draft.negative_marks,
        is_draft: draft.is_draft,
        created_at,
    }
}

fn leaderboard_order(attempts: &mut [Attempt]) {
    attempts.sort_by(|a, b| {
        compare_attempts(
            (a.score, a.time_taken_seconds),
            (b.score, b.time_taken_seconds),
        )
    });
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn create_quiz(&self, draft: &QuizDraft) -> Result<Quiz, AppError> {
        self.online()?;
        let mut inner = self.inner.write().await;
        inner.next_quiz_id += 1;
        let quiz = quiz_from_draft(inner.next_quiz_id, draft, Some(Utc::now()));
        inner.quizzes.insert(quiz.id, quiz.clone());
        Ok(quiz)
    }

    async fn update_quiz(&self, id: i64, draft: &QuizDraft) -> Result<Quiz, AppError> {
        self.online()?;
        let mut inner = self.inner.write().await;
        let existing = inner
            .quizzes
            .get_mut(&id)
            .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
        *existing = quiz_from_draft(id, draft, existing.created_at);
        Ok(existing.clone())
    }

    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        self.online()?;
        Ok(self.inner.read().await.quizzes.get(&id).cloned())
    }

    async fn list_quizzes(
        &self,
        include_drafts: bool,
        limit: Option<i64>,
    ) -> Result<Vec<QuizListing>, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        let mut listings: Vec<QuizListing> = inner
            .quizzes
            .values()
            .filter(|q| include_drafts || !q.is_draft)
            .map(|q| QuizListing {
                quiz: q.clone(),
                question_count: inner.questions.values().filter(|x| x.quiz_id == q.id).count()
                    as i64,
            })
            .collect();
        listings.sort_by(|a, b| {
            b.quiz
                .quiz_date
                .cmp(&a.quiz.quiz_date)
                .then(b.quiz.id.cmp(&a.quiz.id))
        });
        if let Some(limit) = limit {
            listings.truncate(limit.max(0) as usize);
        }
        Ok(listings)
    }

    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError> {
        self.online()?;
        let mut inner = self.inner.write().await;
        let removed = inner.quizzes.remove(&id).is_some();
        inner.questions.retain(|_, q| q.quiz_id != id);
        inner.attempts.retain(|(_, quiz_id), _| *quiz_id != id);
        inner.sessions.retain(|(_, quiz_id), _| *quiz_id != id);
        Ok(removed)
    }

    async fn list_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        let mut questions: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.sort_order, q.id));
        Ok(questions)
    }

    async fn replace_questions(
        &self,
        quiz_id: i64,
        records: &[QuestionRecord],
    ) -> Result<Vec<Question>, AppError> {
        self.online()?;
        let mut orders = HashSet::new();
        if let Some(dup) = records.iter().find(|r| !orders.insert(r.sort_order)) {
            return Err(AppError::Conflict(format!(
                "Duplicate sort order {} in quiz {}",
                dup.sort_order, quiz_id
            )));
        }

        let mut inner = self.inner.write().await;
        let mut saved = Vec::with_capacity(records.len());
        for record in records {
            let existing = record
                .id
                .filter(|id| inner.questions.get(id).is_some_and(|q| q.quiz_id == quiz_id));
            let id = match existing {
                Some(id) => id,
                None => {
                    inner.next_question_id += 1;
                    inner.next_question_id
                }
            };
            let question = Question {
                id,
                quiz_id,
                sort_order: record.sort_order,
                question_text: record.question_text.clone(),
                options: Json(record.options.clone()),
                correct_option: record.correct_option,
                solution: record.solution.clone(),
                solution_image_url: record.solution_image_url.clone(),
                image_url: record.image_url.clone(),
            };
            inner.questions.insert(id, question.clone());
            saved.push(question);
        }

        let kept: HashSet<i64> = saved.iter().map(|q| q.id).collect();
        let before = inner.questions.len();
        inner
            .questions
            .retain(|id, q| q.quiz_id != quiz_id || kept.contains(id));
        let removed = before - inner.questions.len();
        if removed > 0 {
            tracing::info!("Removed {} stale questions from quiz {}", removed, quiz_id);
        }
        Ok(saved)
    }

    async fn get_attempt(&self, user_id: Uuid, quiz_id: i64) -> Result<Option<Attempt>, AppError> {
        self.online()?;
        Ok(self.inner.read().await.attempts.get(&(user_id, quiz_id)).cloned())
    }

    async fn upsert_attempt(&self, attempt: &NewAttempt) -> Result<Attempt, AppError> {
        self.online()?;
        let latency = self.attempt_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let mut inner = self.inner.write().await;
        let key = (attempt.user_id, attempt.quiz_id);
        let id = match inner.attempts.get(&key) {
            Some(existing) => existing.id,
            None => {
                inner.next_attempt_id += 1;
                inner.next_attempt_id
            }
        };
        let stored = Attempt {
            id,
            user_id: attempt.user_id,
            quiz_id: attempt.quiz_id,
            score: attempt.score,
            total_questions: attempt.total_questions,
            time_taken_seconds: attempt.time_taken_seconds,
            answers: Json(attempt.answers.clone()),
            completed_at: Utc::now(),
        };
        inner.attempts.insert(key, stored.clone());
        self.attempt_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete_attempt(&self, user_id: Uuid, quiz_id: i64) -> Result<bool, AppError> {
        self.online()?;
        Ok(self
            .inner
            .write()
            .await
            .attempts
            .remove(&(user_id, quiz_id))
            .is_some())
    }

    async fn list_user_attempts(&self, user_id: Uuid) -> Result<Vec<Attempt>, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        let mut attempts: Vec<Attempt> = inner
            .attempts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(attempts)
    }

    async fn top_attempts(&self, quiz_id: i64, limit: i64) -> Result<Vec<Attempt>, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        let mut attempts: Vec<Attempt> = inner
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id)
            .cloned()
            .collect();
        leaderboard_order(&mut attempts);
        attempts.truncate(limit.max(0) as usize);
        Ok(attempts)
    }

    async fn attempts_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        let mut attempts: Vec<Attempt> = inner
            .attempts
            .values()
            .filter(|a| a.completed_at >= since)
            .cloned()
            .collect();
        leaderboard_order(&mut attempts);
        attempts.truncate(limit.max(0) as usize);
        Ok(attempts)
    }

    async fn count_attempts(&self, quiz_id: i64) -> Result<i64, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        Ok(inner.attempts.values().filter(|a| a.quiz_id == quiz_id).count() as i64)
    }

    async fn count_ahead(
        &self,
        quiz_id: i64,
        score: i32,
        time_taken_seconds: i32,
    ) -> Result<i64, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        let field = inner
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id)
            .map(|a| (a.score, a.time_taken_seconds));
        Ok(rank_among(score, time_taken_seconds, field) - 1)
    }

    async fn get_session(
        &self,
        user_id: Uuid,
        quiz_id: i64,
    ) -> Result<Option<SessionSnapshot>, AppError> {
        self.online()?;
        Ok(self.inner.read().await.sessions.get(&(user_id, quiz_id)).cloned())
    }

    async fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), AppError> {
        self.online()?;
        self.inner
            .write()
            .await
            .sessions
            .insert((snapshot.user_id, snapshot.quiz_id), snapshot.clone());
        self.session_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_session(&self, user_id: Uuid, quiz_id: i64) -> Result<bool, AppError> {
        self.online()?;
        Ok(self
            .inner
            .write()
            .await
            .sessions
            .remove(&(user_id, quiz_id))
            .is_some())
    }

    async fn list_user_sessions(&self, user_id: Uuid) -> Result<Vec<SessionSnapshot>, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        self.online()?;
        Ok(self.inner.read().await.profiles.get(&id).cloned())
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, AppError> {
        self.online()?;
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.profiles.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn draft(title: &str, date: (i32, u32, u32), is_draft: bool) -> QuizDraft {
        QuizDraft {
            title: title.to_string(),
            subject: "Reasoning".to_string(),
            quiz_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            duration_minutes: 10,
            negative_marking: false,
            negative_marks: 0.0,
            is_draft,
        }
    }

    fn attempt(user_id: Uuid, quiz_id: i64, score: i32, time: i32) -> NewAttempt {
        NewAttempt {
            user_id,
            quiz_id,
            score,
            total_questions: 10,
            time_taken_seconds: time,
            answers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_listing_hides_drafts_and_orders_by_date() {
        let store = MemoryStore::new();
        store.create_quiz(&draft("old", (2026, 1, 1), false)).await.unwrap();
        store.create_quiz(&draft("new", (2026, 2, 1), false)).await.unwrap();
        store.create_quiz(&draft("hidden", (2026, 3, 1), true)).await.unwrap();

        let published = store.list_quizzes(false, None).await.unwrap();
        let titles: Vec<&str> = published.iter().map(|l| l.quiz.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old"]);

        let all = store.list_quizzes(true, Some(2)).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].quiz.title, "hidden");
    }

    #[tokio::test]
    async fn test_attempt_upsert_keeps_one_row_per_pair() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = store.upsert_attempt(&attempt(user, 1, 3, 100)).await.unwrap();
        let second = store.upsert_attempt(&attempt(user, 1, 8, 90)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.count_attempts(1).await.unwrap(), 1);
        assert_eq!(store.get_attempt(user, 1).await.unwrap().unwrap().score, 8);
    }

    #[tokio::test]
    async fn test_top_attempts_and_count_ahead() {
        let store = MemoryStore::new();
        for (score, time) in [(5, 300), (9, 400), (9, 200), (7, 50)] {
            store
                .upsert_attempt(&attempt(Uuid::new_v4(), 1, score, time))
                .await
                .unwrap();
        }
        let top = store.top_attempts(1, 3).await.unwrap();
        let order: Vec<(i32, i32)> = top.iter().map(|a| (a.score, a.time_taken_seconds)).collect();
        assert_eq!(order, vec![(9, 200), (9, 400), (7, 50)]);
        assert_eq!(store.count_ahead(1, 9, 400).await.unwrap(), 1);
        assert_eq!(store.count_ahead(1, 5, 300).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_quiz_cascades() {
        let store = MemoryStore::new();
        let quiz = store.create_quiz(&draft("q", (2026, 1, 1), false)).await.unwrap();
        let user = Uuid::new_v4();
        store.upsert_attempt(&attempt(user, quiz.id, 1, 1)).await.unwrap();
        assert!(store.delete_quiz(quiz.id).await.unwrap());
        assert!(store.get_attempt(user, quiz.id).await.unwrap().is_none());
        assert!(!store.delete_quiz(quiz.id).await.unwrap());
    }

    fn record(id: Option<i64>, sort_order: i32, text: &str) -> QuestionRecord {
        QuestionRecord {
            id,
            sort_order,
            question_text: text.to_string(),
            options: vec!["a".into(), "b".into()],
            correct_option: 0,
            solution: String::new(),
            solution_image_url: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_replace_questions_swaps_order_and_drops_the_rest() {
        let store = MemoryStore::new();
        let quiz = store.create_quiz(&draft("q", (2026, 1, 1), false)).await.unwrap();
        let other = store.create_quiz(&draft("o", (2026, 1, 2), false)).await.unwrap();
        store
            .replace_questions(other.id, &[record(None, 1, "other")])
            .await
            .unwrap();
        let first = store
            .replace_questions(
                quiz.id,
                &[record(None, 1, "A"), record(None, 2, "B"), record(None, 3, "C")],
            )
            .await
            .unwrap();

        // B and A trade places, C goes away.
        store
            .replace_questions(
                quiz.id,
                &[record(Some(first[1].id), 1, "B"), record(Some(first[0].id), 2, "A")],
            )
            .await
            .unwrap();
        let stored = store.list_questions(quiz.id).await.unwrap();
        let texts: Vec<&str> = stored.iter().map(|q| q.question_text.as_str()).collect();
        assert_eq!(texts, vec!["B", "A"]);
        assert_eq!(stored[0].id, first[1].id);
        assert_eq!(store.list_questions(other.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_questions_rejects_duplicate_sort_order() {
        let store = MemoryStore::new();
        let quiz = store.create_quiz(&draft("q", (2026, 1, 1), false)).await.unwrap();
        store
            .replace_questions(quiz.id, &[record(None, 1, "A")])
            .await
            .unwrap();

        let result = store
            .replace_questions(quiz.id, &[record(None, 1, "B"), record(None, 1, "C")])
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        let stored = store.list_questions(quiz.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].question_text, "A");
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(store.get_quiz(1).await.is_err());
        store.set_offline(false);
        assert!(store.get_quiz(1).await.unwrap().is_none());
    }
}
