// src/services/session.rs

//! Quiz-taking lifecycle.
//!
//! `SessionMachine` is a pure state machine: every transition returns the
//! side effects it requires as `Effect` values. `SessionRunner` owns one
//! machine, executes those effects against the store and drives the
//! countdown and the periodic autosave from a single timer task.
//! `SessionRegistry` hands out one runner per (user, quiz) pair.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use serde::Serialize;
use sqlx::types::Json;
use tokio::{
    sync::{Mutex, RwLock, oneshot},
    time::{self, Instant},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptResult, NewAttempt},
        question::{PublicQuestion, Question},
        quiz::Quiz,
        session::SessionSnapshot,
    },
    services::scoring,
    store::QuizStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    Ready,
    Active,
    Paused,
    Submitted,
    Error,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartTimer,
    StopTimer,
    /// Best-effort; failures never reach the caller.
    SaveSession(SessionSnapshot),
    /// Authoritative result of the attempt.
    WriteAttempt(NewAttempt),
    DeleteSession,
    DeleteAttempt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizContent {
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

/// What a student sees of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub quiz_id: i64,
    pub phase: Phase,
    pub quiz: Option<Quiz>,
    pub question_count: usize,
    /// Only present once the quiz has been started.
    pub questions: Vec<PublicQuestion>,
    pub answers: BTreeMap<usize, usize>,
    pub current_question: usize,
    pub time_left_seconds: u32,
    /// Starting will continue a stored session instead of a fresh countdown.
    pub resumable: bool,
    pub result: Option<AttemptResult>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct SessionMachine {
    user_id: Uuid,
    quiz_id: i64,
    phase: Phase,
    content: Option<QuizContent>,
    answers: BTreeMap<usize, usize>,
    current: usize,
    time_left: u32,
    stored: Option<SessionSnapshot>,
    result: Option<AttemptResult>,
    /// Graded attempt not yet confirmed by the store.
    pending: Option<NewAttempt>,
    error: Option<String>,
}

impl SessionMachine {
    pub fn new(user_id: Uuid, quiz_id: i64) -> Self {
        Self {
            user_id,
            quiz_id,
            phase: Phase::Loading,
            content: None,
            answers: BTreeMap::new(),
            current: 0,
            time_left: 0,
            stored: None,
            result: None,
            pending: None,
            error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn answers(&self) -> &BTreeMap<usize, usize> {
        &self.answers
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `loading -> submitted` when an attempt exists, otherwise `loading -> ready`.
    pub fn loaded(
        &mut self,
        content: QuizContent,
        attempt: Option<Attempt>,
        stored: Option<SessionSnapshot>,
    ) {
        self.time_left = content.quiz.duration_seconds();
        if let Some(attempt) = attempt {
            self.result = Some(AttemptResult::from(&attempt));
            self.phase = Phase::Submitted;
        } else {
            if let Some(snapshot) = &stored {
                self.restore(&content.questions, snapshot);
            }
            self.stored = stored;
            self.phase = Phase::Ready;
        }
        self.content = Some(content);
    }

    /// `loading -> error`; terminal.
    pub fn failed(&mut self, message: String) {
        self.phase = Phase::Error;
        self.error = Some(message);
    }

    /// Copies a stored session, dropping answers that no longer fit the quiz.
    fn restore(&mut self, questions: &[Question], snapshot: &SessionSnapshot) {
        self.answers = snapshot
            .answers
            .0
            .iter()
            .filter(|&(&q, &o)| questions.get(q).is_some_and(|question| o < question.options.len()))
            .map(|(&q, &o)| (q, o))
            .collect();
        self.current = usize::try_from(snapshot.current_question)
            .unwrap_or(0)
            .min(questions.len().saturating_sub(1));
        self.time_left = u32::try_from(snapshot.time_left_seconds).unwrap_or(0);
    }

    fn content(&self) -> Result<&QuizContent, AppError> {
        self.content
            .as_ref()
            .ok_or(AppError::Conflict("Quiz is not loaded".to_string()))
    }

    fn expect_phase(&self, expected: &[Phase], action: &str) -> Result<(), AppError> {
        if expected.contains(&self.phase) {
            Ok(())
        } else {
            Err(AppError::Conflict(format!(
                "Cannot {} while the quiz is {:?}",
                action, self.phase
            )))
        }
    }

    /// `ready -> active`, resuming the stored session when there is one.
    pub fn start(&mut self) -> Result<Vec<Effect>, AppError> {
        self.expect_phase(&[Phase::Ready], "start")?;
        let duration = self.content()?.quiz.duration_seconds();

        if self.stored.take().is_none() {
            self.answers.clear();
            self.current = 0;
            self.time_left = duration;
        }
        self.phase = Phase::Active;

        if self.time_left == 0 {
            return Ok(self.finish());
        }
        Ok(vec![Effect::SaveSession(self.snapshot()), Effect::StartTimer])
    }

    pub fn select_answer(&mut self, question: usize, option: usize) -> Result<Vec<Effect>, AppError> {
        self.expect_phase(&[Phase::Active], "answer")?;
        let q = self
            .content()?
            .questions
            .get(question)
            .ok_or_else(|| AppError::BadRequest(format!("Question {} does not exist", question + 1)))?;
        if option >= q.options.len() {
            return Err(AppError::BadRequest(format!(
                "Question {} has no option {}",
                question + 1,
                option + 1
            )));
        }
        self.answers.insert(question, option);
        Ok(vec![Effect::SaveSession(self.snapshot())])
    }

    /// Moves the current-question pointer; persisted with the next save.
    pub fn navigate(&mut self, question: usize) -> Result<(), AppError> {
        self.expect_phase(&[Phase::Active], "navigate")?;
        if question >= self.content()?.questions.len() {
            return Err(AppError::BadRequest(format!(
                "Question {} does not exist",
                question + 1
            )));
        }
        self.current = question;
        Ok(())
    }

    /// One second of countdown; reaching zero submits.
    pub fn tick(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Active {
            return Vec::new();
        }
        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            tracing::info!(
                "Time is up for quiz {} (user {}), submitting",
                self.quiz_id,
                self.user_id
            );
            return self.finish();
        }
        Vec::new()
    }

    /// Periodic save; nothing while paused or finished.
    pub fn autosave(&self) -> Vec<Effect> {
        if self.phase != Phase::Active {
            return Vec::new();
        }
        vec![Effect::SaveSession(self.snapshot())]
    }

    pub fn pause(&mut self) -> Result<Vec<Effect>, AppError> {
        self.expect_phase(&[Phase::Active], "pause")?;
        self.phase = Phase::Paused;
        Ok(vec![Effect::StopTimer, Effect::SaveSession(self.snapshot())])
    }

    pub fn resume(&mut self) -> Result<Vec<Effect>, AppError> {
        self.expect_phase(&[Phase::Paused], "resume")?;
        self.phase = Phase::Active;
        Ok(vec![Effect::StartTimer])
    }

    /// Manual submission. Submitting again is a no-op unless the attempt
    /// write failed, in which case the write is retried.
    pub fn submit(&mut self) -> Result<Vec<Effect>, AppError> {
        if self.phase == Phase::Submitted {
            return Ok(match &self.pending {
                Some(attempt) => vec![Effect::WriteAttempt(attempt.clone()), Effect::DeleteSession],
                None => Vec::new(),
            });
        }
        self.expect_phase(&[Phase::Active, Phase::Paused], "submit")?;
        Ok(self.finish())
    }

    fn finish(&mut self) -> Vec<Effect> {
        let Some(content) = self.content.as_ref() else {
            return Vec::new();
        };
        let quiz = &content.quiz;
        let grade = scoring::grade(&content.questions, &self.answers, quiz.scoring_policy());
        let elapsed = quiz.duration_seconds().saturating_sub(self.time_left) as i32;
        let total = content.questions.len() as i32;

        let attempt = NewAttempt {
            user_id: self.user_id,
            quiz_id: self.quiz_id,
            score: grade.score,
            total_questions: total,
            time_taken_seconds: elapsed,
            answers: grade.answers,
        };
        self.result = Some(AttemptResult::from_records(
            attempt.score,
            elapsed,
            total,
            attempt.answers.clone(),
        ));
        self.phase = Phase::Submitted;
        self.pending = Some(attempt.clone());

        vec![
            Effect::StopTimer,
            Effect::WriteAttempt(attempt),
            Effect::DeleteSession,
        ]
    }

    pub fn attempt_recorded(&mut self) {
        self.pending = None;
    }

    /// Discards the attempt and session and goes back to `ready`.
    pub fn reattempt(&mut self) -> Result<Vec<Effect>, AppError> {
        self.expect_phase(
            &[Phase::Ready, Phase::Active, Phase::Paused, Phase::Submitted],
            "re-attempt",
        )?;
        self.answers.clear();
        self.current = 0;
        self.time_left = self.content()?.quiz.duration_seconds();
        self.stored = None;
        self.result = None;
        self.pending = None;
        self.phase = Phase::Ready;
        Ok(vec![
            Effect::StopTimer,
            Effect::DeleteAttempt,
            Effect::DeleteSession,
        ])
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.user_id,
            quiz_id: self.quiz_id,
            answers: Json(self.answers.clone()),
            time_left_seconds: self.time_left as i32,
            current_question: self.current as i32,
            last_saved_at: Utc::now(),
        }
    }

    pub fn view(&self) -> SessionView {
        let started = matches!(self.phase, Phase::Active | Phase::Paused | Phase::Submitted);
        let (quiz, questions, question_count) = match &self.content {
            Some(content) => (
                Some(content.quiz.clone()),
                if started {
                    content.questions.iter().map(PublicQuestion::from).collect()
                } else {
                    Vec::new()
                },
                content.questions.len(),
            ),
            None => (None, Vec::new(), 0),
        };
        SessionView {
            quiz_id: self.quiz_id,
            phase: self.phase,
            quiz,
            question_count,
            questions,
            answers: self.answers.clone(),
            current_question: self.current,
            time_left_seconds: self.time_left,
            resumable: self.phase == Phase::Ready && self.stored.is_some(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

type RunnerMap = RwLock<HashMap<(Uuid, i64), Arc<SessionRunner>>>;

/// Executes the effects of one `SessionMachine`.
pub struct SessionRunner {
    user_id: Uuid,
    quiz_id: i64,
    machine: Mutex<SessionMachine>,
    store: Arc<dyn QuizStore>,
    autosave_every: Duration,
    timer: Mutex<Option<oneshot::Sender<()>>>,
    /// Held from a submit, re-attempt or start transition until its effects
    /// have run, so attempt writes and deletes never interleave.
    cycle: Mutex<()>,
    /// Registry to leave once the attempt is recorded.
    registry: Weak<RunnerMap>,
}

struct Loaded {
    content: QuizContent,
    attempt: Option<Attempt>,
    stored: Option<SessionSnapshot>,
}

async fn fetch(store: &dyn QuizStore, user_id: Uuid, quiz_id: i64) -> Result<Option<Loaded>, AppError> {
    let Some(quiz) = store.get_quiz(quiz_id).await?.filter(|q| !q.is_draft) else {
        return Ok(None);
    };
    let questions = store.list_questions(quiz_id).await?;
    let attempt = store.get_attempt(user_id, quiz_id).await?;
    let stored = store.get_session(user_id, quiz_id).await?;
    Ok(Some(Loaded {
        content: QuizContent { quiz, questions },
        attempt,
        stored,
    }))
}

impl SessionRunner {
    /// Fetches quiz, questions, attempt and stored session.
    ///
    /// A missing or draft quiz is `NotFound`; a failed fetch yields a runner
    /// in the terminal `Error` phase.
    pub async fn load(
        store: Arc<dyn QuizStore>,
        user_id: Uuid,
        quiz_id: i64,
        autosave_every: Duration,
    ) -> Result<Arc<Self>, AppError> {
        let mut machine = SessionMachine::new(user_id, quiz_id);
        match fetch(store.as_ref(), user_id, quiz_id).await {
            Ok(Some(loaded)) => machine.loaded(loaded.content, loaded.attempt, loaded.stored),
            Ok(None) => return Err(AppError::NotFound("Quiz not found".to_string())),
            Err(e) => {
                tracing::error!("Failed to load quiz {} for user {}: {}", quiz_id, user_id, e);
                machine.failed("Failed to load quiz data.".to_string());
            }
        }

        Ok(Arc::new(Self {
            user_id,
            quiz_id,
            machine: Mutex::new(machine),
            store,
            autosave_every: autosave_every.max(Duration::from_secs(1)),
            timer: Mutex::new(None),
            cycle: Mutex::new(()),
            registry: Weak::new(),
        }))
    }

    fn registered(self: Arc<Self>, registry: &Arc<RunnerMap>) -> Arc<Self> {
        match Arc::try_unwrap(self) {
            Ok(mut runner) => {
                runner.registry = Arc::downgrade(registry);
                Arc::new(runner)
            }
            Err(shared) => shared,
        }
    }

    pub async fn view(&self) -> SessionView {
        self.machine.lock().await.view()
    }

    pub async fn phase(&self) -> Phase {
        self.machine.lock().await.phase()
    }

    pub async fn start(self: &Arc<Self>) -> Result<SessionView, AppError> {
        let _cycle = self.cycle.lock().await;
        let effects = self.machine.lock().await.start()?;
        tracing::info!("User {} started quiz {}", self.user_id, self.quiz_id);
        self.apply(effects).await?;
        Ok(self.view().await)
    }

    pub async fn select_answer(
        self: &Arc<Self>,
        question: usize,
        option: usize,
    ) -> Result<SessionView, AppError> {
        let effects = self.machine.lock().await.select_answer(question, option)?;
        self.apply(effects).await?;
        Ok(self.view().await)
    }

    pub async fn navigate(&self, question: usize) -> Result<SessionView, AppError> {
        let mut machine = self.machine.lock().await;
        machine.navigate(question)?;
        Ok(machine.view())
    }

    pub async fn pause(self: &Arc<Self>) -> Result<SessionView, AppError> {
        let effects = self.machine.lock().await.pause()?;
        tracing::info!("User {} paused quiz {}", self.user_id, self.quiz_id);
        self.apply(effects).await?;
        Ok(self.view().await)
    }

    pub async fn resume(self: &Arc<Self>) -> Result<SessionView, AppError> {
        let effects = self.machine.lock().await.resume()?;
        self.apply(effects).await?;
        Ok(self.view().await)
    }

    /// A submit arriving while another one is writing waits for it and then
    /// returns its result.
    pub async fn submit(self: &Arc<Self>) -> Result<SessionView, AppError> {
        let _cycle = self.cycle.lock().await;
        let effects = self.machine.lock().await.submit()?;
        if !effects.is_empty() {
            tracing::info!("User {} submitted quiz {}", self.user_id, self.quiz_id);
        }
        self.apply(effects).await?;
        Ok(self.view().await)
    }

    pub async fn reattempt(self: &Arc<Self>) -> Result<SessionView, AppError> {
        let _cycle = self.cycle.lock().await;
        let effects = self.machine.lock().await.reattempt()?;
        tracing::info!("User {} re-attempting quiz {}", self.user_id, self.quiz_id);
        self.apply(effects).await?;
        Ok(self.view().await)
    }

    /// Stops the countdown without touching the session state.
    pub async fn shutdown(&self) {
        self.stop_timer().await;
    }

    async fn apply(self: &Arc<Self>, effects: Vec<Effect>) -> Result<(), AppError> {
        for effect in effects {
            match effect {
                Effect::StartTimer => self.start_timer().await,
                other => self.execute(other).await?,
            }
        }
        Ok(())
    }

    /// Runs every effect except `StartTimer`, stopping at the first failure.
    async fn execute_all(&self, effects: Vec<Effect>) -> Result<(), AppError> {
        for effect in effects {
            self.execute(effect).await?;
        }
        Ok(())
    }

    async fn execute(&self, effect: Effect) -> Result<(), AppError> {
        match effect {
            Effect::StartTimer => {
                tracing::debug!("Timer start requested from the timer task; ignored");
            }
            Effect::StopTimer => self.stop_timer().await,
            Effect::SaveSession(snapshot) => {
                let store = Arc::clone(&self.store);
                tokio::spawn(async move {
                    if let Err(e) = store.save_session(&snapshot).await {
                        tracing::warn!(
                            "Session save for quiz {} (user {}) failed: {}",
                            snapshot.quiz_id,
                            snapshot.user_id,
                            e
                        );
                    }
                });
            }
            Effect::WriteAttempt(attempt) => {
                let saved = self.store.upsert_attempt(&attempt).await.map_err(|e| {
                    tracing::error!(
                        "Failed to record attempt of quiz {} (user {}), session kept: {}",
                        attempt.quiz_id,
                        attempt.user_id,
                        e
                    );
                    e
                })?;
                self.machine.lock().await.attempt_recorded();
                tracing::info!(
                    "Recorded attempt {} for quiz {}: {}/{} in {}s",
                    saved.id,
                    saved.quiz_id,
                    saved.score,
                    saved.total_questions,
                    saved.time_taken_seconds
                );
                self.leave_registry().await;
            }
            Effect::DeleteSession => {
                if let Err(e) = self.store.delete_session(self.user_id, self.quiz_id).await {
                    tracing::warn!("Failed to delete session of quiz {}: {}", self.quiz_id, e);
                }
            }
            Effect::DeleteAttempt => {
                self.store.delete_attempt(self.user_id, self.quiz_id).await?;
            }
        }
        Ok(())
    }

    /// The store now holds the result; later requests reload from it.
    async fn leave_registry(&self) {
        let Some(runners) = self.registry.upgrade() else {
            return;
        };
        let mut runners = runners.write().await;
        let key = (self.user_id, self.quiz_id);
        if runners
            .get(&key)
            .is_some_and(|r| std::ptr::eq(Arc::as_ptr(r), self))
        {
            runners.remove(&key);
        }
    }

    async fn start_timer(self: &Arc<Self>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        // Replacing the sender stops any previous timer task.
        self.timer.lock().await.replace(stop_tx);
        let runner = Arc::clone(self);
        tokio::spawn(runner.drive(stop_rx));
    }

    async fn stop_timer(&self) {
        self.timer.lock().await.take();
    }

    async fn drive(self: Arc<Self>, mut stop: oneshot::Receiver<()>) {
        let second = Duration::from_secs(1);
        let now = Instant::now();
        let mut countdown = time::interval_at(now + second, second);
        let mut autosave = time::interval_at(now + self.autosave_every, self.autosave_every);

        loop {
            let tick = tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = countdown.tick() => true,
                _ = autosave.tick() => false,
            };
            let _cycle = self.cycle.lock().await;
            let effects = {
                let mut machine = self.machine.lock().await;
                if tick {
                    machine.tick()
                } else {
                    machine.autosave()
                }
            };
            if let Err(e) = self.execute_all(effects).await {
                tracing::error!(
                    "Timer-driven update of quiz {} (user {}) failed: {}",
                    self.quiz_id,
                    self.user_id,
                    e
                );
            }
        }
        tracing::debug!("Timer of quiz {} (user {}) stopped", self.quiz_id, self.user_id);
    }
}

/// One live runner per (user, quiz) pair with an attempt in progress.
pub struct SessionRegistry {
    store: Arc<dyn QuizStore>,
    autosave_every: Duration,
    runners: Arc<RunnerMap>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn QuizStore>, autosave_every: Duration) -> Self {
        Self {
            store,
            autosave_every,
            runners: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the runner of the pair, loading it on first use.
    ///
    /// Load failures are reported as `Unavailable` and not cached, so the
    /// next call fetches again. Runners of already submitted quizzes are not
    /// kept either; a runner leaves the registry once its attempt is recorded.
    pub async fn open(&self, user_id: Uuid, quiz_id: i64) -> Result<Arc<SessionRunner>, AppError> {
        let key = (user_id, quiz_id);
        if let Some(runner) = self.runners.read().await.get(&key) {
            return Ok(Arc::clone(runner));
        }

        let runner =
            SessionRunner::load(Arc::clone(&self.store), user_id, quiz_id, self.autosave_every)
                .await?;
        let submitted = {
            let machine = runner.machine.lock().await;
            if let Some(message) = machine.error() {
                return Err(AppError::Unavailable(message.to_string()));
            }
            machine.phase() == Phase::Submitted
        };
        if submitted {
            return Ok(runner);
        }

        let runner = runner.registered(&self.runners);
        let mut runners = self.runners.write().await;
        Ok(Arc::clone(runners.entry(key).or_insert(runner)))
    }

    /// Number of runners currently held.
    pub async fn live_runners(&self) -> usize {
        self.runners.read().await.len()
    }

    /// Stops and drops every runner of a quiz, e.g. after it was edited or deleted.
    pub async fn forget_quiz(&self, quiz_id: i64) {
        let removed: Vec<Arc<SessionRunner>> = {
            let mut runners = self.runners.write().await;
            let keys: Vec<(Uuid, i64)> = runners
                .keys()
                .filter(|(_, q)| *q == quiz_id)
                .copied()
                .collect();
            keys.iter().filter_map(|k| runners.remove(k)).collect()
        };
        for runner in removed {
            runner.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{attempt::UNATTEMPTED, question::QuestionRecord, quiz::QuizDraft},
        store::MemoryStore,
    };
    use chrono::NaiveDate;

    fn quiz(duration_minutes: i32, negative_marking: bool) -> Quiz {
        Quiz {
            id: 7,
            title: "Daily Reasoning".to_string(),
            subject: "Reasoning".to_string(),
            quiz_date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            duration_minutes,
            negative_marking,
            negative_marks: if negative_marking { 0.25 } else { 0.0 },
            is_draft: false,
            created_at: None,
        }
    }

    /// Questions whose correct option is their position modulo 4.
    fn questions(count: usize) -> Vec<Question> {
        (0..count)
            .map(|i| Question {
                id: 100 + i as i64,
                quiz_id: 7,
                sort_order: i as i32 + 1,
                question_text: format!("Q{}", i + 1),
                options: Json(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
                correct_option: (i % 4) as i32,
                solution: String::new(),
                solution_image_url: None,
                image_url: None,
            })
            .collect()
    }

    fn ready(duration_minutes: i32, count: usize) -> SessionMachine {
        let mut m = SessionMachine::new(Uuid::new_v4(), 7);
        m.loaded(
            QuizContent {
                quiz: quiz(duration_minutes, false),
                questions: questions(count),
            },
            None,
            None,
        );
        m
    }

    fn written_attempt(effects: &[Effect]) -> Option<&NewAttempt> {
        effects.iter().find_map(|e| match e {
            Effect::WriteAttempt(a) => Some(a),
            _ => None,
        })
    }

    #[test]
    fn test_fresh_start_saves_session_and_starts_timer() {
        let mut m = ready(10, 5);
        assert_eq!(m.phase(), Phase::Ready);
        let effects = m.start().unwrap();
        assert_eq!(m.phase(), Phase::Active);
        assert_eq!(m.time_left(), 600);
        assert!(matches!(effects[0], Effect::SaveSession(_)));
        assert_eq!(effects[1], Effect::StartTimer);
    }

    #[test]
    fn test_end_to_end_submission() {
        let mut m = ready(10, 5);
        m.start().unwrap();
        for i in 0..4 {
            let effects = m.select_answer(i, i % 4).unwrap();
            assert!(matches!(effects.as_slice(), [Effect::SaveSession(_)]));
        }
        for _ in 0..180 {
            assert!(m.tick().is_empty());
        }

        let effects = m.submit().unwrap();
        assert_eq!(effects[0], Effect::StopTimer);
        assert_eq!(effects[2], Effect::DeleteSession);
        let attempt = written_attempt(&effects).unwrap();
        assert_eq!(attempt.score, 4);
        assert_eq!(attempt.total_questions, 5);
        assert_eq!(attempt.time_taken_seconds, 180);
        let unattempted: Vec<_> = attempt
            .answers
            .iter()
            .filter(|a| a.selected == UNATTEMPTED)
            .collect();
        assert_eq!(unattempted.len(), 1);
        assert_eq!(unattempted[0].question_id, 104);

        assert_eq!(m.phase(), Phase::Submitted);
        assert_eq!(m.view().result.unwrap().percentage, Some(80));
    }

    #[test]
    fn test_second_submit_is_a_no_op() {
        let mut m = ready(10, 2);
        m.start().unwrap();
        assert!(written_attempt(&m.submit().unwrap()).is_some());
        // unconfirmed writes are retried
        assert!(written_attempt(&m.submit().unwrap()).is_some());
        m.attempt_recorded();
        assert!(m.submit().unwrap().is_empty());
        assert!(m.tick().is_empty());
    }

    #[test]
    fn test_timer_expiry_submits_once() {
        let mut m = ready(1, 3);
        m.start().unwrap();
        for _ in 0..59 {
            assert!(m.tick().is_empty());
        }
        let effects = m.tick();
        let attempt = written_attempt(&effects).unwrap();
        assert_eq!(attempt.time_taken_seconds, 60);
        assert_eq!(attempt.score, 0);
        assert!(m.tick().is_empty());
        m.attempt_recorded();
        assert!(m.submit().unwrap().is_empty());
    }

    #[test]
    fn test_paused_quiz_neither_ticks_nor_saves() {
        let mut m = ready(10, 3);
        m.start().unwrap();
        m.tick();
        let effects = m.pause().unwrap();
        assert_eq!(effects[0], Effect::StopTimer);
        assert!(matches!(effects[1], Effect::SaveSession(_)));

        for _ in 0..30 {
            m.tick();
        }
        assert_eq!(m.time_left(), 599);
        assert!(m.autosave().is_empty());
        assert!(matches!(m.select_answer(0, 0), Err(AppError::Conflict(_))));

        assert_eq!(m.resume().unwrap(), vec![Effect::StartTimer]);
        assert_eq!(m.phase(), Phase::Active);
        assert_eq!(m.autosave().len(), 1);
    }

    #[test]
    fn test_resume_continues_stored_session() {
        let user = Uuid::new_v4();
        let mut stored_answers = BTreeMap::new();
        stored_answers.insert(0, 1);
        stored_answers.insert(1, 9); // option out of range
        stored_answers.insert(8, 0); // question out of range
        let snapshot = SessionSnapshot {
            user_id: user,
            quiz_id: 7,
            answers: Json(stored_answers),
            time_left_seconds: 100,
            current_question: 2,
            last_saved_at: Utc::now(),
        };

        let mut m = SessionMachine::new(user, 7);
        m.loaded(
            QuizContent {
                quiz: quiz(10, false),
                questions: questions(3),
            },
            None,
            Some(snapshot),
        );
        assert!(m.view().resumable);

        m.start().unwrap();
        assert_eq!(m.time_left(), 100);
        assert_eq!(m.answers().len(), 1);
        assert_eq!(m.view().current_question, 2);
        assert!(!m.view().resumable);
    }

    #[test]
    fn test_resume_with_no_time_left_submits_immediately() {
        let user = Uuid::new_v4();
        let mut m = SessionMachine::new(user, 7);
        m.loaded(
            QuizContent {
                quiz: quiz(10, false),
                questions: questions(2),
            },
            None,
            Some(SessionSnapshot {
                user_id: user,
                quiz_id: 7,
                answers: Json(BTreeMap::new()),
                time_left_seconds: 0,
                current_question: 0,
                last_saved_at: Utc::now(),
            }),
        );
        let effects = m.start().unwrap();
        assert_eq!(written_attempt(&effects).unwrap().time_taken_seconds, 600);
        assert_eq!(m.phase(), Phase::Submitted);
    }

    #[test]
    fn test_reattempt_returns_to_ready() {
        let mut m = ready(10, 3);
        m.start().unwrap();
        m.select_answer(0, 0).unwrap();
        m.tick();
        m.submit().unwrap();

        let effects = m.reattempt().unwrap();
        assert!(effects.contains(&Effect::DeleteAttempt));
        assert!(effects.contains(&Effect::DeleteSession));
        assert_eq!(m.phase(), Phase::Ready);
        assert!(m.answers().is_empty());
        assert_eq!(m.time_left(), 600);
        assert!(m.view().result.is_none());
    }

    #[test]
    fn test_loaded_with_attempt_is_submitted() {
        let user = Uuid::new_v4();
        let mut m = SessionMachine::new(user, 7);
        let attempt = Attempt {
            id: 1,
            user_id: user,
            quiz_id: 7,
            score: 2,
            total_questions: 3,
            time_taken_seconds: 45,
            answers: Json(Vec::new()),
            completed_at: Utc::now(),
        };
        m.loaded(
            QuizContent {
                quiz: quiz(10, false),
                questions: questions(3),
            },
            Some(attempt),
            None,
        );
        assert_eq!(m.phase(), Phase::Submitted);
        assert_eq!(m.view().result.unwrap().score, 2);
        assert!(m.start().is_err());
    }

    #[test]
    fn test_failed_load_is_terminal() {
        let mut m = SessionMachine::new(Uuid::new_v4(), 7);
        m.failed("Failed to load quiz data.".to_string());
        assert_eq!(m.phase(), Phase::Error);
        assert_eq!(m.view().error.as_deref(), Some("Failed to load quiz data."));
        assert!(m.start().is_err());
        assert!(m.reattempt().is_err());
        assert!(m.tick().is_empty());
    }

    #[test]
    fn test_invalid_selection_is_rejected() {
        let mut m = ready(10, 2);
        assert!(matches!(m.select_answer(0, 0), Err(AppError::Conflict(_))));
        m.start().unwrap();
        assert!(matches!(m.select_answer(5, 0), Err(AppError::BadRequest(_))));
        assert!(matches!(m.select_answer(0, 4), Err(AppError::BadRequest(_))));
        assert!(matches!(m.navigate(2), Err(AppError::BadRequest(_))));
        m.navigate(1).unwrap();
        assert_eq!(m.snapshot().current_question, 1);
    }

    #[test]
    fn test_questions_hidden_until_started() {
        let mut m = ready(10, 2);
        assert!(m.view().questions.is_empty());
        assert_eq!(m.view().question_count, 2);
        m.start().unwrap();
        assert_eq!(m.view().questions.len(), 2);
    }

    async fn seeded_store(duration_minutes: i32) -> (Arc<MemoryStore>, i64) {
        let store = Arc::new(MemoryStore::new());
        let quiz = store
            .create_quiz(&QuizDraft {
                title: "Timed".to_string(),
                subject: "Reasoning".to_string(),
                quiz_date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
                duration_minutes,
                negative_marking: false,
                negative_marks: 0.0,
                is_draft: false,
            })
            .await
            .unwrap();
        let records: Vec<QuestionRecord> = (0..3)
            .map(|i| QuestionRecord {
                id: None,
                sort_order: i + 1,
                question_text: format!("Q{}", i + 1),
                options: vec!["a".into(), "b".into()],
                correct_option: 0,
                solution: String::new(),
                solution_image_url: None,
                image_url: None,
            })
            .collect();
        store.replace_questions(quiz.id, &records).await.unwrap();
        (store, quiz.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_submits_when_time_runs_out() {
        let (store, quiz_id) = seeded_store(1).await;
        let user = Uuid::new_v4();
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));

        let runner = registry.open(user, quiz_id).await.unwrap();
        runner.start().await.unwrap();
        runner.select_answer(0, 0).await.unwrap();

        time::sleep(Duration::from_secs(62)).await;

        assert_eq!(runner.phase().await, Phase::Submitted);
        let attempt = store.get_attempt(user, quiz_id).await.unwrap().unwrap();
        assert_eq!(attempt.score, 1);
        assert_eq!(attempt.time_taken_seconds, 60);
        assert!(store.get_session(user, quiz_id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_autosaves_only_while_active() {
        let (store, quiz_id) = seeded_store(10).await;
        let user = Uuid::new_v4();
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));
        let runner = registry.open(user, quiz_id).await.unwrap();

        runner.start().await.unwrap();
        time::sleep(Duration::from_millis(31_500)).await;
        // start + two periodic saves
        assert_eq!(store.session_writes(), 3);

        let paused = runner.pause().await.unwrap();
        assert_eq!(paused.time_left_seconds, 600 - 31);
        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.session_writes(), 4);
        assert_eq!(runner.view().await.time_left_seconds, 600 - 31);

        let stored = store.get_session(user, quiz_id).await.unwrap().unwrap();
        assert_eq!(stored.time_left_seconds, 600 - 31);

        runner.resume().await.unwrap();
        time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(runner.view().await.time_left_seconds, 600 - 41);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_keeps_answers_when_store_is_down() {
        let (store, quiz_id) = seeded_store(10).await;
        let user = Uuid::new_v4();
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));
        let runner = registry.open(user, quiz_id).await.unwrap();
        runner.start().await.unwrap();
        time::sleep(Duration::from_millis(10)).await;

        store.set_offline(true);
        let view = runner.select_answer(1, 1).await.unwrap();
        assert_eq!(view.answers.get(&1), Some(&1));
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(runner.phase().await, Phase::Active);

        // The authoritative write surfaces its failure and can be retried.
        assert!(runner.submit().await.is_err());
        assert_eq!(runner.phase().await, Phase::Submitted);
        store.set_offline(false);
        assert!(store.get_session(user, quiz_id).await.unwrap().is_some());

        runner.submit().await.unwrap();
        let attempt = store.get_attempt(user, quiz_id).await.unwrap().unwrap();
        assert_eq!(attempt.total_questions, 3);
        assert!(store.get_session(user, quiz_id).await.unwrap().is_none());
        assert!(runner.submit().await.is_ok());
    }

    #[tokio::test]
    async fn test_registry_reports_unavailable_store() {
        let (store, quiz_id) = seeded_store(10).await;
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));
        store.set_offline(true);
        let result = registry.open(Uuid::new_v4(), quiz_id).await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));

        store.set_offline(false);
        assert!(registry.open(Uuid::new_v4(), quiz_id).await.is_ok());
        assert!(matches!(
            registry.open(Uuid::new_v4(), 999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submits_write_the_attempt_once() {
        let (store, quiz_id) = seeded_store(10).await;
        store.set_attempt_latency(Duration::from_millis(50));
        let user = Uuid::new_v4();
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));
        let runner = registry.open(user, quiz_id).await.unwrap();
        runner.start().await.unwrap();
        runner.select_answer(0, 0).await.unwrap();

        let (first, second) = tokio::join!(runner.submit(), runner.submit());
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(store.attempt_writes(), 1);
        assert_eq!(first.result.unwrap().score, 1);
        assert_eq!(second.result.unwrap().score, 1);
        assert!(store.get_session(user, quiz_id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_submit_during_timed_out_write() {
        let (store, quiz_id) = seeded_store(1).await;
        store.set_attempt_latency(Duration::from_secs(5));
        let user = Uuid::new_v4();
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));
        let runner = registry.open(user, quiz_id).await.unwrap();
        runner.start().await.unwrap();
        runner.select_answer(0, 0).await.unwrap();

        // The countdown hit zero at 60s and its write lands at 65s.
        time::sleep(Duration::from_millis(60_500)).await;
        assert_eq!(store.attempt_writes(), 0);

        let view = runner.submit().await.unwrap();
        assert_eq!(view.phase, Phase::Submitted);
        assert_eq!(store.attempt_writes(), 1);
        let attempt = store.get_attempt(user, quiz_id).await.unwrap().unwrap();
        assert_eq!(attempt.time_taken_seconds, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reattempt_waits_for_in_flight_submit() {
        let (store, quiz_id) = seeded_store(10).await;
        store.set_attempt_latency(Duration::from_millis(50));
        let user = Uuid::new_v4();
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));
        let runner = registry.open(user, quiz_id).await.unwrap();
        runner.start().await.unwrap();

        let submitting = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.submit().await }
        });
        time::sleep(Duration::from_millis(10)).await;
        let view = runner.reattempt().await.unwrap();

        assert!(submitting.await.unwrap().is_ok());
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(store.attempt_writes(), 1);
        assert!(store.get_attempt(user, quiz_id).await.unwrap().is_none());

        let reopened = registry.open(user, quiz_id).await.unwrap();
        assert_eq!(reopened.phase().await, Phase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_drops_runner_once_attempt_is_recorded() {
        let (store, quiz_id) = seeded_store(10).await;
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));
        let user = Uuid::new_v4();
        let runner = registry.open(user, quiz_id).await.unwrap();
        runner.start().await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.live_runners().await, 1);

        runner.submit().await.unwrap();
        assert_eq!(registry.live_runners().await, 0);

        let reopened = registry.open(user, quiz_id).await.unwrap();
        assert!(!Arc::ptr_eq(&runner, &reopened));
        assert_eq!(reopened.phase().await, Phase::Submitted);
        assert_eq!(registry.live_runners().await, 0);

        reopened.reattempt().await.unwrap();
        let fresh = registry.open(user, quiz_id).await.unwrap();
        assert_eq!(fresh.phase().await, Phase::Ready);
        assert_eq!(registry.live_runners().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_keeps_runner_registered() {
        let (store, quiz_id) = seeded_store(10).await;
        let registry = SessionRegistry::new(store.clone(), Duration::from_secs(15));
        let user = Uuid::new_v4();
        let runner = registry.open(user, quiz_id).await.unwrap();
        runner.start().await.unwrap();
        time::sleep(Duration::from_millis(10)).await;

        store.set_offline(true);
        assert!(runner.submit().await.is_err());
        store.set_offline(false);
        let same = registry.open(user, quiz_id).await.unwrap();
        assert!(Arc::ptr_eq(&runner, &same));

        same.submit().await.unwrap();
        assert_eq!(registry.live_runners().await, 0);
    }

    #[tokio::test]
    async fn test_registry_shares_runner_per_pair() {
        let (store, quiz_id) = seeded_store(10).await;
        let registry = SessionRegistry::new(store, Duration::from_secs(15));
        let user = Uuid::new_v4();
        let a = registry.open(user, quiz_id).await.unwrap();
        let b = registry.open(user, quiz_id).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        registry.forget_quiz(quiz_id).await;
        let c = registry.open(user, quiz_id).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
