// src/models/session.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

/// Represents the 'quiz_sessions' table: the resumable state of an
/// in-progress attempt. Saved best-effort, deleted on submission.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user_id: Uuid,
    pub quiz_id: i64,

    /// Question position -> selected option index.
    pub answers: Json<BTreeMap<usize, usize>>,

    pub time_left_seconds: i32,
    pub current_question: i32,
    pub last_saved_at: DateTime<Utc>,
}
