// src/models/profile.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Represents the 'profiles' table, maintained by the identity provider.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub is_admin: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Profile {
    pub fn public_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS)
            .to_string()
    }
}

/// Display name for users without a profile or name.
pub const ANONYMOUS: &str = "Anonymous";

/// Profile of the current user plus quiz statistics.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub display_name: String,
    pub is_admin: bool,
    pub quizzes_taken: usize,
    pub total_score: i64,
    pub in_progress: usize,
}
