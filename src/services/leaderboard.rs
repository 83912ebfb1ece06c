// src/services/leaderboard.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    config::DAILY_LEADERBOARD_LIMIT,
    error::AppError,
    models::{
        attempt::{Attempt, Leaderboard, LeaderboardEntry, Standing},
        profile::ANONYMOUS,
    },
    services::scoring,
    store::QuizStore,
};

/// Turns attempts already in leaderboard order into ranked rows.
///
/// Equal score and equal time share a rank; the next rank skips accordingly.
async fn ranked_entries(
    store: &dyn QuizStore,
    attempts: &[Attempt],
) -> Result<Vec<LeaderboardEntry>, AppError> {
    let ids: Vec<Uuid> = attempts.iter().map(|a| a.user_id).collect();
    let names: HashMap<Uuid, String> = store
        .profiles_by_ids(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p.public_name()))
        .collect();

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(attempts.len());
    for (position, a) in attempts.iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.score == a.score && prev.time_taken_seconds == a.time_taken_seconds => {
                prev.rank
            }
            _ => position as i64 + 1,
        };
        entries.push(LeaderboardEntry {
            rank,
            user_id: a.user_id,
            display_name: names
                .get(&a.user_id)
                .cloned()
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            quiz_id: a.quiz_id,
            score: a.score,
            total_questions: a.total_questions,
            time_taken_seconds: a.time_taken_seconds,
            completed_at: a.completed_at,
        });
    }
    Ok(entries)
}

/// Top `limit` attempts of a quiz plus the caller's standing.
pub async fn quiz_leaderboard(
    store: &dyn QuizStore,
    quiz_id: i64,
    user_id: Uuid,
    limit: i64,
) -> Result<Leaderboard, AppError> {
    let top = store.top_attempts(quiz_id, limit).await?;
    let entries = ranked_entries(store, &top).await?;
    let participants = store.count_attempts(quiz_id).await?;

    let me = match store.get_attempt(user_id, quiz_id).await? {
        Some(mine) => {
            let rank = match entries.iter().find(|e| e.user_id == user_id) {
                Some(entry) => entry.rank,
                None => {
                    store
                        .count_ahead(quiz_id, mine.score, mine.time_taken_seconds)
                        .await?
                        + 1
                }
            };
            Some(Standing {
                rank,
                participants,
                percentile: scoring::percentile(rank, participants),
                score: mine.score,
                time_taken_seconds: mine.time_taken_seconds,
            })
        }
        None => None,
    };

    Ok(Leaderboard {
        entries,
        participants,
        me,
    })
}

/// Start of the current UTC day.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// Best attempts of any quiz completed today.
pub async fn daily_leaderboard(
    store: &dyn QuizStore,
    now: DateTime<Utc>,
) -> Result<Vec<LeaderboardEntry>, AppError> {
    let attempts = store
        .attempts_since(start_of_day(now), DAILY_LEADERBOARD_LIMIT)
        .await?;
    ranked_entries(store, &attempts).await
}
