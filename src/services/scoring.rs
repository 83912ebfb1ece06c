// src/services/scoring.rs

use std::{cmp::Ordering, collections::BTreeMap};

use crate::models::{
    attempt::{AnswerRecord, UNATTEMPTED},
    question::Question,
};

/// Deduction rule of a quiz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub negative_marking: bool,
    /// Marks deducted per wrong answer; fractions allowed.
    pub penalty: f64,
}

impl ScoringPolicy {
    pub const PLAIN: ScoringPolicy = ScoringPolicy {
        negative_marking: false,
        penalty: 0.0,
    };
}

/// Outcome of grading an answer map against a quiz.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: i32,
    pub correct: usize,
    pub incorrect: usize,
    pub unattempted: usize,
    pub answers: Vec<AnswerRecord>,
}

/// Grades `answers` (question position -> selected option) against `questions`.
///
/// Positions missing from the map are unattempted and never penalized.
pub fn grade(
    questions: &[Question],
    answers: &BTreeMap<usize, usize>,
    policy: ScoringPolicy,
) -> Grade {
    let mut correct = 0;
    let mut incorrect = 0;

    let records: Vec<AnswerRecord> = questions
        .iter()
        .enumerate()
        .map(|(position, q)| {
            let selected = answers
                .get(&position)
                .and_then(|&option| i32::try_from(option).ok())
                .unwrap_or(UNATTEMPTED);
            let is_correct = selected != UNATTEMPTED && selected == q.correct_option;
            if is_correct {
                correct += 1;
            } else if selected != UNATTEMPTED {
                incorrect += 1;
            }
            AnswerRecord {
                question_id: q.id,
                selected,
                correct_option: q.correct_option,
                correct: is_correct,
            }
        })
        .collect();

    Grade {
        score: final_score(correct, incorrect, policy),
        correct,
        incorrect,
        unattempted: questions.len() - correct - incorrect,
        answers: records,
    }
}

/// `correct`, or with negative marking `max(0, round(correct - incorrect * penalty))`.
///
/// The penalized value is first rounded to two decimals so that float noise
/// never tips a `.5` boundary, then rounded half up to a whole mark.
pub fn final_score(correct: usize, incorrect: usize, policy: ScoringPolicy) -> i32 {
    if !policy.negative_marking || policy.penalty <= 0.0 {
        return correct as i32;
    }
    let raw = correct as f64 - incorrect as f64 * policy.penalty;
    let two_places = (raw * 100.0).round() / 100.0;
    (two_places + 0.5).floor().max(0.0) as i32
}

/// `round(score / total * 100)`; undefined for a quiz without questions.
pub fn percentage(score: i32, total_questions: i32) -> Option<i32> {
    if total_questions <= 0 {
        return None;
    }
    Some((score as f64 / total_questions as f64 * 100.0).round() as i32)
}

/// Leaderboard order: higher score first, then faster time.
pub fn compare_attempts(a: (i32, i32), b: (i32, i32)) -> Ordering {
    b.0.cmp(&a.0).then(a.1.cmp(&b.1))
}

/// 1-based rank of (`score`, `elapsed`) among `others`.
///
/// Everyone with a strictly greater score, or an equal score and a strictly
/// lower elapsed time, is ahead. Equal score and equal time share a rank.
pub fn rank_among(score: i32, elapsed: i32, others: impl IntoIterator<Item = (i32, i32)>) -> i64 {
    let ahead = others
        .into_iter()
        .filter(|&(s, t)| s > score || (s == score && t < elapsed))
        .count() as i64;
    ahead + 1
}

/// Share of participants ranked below `rank`, in percent.
pub fn percentile(rank: i64, participants: i64) -> f64 {
    if participants <= 1 {
        return 100.0;
    }
    (participants - rank) as f64 / (participants - 1) as f64 * 100.0
}
