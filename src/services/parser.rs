// src/services/parser.rs

//! Bulk question text format used by the admin console.
//!
//! ```text
//! Q: What comes next? 2, 4, 8, ...
//! A: 10
//! B: 16 *
//! C: 12
//! Solution: Each term doubles.
//! SolImage: https://cdn.example.com/doubling.png
//! ```
//!
//! Blocks are separated by blank lines. A trailing `*` marks the correct
//! option. Malformed blocks are skipped, never reported as errors.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::question::QuestionDraft;

static BLOCK_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("block separator pattern"));
static QUESTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Q[:.)]\s*(.*)$").expect("question pattern"));
static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-D][:.)]\s*(.*)$").expect("option pattern"));
static SOLUTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Sol|Solution|Exp|Explanation)[:.)]\s*(.*)$").expect("solution pattern")
});
static SOLUTION_IMAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:SolImage|SolutionImage)[:.)]\s*(.*)$").expect("solution image pattern")
});

/// Shown when a bulk import yields nothing.
pub const NO_QUESTIONS_WARNING: &str = "No valid questions found. Check the format.";

/// Minimum lines of a block: the question plus two options.
const MIN_BLOCK_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    pub solution: String,
    pub solution_image_url: Option<String>,
}

impl From<ParsedQuestion> for QuestionDraft {
    fn from(p: ParsedQuestion) -> Self {
        QuestionDraft {
            id: None,
            question_text: p.question_text,
            options: p.options,
            correct_option: p.correct_option,
            solution: p.solution,
            image_url: None,
            solution_image_url: p.solution_image_url,
        }
    }
}

/// Parses every well-formed block of `text`; an empty result means nothing was usable.
pub fn parse_bulk(text: &str) -> Vec<ParsedQuestion> {
    BLOCK_SEPARATOR
        .split(text.trim())
        .filter_map(parse_block)
        .collect()
}

fn captured<'a>(pattern: &Regex, line: &'a str) -> Option<&'a str> {
    pattern
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

fn parse_block(block: &str) -> Option<ParsedQuestion> {
    let lines: Vec<&str> = block
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < MIN_BLOCK_LINES {
        return None;
    }

    let mut question_text = String::new();
    let mut options: Vec<String> = Vec::new();
    let mut correct_option = 0;
    let mut solution = String::new();
    let mut solution_image_url = None;
    let mut capturing_solution = false;

    for line in lines {
        if let Some(text) = captured(&QUESTION_LINE, line) {
            question_text = text.to_string();
            capturing_solution = false;
        } else if let Some(text) = captured(&OPTION_LINE, line) {
            // Last marker wins.
            let text = match text.strip_suffix('*') {
                Some(stripped) => {
                    correct_option = options.len();
                    stripped.trim_end()
                }
                None => text,
            };
            options.push(text.to_string());
            capturing_solution = false;
        } else if let Some(text) = captured(&SOLUTION_LINE, line) {
            if !text.is_empty() {
                solution = text.to_string();
            }
            capturing_solution = true;
        } else if let Some(reference) = captured(&SOLUTION_IMAGE_LINE, line) {
            if !reference.is_empty() {
                solution_image_url = Some(reference.to_string());
            }
            capturing_solution = false;
        } else if capturing_solution {
            if !solution.is_empty() {
                solution.push('\n');
            }
            solution.push_str(line);
        }
    }

    if question_text.is_empty() || options.len() < 2 {
        tracing::debug!("Skipping malformed question block");
        return None;
    }

    Some(ParsedQuestion {
        question_text,
        options,
        correct_option,
        solution,
        solution_image_url,
    })
}

const OPTION_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Writes questions back in the bulk format accepted by `parse_bulk`.
pub fn serialize_bulk<'a>(questions: impl IntoIterator<Item = &'a QuestionDraft>) -> String {
    let blocks: Vec<String> = questions
        .into_iter()
        .map(|q| {
            let mut lines = vec![format!("Q: {}", q.question_text.trim())];
            for (i, (letter, option)) in OPTION_LETTERS.iter().zip(&q.options).enumerate() {
                let marker = if i == q.correct_option { " *" } else { "" };
                lines.push(format!("{}: {}{}", letter, option.trim(), marker));
            }
            let solution = q.solution.trim();
            if !solution.is_empty() {
                lines.push(format!("Solution: {}", solution));
            }
            if let Some(reference) = q.solution_image_url.as_deref() {
                lines.push(format!("SolImage: {}", reference));
            }
            lines.join("\n")
        })
        .collect();
    blocks.join("\n\n")
}
