// src/models/question.rs

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// The supported question formats. Mirrors the `question_kind` enum type in
/// the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "question_kind", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    TrueFalse,
    Matching,
    ShortAnswer,
    Essay,
    Ordering,
}

/// Represents the 'questions' table in the database.
///
/// `options` carries the canonical option order: for `ordering` questions it
/// IS the correct sequence; for `matching` questions it lists the left-hand
/// items. `correct_text` holds the expected short answer, the essay
/// reference, or the matching pair map serialized as a JSON object.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub prompt: String,
    pub kind: QuestionKind,
    pub options: Json<Vec<String>>,
    pub correct_index: Option<i32>,
    pub correct_text: Option<String>,
    pub points: i32,
    pub course_name: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    /// Parses the matching pair map (left item -> right item) stored in
    /// `correct_text`. An absent or unparseable map yields an empty one,
    /// which grades to zero.
    pub fn matching_pairs(&self) -> HashMap<String, String> {
        self.correct_text
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// DTO for sending a question to exam clients. Answer-key fields
/// (`correct_index`, `correct_text`) are stripped. For matching questions,
/// `options` carries the left-hand items and `right_values` the deduplicated,
/// sorted right-hand values, so the pairing is not recoverable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: Vec<String>,
    pub points: i32,
    pub course_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_values: Option<Vec<String>>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        let (options, right_values) = match q.kind {
            QuestionKind::Matching => {
                let pairs = q.matching_pairs();
                let mut left: Vec<String> = pairs.keys().cloned().collect();
                left.sort();
                let right: BTreeSet<String> = pairs.into_values().collect();
                (left, Some(right.into_iter().collect()))
            }
            _ => (q.options.0.clone(), None),
        };

        Self {
            id: q.id,
            kind: q.kind,
            prompt: q.prompt.clone(),
            options,
            points: q.points,
            course_name: q.course_name.clone(),
            right_values,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub kind: QuestionKind,
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    #[validate(custom(function = validate_options))]
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_index: Option<i32>,
    #[validate(length(max = 4000))]
    pub correct_text: Option<String>,
    pub points: Option<i32>,
    #[validate(length(max = 100))]
    pub course_name: Option<String>,
}

impl CreateQuestionRequest {
    /// Kind-specific answer-key checks that `validator` attributes cannot
    /// express. Returns a message describing the first violation.
    pub fn answer_key_error(&self) -> Option<String> {
        match self.kind {
            QuestionKind::SingleChoice | QuestionKind::TrueFalse => {
                if self.options.len() < 2 {
                    return Some("Choice questions need at least two options".to_string());
                }
                if self.kind == QuestionKind::TrueFalse && self.options.len() != 2 {
                    return Some("True/false questions take exactly two options".to_string());
                }
                match self.correct_index {
                    Some(idx) if (0..self.options.len() as i32).contains(&idx) => None,
                    _ => Some("correct_index must point at one of the options".to_string()),
                }
            }
            QuestionKind::Ordering => {
                if self.options.len() < 2 {
                    return Some("Ordering questions need at least two options".to_string());
                }
                None
            }
            QuestionKind::Matching => {
                let pairs: Option<HashMap<String, String>> = self
                    .correct_text
                    .as_deref()
                    .and_then(|raw| serde_json::from_str(raw).ok());
                match pairs {
                    Some(map) if !map.is_empty() => None,
                    _ => Some(
                        "Matching questions need a non-empty JSON pair map in correct_text"
                            .to_string(),
                    ),
                }
            }
            QuestionKind::ShortAnswer => {
                if self
                    .correct_text
                    .as_deref()
                    .is_none_or(|t| t.trim().is_empty())
                {
                    return Some("Short-answer questions need an expected answer".to_string());
                }
                None
            }
            // An essay without a reference auto-grants on any non-empty answer.
            QuestionKind::Essay => None,
        }
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub kind: Option<QuestionKind>,
    pub prompt: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_index: Option<i32>,
    pub correct_text: Option<String>,
    pub points: Option<i32>,
    pub course_name: Option<String>,
}
