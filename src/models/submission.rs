// src/models/submission.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::grading::AnswerPayload;

/// Represents the 'submissions' table: one student's exam attempt.
///
/// Lifecycle: created on exam start (ACTIVE), mutated exactly once by
/// completion, optionally archived (soft delete that frees the student for a
/// retake), optionally purged from the archive.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub student_id: i64,

    /// Percentage score; null until the attempt is completed.
    pub score: Option<i32>,

    /// Raw answer map (question id -> typed payload), stored verbatim.
    pub answers: Option<Json<HashMap<i64, AnswerPayload>>>,

    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub is_completed: bool,
    pub is_archived: bool,
    pub archived_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Aggregated row for admin result listings: submission joined with the
/// student who made it. The answer map is omitted here; the details endpoint
/// returns it.
#[derive(Debug, Serialize, FromRow)]
pub struct SubmissionWithStudent {
    pub id: i64,
    pub student_id: i64,
    pub score: Option<i32>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub is_completed: bool,
    pub is_archived: bool,
    pub archived_at: Option<chrono::DateTime<chrono::Utc>>,
    pub student_number: String,
    pub full_name: Option<String>,
    pub class_name: Option<String>,
    pub course: Option<String>,
}

/// DTO for starting (or resuming) an exam attempt.
#[derive(Debug, Deserialize)]
pub struct StartExamRequest {
    pub student_id: i64,
}

/// DTO for submitting a finished attempt.
///
/// Keys are question ids; values are the typed answer payloads, already
/// translated back to canonical option indices by the client session layer.
#[derive(Debug, Deserialize)]
pub struct SubmitExamRequest {
    #[serde(default)]
    pub answers: HashMap<i64, AnswerPayload>,
}

/// Filter for bulk archiving. All provided fields must match (AND
/// semantics); an omitted field places no constraint on that dimension.
#[derive(Debug, Default, Deserialize)]
pub struct BulkArchiveFilter {
    pub class_name: Option<String>,
    pub course_name: Option<String>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
}

/// Filter for purging the archive; an omitted class clears all of it.
#[derive(Debug, Default, Deserialize)]
pub struct PurgeArchiveFilter {
    pub class_name: Option<String>,
}
