// src/lifecycle.rs
//
// The submission lifecycle manager. Every mutation of the submissions table
// goes through here; handlers never touch it directly.
//
// States: NONE -> ACTIVE -> COMPLETED -> ARCHIVED (terminal, or purged).

use std::collections::HashMap;

use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};

use crate::error::AppError;
use crate::grading::AnswerPayload;
use crate::models::submission::{BulkArchiveFilter, Submission, SubmissionWithStudent};

const SUBMISSION_COLUMNS: &str = "id, student_id, score, answers, start_time, end_time, \
     is_completed, is_archived, archived_at";

const JOINED_COLUMNS: &str = "s.id, s.student_id, s.score, s.start_time, s.end_time, \
     s.is_completed, s.is_archived, s.archived_at, \
     st.student_number, st.full_name, st.class_name, st.course";

/// Starts an exam attempt for a student, or resumes the active one.
///
/// Idempotent resume: an existing non-archived, incomplete submission is
/// returned unchanged. A completed, non-archived submission blocks a new
/// start until an administrator archives it (the retake flow).
pub async fn start(pool: &PgPool, student_id: i64) -> Result<Submission, AppError> {
    let existing = sqlx::query_as::<_, Submission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions \
         WHERE student_id = $1 AND is_archived = FALSE \
         ORDER BY start_time DESC LIMIT 1"
    ))
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    if let Some(submission) = existing {
        if !submission.is_completed {
            return Ok(submission);
        }
        return Err(AppError::RetakeNotAllowed(
            "You have already completed this exam and cannot retake it.".to_string(),
        ));
    }

    let submission = sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions (student_id, answers, is_completed) \
         VALUES ($1, '{{}}'::jsonb, FALSE) \
         RETURNING {SUBMISSION_COLUMNS}"
    ))
    .bind(student_id)
    .fetch_one(pool)
    .await?;

    Ok(submission)
}

/// Completes an attempt: stores the raw answer map, the computed score, and
/// the end timestamp in one conditional update.
///
/// The `is_completed = FALSE` guard makes concurrent submits safe: only the
/// first write wins; a losing racer gets the stored row back untouched.
pub async fn complete(
    pool: &PgPool,
    id: i64,
    answers: &HashMap<i64, AnswerPayload>,
    score: i32,
) -> Result<Submission, AppError> {
    let updated = sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions \
         SET answers = $2, score = $3, end_time = now(), is_completed = TRUE \
         WHERE id = $1 AND is_completed = FALSE \
         RETURNING {SUBMISSION_COLUMNS}"
    ))
    .bind(id)
    .bind(Json(answers))
    .bind(score)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(submission) => Ok(submission),
        None => fetch(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Submission not found".to_string())),
    }
}

/// Fetches one submission by id.
pub async fn fetch(pool: &PgPool, id: i64) -> Result<Option<Submission>, AppError> {
    let submission = sqlx::query_as::<_, Submission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(submission)
}

/// Archives an attempt (soft delete). History is preserved; the student may
/// start a fresh attempt afterwards.
pub async fn archive(pool: &PgPool, id: i64) -> Result<(), AppError> {
    let result =
        sqlx::query("UPDATE submissions SET is_archived = TRUE, archived_at = now() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Submission not found".to_string()));
    }
    Ok(())
}

/// Archives every non-archived submission matching all provided filters.
/// Missing scores count as 0 for the range checks.
pub async fn bulk_archive(pool: &PgPool, filter: &BulkArchiveFilter) -> Result<u64, AppError> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "UPDATE submissions SET is_archived = TRUE, archived_at = now() FROM students \
         WHERE submissions.student_id = students.id AND submissions.is_archived = FALSE",
    );

    if let Some(class_name) = &filter.class_name {
        builder.push(" AND students.class_name = ");
        builder.push_bind(class_name);
    }
    if let Some(course_name) = &filter.course_name {
        builder.push(" AND students.course = ");
        builder.push_bind(course_name);
    }
    if let Some(min_score) = filter.min_score {
        builder.push(" AND COALESCE(submissions.score, 0) >= ");
        builder.push_bind(min_score);
    }
    if let Some(max_score) = filter.max_score {
        builder.push(" AND COALESCE(submissions.score, 0) <= ");
        builder.push_bind(max_score);
    }

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Permanently deletes archived submissions, optionally scoped to one class.
pub async fn purge_archived(pool: &PgPool, class_name: Option<&str>) -> Result<u64, AppError> {
    let result = match class_name {
        Some(class_name) => {
            sqlx::query(
                "DELETE FROM submissions USING students \
                 WHERE submissions.student_id = students.id \
                   AND submissions.is_archived = TRUE \
                   AND students.class_name = $1",
            )
            .bind(class_name)
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query("DELETE FROM submissions WHERE is_archived = TRUE")
                .execute(pool)
                .await?
        }
    };

    Ok(result.rows_affected())
}

/// Permanently deletes a single submission, but only from the archive.
pub async fn purge_archived_one(pool: &PgPool, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM submissions WHERE id = $1 AND is_archived = TRUE")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Archived submission not found".to_string(),
        ));
    }
    Ok(())
}

/// Active (non-archived) submissions joined with their students, newest
/// first.
pub async fn list_active(pool: &PgPool) -> Result<Vec<SubmissionWithStudent>, AppError> {
    let rows = sqlx::query_as::<_, SubmissionWithStudent>(&format!(
        "SELECT {JOINED_COLUMNS} FROM submissions s \
         JOIN students st ON s.student_id = st.id \
         WHERE s.is_archived = FALSE \
         ORDER BY s.start_time DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Archived submissions joined with their students, most recently archived
/// first.
pub async fn list_archived(pool: &PgPool) -> Result<Vec<SubmissionWithStudent>, AppError> {
    let rows = sqlx::query_as::<_, SubmissionWithStudent>(&format!(
        "SELECT {JOINED_COLUMNS} FROM submissions s \
         JOIN students st ON s.student_id = st.id \
         WHERE s.is_archived = TRUE \
         ORDER BY s.archived_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
