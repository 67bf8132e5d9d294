// src/handlers/exam.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;

use crate::{
    error::AppError,
    grading,
    handlers::auth::fetch_student,
    lifecycle,
    models::{
        question::{PublicQuestion, Question},
        settings::Settings,
        submission::{StartExamRequest, SubmitExamRequest},
    },
    utils::normalize::normalize,
};

/// Grace window beyond the configured duration before a submit is flagged as
/// late. The client timer remains the enforcing side; see DESIGN.md.
const SUBMIT_GRACE_SECS: i64 = 60;

const QUESTION_COLUMNS: &str = "id, prompt, kind, options, correct_index, correct_text, points, \
     course_name, created_at";

async fn fetch_questions(pool: &PgPool) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions ORDER BY id"
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch questions: {:?}", e);
        AppError::from(e)
    })?;

    Ok(questions)
}

/// Starts an exam attempt, or resumes the student's active one.
///
/// Returns 201 with the submission either way; a completed, non-archived
/// attempt yields 403 until an administrator archives it.
pub async fn start_exam(
    State(pool): State<PgPool>,
    Json(payload): Json<StartExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    fetch_student(&pool, payload.student_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

    let submission = lifecycle::start(&pool, payload.student_id).await?;

    Ok((StatusCode::CREATED, Json(submission)))
}

#[derive(Debug, Deserialize)]
pub struct QuestionsQuery {
    pub course_name: Option<String>,
}

/// The question list for the exam client, answer keys stripped. Filtered by
/// course (case/whitespace-insensitive) unless the filter is absent or
/// 'all'.
pub async fn list_questions(
    State(pool): State<PgPool>,
    Query(query): Query<QuestionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let questions = fetch_questions(&pool).await?;

    let course = query
        .course_name
        .as_deref()
        .map(normalize)
        .filter(|c| !c.is_empty() && c != "all");

    let public: Vec<PublicQuestion> = match course {
        Some(course) => grading::questions_for_course(&questions, &course)
            .into_iter()
            .map(PublicQuestion::from)
            .collect(),
        None => questions.iter().map(PublicQuestion::from).collect(),
    };

    Ok(Json(public))
}

/// Submits an attempt: grades the raw answer map against the student's
/// course question set and completes the submission atomically.
///
/// Safe under double submission: once completed, the stored result is
/// returned unchanged.
pub async fn submit_exam(
    State(pool): State<PgPool>,
    Path(submission_id): Path<i64>,
    Json(req): Json<SubmitExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let submission = lifecycle::fetch(&pool, submission_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    if submission.is_completed {
        // A racing submit already won; report the stored result.
        return Ok(Json(submission));
    }

    let student = fetch_student(&pool, submission.student_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

    let all_questions = fetch_questions(&pool).await?;

    let course = normalize(student.course.as_deref().unwrap_or(""));
    let participating: Vec<&Question> = if course.is_empty() {
        // Legacy sessions without a recorded course grade against the full
        // bank rather than failing.
        all_questions.iter().collect()
    } else {
        let selected = grading::questions_for_course(&all_questions, &course);
        if selected.is_empty() {
            return Err(AppError::BadRequest(format!(
                "No questions available for course: {course}"
            )));
        }
        selected
    };

    let outcome = grading::grade(participating, &req.answers);

    let settings = Settings::load_or_init(&pool).await?;
    let allowed_secs =
        i64::from(settings.duration_for(student.course.as_deref())) * 60 + SUBMIT_GRACE_SECS;
    let elapsed_secs = (chrono::Utc::now() - submission.start_time).num_seconds();
    if elapsed_secs > allowed_secs {
        tracing::warn!(
            submission_id,
            student_number = %student.student_number,
            elapsed_secs,
            allowed_secs,
            "Submission arrived past the configured exam duration"
        );
    }

    let completed =
        lifecycle::complete(&pool, submission_id, &req.answers, outcome.percentage).await?;

    Ok(Json(completed))
}

/// The result of one attempt.
pub async fn exam_result(
    State(pool): State<PgPool>,
    Path(submission_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let submission = lifecycle::fetch(&pool, submission_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    Ok(Json(submission))
}
