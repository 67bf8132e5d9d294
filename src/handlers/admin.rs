// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::auth::fetch_student,
    lifecycle,
    models::{
        question::{CreateQuestionRequest, Question, UpdateQuestionRequest},
        settings::{Settings, UpdateSettingsRequest},
        student::{
            AdminCreateStudentRequest, AdminUpdateStudentRequest, ImportStudentRow, ROLE_STUDENT,
            Student,
        },
        submission::{BulkArchiveFilter, PurgeArchiveFilter},
    },
    utils::{hash::hash_password, html::clean_html, jwt::Claims, normalize::normalize},
};

const STUDENT_COLUMNS: &str = "id, student_number, full_name, class_name, course, role, \
     password, created_by, created_at";

const QUESTION_COLUMNS: &str = "id, prompt, kind, options, correct_index, correct_text, points, \
     course_name, created_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    let msg = err.to_string();
    msg.contains("unique constraint") || msg.contains("23505")
}

// ---- Questions ----

/// Lists the full question bank, answer keys included.
/// Admin only.
pub async fn list_questions(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions ORDER BY id"
    ))
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list questions: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(questions))
}

/// Creates a new question after kind-specific answer-key validation.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if let Some(message) = payload.answer_key_error() {
        return Err(AppError::BadRequest(message));
    }

    let question = sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (prompt, kind, options, correct_index, correct_text, points, course_name) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {QUESTION_COLUMNS}"
    ))
    .bind(clean_html(&payload.prompt))
    .bind(payload.kind)
    .bind(SqlJson(payload.options))
    .bind(payload.correct_index)
    .bind(payload.correct_text)
    .bind(payload.points.unwrap_or(crate::grading::DEFAULT_POINTS))
    .bind(payload.course_name)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Updates a question by ID. Edits do not retroactively rescore completed
/// attempts; their stored scores stand.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.kind.is_none()
        && payload.prompt.is_none()
        && payload.options.is_none()
        && payload.correct_index.is_none()
        && payload.correct_text.is_none()
        && payload.points.is_none()
        && payload.course_name.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(kind) = payload.kind {
        separated.push("kind = ");
        separated.push_bind_unseparated(kind);
    }

    if let Some(prompt) = payload.prompt {
        separated.push("prompt = ");
        separated.push_bind_unseparated(clean_html(&prompt));
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(SqlJson(options));
    }

    if let Some(correct_index) = payload.correct_index {
        separated.push("correct_index = ");
        separated.push_bind_unseparated(correct_index);
    }

    if let Some(correct_text) = payload.correct_text {
        separated.push("correct_text = ");
        separated.push_bind_unseparated(correct_text);
    }

    if let Some(points) = payload.points {
        separated.push("points = ");
        separated.push_bind_unseparated(points);
    }

    if let Some(course_name) = payload.course_name {
        separated.push("course_name = ");
        separated.push_bind_unseparated(course_name);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
/// Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---- Students ----

/// Lists all student accounts.
/// Admin only.
pub async fn list_students(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let students = sqlx::query_as::<_, Student>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students ORDER BY student_number"
    ))
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list students: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(students))
}

/// Creates a student account with an explicit role; privileged roles get a
/// hashed password.
/// Admin only.
pub async fn create_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AdminCreateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let student_number = normalize(&payload.student_number);
    if student_number.is_empty() {
        return Err(AppError::BadRequest(
            "Student number is required".to_string(),
        ));
    }

    let role = payload.role.unwrap_or_else(|| ROLE_STUDENT.to_string());
    let password_hash = match payload.password.as_deref() {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };
    let created_by = claims.sub.parse::<i64>().ok();

    let student = sqlx::query_as::<_, Student>(&format!(
        "INSERT INTO students (student_number, full_name, class_name, course, role, password, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {STUDENT_COLUMNS}"
    ))
    .bind(&student_number)
    .bind(payload.full_name)
    .bind(payload.class_name)
    .bind(payload.course)
    .bind(role)
    .bind(password_hash)
    .bind(created_by)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Student number '{student_number}' already exists"))
        } else {
            tracing::error!("Failed to create student: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(student)))
}

/// Bulk-imports student rows (e.g. from a parsed roster). Rows without a
/// student number are skipped; existing numbers are left untouched.
/// Admin only.
pub async fn import_students(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(rows): Json<Vec<ImportStudentRow>>,
) -> Result<impl IntoResponse, AppError> {
    let created_by = claims.sub.parse::<i64>().ok();
    let mut imported: u64 = 0;
    let mut skipped: u64 = 0;

    for row in rows {
        let student_number = row
            .student_number
            .as_deref()
            .map(normalize)
            .unwrap_or_default();
        if student_number.is_empty() {
            skipped += 1;
            continue;
        }

        let role = row.role.unwrap_or_else(|| ROLE_STUDENT.to_string());
        let password_hash = match row.password.as_deref() {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };

        let result = sqlx::query(
            "INSERT INTO students (student_number, full_name, class_name, role, password, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (student_number) DO NOTHING",
        )
        .bind(&student_number)
        .bind(row.full_name)
        .bind(row.class_name)
        .bind(role)
        .bind(password_hash)
        .bind(created_by)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to import student {}: {:?}", student_number, e);
            AppError::from(e)
        })?;

        if result.rows_affected() == 0 {
            skipped += 1;
        } else {
            imported += 1;
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "imported": imported, "skipped": skipped })),
    ))
}

/// Updates a student account. Fields are optional; a provided password is
/// re-hashed.
/// Admin only.
pub async fn update_student(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    fetch_student(&pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

    if let Some(student_number) = payload.student_number {
        let student_number = normalize(&student_number);
        sqlx::query("UPDATE students SET student_number = $1 WHERE id = $2")
            .bind(student_number)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("Student number already exists".to_string())
                } else {
                    AppError::from(e)
                }
            })?;
    }

    if let Some(full_name) = payload.full_name {
        sqlx::query("UPDATE students SET full_name = $1 WHERE id = $2")
            .bind(full_name)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(class_name) = payload.class_name {
        sqlx::query("UPDATE students SET class_name = $1 WHERE id = $2")
            .bind(class_name)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(course) = payload.course {
        sqlx::query("UPDATE students SET course = $1 WHERE id = $2")
            .bind(course)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(role) = payload.role {
        sqlx::query("UPDATE students SET role = $1 WHERE id = $2")
            .bind(role)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(password) = payload.password {
        let hashed = hash_password(&password)?;
        sqlx::query("UPDATE students SET password = $1 WHERE id = $2")
            .bind(hashed)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a student account by ID (their submissions cascade).
/// Admin only. Prevents deleting self.
pub async fn delete_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let current_user_id = claims.sub.parse::<i64>().unwrap_or(0);
    if id == current_user_id {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete student: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---- Submissions ----

/// Active (non-archived) submissions with their students.
/// Admin only.
pub async fn list_submissions(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(lifecycle::list_active(&pool).await?))
}

/// Archived submissions with their students.
/// Admin only.
pub async fn list_archived_submissions(
    State(pool): State<PgPool>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(lifecycle::list_archived(&pool).await?))
}

/// One submission with its student and the questions that graded it (the
/// student's course set).
/// Admin only.
pub async fn submission_details(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let submission = lifecycle::fetch(&pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    let student = fetch_student(&pool, submission.student_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

    let all_questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions ORDER BY id"
    ))
    .fetch_all(&pool)
    .await?;

    let course = normalize(student.course.as_deref().unwrap_or(""));
    let questions: Vec<Question> = if course.is_empty() {
        Vec::new()
    } else {
        crate::grading::questions_for_course(&all_questions, &course)
            .into_iter()
            .cloned()
            .collect()
    };

    Ok(Json(serde_json::json!({
        "submission": submission,
        "student": student,
        "questions": questions,
    })))
}

/// Archives one submission ("allow retake"): the attempt is kept as history
/// and the student may start again.
/// Admin only.
pub async fn archive_submission(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    lifecycle::archive(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Archives all non-archived submissions matching the filter (class, course,
/// score range; AND semantics).
/// Admin only.
pub async fn bulk_archive_submissions(
    State(pool): State<PgPool>,
    Json(filter): Json<BulkArchiveFilter>,
) -> Result<impl IntoResponse, AppError> {
    let archived = lifecycle::bulk_archive(&pool, &filter).await?;
    tracing::info!(archived, "Bulk archive completed");
    Ok(StatusCode::NO_CONTENT)
}

/// Permanently deletes one archived submission.
/// Admin only.
pub async fn purge_archived_submission(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    lifecycle::purge_archived_one(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Permanently deletes archived submissions, optionally scoped to one class.
/// Admin only.
pub async fn clear_archive(
    State(pool): State<PgPool>,
    Json(filter): Json<PurgeArchiveFilter>,
) -> Result<impl IntoResponse, AppError> {
    let purged = lifecycle::purge_archived(&pool, filter.class_name.as_deref()).await?;
    tracing::info!(purged, "Archive cleared");
    Ok(StatusCode::NO_CONTENT)
}

// ---- Settings ----

/// The settings record. Exposed read-only to exam clients as well, which
/// need the duration, notes and passing threshold.
pub async fn get_settings(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(Settings::load_or_init(&pool).await?))
}

/// Updates the settings record. Fields are optional.
/// Admin only.
pub async fn update_settings(
    State(pool): State<PgPool>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Ensure the singleton row exists before patching it.
    let current = Settings::load_or_init(&pool).await?;

    if payload.exam_duration.is_none()
        && payload.exam_title.is_none()
        && payload.instructions.is_none()
        && payload.anti_cheating_note.is_none()
        && payload.storage_note.is_none()
        && payload.passing_score.is_none()
        && payload.available_classes.is_none()
        && payload.available_courses.is_none()
        && payload.active_courses.is_none()
        && payload.course_durations.is_none()
        && payload.app_logo.is_none()
    {
        return Ok(Json(current));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE settings SET ");
    let mut separated = builder.separated(", ");

    if let Some(exam_duration) = payload.exam_duration {
        separated.push("exam_duration = ");
        separated.push_bind_unseparated(exam_duration);
    }

    if let Some(exam_title) = payload.exam_title {
        separated.push("exam_title = ");
        separated.push_bind_unseparated(exam_title);
    }

    if let Some(instructions) = payload.instructions {
        separated.push("instructions = ");
        separated.push_bind_unseparated(clean_html(&instructions));
    }

    if let Some(anti_cheating_note) = payload.anti_cheating_note {
        separated.push("anti_cheating_note = ");
        separated.push_bind_unseparated(clean_html(&anti_cheating_note));
    }

    if let Some(storage_note) = payload.storage_note {
        separated.push("storage_note = ");
        separated.push_bind_unseparated(clean_html(&storage_note));
    }

    if let Some(passing_score) = payload.passing_score {
        separated.push("passing_score = ");
        separated.push_bind_unseparated(passing_score);
    }

    if let Some(available_classes) = payload.available_classes {
        separated.push("available_classes = ");
        separated.push_bind_unseparated(SqlJson(available_classes));
    }

    if let Some(available_courses) = payload.available_courses {
        separated.push("available_courses = ");
        separated.push_bind_unseparated(SqlJson(available_courses));
    }

    if let Some(active_courses) = payload.active_courses {
        separated.push("active_courses = ");
        separated.push_bind_unseparated(SqlJson(active_courses));
    }

    if let Some(course_durations) = payload.course_durations {
        separated.push("course_durations = ");
        separated.push_bind_unseparated(SqlJson(course_durations));
    }

    if let Some(app_logo) = payload.app_logo {
        separated.push("app_logo = ");
        separated.push_bind_unseparated(app_logo);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(current.id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update settings: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(Settings::load_or_init(&pool).await?))
}
