// src/handlers/auth.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::student::{LoginRequest, ROLE_ADMIN, ROLE_STUDENT, Student, UpdateBiodataRequest},
    utils::{
        hash::verify_password,
        jwt::{Claims, sign_jwt},
        normalize::normalize,
    },
};

const STUDENT_COLUMNS: &str = "id, student_number, full_name, class_name, course, role, \
     password, created_by, created_at";

pub(crate) async fn fetch_student(pool: &PgPool, id: i64) -> Result<Option<Student>, AppError> {
    let student = sqlx::query_as::<_, Student>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(student)
}

/// Authenticates by student number.
///
/// Unknown student numbers auto-provision a student account (the exam hall
/// flow: walk in, type your number). Privileged roles are recognized only by
/// the role column; they must additionally pass an Argon2 password check
/// before a token is issued. Without a password the response just flags that
/// one is required.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
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

    let existing = sqlx::query_as::<_, Student>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE student_number = $1"
    ))
    .bind(&student_number)
    .fetch_optional(&pool)
    .await?;

    let student = match existing {
        Some(student) => student,
        None => {
            sqlx::query_as::<_, Student>(&format!(
                "INSERT INTO students (student_number, role) VALUES ($1, $2) \
                 RETURNING {STUDENT_COLUMNS}"
            ))
            .bind(&student_number)
            .bind(ROLE_STUDENT)
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to provision student: {:?}", e);
                AppError::from(e)
            })?
        }
    };

    if student.is_privileged() {
        let Some(password) = payload.password.as_deref() else {
            return Ok(Json(json!({
                "requires_password": true,
                "is_admin": student.role == ROLE_ADMIN,
            })));
        };

        let stored = student.password.as_deref().ok_or_else(|| {
            AppError::AuthError("No password is set for this account".to_string())
        })?;

        if !verify_password(password.trim(), stored)? {
            return Err(AppError::AuthError("Invalid password".to_string()));
        }
    }

    let token = sign_jwt(
        student.id,
        &student.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "student": student,
        "has_biodata": student.has_biodata(),
        "is_admin": student.role == ROLE_ADMIN,
        "requires_password": false,
    })))
}

/// Updates a student's biodata (name, class, selected course).
///
/// Students may only update their own row; admins may update anyone's.
pub async fn update_biodata(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateBiodataRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let caller_id = claims.sub.parse::<i64>().unwrap_or(0);
    if caller_id != id && claims.role != ROLE_ADMIN {
        return Err(AppError::Forbidden(
            "You may only update your own biodata".to_string(),
        ));
    }

    fetch_student(&pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

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

    let updated = fetch_student(&pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

    Ok(Json(updated))
}
