// src/models/student.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Account roles. Stored as plain text and checked by value; admin access is
/// never inferred from the student number itself.
pub const ROLE_STUDENT: &str = "student";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_PROCTOR: &str = "proctor";

/// Represents the 'students' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,

    /// External login key, stored normalized (trimmed, lowercased).
    pub student_number: String,

    pub full_name: Option<String>,
    pub class_name: Option<String>,

    /// The course selected by the student during biodata entry. Grading
    /// filters the question bank by this value.
    pub course: Option<String>,

    /// 'student', 'admin' or 'proctor'.
    pub role: String,

    /// Argon2 password hash, set for privileged roles only.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: Option<String>,

    pub created_by: Option<i64>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Student {
    /// Biodata is complete once name and class are filled in.
    pub fn has_biodata(&self) -> bool {
        self.full_name.is_some() && self.class_name.is_some()
    }

    /// Privileged roles must pass a password check before a token is issued.
    pub fn is_privileged(&self) -> bool {
        self.role == ROLE_ADMIN || self.role == ROLE_PROCTOR
    }
}

/// DTO for the login request. The password is only consulted for privileged
/// accounts.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub student_number: String,
    #[validate(length(max = 128))]
    pub password: Option<String>,
}

/// DTO for the biodata form (name, class, selected course).
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBiodataRequest {
    #[validate(length(min = 1, max = 100))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub class_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub course: Option<String>,
}

/// DTO for an admin creating a user directly (can specify role and password).
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateStudentRequest {
    #[validate(length(min = 1, max = 50))]
    pub student_number: String,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
    #[validate(length(max = 100))]
    pub class_name: Option<String>,
    #[validate(length(max = 100))]
    pub course: Option<String>,
    pub role: Option<String>,
    #[validate(length(min = 4, max = 128))]
    pub password: Option<String>,
}

/// DTO for an admin updating a user. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateStudentRequest {
    pub student_number: Option<String>,
    pub full_name: Option<String>,
    pub class_name: Option<String>,
    pub course: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

/// One row of a bulk user import. Entries without a student number are
/// skipped rather than failing the whole batch.
#[derive(Debug, Deserialize)]
pub struct ImportStudentRow {
    pub student_number: Option<String>,
    pub full_name: Option<String>,
    pub class_name: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}
