// src/models/settings.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, types::Json};

use crate::{error::AppError, utils::normalize::normalize};

/// Singleton configuration record, created lazily on first read.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Settings {
    pub id: i64,

    /// Default exam duration in minutes.
    pub exam_duration: i32,

    pub exam_title: String,
    pub instructions: String,
    pub anti_cheating_note: String,
    pub storage_note: String,

    /// Passing threshold applied by the presentation layer; grading stores
    /// the raw percentage regardless.
    pub passing_score: i32,

    pub available_classes: Json<Vec<String>>,
    pub available_courses: Json<Vec<String>>,
    pub active_courses: Json<Vec<String>>,

    /// Per-course duration overrides in minutes, keyed by course name.
    pub course_durations: Json<HashMap<String, i32>>,

    pub app_logo: Option<String>,
}

const SETTINGS_COLUMNS: &str = "id, exam_duration, exam_title, instructions, anti_cheating_note, \
     storage_note, passing_score, available_classes, available_courses, active_courses, \
     course_durations, app_logo";

impl Settings {
    /// Fetches the singleton row, inserting the defaults on first access.
    pub async fn load_or_init(pool: &PgPool) -> Result<Settings, AppError> {
        let existing = sqlx::query_as::<_, Settings>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM settings ORDER BY id LIMIT 1"
        ))
        .fetch_optional(pool)
        .await?;

        if let Some(settings) = existing {
            return Ok(settings);
        }

        let created = sqlx::query_as::<_, Settings>(&format!(
            "INSERT INTO settings DEFAULT VALUES RETURNING {SETTINGS_COLUMNS}"
        ))
        .fetch_one(pool)
        .await?;

        Ok(created)
    }

    /// Duration in minutes for a course, honoring per-course overrides.
    /// Course names compare case/whitespace-insensitively.
    pub fn duration_for(&self, course: Option<&str>) -> i32 {
        let Some(course) = course else {
            return self.exam_duration;
        };
        let wanted = normalize(course);
        self.course_durations
            .0
            .iter()
            .find(|(name, _)| normalize(name) == wanted)
            .map(|(_, minutes)| *minutes)
            .unwrap_or(self.exam_duration)
    }
}

/// DTO for updating the settings record. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub exam_duration: Option<i32>,
    pub exam_title: Option<String>,
    pub instructions: Option<String>,
    pub anti_cheating_note: Option<String>,
    pub storage_note: Option<String>,
    pub passing_score: Option<i32>,
    pub available_classes: Option<Vec<String>>,
    pub available_courses: Option<Vec<String>>,
    pub active_courses: Option<Vec<String>>,
    pub course_durations: Option<HashMap<String, i32>>,
    pub app_logo: Option<String>,
}
