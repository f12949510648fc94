// src/models/practice.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::practice::{Behaviour, CategoryId};

/// Represents the 'practices' table: one practice activity inside a course.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Practice {
    pub id: i64,
    pub course_id: i64,
    pub name: String,

    /// Sanitised HTML introduction.
    pub intro: String,

    /// Behaviours a student may pick from when starting a session.
    /// Stored as a JSON array.
    pub behaviours: Json<Vec<Behaviour>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A practice together with the categories it offers.
#[derive(Debug, Serialize)]
pub struct PracticeResponse {
    #[serde(flatten)]
    pub practice: Practice,
    pub categories: Vec<CategoryId>,
}

/// DTO for creating a practice.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePracticeRequest {
    pub course_id: i64,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters."))]
    pub name: String,
    #[validate(length(max = 20000))]
    pub intro: Option<String>,
    #[validate(length(min = 1, message = "You must select at least one behaviour"))]
    pub behaviours: Vec<Behaviour>,
    #[validate(length(min = 1, message = "At least one category must be selected"))]
    pub categories: Vec<CategoryId>,
}

/// DTO for replacing a practice's settings. The course cannot change.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePracticeRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters."))]
    pub name: String,
    #[validate(length(max = 20000))]
    pub intro: Option<String>,
    #[validate(length(min = 1, message = "You must select at least one behaviour"))]
    pub behaviours: Vec<Behaviour>,
    #[validate(length(min = 1, message = "At least one category must be selected"))]
    pub categories: Vec<CategoryId>,
}

#[derive(Debug, Deserialize)]
pub struct PracticeListParams {
    pub course_id: i64,
}
