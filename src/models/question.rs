// src/models/question.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::practice::{CategoryId, QuestionId};

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub category_id: CategoryId,
    pub name: String,

    /// Sanitised HTML shown to the student.
    pub question_text: String,

    /// Expected response; compared after trimming whitespace.
    pub answer: String,

    /// Mark a fully correct response earns.
    pub default_mark: f64,

    pub created_at: DateTime<Utc>,
}

/// DTO for sending a question to a student (excludes the answer).
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub category_id: CategoryId,
    pub name: String,
    pub question_text: String,
    pub default_mark: f64,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            category_id: q.category_id,
            name: q.name,
            question_text: q.question_text,
            default_mark: q.default_mark,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub category_id: CategoryId,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 10000))]
    pub question_text: String,
    #[validate(length(min = 1, max = 500))]
    pub answer: String,
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub default_mark: Option<f64>,
}

/// DTO for updating a question. Fields left out keep their value.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    pub category_id: Option<CategoryId>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 10000))]
    pub question_text: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub answer: Option<String>,
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub default_mark: Option<f64>,
}
