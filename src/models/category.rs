// src/models/category.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::practice::{self, CategoryId};

/// Represents the 'question_categories' table, with the number of questions it holds.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionCategory {
    pub id: CategoryId,

    /// Owning course; `None` for the system-wide bank.
    pub course_id: Option<i64>,

    /// Parent category, 0 for a top-level category.
    pub parent: CategoryId,

    pub name: String,
    pub info: String,
    pub sort_order: i64,
    pub question_count: i64,
}

impl From<&QuestionCategory> for practice::Category {
    fn from(row: &QuestionCategory) -> Self {
        practice::Category {
            id: row.id,
            parent: row.parent,
            name: row.name.clone(),
            question_count: row.question_count,
        }
    }
}

/// DTO for creating a category.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    /// Leave out to create the category in the system-wide bank.
    pub course_id: Option<i64>,
    #[validate(range(min = 0))]
    pub parent: Option<CategoryId>,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub info: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryListParams {
    pub course_id: Option<i64>,
}
