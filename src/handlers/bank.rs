// src/handlers/bank.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        category::{CategoryListParams, CreateCategoryRequest, QuestionCategory},
        question::{CreateQuestionRequest, Question, UpdateQuestionRequest},
    },
    practice::{Category, CategoryId, QuestionId, QuestionPool, TOP_CATEGORY},
    utils::html::{clean_html, plain_text},
};

/// Categories visible to a course: its own bank, plus the system bank when enabled.
/// `course_id = None` lists the system bank alone.
pub(crate) async fn load_bank_categories(
    conn: &mut SqliteConnection,
    course_id: Option<i64>,
    include_system: bool,
) -> Result<Vec<QuestionCategory>, AppError> {
    let include_system = include_system || course_id.is_none();
    let rows = sqlx::query_as::<_, QuestionCategory>(
        r#"
        SELECT
            c.id, c.course_id, c.parent, c.name, c.info, c.sort_order,
            (SELECT COUNT(*) FROM questions q WHERE q.category_id = c.id) AS question_count
        FROM question_categories c
        WHERE c.course_id = ?1 OR (?2 AND c.course_id IS NULL)
        ORDER BY c.sort_order, c.id
        "#,
    )
    .bind(course_id)
    .bind(include_system)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Snapshot of the bank a course's sessions draw questions from.
pub(crate) async fn load_question_pool(
    conn: &mut SqliteConnection,
    course_id: i64,
    include_system: bool,
) -> Result<QuestionPool, AppError> {
    let categories: Vec<Category> = load_bank_categories(&mut *conn, Some(course_id), include_system)
        .await?
        .iter()
        .map(Category::from)
        .collect();

    let questions: Vec<(QuestionId, CategoryId)> = sqlx::query_as(
        r#"
        SELECT q.id, q.category_id
        FROM questions q
        JOIN question_categories c ON c.id = q.category_id
        WHERE c.course_id = ?1 OR (?2 AND c.course_id IS NULL)
        ORDER BY q.id
        "#,
    )
    .bind(course_id)
    .bind(include_system)
    .fetch_all(&mut *conn)
    .await?;

    Ok(QuestionPool::new(categories, questions))
}

/// Lists categories of a course bank (or the system bank without `course_id`).
pub async fn list_categories(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Query(params): Query<CategoryListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let categories = load_bank_categories(&mut conn, params.course_id, config.system_context).await?;
    Ok(Json(categories))
}

/// Creates a category. The parent must be top level or live in the same bank.
pub async fn create_category(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let name = plain_text(&payload.name);
    if name.is_empty() {
        return Err(AppError::BadRequest("Category name cannot be empty".to_string()));
    }

    let parent = payload.parent.unwrap_or(TOP_CATEGORY);
    if parent != TOP_CATEGORY {
        let same_bank: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM question_categories WHERE id = ?1 AND course_id IS ?2",
        )
        .bind(parent)
        .bind(payload.course_id)
        .fetch_optional(&pool)
        .await?;
        if same_bank.is_none() {
            return Err(AppError::BadRequest(format!(
                "Parent category {} does not exist in this bank",
                parent
            )));
        }
    }

    let result = sqlx::query(
        r#"
        INSERT INTO question_categories (course_id, parent, name, info, sort_order)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(payload.course_id)
    .bind(parent)
    .bind(name)
    .bind(payload.info.as_deref().map(clean_html).unwrap_or_default())
    .bind(payload.sort_order.unwrap_or(0))
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create category: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": result.last_insert_rowid()})),
    ))
}

/// Deletes an empty category (no questions, no subcategories).
pub async fn delete_category(
    State(pool): State<SqlitePool>,
    Path(id): Path<CategoryId>,
) -> Result<impl IntoResponse, AppError> {
    let (questions, children): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM questions WHERE category_id = ?1),
            (SELECT COUNT(*) FROM question_categories WHERE parent = ?1)
        "#,
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    if questions > 0 || children > 0 {
        return Err(AppError::Conflict(
            "Category still holds questions or subcategories".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM question_categories WHERE id = ?1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Category not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_category_exists(pool: &SqlitePool, id: CategoryId) -> Result<(), AppError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM question_categories WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(|_| ())
        .ok_or(AppError::BadRequest(format!("Category {} does not exist", id)))
}

/// Creates a question in a category.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_category_exists(&pool, payload.category_id).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO questions (category_id, name, question_text, answer, default_mark, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(payload.category_id)
    .bind(plain_text(&payload.name))
    .bind(clean_html(&payload.question_text))
    .bind(payload.answer.trim())
    .bind(payload.default_mark.unwrap_or(1.0))
    .bind(Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": result.last_insert_rowid()})),
    ))
}

/// Updates a question. Attempts already made keep the mark they were served with.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<QuestionId>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let current = sqlx::query_as::<_, Question>(
        "SELECT id, category_id, name, question_text, answer, default_mark, created_at FROM questions WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    if let Some(category_id) = payload.category_id {
        ensure_category_exists(&pool, category_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE questions
        SET category_id = ?1, name = ?2, question_text = ?3, answer = ?4, default_mark = ?5
        WHERE id = ?6
        "#,
    )
    .bind(payload.category_id.unwrap_or(current.category_id))
    .bind(payload.name.as_deref().map(plain_text).unwrap_or(current.name))
    .bind(payload.question_text.as_deref().map(clean_html).unwrap_or(current.question_text))
    .bind(payload.answer.as_deref().map(str::trim).unwrap_or(&current.answer))
    .bind(payload.default_mark.unwrap_or(current.default_mark))
    .bind(id)
    .execute(&pool)
    .await?;

    Ok(StatusCode::OK)
}

/// Deletes a question that no session has used yet.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<QuestionId>,
) -> Result<impl IntoResponse, AppError> {
    let attempts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM question_attempts WHERE question_id = ?1")
            .bind(id)
            .fetch_one(&pool)
            .await?;

    if attempts > 0 {
        return Err(AppError::Conflict(
            "Question has been used in practice sessions".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM questions WHERE id = ?1")
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
