// src/handlers/practice.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    handlers::{bank::load_bank_categories, require_manager},
    models::practice::{
        CreatePracticeRequest, Practice, PracticeListParams, PracticeResponse,
        UpdatePracticeRequest,
    },
    practice::{Behaviour, Category, CategoryId, CategoryNode, TOP_CATEGORY, build_category_tree},
    utils::{
        html::{clean_html, plain_text},
        jwt::Claims,
    },
};

pub(crate) async fn fetch_practice(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Practice, AppError> {
    sqlx::query_as::<_, Practice>(
        "SELECT id, course_id, name, intro, behaviours, created_at, updated_at FROM practices WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Practice not found".to_string()))
}

/// Categories a practice offers, in bank order.
pub(crate) async fn fetch_practice_categories(
    conn: &mut SqliteConnection,
    practice_id: i64,
) -> Result<Vec<CategoryId>, AppError> {
    let ids: Vec<CategoryId> = sqlx::query_scalar(
        r#"
        SELECT pc.category_id
        FROM practice_categories pc
        JOIN question_categories c ON c.id = pc.category_id
        WHERE pc.practice_id = ?1
        ORDER BY c.sort_order, c.id
        "#,
    )
    .bind(practice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}

/// Validated and de-duplicated practice settings, ready to store.
struct PracticeSettings {
    name: String,
    intro: String,
    behaviours: Vec<Behaviour>,
    categories: Vec<CategoryId>,
}

async fn check_settings(
    conn: &mut SqliteConnection,
    config: &Config,
    course_id: i64,
    name: &str,
    intro: Option<&str>,
    behaviours: &[Behaviour],
    categories: &[CategoryId],
) -> Result<PracticeSettings, AppError> {
    let name = plain_text(name);
    if name.is_empty() {
        return Err(AppError::BadRequest("Practice name cannot be empty".to_string()));
    }

    let mut seen = HashSet::new();
    let behaviours: Vec<Behaviour> = behaviours.iter().copied().filter(|b| seen.insert(*b)).collect();

    let visible: HashSet<CategoryId> = load_bank_categories(&mut *conn, Some(course_id), config.system_context)
        .await?
        .iter()
        .map(|c| c.id)
        .collect();

    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(categories.len());
    for id in categories {
        if !visible.contains(id) {
            return Err(AppError::BadRequest(format!(
                "Category {} is not available in course {}",
                id, course_id
            )));
        }
        if seen.insert(*id) {
            selected.push(*id);
        }
    }

    Ok(PracticeSettings {
        name,
        intro: intro.map(clean_html).unwrap_or_default(),
        behaviours,
        categories: selected,
    })
}

async fn replace_categories(
    conn: &mut SqliteConnection,
    practice_id: i64,
    categories: &[CategoryId],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM practice_categories WHERE practice_id = ?1")
        .bind(practice_id)
        .execute(&mut *conn)
        .await?;

    for category_id in categories {
        sqlx::query("INSERT INTO practice_categories (practice_id, category_id) VALUES (?1, ?2)")
            .bind(practice_id)
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Lists the practices of a course.
pub async fn list_practices(
    State(pool): State<SqlitePool>,
    Query(params): Query<PracticeListParams>,
) -> Result<impl IntoResponse, AppError> {
    let practices = sqlx::query_as::<_, Practice>(
        r#"
        SELECT id, course_id, name, intro, behaviours, created_at, updated_at
        FROM practices
        WHERE course_id = ?1
        ORDER BY id
        "#,
    )
    .bind(params.course_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(practices))
}

/// Creates a practice.
/// Teacher only.
pub async fn create_practice(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePracticeRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&claims)?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let settings = check_settings(
        &mut tx,
        &config,
        payload.course_id,
        &payload.name,
        payload.intro.as_deref(),
        &payload.behaviours,
        &payload.categories,
    )
    .await?;

    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO practices (course_id, name, intro, behaviours, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(payload.course_id)
    .bind(&settings.name)
    .bind(&settings.intro)
    .bind(SqlJson(&settings.behaviours))
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create practice: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .last_insert_rowid();

    replace_categories(&mut tx, id, &settings.categories).await?;
    tx.commit().await?;

    tracing::info!(
        "Practice {} created in course {} with {} categories",
        id,
        payload.course_id,
        settings.categories.len()
    );

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Returns a practice with the categories it offers.
pub async fn get_practice(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let practice = fetch_practice(&mut conn, id).await?;
    let categories = fetch_practice_categories(&mut conn, id).await?;

    Ok(Json(PracticeResponse {
        practice,
        categories,
    }))
}

/// Replaces a practice's settings. Sessions already started keep their categories.
/// Teacher only.
pub async fn update_practice(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePracticeRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&claims)?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let practice = fetch_practice(&mut tx, id).await?;
    let settings = check_settings(
        &mut tx,
        &config,
        practice.course_id,
        &payload.name,
        payload.intro.as_deref(),
        &payload.behaviours,
        &payload.categories,
    )
    .await?;

    sqlx::query(
        "UPDATE practices SET name = ?1, intro = ?2, behaviours = ?3, updated_at = ?4 WHERE id = ?5",
    )
    .bind(&settings.name)
    .bind(&settings.intro)
    .bind(SqlJson(&settings.behaviours))
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    replace_categories(&mut tx, id, &settings.categories).await?;
    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// Deletes a practice and every session in it.
/// Teacher only.
pub async fn delete_practice(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&claims)?;

    let result = sqlx::query("DELETE FROM practices WHERE id = ?1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Practice not found".to_string()));
    }

    tracing::info!("Practice {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn category_tree(
    conn: &mut SqliteConnection,
    config: &Config,
    practice_id: i64,
    prune: bool,
) -> Result<Vec<CategoryNode>, AppError> {
    let practice = fetch_practice(&mut *conn, practice_id).await?;
    let offered: HashSet<CategoryId> = fetch_practice_categories(&mut *conn, practice_id)
        .await?
        .into_iter()
        .collect();

    let categories: Vec<Category> = load_bank_categories(&mut *conn, Some(practice.course_id), config.system_context)
        .await?
        .iter()
        .map(Category::from)
        .collect();

    let mut tree = build_category_tree(&categories, TOP_CATEGORY, &offered);
    if prune {
        tree.prune_unchecked();
    }
    Ok(tree.into_roots())
}

/// Category tree of the practice's course with the offered categories checked.
/// Used by the practice settings form. Teacher only.
pub async fn settings_categories(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&claims)?;
    let mut conn = pool.acquire().await?;
    Ok(Json(category_tree(&mut conn, &config, id, false).await?))
}

/// Only the offered categories (and the branches leading to them), for a
/// student choosing what to practise.
pub async fn offered_categories(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    Ok(Json(category_tree(&mut conn, &config, id, true).await?))
}
