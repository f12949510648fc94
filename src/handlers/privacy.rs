// src/handlers/privacy.rs

use std::collections::BTreeMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{
        practice::fetch_practice,
        session::{SESSION_COLUMNS, fetch_attempts, fetch_session_categories},
    },
    models::{
        session::{Session, SessionDetail},
        user::User,
    },
    utils::jwt::Claims,
};

/// Everything stored about one user's practice.
#[derive(Debug, Serialize)]
pub struct PracticeExport {
    pub practice_id: i64,
    pub practice_name: String,
    pub sessions: Vec<SessionDetail>,
}

#[derive(Debug, Serialize)]
pub struct DataExport {
    pub user: User,
    pub practices: Vec<PracticeExport>,
}

/// Exports every session of the caller, grouped by practice.
pub async fn export_my_data(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password, role, created_at FROM users WHERE id = ?1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    let sql = format!(
        "SELECT {} FROM practice_sessions WHERE user_id = ?1 ORDER BY practice_id, id",
        SESSION_COLUMNS
    );
    let sessions = sqlx::query_as::<_, Session>(&sql)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut grouped: BTreeMap<i64, PracticeExport> = BTreeMap::new();
    for session in sessions {
        let practice_id = session.practice_id;
        if !grouped.contains_key(&practice_id) {
            let practice = fetch_practice(&mut conn, practice_id).await?;
            grouped.insert(
                practice_id,
                PracticeExport {
                    practice_id,
                    practice_name: practice.name,
                    sessions: Vec::new(),
                },
            );
        }

        let categories = fetch_session_categories(&mut conn, session.id).await?;
        let attempts = fetch_attempts(&mut conn, session.id, session.reveals_feedback()).await?;
        if let Some(export) = grouped.get_mut(&practice_id) {
            export.sessions.push(SessionDetail {
                session: session.for_viewer(false),
                categories,
                attempts,
            });
        }
    }

    tracing::info!("User {} exported practice data ({} practices)", user_id, grouped.len());

    Ok(Json(DataExport {
        user,
        practices: grouped.into_values().collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EraseParams {
    pub practice_id: Option<i64>,
}

/// Deletes the caller's sessions, optionally within one practice only.
pub async fn erase_my_data(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<EraseParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let result = sqlx::query(
        "DELETE FROM practice_sessions WHERE user_id = ?1 AND (?2 IS NULL OR practice_id = ?2)",
    )
    .bind(user_id)
    .bind(params.practice_id)
    .execute(&pool)
    .await?;

    tracing::info!(
        "User {} erased {} sessions (practice filter: {:?})",
        user_id,
        result.rows_affected(),
        params.practice_id
    );

    Ok(Json(json!({ "deleted": result.rows_affected() })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct EraseUsersRequest {
    #[validate(length(min = 1, message = "At least one user id is required"))]
    pub user_ids: Vec<i64>,
}

/// Deletes the sessions of the listed users within one practice.
/// Admin only.
pub async fn erase_practice_users(
    State(pool): State<SqlitePool>,
    Path(practice_id): Path<i64>,
    Json(payload): Json<EraseUsersRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut conn = pool.acquire().await?;
    fetch_practice(&mut conn, practice_id).await?;

    let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM practice_sessions WHERE practice_id = ");
    query.push_bind(practice_id);
    query.push(" AND user_id IN (");
    let mut ids = query.separated(", ");
    for user_id in &payload.user_ids {
        ids.push_bind(*user_id);
    }
    ids.push_unseparated(")");

    let result = query.build().execute(&mut *conn).await?;

    tracing::info!(
        "Erased {} sessions of {} users in practice {}",
        result.rows_affected(),
        payload.user_ids.len(),
        practice_id
    );

    Ok(Json(json!({ "deleted": result.rows_affected() })))
}
