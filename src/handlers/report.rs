// src/handlers/report.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::{FromRow, SqlitePool};

use crate::{
    config::Config,
    error::AppError,
    handlers::{
        bank::load_bank_categories,
        practice::fetch_practice,
        require_manager,
        session::{fetch_session_categories, owned_session},
    },
    models::session::{CategoryReportRow, SessionReportRow},
    practice::{Category, CategoryId, expand_descendants},
    utils::jwt::Claims,
};

/// Every session of a practice with the student's username. Teacher only.
pub async fn practice_report(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(practice_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&claims)?;
    let mut conn = pool.acquire().await?;
    fetch_practice(&mut conn, practice_id).await?;

    let rows = sqlx::query_as::<_, SessionReportRow>(
        r#"
        SELECT
            s.id, s.user_id, u.username, s.behaviour, s.practice_date, s.status,
            s.total_questions, s.total_right, s.marks_obtained, s.total_marks
        FROM practice_sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.practice_id = ?1
        ORDER BY s.practice_date DESC, s.id DESC
        "#,
    )
    .bind(practice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(rows))
}

/// Mark of one attempt together with the category its question lives in.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AttemptMark {
    pub category_id: CategoryId,
    pub max_mark: f64,
    pub fraction: Option<f64>,
}

/// Per-category marks of a session.
///
/// Each selected category collects the attempts whose question sits in it or
/// below it. Only answered attempts count towards marks.
pub(crate) fn category_breakdown(
    categories: &[Category],
    selected: &[CategoryId],
    attempts: &[AttemptMark],
) -> Vec<CategoryReportRow> {
    let names: HashMap<CategoryId, &str> = categories
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();

    selected
        .iter()
        .filter_map(|&category_id| {
            let Some(name) = names.get(&category_id) else {
                tracing::warn!("Category {} is no longer in the bank, left out of the report", category_id);
                return None;
            };
            let scope: HashSet<CategoryId> = expand_descendants(categories, &[category_id])
                .into_iter()
                .collect();

            let mut row = CategoryReportRow {
                category_id,
                category_name: name.to_string(),
                questions: 0,
                marks_obtained: 0.0,
                total_marks: 0.0,
            };
            for attempt in attempts.iter().filter(|a| scope.contains(&a.category_id)) {
                row.questions += 1;
                if let Some(fraction) = attempt.fraction {
                    row.marks_obtained += fraction * attempt.max_mark;
                    row.total_marks += attempt.max_mark;
                }
            }
            Some(row)
        })
        .collect()
}

/// Marks of one session broken down by its categories. Owner or teacher.
///
/// Students wait for the session to finish when feedback is deferred.
pub async fn session_category_report(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let session = owned_session(&mut conn, id, &claims, true).await?;
    if !session.reveals_feedback() && !claims.can_manage() {
        return Err(AppError::Conflict(
            "Marks are available once the session is finished".to_string(),
        ));
    }

    let practice = fetch_practice(&mut conn, session.practice_id).await?;
    let categories: Vec<Category> =
        load_bank_categories(&mut conn, Some(practice.course_id), config.system_context)
            .await?
            .iter()
            .map(Category::from)
            .collect();
    let selected = fetch_session_categories(&mut conn, id).await?;

    let attempts = sqlx::query_as::<_, AttemptMark>(
        r#"
        SELECT q.category_id, a.max_mark, a.fraction
        FROM question_attempts a
        JOIN questions q ON q.id = a.question_id
        WHERE a.session_id = ?1
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(category_breakdown(&categories, &selected, &attempts)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: CategoryId, parent: CategoryId, name: &str) -> Category {
        Category {
            id,
            parent,
            name: name.to_string(),
            question_count: 0,
        }
    }

    fn mark(category_id: CategoryId, max_mark: f64, fraction: Option<f64>) -> AttemptMark {
        AttemptMark {
            category_id,
            max_mark,
            fraction,
        }
    }

    #[test]
    fn test_breakdown_includes_subcategories() {
        let categories = vec![cat(1, 0, "Geography"), cat(2, 1, "Capitals"), cat(3, 0, "History")];
        let attempts = vec![
            mark(1, 1.0, Some(1.0)),
            mark(2, 2.0, Some(0.5)),
            mark(3, 1.0, Some(0.0)),
        ];

        let rows = category_breakdown(&categories, &[1, 3], &attempts);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category_name, "Geography");
        assert_eq!(rows[0].questions, 2);
        assert_eq!(rows[0].marks_obtained, 2.0);
        assert_eq!(rows[0].total_marks, 3.0);
        assert_eq!(rows[1].questions, 1);
        assert_eq!(rows[1].marks_obtained, 0.0);
        assert_eq!(rows[1].total_marks, 1.0);
    }

    #[test]
    fn test_unanswered_attempts_carry_no_marks() {
        let categories = vec![cat(1, 0, "Geography")];
        let rows = category_breakdown(&categories, &[1], &[mark(1, 5.0, None)]);

        assert_eq!(rows[0].questions, 1);
        assert_eq!(rows[0].total_marks, 0.0);
    }

    #[test]
    fn test_missing_category_is_skipped() {
        let categories = vec![cat(1, 0, "Geography")];
        let rows = category_breakdown(&categories, &[1, 42], &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category_id, 1);
    }
}
