// src/handlers/session.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    handlers::{
        bank::load_question_pool,
        practice::{fetch_practice, fetch_practice_categories},
    },
    models::{
        attempt::{
            AnswerRequest, AnswerResponse, AttemptSummary, AttemptWithQuestion,
            NextQuestionResponse, QuestionAttempt,
        },
        question::Question,
        session::{
            LatestSessionResponse, STATUS_FINISHED, STATUS_IN_PROGRESS, Session, SessionDetail,
            StartSessionRequest,
        },
    },
    practice::{CategoryId, QuestionId, Selection, grade_response, select_next_question},
    utils::jwt::Claims,
};

pub const NO_MORE_QUESTIONS: &str = "Sorry, no more questions to display. Try a different category";

pub(crate) const SESSION_COLUMNS: &str = "id, practice_id, user_id, behaviour, practice_date, status, \
     total_questions, total_right, marks_obtained, total_marks";

/// Loads a session the caller may act on.
///
/// Owners always pass; teachers pass only when `allow_manager` is set.
pub(crate) async fn owned_session(
    conn: &mut SqliteConnection,
    id: i64,
    claims: &Claims,
    allow_manager: bool,
) -> Result<Session, AppError> {
    let sql = format!("SELECT {} FROM practice_sessions WHERE id = ?1", SESSION_COLUMNS);
    let session = sqlx::query_as::<_, Session>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Session not found".to_string()))?;

    if session.user_id == claims.user_id()? || (allow_manager && claims.can_manage()) {
        Ok(session)
    } else {
        Err(AppError::Forbidden("This is not your session".to_string()))
    }
}

pub(crate) async fn fetch_session_categories(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> Result<Vec<CategoryId>, AppError> {
    let ids: Vec<CategoryId> = sqlx::query_scalar(
        "SELECT category_id FROM session_categories WHERE session_id = ?1 ORDER BY category_id",
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

pub(crate) async fn fetch_attempts(
    conn: &mut SqliteConnection,
    session_id: i64,
    reveal: bool,
) -> Result<Vec<AttemptSummary>, AppError> {
    let rows = sqlx::query_as::<_, AttemptWithQuestion>(
        r#"
        SELECT a.slot, a.question_id, q.name AS question_name, a.max_mark,
               a.fraction, a.response, a.correct
        FROM question_attempts a
        JOIN questions q ON q.id = a.question_id
        WHERE a.session_id = ?1
        ORDER BY a.slot
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AttemptSummary::from_row(row, reveal))
        .collect())
}

/// Recomputes the session counters from its attempts.
async fn refresh_totals(conn: &mut SqliteConnection, session_id: i64) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE practice_sessions SET
            total_right = (SELECT COUNT(*) FROM question_attempts
                           WHERE session_id = ?1 AND correct = 1),
            marks_obtained = (SELECT COALESCE(SUM(fraction * max_mark), 0) FROM question_attempts
                              WHERE session_id = ?1 AND fraction IS NOT NULL),
            total_marks = (SELECT COALESCE(SUM(max_mark), 0) FROM question_attempts
                           WHERE session_id = ?1 AND fraction IS NOT NULL)
        WHERE id = ?1
        "#,
    )
    .bind(session_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Starts a session over some of the categories the practice offers.
///
/// * Rejects behaviours the practice has not enabled.
/// * Rejects categories the practice does not offer.
pub async fn start_session(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(practice_id): Path<i64>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let practice = fetch_practice(&mut tx, practice_id).await?;

    if !practice.behaviours.0.contains(&payload.behaviour) {
        return Err(AppError::BadRequest(format!(
            "Behaviour '{}' is not enabled for this practice",
            payload.behaviour
        )));
    }

    let offered: HashSet<CategoryId> = fetch_practice_categories(&mut tx, practice_id)
        .await?
        .into_iter()
        .collect();

    let mut seen = HashSet::new();
    let mut categories = Vec::with_capacity(payload.categories.len());
    for id in &payload.categories {
        if !offered.contains(id) {
            return Err(AppError::BadRequest(format!(
                "Category {} is not offered by this practice",
                id
            )));
        }
        if seen.insert(*id) {
            categories.push(*id);
        }
    }

    let sql = format!(
        r#"
        INSERT INTO practice_sessions (practice_id, user_id, behaviour, practice_date, status)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING {}
        "#,
        SESSION_COLUMNS
    );
    let session = sqlx::query_as::<_, Session>(&sql)
        .bind(practice_id)
        .bind(user_id)
        .bind(payload.behaviour.as_str())
        .bind(Utc::now())
        .bind(STATUS_IN_PROGRESS)
        .fetch_one(&mut *tx)
        .await?;

    for category_id in &categories {
        sqlx::query("INSERT INTO session_categories (session_id, category_id) VALUES (?1, ?2)")
            .bind(session.id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    tracing::info!(
        "Session {} started by user {} in practice {} ({}, categories {:?})",
        session.id,
        user_id,
        practice_id,
        session.behaviour,
        categories
    );

    categories.sort_unstable();
    Ok((
        StatusCode::CREATED,
        Json(SessionDetail {
            session: session.for_viewer(claims.can_manage()),
            categories,
            attempts: Vec::new(),
        }),
    ))
}

async fn my_sessions(
    pool: &SqlitePool,
    practice_id: i64,
    user_id: i64,
    limit: i64,
) -> Result<Vec<Session>, AppError> {
    let sql = format!(
        "SELECT {} FROM practice_sessions WHERE practice_id = ?1 AND user_id = ?2 ORDER BY id DESC LIMIT ?3",
        SESSION_COLUMNS
    );
    let sessions = sqlx::query_as::<_, Session>(&sql)
        .bind(practice_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(sessions)
}

/// The caller's sessions in a practice, newest first.
pub async fn list_my_sessions(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(practice_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    fetch_practice(&mut conn, practice_id).await?;
    drop(conn);

    let manager = claims.can_manage();
    let sessions: Vec<Session> = my_sessions(&pool, practice_id, claims.user_id()?, -1)
        .await?
        .into_iter()
        .map(|session| session.for_viewer(manager))
        .collect();
    Ok(Json(sessions))
}

/// The caller's most recent session in a practice and whether it can be continued.
pub async fn latest_session(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(practice_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    fetch_practice(&mut conn, practice_id).await?;
    drop(conn);

    let session = my_sessions(&pool, practice_id, claims.user_id()?, 1)
        .await?
        .into_iter()
        .next();
    let can_continue = session.as_ref().is_some_and(Session::is_in_progress);
    let session = session.map(|s| s.for_viewer(claims.can_manage()));

    Ok(Json(LatestSessionResponse {
        session,
        can_continue,
    }))
}

/// A session with its categories and attempts.
/// Grades stay hidden from the student while deferred feedback is pending.
pub async fn get_session(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let session = owned_session(&mut conn, id, &claims, true).await?;
    let reveal = session.reveals_feedback() || claims.can_manage();
    let categories = fetch_session_categories(&mut conn, id).await?;
    let attempts = fetch_attempts(&mut conn, id, reveal).await?;

    Ok(Json(SessionDetail {
        session: session.for_viewer(claims.can_manage()),
        categories,
        attempts,
    }))
}

/// Deletes a session and its attempts. Owner or teacher.
pub async fn delete_session(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    owned_session(&mut conn, id, &claims, true).await?;

    sqlx::query("DELETE FROM practice_sessions WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    tracing::info!("Session {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Serves an unseen question from the session's categories.
///
/// The question is recorded in the next slot. When nothing is left the
/// response says so and the session is left untouched.
pub async fn next_question(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<NextQuestionResponse>, AppError> {
    let mut tx = pool.begin().await?;
    let session = owned_session(&mut tx, id, &claims, false).await?;
    if !session.is_in_progress() {
        return Err(AppError::Conflict("Session is finished".to_string()));
    }

    let practice = fetch_practice(&mut tx, session.practice_id).await?;
    let categories = fetch_session_categories(&mut tx, id).await?;
    let excluded: HashSet<QuestionId> =
        sqlx::query_scalar::<_, QuestionId>("SELECT question_id FROM question_attempts WHERE session_id = ?1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();
    let bank = load_question_pool(&mut tx, practice.course_id, config.system_context).await?;

    let selection = {
        let mut rng = rand::rng();
        select_next_question(&bank, &categories, &excluded, &mut rng)
    };

    let question_id = match selection {
        Selection::Question(question_id) => question_id,
        Selection::Exhausted => {
            tracing::info!("Session {} exhausted after {} questions", id, excluded.len());
            return Ok(Json(NextQuestionResponse::Exhausted {
                message: NO_MORE_QUESTIONS.to_string(),
            }));
        }
    };

    let question = sqlx::query_as::<_, Question>(
        "SELECT id, category_id, name, question_text, answer, default_mark, created_at FROM questions WHERE id = ?1",
    )
    .bind(question_id)
    .fetch_one(&mut *tx)
    .await?;

    let slot: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(slot), 0) + 1 FROM question_attempts WHERE session_id = ?1",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO question_attempts (session_id, slot, question_id, max_mark, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(id)
    .bind(slot)
    .bind(question.id)
    .bind(question.default_mark)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE practice_sessions SET total_questions = ?1 WHERE id = ?2")
        .bind(slot)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("Session {} slot {}: question {}", id, slot, question.id);

    Ok(Json(NextQuestionResponse::Question {
        slot,
        question: question.into(),
    }))
}

/// Grades a response for one slot according to the session's behaviour.
pub async fn answer_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((id, slot)): Path<(i64, i64)>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let session = owned_session(&mut tx, id, &claims, false).await?;
    if !session.is_in_progress() {
        return Err(AppError::Conflict("Session is finished".to_string()));
    }
    let behaviour = session.behaviour();

    let attempt = sqlx::query_as::<_, QuestionAttempt>(
        r#"
        SELECT id, session_id, slot, question_id, max_mark, fraction, response,
               correct, tries, created_at, answered_at
        FROM question_attempts
        WHERE session_id = ?1 AND slot = ?2
        "#,
    )
    .bind(id)
    .bind(slot)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(format!("No question in slot {}", slot)))?;

    if !behaviour.accepts_response(attempt.fraction.is_some(), attempt.correct) {
        return Err(AppError::Conflict(
            "This question has already been answered".to_string(),
        ));
    }

    let expected: String = sqlx::query_scalar("SELECT answer FROM questions WHERE id = ?1")
        .bind(attempt.question_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let grade = grade_response(behaviour, &expected, &payload.response, attempt.tries);
    let tries = attempt.tries + 1;

    sqlx::query(
        r#"
        UPDATE question_attempts
        SET fraction = ?1, response = ?2, correct = ?3, tries = ?4, answered_at = ?5
        WHERE id = ?6
        "#,
    )
    .bind(grade.fraction)
    .bind(&payload.response)
    .bind(grade.correct)
    .bind(tries)
    .bind(Utc::now())
    .bind(attempt.id)
    .execute(&mut *tx)
    .await?;

    refresh_totals(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(
        "Session {} slot {} graded: correct={} fraction={:.3} try={}",
        id,
        slot,
        grade.correct,
        grade.fraction,
        tries
    );

    let reveal = behaviour.shows_feedback_immediately();
    Ok(Json(AnswerResponse {
        slot,
        tries,
        correct: reveal.then_some(grade.correct),
        fraction: reveal.then_some(grade.fraction),
        mark: reveal.then_some(grade.fraction * attempt.max_mark),
        can_retry: behaviour.accepts_response(true, grade.correct),
    }))
}

/// Finishes a session and returns it with every grade revealed.
pub async fn finish_session(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;
    let session = owned_session(&mut tx, id, &claims, false).await?;
    if !session.is_in_progress() {
        return Err(AppError::Conflict("Session already finished".to_string()));
    }

    let sql = format!(
        "UPDATE practice_sessions SET status = ?1 WHERE id = ?2 RETURNING {}",
        SESSION_COLUMNS
    );
    let session = sqlx::query_as::<_, Session>(&sql)
        .bind(STATUS_FINISHED)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    let categories = fetch_session_categories(&mut tx, id).await?;
    let attempts = fetch_attempts(&mut tx, id, true).await?;
    tx.commit().await?;

    tracing::info!(
        "Session {} finished: {}/{} right, {:.2}/{:.2} marks",
        id,
        session.total_right.unwrap_or_default(),
        session.total_questions,
        session.marks_obtained.unwrap_or_default(),
        session.total_marks.unwrap_or_default()
    );

    Ok(Json(SessionDetail {
        session,
        categories,
        attempts,
    }))
}
