// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{models::question::PublicQuestion, practice::QuestionId};

/// Represents the 'question_attempts' table: one question presented in a session.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionAttempt {
    pub id: i64,
    pub session_id: i64,
    pub slot: i64,
    pub question_id: QuestionId,
    pub max_mark: f64,

    /// `None` until the first response is graded.
    pub fraction: Option<f64>,

    /// Last response given.
    pub response: Option<String>,

    pub correct: bool,

    /// Number of responses graded so far.
    pub tries: i64,

    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

/// Attempt row joined with its question name, for session views.
#[derive(Debug, Clone, FromRow)]
pub struct AttemptWithQuestion {
    pub slot: i64,
    pub question_id: QuestionId,
    pub question_name: String,
    pub max_mark: f64,
    pub fraction: Option<f64>,
    pub response: Option<String>,
    pub correct: bool,
}

/// What a student sees of one attempt. Grades stay `None` while hidden.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub slot: i64,
    pub question_id: QuestionId,
    pub question_name: String,
    pub response: Option<String>,
    pub answered: bool,
    pub correct: Option<bool>,
    pub mark: Option<f64>,
    pub max_mark: f64,
}

impl AttemptSummary {
    pub fn from_row(row: AttemptWithQuestion, reveal: bool) -> Self {
        let answered = row.fraction.is_some();
        AttemptSummary {
            slot: row.slot,
            question_id: row.question_id,
            question_name: row.question_name,
            response: row.response,
            answered,
            correct: (reveal && answered).then_some(row.correct),
            mark: if reveal { row.fraction.map(|f| f * row.max_mark) } else { None },
            max_mark: row.max_mark,
        }
    }
}

/// DTO for answering one slot.
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(length(max = 2000))]
    pub response: String,
}

/// Outcome of an answer. Grades are `None` under deferred feedback.
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub slot: i64,
    pub tries: i64,
    pub correct: Option<bool>,
    pub fraction: Option<f64>,
    pub mark: Option<f64>,
    pub can_retry: bool,
}

/// Result of asking for the next question.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NextQuestionResponse {
    Question {
        slot: i64,
        question: PublicQuestion,
    },
    Exhausted {
        message: String,
    },
}
