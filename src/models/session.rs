// src/models/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    models::attempt::AttemptSummary,
    practice::{Behaviour, CategoryId},
};

pub const STATUS_IN_PROGRESS: &str = "inprogress";
pub const STATUS_FINISHED: &str = "finished";

/// Represents the 'practice_sessions' table: one practice run by one student.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Session {
    pub id: i64,
    pub practice_id: i64,
    pub user_id: i64,
    pub behaviour: String,
    pub practice_date: DateTime<Utc>,

    /// 'inprogress' or 'finished'.
    pub status: String,

    /// Questions shown so far (the last slot number).
    pub total_questions: i64,

    /// Questions answered correctly. Omitted while grades are hidden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_right: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub marks_obtained: Option<f64>,

    /// Marks available over the answered questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_marks: Option<f64>,
}

impl Session {
    pub fn is_in_progress(&self) -> bool {
        self.status == STATUS_IN_PROGRESS
    }

    /// Falls back to deferred feedback, which reveals the least, if the stored value is unknown.
    pub fn behaviour(&self) -> Behaviour {
        self.behaviour.parse().unwrap_or(Behaviour::DeferredFeedback)
    }

    /// Whether grades may be shown to the student right now.
    pub fn reveals_feedback(&self) -> bool {
        !self.is_in_progress() || self.behaviour().shows_feedback_immediately()
    }

    /// Drops the running score, which would give away correctness.
    pub fn redacted(mut self) -> Self {
        self.total_right = None;
        self.marks_obtained = None;
        self.total_marks = None;
        self
    }

    /// The session as a viewer may see it: teachers always get the score,
    /// students only once feedback is due.
    pub fn for_viewer(self, manager: bool) -> Self {
        if manager || self.reveals_feedback() {
            self
        } else {
            self.redacted()
        }
    }
}

/// DTO for starting a session.
#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    pub behaviour: Behaviour,
    #[validate(length(min = 1, message = "At least one category must be selected"))]
    pub categories: Vec<CategoryId>,
}

/// A session with its categories and attempts.
#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub categories: Vec<CategoryId>,
    pub attempts: Vec<AttemptSummary>,
}

/// Answer to "is there a session to continue?".
#[derive(Debug, Serialize)]
pub struct LatestSessionResponse {
    pub session: Option<Session>,
    pub can_continue: bool,
}

/// Row of the practice-wide sessions report.
#[derive(Debug, Serialize, FromRow)]
pub struct SessionReportRow {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub behaviour: String,
    pub practice_date: DateTime<Utc>,
    pub status: String,
    pub total_questions: i64,
    pub total_right: i64,
    pub marks_obtained: f64,
    pub total_marks: f64,
}

/// Marks of one session broken down by one of its categories (subcategories included).
#[derive(Debug, Serialize, PartialEq)]
pub struct CategoryReportRow {
    pub category_id: CategoryId,
    pub category_name: String,
    pub questions: i64,
    pub marks_obtained: f64,
    pub total_marks: f64,
}
