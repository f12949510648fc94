// src/practice/behaviour.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Mark lost per wrong try under adaptive behaviour.
pub const ADAPTIVE_PENALTY: f64 = 1.0 / 3.0;

/// How answers are graded and when the student learns the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behaviour {
    /// One answer per question; correctness is revealed when the session finishes.
    DeferredFeedback,
    /// One answer per question; correctness is revealed at once.
    ImmediateFeedback,
    /// Immediate feedback, wrong answers may be retried for a reduced mark.
    Adaptive,
}

impl Behaviour {
    pub const ALL: [Behaviour; 3] = [
        Behaviour::DeferredFeedback,
        Behaviour::ImmediateFeedback,
        Behaviour::Adaptive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Behaviour::DeferredFeedback => "deferredfeedback",
            Behaviour::ImmediateFeedback => "immediatefeedback",
            Behaviour::Adaptive => "adaptive",
        }
    }

    pub fn shows_feedback_immediately(self) -> bool {
        !matches!(self, Behaviour::DeferredFeedback)
    }

    /// Whether a new response is accepted for an attempt in the given state.
    pub fn accepts_response(self, answered: bool, correct: bool) -> bool {
        match self {
            Behaviour::Adaptive => !correct,
            _ => !answered,
        }
    }
}

impl fmt::Display for Behaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Behaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Behaviour::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| format!("Unknown behaviour '{}'", s))
    }
}

/// Result of grading one response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Grade {
    pub correct: bool,
    /// Share of the question's mark awarded, in `[0, 1]`.
    pub fraction: f64,
}

/// Grades `response` against `expected`.
///
/// `wrong_tries` is the number of earlier wrong responses to the same attempt;
/// only adaptive behaviour turns those into a penalty.
pub fn grade_response(behaviour: Behaviour, expected: &str, response: &str, wrong_tries: i64) -> Grade {
    let correct = expected.trim() == response.trim();
    let fraction = match (correct, behaviour) {
        (false, _) => 0.0,
        (true, Behaviour::Adaptive) => (1.0 - ADAPTIVE_PENALTY * wrong_tries.max(0) as f64).max(0.0),
        (true, _) => 1.0,
    };
    Grade { correct, fraction }
}
