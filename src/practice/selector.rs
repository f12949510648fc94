// src/practice/selector.rs

use std::collections::HashSet;

use rand::{Rng, seq::IndexedRandom};
use serde::Serialize;

use super::{
    CategoryId, QuestionId,
    category_tree::{Category, expand_descendants},
};

/// Outcome of picking the next question of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "question_id", rename_all = "lowercase")]
pub enum Selection {
    Question(QuestionId),
    /// Every eligible question has already been presented.
    Exhausted,
}

/// Read access to the question bank as seen by the selector.
pub trait QuestionFinder {
    /// Question ids stored in `categories` or in any of their descendants.
    fn questions_in(&self, categories: &[CategoryId]) -> Vec<QuestionId>;
}

/// In-memory snapshot of a bank: its categories and which category each question lives in.
#[derive(Debug, Clone, Default)]
pub struct QuestionPool {
    categories: Vec<Category>,
    questions: Vec<(QuestionId, CategoryId)>,
}

impl QuestionPool {
    pub fn new(categories: Vec<Category>, questions: Vec<(QuestionId, CategoryId)>) -> Self {
        Self {
            categories,
            questions,
        }
    }
}

impl QuestionFinder for QuestionPool {
    fn questions_in(&self, categories: &[CategoryId]) -> Vec<QuestionId> {
        let scope: HashSet<CategoryId> = expand_descendants(&self.categories, categories)
            .into_iter()
            .collect();
        self.questions
            .iter()
            .filter(|(_, category)| scope.contains(category))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Picks one id of `candidates` that is not in `excluded`, uniformly at random.
///
/// Repeated candidates count once, so every eligible id has the same chance.
pub fn choose_question<R: Rng + ?Sized>(
    candidates: &[QuestionId],
    excluded: &HashSet<QuestionId>,
    rng: &mut R,
) -> Selection {
    let mut seen = HashSet::with_capacity(candidates.len());
    let eligible: Vec<QuestionId> = candidates
        .iter()
        .copied()
        .filter(|id| !excluded.contains(id) && seen.insert(*id))
        .collect();

    tracing::debug!(
        "{} eligible of {} candidates ({} excluded)",
        eligible.len(),
        candidates.len(),
        excluded.len()
    );

    match eligible.choose(rng) {
        Some(&id) => Selection::Question(id),
        None => Selection::Exhausted,
    }
}

/// Selects an unseen question from `categories` (descendants included).
///
/// Callers guarantee `categories` is non-empty; an empty list simply has no
/// eligible questions.
pub fn select_next_question<F, R>(
    finder: &F,
    categories: &[CategoryId],
    excluded: &HashSet<QuestionId>,
    rng: &mut R,
) -> Selection
where
    F: QuestionFinder + ?Sized,
    R: Rng + ?Sized,
{
    let candidates = finder.questions_in(categories);
    choose_question(&candidates, excluded, rng)
}
