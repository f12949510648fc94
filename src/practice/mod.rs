// src/practice/mod.rs

//! Practice core: category trees, question selection and grading.
//! Nothing in here touches the database; handlers load rows and hand them in.

pub mod behaviour;
pub mod category_tree;
pub mod selector;

/// Question bank category id. `0` is the implicit top of every bank.
pub type CategoryId = i64;

pub type QuestionId = i64;

/// Parent id used by top-level categories.
pub const TOP_CATEGORY: CategoryId = 0;

pub use behaviour::{Behaviour, Grade, grade_response};
pub use category_tree::{Category, CategoryNode, CategoryTree, build_category_tree, expand_descendants};
pub use selector::{QuestionFinder, QuestionPool, Selection, choose_question, select_next_question};
