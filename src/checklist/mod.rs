//! Checklist reference data, answers and per-visit scoring.
//!
//! - [`ChecklistQuestion`] / [`ChecklistResponse`]: catalog entries and visit answers
//! - [`QuestionCatalog`]: keyed question lookup, with a built-in [`default_catalog`]
//! - [`ChecklistScorer`]: turns one visit's answers into a [`VisitScore`]

mod catalog;
mod scorer;
mod types;

pub use catalog::*;
pub use scorer::*;
pub use types::*;
