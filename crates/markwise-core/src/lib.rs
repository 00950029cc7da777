//! markwise-core — answer evaluation and scoring engine.
//!
//! Turns a (question, model answer, student answer) triple into marks and
//! feedback. Prose answers are scored on four dimensions weighted by a
//! subject profile; code answers on syntax, logic, execution and style.
//! An optional LLM opinion is blended in when available. Whole papers are
//! graded by resolving OR-groups and sub-questions and ranking students.

pub mod aggregate;
pub mod analyzer;
pub mod assessor;
pub mod code;
pub mod combiner;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod groups;
pub mod model;
pub mod parser;
pub mod profile;
pub mod report;
pub mod scaling;
pub mod sheet;
pub mod statistics;
pub mod text;
pub mod traits;
pub mod validation;
