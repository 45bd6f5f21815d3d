//! Exam attempt engine for the course platform: prerequisite gate, attempt
//! lifecycle, scoring and cooldown, served over HTTP.

pub mod config;
pub mod cooldown;
pub mod db;
pub mod engine;
pub mod error;
pub mod gate;
pub mod models;
pub mod routes;
pub mod scoring;
pub mod store;

pub use engine::ExamEngine;
pub use error::{ExamError, ExamResult};
