#![deny(missing_docs)]

//! Core library for the StudyAssist document study server.

/// HTTP routing, pages, and JSON handlers.
pub mod api;
/// Text generation client abstraction and adapters.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Plain-text extraction from uploaded documents.
pub mod extract;
/// Feedback delivery over SMTP.
pub mod feedback;
/// Per-document vector index on disk.
pub mod index;
/// Job progress table and upload byte tracking.
pub mod jobs;
/// Structured logging and tracing setup.
pub mod logging;
/// Indexing metrics helpers.
pub mod metrics;
/// Document processing pipeline: chunking, indexing, answers, and quizzes.
pub mod processing;
/// Server-side session state.
pub mod session;
