//! Document pipeline: chunking, embedding, indexing, summaries, answers, and quizzes.

pub mod chunking;
pub mod prompts;
pub mod quiz;
pub mod sanitize;
mod service;
pub mod types;
pub mod worker;

pub use quiz::{QuizBlock, QuizItem};
pub use service::{StudyApi, StudyService};
pub use types::{ChunkingError, IndexingOutcome, ProcessingError, ProcessingSettings};
pub use worker::{IndexingJob, JobRunner};
