//! Study service coordinating chunking, embedding, indexing, and completions.

use crate::{
    completion::{ChatMessage, CompletionClient, CompletionRequest},
    embedding::EmbeddingClient,
    index::DocumentIndex,
    jobs::{JobExtras, JobPhase, JobTable},
    metrics::IndexingMetrics,
    processing::{
        chunking::chunk_text,
        prompts::{document_prompt, quiz_instructions, summary_instructions, tutor_instructions},
        quiz::{QuizItem, parse_quiz},
        types::{IndexingOutcome, ProcessingError, ProcessingSettings},
        worker::IndexingJob,
    },
};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const SUMMARY_TEMPERATURE: f32 = 0.2;
const ANSWER_TEMPERATURE: f32 = 0.1;
const QUIZ_TEMPERATURE: f32 = 0.2;

/// Operations the HTTP surface and the background worker need from the study pipeline.
#[async_trait]
pub trait StudyApi: Send + Sync {
    /// Chunk, embed, and index the job's text, then summarize it.
    ///
    /// Reports `Processing`/`Summarizing` progress for `job` into `jobs`. Terminal phases are
    /// left to the caller.
    async fn index_document(
        &self,
        job: &IndexingJob,
        jobs: &JobTable,
    ) -> Result<IndexingOutcome, ProcessingError>;

    /// Answer `question` using the chunks most similar to it.
    async fn answer_question(
        &self,
        index_dir: &Path,
        question: &str,
    ) -> Result<String, ProcessingError>;

    /// Generate up to `num_questions` multiple-choice questions from a random sample of chunks.
    async fn generate_quiz(
        &self,
        index_dir: &Path,
        num_questions: usize,
    ) -> Result<Vec<QuizItem>, ProcessingError>;
}

/// Default [`StudyApi`] implementation backed by provider clients and on-disk indexes.
///
/// Construct once near process start and share through an `Arc`.
pub struct StudyService {
    embedder: Arc<dyn EmbeddingClient>,
    completer: Arc<dyn CompletionClient>,
    settings: ProcessingSettings,
    metrics: Arc<IndexingMetrics>,
}

impl StudyService {
    /// Build a service from its collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        completer: Arc<dyn CompletionClient>,
        settings: ProcessingSettings,
        metrics: Arc<IndexingMetrics>,
    ) -> Self {
        Self {
            embedder,
            completer,
            settings,
            metrics,
        }
    }

    async fn summarize(&self, index: &DocumentIndex) -> Result<String, ProcessingError> {
        let sample: Vec<&str> = index
            .documents()
            .iter()
            .take(self.settings.summary_sample_size)
            .map(|chunk| chunk.text.as_str())
            .collect();
        let context = document_prompt(&sample);
        let request = CompletionRequest {
            messages: vec![ChatMessage::system(summary_instructions(&context))],
            temperature: SUMMARY_TEMPERATURE,
        };
        Ok(self.completer.complete(request).await?)
    }
}

#[async_trait]
impl StudyApi for StudyService {
    async fn index_document(
        &self,
        job: &IndexingJob,
        jobs: &JobTable,
    ) -> Result<IndexingOutcome, ProcessingError> {
        let report = |phase: JobPhase, local: f64| {
            jobs.update(&job.job_id, phase, job.scale.scale(local), JobExtras::default());
        };

        report(JobPhase::Processing, 2.0);
        let mut index = DocumentIndex::create(&job.index_dir).await?;

        report(JobPhase::Processing, 5.0);
        let chunks = chunk_text(
            &job.text,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )?;
        tracing::debug!(
            job_id = %job.job_id,
            chunks = chunks.len(),
            chunk_size = self.settings.chunk_size,
            overlap = self.settings.chunk_overlap,
            "Document chunked"
        );

        report(JobPhase::Processing, 10.0);
        let total = chunks.len().max(1);
        let mut added = 0;
        for batch in chunks.chunks(self.settings.embedding_batch_size.max(1)) {
            let texts = batch.to_vec();
            let vectors = self.embedder.generate_embeddings(texts.clone()).await?;
            index.add(texts, vectors).await?;
            added += batch.len();
            report(JobPhase::Processing, 10.0 + 65.0 * added as f64 / total as f64);
        }

        report(JobPhase::Summarizing, 90.0);
        let summary = self.summarize(&index).await?;

        self.metrics.record_document(added as u64);
        tracing::info!(
            job_id = %job.job_id,
            filename = %job.filename,
            chunks = added,
            index_dir = %job.index_dir.display(),
            "Document indexed"
        );
        Ok(IndexingOutcome {
            chunk_count: added,
            summary,
        })
    }

    async fn answer_question(
        &self,
        index_dir: &Path,
        question: &str,
    ) -> Result<String, ProcessingError> {
        let index = DocumentIndex::open(index_dir).await?;
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let query = vectors.pop().ok_or(ProcessingError::EmptyEmbedding)?;
        let hits = index.similarity_search(&query, self.settings.ask_top_k);
        tracing::debug!(
            index_dir = %index_dir.display(),
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Retrieved context for question"
        );

        let texts: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();
        let context = document_prompt(&texts);
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(tutor_instructions(&context)),
                ChatMessage::user(question),
            ],
            temperature: ANSWER_TEMPERATURE,
        };
        Ok(self.completer.complete(request).await?)
    }

    async fn generate_quiz(
        &self,
        index_dir: &Path,
        num_questions: usize,
    ) -> Result<Vec<QuizItem>, ProcessingError> {
        let started = Instant::now();
        let index = DocumentIndex::open(index_dir).await?;
        let loaded = started.elapsed();

        let sample: Vec<&str> = {
            let mut rng = rand::thread_rng();
            index
                .documents()
                .choose_multiple(&mut rng, self.settings.quiz_sample_size)
                .map(|chunk| chunk.text.as_str())
                .collect()
        };
        let context = document_prompt(&sample);
        let request = CompletionRequest {
            messages: vec![ChatMessage::system(quiz_instructions(
                &context,
                num_questions,
            ))],
            temperature: QUIZ_TEMPERATURE,
        };

        let llm_started = Instant::now();
        let reply = self.completer.complete(request).await?;
        let generation = llm_started.elapsed();

        let quiz = parse_quiz(reply.trim());
        tracing::debug!(
            index_dir = %index_dir.display(),
            requested = num_questions,
            documents = index.len(),
            sampled = sample.len(),
            context_chars = context.len(),
            parsed = quiz.len(),
            load_ms = loaded.as_millis() as u64,
            generation_ms = generation.as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "Quiz generated"
        );
        Ok(quiz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{ChatRole, CompletionClientError};
    use crate::embedding::{EmbeddingClientError, HashingEmbeddingClient};
    use crate::jobs::ProgressScale;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Completion stub that records requests and replies with a fixed text.
    struct ScriptedCompletion {
        reply: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletion {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<String, CompletionClientError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::GenerationFailed("quota exceeded".into()))
        }
    }

    fn settings() -> ProcessingSettings {
        ProcessingSettings {
            chunk_size: 40,
            chunk_overlap: 0,
            embedding_batch_size: 2,
            summary_sample_size: 2,
            quiz_sample_size: 3,
            ask_top_k: 1,
        }
    }

    fn service(completer: Arc<ScriptedCompletion>) -> (StudyService, Arc<IndexingMetrics>) {
        let metrics = Arc::new(IndexingMetrics::new());
        let service = StudyService::new(
            Arc::new(HashingEmbeddingClient::new(128)),
            completer,
            settings(),
            metrics.clone(),
        );
        (service, metrics)
    }

    fn job(dir: &Path, text: &str) -> IndexingJob {
        IndexingJob {
            job_id: "job-1".into(),
            text: text.into(),
            index_dir: dir.to_path_buf(),
            filename: "biology.txt".into(),
            scale: ProgressScale::INDEXING,
            session_id: "sid".into(),
        }
    }

    const TEXT: &str = "Mitochondria produce ATP for the cell. \
        Ribosomes assemble proteins from amino acids. \
        The nucleus stores genetic material. \
        Chloroplasts capture light for photosynthesis. \
        The membrane controls what enters the cell.";

    #[tokio::test]
    async fn index_document_writes_chunks_and_summarizes() {
        let root = tempdir().unwrap();
        let dir = root.path().join("index_biology_00000000");
        let completer = ScriptedCompletion::new("**Title: Biology**\n\nCells.");
        let (service, metrics) = service(completer.clone());
        let jobs = JobTable::new();
        jobs.create("job-1");

        let outcome = service
            .index_document(&job(&dir, TEXT), &jobs)
            .await
            .expect("indexing");

        assert!(outcome.chunk_count > 2);
        assert_eq!(outcome.summary, "**Title: Biology**\n\nCells.");
        let status = jobs.read("job-1");
        assert_eq!(status.phase, JobPhase::Summarizing);
        assert_eq!(status.pct, 94);

        let index = DocumentIndex::open(&dir).await.unwrap();
        assert_eq!(index.len(), outcome.chunk_count);
        assert_eq!(metrics.snapshot().chunks_indexed, outcome.chunk_count as u64);

        let requests = completer.requests();
        assert_eq!(requests.len(), 1);
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("Content 2:"));
        assert!(!prompt.contains("Content 3:"));
        assert_eq!(requests[0].temperature, SUMMARY_TEMPERATURE);
    }

    #[tokio::test]
    async fn empty_text_summarizes_placeholder() {
        let root = tempdir().unwrap();
        let completer = ScriptedCompletion::new("nothing here");
        let (service, _) = service(completer.clone());
        let jobs = JobTable::new();

        let outcome = service
            .index_document(&job(root.path(), ""), &jobs)
            .await
            .unwrap();
        assert_eq!(outcome.chunk_count, 0);
        assert!(completer.requests()[0].messages[0]
            .content
            .contains("No content available."));
    }

    #[tokio::test]
    async fn embedding_failure_aborts_indexing() {
        let root = tempdir().unwrap();
        let completer = ScriptedCompletion::new("unused");
        let service = StudyService::new(
            Arc::new(FailingEmbedder),
            completer.clone(),
            settings(),
            Arc::new(IndexingMetrics::new()),
        );
        let jobs = JobTable::new();

        let error = service
            .index_document(&job(root.path(), TEXT), &jobs)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("quota exceeded"));
        assert!(completer.requests().is_empty());
    }

    #[tokio::test]
    async fn answer_uses_top_chunk_and_question() {
        let root = tempdir().unwrap();
        let completer = ScriptedCompletion::new("summary");
        let (service, _) = service(completer.clone());
        service
            .index_document(&job(root.path(), TEXT), &JobTable::new())
            .await
            .unwrap();

        let answer_completer = ScriptedCompletion::new("In the nucleus.");
        let (answering, _) = self::service(answer_completer.clone());
        let answer = answering
            .answer_question(root.path(), "Where is genetic material stored?")
            .await
            .unwrap();
        assert_eq!(answer, "In the nucleus.");

        let request = &answer_completer.requests()[0];
        assert_eq!(request.temperature, ANSWER_TEMPERATURE);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert!(request.messages[0].content.contains("Content 1:"));
        assert!(!request.messages[0].content.contains("Content 2:"));
        assert_eq!(request.messages[1].content, "Where is genetic material stored?");
    }

    #[tokio::test]
    async fn answer_requires_existing_index() {
        let root = tempdir().unwrap();
        let completer = ScriptedCompletion::new("unused");
        let (service, _) = service(completer.clone());
        let error = service
            .answer_question(&root.path().join("missing"), "anything?")
            .await
            .unwrap_err();
        assert!(matches!(error, ProcessingError::Index(_)));
        assert!(completer.requests().is_empty());
    }

    #[tokio::test]
    async fn quiz_samples_chunks_and_parses_reply() {
        let root = tempdir().unwrap();
        let (indexer, _) = service(ScriptedCompletion::new("summary"));
        indexer
            .index_document(&job(root.path(), TEXT), &JobTable::new())
            .await
            .unwrap();

        let reply = "Question 1: What makes ATP?\nA) Nucleus\nB) Mitochondria\nC) Membrane\nD) Ribosome\nCorrect Answer: B\n\nnot a question";
        let completer = ScriptedCompletion::new(reply);
        let (service, _) = service(completer.clone());
        let quiz = service.generate_quiz(root.path(), 3).await.unwrap();

        assert_eq!(quiz.len(), 1);
        assert_eq!(quiz[0].correct, "B");
        let prompt = &completer.requests()[0].messages[0].content;
        assert!(prompt.starts_with("Generate 3 multiple-choice"));
        assert!(prompt.contains("Content 3:"));
        assert!(!prompt.contains("Content 4:"));
    }
}
