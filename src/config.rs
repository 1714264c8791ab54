use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the StudyAssist server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secret used to sign session cookies.
    pub secret_key: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of vectors produced by the hashing provider.
    pub embedding_dimension: usize,
    /// Provider used for summaries, answers, and quizzes.
    pub completion_provider: CompletionProvider,
    /// Chat/completion model identifier passed to the provider.
    pub completion_model: String,
    /// API key for OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Optional timeout applied to outbound provider requests.
    pub request_timeout_secs: Option<u64>,
    /// Maximum characters per chunk.
    pub text_splitter_chunk_size: usize,
    /// Characters carried over from the previous chunk.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks embedded and written per batch.
    pub embedding_batch_size: usize,
    /// Number of indexed chunks sampled for the summary prompt.
    pub summary_sample_size: usize,
    /// Number of indexed chunks sampled for the quiz prompt.
    pub quiz_sample_size: usize,
    /// Number of chunks retrieved when answering a question.
    pub ask_top_k: usize,
    /// Upper bound on indexing jobs running at once.
    pub max_concurrent_jobs: usize,
    /// Minimum pause between upload progress updates.
    pub upload_progress_interval_ms: u64,
    /// Directory where uploaded files are saved.
    pub upload_dir: PathBuf,
    /// Directory under which per-document indexes are created.
    pub index_root: PathBuf,
    /// Attempts made when removing an index directory.
    pub delete_retry_attempts: usize,
    /// Pause between index removal attempts.
    pub delete_retry_delay_ms: u64,
    /// Sessions idle this long are dropped.
    pub session_ttl_secs: u64,
    /// Finished or stalled jobs idle this long are dropped.
    pub job_ttl_secs: u64,
    /// Outbound mail settings for feedback messages.
    pub mail: MailSettings,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// SMTP settings used by the feedback mailer.
#[derive(Debug, Clone)]
pub struct MailSettings {
    /// SMTP relay host.
    pub server: String,
    /// SMTP relay port (STARTTLS).
    pub port: u16,
    /// Account used to authenticate and as the sender address.
    pub username: Option<String>,
    /// Password for `username`.
    pub password: Option<String>,
    /// Address that receives feedback messages.
    pub recipient: String,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing embeddings.
    Hashing,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionProvider {
    /// Hosted OpenAI chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret_key: "dev-change-me".into(),
            embedding_provider: EmbeddingProvider::OpenAI,
            embedding_model: "text-embedding-3-large".into(),
            embedding_dimension: 256,
            completion_provider: CompletionProvider::OpenAI,
            completion_model: "gpt-4o-mini".into(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            ollama_url: "http://127.0.0.1:11434".into(),
            request_timeout_secs: None,
            text_splitter_chunk_size: 5000,
            text_splitter_chunk_overlap: 100,
            embedding_batch_size: 50,
            summary_sample_size: 15,
            quiz_sample_size: 20,
            ask_top_k: 10,
            max_concurrent_jobs: 4,
            upload_progress_interval_ms: 250,
            upload_dir: PathBuf::from("uploads"),
            index_root: PathBuf::from("."),
            delete_retry_attempts: 3,
            delete_retry_delay_ms: 300,
            session_ttl_secs: 86_400,
            job_ttl_secs: 3_600,
            mail: MailSettings {
                server: "smtp.gmail.com".into(),
                port: 587,
                username: None,
                password: None,
                recipient: "info@studyassists.com".into(),
            },
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    ///
    /// Every variable is optional; unset values fall back to [`Config::default`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mail_username = load_env_optional("MAIL_USERNAME");
        Ok(Self {
            secret_key: load_env_optional("STUDYASSIST_SECRET_KEY")
                .or_else(|| load_env_optional("SECRET_KEY"))
                .unwrap_or(defaults.secret_key),
            embedding_provider: load_parsed("EMBEDDING_PROVIDER", defaults.embedding_provider)?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: load_parsed("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            completion_provider: load_parsed("COMPLETION_PROVIDER", defaults.completion_provider)?,
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or(defaults.completion_model),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or(defaults.openai_base_url),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            request_timeout_secs: load_parsed_optional("REQUEST_TIMEOUT_SECS")?,
            text_splitter_chunk_size: load_parsed(
                "TEXT_SPLITTER_CHUNK_SIZE",
                defaults.text_splitter_chunk_size,
            )?,
            text_splitter_chunk_overlap: load_parsed(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                defaults.text_splitter_chunk_overlap,
            )?,
            embedding_batch_size: load_parsed(
                "EMBEDDING_BATCH_SIZE",
                defaults.embedding_batch_size,
            )?,
            summary_sample_size: load_parsed("SUMMARY_SAMPLE_SIZE", defaults.summary_sample_size)?,
            quiz_sample_size: load_parsed("QUIZ_SAMPLE_SIZE", defaults.quiz_sample_size)?,
            ask_top_k: load_parsed("ASK_TOP_K", defaults.ask_top_k)?,
            max_concurrent_jobs: load_parsed("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?,
            upload_progress_interval_ms: load_parsed(
                "UPLOAD_PROGRESS_INTERVAL_MS",
                defaults.upload_progress_interval_ms,
            )?,
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            index_root: load_env_optional("INDEX_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_root),
            delete_retry_attempts: load_parsed(
                "DELETE_RETRY_ATTEMPTS",
                defaults.delete_retry_attempts,
            )?,
            delete_retry_delay_ms: load_parsed(
                "DELETE_RETRY_DELAY_MS",
                defaults.delete_retry_delay_ms,
            )?,
            session_ttl_secs: load_parsed("SESSION_TTL_SECS", defaults.session_ttl_secs)?,
            job_ttl_secs: load_parsed("JOB_TTL_SECS", defaults.job_ttl_secs)?,
            mail: MailSettings {
                server: load_env_optional("MAIL_SERVER").unwrap_or(defaults.mail.server),
                port: load_parsed("MAIL_PORT", defaults.mail.port)?,
                username: mail_username,
                password: load_env_optional("MAIL_PASSWORD"),
                recipient: load_env_optional("FEEDBACK_RECIPIENT")
                    .unwrap_or(defaults.mail.recipient),
            },
            server_port: match load_parsed_optional("PORT")? {
                Some(port) => Some(port),
                None => load_parsed_optional("SERVER_PORT")?,
            },
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_parsed<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(load_parsed_optional(key)?.unwrap_or(default))
}

fn load_parsed_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hashing" | "offline" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

impl FromStr for CompletionProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        completion_provider = ?config.completion_provider,
        completion_model = %config.completion_model,
        upload_dir = %config.upload_dir.display(),
        index_root = %config.index_root.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("OpenAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("ollama".parse(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("offline".parse(), Ok(EmbeddingProvider::Hashing));
        assert_eq!("OLLAMA".parse(), Ok(CompletionProvider::Ollama));
        assert!("qdrant".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn defaults_match_documented_constants() {
        let config = Config::default();
        assert_eq!(config.text_splitter_chunk_size, 5000);
        assert_eq!(config.text_splitter_chunk_overlap, 100);
        assert_eq!(config.embedding_batch_size, 50);
        assert_eq!(config.summary_sample_size, 15);
        assert_eq!(config.quiz_sample_size, 20);
        assert_eq!(config.ask_top_k, 10);
        assert_eq!(config.delete_retry_attempts, 3);
        assert_eq!(config.session_ttl_secs, 86_400);
        assert_eq!(config.job_ttl_secs, 3_600);
    }
}
