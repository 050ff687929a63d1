use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_LLM_MODEL: &str = "llama3-70b-8192";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_HASH_DIMENSION: usize = 384;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_LOG_FILE: &str = "logs/docchat.log";

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

/// Runtime configuration for the document chat server.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key sent as a bearer token to the chat completions endpoint.
    pub groq_api_key: String,
    /// Base URL of the OpenAI-compatible chat completions API.
    pub llm_base_url: String,
    /// Chat model used to answer questions.
    pub llm_model: String,
    /// Optional sampling temperature forwarded to the chat model.
    pub llm_temperature: Option<f32>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Optional override for the embedding endpoint base URL.
    pub embedding_url: Option<String>,
    /// Optional bearer key for hosted embedding providers.
    pub embedding_api_key: Option<String>,
    /// Expected dimensionality of produced vectors, when known.
    pub embedding_dimension: Option<usize>,
    /// Number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Chunk budget measured in [`Config::text_splitter_unit`].
    pub text_splitter_chunk_size: usize,
    /// Overlap between adjacent chunks measured in [`Config::text_splitter_unit`].
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub text_splitter_unit: LengthUnit,
    /// Number of chunks retrieved for each question.
    pub retriever_top_k: usize,
    /// Directory where uploaded documents are written.
    pub data_dir: PathBuf,
    /// Address the HTTP server binds to.
    pub server_host: String,
    /// Port the HTTP server binds to.
    pub server_port: u16,
    /// Maximum accepted request body size for uploads.
    pub max_upload_bytes: usize,
    /// Optional CORS allow-list; `None` permits any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
    /// File that log events are appended to; `None` logs to stdout only.
    pub log_file: Option<PathBuf>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Deterministic offline hashing embedder.
    Hash,
}

/// How chunk sizes and overlaps are measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthUnit {
    /// Unicode scalar values.
    Chars,
    /// `cl100k_base` BPE tokens.
    Tokens,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider = match load_env_optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
            None => EmbeddingProvider::Ollama,
        };
        let mut embedding_dimension = parse_optional::<usize>("EMBEDDING_DIMENSION")?;
        if embedding_dimension == Some(0) {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if embedding_provider == EmbeddingProvider::Hash && embedding_dimension.is_none() {
            embedding_dimension = Some(DEFAULT_HASH_DIMENSION);
        }

        let text_splitter_chunk_size =
            parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);
        if text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        let retriever_top_k = parse_optional("RETRIEVER_TOP_K")?.unwrap_or(DEFAULT_TOP_K);
        if retriever_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVER_TOP_K".into()));
        }
        let embedding_batch_size =
            parse_optional("EMBEDDING_BATCH_SIZE")?.unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE);
        if embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }

        Ok(Self {
            groq_api_key: load_env("GROQ_API_KEY")?,
            llm_base_url: load_env_optional("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_temperature: parse_optional("LLM_TEMPERATURE")?,
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_dimension,
            embedding_batch_size,
            text_splitter_chunk_size,
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            text_splitter_unit: match load_env_optional("TEXT_SPLITTER_UNIT") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("TEXT_SPLITTER_UNIT".into()))?,
                None => LengthUnit::Chars,
            },
            retriever_top_k,
            data_dir: load_env_optional("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            server_host: load_env_optional("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            server_port: parse_optional("SERVER_PORT")?.unwrap_or(5000),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            cors_allowed_origins: load_env_optional("CORS_ALLOWED_ORIGINS").map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            log_file: match load_env_optional("DOCCHAT_LOG_FILE") {
                Some(value) if value.trim().eq_ignore_ascii_case("off") => None,
                Some(value) => Some(PathBuf::from(value.trim())),
                None => Some(PathBuf::from(DEFAULT_LOG_FILE)),
            },
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "tokens" => Ok(Self::Tokens),
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

/// Load configuration from the environment (and `.env`) and install it in the global cache.
///
/// Runs before tracing is installed, since the log file location comes from the config.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, PoisonError};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "GROQ_API_KEY",
        "LLM_BASE_URL",
        "LLM_MODEL",
        "LLM_TEMPERATURE",
        "EMBEDDING_PROVIDER",
        "EMBEDDING_MODEL",
        "EMBEDDING_URL",
        "EMBEDDING_API_KEY",
        "EMBEDDING_DIMENSION",
        "EMBEDDING_BATCH_SIZE",
        "TEXT_SPLITTER_CHUNK_SIZE",
        "TEXT_SPLITTER_CHUNK_OVERLAP",
        "TEXT_SPLITTER_UNIT",
        "RETRIEVER_TOP_K",
        "DATA_DIR",
        "SERVER_HOST",
        "SERVER_PORT",
        "MAX_UPLOAD_BYTES",
        "CORS_ALLOWED_ORIGINS",
        "DOCCHAT_LOG_FILE",
    ];

    /// Run `Config::from_env` with exactly `vars` set, serialised across tests.
    fn load_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: every test touching these variables holds ENV_LOCK.
        unsafe {
            for key in KEYS {
                env::remove_var(key);
            }
            for (key, value) in vars {
                env::set_var(key, value);
            }
        }
        let result = Config::from_env();
        unsafe {
            for key in KEYS {
                env::remove_var(key);
            }
        }
        result
    }

    #[test]
    fn missing_groq_key_is_reported() {
        let error = load_with(&[]).expect_err("key required");
        assert!(matches!(error, ConfigError::MissingVariable(ref key) if key == "GROQ_API_KEY"));

        let error = load_with(&[("GROQ_API_KEY", "   ")]).expect_err("blank key");
        assert!(matches!(error, ConfigError::MissingVariable(_)));
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = load_with(&[("GROQ_API_KEY", "gsk-test")]).expect("config");
        assert_eq!(config.groq_api_key, "gsk-test");
        assert_eq!(config.llm_base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.llm_model, "llama3-70b-8192");
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(config.embedding_dimension, None);
        assert_eq!(config.embedding_batch_size, 64);
        assert_eq!(config.text_splitter_chunk_size, 1000);
        assert_eq!(config.text_splitter_chunk_overlap, 100);
        assert_eq!(config.text_splitter_unit, LengthUnit::Chars);
        assert_eq!(config.retriever_top_k, 4);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.server_port, 5000);
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(config.cors_allowed_origins, None);
        assert_eq!(config.log_file, Some(PathBuf::from("logs/docchat.log")));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        for key in [
            "TEXT_SPLITTER_CHUNK_SIZE",
            "RETRIEVER_TOP_K",
            "EMBEDDING_BATCH_SIZE",
            "EMBEDDING_DIMENSION",
        ] {
            let error = load_with(&[("GROQ_API_KEY", "gsk-test"), (key, "0")])
                .expect_err("zero rejected");
            assert!(
                matches!(error, ConfigError::InvalidValue(ref name) if name == key),
                "unexpected error for {key}: {error}"
            );
        }
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        let error = load_with(&[("GROQ_API_KEY", "gsk-test"), ("SERVER_PORT", "http")])
            .expect_err("bad port");
        assert!(matches!(error, ConfigError::InvalidValue(ref name) if name == "SERVER_PORT"));
    }

    #[test]
    fn hash_provider_defaults_dimension() {
        let config = load_with(&[("GROQ_API_KEY", "gsk-test"), ("EMBEDDING_PROVIDER", "hash")])
            .expect("config");
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hash);
        assert_eq!(config.embedding_dimension, Some(384));

        let config = load_with(&[
            ("GROQ_API_KEY", "gsk-test"),
            ("EMBEDDING_PROVIDER", "hash"),
            ("EMBEDDING_DIMENSION", "256"),
        ])
        .expect("config");
        assert_eq!(config.embedding_dimension, Some(256));
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = load_with(&[
            ("GROQ_API_KEY", "gsk-test"),
            (
                "CORS_ALLOWED_ORIGINS",
                " http://localhost:3000 , ,https://docs.example.com ",
            ),
        ])
        .expect("config");
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec![
                "http://localhost:3000".to_string(),
                "https://docs.example.com".to_string(),
            ])
        );
    }

    #[test]
    fn log_file_can_be_moved_or_disabled() {
        let config = load_with(&[
            ("GROQ_API_KEY", "gsk-test"),
            ("DOCCHAT_LOG_FILE", "/var/log/docchat.log"),
        ])
        .expect("config");
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/docchat.log")));

        let config = load_with(&[("GROQ_API_KEY", "gsk-test"), ("DOCCHAT_LOG_FILE", "OFF")])
            .expect("config");
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn provider_parsing_is_case_insensitive() {
        assert_eq!("Ollama".parse(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("OPENAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!(" hash ".parse(), Ok(EmbeddingProvider::Hash));
        assert_eq!("fastembed".parse::<EmbeddingProvider>(), Err(()));
    }

    #[test]
    fn length_unit_accepts_aliases() {
        assert_eq!("chars".parse(), Ok(LengthUnit::Chars));
        assert_eq!("Characters".parse(), Ok(LengthUnit::Chars));
        assert_eq!("tokens".parse(), Ok(LengthUnit::Tokens));
        assert!("bytes".parse::<LengthUnit>().is_err());
    }
}
