//! TOML configuration.
//!
//! Every tunable has a default, so a config file only needs the sections it
//! changes. Secrets never live in the file: each credential is read from an
//! environment variable whose *name* is configured here.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use docent_core::chunk::ChunkParams;
use docent_core::embedding::EmbedBatching;
use docent_core::generation::CompletionOptions;
use docent_core::pipeline::{RagSettings, TOP_K_RANGE};
use docent_core::retry::RetryPolicy;
use docent_core::search::IndexSettings;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL clients use to reach this server. Signed file links point here.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl ServerConfig {
    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    150
}
fn default_min_chunk_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    #[serde(default = "default_true")]
    pub strict_grounding: bool,
    #[serde(default = "default_true")]
    pub hybrid_search: bool,
    /// Vector weight for the in-memory index: `(1-α)*keyword + α*vector`.
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            strict_grounding: true,
            hybrid_search: true,
            hybrid_alpha: default_hybrid_alpha(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_score_threshold() -> f64 {
    0.3
}
fn default_true() -> bool {
    true
}
fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_history_turns() -> usize {
    10
}

/// Connection settings shared by the embedding and chat models.
///
/// `provider` is `"openai"`, `"azure"` or `"disabled"`.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelEndpointConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// OpenAI-style base URL, used when `provider = "openai"`.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Azure resource endpoint, used when `provider = "azure"`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Azure deployment name. Defaults to the model name.
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelEndpointConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_base: default_api_base(),
            endpoint: None,
            deployment: None,
            api_version: default_api_version(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_version() -> String {
    "2024-02-01".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl ModelEndpointConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(flatten)]
    pub endpoint: ModelEndpointConfig,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: ModelEndpointConfig::default(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_embed_batch_size(),
            pause_ms: default_pause_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_embed_batch_size() -> usize {
    16
}
fn default_pause_ms() -> u64 {
    100
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    10_000
}

impl EmbeddingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn batching(&self) -> EmbedBatching {
        EmbedBatching {
            batch_size: self.batch_size,
            pause: Duration::from_millis(self.pause_ms),
            retry: self.retry_policy(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(flatten)]
    pub endpoint: ModelEndpointConfig,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: ModelEndpointConfig::default(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// `"rest"` for a search service, `"memory"` for the in-process index.
    #[serde(default = "default_search_backend")]
    pub backend: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_search_api_version")]
    pub api_version: String,
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_upload_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: default_search_backend(),
            endpoint: None,
            index_name: default_index_name(),
            api_version: default_search_api_version(),
            api_key_env: default_search_key_env(),
            batch_size: default_upload_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_search_backend() -> String {
    "memory".to_string()
}
fn default_index_name() -> String {
    "rag-documents".to_string()
}
fn default_search_api_version() -> String {
    "2023-11-01".to_string()
}
fn default_search_key_env() -> String {
    "SEARCH_API_KEY".to_string()
}
fn default_upload_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// `"filesystem"` or `"s3"`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_link_ttl_secs")]
    pub link_ttl_secs: u64,
    #[serde(default)]
    pub filesystem: FilesystemStorageConfig,
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            link_ttl_secs: default_link_ttl_secs(),
            filesystem: FilesystemStorageConfig::default(),
            s3: None,
        }
    }
}

fn default_storage_backend() -> String {
    "filesystem".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}
fn default_link_ttl_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemStorageConfig {
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
    #[serde(default = "default_link_secret_env")]
    pub link_secret_env: String,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for FilesystemStorageConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
            link_secret_env: default_link_secret_env(),
            follow_symlinks: false,
        }
    }
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_link_secret_env() -> String {
    "DOCENT_LINK_SECRET".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Secret-free view of the active configuration, reported by `/health`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigSummary {
    pub top_k: usize,
    pub score_threshold: f64,
    pub strict_grounding: bool,
    pub hybrid_search: bool,
    pub index_name: String,
    pub search_backend: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub storage: String,
}

impl Config {
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            top_k: self.retrieval.top_k,
            score_threshold: self.retrieval.score_threshold,
            strict_grounding: self.retrieval.strict_grounding,
            hybrid_search: self.retrieval.hybrid_search,
            index_name: self.search.index_name.clone(),
            search_backend: self.search.backend.clone(),
            embedding_model: self.embedding.model.clone(),
            chat_model: self.generation.model.clone(),
            storage: self.storage.backend.clone(),
        }
    }

    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
            min_chunk_size: self.chunking.min_chunk_size,
        }
    }

    pub fn rag_settings(&self) -> RagSettings {
        RagSettings {
            top_k: self.retrieval.top_k,
            score_threshold: self.retrieval.score_threshold,
            strict_grounding: self.retrieval.strict_grounding,
            hybrid_search: self.retrieval.hybrid_search,
            history_turns: self.retrieval.history_turns,
            generation: CompletionOptions {
                temperature: self.generation.temperature,
                max_tokens: self.generation.max_tokens,
            },
            query_retry: self.embedding.retry_policy(),
        }
    }

    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            index_name: self.search.index_name.clone(),
            dims: self.embedding.dims,
            batch_size: self.search.batch_size,
        }
    }

    /// Check every cross-field constraint. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if c.chunk_overlap > c.chunk_size / 2 {
            bail!(
                "chunking.chunk_overlap ({}) must be at most half of chunking.chunk_size ({})",
                c.chunk_overlap,
                c.chunk_size
            );
        }
        if c.min_chunk_size > c.chunk_size {
            bail!("chunking.min_chunk_size must be <= chunking.chunk_size");
        }

        let r = &self.retrieval;
        if !TOP_K_RANGE.contains(&r.top_k) {
            bail!("retrieval.top_k must be between 1 and 20");
        }
        if !(0.0..=1.0).contains(&r.score_threshold) {
            bail!("retrieval.score_threshold must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&r.hybrid_alpha) {
            bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
        }

        validate_endpoint("embedding", &self.embedding.endpoint)?;
        validate_endpoint("generation", &self.generation.endpoint)?;
        let e = &self.embedding;
        if e.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if e.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if e.max_attempts == 0 {
            bail!("embedding.max_attempts must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }
        if self.generation.max_tokens == 0 {
            bail!("generation.max_tokens must be > 0");
        }

        let s = &self.search;
        match s.backend.as_str() {
            "memory" => {}
            "rest" => match &s.endpoint {
                Some(url) => require_http("search.endpoint", url)?,
                None => bail!("search.endpoint is required when search.backend = \"rest\""),
            },
            other => bail!(
                "Unknown search backend: '{}'. Must be rest or memory.",
                other
            ),
        }
        if s.batch_size == 0 {
            bail!("search.batch_size must be > 0");
        }
        if s.index_name.trim().is_empty() {
            bail!("search.index_name must not be empty");
        }

        let st = &self.storage;
        match st.backend.as_str() {
            "filesystem" => {}
            "s3" => match &st.s3 {
                Some(s3) => {
                    if s3.bucket.trim().is_empty() {
                        bail!("storage.s3.bucket must not be empty");
                    }
                    if let Some(url) = &s3.endpoint_url {
                        require_http("storage.s3.endpoint_url", url)?;
                    }
                }
                None => bail!("[storage.s3] is required when storage.backend = \"s3\""),
            },
            other => bail!(
                "Unknown storage backend: '{}'. Must be filesystem or s3.",
                other
            ),
        }
        if st.include_globs.is_empty() {
            bail!("storage.include_globs must not be empty");
        }
        if st.link_ttl_secs == 0 {
            bail!("storage.link_ttl_secs must be > 0");
        }
        if let Some(url) = &self.server.public_url {
            require_http("server.public_url", url)?;
        }

        Ok(())
    }
}

fn validate_endpoint(section: &str, e: &ModelEndpointConfig) -> Result<()> {
    match e.provider.as_str() {
        "disabled" => {}
        "openai" => require_http(&format!("{section}.api_base"), &e.api_base)?,
        "azure" => match &e.endpoint {
            Some(url) => require_http(&format!("{section}.endpoint"), url)?,
            None => bail!("{section}.endpoint is required when provider is 'azure'"),
        },
        other => bail!(
            "Unknown {} provider: '{}'. Must be disabled, openai, or azure.",
            section,
            other
        ),
    }
    if e.timeout_secs == 0 {
        bail!("{section}.timeout_secs must be > 0");
    }
    Ok(())
}

fn require_http(field: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        bail!("{field} must start with http:// or https:// (got '{url}')")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
