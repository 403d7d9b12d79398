use serde::Deserialize;
use std::collections::HashMap;

/// One data-driven canned-intent rule (C9). `intent_patterns` are matched
/// case-insensitively as substrings of the question; any match fires the
/// rule. Never branching logic in code — purely configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainRule {
    pub name: String,
    /// Narrow phrasing that short-circuits retrieval/LLM entirely and
    /// returns `canned_answer` directly (the canned-intent check, spec
    /// §4.8 step 2).
    pub intent_patterns: Vec<String>,
    pub canned_answer: String,
    pub cited_titles: Vec<String>,
    /// Broader keyword set used only for the post-hoc domain check (spec
    /// §4.8 step 7): if the question overlaps these keywords, a
    /// post-LLM-call answer that omits `required_date_tokens` is replaced
    /// by `canned_answer`. Deliberately separate from `intent_patterns` so
    /// the two mechanisms — pre-LLM short-circuit and post-LLM validation —
    /// stay independent; a question can reach the post-check only when it
    /// did *not* already match `intent_patterns`.
    pub post_check_keywords: Vec<String>,
    /// Numeric tokens that must appear in an LLM answer for a question
    /// matching this rule, or the canned answer is substituted (spec §4.8
    /// step 7). Empty for rules with no such requirement.
    pub required_date_tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    pub model_id: String,
    pub dimension: usize,
    pub max_input_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkConfig {
    pub size: usize,
    pub overlap: usize,
    pub min_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            size: 1500,
            overlap: 200,
            min_size: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieverConfig {
    pub limit: usize,
    pub vector_threshold: f32,
    pub text_fallback_threshold: Option<usize>,
    pub stopwords: Vec<String>,
    pub synonyms: HashMap<String, Vec<String>>,
}

impl RetrieverConfig {
    pub fn text_fallback_threshold(&self) -> usize {
        self.text_fallback_threshold.unwrap_or(self.limit / 2)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub auth_endpoint: String,
    pub scope: String,
    /// Secret; read from environment only, never logged. See
    /// [`AppConfig`]'s hand-written `Debug` impl.
    pub credential: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_sec: u64,
    pub token_refresh_margin_sec: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub soft_deadline_sec: u64,
    pub hard_deadline_sec: u64,
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            soft_deadline_sec: 25 * 60,
            hard_deadline_sec: 30 * 60,
            batch_size: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    pub dir: String,
    pub max_bytes: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        UploadsConfig {
            dir: "uploads".to_string(),
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Immutable, process-wide configuration, constructed once at startup and
/// threaded through every component by reference (`Arc<AppConfig>`). No
/// component holds a mutable process-wide singleton.
#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunk: ChunkConfig,
    pub retriever: RetrieverConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    pub domain_rules: Vec<DomainRule>,
    pub blocked_response_patterns: Vec<String>,
    /// Upper bound on question length at the public entry point.
    #[serde(default = "default_max_question_len")]
    pub max_question_len: usize,
}

fn default_max_question_len() -> usize {
    2000
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<redacted>")
            .field("embedding", &self.embedding)
            .field("chunk", &self.chunk)
            .field("retriever", &self.retriever)
            .field("llm.endpoint", &self.llm.endpoint)
            .field("llm.credential", &"<redacted>")
            .field("ingest", &self.ingest)
            .field("uploads", &self.uploads)
            .field("domain_rules_count", &self.domain_rules.len())
            .finish()
    }
}

impl AppConfig {
    /// Loads configuration from `config/default.toml`, layered with an
    /// optional `config/local.toml`, then environment variables prefixed
    /// `APP__` with `__` as the nesting separator (e.g. `APP__CHUNK__SIZE`).
    /// Secrets (`database_url`, `llm.credential`) are expected to arrive via
    /// environment overrides, never committed to the TOML files.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );
        builder.build()?.try_deserialize()
    }
}
