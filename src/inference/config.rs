//! Agent configuration loading and validation.
//!
//! Reads `admin-agent.yaml` and resolves environment variables. The file is
//! optional: every section has built-in defaults, and those defaults are the
//! canonical tier tables. Config is loaded once at startup and shared
//! read-only (`Arc<AgentConfig>`) for the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::InferenceError;

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "admin-agent.yaml";

/// Env var that points at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "ADMIN_AGENT_CONFIG";

/// Matches requests that only read: listing/showing/counting verbs at the start.
pub const DEFAULT_SIMPLE_PATTERN: &str = r"(?i)^\s*(list|show|display|count|how many|הצג|הציג|הראה|תראה|תציג|רשימת|כמה)\b";

/// Matches requests that write or need judgment anywhere in the text.
pub const DEFAULT_DEEP_PATTERN: &str = r"(?i)(\b(create|add|new|update|edit|change|rename|modify|delete|remove|rid|fix|clean|clear|merge|replace|set|move|reorder|rearrange|reorganize|organize|sort|suggest|recommend|improve)\b|צור|תצור|הוסף|תוסיף|הוסיף|הוסיפ|חדש|עדכן|תעדכן|ערוך|שנה|תשנה|לשנות|שנו|מחק|מחוק|הסר|הסיר|העבר|העביר|תקן|סדר|ארגן|הצע|המלץ|שפר)";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Endpoint of one OpenAI-compatible provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderConfig {
    /// Base URL without the trailing `/chat/completions`.
    pub base_url: String,
}

/// One (provider, model) pair in a tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelCandidate {
    pub provider: String,
    pub model: String,
    /// Observed latency, for ordering and documentation only.
    #[serde(default)]
    pub expected_latency_ms: u64,
    /// Logical secret name handed to the credential source.
    pub credential_key: String,
}

impl ModelCandidate {
    pub fn new(provider: &str, model: &str, expected_latency_ms: u64, credential_key: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            expected_latency_ms,
            credential_key: credential_key.to_string(),
        }
    }
}

/// The three ordered candidate lists.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub classifier: Vec<ModelCandidate>,
    pub fast: Vec<ModelCandidate>,
    pub deep: Vec<ModelCandidate>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            classifier: vec![
                ModelCandidate::new("groq", "llama-3.1-8b-instant", 400, "GROQ_API_KEY"),
                ModelCandidate::new("cerebras", "llama3.1-8b", 500, "CEREBRAS_API_KEY"),
            ],
            fast: vec![
                ModelCandidate::new("groq", "llama-3.3-70b-versatile", 1_500, "GROQ_API_KEY"),
                ModelCandidate::new("cerebras", "llama-3.3-70b", 2_000, "CEREBRAS_API_KEY"),
                ModelCandidate::new(
                    "openrouter",
                    "meta-llama/llama-3.3-70b-instruct",
                    4_000,
                    "OPENROUTER_API_KEY",
                ),
            ],
            deep: vec![
                ModelCandidate::new("groq", "openai/gpt-oss-120b", 3_000, "GROQ_API_KEY"),
                ModelCandidate::new("cerebras", "gpt-oss-120b", 3_500, "CEREBRAS_API_KEY"),
                ModelCandidate::new(
                    "openrouter",
                    "google/gemini-2.5-flash",
                    6_000,
                    "OPENROUTER_API_KEY",
                ),
            ],
        }
    }
}

/// Per-call budgets in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub classifier_ms: u64,
    /// Above the p99 of the slowest fast-tier candidate.
    pub fast_ms: u64,
    /// Above the p99 of the slowest deep-tier candidate.
    pub deep_ms: u64,
    pub metadata_fetch_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            classifier_ms: 6_000,
            fast_ms: 12_000,
            deep_ms: 15_000,
            metadata_fetch_ms: 8_000,
        }
    }
}

/// Tool-calling loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub max_rounds: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            max_tokens: 1_024,
            temperature: 0.3,
        }
    }
}

/// Preflight classifier settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub simple_pattern: String,
    pub deep_pattern: String,
    pub max_tokens: u32,
    /// User text is cut to this many characters before it is sent.
    pub max_input_chars: usize,
    /// Send `response_format: json_object` with the classifier call.
    pub json_mode: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            simple_pattern: DEFAULT_SIMPLE_PATTERN.to_string(),
            deep_pattern: DEFAULT_DEEP_PATTERN.to_string(),
            max_tokens: 80,
            max_input_chars: 500,
            json_mode: true,
        }
    }
}

/// Content store location.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite path, or `:memory:`.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "site.db".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    /// When set, logs go to `<log_dir>/agent.log` instead of stderr.
    pub log_dir: Option<String>,
}

/// Top-level configuration (mirrors `admin-agent.yaml`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub tiers: TierTable,
    pub timeouts: TimeoutConfig,
    #[serde(rename = "loop")]
    pub tool_loop: LoopConfig,
    pub classifier: ClassifierConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            tiers: TierTable::default(),
            timeouts: TimeoutConfig::default(),
            tool_loop: LoopConfig::default(),
            classifier: ClassifierConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    [
        ("groq", "https://api.groq.com/openai/v1"),
        ("cerebras", "https://api.cerebras.ai/v1"),
        ("openrouter", "https://openrouter.ai/api/v1"),
    ]
    .into_iter()
    .map(|(name, url)| {
        (
            name.to_string(),
            ProviderConfig {
                base_url: url.to_string(),
            },
        )
    })
    .collect()
}

impl AgentConfig {
    /// Reject configurations the engine cannot run with.
    ///
    /// A candidate whose provider has no endpoint is only warned about: the
    /// fallback executor treats it as a configuration gap and moves on.
    pub fn validate(&self) -> Result<(), InferenceError> {
        for (name, tier) in [
            ("classifier", &self.tiers.classifier),
            ("fast", &self.tiers.fast),
            ("deep", &self.tiers.deep),
        ] {
            if tier.is_empty() {
                return Err(InferenceError::ConfigError {
                    reason: format!("tier '{name}' has no candidates"),
                });
            }
            for candidate in tier {
                if !self.providers.contains_key(&candidate.provider) {
                    tracing::warn!(
                        tier = name,
                        provider = %candidate.provider,
                        model = %candidate.model,
                        "candidate references unknown provider"
                    );
                }
            }
        }

        if self.tool_loop.max_rounds == 0 {
            return Err(InferenceError::ConfigError {
                reason: "loop.max_rounds must be at least 1".into(),
            });
        }

        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `ADMIN_AGENT_CONFIG` first, then walks upward from `start` looking
/// for `admin-agent.yaml`. Returns `None` when neither yields a file.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.is_file() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_PATH_ENV} does not point at a file");
    }

    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Load, interpolate and validate a config file.
pub fn load_config(path: &Path) -> Result<AgentConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config: AgentConfig =
        serde_yaml::from_str(&interpolate_env_vars(&raw)).map_err(|e| {
            InferenceError::ConfigError {
                reason: format!("failed to parse {}: {e}", path.display()),
            }
        })?;

    config.validate()?;
    Ok(config)
}

/// Load the config found from `start`, or fall back to built-in defaults.
pub fn load_or_default(start: &Path) -> Result<AgentConfig, InferenceError> {
    match find_config_path(start) {
        Some(path) => load_config(&path),
        None => {
            let config = AgentConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` occurrences.
///
/// An unterminated `${` is copied through unchanged.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                result.push_str(&resolve_var_expr(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tool_loop.max_rounds, 5);
        assert_eq!(config.timeouts.fast_ms, 12_000);
        assert_eq!(config.timeouts.deep_ms, 15_000);
        assert_eq!(config.timeouts.metadata_fetch_ms, 8_000);
        assert_eq!(config.classifier.max_tokens, 80);
        assert_eq!(config.classifier.max_input_chars, 500);
    }

    #[test]
    fn test_default_candidates_reference_known_providers() {
        let config = AgentConfig::default();
        let tiers = &config.tiers;
        for c in tiers.classifier.iter().chain(&tiers.fast).chain(&tiers.deep) {
            assert!(config.providers.contains_key(&c.provider), "{}", c.provider);
        }
    }

    #[test]
    fn test_interpolate_with_default() {
        std::env::remove_var("__ADMIN_AGENT_MISSING__");
        assert_eq!(
            interpolate_env_vars("path: ${__ADMIN_AGENT_MISSING__:-/srv/site.db}"),
            "path: /srv/site.db"
        );
    }

    #[test]
    fn test_interpolate_with_value() {
        std::env::set_var("__ADMIN_AGENT_URL__", "http://localhost:9000/v1");
        assert_eq!(
            interpolate_env_vars("base_url: ${__ADMIN_AGENT_URL__}"),
            "base_url: http://localhost:9000/v1"
        );
        std::env::remove_var("__ADMIN_AGENT_URL__");
    }

    #[test]
    fn test_interpolate_unterminated_is_kept() {
        assert_eq!(interpolate_env_vars("a ${B"), "a ${B");
        assert_eq!(interpolate_env_vars("plain"), "plain");
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
providers:
  local:
    base_url: "http://127.0.0.1:8080/v1"
tiers:
  classifier:
    - {{ provider: local, model: tiny, credential_key: LOCAL_KEY }}
  fast:
    - {{ provider: local, model: mid, expected_latency_ms: 900, credential_key: LOCAL_KEY }}
  deep:
    - {{ provider: local, model: big, credential_key: LOCAL_KEY }}
loop:
  max_rounds: 3
database:
  path: ":memory:"
logging:
  format: json
"#
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.tiers.fast[0].expected_latency_ms, 900);
        assert_eq!(config.tool_loop.max_rounds, 3);
        assert_eq!(config.tool_loop.max_tokens, 1_024);
        assert_eq!(config.timeouts.deep_ms, 15_000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.classifier.simple_pattern, DEFAULT_SIMPLE_PATTERN);
    }

    #[test]
    fn test_empty_tier_rejected() {
        let mut config = AgentConfig::default();
        config.tiers.deep.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("deep"));
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let mut config = AgentConfig::default();
        config.tool_loop.max_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_find_config_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{}").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        std::env::remove_var(CONFIG_PATH_ENV);
        let found = find_config_path(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
    }
}
