use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub storage: StorageConfig,
    pub sources: SourceConfig,
    pub scheduler: SchedulerConfig,
    pub render: RenderConfig,
    pub ocr: OcrConfig,
    pub llm: LlmConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `DOCFLOW_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("DOCFLOW_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            storage: StorageConfig::from_env_profiled(p),
            sources: SourceConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            render: RenderConfig::from_env_profiled(p),
            ocr: OcrConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:     data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  sources:     {} dir(s), extensions={}",
            self.sources.directories.len(),
            self.sources.extensions.join(",")
        );
        tracing::info!(
            "  scheduler:   tick={:?}, batch_size={}",
            self.scheduler.tick,
            self.scheduler.batch_size
        );
        tracing::info!("  render:      binary={}, density={}", self.render.binary, self.render.density);
        tracing::info!("  ocr:         binary={}, languages={}", self.ocr.binary, self.ocr.languages);
        tracing::info!(
            "  llm:         enabled={}, provider={}, configured={}",
            self.llm.enabled,
            self.llm.provider,
            self.llm.is_configured()
        );
    }

    /// Create the data and preview directories if missing.
    pub fn prepare_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.storage.data_dir, &self.storage.previews_dir()] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Directory {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

// ── Storage ───────────────────────────────────────────────────

const DATA_DIR_NAME: &str = ".docflow";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        let data_dir = profiled_env_opt(p, "DOCFLOW_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(DATA_DIR_NAME)))
            .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME));
        Self { data_dir }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("data.db")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.data_dir.join("previews")
    }
}

// ── Document sources ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directories scanned recursively for new documents.
    pub directories: Vec<PathBuf>,
    /// Lower-case file extensions without the dot.
    pub extensions: Vec<String>,
}

impl SourceConfig {
    fn from_env_profiled(p: &str) -> Self {
        let directories = profiled_env_opt(p, "DOCUMENT_SOURCES")
            .map(|raw| env::split_paths(&raw).filter(|d| !d.as_os_str().is_empty()).collect())
            .unwrap_or_default();
        let extensions = parse_extensions(&profiled_env_or(p, "DOCUMENT_EXTENSIONS", "pdf"));
        Self { directories, extensions }
    }

    /// Whether `path` carries one of the configured extensions.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Eligibility check period.
    pub tick: Duration,
    /// Items pulled per stage invocation.
    pub batch_size: usize,
    pub discover_interval: Duration,
    pub render_interval: Duration,
    pub extract_interval: Duration,
    pub analyze_interval: Duration,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let secs = |key: &str, default: u64| Duration::from_secs(profiled_env_parse(p, key, default));
        Self {
            tick: Duration::from_millis(profiled_env_parse(p, "SCHEDULER_TICK_MS", 1000)),
            batch_size: profiled_env_parse(p, "STAGE_BATCH_SIZE", 10usize).max(1),
            discover_interval: secs("DISCOVER_INTERVAL_SECS", 5),
            render_interval: secs("RENDER_INTERVAL_SECS", 15),
            extract_interval: secs("EXTRACT_INTERVAL_SECS", 10),
            analyze_interval: secs("ANALYZE_INTERVAL_SECS", 5),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            batch_size: 10,
            discover_interval: Duration::from_secs(5),
            render_interval: Duration::from_secs(15),
            extract_interval: Duration::from_secs(10),
            analyze_interval: Duration::from_secs(5),
        }
    }
}

// ── Render (ImageMagick) ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub binary: String,
    pub density: u32,
    pub quality: u32,
}

impl RenderConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            binary: profiled_env_or(p, "MAGICK_BINARY", "magick"),
            density: profiled_env_parse(p, "RENDER_DENSITY", 150),
            quality: profiled_env_parse(p, "RENDER_QUALITY", 90),
        }
    }
}

// ── OCR (Tesseract) ───────────────────────────────────────────

const DEFAULT_OCR_LANGUAGES: &str = "eng+deu+fra+ita+spa+por+nld+pol+ces+slv+hun+swe+fin+dan+nor";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub binary: String,
    pub tessdata_dir: Option<PathBuf>,
    pub languages: String,
    pub dpi: u32,
    pub psm: u32,
}

impl OcrConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            binary: profiled_env_or(p, "TESSERACT_BINARY", "tesseract"),
            tessdata_dir: profiled_env_opt(p, "TESSDATA_DIR").map(PathBuf::from),
            languages: profiled_env_or(p, "OCR_LANGUAGES", DEFAULT_OCR_LANGUAGES),
            dpi: profiled_env_parse(p, "OCR_DPI", 150),
            psm: profiled_env_parse(p, "OCR_PSM", 1),
        }
    }
}

// ── LLM analysis ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    /// "local", "openai", "deepseek", "ollama"
    pub provider: String,
    pub model_path: Option<PathBuf>,
    pub llama_binary: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub deepseek_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Maximum characters of document text sent to the backend.
    pub max_input_chars: usize,
    /// Extra instructions appended to the analysis prompt.
    pub custom_context: Option<String>,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enabled: profiled_env_bool(p, "LLM_ENABLED", false),
            provider: profiled_env_or(p, "LLM_PROVIDER", "local").to_lowercase(),
            model_path: profiled_env_opt(p, "LLM_MODEL_PATH").map(PathBuf::from),
            llama_binary: profiled_env_or(p, "LLAMA_BINARY", "llama-cli"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            deepseek_api_key: profiled_env_opt(p, "DEEPSEEK_API_KEY"),
            deepseek_model: profiled_env_or(p, "DEEPSEEK_MODEL", "deepseek-chat"),
            ollama_url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            ollama_model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
            temperature: profiled_env_parse(p, "LLM_TEMPERATURE", 0.7),
            max_tokens: profiled_env_parse(p, "LLM_MAX_TOKENS", 1024),
            max_input_chars: profiled_env_parse(p, "LLM_MAX_INPUT_CHARS", 4000),
            custom_context: profiled_env_opt(p, "LLM_CUSTOM_CONTEXT"),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "local" => self.model_path.is_some(),
            "openai" => self.openai_api_key.is_some(),
            "deepseek" => self.deepseek_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}
