use crate::corpus::{CorpusLocator, DEFAULT_CANDIDATES, DEFAULT_DATA_DIR, LoadOptions};
use crate::error::ConfigError;
use crate::generation::{DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::search::{DEFAULT_LIMIT, SearchOptions};
use std::path::PathBuf;
use std::time::Duration;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const MODEL_VAR: &str = "OPENAI_MODEL";
pub const API_BASE_VAR: &str = "OPENAI_BASE_URL";
pub const TIMEOUT_VAR: &str = "OPENAI_TIMEOUT_SECS";
pub const DATA_DIR_VAR: &str = "URANTIA_DATA_DIR";
pub const SEARCH_LIMIT_VAR: &str = "URANTIA_SEARCH_LIMIT";
pub const SKIP_BLANK_VAR: &str = "URANTIA_SKIP_BLANK_LINES";
pub const TRIM_LINES_VAR: &str = "URANTIA_TRIM_LINES";

/// Start-up configuration. Built once and read-only afterwards.
#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub request_timeout: Option<Duration>,
    pub data_dir: PathBuf,
    pub candidates: Vec<String>,
    pub search_limit: usize,
    pub skip_blank_lines: bool,
    pub trim_lines: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .field("data_dir", &self.data_dir)
            .field("candidates", &self.candidates)
            .field("search_limit", &self.search_limit)
            .field("skip_blank_lines", &self.skip_blank_lines)
            .field("trim_lines", &self.trim_lines)
            .finish()
    }
}

impl Settings {
    /// Reads settings from the process environment, loading `.env` first
    /// when one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves settings through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = get(API_KEY_VAR).ok_or(ConfigError::MissingApiKey)?;
        let search_limit = match get(SEARCH_LIMIT_VAR) {
            Some(raw) => parse_positive(SEARCH_LIMIT_VAR, &raw)?,
            None => DEFAULT_LIMIT,
        };
        let request_timeout = get(TIMEOUT_VAR)
            .map(|raw| parse_positive(TIMEOUT_VAR, &raw).map(|secs| Duration::from_secs(secs as u64)))
            .transpose()?;

        Ok(Self {
            api_key,
            model: get(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: get(API_BASE_VAR).unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            request_timeout,
            data_dir: get(DATA_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            candidates: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            search_limit,
            skip_blank_lines: get(SKIP_BLANK_VAR).map(|v| parse_flag(&v)).unwrap_or(false),
            trim_lines: get(TRIM_LINES_VAR).map(|v| parse_flag(&v)).unwrap_or(false),
        })
    }

    pub fn locator(&self) -> CorpusLocator {
        CorpusLocator {
            data_dir: self.data_dir.clone(),
            candidates: self.candidates.clone(),
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            skip_blank_lines: self.skip_blank_lines,
        }
    }

    /// Search options used for the passage list and the generation prompt.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            limit: self.search_limit,
            trim_lines: self.trim_lines,
            ..SearchOptions::default()
        }
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(err) => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
            reason: err.to_string(),
        }),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
