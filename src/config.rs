//! Configuration loading and merging.
//!
//! Settings come from four places, lowest precedence first: built-in
//! defaults, the YAML params file, environment variables (credentials
//! only, surfaced through clap's `env` fallbacks), and CLI flags. The
//! merged result is a fully validated [`RunContext`]; invalid or missing
//! required settings abort the run before any network call.

use crate::cli::Cli;
use crate::error::ConfigError;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, warn};

/// Which collection phases the `run` subcommand executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    Un,
    Press,
    #[default]
    Both,
}

impl SourceMode {
    /// Parse the `SOURCES` setting; unrecognized values fall back to
    /// [`SourceMode::Both`] with a warning.
    pub fn parse(raw: &str) -> SourceMode {
        match raw.trim().to_lowercase().as_str() {
            "un" => SourceMode::Un,
            "press" => SourceMode::Press,
            "both" => SourceMode::Both,
            other => {
                warn!(value = other, "Unknown SOURCES value; defaulting to both");
                SourceMode::Both
            }
        }
    }

    pub fn includes_press(&self) -> bool {
        matches!(self, SourceMode::Press | SourceMode::Both)
    }

    pub fn includes_un(&self) -> bool {
        matches!(self, SourceMode::Un | SourceMode::Both)
    }
}

/// Raw shape of the YAML params file. Every key is optional; merging and
/// validation happen in [`load`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ParamsFile {
    pub countries_file: Option<String>,
    pub cutoff_date: Option<String>,
    pub limit_guardian: Option<usize>,
    pub limit_aljazeera: Option<usize>,
    pub limit_un: Option<usize>,
    pub sources: Option<String>,
    pub out: Option<String>,
    #[serde(deserialize_with = "de_flag")]
    pub fulltext: Option<bool>,
    pub info_limit: Option<usize>,
    pub email_min_items: Option<usize>,
    pub email_words_min: Option<usize>,
    pub email_words_max: Option<usize>,
    pub concurrency: Option<usize>,
    pub rate_limit_ms: Option<u64>,
    pub run_timeout_secs: Option<u64>,
    pub guardian_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Accept booleans, 0/1 integers, and the usual truthy strings for flags,
/// since hand-edited params files use all three.
fn de_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(value.map(|v| truthy(&v)))
}

fn truthy(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::Bool(b) => *b,
        serde_yaml::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_yaml::Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        _ => false,
    }
}

/// Immutable, validated settings for one invocation. Shared by reference
/// across all concurrent country workers.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Display names, in countries-file order.
    pub countries: Vec<String>,
    pub cutoff: NaiveDate,
    pub limit_guardian: usize,
    pub limit_aljazeera: usize,
    pub limit_un: usize,
    pub sources: SourceMode,
    pub out_root: PathBuf,
    pub fulltext: bool,
    pub info_limit: usize,
    pub email_min_items: usize,
    pub email_words_min: usize,
    pub email_words_max: usize,
    pub concurrency: usize,
    pub rate_limit: Duration,
    /// Absolute deadline derived from `RUN_TIMEOUT_SECS`, if set.
    pub deadline: Option<Instant>,
    pub guardian_api_key: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl RunContext {
    /// Run directory for this cutoff: `<out_root>/<YYYYMMDD>/`.
    pub fn run_dir(&self) -> PathBuf {
        self.out_root.join(self.cutoff.format("%Y%m%d").to_string())
    }

    pub fn text_dir(&self) -> PathBuf {
        self.run_dir().join("text")
    }

    pub fn info_dir(&self) -> PathBuf {
        self.run_dir().join("info")
    }

    pub fn emails_dir(&self) -> PathBuf {
        self.run_dir().join("emails")
    }

    pub fn index_path(&self) -> PathBuf {
        self.run_dir().join("_index.csv")
    }

    pub fn partial_marker(&self) -> PathBuf {
        self.run_dir().join("_partial")
    }

    pub fn past_deadline(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

#[cfg(test)]
impl RunContext {
    /// Baseline context for unit tests; callers override fields as needed.
    pub(crate) fn for_tests(out_root: &Path) -> Self {
        RunContext {
            countries: vec!["Testland".to_string()],
            cutoff: NaiveDate::from_ymd_opt(2025, 8, 25).unwrap(),
            limit_guardian: 5,
            limit_aljazeera: 5,
            limit_un: 8,
            sources: SourceMode::Both,
            out_root: out_root.to_path_buf(),
            fulltext: false,
            info_limit: 5,
            email_min_items: 1,
            email_words_min: 80,
            email_words_max: 120,
            concurrency: 2,
            rate_limit: Duration::from_millis(1),
            deadline: None,
            guardian_api_key: "test".to_string(),
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-mini".to_string(),
            temperature: 1.0,
        }
    }
}

/// Load, merge, and validate settings for the given CLI invocation.
pub async fn load(cli: &Cli) -> Result<RunContext, ConfigError> {
    let params = read_params_file(Path::new(&cli.config)).await?;

    let countries_path = cli
        .countries
        .clone()
        .or_else(|| params.countries_file.clone())
        .ok_or(ConfigError::Missing("COUNTRIES_FILE"))?;
    let countries = read_countries(Path::new(&countries_path)).await?;

    let cutoff_raw = cli
        .cutoff
        .clone()
        .or_else(|| params.cutoff_date.clone())
        .ok_or(ConfigError::Missing("CUTOFF_DATE"))?;
    let cutoff = NaiveDate::parse_from_str(cutoff_raw.trim(), "%Y-%m-%d").map_err(|e| {
        ConfigError::Invalid {
            name: "CUTOFF_DATE",
            value: cutoff_raw.clone(),
            reason: format!("expected YYYY-MM-DD: {e}"),
        }
    })?;

    let out_root = PathBuf::from(
        cli.out
            .clone()
            .or_else(|| params.out.clone())
            .unwrap_or_else(|| "outputs".to_string()),
    );

    let sources = SourceMode::parse(params.sources.as_deref().unwrap_or("both"));

    let limit_guardian = require_nonzero("LIMIT_GUARDIAN", params.limit_guardian.unwrap_or(5))?;
    let limit_aljazeera = require_nonzero("LIMIT_ALJAZEERA", params.limit_aljazeera.unwrap_or(5))?;
    let limit_un = require_nonzero("LIMIT_UN", params.limit_un.unwrap_or(32))?;
    let info_limit = require_nonzero("INFO_LIMIT", params.info_limit.unwrap_or(5))?;
    let concurrency = require_nonzero("CONCURRENCY", params.concurrency.unwrap_or(4))?;

    let email_min_items = params.email_min_items.unwrap_or(1);
    let email_words_min = params.email_words_min.unwrap_or(80);
    let email_words_max = params.email_words_max.unwrap_or(120);
    if email_words_min > email_words_max {
        return Err(ConfigError::Invalid {
            name: "EMAIL_WORDS_MIN",
            value: email_words_min.to_string(),
            reason: format!("must not exceed EMAIL_WORDS_MAX ({email_words_max})"),
        });
    }

    let rate_limit_ms = params.rate_limit_ms.unwrap_or(600);
    if rate_limit_ms == 0 {
        return Err(ConfigError::Invalid {
            name: "RATE_LIMIT_MS",
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let deadline = params
        .run_timeout_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    // clap already applied env fallbacks for the two credentials, so CLI
    // beats env beats params file here.
    let guardian_api_key = cli
        .guardian_api_key
        .clone()
        .or_else(|| params.guardian_api_key.clone())
        .unwrap_or_else(|| "test".to_string());
    let openai_api_key = cli
        .openai_api_key
        .clone()
        .or_else(|| params.openai_api_key.clone())
        .filter(|key| !key.trim().is_empty());
    if cli.command.needs_collaborator() && openai_api_key.is_none() {
        return Err(ConfigError::Missing("OPENAI_API_KEY"));
    }

    Ok(RunContext {
        countries,
        cutoff,
        limit_guardian,
        limit_aljazeera,
        limit_un,
        sources,
        out_root,
        fulltext: cli.fulltext || params.fulltext.unwrap_or(false),
        info_limit,
        email_min_items,
        email_words_min,
        email_words_max,
        concurrency,
        rate_limit: Duration::from_millis(rate_limit_ms),
        deadline,
        guardian_api_key,
        openai_api_key,
        openai_base_url: params
            .openai_base_url
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        model: params.model.unwrap_or_else(|| "gpt-4.1-mini".to_string()),
        temperature: params.temperature.unwrap_or(1.0),
    })
}

fn require_nonzero(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

/// Read the params file if it exists; a missing file is an empty config,
/// a present-but-unparseable file is an error.
async fn read_params_file(path: &Path) -> Result<ParamsFile, ConfigError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No params file; using defaults");
            return Ok(ParamsFile::default());
        }
        Err(e) => {
            return Err(ConfigError::ParamsFile {
                path: path.display().to_string(),
                detail: e.to_string(),
            });
        }
    };
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::ParamsFile {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}

/// Read the countries list: one display name per line, `#` comments and
/// blank lines skipped. An empty result is a configuration error.
async fn read_countries(path: &Path) -> Result<Vec<String>, ConfigError> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::CountriesFile {
            path: path.display().to_string(),
            source: e,
        })?;
    let countries: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if countries.is_empty() {
        return Err(ConfigError::Invalid {
            name: "COUNTRIES_FILE",
            value: path.display().to_string(),
            reason: "contains no countries".to_string(),
        });
    }
    Ok(countries)
}
