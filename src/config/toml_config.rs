use crate::adapters::github::{ClientSettings, ImportSettings, RateLimiter, RetryPolicy};
use crate::core::issue_builder::StatusRule;
use crate::utils::error::{MigrationError, Result};
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_repo_slug, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub user: String,
    pub api_token: String,
    pub jql: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// `owner/name`
    pub repo: String,
    pub token: String,
    /// Projects v2 看板標題，匯入的 issue 會加入該看板
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub min_mutation_spacing_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_seconds: 60,
            min_mutation_spacing_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_cap_seconds: u64,
    pub secondary_floor_seconds: u64,
    pub quota_buffer: u64,
    pub max_secondary_waits: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_seconds: 30,
            backoff_cap_seconds: 300,
            secondary_floor_seconds: 60,
            quota_buffer: 5,
            max_secondary_waits: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub poll_interval_ms: u64,
    pub poll_timeout_seconds: u64,
    pub inline_comment_cap: usize,
    pub comment_batch_size: usize,
    pub batch_pause_ms: u64,
    pub max_body_chars: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            poll_timeout_seconds: 30,
            inline_comment_cap: 100,
            comment_batch_size: 100,
            batch_pause_ms: 1000,
            max_body_chars: 65_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// 標籤白名單 CSV（`Labels` 欄）；未設定時保留全部來源標籤
    pub label_allow_list: Option<String>,
    /// 來源顯示名稱 → 目標平台帳號
    pub assignees: HashMap<String, String>,
    /// 要帶入內文的自訂欄位 id
    pub custom_fields: Vec<String>,
    pub custom_fields_heading: Option<String>,
    /// 覆寫預設的狀態對應
    pub status: Vec<StatusRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_ledger_path() -> String {
    "migration-ledger.json".to_string()
}

impl MigrationConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| MigrationError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed)?)
    }

    /// 替換環境變數 (例如 ${JIRA_TOKEN})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_RE
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.rate_limit.max_requests,
            Duration::from_secs(self.rate_limit.window_seconds),
            Duration::from_millis(self.rate_limit.min_mutation_spacing_ms),
        )
    }

    pub fn client_settings(&self) -> ClientSettings {
        let mut settings = ClientSettings::new(&self.sink.api_base_url, &self.sink.repo);
        settings.retry = RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff_base: Duration::from_secs(self.retry.backoff_base_seconds),
            backoff_cap: Duration::from_secs(self.retry.backoff_cap_seconds),
            secondary_floor: Duration::from_secs(self.retry.secondary_floor_seconds),
            quota_buffer: self.retry.quota_buffer,
            max_secondary_waits: self.retry.max_secondary_waits,
        };
        settings.import = ImportSettings {
            poll_interval: Duration::from_millis(self.import.poll_interval_ms),
            poll_timeout: Duration::from_secs(self.import.poll_timeout_seconds),
            inline_comment_cap: self.import.inline_comment_cap,
            comment_batch_size: self.import.comment_batch_size,
            batch_pause: Duration::from_millis(self.import.batch_pause_ms),
            max_body_chars: self.import.max_body_chars,
        };
        settings.project = self.sink.project.clone();
        settings
    }
}

impl Validate for MigrationConfig {
    fn validate(&self) -> Result<()> {
        validate_url("source.base_url", &self.source.base_url)?;
        validate_non_empty_string("source.user", &self.source.user)?;
        validate_non_empty_string("source.api_token", &self.source.api_token)?;
        validate_non_empty_string("source.jql", &self.source.jql)?;
        validate_range("source.page_size", self.source.page_size as u64, 1, 100)?;

        validate_url("sink.api_base_url", &self.sink.api_base_url)?;
        validate_repo_slug("sink.repo", &self.sink.repo)?;
        validate_non_empty_string("sink.token", &self.sink.token)?;
        if let Some(project) = &self.sink.project {
            validate_non_empty_string("sink.project", project)?;
        }

        for (field, value) in [("sink.token", &self.sink.token), ("source.api_token", &self.source.api_token)] {
            if ENV_VAR_RE.is_match(value) {
                return Err(MigrationError::InvalidConfigValueError {
                    field: field.to_string(),
                    value: value.clone(),
                    reason: "environment variable is not set".to_string(),
                });
            }
        }

        validate_positive_number("rate_limit.max_requests", self.rate_limit.max_requests, 1)?;
        validate_positive_number(
            "rate_limit.window_seconds",
            self.rate_limit.window_seconds as usize,
            1,
        )?;
        validate_positive_number("retry.max_attempts", self.retry.max_attempts as usize, 1)?;
        if self.retry.backoff_cap_seconds < self.retry.backoff_base_seconds {
            return Err(MigrationError::InvalidConfigValueError {
                field: "retry.backoff_cap_seconds".to_string(),
                value: self.retry.backoff_cap_seconds.to_string(),
                reason: "must be at least retry.backoff_base_seconds".to_string(),
            });
        }

        validate_positive_number("import.poll_interval_ms", self.import.poll_interval_ms as usize, 1)?;
        validate_range("import.inline_comment_cap", self.import.inline_comment_cap as u64, 0, 100)?;
        validate_positive_number("import.comment_batch_size", self.import.comment_batch_size, 1)?;
        validate_positive_number("import.max_body_chars", self.import.max_body_chars, 1)?;

        if let Some(path) = &self.mapping.label_allow_list {
            validate_path("mapping.label_allow_list", path)?;
            validate_file_extension("mapping.label_allow_list", path, &["csv"])?;
        }
        validate_path("ledger.path", &self.ledger.path)?;

        Ok(())
    }
}
