use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Export XML error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Unsupported document node type: {node_type}")]
    UnsupportedNodeType { node_type: String },

    #[error("Malformed document: {message}")]
    MalformedDocument { message: String },

    #[error("Malformed markup in comment {comment_id}: {message}")]
    MalformedMarkup { comment_id: String, message: String },

    #[error("Invalid timestamp '{value}': {message}")]
    InvalidTimestamp { value: String, message: String },

    #[error("Import job {job_id} failed: {diagnostics}")]
    TerminalImportFailure { job_id: u64, diagnostics: String },

    #[error("Import job {job_id} did not finish within {waited:?}")]
    PollTimeout { job_id: u64, waited: Duration },

    #[error("Issue #{issue_number} was created but overflow comments stopped after {posted} of {total}: {source}")]
    OverflowCommentsFailed {
        issue_number: u64,
        posted: usize,
        total: usize,
        source: Box<MigrationError>,
    },

    #[error("GraphQL request failed: {message}")]
    GraphQlError { message: String },

    #[error("Unexpected response {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Rendering,
    Import,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MigrationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ApiError(_) | Self::UnexpectedStatus { .. } | Self::GraphQlError { .. } => {
                ErrorCategory::Network
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::UnsupportedNodeType { .. }
            | Self::MalformedDocument { .. }
            | Self::MalformedMarkup { .. }
            | Self::XmlError(_) => ErrorCategory::Rendering,
            Self::TerminalImportFailure { .. }
            | Self::PollTimeout { .. }
            | Self::OverflowCommentsFailed { .. } => ErrorCategory::Import,
            Self::CsvError(_)
            | Self::IoError(_)
            | Self::SerializationError(_)
            | Self::ValidationError { .. }
            | Self::InvalidTimestamp { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 單一文件或單一 issue 的失敗，不影響其他 issue
            Self::UnsupportedNodeType { .. }
            | Self::MalformedMarkup { .. }
            | Self::XmlError(_)
            | Self::InvalidTimestamp { .. } => ErrorSeverity::Low,
            Self::ApiError(_)
            | Self::UnexpectedStatus { .. }
            | Self::GraphQlError { .. }
            | Self::PollTimeout { .. }
            | Self::TerminalImportFailure { .. }
            | Self::OverflowCommentsFailed { .. } => ErrorSeverity::Medium,
            Self::MalformedDocument { .. }
            | Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ValidationError { .. } => ErrorSeverity::High,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check network access and tokens, then re-run; migrated issues are skipped via the ledger"
            }
            ErrorCategory::Configuration => "Fix the configuration file and run again",
            ErrorCategory::Rendering => {
                "Inspect the source document; unsupported content must be handled before migrating it"
            }
            ErrorCategory::Import => {
                "Check the import job diagnostics on the sink and re-run for the failed issues"
            }
            ErrorCategory::Data => "Verify the input files and source data format",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::UnexpectedStatus { status, .. } => {
                format!("The issue tracker answered with HTTP {}", status)
            }
            Self::PollTimeout { job_id, .. } => {
                format!("Import job {} is still pending; it may finish later", job_id)
            }
            Self::MissingConfigError { field } => {
                format!("Configuration field '{}' is required", field)
            }
            other => other.to_string(),
        }
    }

    /// 目標 issue 已建立、但後續步驟失敗時的 issue 編號
    pub fn created_issue(&self) -> Option<u64> {
        match self {
            Self::OverflowCommentsFailed { issue_number, .. } => Some(*issue_number),
            _ => None,
        }
    }

    /// 是否為單一 issue 範圍的錯誤（不中止整批遷移）
    pub fn is_issue_scoped(&self) -> bool {
        !matches!(self.severity(), ErrorSeverity::Critical)
    }
}

impl From<toml::de::Error> for MigrationError {
    fn from(e: toml::de::Error) -> Self {
        MigrationError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering_errors_are_low_severity() {
        let err = MigrationError::UnsupportedNodeType {
            node_type: "panel".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Rendering);
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert!(err.is_issue_scoped());
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = MigrationError::MissingConfigError {
            field: "sink.token".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_issue_scoped());
        assert!(err.user_friendly_message().contains("sink.token"));
    }

    #[test]
    fn test_overflow_failure_keeps_issue_number() {
        let err = MigrationError::OverflowCommentsFailed {
            issue_number: 5,
            posted: 0,
            total: 3,
            source: Box::new(MigrationError::UnexpectedStatus {
                status: 422,
                url: "https://api.test/repos/acme/app/issues/5/comments".to_string(),
                body: String::new(),
            }),
        };
        assert_eq!(err.created_issue(), Some(5));
        assert_eq!(err.category(), ErrorCategory::Import);
        assert!(err.to_string().contains("422"));
        assert_eq!(
            MigrationError::GraphQlError {
                message: "x".to_string()
            }
            .created_issue(),
            None
        );
    }
}
