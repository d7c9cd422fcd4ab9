use crate::domain::model::{ImportComment, ImportIssue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// `POST /repos/{repo}/import/issues` 的請求內容
#[derive(Debug, Serialize)]
pub struct ImportRequest<'a> {
    pub issue: &'a ImportIssue,
    pub comments: &'a [ImportComment],
}

/// 同步建立（201）時的回應
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
}

/// 非同步受理（202）時的工作描述
#[derive(Debug, Clone, Deserialize)]
pub struct ImportAccepted {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    pub url: String,
}

/// `GET {status_url}` 的回應
#[derive(Debug, Clone, Deserialize)]
pub struct ImportStatus {
    pub status: String,
    #[serde(default)]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub errors: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentRequest<'a> {
    pub body: &'a str,
}

/// GraphQL 回應外層
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct GraphQlResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlMessage {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryData<T> {
    pub repository: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryProjects {
    #[serde(rename = "projectsV2")]
    pub projects: ProjectConnection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConnection {
    #[serde(default)]
    pub nodes: Vec<ProjectNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectNode {
    pub id: String,
    #[serde(default)]
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryIssue {
    pub issue: Option<NodeId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeId {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportJobState {
    Submitted,
    Pending,
    Imported { issue_number: u64 },
    Failed { diagnostics: String },
    TimedOut,
}

impl ImportJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Imported { .. } | Self::Failed { .. } | Self::TimedOut
        )
    }
}

/// 匯入工作的狀態機：submitted → pending → {imported, failed, timedOut}
///
/// 進入終止狀態後不再變動；重試由送出端決定，不記錄在這裡。
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub job_id: u64,
    pub status_url: String,
    pub submit_time: Instant,
    state: ImportJobState,
}

impl ImportJob {
    pub fn submitted(accepted: &ImportAccepted) -> Self {
        Self {
            job_id: accepted.id,
            status_url: accepted.url.clone(),
            submit_time: Instant::now(),
            state: ImportJobState::Submitted,
        }
    }

    pub fn state(&self) -> &ImportJobState {
        &self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.submit_time.elapsed()
    }

    /// 依輪詢結果推進狀態
    pub fn observe(&mut self, status: &ImportStatus) -> &ImportJobState {
        if self.state.is_terminal() {
            return &self.state;
        }

        self.state = match status.status.as_str() {
            "pending" => ImportJobState::Pending,
            "imported" => match status.issue_url.as_deref().and_then(issue_number_from_url) {
                Some(issue_number) => ImportJobState::Imported { issue_number },
                None => ImportJobState::Failed {
                    diagnostics: format!(
                        "job reported imported without a usable issue_url ({:?})",
                        status.issue_url
                    ),
                },
            },
            "failed" => ImportJobState::Failed {
                diagnostics: status
                    .errors
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "no diagnostics returned".to_string()),
            },
            other => {
                tracing::warn!(
                    "⚠️ Import job {} reported unknown status '{}', treating as pending",
                    self.job_id,
                    other
                );
                ImportJobState::Pending
            }
        };
        &self.state
    }

    pub fn time_out(&mut self) {
        if !self.state.is_terminal() {
            self.state = ImportJobState::TimedOut;
        }
    }
}

/// `.../issues/42` → 42
pub fn issue_number_from_url(url: &str) -> Option<u64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> ImportJob {
        ImportJob::submitted(&ImportAccepted {
            id: 9,
            status: "pending".to_string(),
            url: "https://api.github.com/repos/o/r/import/issues/9".to_string(),
        })
    }

    fn status(value: Value) -> ImportStatus {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_issue_number_from_url() {
        assert_eq!(
            issue_number_from_url("https://api.github.com/repos/o/r/issues/42"),
            Some(42)
        );
        assert_eq!(issue_number_from_url("https://x/issues/7/"), Some(7));
        assert_eq!(issue_number_from_url("https://x/issues/abc"), None);
    }

    #[tokio::test]
    async fn test_job_moves_through_pending_to_imported() {
        let mut job = job();
        assert_eq!(job.state(), &ImportJobState::Submitted);

        job.observe(&status(json!({"status": "pending"})));
        assert_eq!(job.state(), &ImportJobState::Pending);

        job.observe(&status(json!({
            "status": "imported",
            "issue_url": "https://api.github.com/repos/o/r/issues/12"
        })));
        assert_eq!(job.state(), &ImportJobState::Imported { issue_number: 12 });
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let mut job = job();
        job.observe(&status(json!({"status": "failed", "errors": [{"code": "invalid"}]})));
        assert!(matches!(job.state(), ImportJobState::Failed { diagnostics } if diagnostics.contains("invalid")));

        job.observe(&status(json!({"status": "imported", "issue_url": "https://x/issues/1"})));
        job.time_out();
        assert!(matches!(job.state(), ImportJobState::Failed { .. }));
    }

    #[test]
    fn test_import_request_shape() {
        let issue = ImportIssue {
            title: "[PRJ-1] Crash".to_string(),
            body: "body".to_string(),
            created_at: "2021-01-22T10:11:47Z".to_string(),
            closed: true,
            labels: vec!["bug".to_string()],
            assignee: None,
        };
        let comments = vec![ImportComment {
            body: "c".to_string(),
            created_at: "2021-01-23T10:00:00Z".to_string(),
        }];
        let value = serde_json::to_value(ImportRequest {
            issue: &issue,
            comments: &comments,
        })
        .unwrap();
        assert_eq!(value["issue"]["closed"], json!(true));
        assert_eq!(value["comments"][0]["created_at"], json!("2021-01-23T10:00:00Z"));
    }
}
