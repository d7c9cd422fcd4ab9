use super::models::{
    CommentRequest, CreatedIssue, GraphQlResponse, ImportAccepted, ImportJob, ImportJobState,
    ImportRequest, ImportStatus, RepositoryData, RepositoryIssue, RepositoryProjects,
};
use super::rate_limiter::{RateLimiter, RequestKind};
use crate::adapters::http::{ApiResponse, Auth, HttpTransport, ReqwestTransport};
use crate::domain::model::{ImportComment, IssueImport};
use crate::domain::ports::IssueSink;
use crate::utils::error::{MigrationError, Result};
use crate::utils::text::truncate_chars;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// 匯入 API 仍為預覽版，必須帶這個 Accept header
pub const IMPORT_ACCEPT_HEADER: &str = "application/vnd.github.golden-comet-preview+json";

const LIST_PROJECTS_QUERY: &str = r#"
query($owner: String!, $repo: String!) {
  repository(owner: $owner, name: $repo) {
    projectsV2(first: 100) { nodes { id number title } }
  }
}"#;

const ISSUE_NODE_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!) {
  repository(owner: $owner, name: $repo) {
    issue(number: $number) { id }
  }
}"#;

const ADD_PROJECT_ITEM_MUTATION: &str = r#"
mutation($projectId: ID!, $contentId: ID!) {
  addProjectV2ItemById(input: {projectId: $projectId, contentId: $contentId}) {
    item { id }
  }
}"#;

/// 重試與退避策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// 次級限流沒有 Retry-After 時的最短等待
    pub secondary_floor: Duration,
    /// 剩餘額度低於此值時主動等待重置
    pub quota_buffer: u64,
    pub max_secondary_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(300),
            secondary_floor: Duration::from_secs(60),
            quota_buffer: 5,
            max_secondary_waits: 10,
        }
    }
}

impl RetryPolicy {
    /// `base * 2^attempt`，不超過上限
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.backoff_cap)
    }
}

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub inline_comment_cap: usize,
    pub comment_batch_size: usize,
    pub batch_pause: Duration,
    pub max_body_chars: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            poll_timeout: Duration::from_secs(30),
            inline_comment_cap: 100,
            comment_batch_size: 100,
            batch_pause: Duration::from_secs(1),
            max_body_chars: 65_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base_url: String,
    /// `owner/name`
    pub repo: String,
    pub retry: RetryPolicy,
    pub import: ImportSettings,
    /// 匯入後加入的 Projects v2 看板名稱
    pub project: Option<String>,
}

impl ClientSettings {
    pub fn new(api_base_url: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            repo: repo.into(),
            retry: RetryPolicy::default(),
            import: ImportSettings::default(),
            project: None,
        }
    }
}

/// 回應分類，只在重試迴圈內使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseClass {
    Success,
    /// 次級限流：等待後重送，不計入重試次數
    TransientRateLimit,
    /// 其他 403/429 與 5xx：指數退避並計入重試次數
    TransientServerError,
    Terminal,
}

fn classify(response: &ApiResponse) -> ResponseClass {
    match response.status {
        200..=299 => ResponseClass::Success,
        403 | 429
            if response
                .message()
                .to_ascii_lowercase()
                .contains("secondary rate limit") =>
        {
            ResponseClass::TransientRateLimit
        }
        403 | 429 | 500..=599 => ResponseClass::TransientServerError,
        _ => ResponseClass::Terminal,
    }
}

fn seconds_until_reset(response: &ApiResponse) -> Option<Duration> {
    let reset = response.header_u64("x-ratelimit-reset")? as i64;
    let now = chrono::Utc::now().timestamp();
    Some(Duration::from_secs(reset.saturating_sub(now).max(0) as u64))
}

/// 匯入 API 的寫入端
pub struct GithubClient<T: HttpTransport> {
    transport: T,
    limiter: Arc<RateLimiter>,
    settings: ClientSettings,
    project_id: OnceCell<String>,
}

impl GithubClient<ReqwestTransport> {
    pub fn with_token(
        token: impl Into<String>,
        limiter: Arc<RateLimiter>,
        settings: ClientSettings,
    ) -> Result<Self> {
        let transport = ReqwestTransport::new(Auth::Token(token.into()), IMPORT_ACCEPT_HEADER)?;
        Ok(Self::new(transport, limiter, settings))
    }
}

impl<T: HttpTransport> GithubClient<T> {
    pub fn new(transport: T, limiter: Arc<RateLimiter>, settings: ClientSettings) -> Self {
        Self {
            transport,
            limiter,
            settings,
            project_id: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn import_url(&self) -> String {
        format!(
            "{}/repos/{}/import/issues",
            self.settings.api_base_url, self.settings.repo
        )
    }

    fn graphql_url(&self) -> String {
        format!("{}/graphql", self.settings.api_base_url)
    }

    fn repo_parts(&self) -> (&str, &str) {
        self.settings
            .repo
            .split_once('/')
            .unwrap_or((self.settings.repo.as_str(), ""))
    }

    fn comments_url(&self, issue_number: u64) -> String {
        format!(
            "{}/repos/{}/issues/{}/comments",
            self.settings.api_base_url, self.settings.repo, issue_number
        )
    }

    /// 所有對外請求共用的重試迴圈
    ///
    /// 重試用完時回傳最後一個回應，由呼叫端決定如何回報。
    pub async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        kind: RequestKind,
    ) -> Result<ApiResponse> {
        let policy = &self.settings.retry;
        let mut attempt: u32 = 0;
        let mut secondary_waits: u32 = 0;

        loop {
            self.limiter.acquire(kind).await;

            let response = match self.transport.send(method.clone(), url, body).await {
                Ok(response) => response,
                Err(e) => {
                    attempt += 1;
                    if attempt >= policy.max_attempts {
                        tracing::error!("❌ {} {} failed after {} attempts: {}", method, url, attempt, e);
                        return Err(e);
                    }
                    let wait = policy.backoff_for(attempt - 1);
                    tracing::warn!(
                        "⚠️ {} {} failed ({}), retrying in {:?} (attempt {}/{})",
                        method,
                        url,
                        e,
                        wait,
                        attempt + 1,
                        policy.max_attempts
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            self.respect_quota(&response).await;

            match classify(&response) {
                ResponseClass::Success | ResponseClass::Terminal => return Ok(response),
                ResponseClass::TransientRateLimit => {
                    if secondary_waits >= policy.max_secondary_waits {
                        tracing::error!(
                            "❌ Still hitting the secondary rate limit after {} waits on {}",
                            secondary_waits,
                            url
                        );
                        return Ok(response);
                    }
                    secondary_waits += 1;
                    let wait = self.secondary_wait(&response);
                    tracing::warn!(
                        "🐢 Secondary rate limit on {} {}, waiting {:?}",
                        method,
                        url,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                ResponseClass::TransientServerError => {
                    attempt += 1;
                    if attempt >= policy.max_attempts {
                        tracing::error!(
                            "❌ {} {} answered {} after {} attempts: {}",
                            method,
                            url,
                            response.status,
                            attempt,
                            response.message()
                        );
                        return Ok(response);
                    }
                    let wait = policy.backoff_for(attempt - 1);
                    tracing::warn!(
                        "⚠️ {} {} answered {}, retrying in {:?} (attempt {}/{})",
                        method,
                        url,
                        response.status,
                        wait,
                        attempt + 1,
                        policy.max_attempts
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn secondary_wait(&self, response: &ApiResponse) -> Duration {
        if let Some(seconds) = response.header_u64("retry-after") {
            return Duration::from_secs(seconds);
        }
        let floor = self.settings.retry.secondary_floor;
        seconds_until_reset(response)
            .map(|until_reset| until_reset.max(floor))
            .unwrap_or(floor)
    }

    /// 剩餘額度低於緩衝值時，不論這次是否成功都先等到額度重置
    async fn respect_quota(&self, response: &ApiResponse) {
        let Some(remaining) = response.header_u64("x-ratelimit-remaining") else {
            return;
        };
        if remaining >= self.settings.retry.quota_buffer {
            return;
        }

        let wait = seconds_until_reset(response)
            .map(|d| d + Duration::from_secs(1))
            .unwrap_or(self.settings.retry.secondary_floor);
        tracing::warn!(
            "⏳ Only {} requests left in the quota, sleeping {:?} until reset",
            remaining,
            wait
        );
        tokio::time::sleep(wait).await;
    }

    fn unexpected(url: &str, response: ApiResponse) -> MigrationError {
        MigrationError::UnexpectedStatus {
            status: response.status,
            url: url.to_string(),
            body: response.body,
        }
    }

    /// 送出匯入，必要時輪詢工作狀態，再補送超出上限的留言
    pub async fn submit_import(&self, import: &IssueImport) -> Result<u64> {
        let cap = self.settings.import.inline_comment_cap;
        let split = import.comments.len().min(cap);
        let (inline, overflow) = import.comments.split_at(split);

        let payload = serde_json::to_value(ImportRequest {
            issue: &import.issue,
            comments: inline,
        })?;

        let url = self.import_url();
        tracing::info!(
            "📤 Importing {} with {} inline comment(s)",
            import.source_key,
            inline.len()
        );
        let response = self
            .send_with_retry(Method::POST, &url, Some(&payload), RequestKind::Mutating)
            .await?;

        let issue_number = match response.status {
            201 => response.json::<CreatedIssue>()?.number,
            202 => {
                let accepted: ImportAccepted = response.json()?;
                tracing::debug!(
                    "🕓 Import job {} accepted with status '{}'",
                    accepted.id,
                    accepted.status
                );
                self.poll_job(&accepted).await?
            }
            _ => return Err(Self::unexpected(&url, response)),
        };

        // 留言失敗時 issue 已存在，仍要加入看板，錯誤帶著 issue 編號回報
        let overflow_result = if overflow.is_empty() {
            Ok(())
        } else {
            self.post_overflow(issue_number, overflow).await
        };

        if self.settings.project.is_some() {
            self.attach_to_project(&import.source_key, issue_number).await;
        }

        overflow_result?;
        tracing::info!("✅ {} imported as #{}", import.source_key, issue_number);
        Ok(issue_number)
    }

    /// 以固定間隔輪詢，直到終止狀態或逾時；逾時後不再重試這個工作
    pub async fn poll_job(&self, accepted: &ImportAccepted) -> Result<u64> {
        let mut job = ImportJob::submitted(accepted);
        let import = &self.settings.import;

        loop {
            tokio::time::sleep(import.poll_interval).await;

            let response = self
                .send_with_retry(Method::GET, &job.status_url, None, RequestKind::Read)
                .await?;
            if !response.is_success() {
                return Err(Self::unexpected(&job.status_url, response));
            }
            let status: ImportStatus = response.json()?;

            match job.observe(&status).clone() {
                ImportJobState::Imported { issue_number } => return Ok(issue_number),
                ImportJobState::Failed { diagnostics } => {
                    tracing::error!("❌ Import job {} failed: {}", job.job_id, diagnostics);
                    return Err(MigrationError::TerminalImportFailure {
                        job_id: job.job_id,
                        diagnostics,
                    });
                }
                _ => {}
            }

            if job.elapsed() >= import.poll_timeout {
                job.time_out();
                tracing::error!(
                    "⌛ Import job {} still pending after {:?}",
                    job.job_id,
                    job.elapsed()
                );
                return Err(MigrationError::PollTimeout {
                    job_id: job.job_id,
                    waited: job.elapsed(),
                });
            }
        }
    }

    /// 依序送出超出上限的留言，每批依長度上限拆成一則或多則留言
    async fn post_overflow(&self, issue_number: u64, overflow: &[ImportComment]) -> Result<()> {
        let import = &self.settings.import;
        let url = self.comments_url(issue_number);
        let batch_size = import.comment_batch_size.max(1);
        let bodies: Vec<(String, usize)> = overflow
            .chunks(batch_size)
            .flat_map(|batch| compose_batches(batch, import.max_body_chars))
            .collect();
        let total = overflow.len();
        let mut posted = 0;

        for (index, (body, count)) in bodies.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(import.batch_pause).await;
            }

            tracing::info!(
                "💬 Posting overflow comment {}/{} ({} comments) to #{}",
                index + 1,
                bodies.len(),
                count,
                issue_number
            );
            if let Err(source) = self.post_comment(&url, body).await {
                tracing::error!(
                    "❌ Overflow comments for #{} stopped after {} of {}: {}",
                    issue_number,
                    posted,
                    total,
                    source
                );
                return Err(MigrationError::OverflowCommentsFailed {
                    issue_number,
                    posted,
                    total,
                    source: Box::new(source),
                });
            }
            posted += count;
        }
        Ok(())
    }

    async fn post_comment(&self, url: &str, body: &str) -> Result<()> {
        let payload = serde_json::to_value(CommentRequest { body })?;
        let response = self
            .send_with_retry(Method::POST, url, Some(&payload), RequestKind::Mutating)
            .await?;
        if !response.is_success() {
            return Err(Self::unexpected(url, response));
        }
        Ok(())
    }

    /// GraphQL 查詢同樣走共用的重試迴圈
    async fn graphql<D: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        kind: RequestKind,
    ) -> Result<D> {
        let url = self.graphql_url();
        let payload = json!({ "query": query, "variables": variables });
        let response = self
            .send_with_retry(Method::POST, &url, Some(&payload), kind)
            .await?;
        if !response.is_success() {
            return Err(Self::unexpected(&url, response));
        }

        let parsed: GraphQlResponse<D> = response.json()?;
        if !parsed.errors.is_empty() {
            let message = parsed
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(MigrationError::GraphQlError { message });
        }
        parsed.data.ok_or_else(|| MigrationError::GraphQlError {
            message: "response carried no data".to_string(),
        })
    }

    /// 依標題找出儲存庫的 Projects v2 看板
    pub async fn find_project(&self, title: &str) -> Result<String> {
        let (owner, repo) = self.repo_parts();
        let data: RepositoryData<RepositoryProjects> = self
            .graphql(
                LIST_PROJECTS_QUERY,
                json!({ "owner": owner, "repo": repo }),
                RequestKind::Read,
            )
            .await?;

        data.repository
            .into_iter()
            .flat_map(|r| r.projects.nodes)
            .find(|node| node.title == title)
            .map(|node| {
                tracing::debug!("📋 Project '{}' is #{} ({})", title, node.number, node.id);
                node.id
            })
            .ok_or_else(|| MigrationError::InvalidConfigValueError {
                field: "sink.project".to_string(),
                value: title.to_string(),
                reason: format!("No project with this title in {}", self.settings.repo),
            })
    }

    /// 設定的看板 id，第一次呼叫時查詢後快取
    pub async fn project_id(&self) -> Result<Option<&str>> {
        let Some(title) = &self.settings.project else {
            return Ok(None);
        };
        let id = self
            .project_id
            .get_or_try_init(|| self.find_project(title))
            .await?;
        Ok(Some(id.as_str()))
    }

    /// 把 issue 加入看板
    pub async fn add_to_project(&self, project_id: &str, issue_number: u64) -> Result<()> {
        let (owner, repo) = self.repo_parts();
        let data: RepositoryData<RepositoryIssue> = self
            .graphql(
                ISSUE_NODE_QUERY,
                json!({ "owner": owner, "repo": repo, "number": issue_number }),
                RequestKind::Read,
            )
            .await?;
        let content_id = data
            .repository
            .and_then(|r| r.issue)
            .map(|issue| issue.id)
            .ok_or_else(|| MigrationError::GraphQlError {
                message: format!("issue #{} not found in {}", issue_number, self.settings.repo),
            })?;

        let _: Value = self
            .graphql(
                ADD_PROJECT_ITEM_MUTATION,
                json!({ "projectId": project_id, "contentId": content_id }),
                RequestKind::Mutating,
            )
            .await?;
        Ok(())
    }

    /// 看板失敗不影響匯入結果，只記錄錯誤
    async fn attach_to_project(&self, source_key: &str, issue_number: u64) {
        let result = match self.project_id().await {
            Ok(Some(project_id)) => self.add_to_project(project_id, issue_number).await,
            Ok(None) => return,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => tracing::info!("📋 {} (#{}) added to the project", source_key, issue_number),
            Err(e) => tracing::error!(
                "❌ Could not add {} (#{}) to the project: {}",
                source_key,
                issue_number,
                e
            ),
        }
    }
}

/// 一批留言組成一則或多則內文：各自標上原始時間，以分隔線隔開
///
/// 超過長度上限時換下一則內文；只有單則留言本身超長才會被截斷。
/// 回傳每則內文與其包含的留言數。
pub fn compose_batches(batch: &[ImportComment], max_body_chars: usize) -> Vec<(String, usize)> {
    const SEPARATOR: &str = "\n\n---\n\n";
    let separator_chars = SEPARATOR.chars().count();

    let mut bodies = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    let mut count = 0;

    for comment in batch {
        let entry = format!("**{}**\n\n{}", comment.created_at, comment.body);
        let (entry, truncated) = truncate_chars(&entry, max_body_chars);
        if truncated {
            tracing::warn!(
                "✂️ Overflow comment from {} truncated to {} characters",
                comment.created_at,
                max_body_chars
            );
        }
        let entry_chars = entry.chars().count();

        if count > 0 && current_chars + separator_chars + entry_chars > max_body_chars {
            bodies.push((std::mem::take(&mut current), count));
            current_chars = 0;
            count = 0;
        }
        if count > 0 {
            current.push_str(SEPARATOR);
            current_chars += separator_chars;
        }
        current.push_str(&entry);
        current_chars += entry_chars;
        count += 1;
    }

    if count > 0 {
        bodies.push((current, count));
    }
    bodies
}

#[async_trait]
impl<T: HttpTransport> IssueSink for GithubClient<T> {
    async fn submit_import(&self, import: &IssueImport) -> Result<u64> {
        GithubClient::submit_import(self, import).await
    }
}
