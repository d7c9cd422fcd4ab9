use crate::adapters::http::{Auth, HttpTransport, ReqwestTransport};
use crate::domain::model::{SourceComment, SourceIssue};
use crate::domain::ports::SourceTracker;
use crate::utils::error::{MigrationError, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    issues: Vec<SourceIssue>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct CommentPage {
    #[serde(default)]
    comments: Vec<SourceComment>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct FieldDescriptor {
    id: String,
    name: String,
    #[serde(default)]
    custom: bool,
}

/// 來源追蹤系統的唯讀 REST 介面
pub struct JiraSource<T: HttpTransport> {
    transport: T,
    base_url: String,
    page_size: u32,
}

impl JiraSource<ReqwestTransport> {
    pub fn with_basic_auth(
        base_url: &str,
        user: impl Into<String>,
        api_token: impl Into<String>,
        page_size: u32,
    ) -> Result<Self> {
        let transport = ReqwestTransport::new(
            Auth::Basic {
                user: user.into(),
                password: api_token.into(),
            },
            "application/json",
        )?;
        Ok(Self::new(transport, base_url, page_size))
    }
}

impl<T: HttpTransport> JiraSource<T> {
    pub fn new(transport: T, base_url: &str, page_size: u32) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path)).map_err(|e| {
            MigrationError::InvalidConfigValueError {
                field: "source.base_url".to_string(),
                value: self.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    async fn get(&self, url: &str) -> Result<crate::adapters::http::ApiResponse> {
        let response = self.transport.send(Method::GET, url, None).await?;
        if !response.is_success() {
            return Err(MigrationError::UnexpectedStatus {
                status: response.status,
                url: url.to_string(),
                body: response.body,
            });
        }
        Ok(response)
    }

    async fn fetch_comment_pages(&self, issue_key: &str) -> Result<Vec<SourceComment>> {
        let mut comments = Vec::new();
        let mut start_at = 0u32;

        loop {
            let url = self.endpoint(
                &format!("/rest/api/3/issue/{}/comment", issue_key),
                &[
                    ("startAt", start_at.to_string()),
                    ("maxResults", self.page_size.to_string()),
                ],
            )?;
            let page: CommentPage = self.get(&url).await?.json()?;
            let fetched = page.comments.len() as u32;
            comments.extend(page.comments);

            if fetched == 0 || start_at + fetched >= page.total {
                break;
            }
            start_at += fetched;
        }

        Ok(comments)
    }
}

#[async_trait]
impl<T: HttpTransport> SourceTracker for JiraSource<T> {
    async fn fetch_issues(&self, jql: &str) -> Result<Vec<SourceIssue>> {
        let mut issues = Vec::new();
        let mut start_at = 0u32;

        loop {
            let url = self.endpoint(
                "/rest/api/3/search",
                &[
                    ("jql", jql.to_string()),
                    ("startAt", start_at.to_string()),
                    ("maxResults", self.page_size.to_string()),
                    ("fields", "*all".to_string()),
                ],
            )?;
            let page: SearchPage = self.get(&url).await?.json()?;
            let fetched = page.issues.len() as u32;
            issues.extend(page.issues);
            tracing::debug!("📥 Fetched {}/{} issues", issues.len(), page.total);

            if fetched == 0 || start_at + fetched >= page.total {
                break;
            }
            start_at += fetched;
        }

        tracing::info!("📥 Found {} issues for query '{}'", issues.len(), jql);
        Ok(issues)
    }

    async fn fetch_comments(&self, issue_key: &str) -> Result<Vec<SourceComment>> {
        match self.fetch_comment_pages(issue_key).await {
            Ok(comments) => Ok(comments),
            Err(e) => {
                tracing::warn!("⚠️ Could not fetch comments for {}: {}", issue_key, e);
                Ok(Vec::new())
            }
        }
    }

    async fn fetch_issue_export(&self, issue_key: &str) -> Result<String> {
        let url = self.endpoint(
            &format!("/si/jira.issueviews:issue-xml/{0}/{0}.xml", issue_key),
            &[],
        )?;
        match self.get(&url).await {
            Ok(response) => Ok(response.body),
            Err(e) => {
                tracing::warn!("⚠️ Could not fetch markup export for {}: {}", issue_key, e);
                Ok(String::new())
            }
        }
    }

    async fn fetch_custom_fields(&self) -> Result<HashMap<String, String>> {
        let url = self.endpoint("/rest/api/3/field", &[])?;
        let fields: Vec<FieldDescriptor> = self.get(&url).await?.json()?;
        Ok(fields
            .into_iter()
            .filter(|f| f.custom)
            .map(|f| (f.id, f.name))
            .collect())
    }
}
