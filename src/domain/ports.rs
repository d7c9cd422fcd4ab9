use crate::domain::model::{
    IssueImport, MigrationReport, PreparedBatch, SourceBundle, SourceComment, SourceIssue,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

/// 來源追蹤系統（唯讀）
#[async_trait]
pub trait SourceTracker: Send + Sync {
    async fn fetch_issues(&self, jql: &str) -> Result<Vec<SourceIssue>>;
    async fn fetch_comments(&self, issue_key: &str) -> Result<Vec<SourceComment>>;
    /// 取得 issue 的轉義 markup 匯出
    async fn fetch_issue_export(&self, issue_key: &str) -> Result<String>;
    /// 自訂欄位 id → 顯示名稱
    async fn fetch_custom_fields(&self) -> Result<HashMap<String, String>>;
}

/// 目標 issue 追蹤系統（寫入）
#[async_trait]
pub trait IssueSink: Send + Sync {
    /// 匯入 issue 並回傳新 issue 編號
    async fn submit_import(&self, import: &IssueImport) -> Result<u64>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<SourceBundle>>;
    async fn transform(&self, data: Vec<SourceBundle>) -> Result<PreparedBatch>;
    async fn load(&self, batch: PreparedBatch) -> Result<MigrationReport>;
}
