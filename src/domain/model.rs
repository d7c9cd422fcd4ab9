use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ---- 來源追蹤系統的記錄 ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceIssue {
    #[serde(default)]
    pub id: Option<String>,
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default, rename = "issuetype")]
    pub issue_type: Option<NamedField>,
    #[serde(default)]
    pub status: Option<NamedField>,
    #[serde(default)]
    pub priority: Option<NamedField>,
    #[serde(default)]
    pub reporter: Option<SourceUser>,
    #[serde(default)]
    pub assignee: Option<SourceUser>,
    pub created: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: Vec<String>,
    #[serde(default, rename = "attachment", deserialize_with = "null_as_empty")]
    pub attachments: Vec<SourceAttachment>,
    #[serde(default, rename = "issuelinks", deserialize_with = "null_as_empty")]
    pub issue_links: Vec<IssueLink>,
    /// 其餘欄位（自訂欄位等）
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedField {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUser {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "self", default)]
    pub self_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttachment {
    #[serde(default)]
    pub filename: String,
    /// 附件內容的下載網址
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueLink {
    #[serde(rename = "type")]
    pub link_type: LinkType,
    #[serde(rename = "inwardIssue", default)]
    pub inward_issue: Option<LinkedIssue>,
    #[serde(rename = "outwardIssue", default)]
    pub outward_issue: Option<LinkedIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkType {
    #[serde(default)]
    pub inward: String,
    #[serde(default)]
    pub outward: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedIssue {
    pub key: String,
    #[serde(rename = "self", default)]
    pub self_url: Option<String>,
    #[serde(default)]
    pub fields: Option<LinkedIssueFields>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedIssueFields {
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceComment {
    pub id: String,
    #[serde(default)]
    pub author: Option<SourceUser>,
    #[serde(default)]
    pub body: Option<Value>,
    pub created: String,
}

/// 單一 issue 在 extract 階段取得的全部資料
#[derive(Debug, Clone)]
pub struct SourceBundle {
    pub issue: SourceIssue,
    pub comments: Vec<SourceComment>,
    /// 轉義過的 markup 匯出（用來找回附件）
    pub export: Option<String>,
}

// ---- 附件對應 ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub source_url: String,
    pub display_name: String,
    pub kind: MediaKind,
}

/// 每則留言依出現順序排列的附件，以及留言中表格的純文字版本
#[derive(Debug, Clone, Default)]
pub struct CommentMediaIndex {
    media: HashMap<String, Vec<MediaRecord>>,
    tables: HashMap<String, Vec<String>>,
}

impl CommentMediaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, comment_id: String, media: Vec<MediaRecord>, tables: Vec<String>) {
        self.tables.insert(comment_id.clone(), tables);
        self.media.insert(comment_id, media);
    }

    /// 找不到留言時回傳空序列
    pub fn media_for(&self, comment_id: &str) -> &[MediaRecord] {
        self.media.get(comment_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tables_for(&self, comment_id: &str) -> &[String] {
        self.tables.get(comment_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn comment_ids(&self) -> impl Iterator<Item = &String> {
        self.media.keys()
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }
}

// ---- 目標平台的匯入內容 ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportIssue {
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub closed: bool,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportComment {
    pub body: String,
    pub created_at: String,
}

/// 一個待匯入的 issue（含全部留言，超出上限的部分由寫入端分批送出）
#[derive(Debug, Clone, PartialEq)]
pub struct IssueImport {
    pub source_key: String,
    pub issue: ImportIssue,
    pub comments: Vec<ImportComment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedIssue {
    pub source_key: String,
    pub issue_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedIssue {
    pub source_key: String,
    pub reason: String,
}

/// transform 階段的輸出
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub imports: Vec<IssueImport>,
    /// 已在 ledger 中，不再轉換
    pub skipped: Vec<MigratedIssue>,
    pub failures: Vec<FailedIssue>,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub migrated: Vec<MigratedIssue>,
    /// 已存在於 ledger 中的 issue
    pub skipped: Vec<MigratedIssue>,
    pub failed: Vec<FailedIssue>,
    /// 已建立但後續留言未完整送出的 issue，同時也列在 migrated
    pub incomplete: Vec<FailedIssue>,
    /// 因關閉訊號而未處理的 issue
    pub not_attempted: Vec<String>,
}

impl MigrationReport {
    pub fn total(&self) -> usize {
        self.migrated.len() + self.skipped.len() + self.failed.len() + self.not_attempted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.incomplete.is_empty() && self.not_attempted.is_empty()
    }
}
