use crate::core::labels::LabelAllowList;
use crate::core::media::MediaCorrelator;
use crate::core::renderer::DocumentRenderer;
use crate::domain::document::DocumentNode;
use crate::domain::model::{
    CommentMediaIndex, ImportComment, ImportIssue, IssueFields, IssueImport, IssueLink, MediaKind,
    MediaRecord, SourceBundle,
};
use crate::utils::datetime::normalize_timestamp;
use crate::utils::error::Result;
use crate::utils::text::truncate_chars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_CUSTOM_FIELDS_HEADING: &str = "Custom fields";

/// 來源狀態 → 是否關閉、是否加上狀態標籤
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRule {
    pub name: String,
    pub closed: bool,
    #[serde(default)]
    pub label: Option<String>,
}

impl StatusRule {
    fn new(name: &str, closed: bool, label: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            closed,
            label: label.map(str::to_string),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("Open", false, None),
            Self::new("Closed", true, None),
            Self::new("On Hold", true, Some("Onhold")),
            Self::new("Onhold", true, Some("Onhold")),
            Self::new("Reopened", false, Some("Reopened")),
            Self::new("Resolved", false, Some("Resolved")),
        ]
    }
}

/// 把一個來源 issue（含留言與匯出）組成匯入內容
#[derive(Debug, Clone)]
pub struct IssueBuilder {
    renderer: DocumentRenderer,
    correlator: MediaCorrelator,
    labels: LabelAllowList,
    assignees: HashMap<String, String>,
    status_rules: Vec<StatusRule>,
    custom_field_ids: Vec<String>,
    custom_field_names: HashMap<String, String>,
    custom_fields_heading: String,
    max_body_chars: usize,
}

impl IssueBuilder {
    pub fn new(renderer: DocumentRenderer) -> Self {
        Self {
            renderer,
            correlator: MediaCorrelator::new(),
            labels: LabelAllowList::allow_all(),
            assignees: HashMap::new(),
            status_rules: StatusRule::defaults(),
            custom_field_ids: Vec::new(),
            custom_field_names: HashMap::new(),
            custom_fields_heading: DEFAULT_CUSTOM_FIELDS_HEADING.to_string(),
            max_body_chars: 65_000,
        }
    }

    pub fn with_labels(mut self, labels: LabelAllowList) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_assignees(mut self, assignees: HashMap<String, String>) -> Self {
        self.assignees = assignees;
        self
    }

    /// 設定的規則優先於預設規則
    pub fn with_status_rules(mut self, rules: Vec<StatusRule>) -> Self {
        let mut merged = rules;
        for default in StatusRule::defaults() {
            if !merged.iter().any(|r| r.name.eq_ignore_ascii_case(&default.name)) {
                merged.push(default);
            }
        }
        self.status_rules = merged;
        self
    }

    pub fn with_custom_fields(
        mut self,
        ids: Vec<String>,
        names: HashMap<String, String>,
        heading: Option<String>,
    ) -> Self {
        self.custom_field_ids = ids;
        self.custom_field_names = names;
        if let Some(heading) = heading {
            self.custom_fields_heading = heading;
        }
        self
    }

    pub fn with_max_body_chars(mut self, max_body_chars: usize) -> Self {
        self.max_body_chars = max_body_chars;
        self
    }

    pub fn build(&self, bundle: &SourceBundle) -> Result<IssueImport> {
        let issue = &bundle.issue;
        let fields = &issue.fields;
        let title = format!("[{}] {}", issue.key, fields.summary.trim());

        let (closed, status_label) = self.map_status(&issue.key, fields);
        let assignee = self.map_assignee(fields);

        let body = self.compose_body(fields, assignee.is_none())?;
        let body = self.truncate(&issue.key, "description", body);

        let media_index = bundle
            .export
            .as_deref()
            .filter(|export| !export.trim().is_empty())
            .map(|export| self.correlator.correlate(export))
            .unwrap_or_else(CommentMediaIndex::new);

        let mut comments = Vec::with_capacity(bundle.comments.len());
        for comment in &bundle.comments {
            let rendered = self
                .renderer
                .render_comment(comment, media_index.media_for(&comment.id))?;
            comments.push(ImportComment {
                body: self.truncate(&issue.key, "comment", rendered),
                created_at: normalize_timestamp(&comment.created)?,
            });
        }

        Ok(IssueImport {
            source_key: issue.key.clone(),
            issue: ImportIssue {
                title,
                body,
                created_at: normalize_timestamp(&fields.created)?,
                closed,
                labels: self.collect_labels(fields, status_label),
                assignee,
            },
            comments,
        })
    }

    fn truncate(&self, key: &str, what: &str, body: String) -> String {
        let (text, truncated) = truncate_chars(&body, self.max_body_chars);
        if truncated {
            tracing::warn!(
                "✂️ {} {} truncated to {} characters",
                key,
                what,
                self.max_body_chars
            );
        }
        text
    }

    fn compose_body(&self, fields: &IssueFields, show_assignee: bool) -> Result<String> {
        let mut sections = vec![self
            .renderer
            .render_description(fields.description.as_ref(), &attachment_media(fields))?];

        if show_assignee {
            if let Some(user) = &fields.assignee {
                let name = user.display_name.trim();
                if !name.is_empty() {
                    sections.push(format!("Assignee: {}", name));
                }
            }
        }
        if let Some(links) = linked_issues_section(&fields.issue_links) {
            sections.push(links);
        }
        if let Some(attachments) = attachments_section(fields) {
            sections.push(attachments);
        }
        if let Some(custom) = self.custom_fields_section(fields) {
            sections.push(custom);
        }

        Ok(sections.join("\n\n"))
    }

    fn map_status(&self, key: &str, fields: &IssueFields) -> (bool, Option<String>) {
        let Some(status) = fields.status.as_ref().map(|s| s.name.trim()) else {
            return (false, None);
        };
        match self
            .status_rules
            .iter()
            .find(|rule| rule.name.eq_ignore_ascii_case(status))
        {
            Some(rule) => (rule.closed, rule.label.clone()),
            None => {
                tracing::warn!(
                    "⚠️ Unknown status '{}' for {}, importing as open",
                    status,
                    key
                );
                (false, None)
            }
        }
    }

    fn map_assignee(&self, fields: &IssueFields) -> Option<String> {
        let user = fields.assignee.as_ref()?;
        let login = self.assignees.get(user.display_name.trim()).cloned();
        if login.is_none() {
            tracing::debug!("No login mapped for assignee '{}'", user.display_name);
        }
        login
    }

    fn collect_labels(&self, fields: &IssueFields, status_label: Option<String>) -> Vec<String> {
        let mut labels = self.labels.filter(&fields.labels);

        if let Some(priority) = &fields.priority {
            labels.push(priority.name.clone());
        }
        if let Some(reporter) = &fields.reporter {
            labels.push(reporter.display_name.trim().to_string());
        }
        labels.extend(status_label);
        if fields
            .issue_type
            .as_ref()
            .is_some_and(|t| t.name.eq_ignore_ascii_case("bug"))
        {
            labels.push("bug".to_string());
        }

        let mut unique: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if !label.is_empty() && !unique.contains(&label) {
                unique.push(label);
            }
        }
        unique
    }

    fn custom_fields_section(&self, fields: &IssueFields) -> Option<String> {
        let lines: Vec<String> = self
            .custom_field_ids
            .iter()
            .filter_map(|id| {
                let value = custom_field_text(fields.extra.get(id)?)?;
                let name = self.custom_field_names.get(id).unwrap_or(id);
                Some(format!("- {}: {}", name, value))
            })
            .collect();

        if lines.is_empty() {
            None
        } else {
            Some(format!(
                "## {}\n{}",
                self.custom_fields_heading,
                lines.join("\n")
            ))
        }
    }
}

fn linked_issues_section(links: &[IssueLink]) -> Option<String> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for link in links {
        let sides = [
            (&link.inward_issue, &link.link_type.inward),
            (&link.outward_issue, &link.link_type.outward),
        ];
        for (issue, relation) in sides {
            let Some(issue) = issue else { continue };
            let summary = issue
                .fields
                .as_ref()
                .map(|f| f.summary.as_str())
                .unwrap_or_default();
            let entry = format!(
                "- [{} - {}]({})",
                issue.key,
                summary,
                issue.self_url.as_deref().unwrap_or_default()
            );
            match groups.iter_mut().find(|(name, _)| name == relation) {
                Some((_, entries)) => entries.push(entry),
                None => groups.push((relation.clone(), vec![entry])),
            }
        }
    }

    if groups.is_empty() {
        return None;
    }

    let body = groups
        .into_iter()
        .map(|(relation, entries)| format!("{}:\n{}", relation, entries.join("\n")))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!("## Linked issues\n{}", body))
}

fn attachments_section(fields: &IssueFields) -> Option<String> {
    let entries: Vec<String> = fields
        .attachments
        .iter()
        .filter(|a| !a.filename.is_empty() && !a.content.is_empty())
        .map(|a| format!("- [{}]({})", a.filename, a.content))
        .collect();

    if entries.is_empty() {
        None
    } else {
        Some(format!("## Attachments\n{}", entries.join("\n")))
    }
}

/// 描述中的附件節點依序對應 issue 的附件清單
fn attachment_media(fields: &IssueFields) -> Vec<MediaRecord> {
    const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp"];

    fields
        .attachments
        .iter()
        .filter(|a| !a.content.is_empty())
        .map(|a| {
            let is_image = a
                .filename
                .rsplit_once('.')
                .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            MediaRecord {
                source_url: a.content.clone(),
                display_name: a.filename.clone(),
                kind: if is_image { MediaKind::Image } else { MediaKind::File },
            }
        })
        .collect()
}

/// 自訂欄位值轉成一行文字；空值回傳 None
fn custom_field_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(custom_field_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => {
            if let Some(name) = ["displayName", "value", "name"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
            {
                name.trim().to_string()
            } else if map.contains_key("type") && map.contains_key("content") {
                // 巢狀文件只取純文字
                let node = DocumentNode::from_json(value).ok()?;
                node.children()
                    .iter()
                    .map(|block| block.plain_text().trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            } else {
                return None;
            }
        }
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
