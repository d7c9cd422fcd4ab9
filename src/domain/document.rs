use crate::utils::error::{MigrationError, Result};
use serde::Deserialize;
use serde_json::Value;

/// 文字節點上的行內格式標記
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mark {
    Strong,
    Em,
    Underline,
    Code,
    Strike,
    Link { href: String },
}

/// 來源追蹤系統的結構化富文本節點
///
/// 解析後不可變；未列舉的節點類型在解析階段即回報 `UnsupportedNodeType`。
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentNode {
    Doc(Vec<DocumentNode>),
    Paragraph(Vec<DocumentNode>),
    Heading {
        level: u8,
        content: Vec<DocumentNode>,
    },
    BulletList(Vec<DocumentNode>),
    OrderedList {
        start: u64,
        items: Vec<DocumentNode>,
    },
    ListItem(Vec<DocumentNode>),
    Blockquote(Vec<DocumentNode>),
    Rule,
    Table(Vec<DocumentNode>),
    TableRow(Vec<DocumentNode>),
    TableCell {
        header: bool,
        content: Vec<DocumentNode>,
    },
    CodeBlock {
        language: Option<String>,
        content: Vec<DocumentNode>,
    },
    Text {
        value: String,
        marks: Vec<Mark>,
    },
    HardBreak,
    Mention {
        name: String,
    },
    InlineCard {
        url: String,
    },
    Emoji {
        glyph: String,
    },
    MediaSingle(Vec<DocumentNode>),
    MediaGroup(Vec<DocumentNode>),
    MediaInline {
        id: Option<String>,
    },
    Media {
        id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    attrs: Option<Value>,
    #[serde(default)]
    content: Vec<RawNode>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    marks: Vec<RawMark>,
}

#[derive(Debug, Deserialize)]
struct RawMark {
    #[serde(rename = "type")]
    mark_type: String,
    #[serde(default)]
    attrs: Option<Value>,
}

impl RawNode {
    fn attr_str(&self, name: &str) -> Option<String> {
        self.attrs
            .as_ref()
            .and_then(|attrs| attrs.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn attr_u64(&self, name: &str) -> Option<u64> {
        self.attrs
            .as_ref()
            .and_then(|attrs| attrs.get(name))
            .and_then(|v| v.as_u64())
    }
}

impl DocumentNode {
    /// 從 JSON 匯出解析文件樹
    pub fn from_json(value: &Value) -> Result<Self> {
        let raw: RawNode =
            serde_json::from_value(value.clone()).map_err(|e| MigrationError::MalformedDocument {
                message: e.to_string(),
            })?;
        Self::try_from(raw)
    }

    /// 節點類型名稱（與來源格式一致）
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Doc(_) => "doc",
            Self::Paragraph(_) => "paragraph",
            Self::Heading { .. } => "heading",
            Self::BulletList(_) => "bulletList",
            Self::OrderedList { .. } => "orderedList",
            Self::ListItem(_) => "listItem",
            Self::Blockquote(_) => "blockquote",
            Self::Rule => "rule",
            Self::Table(_) => "table",
            Self::TableRow(_) => "tableRow",
            Self::TableCell { header: true, .. } => "tableHeader",
            Self::TableCell { header: false, .. } => "tableCell",
            Self::CodeBlock { .. } => "codeBlock",
            Self::Text { .. } => "text",
            Self::HardBreak => "hardBreak",
            Self::Mention { .. } => "mention",
            Self::InlineCard { .. } => "inlineCard",
            Self::Emoji { .. } => "emoji",
            Self::MediaSingle(_) => "mediaSingle",
            Self::MediaGroup(_) => "mediaGroup",
            Self::MediaInline { .. } => "mediaInline",
            Self::Media { .. } => "media",
        }
    }

    /// 子節點（葉節點回傳空切片）
    pub fn children(&self) -> &[DocumentNode] {
        match self {
            Self::Doc(c)
            | Self::Paragraph(c)
            | Self::BulletList(c)
            | Self::ListItem(c)
            | Self::Blockquote(c)
            | Self::Table(c)
            | Self::TableRow(c)
            | Self::MediaSingle(c)
            | Self::MediaGroup(c) => c,
            Self::Heading { content, .. }
            | Self::TableCell { content, .. }
            | Self::CodeBlock { content, .. } => content,
            Self::OrderedList { items, .. } => items,
            _ => &[],
        }
    }

    /// 串接所有文字節點的原始內容，忽略格式
    pub fn plain_text(&self) -> String {
        match self {
            Self::Text { value, .. } => value.clone(),
            Self::HardBreak => "\n".to_string(),
            Self::Mention { name } => name.trim_start_matches('@').to_string(),
            Self::Emoji { glyph } => glyph.clone(),
            Self::InlineCard { url } => url.clone(),
            other => other.children().iter().map(Self::plain_text).collect(),
        }
    }
}

fn convert_all(nodes: Vec<RawNode>) -> Result<Vec<DocumentNode>> {
    nodes.into_iter().map(DocumentNode::try_from).collect()
}

fn convert_mark(raw: RawMark) -> Option<Mark> {
    match raw.mark_type.as_str() {
        "strong" => Some(Mark::Strong),
        "em" => Some(Mark::Em),
        "underline" => Some(Mark::Underline),
        "code" => Some(Mark::Code),
        "strike" => Some(Mark::Strike),
        "link" => {
            let href = raw
                .attrs
                .as_ref()
                .and_then(|a| a.get("href"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Some(Mark::Link { href })
        }
        other => {
            // 顏色、上下標等標記不影響內容，直接略過
            tracing::debug!("Ignoring unsupported mark '{}'", other);
            None
        }
    }
}

impl TryFrom<RawNode> for DocumentNode {
    type Error = MigrationError;

    fn try_from(raw: RawNode) -> Result<Self> {
        let node = match raw.node_type.as_str() {
            "doc" => Self::Doc(convert_all(raw.content)?),
            "paragraph" => Self::Paragraph(convert_all(raw.content)?),
            "heading" => {
                let level = raw.attr_u64("level").unwrap_or(1).clamp(1, 6) as u8;
                Self::Heading {
                    level,
                    content: convert_all(raw.content)?,
                }
            }
            "bulletList" => Self::BulletList(convert_all(raw.content)?),
            "orderedList" => {
                let start = raw.attr_u64("order").unwrap_or(1);
                Self::OrderedList {
                    start,
                    items: convert_all(raw.content)?,
                }
            }
            "listItem" => Self::ListItem(convert_all(raw.content)?),
            "blockquote" => Self::Blockquote(convert_all(raw.content)?),
            "rule" => Self::Rule,
            "table" => Self::Table(convert_all(raw.content)?),
            "tableRow" => Self::TableRow(convert_all(raw.content)?),
            "tableHeader" | "tableCell" => Self::TableCell {
                header: raw.node_type == "tableHeader",
                content: convert_all(raw.content)?,
            },
            "codeBlock" => Self::CodeBlock {
                language: raw.attr_str("language").filter(|l| !l.is_empty()),
                content: convert_all(raw.content)?,
            },
            "text" => Self::Text {
                value: raw.text.unwrap_or_default(),
                marks: raw.marks.into_iter().filter_map(convert_mark).collect(),
            },
            "hardBreak" => Self::HardBreak,
            "mention" => Self::Mention {
                name: raw.attr_str("text").unwrap_or_default(),
            },
            "inlineCard" => Self::InlineCard {
                url: raw.attr_str("url").unwrap_or_default(),
            },
            "emoji" => Self::Emoji {
                glyph: raw
                    .attr_str("text")
                    .or_else(|| raw.attr_str("shortName"))
                    .unwrap_or_default(),
            },
            "mediaSingle" => Self::MediaSingle(convert_all(raw.content)?),
            "mediaGroup" => Self::MediaGroup(convert_all(raw.content)?),
            "mediaInline" => Self::MediaInline {
                id: raw.attr_str("id"),
            },
            "media" => Self::Media {
                id: raw.attr_str("id"),
            },
            other => {
                return Err(MigrationError::UnsupportedNodeType {
                    node_type: other.to_string(),
                })
            }
        };
        Ok(node)
    }
}
