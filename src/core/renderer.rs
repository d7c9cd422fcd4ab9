use crate::domain::document::{DocumentNode, Mark};
use crate::domain::model::{MediaRecord, SourceComment};
use crate::utils::error::Result;
use serde_json::Value;

/// 附件序列耗盡時輸出的佔位文字
pub const MISSING_MEDIA_PLACEHOLDER: &str = "[attachment unavailable]";
pub const EMPTY_DESCRIPTION: &str = "No description provided";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// 區塊之間空一行
const BLOCK_SEPARATOR: &str = "\n\n";

/// 只包住字串去掉前後空白後的「核心」，空白留在標記外側；全空白字串原樣回傳
pub fn wrap(text: &str, marker: &str) -> String {
    wrap_with(text, marker, marker)
}

fn wrap_with(text: &str, open: &str, close: &str) -> String {
    let core = text.trim();
    if core.is_empty() {
        return text.to_string();
    }
    let start = text.len() - text.trim_start().len();
    let end = start + core.len();
    format!("{}{}{}{}{}", &text[..start], open, core, close, &text[end..])
}

/// 固定順序套用標記：code → strong → em → strike → underline → link
fn apply_marks(text: &str, marks: &[Mark]) -> String {
    let has = |wanted: &Mark| marks.iter().any(|m| m == wanted);
    let mut out = text.to_string();

    if has(&Mark::Code) {
        out = wrap(&out, "`");
    }
    if has(&Mark::Strong) {
        out = wrap(&out, "**");
    }
    if has(&Mark::Em) {
        out = wrap(&out, "*");
    }
    if has(&Mark::Strike) {
        out = wrap(&out, "~~");
    }
    if has(&Mark::Underline) {
        out = wrap_with(&out, "<ins>", "</ins>");
    }
    // 連結會改變結構，必須最後處理
    if let Some(href) = marks.iter().find_map(|m| match m {
        Mark::Link { href } => Some(href),
        _ => None,
    }) {
        out = wrap_with(&out, "[", &format!("]({})", href));
    }
    out
}

/// 依序消耗附件記錄；用完之後一律輸出佔位文字
struct MediaCursor<'a> {
    records: &'a [MediaRecord],
    next: usize,
}

impl<'a> MediaCursor<'a> {
    fn new(records: &'a [MediaRecord]) -> Self {
        Self { records, next: 0 }
    }

    fn take(&mut self) -> Option<&'a MediaRecord> {
        let record = self.records.get(self.next)?;
        self.next += 1;
        Some(record)
    }
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Bullet,
    Ordered(u64),
}

impl ListKind {
    fn indent_unit(&self) -> &'static str {
        // 有序清單每層三格，無序清單兩格（目標渲染器依此判斷巢狀）
        match self {
            ListKind::Bullet => "  ",
            ListKind::Ordered(_) => "   ",
        }
    }

    fn marker(&self, index: usize) -> String {
        match self {
            ListKind::Bullet => "* ".to_string(),
            ListKind::Ordered(start) => format!("{}. ", start + index as u64),
        }
    }
}

/// 結構化文件 → Markdown
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    base_url: String,
}

impl DocumentRenderer {
    /// `base_url` 用於補全相對路徑的附件網址
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn render(&self, node: &DocumentNode, media: &[MediaRecord]) -> Result<String> {
        let mut cursor = MediaCursor::new(media);
        let fragments = match node {
            DocumentNode::Doc(children) => self.render_blocks(children, &mut cursor)?,
            other => self.render_blocks(std::slice::from_ref(other), &mut cursor)?,
        };
        Ok(fragments.join(BLOCK_SEPARATOR))
    }

    pub fn render_json(&self, value: &Value, media: &[MediaRecord]) -> Result<String> {
        let node = DocumentNode::from_json(value)?;
        self.render(&node, media)
    }

    /// 描述欄位：缺少時輸出預設文字，純字串直接沿用
    ///
    /// `media` 是 issue 的附件清單，依出現順序對應描述中的附件節點。
    pub fn render_description(
        &self,
        description: Option<&Value>,
        media: &[MediaRecord],
    ) -> Result<String> {
        let rendered = match description {
            None | Some(Value::Null) => return Ok(EMPTY_DESCRIPTION.to_string()),
            Some(Value::String(s)) => s.clone(),
            Some(value) => self.render_json(value, media)?,
        };
        if rendered.trim().is_empty() {
            Ok(EMPTY_DESCRIPTION.to_string())
        } else {
            Ok(rendered)
        }
    }

    /// 留言：作者連結 + 空行 + 內文
    pub fn render_comment(&self, comment: &SourceComment, media: &[MediaRecord]) -> Result<String> {
        let (author, href) = comment
            .author
            .as_ref()
            .map(|a| (a.display_name.as_str(), a.self_url.as_deref()))
            .unwrap_or((UNKNOWN_AUTHOR, None));
        let author = if author.trim().is_empty() {
            UNKNOWN_AUTHOR
        } else {
            author.trim()
        };

        let header = match href {
            Some(href) => format!("[{}]({})", author, href),
            None => format!("**{}**", author),
        };

        let body = match &comment.body {
            Some(value) if !value.is_null() => self.render_json(value, media)?,
            _ => String::new(),
        };

        Ok(format!("{}\n\n{}", header, body))
    }

    /// 完整附件網址：縮圖換成原圖，相對路徑補上來源站台網址
    pub fn resolve_media_url(&self, url: &str) -> String {
        let url = if url.contains("/secure/thumbnail/") {
            url.replacen("/secure/thumbnail/", "/secure/attachment/", 1)
        } else if url.contains("/thumbnail/") {
            url.replacen("/thumbnail/", "/content/", 1)
        } else {
            url.to_string()
        };

        if url.starts_with("http://") || url.starts_with("https://") {
            url
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }

    fn render_media(&self, cursor: &mut MediaCursor<'_>) -> String {
        match cursor.take() {
            Some(record) => format!(
                "[{}]({})",
                record.display_name,
                self.resolve_media_url(&record.source_url)
            ),
            None => {
                tracing::warn!(
                    "⚠️ Media sequence exhausted after {} record(s); leaving a placeholder",
                    cursor.records.len()
                );
                MISSING_MEDIA_PLACEHOLDER.to_string()
            }
        }
    }

    /// 區塊層級：連續的行內節點合併成一段
    fn render_blocks(&self, nodes: &[DocumentNode], cursor: &mut MediaCursor<'_>) -> Result<Vec<String>> {
        let mut fragments = Vec::new();
        let mut inline_run = String::new();

        for node in nodes {
            if is_inline(node) {
                inline_run.push_str(&self.render_inline_node(node, cursor)?);
                continue;
            }
            if !inline_run.is_empty() {
                fragments.push(std::mem::take(&mut inline_run));
            }
            if let Some(fragment) = self.render_block(node, cursor)? {
                fragments.push(fragment);
            }
        }
        if !inline_run.is_empty() {
            fragments.push(inline_run);
        }

        Ok(fragments)
    }

    fn render_block(&self, node: &DocumentNode, cursor: &mut MediaCursor<'_>) -> Result<Option<String>> {
        let fragment = match node {
            DocumentNode::Paragraph(content) => {
                let text = self.render_inline(content, cursor)?;
                if text.trim().is_empty() {
                    return Ok(None);
                }
                text
            }
            DocumentNode::Heading { level, content } => {
                let text: String = content.iter().map(DocumentNode::plain_text).collect();
                format!("{} {}", "#".repeat(*level as usize), text.trim())
            }
            DocumentNode::BulletList(items) => {
                let lines = self.render_list(ListKind::Bullet, items, 1, cursor)?;
                if lines.is_empty() {
                    return Ok(None);
                }
                lines.join("\n")
            }
            DocumentNode::OrderedList { start, items } => {
                let lines = self.render_list(ListKind::Ordered(*start), items, 1, cursor)?;
                if lines.is_empty() {
                    return Ok(None);
                }
                lines.join("\n")
            }
            DocumentNode::Blockquote(children) => match self.render_blockquote(children, cursor)? {
                Some(quote) => quote,
                None => return Ok(None),
            },
            DocumentNode::Rule => "---".to_string(),
            DocumentNode::Table(rows) => {
                let table = self.render_table(rows, cursor)?;
                if table.is_empty() {
                    return Ok(None);
                }
                table
            }
            DocumentNode::CodeBlock { language, content } => {
                let code: String = content.iter().map(DocumentNode::plain_text).collect();
                format!("```{}\n{}\n```", language.as_deref().unwrap_or_default(), code)
            }
            DocumentNode::MediaSingle(_) | DocumentNode::Media { .. } => self.render_media(cursor),
            DocumentNode::MediaGroup(children) => children
                .iter()
                .map(|_| self.render_media(cursor))
                .collect::<Vec<_>>()
                .join("\n"),
            DocumentNode::Doc(children)
            | DocumentNode::ListItem(children)
            | DocumentNode::TableRow(children)
            | DocumentNode::TableCell {
                content: children, ..
            } => {
                let fragments = self.render_blocks(children, cursor)?;
                if fragments.is_empty() {
                    return Ok(None);
                }
                fragments.join(BLOCK_SEPARATOR)
            }
            inline => self.render_inline_node(inline, cursor)?,
        };
        Ok(Some(fragment))
    }

    fn render_inline(&self, nodes: &[DocumentNode], cursor: &mut MediaCursor<'_>) -> Result<String> {
        let mut out = String::new();
        for node in nodes {
            if is_inline(node) {
                out.push_str(&self.render_inline_node(node, cursor)?);
            } else if let Some(block) = self.render_block(node, cursor)? {
                out.push_str(&block);
            }
        }
        Ok(out)
    }

    fn render_inline_node(&self, node: &DocumentNode, cursor: &mut MediaCursor<'_>) -> Result<String> {
        let text = match node {
            DocumentNode::Text { value, marks } => apply_marks(value, marks),
            DocumentNode::HardBreak => "\n".to_string(),
            DocumentNode::Mention { name } => format!("{} ", name.trim_start_matches('@')),
            DocumentNode::InlineCard { url } => format!("[Link]({})", url),
            DocumentNode::Emoji { glyph } => glyph.clone(),
            DocumentNode::MediaInline { .. } => self.render_media(cursor),
            block => return Ok(self.render_block(block, cursor)?.unwrap_or_default()),
        };
        Ok(text)
    }

    fn render_list(
        &self,
        kind: ListKind,
        items: &[DocumentNode],
        level: usize,
        cursor: &mut MediaCursor<'_>,
    ) -> Result<Vec<String>> {
        let indent = kind.indent_unit().repeat(level.saturating_sub(1));
        let mut lines = Vec::new();

        for (index, item) in items.iter().enumerate() {
            let prefix = format!("{}{}", indent, kind.marker(index));
            let continuation = " ".repeat(prefix.len());
            let children = match item {
                DocumentNode::ListItem(children) => children.as_slice(),
                other => std::slice::from_ref(other),
            };
            let mut emitted = false;

            for child in children {
                match child {
                    DocumentNode::BulletList(sub) => {
                        if !emitted {
                            lines.push(prefix.clone());
                            emitted = true;
                        }
                        lines.extend(self.render_list(ListKind::Bullet, sub, level + 1, cursor)?);
                    }
                    DocumentNode::OrderedList { start, items: sub } => {
                        if !emitted {
                            lines.push(prefix.clone());
                            emitted = true;
                        }
                        lines.extend(self.render_list(
                            ListKind::Ordered(*start),
                            sub,
                            level + 1,
                            cursor,
                        )?);
                    }
                    other => {
                        let Some(block) = self.render_block(other, cursor)? else {
                            continue;
                        };
                        for line in block.trim().lines() {
                            if emitted {
                                lines.push(format!("{}{}", continuation, line));
                            } else {
                                lines.push(format!("{}{}", prefix, line));
                                emitted = true;
                            }
                        }
                    }
                }
            }
        }

        Ok(lines)
    }

    fn render_blockquote(
        &self,
        children: &[DocumentNode],
        cursor: &mut MediaCursor<'_>,
    ) -> Result<Option<String>> {
        let mut sections = Vec::new();
        for child in children {
            let section = match child {
                DocumentNode::OrderedList { start, items } => self
                    .render_list(ListKind::Ordered(*start), items, 1, cursor)?
                    .join("\n"),
                DocumentNode::BulletList(items) => self
                    .render_list(ListKind::Bullet, items, 1, cursor)?
                    .join("\n"),
                other => self.render_block(other, cursor)?.unwrap_or_default(),
            };
            let section = section.trim_end().to_string();
            if !section.trim().is_empty() {
                sections.push(section);
            }
        }

        if sections.is_empty() {
            return Ok(None);
        }

        let mut lines = Vec::new();
        for (index, section) in sections.iter().enumerate() {
            if index > 0 {
                lines.push(">".to_string());
            }
            for line in section.lines() {
                if line.is_empty() {
                    lines.push(">".to_string());
                } else {
                    lines.push(format!("> {}", line));
                }
            }
        }
        Ok(Some(lines.join("\n")))
    }

    fn render_table(&self, rows: &[DocumentNode], cursor: &mut MediaCursor<'_>) -> Result<String> {
        let mut cells_by_row: Vec<Vec<String>> = Vec::new();
        for row in rows {
            let mut cells = Vec::new();
            for cell in row.children() {
                let fragments = self.render_blocks(cell.children(), cursor)?;
                let text = fragments
                    .join(" ")
                    .trim()
                    .replace('|', "\\|")
                    .replace('\n', "<br>");
                cells.push(text);
            }
            cells_by_row.push(cells);
        }

        if cells_by_row.is_empty() {
            return Ok(String::new());
        }

        let columns = cells_by_row.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let format_row = |cells: &[String]| {
            let padded: Vec<&str> = (0..columns)
                .map(|i| cells.get(i).map(String::as_str).unwrap_or(""))
                .collect();
            format!("| {} |", padded.join(" | "))
        };

        let mut lines = vec![format_row(&cells_by_row[0])];
        lines.push(format!("|{}", " --- |".repeat(columns)));
        lines.extend(cells_by_row[1..].iter().map(|row| format_row(row)));
        Ok(lines.join("\n"))
    }
}

fn is_inline(node: &DocumentNode) -> bool {
    matches!(
        node,
        DocumentNode::Text { .. }
            | DocumentNode::HardBreak
            | DocumentNode::Mention { .. }
            | DocumentNode::InlineCard { .. }
            | DocumentNode::Emoji { .. }
            | DocumentNode::MediaInline { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{MediaKind, SourceUser};
    use crate::utils::error::MigrationError;
    use serde_json::json;

    fn renderer() -> DocumentRenderer {
        DocumentRenderer::new("https://jira.example.com/")
    }

    fn text(value: &str) -> DocumentNode {
        DocumentNode::Text {
            value: value.to_string(),
            marks: vec![],
        }
    }

    fn marked(value: &str, marks: Vec<Mark>) -> DocumentNode {
        DocumentNode::Text {
            value: value.to_string(),
            marks,
        }
    }

    fn paragraph(nodes: Vec<DocumentNode>) -> DocumentNode {
        DocumentNode::Paragraph(nodes)
    }

    fn item(nodes: Vec<DocumentNode>) -> DocumentNode {
        DocumentNode::ListItem(nodes)
    }

    fn image(name: &str, url: &str) -> MediaRecord {
        MediaRecord {
            source_url: url.to_string(),
            display_name: name.to_string(),
            kind: MediaKind::Image,
        }
    }

    #[test]
    fn test_wrap_preserves_surrounding_whitespace() {
        assert_eq!(wrap("  foo  ", "**"), "  **foo**  ");
        assert_eq!(wrap("foo", "*"), "*foo*");
        assert_eq!(wrap("   ", "**"), "   ");
        assert_eq!(wrap("", "*"), "");
    }

    #[test]
    fn test_plain_text_document_is_concatenation() {
        let doc = DocumentNode::Doc(vec![paragraph(vec![text("Hello "), text("wide "), text("world")])]);
        assert_eq!(renderer().render(&doc, &[]).unwrap(), "Hello wide world");

        let bare = DocumentNode::Doc(vec![text("a"), text(" b"), text(" c")]);
        assert_eq!(renderer().render(&bare, &[]).unwrap(), "a b c");
    }

    #[test]
    fn test_marks_are_applied_in_fixed_order() {
        let node = marked(
            " click ",
            vec![
                Mark::Link {
                    href: "https://x.io".to_string(),
                },
                Mark::Underline,
                Mark::Em,
                Mark::Strong,
            ],
        );
        let out = renderer().render(&paragraph(vec![node]), &[]).unwrap();
        assert_eq!(out, " [<ins>***click***</ins>](https://x.io) ");
    }

    #[test]
    fn test_code_and_strike_marks() {
        let out = renderer()
            .render(
                &paragraph(vec![
                    marked("x", vec![Mark::Code]),
                    text(" "),
                    marked("gone", vec![Mark::Strike]),
                ]),
                &[],
            )
            .unwrap();
        assert_eq!(out, "`x` ~~gone~~");
    }

    #[test]
    fn test_mentions_drop_sigil() {
        let doc = paragraph(vec![
            DocumentNode::Mention {
                name: "@Grace Hopper".to_string(),
            },
            text("please check, cc @bob and mail bob@example.com"),
        ]);
        assert_eq!(
            renderer().render(&doc, &[]).unwrap(),
            "Grace Hopper please check, cc @bob and mail bob@example.com"
        );
    }

    #[test]
    fn test_text_nodes_keep_at_signs() {
        let doc = paragraph(vec![text("cc @bob "), text("see @Override")]);
        assert_eq!(renderer().render(&doc, &[]).unwrap(), "cc @bob see @Override");

        let code = paragraph(vec![marked("@Test", vec![Mark::Code])]);
        assert_eq!(renderer().render(&code, &[]).unwrap(), "`@Test`");
    }

    #[test]
    fn test_blocks_are_separated_by_blank_line() {
        let doc = DocumentNode::Doc(vec![
            paragraph(vec![text("a")]),
            paragraph(vec![text("b")]),
            DocumentNode::Heading {
                level: 2,
                content: vec![text("Next")],
            },
            paragraph(vec![text("c")]),
        ]);
        assert_eq!(renderer().render(&doc, &[]).unwrap(), "a\n\nb\n\n## Next\n\nc");
    }

    #[test]
    fn test_inline_leaves() {
        let doc = paragraph(vec![
            text("see"),
            DocumentNode::HardBreak,
            DocumentNode::InlineCard {
                url: "https://x.io/1".to_string(),
            },
            text(" "),
            DocumentNode::Emoji {
                glyph: "🙂".to_string(),
            },
        ]);
        assert_eq!(renderer().render(&doc, &[]).unwrap(), "see\n[Link](https://x.io/1) 🙂");
    }

    #[test]
    fn test_heading() {
        let doc = DocumentNode::Heading {
            level: 3,
            content: vec![text("Steps "), marked("now", vec![Mark::Strong])],
        };
        assert_eq!(renderer().render(&doc, &[]).unwrap(), "### Steps now");
    }

    #[test]
    fn test_ordered_list_continues_from_start_index() {
        let doc = DocumentNode::OrderedList {
            start: 5,
            items: vec![
                item(vec![paragraph(vec![text("a")])]),
                item(vec![paragraph(vec![text("b")])]),
                item(vec![paragraph(vec![text("c")])]),
            ],
        };
        let out = renderer().render(&doc, &[]).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec!["5. a", "6. b", "7. c"]);
    }

    #[test]
    fn test_nested_bullet_list_indents_two_spaces() {
        let doc = DocumentNode::BulletList(vec![
            item(vec![
                paragraph(vec![text("parent")]),
                DocumentNode::BulletList(vec![
                    item(vec![paragraph(vec![text("child")])]),
                    item(vec![DocumentNode::BulletList(vec![item(vec![paragraph(vec![
                        text("grandchild"),
                    ])])])]),
                ]),
            ]),
            item(vec![paragraph(vec![text("sibling")])]),
        ]);
        let out = renderer().render(&doc, &[]).unwrap();
        assert_eq!(
            out,
            "* parent\n  * child\n  * \n    * grandchild\n* sibling"
        );
    }

    #[test]
    fn test_nested_ordered_list_indents_three_spaces() {
        let doc = DocumentNode::OrderedList {
            start: 1,
            items: vec![item(vec![DocumentNode::OrderedList {
                start: 1,
                items: vec![item(vec![paragraph(vec![text("inner")])])],
            }])],
        };
        let out = renderer().render(&doc, &[]).unwrap();
        assert_eq!(out, "1. \n   1. inner");
    }

    #[test]
    fn test_list_is_followed_by_blank_line() {
        let doc = DocumentNode::Doc(vec![
            DocumentNode::BulletList(vec![item(vec![paragraph(vec![text("one")])])]),
            paragraph(vec![text("after")]),
        ]);
        assert_eq!(renderer().render(&doc, &[]).unwrap(), "* one\n\nafter");
    }

    #[test]
    fn test_blockquote_with_ordered_list() {
        let doc = DocumentNode::Blockquote(vec![
            paragraph(vec![text("quoted")]),
            DocumentNode::OrderedList {
                start: 3,
                items: vec![
                    item(vec![paragraph(vec![text("x")])]),
                    item(vec![paragraph(vec![text("y")])]),
                ],
            },
        ]);
        let out = renderer().render(&doc, &[]).unwrap();
        assert_eq!(out, "> quoted\n>\n> 3. x\n> 4. y");
    }

    #[test]
    fn test_table_uses_first_row_as_header() {
        let cell = |s: &str, header: bool| DocumentNode::TableCell {
            header,
            content: vec![paragraph(vec![text(s)])],
        };
        let doc = DocumentNode::Table(vec![
            DocumentNode::TableRow(vec![cell("Name", true), cell("Value", true)]),
            DocumentNode::TableRow(vec![cell("a|b", false), cell("1", false)]),
        ]);
        let out = renderer().render(&doc, &[]).unwrap();
        assert_eq!(out, "| Name | Value |\n| --- | --- |\n| a\\|b | 1 |");
    }

    #[test]
    fn test_empty_table_renders_nothing() {
        let doc = DocumentNode::Doc(vec![DocumentNode::Table(vec![])]);
        assert_eq!(renderer().render(&doc, &[]).unwrap(), "");
    }

    #[test]
    fn test_code_block_fence() {
        let doc = DocumentNode::CodeBlock {
            language: Some("rust".to_string()),
            content: vec![text("let x = 1;\nlet y = 2;")],
        };
        assert_eq!(
            renderer().render(&doc, &[]).unwrap(),
            "```rust\nlet x = 1;\nlet y = 2;\n```"
        );

        let plain = DocumentNode::CodeBlock {
            language: None,
            content: vec![text("<xml/>")],
        };
        assert_eq!(renderer().render(&plain, &[]).unwrap(), "```\n<xml/>\n```");
    }

    #[test]
    fn test_media_single_rewrites_thumbnail_url() {
        let doc = DocumentNode::Doc(vec![DocumentNode::MediaSingle(vec![DocumentNode::Media {
            id: Some("abc".to_string()),
        }])]);
        let media = vec![image("a.png", "/thumbnail/1/a.png")];
        let out = renderer().render(&doc, &media).unwrap();
        assert_eq!(out, "[a.png](https://jira.example.com/content/1/a.png)");
        assert!(!out.contains("thumbnail"));
    }

    #[test]
    fn test_secure_thumbnail_maps_to_attachment() {
        assert_eq!(
            renderer().resolve_media_url("/secure/thumbnail/10010/a.png"),
            "https://jira.example.com/secure/attachment/10010/a.png"
        );
        assert_eq!(
            renderer().resolve_media_url("https://cdn.example.com/x.png"),
            "https://cdn.example.com/x.png"
        );
    }

    #[test]
    fn test_media_group_consumes_one_record_per_child() {
        let media_node = || DocumentNode::Media { id: None };
        let doc = DocumentNode::Doc(vec![
            DocumentNode::MediaGroup(vec![media_node(), media_node()]),
            paragraph(vec![text("then "), DocumentNode::MediaInline { id: None }]),
        ]);
        let media = vec![
            image("1.png", "https://h/1.png"),
            image("2.png", "https://h/2.png"),
            image("3.png", "https://h/3.png"),
        ];
        let out = renderer().render(&doc, &media).unwrap();
        assert_eq!(
            out,
            "[1.png](https://h/1.png)\n[2.png](https://h/2.png)\n\nthen [3.png](https://h/3.png)"
        );
    }

    #[test]
    fn test_exhausted_media_sequence_leaves_placeholder() {
        let doc = DocumentNode::Doc(vec![
            DocumentNode::MediaSingle(vec![]),
            DocumentNode::MediaSingle(vec![]),
        ]);
        let media = vec![image("only.png", "https://h/only.png")];
        let out = renderer().render(&doc, &media).unwrap();
        assert_eq!(
            out,
            format!("[only.png](https://h/only.png)\n\n{}", MISSING_MEDIA_PLACEHOLDER)
        );
    }

    #[test]
    fn test_unsupported_node_fails_only_that_document() {
        let r = renderer();
        let good = json!({"type": "doc", "content": [{"type": "paragraph", "content": [{"type": "text", "text": "ok"}]}]});
        let bad = json!({"type": "doc", "content": [{"type": "panel", "content": []}]});

        assert_eq!(r.render_json(&good, &[]).unwrap(), "ok");
        let err = r.render_json(&bad, &[]).unwrap_err();
        assert!(matches!(err, MigrationError::UnsupportedNodeType { .. }));
        assert_eq!(r.render_json(&good, &[]).unwrap(), "ok");
    }

    #[test]
    fn test_render_description_fallbacks() {
        let r = renderer();
        assert_eq!(r.render_description(None, &[]).unwrap(), EMPTY_DESCRIPTION);
        assert_eq!(r.render_description(Some(&Value::Null), &[]).unwrap(), EMPTY_DESCRIPTION);
        assert_eq!(r.render_description(Some(&json!("plain")), &[]).unwrap(), "plain");
        assert_eq!(
            r.render_description(Some(&json!({"type": "doc", "content": []})), &[]).unwrap(),
            EMPTY_DESCRIPTION
        );
    }

    #[test]
    fn test_render_comment_prepends_author_header() {
        let comment = SourceComment {
            id: "100".to_string(),
            author: Some(SourceUser {
                display_name: "Ada".to_string(),
                self_url: Some("https://jira.example.com/user/ada".to_string()),
            }),
            body: Some(json!({
                "type": "doc",
                "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "Looks good"}]},
                    {"type": "mediaSingle", "content": [{"type": "media", "attrs": {"id": "x"}}]}
                ]
            })),
            created: "2021-01-22T11:11:47.758+0100".to_string(),
        };
        let media = vec![image("shot.png", "/secure/attachment/1/shot.png")];
        let out = renderer().render_comment(&comment, &media).unwrap();
        assert_eq!(
            out,
            "[Ada](https://jira.example.com/user/ada)\n\nLooks good\n\n[shot.png](https://jira.example.com/secure/attachment/1/shot.png)"
        );
    }
}
