use crate::domain::model::{CommentMediaIndex, MediaKind, MediaRecord};
use crate::utils::error::{MigrationError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// 找不到任何可讀名稱時使用
pub const UNKNOWN_ATTACHMENT_NAME: &str = "Unknown attachment";

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute regex")
});
static MEDIA_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>|<img\b([^>]*?)/?>").expect("media token regex")
});
static ATTACHMENT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:attachment|thumbnail)/(?:(?:content|thumbnail)/)?(\d+)").expect("path regex")
});
static ICON_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/images/icons/|/emoticons/|/download/resources/").expect("icon regex")
});
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z][a-zA-Z0-9]*);").expect("entity regex")
});
static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").expect("table regex"));
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").expect("row regex"));
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<t[hd]\b[^>]*>(.*?)</t[hd]\s*>").expect("cell regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static ANCHOR_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<a\b").expect("anchor open regex"));
static ANCHOR_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</a\s*>").expect("anchor close regex"));

/// 解碼留言 HTML 片段內的實體（`&lt;`、`&#39;`、`&#x2F;` 等）；無法辨識的實體原樣保留
pub fn decode_entities(input: &str) -> String {
    ENTITY_RE
        .replace_all(input, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "amp" => Some('&'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

fn strip_tags(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 匯出中的一則留言；內文已解開外層 XML 轉義
#[derive(Debug)]
struct ExportComment {
    id: Option<String>,
    body: Result<String>,
}

/// 外層匯出 XML 讀出的內容
#[derive(Debug, Default)]
struct ExportDocument {
    names: HashMap<String, String>,
    comments: Vec<ExportComment>,
}

fn attribute(element: &BytesStart, name: &str) -> Result<Option<String>> {
    match element.try_get_attribute(name).map_err(quick_xml::Error::from)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// 依序讀取 `<attachment>` 與 `<comment>`；遇到 XML 錯誤時保留已讀到的部分
fn read_export(export: &str, doc: &mut ExportDocument) -> Result<()> {
    let mut reader = Reader::from_str(export);
    let mut current: Option<ExportComment> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"comment" => {
                current = Some(ExportComment {
                    id: attribute(&e, "id")?,
                    body: Ok(String::new()),
                });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"comment" => {
                doc.comments.push(ExportComment {
                    id: attribute(&e, "id")?,
                    body: Ok(String::new()),
                });
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"attachment" => {
                if let (Some(id), Some(name)) = (attribute(&e, "id")?, attribute(&e, "name")?) {
                    if !name.is_empty() {
                        doc.names.insert(id, name);
                    }
                }
            }
            Event::Text(text) => {
                if let Some(comment) = current.as_mut().filter(|c| c.body.is_ok()) {
                    match text.unescape() {
                        Ok(chunk) => {
                            if let Ok(body) = comment.body.as_mut() {
                                body.push_str(&chunk);
                            }
                        }
                        Err(e) => {
                            comment.body = Err(MigrationError::MalformedMarkup {
                                comment_id: comment.id.clone().unwrap_or_default(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
            Event::CData(data) => {
                if let Some(ExportComment { body: Ok(body), .. }) = current.as_mut() {
                    body.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"comment" => {
                if let Some(comment) = current.take() {
                    doc.comments.push(comment);
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

/// 從轉義 markup 匯出中，依出現順序找回每則留言的附件
#[derive(Debug, Default, Clone)]
pub struct MediaCorrelator;

impl MediaCorrelator {
    pub fn new() -> Self {
        Self
    }

    fn read(&self, export: &str) -> ExportDocument {
        let mut doc = ExportDocument::default();
        if let Err(e) = read_export(export, &mut doc) {
            tracing::warn!(
                "⚠️ Export is not well-formed ({}); keeping {} comment(s) read before the error",
                e,
                doc.comments.len()
            );
        }
        doc
    }

    /// 處理一份匯出；單一留言的 markup 有問題時只略過該留言的附件
    pub fn correlate(&self, export: &str) -> CommentMediaIndex {
        let doc = self.read(export);
        let mut index = CommentMediaIndex::new();

        for comment in doc.comments {
            let Some(comment_id) = comment.id else {
                tracing::warn!("⚠️ Skipping export comment without an id attribute");
                continue;
            };

            match comment
                .body
                .and_then(|body| self.scan_comment(&comment_id, &body, &doc.names))
            {
                Ok((media, tables)) => {
                    tracing::debug!(
                        "📎 Comment {}: {} media record(s), {} table(s)",
                        comment_id,
                        media.len(),
                        tables.len()
                    );
                    index.insert(comment_id, media, tables);
                }
                Err(e) => {
                    tracing::warn!("⚠️ {}; continuing without its attachments", e);
                    index.insert(comment_id, Vec::new(), Vec::new());
                }
            }
        }

        index
    }

    /// 附件 id → 檔名
    pub fn attachment_names(&self, export: &str) -> HashMap<String, String> {
        self.read(export).names
    }

    fn scan_comment(
        &self,
        comment_id: &str,
        body: &str,
        names: &HashMap<String, String>,
    ) -> Result<(Vec<MediaRecord>, Vec<String>)> {
        let opened = ANCHOR_OPEN_RE.find_iter(body).count();
        let closed = ANCHOR_CLOSE_RE.find_iter(body).count();
        if opened != closed {
            return Err(MigrationError::MalformedMarkup {
                comment_id: comment_id.to_string(),
                message: format!("{} anchor(s) opened but {} closed", opened, closed),
            });
        }

        let mut media = Vec::new();
        self.scan_fragment(body, names, &mut media);
        let tables = self.plain_text_tables(body);
        Ok((media, tables))
    }

    fn scan_fragment(&self, html: &str, names: &HashMap<String, String>, out: &mut Vec<MediaRecord>) {
        for caps in MEDIA_TOKEN_RE.captures_iter(html) {
            if let Some(img_attrs) = caps.get(3) {
                let attrs = parse_attributes(img_attrs.as_str());
                if let Some(record) = self.image_record(&attrs, names) {
                    out.push(record);
                }
                continue;
            }

            let attrs = parse_attributes(caps.get(1).map(|m| m.as_str()).unwrap_or_default());
            let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let href = attrs.get("href").cloned().unwrap_or_default();

            let preview_type = attrs.get("file-preview-type").map(String::as_str);
            let attachment_type = attrs.get("data-attachment-type").map(String::as_str);

            let kind = if preview_type == Some("image") || attachment_type == Some("image") {
                Some(MediaKind::Image)
            } else if attachment_type == Some("file") || preview_type == Some("file") {
                Some(MediaKind::File)
            } else {
                None
            };

            match kind {
                Some(kind) if !href.is_empty() => {
                    let display_name = self.resolve_name(
                        &[attrs.get("data-attachment-name"), attrs.get("title")],
                        &href,
                        names,
                        &strip_tags(inner),
                    );
                    out.push(MediaRecord {
                        source_url: href,
                        display_name,
                        kind,
                    });
                }
                // 一般連結：裡面可能包著圖片
                _ => self.scan_fragment(inner, names, out),
            }
        }
    }

    fn image_record(
        &self,
        attrs: &HashMap<String, String>,
        names: &HashMap<String, String>,
    ) -> Option<MediaRecord> {
        let src = attrs.get("src")?;
        if ICON_PATH_RE.is_match(src) || !ATTACHMENT_PATH_RE.is_match(src) {
            return None;
        }

        let display_name = self.resolve_name(
            &[attrs.get("data-attachment-name"), attrs.get("alt")],
            src,
            names,
            "",
        );
        Some(MediaRecord {
            source_url: src.clone(),
            display_name,
            kind: MediaKind::Image,
        })
    }

    /// 名稱優先順序：明確屬性 → 附件 id 對照表 → 連結文字 → 預設值
    fn resolve_name(
        &self,
        explicit: &[Option<&String>],
        url: &str,
        names: &HashMap<String, String>,
        visible_text: &str,
    ) -> String {
        if let Some(name) = explicit
            .iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
        {
            return name.to_string();
        }

        if let Some(name) = ATTACHMENT_PATH_RE
            .captures(url)
            .and_then(|caps| names.get(&caps[1]))
        {
            return name.clone();
        }

        let visible_text = visible_text.trim();
        if !visible_text.is_empty() {
            return visible_text.to_string();
        }

        UNKNOWN_ATTACHMENT_NAME.to_string()
    }

    /// 留言中的表格轉為純文字（每列以 ` | ` 分隔）
    fn plain_text_tables(&self, html: &str) -> Vec<String> {
        TABLE_RE
            .captures_iter(html)
            .map(|table| {
                ROW_RE
                    .captures_iter(&table[1])
                    .map(|row| {
                        CELL_RE
                            .captures_iter(&row[1])
                            .map(|cell| strip_tags(&cell[1]))
                            .collect::<Vec<_>>()
                            .join(" | ")
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escape(html: &str) -> String {
        html.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
    }

    fn export_with(comments: &[(&str, &str)]) -> String {
        let mut xml = String::from("<rss><channel><item>\n<comments>\n");
        for (id, html) in comments {
            xml.push_str(&format!(
                "<comment id=\"{}\" author=\"ada\" created=\"Mon, 1 Feb 2021\">{}</comment>\n",
                id,
                escape(html)
            ));
        }
        xml.push_str("</comments>\n<attachments>\n");
        xml.push_str("<attachment id=\"10010\" name=\"screenshot.png\" size=\"100\"/>\n");
        xml.push_str("<attachment id=\"10011\" name=\"report.pdf\" size=\"200\"/>\n");
        xml.push_str("</attachments>\n</item></channel></rss>");
        xml
    }

    #[test]
    fn test_export_attributes_are_unescaped() {
        let xml = r#"<item><attachments><attachment id="7" name="a &amp; b.png"/></attachments></item>"#;
        let names = MediaCorrelator::new().attachment_names(xml);
        assert_eq!(names.get("7").map(String::as_str), Some("a & b.png"));
    }

    #[test]
    fn test_unknown_entity_only_affects_its_comment() {
        let mut xml = export_with(&[("2", r#"<img src="/secure/attachment/10010/x.png"/>"#)]);
        xml = xml.replace(
            "<comments>\n",
            "<comments>\n<comment id=\"1\">caf&eacute;</comment>\n",
        );
        let index = MediaCorrelator::new().correlate(&xml);

        assert_eq!(index.len(), 2);
        assert!(index.media_for("1").is_empty());
        assert_eq!(index.media_for("2")[0].display_name, "screenshot.png");
    }

    #[test]
    fn test_truncated_export_keeps_comments_read_so_far() {
        let xml = export_with(&[("1", "<p>one</p>"), ("2", "<p>two</p>")]);
        let cut = &xml[..xml.find("<comment id=\"2\"").unwrap()];
        let broken = format!("{}</channel>", cut);

        let index = MediaCorrelator::new().correlate(&broken);
        assert_eq!(index.len(), 1);
        assert!(index.media_for("1").is_empty());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("&lt;p&gt;a &amp; b&lt;/p&gt;"), "<p>a & b</p>");
        assert_eq!(decode_entities("&#39;x&#x2F;y&quot;"), "'x/y\"");
        assert_eq!(decode_entities("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn test_attachment_names_table() {
        let names = MediaCorrelator::new().attachment_names(&export_with(&[]));
        assert_eq!(names.get("10010").map(String::as_str), Some("screenshot.png"));
        assert_eq!(names.get("10011").map(String::as_str), Some("report.pdf"));
    }

    #[test]
    fn test_media_preserves_encounter_order() {
        let html = concat!(
            "<p>first</p>",
            r#"<a href="/secure/attachment/10011/report.pdf" data-attachment-type="file" data-attachment-name="report.pdf">report.pdf</a>"#,
            r#"<span class="image-wrap"><img src="/secure/thumbnail/10010/screenshot.png" /></span>"#,
            r#"<a href="/secure/attachment/10012/photo.jpg" file-preview-type="image" title="photo.jpg"><img src="/secure/thumbnail/10012/photo.jpg"/></a>"#,
        );
        let index = MediaCorrelator::new().correlate(&export_with(&[("100", html)]));
        let media = index.media_for("100");

        assert_eq!(media.len(), 3);
        assert_eq!(media[0].display_name, "report.pdf");
        assert_eq!(media[0].kind, MediaKind::File);
        // name resolved through the attachment table
        assert_eq!(media[1].display_name, "screenshot.png");
        assert_eq!(media[1].kind, MediaKind::Image);
        assert_eq!(media[1].source_url, "/secure/thumbnail/10010/screenshot.png");
        // preview wrapper yields one record, the nested thumbnail is not counted twice
        assert_eq!(media[2].display_name, "photo.jpg");
        assert_eq!(media[2].source_url, "/secure/attachment/10012/photo.jpg");
    }

    #[test]
    fn test_decorative_icons_are_excluded() {
        let html = concat!(
            r#"<img class="emoticon" src="/images/icons/emoticons/smile.png" alt="(smile)"/>"#,
            r#"<img src="https://cdn.example.com/banner.png"/>"#,
        );
        let index = MediaCorrelator::new().correlate(&export_with(&[("5", html)]));
        assert!(index.media_for("5").is_empty());
    }

    #[test]
    fn test_name_falls_back_to_visible_text_then_sentinel() {
        let html = concat!(
            r#"<a href="/secure/attachment/999/x" data-attachment-type="file"><b>notes.txt</b></a>"#,
            r#"<a href="/secure/attachment/998/y" data-attachment-type="file"></a>"#,
        );
        let index = MediaCorrelator::new().correlate(&export_with(&[("7", html)]));
        let media = index.media_for("7");
        assert_eq!(media[0].display_name, "notes.txt");
        assert_eq!(media[1].display_name, UNKNOWN_ATTACHMENT_NAME);
    }

    #[test]
    fn test_malformed_comment_does_not_abort_batch() {
        let broken = r#"<a href="/secure/attachment/10010/a.png" file-preview-type="image">never closed"#;
        let good = r#"<img src="/rest/api/3/attachment/content/10011" alt="report.pdf"/>"#;
        let index = MediaCorrelator::new().correlate(&export_with(&[("1", broken), ("2", good)]));

        assert_eq!(index.len(), 2);
        assert!(index.media_for("1").is_empty());
        assert_eq!(index.media_for("2").len(), 1);
        assert_eq!(index.media_for("2")[0].display_name, "report.pdf");
    }

    #[test]
    fn test_tables_are_flattened_to_text() {
        let html = "<table><tr><th>Env</th><th>Result</th></tr><tr><td>prod</td><td><b>ok</b></td></tr></table>";
        let index = MediaCorrelator::new().correlate(&export_with(&[("3", html)]));
        assert_eq!(index.tables_for("3"), &["Env | Result\nprod | ok".to_string()]);
    }
}
