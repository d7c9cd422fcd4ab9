use serde_json::json;
use tracker_migrate::core::DocumentRenderer;
use tracker_migrate::domain::model::{MediaKind, MediaRecord};
use tracker_migrate::utils::error::MigrationError;

fn renderer() -> DocumentRenderer {
    DocumentRenderer::new("https://acme.atlassian.net/")
}

#[test]
fn test_bug_report_document() {
    let doc = json!({
        "type": "doc",
        "version": 1,
        "content": [
            {"type": "heading", "attrs": {"level": 2}, "content": [{"type": "text", "text": "Steps"}]},
            {"type": "orderedList", "attrs": {"order": 1}, "content": [
                {"type": "listItem", "content": [{"type": "paragraph", "content": [{"type": "text", "text": "Open the editor"}]}]},
                {"type": "listItem", "content": [{"type": "paragraph", "content": [
                    {"type": "text", "text": "Press "},
                    {"type": "text", "text": "Save", "marks": [{"type": "strong"}]}
                ]}]}
            ]},
            {"type": "paragraph", "content": [
                {"type": "mention", "attrs": {"id": "1", "text": "@Ada"}},
                {"type": "text", "text": "can reproduce it, see "},
                {"type": "inlineCard", "attrs": {"url": "https://status.acme.io"}}
            ]},
            {"type": "codeBlock", "attrs": {"language": "sh"}, "content": [{"type": "text", "text": "make run"}]}
        ]
    });

    let out = renderer().render_json(&doc, &[]).unwrap();
    assert_eq!(
        out,
        concat!(
            "## Steps\n\n",
            "1. Open the editor\n",
            "2. Press **Save**\n\n",
            "Ada can reproduce it, see [Link](https://status.acme.io)\n\n",
            "```sh\nmake run\n```"
        )
    );
}

#[test]
fn test_media_sequence_is_consumed_left_to_right() {
    let doc = json!({
        "type": "doc",
        "content": [
            {"type": "mediaSingle", "content": [{"type": "media", "attrs": {"id": "a"}}]},
            {"type": "mediaGroup", "content": [
                {"type": "media", "attrs": {"id": "b"}},
                {"type": "media", "attrs": {"id": "c"}}
            ]}
        ]
    });
    let media = vec![
        MediaRecord {
            source_url: "/secure/thumbnail/1/one.png".to_string(),
            display_name: "one.png".to_string(),
            kind: MediaKind::Image,
        },
        MediaRecord {
            source_url: "https://cdn.acme.io/files/two.pdf".to_string(),
            display_name: "two.pdf".to_string(),
            kind: MediaKind::File,
        },
    ];

    let out = renderer().render_json(&doc, &media).unwrap();
    assert!(out.contains("[one.png](https://acme.atlassian.net/secure/attachment/1/one.png)"));
    assert!(out.contains("[two.pdf](https://cdn.acme.io/files/two.pdf)"));
    assert!(out.contains("[attachment unavailable]"));
}

#[test]
fn test_unknown_node_type_is_rejected() {
    let doc = json!({"type": "doc", "content": [{"type": "expand", "content": []}]});
    let err = renderer().render_json(&doc, &[]).unwrap_err();
    assert!(matches!(err, MigrationError::UnsupportedNodeType { node_type } if node_type == "expand"));
}
