//! Canonical scene-graph model and its diagnostic pretty-printer.
//!
//! `SceneNode` is the only wire format the crate defines: the rasterizer
//! consumes exactly this shape (serde-tagged by `type`), and both dialects
//! funnel into it through the tree builder.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type StyleMap = Map<String, Value>;

/// The renderable tree handed to the rasterizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SceneNode {
    Container {
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        style: StyleMap,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<SceneNode>,
    },
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        style: StyleMap,
    },
    Image {
        #[serde(default)]
        src: String,
        #[serde(rename = "tintColor", default, skip_serializing_if = "Option::is_none")]
        tint_color: Option<Value>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        style: StyleMap,
    },
}

impl SceneNode {
    pub fn container(style: StyleMap, children: Vec<SceneNode>) -> Self {
        SceneNode::Container { style, children }
    }

    pub fn text(text: impl Into<String>, style: StyleMap) -> Self {
        SceneNode::Text {
            text: text.into(),
            style,
        }
    }
}

const MAX_PRETTY_LEN: usize = 4000;
const MAX_STRING_LEN: usize = 160;

/// Render a scene as an indented markup-like string for logs. Data URIs
/// and long strings are compacted to keep the output scannable.
pub fn pretty(node: &SceneNode) -> String {
    let mut out = String::new();
    write_node(node, 0, &mut out);
    if out.len() > MAX_PRETTY_LEN {
        let mut cut = MAX_PRETTY_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("\n/* … trimmed … */");
    }
    out
}

fn write_node(node: &SceneNode, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match node {
        SceneNode::Container { style, children } => {
            out.push_str(&format!("{}<container{}>", pad, style_attr(style)));
            if children.is_empty() {
                out.push_str("</container>");
                return;
            }
            for child in children {
                out.push('\n');
                write_node(child, depth + 1, out);
            }
            out.push_str(&format!("\n{}</container>", pad));
        }
        SceneNode::Text { text, style } => {
            out.push_str(&format!(
                "{}<text{}>{}</text>",
                pad,
                style_attr(style),
                compact_string(text)
            ));
        }
        SceneNode::Image {
            src,
            tint_color,
            style,
        } => {
            let tint = tint_color
                .as_ref()
                .map(|t| format!(" tintColor={{{}}}", t))
                .unwrap_or_default();
            out.push_str(&format!(
                "{}<image src={}{}{}/>",
                pad,
                compact_string(src),
                tint,
                style_attr(style)
            ));
        }
    }
}

fn style_attr(style: &StyleMap) -> String {
    if style.is_empty() {
        return String::new();
    }
    let body = serde_json::to_string(style).unwrap_or_else(|_| "{…}".to_string());
    format!(" style={{{}}}", body)
}

fn compact_string(s: &str) -> String {
    if is_data_uri_head(s) {
        let head: String = s.chars().take(64).collect();
        return format!("\"{}… (data uri, {} chars)\"", head, s.chars().count());
    }
    let escaped = s.replace('"', "\\\"");
    if escaped.chars().count() > MAX_STRING_LEN {
        let head: String = escaped.chars().take(MAX_STRING_LEN).collect();
        return format!("\"{}… ({} chars)\"", head, escaped.chars().count());
    }
    format!("\"{}\"", escaped)
}

fn is_data_uri_head(s: &str) -> bool {
    s.get(..5)
        .map(|p| p.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
        && s.contains(";base64,")
}
