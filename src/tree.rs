//! Tree builder: converts an evaluated value into the canonical scene
//! graph.
//!
//! Markup-element trees are mapped tag-by-tag; script results are already
//! scene-shaped and only need validation. A standalone JSON builder covers
//! plain tagged object trees, normalizing colors and percentage strings on
//! the way through.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::scene::{SceneNode, StyleMap};
use crate::style::{normalize_style, to_color};
use crate::Dialect;

const CONTAINER_TAGS: &[&str] = &[
    "div", "section", "main", "header", "footer", "article", "aside", "nav", "figure", "ul",
    "ol", "li",
];

const TEXT_TAGS: &[&str] = &[
    "span", "p", "h1", "h2", "h3", "h4", "h5", "h6", "strong", "em", "b", "i", "label",
];

/// Build the scene for the dialect that produced the value
pub fn build(value: &Value, dialect: Dialect) -> Result<SceneNode> {
    match dialect {
        Dialect::Markup => from_markup(value),
        Dialect::Script => from_scene_value(value),
    }
}

fn from_markup(value: &Value) -> Result<SceneNode> {
    match value {
        Value::String(s) => Ok(SceneNode::text(s.clone(), Map::new())),
        Value::Number(n) => Ok(SceneNode::text(n.to_string(), Map::new())),
        Value::Object(_) => from_markup_element(value),
        other => Err(Error::build(format!(
            "unsupported markup value: {}",
            other
        ))),
    }
}

fn from_markup_element(value: &Value) -> Result<SceneNode> {
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::build("markup element has no type"))?;
    let props = value
        .get("props")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let style = props
        .get("style")
        .and_then(Value::as_object)
        .map(normalize_style)
        .unwrap_or_default();
    let children = child_values(&props);

    if tag == "$fragment" || CONTAINER_TAGS.contains(&tag) {
        let children = children
            .iter()
            .map(from_markup)
            .collect::<Result<Vec<_>>>()?;
        return Ok(SceneNode::container(style, children));
    }

    if TEXT_TAGS.contains(&tag) {
        let mut content = String::new();
        flatten_text(&children, &mut content);
        return Ok(SceneNode::text(content, style));
    }

    if tag == "img" {
        let src = props
            .get("src")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tint_color = props.get("tintColor").map(to_color);
        return Ok(SceneNode::Image {
            src,
            tint_color,
            style,
        });
    }

    Err(Error::build(format!("unsupported element type `{}`", tag)))
}

fn child_values(props: &Map<String, Value>) -> Vec<Value> {
    match props.get("children") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    }
}

fn flatten_text(values: &[Value], out: &mut String) {
    for value in values {
        match value {
            Value::String(s) => out.push_str(s),
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::Object(obj) => {
                if let Some(props) = obj.get("props").and_then(Value::as_object) {
                    flatten_text(&child_values(props), out);
                }
            }
            _ => {}
        }
    }
}

/// Script results are scene-shaped already; this validates and converts.
fn from_scene_value(value: &Value) -> Result<SceneNode> {
    serde_json::from_value(value.clone())
        .map_err(|e| Error::build(format!("value is not a scene node: {}", e)))
}

/// Standalone builder for plain JSON trees tagged by `type`. Loose
/// top-level props merge into the style, which is normalized recursively.
pub fn scene_from_json(value: &Value) -> Result<SceneNode> {
    let Some(obj) = value.as_object() else {
        return Err(Error::build("invalid JSON node"));
    };
    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::build("JSON node has no type"))?;
    match tag {
        "container" => {
            let style = merged_style(obj, &["children"]);
            let children = match obj.get("children") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(scene_from_json)
                    .collect::<Result<Vec<_>>>()?,
                Some(other) => vec![scene_from_json(other)?],
            };
            Ok(SceneNode::container(style, children))
        }
        "text" => {
            let content = match obj.get("text") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return Err(Error::build("text node has no text")),
            };
            let style = merged_style(obj, &["text"]);
            Ok(SceneNode::text(content, style))
        }
        "image" => {
            let src = obj
                .get("src")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let tint_color = obj.get("tintColor").map(to_color);
            let style = merged_style(obj, &["src", "tintColor"]);
            Ok(SceneNode::Image {
                src,
                tint_color,
                style,
            })
        }
        other => Err(Error::build(format!("unsupported node type {}", other))),
    }
}

/// `style` entries plus loose top-level props (minus `type` and the node's
/// own fields), normalized.
fn merged_style(obj: &Map<String, Value>, skip: &[&str]) -> StyleMap {
    let mut merged = obj
        .get("style")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for (key, value) in obj {
        if key == "type" || key == "style" || skip.contains(&key.as_str()) {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    normalize_style(&merged)
}
