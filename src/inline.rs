//! Image inliner: replaces remote image references in an evaluated tree
//! with locally-fetched data URIs.
//!
//! The walk is generic over the two tree shapes the pipeline produces
//! (markup-element trees and scene-node trees) through the `InlineShape`
//! capability trait. Fetches within one pass are deduplicated by URL, and
//! every per-image problem is a soft failure: the node keeps its original
//! source and the pipeline carries on.

use std::collections::HashMap;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::logs::{LogLevel, Logger};
use crate::raster::encode_data_uri;

/// Shape capabilities the walk needs from a tree
pub trait InlineShape {
    fn is_image(node: &Value) -> bool;
    fn src(node: &Value) -> Option<String>;
    fn set_src(node: &mut Value, uri: String);
    /// The children value, when present: an array, or a lone child node
    fn children_mut(node: &mut Value) -> Option<&mut Value>;
}

/// Markup-element trees: `{ type: "img", props: { src, children } }`
pub struct MarkupShape;

impl InlineShape for MarkupShape {
    fn is_image(node: &Value) -> bool {
        node.get("type")
            .and_then(Value::as_str)
            .map(|t| t.eq_ignore_ascii_case("img"))
            .unwrap_or(false)
    }

    fn src(node: &Value) -> Option<String> {
        node.get("props")?
            .get("src")?
            .as_str()
            .map(str::to_string)
    }

    fn set_src(node: &mut Value, uri: String) {
        if let Some(props) = node.get_mut("props").and_then(Value::as_object_mut) {
            props.insert("src".to_string(), Value::from(uri));
        }
    }

    fn children_mut(node: &mut Value) -> Option<&mut Value> {
        node.get_mut("props")?.get_mut("children")
    }
}

/// Scene-node trees: `{ type: "image", src, children }`
pub struct SceneShape;

impl InlineShape for SceneShape {
    fn is_image(node: &Value) -> bool {
        node.get("type").and_then(Value::as_str) == Some("image")
    }

    fn src(node: &Value) -> Option<String> {
        node.get("src")?.as_str().map(str::to_string)
    }

    fn set_src(node: &mut Value, uri: String) {
        if let Some(obj) = node.as_object_mut() {
            obj.insert("src".to_string(), Value::from(uri));
        }
    }

    fn children_mut(node: &mut Value) -> Option<&mut Value> {
        node.get_mut("children")
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InlineStats {
    pub replaced: usize,
    pub failed: usize,
    /// Non-data-URI image references encountered
    pub seen: usize,
}

pub struct ImageInliner<'a> {
    client: &'a Client,
    logs: &'a Logger,
}

impl<'a> ImageInliner<'a> {
    pub fn new(client: &'a Client, logs: &'a Logger) -> Self {
        Self { client, logs }
    }

    /// Structural copy of the tree with every resolvable remote image
    /// reference replaced by a data URI.
    pub fn inline<S: InlineShape>(&self, tree: &Value) -> Value {
        let mut tree = tree.clone();
        let mut cache: HashMap<String, Option<String>> = HashMap::new();
        let mut stats = InlineStats::default();
        self.visit::<S>(&mut tree, &mut cache, &mut stats);
        if stats.seen > 0 {
            let mut message = format!("[img] inlined {} image(s)", stats.replaced);
            if stats.failed > 0 {
                message.push_str(&format!(", {} failed", stats.failed));
            }
            self.logs.append(LogLevel::Info, message);
        }
        tree
    }

    fn visit<S: InlineShape>(
        &self,
        node: &mut Value,
        cache: &mut HashMap<String, Option<String>>,
        stats: &mut InlineStats,
    ) {
        if !node.is_object() {
            return;
        }

        if S::is_image(node) {
            if let Some(src) = S::src(node) {
                if !src.is_empty() && !is_data_uri(&src) {
                    stats.seen += 1;
                    let outcome = match cache.get(&src) {
                        Some(cached) => cached.clone(),
                        None => {
                            let fetched = match self.fetch_as_data_uri(&src) {
                                Ok(uri) => Some(uri),
                                Err(reason) => {
                                    self.logs.append(
                                        LogLevel::Warn,
                                        format!("[img] failed to inline {} => {}", src, reason),
                                    );
                                    None
                                }
                            };
                            cache.insert(src.clone(), fetched.clone());
                            fetched
                        }
                    };
                    match outcome {
                        Some(uri) => {
                            S::set_src(node, uri);
                            stats.replaced += 1;
                        }
                        None => stats.failed += 1,
                    }
                }
            }
        }

        if let Some(children) = S::children_mut(node) {
            match children {
                Value::Array(items) => {
                    for item in items {
                        self.visit::<S>(item, cache, stats);
                    }
                }
                lone => self.visit::<S>(lone, cache, stats),
            }
        }
    }

    fn fetch_as_data_uri(&self, src: &str) -> std::result::Result<String, String> {
        let parsed =
            url::Url::parse(src).map_err(|e| format!("not an absolute URL ({})", e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(format!("unsupported scheme `{}`", parsed.scheme()));
        }
        // No cookies, no credentials: the blocking client sends bare GETs.
        let response = self.client.get(src).send().map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {} for {}", response.status().as_u16(), src));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = response.bytes().map_err(|e| e.to_string())?;
        Ok(encode_data_uri(&bytes, &mime))
    }
}

fn is_data_uri(s: &str) -> bool {
    s.get(..5)
        .map(|prefix| prefix.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}
