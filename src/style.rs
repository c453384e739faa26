//! Style value coercion and the utility-class service.
//!
//! Scene styles travel as loose JSON maps. Two canonicalizations happen on
//! the way to the rasterizer: hex color strings become integers, and
//! percentage-suffixed strings become the `{"percentage": n}` object the
//! `percentage()` helper produces. Both are forgiving: values that do not
//! match the pattern pass through untouched.

use serde_json::{Map, Value};

/// Canonical encoding of a percentage length
pub fn percentage(value: f64) -> Value {
    let mut obj = Map::new();
    obj.insert("percentage".to_string(), Value::from(value));
    Value::Object(obj)
}

/// `"#ff0000"` (string) -> `0xff0000` (number). Non-hex strings and
/// non-strings pass through.
pub fn to_color(value: &Value) -> Value {
    if value.is_number() {
        return value.clone();
    }
    let Some(s) = value.as_str() else {
        return value.clone();
    };
    let hex = s.trim();
    if let Some(digits) = hex.strip_prefix('#') {
        if !digits.is_empty() {
            if let Ok(v) = u32::from_str_radix(digits, 16) {
                return Value::from(v);
            }
        }
    }
    value.clone()
}

/// `"50%"` -> `{"percentage": 50.0}`; `"50"` passes through unchanged.
pub fn map_percent(value: &Value) -> Value {
    if let Some(s) = value.as_str() {
        if let Some(num) = s.strip_suffix('%') {
            if let Ok(n) = num.trim().parse::<f64>() {
                return percentage(n);
            }
        }
    }
    value.clone()
}

/// Normalize every entry of a style-like map: color-named keys go through
/// `to_color`, everything else through `map_percent`.
pub fn normalize_style(style: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in style {
        if key.to_lowercase().contains("color") {
            out.insert(key.clone(), to_color(value));
        } else {
            out.insert(key.clone(), map_percent(value));
        }
    }
    out
}

/// Translates a utility-class string (`"flex items-center bg-white"`) into
/// a style object. External collaborator seam: the engine and evaluator
/// only see this trait.
pub trait StyleUtility: Send + Sync {
    fn classes_to_style(&self, classes: &str) -> Map<String, Value>;
}

/// Built-in utility translator covering the layout, typography, spacing
/// and color subset the playground documents use. Unknown classes are
/// skipped.
pub struct UtilityClasses;

impl StyleUtility for UtilityClasses {
    fn classes_to_style(&self, classes: &str) -> Map<String, Value> {
        let mut style = Map::new();
        for class in classes.split_whitespace() {
            apply_class(&mut style, class);
        }
        style
    }
}

fn put(style: &mut Map<String, Value>, key: &str, value: Value) {
    style.insert(key.to_string(), value);
}

fn full() -> Value {
    percentage(100.0)
}

/// Spacing scale: one unit = 4px
fn scale_px(n: &str) -> Option<Value> {
    n.parse::<f64>().ok().map(|v| Value::from(v * 4.0))
}

/// `[80px]`, `[#112233]`, `[42]` arbitrary-value syntax
fn arbitrary(raw: &str) -> Option<&str> {
    raw.strip_prefix('[').and_then(|r| r.strip_suffix(']'))
}

fn arbitrary_px(raw: &str) -> Option<Value> {
    let inner = arbitrary(raw)?;
    let digits = inner.strip_suffix("px").unwrap_or(inner);
    digits.parse::<f64>().ok().map(Value::from)
}

fn named_color(name: &str) -> Option<&'static str> {
    Some(match name {
        "white" => "#ffffff",
        "black" => "#000000",
        "red" | "red-500" => "#ef4444",
        "green" | "green-500" => "#22c55e",
        "blue" | "blue-500" => "#3b82f6",
        "yellow" | "yellow-500" => "#eab308",
        "gray" | "gray-500" => "#6b7280",
        "slate" | "slate-500" => "#64748b",
        _ => return None,
    })
}

fn color_value(raw: &str) -> Option<Value> {
    if let Some(inner) = arbitrary(raw) {
        if inner.starts_with('#') {
            return Some(Value::from(inner));
        }
        return None;
    }
    named_color(raw).map(Value::from)
}

fn font_size(raw: &str) -> Option<Value> {
    let px = match raw {
        "xs" => 12.0,
        "sm" => 14.0,
        "base" => 16.0,
        "lg" => 18.0,
        "xl" => 20.0,
        "2xl" => 24.0,
        "3xl" => 30.0,
        "4xl" => 36.0,
        "5xl" => 48.0,
        "6xl" => 60.0,
        "7xl" => 72.0,
        "8xl" => 96.0,
        "9xl" => 128.0,
        _ => return None,
    };
    Some(Value::from(px))
}

fn apply_class(style: &mut Map<String, Value>, class: &str) {
    match class {
        "flex" => return put(style, "display", Value::from("flex")),
        "flex-row" => return put(style, "flexDirection", Value::from("row")),
        "flex-col" => return put(style, "flexDirection", Value::from("column")),
        "relative" => return put(style, "position", Value::from("relative")),
        "absolute" => return put(style, "position", Value::from("absolute")),
        "inset-0" => {
            for side in ["top", "right", "bottom", "left"] {
                put(style, side, Value::from(0.0));
            }
            return;
        }
        "w-full" => return put(style, "width", full()),
        "h-full" => return put(style, "height", full()),
        "items-start" => return put(style, "alignItems", Value::from("flex-start")),
        "items-center" => return put(style, "alignItems", Value::from("center")),
        "items-end" => return put(style, "alignItems", Value::from("flex-end")),
        "justify-start" => return put(style, "justifyContent", Value::from("flex-start")),
        "justify-center" => return put(style, "justifyContent", Value::from("center")),
        "justify-end" => return put(style, "justifyContent", Value::from("flex-end")),
        "justify-between" => return put(style, "justifyContent", Value::from("space-between")),
        "text-left" => return put(style, "textAlign", Value::from("left")),
        "text-center" => return put(style, "textAlign", Value::from("center")),
        "text-right" => return put(style, "textAlign", Value::from("right")),
        "font-normal" => return put(style, "fontWeight", Value::from(400.0)),
        "font-medium" => return put(style, "fontWeight", Value::from(500.0)),
        "font-bold" => return put(style, "fontWeight", Value::from(700.0)),
        "font-black" => return put(style, "fontWeight", Value::from(900.0)),
        "rounded" => return put(style, "borderRadius", Value::from(4.0)),
        "rounded-lg" => return put(style, "borderRadius", Value::from(8.0)),
        "rounded-full" => return put(style, "borderRadius", Value::from(9999.0)),
        _ => {}
    }

    if let Some((prefix, rest)) = class.split_once('-') {
        match prefix {
            "bg" => {
                if let Some(color) = color_value(rest) {
                    return put(style, "backgroundColor", color);
                }
            }
            "text" => {
                if let Some(color) = color_value(rest) {
                    return put(style, "color", color);
                }
                if let Some(size) = font_size(rest).or_else(|| arbitrary_px(rest)) {
                    return put(style, "fontSize", size);
                }
            }
            "border" => {
                if let Some(color) = color_value(rest) {
                    return put(style, "borderColor", color);
                }
            }
            "w" => {
                if let Some(v) = arbitrary_px(rest).or_else(|| scale_px(rest)) {
                    return put(style, "width", v);
                }
            }
            "h" => {
                if let Some(v) = arbitrary_px(rest).or_else(|| scale_px(rest)) {
                    return put(style, "height", v);
                }
            }
            "gap" => {
                if let Some(v) = scale_px(rest) {
                    return put(style, "gap", v);
                }
            }
            "m" | "mx" | "my" | "mt" | "mb" | "ml" | "mr" | "p" | "px" | "py" | "pt" | "pb"
            | "pl" | "pr" => {
                if let Some(v) = arbitrary_px(rest).or_else(|| scale_px(rest)) {
                    let base = if prefix.starts_with('m') { "margin" } else { "padding" };
                    let keys: &[&str] = match &prefix[1..] {
                        "" => &["Top", "Right", "Bottom", "Left"],
                        "x" => &["Left", "Right"],
                        "y" => &["Top", "Bottom"],
                        "t" => &["Top"],
                        "b" => &["Bottom"],
                        "l" => &["Left"],
                        "r" => &["Right"],
                        _ => &[],
                    };
                    for side in keys {
                        put(style, &format!("{}{}", base, side), v.clone());
                    }
                    return;
                }
            }
            _ => {}
        }
    }
    // Unknown class: skipped.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_suffix_converts_and_bare_number_passes() {
        assert_eq!(map_percent(&Value::from("50%")), percentage(50.0));
        assert_eq!(map_percent(&Value::from("50")), Value::from("50"));
        assert_eq!(map_percent(&Value::from(50)), Value::from(50));
    }

    #[test]
    fn hex_colors_become_integers() {
        assert_eq!(to_color(&Value::from("#ff0000")), Value::from(0xff0000u32));
        assert_eq!(to_color(&Value::from("#fff")), Value::from(0xfffu32));
        assert_eq!(to_color(&Value::from("red")), Value::from("red"));
        assert_eq!(to_color(&Value::from(7)), Value::from(7));
    }

    #[test]
    fn normalize_routes_by_key_name() {
        let mut style = Map::new();
        style.insert("backgroundColor".into(), Value::from("#00ff00"));
        style.insert("width".into(), Value::from("50%"));
        style.insert("fontSize".into(), Value::from(32));
        let out = normalize_style(&style);
        assert_eq!(out["backgroundColor"], Value::from(0x00ff00u32));
        assert_eq!(out["width"], percentage(50.0));
        assert_eq!(out["fontSize"], Value::from(32));
    }

    #[test]
    fn utility_classes_cover_default_document() {
        let style =
            UtilityClasses.classes_to_style("flex items-center justify-center w-full h-full");
        assert_eq!(style["display"], Value::from("flex"));
        assert_eq!(style["alignItems"], Value::from("center"));
        assert_eq!(style["justifyContent"], Value::from("center"));
        assert_eq!(style["width"], percentage(100.0));
        assert_eq!(style["height"], percentage(100.0));
    }

    #[test]
    fn arbitrary_values_and_spacing_scale() {
        let style = UtilityClasses.classes_to_style("text-[80px] mx-20 bg-[#112233] unknown-thing");
        assert_eq!(style["fontSize"], Value::from(80.0));
        assert_eq!(style["marginLeft"], Value::from(80.0));
        assert_eq!(style["marginRight"], Value::from(80.0));
        assert_eq!(style["backgroundColor"], Value::from("#112233"));
        assert!(!style.contains_key("unknown-thing"));
    }

    #[test]
    fn inset_expands_to_all_sides() {
        let style = UtilityClasses.classes_to_style("absolute inset-0");
        assert_eq!(style["position"], Value::from("absolute"));
        for side in ["top", "right", "bottom", "left"] {
            assert_eq!(style[side], Value::from(0.0));
        }
    }
}
