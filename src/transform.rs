//! Markup transform service: rewrites JSX-ish element syntax into factory
//! call expressions the evaluator can execute.
//!
//! The service is a seam: the compiler only sees the `MarkupTransform`
//! trait. The built-in implementation is a single-pass scanner that copies
//! plain JS through untouched (string-, template- and comment-aware) and
//! rewrites each element it finds in expression position. The factory
//! names depend on the build mode, and the emitted code carries the
//! runtime-import directives a standalone transpiler would inject; the
//! compiler strips those before evaluation.

use crate::BuildMode;

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub build_mode: BuildMode,
}

/// Synthetic helper names a transformed module calls into
#[derive(Debug, Clone)]
pub struct JsxFactories {
    /// Single-child element factory
    pub create: String,
    /// Multi-child element factory
    pub create_list: String,
    /// Fragment marker binding
    pub fragment: String,
}

impl JsxFactories {
    pub fn for_mode(mode: BuildMode) -> Self {
        match mode {
            BuildMode::Production => Self {
                create: "_jsx".into(),
                create_list: "_jsxs".into(),
                fragment: "_Fragment".into(),
            },
            BuildMode::Development => Self {
                create: "_jsxDEV".into(),
                create_list: "_jsxDEV".into(),
                fragment: "_Fragment".into(),
            },
        }
    }

    fn import_directive(&self, mode: BuildMode) -> String {
        match mode {
            BuildMode::Production => {
                "import { jsx as _jsx, jsxs as _jsxs, Fragment as _Fragment } from \"markup/jsx-runtime\";"
                    .to_string()
            }
            BuildMode::Development => {
                "import { jsxDEV as _jsxDEV, Fragment as _Fragment } from \"markup/jsx-dev-runtime\";"
                    .to_string()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Executable text, including the injected import directives
    pub code: String,
    /// Exact directive lines the caller must remove before evaluation
    pub imports_to_strip: Vec<String>,
    pub factories: JsxFactories,
}

/// Transform failure. The message carries the position as a trailing
/// `at line:column` so callers can pattern-match it out.
#[derive(Debug, Clone)]
pub struct TransformError {
    pub message: String,
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransformError {}

pub trait MarkupTransform: Send + Sync {
    fn transform(
        &self,
        source: &str,
        options: &TransformOptions,
    ) -> std::result::Result<TransformOutput, TransformError>;
}

/// The built-in single-pass transformer
pub struct BuiltinTransform;

impl MarkupTransform for BuiltinTransform {
    fn transform(
        &self,
        source: &str,
        options: &TransformOptions,
    ) -> std::result::Result<TransformOutput, TransformError> {
        let factories = JsxFactories::for_mode(options.build_mode);
        let mut scanner = Scanner::new(source, factories.clone());
        let body = scanner.scan_js(None)?;
        let directive = factories.import_directive(options.build_mode);
        Ok(TransformOutput {
            code: format!("{}\n{}", directive, body),
            imports_to_strip: vec![directive],
            factories,
        })
    }
}

const EXPR_KEYWORDS: &[&str] = &[
    "return", "typeof", "delete", "void", "in", "of", "new", "do", "else", "case", "yield",
    "await", "instanceof",
];

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    // Last two significant (non-whitespace) chars copied in JS mode, plus
    // the word they terminate; together they decide whether `<` opens an
    // element or is a comparison.
    prev1: Option<char>,
    prev2: Option<char>,
    word: String,
    word_boundary: bool,
    factories: JsxFactories,
}

impl Scanner {
    fn new(source: &str, factories: JsxFactories) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            prev1: None,
            prev2: None,
            word: String::new(),
            word_boundary: false,
            factories,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, message: &str) -> TransformError {
        TransformError {
            message: format!("{} at {}:{}", message, self.line, self.col),
        }
    }

    fn expect(&mut self, expected: char) -> std::result::Result<(), TransformError> {
        if self.peek() == Some(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected `{}`", expected)))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn note(&mut self, c: char) {
        if c.is_whitespace() {
            // Whitespace ends the current word but keeps it visible for
            // the keyword check at the next `<`.
            self.word_boundary = true;
            return;
        }
        self.prev2 = self.prev1;
        self.prev1 = Some(c);
        if is_ident_part(c) {
            if self.word_boundary {
                self.word.clear();
            }
            self.word.push(c);
        } else {
            self.word.clear();
        }
        self.word_boundary = false;
    }

    fn in_expression_position(&self) -> bool {
        match self.prev1 {
            None => true,
            Some('>') => self.prev2 == Some('='), // arrow body
            Some(c) if "(,=?:[{;!&|+-*/%".contains(c) => true,
            Some(c) if is_ident_part(c) => EXPR_KEYWORDS.contains(&self.word.as_str()),
            _ => false,
        }
    }

    fn jsx_ahead(&self) -> bool {
        if !self.in_expression_position() {
            return false;
        }
        matches!(self.peek_at(1), Some(c) if is_ident_start(c) || c == '>')
    }

    /// Copy JS through until `terminator` (or end of input), rewriting any
    /// element found in expression position.
    fn scan_js(
        &mut self,
        terminator: Option<char>,
    ) -> std::result::Result<String, TransformError> {
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                if terminator.is_some() {
                    return Err(self.error("unexpected end of input"));
                }
                return Ok(out);
            };
            if Some(c) == terminator {
                return Ok(out);
            }
            match c {
                '"' | '\'' => self.copy_string(&mut out, c)?,
                '`' => self.copy_template(&mut out)?,
                '/' if self.peek_at(1) == Some('/') => {
                    while matches!(self.peek(), Some(c) if c != '\n') {
                        out.push(self.bump().unwrap_or('\n'));
                    }
                }
                '/' if self.peek_at(1) == Some('*') => self.copy_block_comment(&mut out)?,
                '{' => {
                    self.bump();
                    out.push('{');
                    let inner = self.scan_js(Some('}'))?;
                    out.push_str(&inner);
                    self.expect('}')?;
                    out.push('}');
                    self.prev2 = self.prev1;
                    self.prev1 = Some('}');
                    self.word.clear();
                }
                '<' if self.jsx_ahead() => {
                    out.push_str(&self.parse_element()?);
                    // The rewritten call is an expression result
                    self.prev2 = self.prev1;
                    self.prev1 = Some(')');
                    self.word.clear();
                }
                _ => {
                    self.bump();
                    out.push(c);
                    self.note(c);
                }
            }
        }
    }

    fn copy_string(
        &mut self,
        out: &mut String,
        quote: char,
    ) -> std::result::Result<(), TransformError> {
        out.push(self.bump().expect("quote"));
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string literal"));
            };
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
            } else if c == quote {
                break;
            }
        }
        self.prev2 = self.prev1;
        self.prev1 = Some(quote);
        self.word.clear();
        Ok(())
    }

    fn copy_template(&mut self, out: &mut String) -> std::result::Result<(), TransformError> {
        out.push(self.bump().expect("backtick"));
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated template literal"));
            };
            if c == '\\' {
                out.push(c);
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
            } else if c == '$' && self.peek() == Some('{') {
                out.push('$');
                self.bump();
                out.push('{');
                let inner = self.scan_js(Some('}'))?;
                out.push_str(&inner);
                self.expect('}')?;
                out.push('}');
            } else if c == '`' {
                out.push(c);
                break;
            } else {
                out.push(c);
            }
        }
        self.prev2 = self.prev1;
        self.prev1 = Some('`');
        self.word.clear();
        Ok(())
    }

    fn copy_block_comment(&mut self, out: &mut String) -> std::result::Result<(), TransformError> {
        out.push(self.bump().expect("slash"));
        out.push(self.bump().expect("star"));
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated comment"));
            };
            out.push(c);
            if c == '*' && self.peek() == Some('/') {
                out.push(self.bump().expect("slash"));
                break;
            }
        }
        Ok(())
    }

    fn read_name(&mut self, what: &str) -> std::result::Result<String, TransformError> {
        let mut name = String::new();
        match self.peek() {
            Some(c) if is_ident_start(c) => {
                name.push(c);
                self.bump();
            }
            _ => return Err(self.error(&format!("expected {}", what))),
        }
        while matches!(self.peek(), Some(c) if is_ident_part(c) || c == '.' || c == '-') {
            name.push(self.bump().expect("name char"));
        }
        Ok(name)
    }

    fn read_attr_name(&mut self) -> std::result::Result<String, TransformError> {
        let mut name = String::new();
        while matches!(self.peek(), Some(c) if is_ident_part(c) || c == '-' || c == ':') {
            name.push(self.bump().expect("attr char"));
        }
        if name.is_empty() {
            return Err(self.error("expected attribute name"));
        }
        Ok(name)
    }

    fn read_raw_string(&mut self, quote: char) -> std::result::Result<String, TransformError> {
        self.bump();
        let mut raw = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(raw),
                Some(c) => raw.push(c),
                None => return Err(self.error("unterminated attribute string")),
            }
        }
    }

    fn parse_element(&mut self) -> std::result::Result<String, TransformError> {
        self.expect('<')?;
        if self.peek() == Some('>') {
            self.bump();
            let children = self.parse_children("")?;
            return Ok(self.emit_call(None, Vec::new(), children));
        }

        let tag = self.read_name("element name")?;
        let mut props: Vec<String> = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.error(&format!("unclosed <{}>", tag))),
                Some('/') => {
                    self.bump();
                    self.expect('>')?;
                    return Ok(self.emit_call(Some(&tag), props, Vec::new()));
                }
                Some('>') => {
                    self.bump();
                    break;
                }
                Some('{') => {
                    self.bump();
                    self.skip_ws();
                    for _ in 0..3 {
                        if self.peek() == Some('.') {
                            self.bump();
                        } else {
                            return Err(self.error("expected `...` in spread attribute"));
                        }
                    }
                    let expr = self.scan_js(Some('}'))?;
                    self.expect('}')?;
                    props.push(format!("...({})", expr.trim()));
                }
                Some(c) if is_ident_start(c) => {
                    let name = self.read_attr_name()?;
                    self.skip_ws();
                    if self.peek() == Some('=') {
                        self.bump();
                        self.skip_ws();
                        match self.peek() {
                            Some(q @ ('"' | '\'')) => {
                                let raw = self.read_raw_string(q)?;
                                props.push(format!("{}: {}", js_string(&name), js_string(&raw)));
                            }
                            Some('{') => {
                                self.bump();
                                let expr = self.scan_js(Some('}'))?;
                                self.expect('}')?;
                                props.push(format!("{}: ({})", js_string(&name), expr.trim()));
                            }
                            _ => {
                                return Err(self.error(&format!(
                                    "expected value for attribute `{}`",
                                    name
                                )))
                            }
                        }
                    } else {
                        props.push(format!("{}: true", js_string(&name)));
                    }
                }
                Some(c) => {
                    return Err(self.error(&format!("unexpected `{}` in <{}>", c, tag)));
                }
            }
        }

        let children = self.parse_children(&tag)?;
        Ok(self.emit_call(Some(&tag), props, children))
    }

    fn parse_children(
        &mut self,
        closing: &str,
    ) -> std::result::Result<Vec<String>, TransformError> {
        let mut children: Vec<String> = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    let opener = if closing.is_empty() {
                        "<>".to_string()
                    } else {
                        format!("<{}>", closing)
                    };
                    return Err(self.error(&format!("unexpected end of input, unclosed {}", opener)));
                }
                Some('<') if self.peek_at(1) == Some('/') => {
                    flush_text(&mut text, &mut children);
                    self.bump();
                    self.bump();
                    self.skip_ws();
                    let name = if self.peek() == Some('>') {
                        String::new()
                    } else {
                        self.read_name("closing tag name")?
                    };
                    self.skip_ws();
                    self.expect('>')?;
                    if name != closing {
                        let expected = if closing.is_empty() {
                            "</>".to_string()
                        } else {
                            format!("</{}>", closing)
                        };
                        return Err(self.error(&format!(
                            "mismatched closing tag </{}>; expected {}",
                            name, expected
                        )));
                    }
                    return Ok(children);
                }
                Some('<') => {
                    flush_text(&mut text, &mut children);
                    children.push(self.parse_element()?);
                }
                Some('{') => {
                    flush_text(&mut text, &mut children);
                    self.bump();
                    let expr = self.scan_js(Some('}'))?;
                    self.expect('}')?;
                    let trimmed = expr.trim();
                    let comment_only = trimmed.starts_with("/*") && trimmed.ends_with("*/");
                    if !trimmed.is_empty() && !comment_only {
                        children.push(format!("({})", trimmed));
                    }
                }
                Some(_) => {
                    text.push(self.bump().expect("text char"));
                }
            }
        }
    }

    fn emit_call(&self, tag: Option<&str>, props: Vec<String>, children: Vec<String>) -> String {
        let type_expr = match tag {
            None => self.factories.fragment.clone(),
            Some(t) if t.chars().next().map(char::is_lowercase).unwrap_or(false) => js_string(t),
            Some(t) => t.to_string(),
        };
        let mut parts = props;
        match children.len() {
            0 => {}
            1 => parts.push(format!("\"children\": {}", children[0])),
            _ => parts.push(format!("\"children\": [{}]", children.join(", "))),
        }
        let factory = if children.len() > 1 {
            &self.factories.create_list
        } else {
            &self.factories.create
        };
        let props_obj = if parts.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", parts.join(", "))
        };
        format!("{}({}, {})", factory, type_expr, props_obj)
    }
}

/// JSX text semantics: trim each line, drop the empty ones, join with one
/// space.
fn flush_text(text: &mut String, children: &mut Vec<String>) {
    let joined = text
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !joined.is_empty() {
        children.push(js_string(&joined));
    }
    text.clear();
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
