//! Source compiler: turns user-authored text into an executable module.
//!
//! Markup source is wrapped as an assignment to an internal binding and run
//! through the markup transform; the runtime-import directives the
//! transform injects are stripped because the evaluator supplies those
//! bindings itself. Script source needs no structural transform; it is
//! wrapped so its final value is returned from an async function and
//! JSON-stringified once settled.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::logs::{LogLevel, Logger};
use crate::transform::{JsxFactories, MarkupTransform, TransformOptions};
use crate::{BuildMode, Dialect};

/// Prefix of the markup wrapper; error columns on line 1 are relative to
/// the wrapped text and must be shifted back by this length.
pub(crate) const MARKUP_WRAPPER_PREFIX: &str = "const __expr__ = ";

/// Ephemeral product of one compile step, discarded after evaluation
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub dialect: Dialect,
    pub build_mode: BuildMode,
    /// Executable text (imports already stripped)
    pub code: String,
    /// Final expression whose value is the module result; for the script
    /// dialect this is a promise of the stringified scene
    pub result_expr: String,
    /// Factory names the markup transform relied on
    pub factories: Option<JsxFactories>,
}

pub struct SourceCompiler {
    transform: Arc<dyn MarkupTransform>,
    log_truncate: usize,
}

impl SourceCompiler {
    pub fn new(transform: Arc<dyn MarkupTransform>, log_truncate: usize) -> Self {
        Self {
            transform,
            log_truncate,
        }
    }

    pub fn compile(
        &self,
        source: &str,
        dialect: Dialect,
        build_mode: BuildMode,
        logs: &Logger,
    ) -> Result<CompiledModule> {
        let module = match dialect {
            Dialect::Markup => self.compile_markup(source, build_mode)?,
            Dialect::Script => compile_script(source, build_mode),
        };
        let mut preview = module.code.clone();
        if preview.len() > self.log_truncate {
            let mut cut = self.log_truncate;
            while !preview.is_char_boundary(cut) {
                cut -= 1;
            }
            preview.truncate(cut);
            preview.push_str("…");
        }
        logs.append(
            LogLevel::Log,
            format!("[compile] transformed source:\n{}", preview),
        );
        Ok(module)
    }

    fn compile_markup(&self, source: &str, build_mode: BuildMode) -> Result<CompiledModule> {
        let wrapped = format!("{}{}", MARKUP_WRAPPER_PREFIX, source);
        let output = self
            .transform
            .transform(&wrapped, &TransformOptions { build_mode })
            .map_err(|err| {
                let (line, column) = match extract_position(&err.message) {
                    Some((line, column)) => {
                        // Positions on line 1 point into the wrapped text
                        let column = if line == 1 {
                            (column.saturating_sub(MARKUP_WRAPPER_PREFIX.len() as u32)).max(1)
                        } else {
                            column
                        };
                        (Some(line), Some(column))
                    }
                    None => (None, None),
                };
                Error::compile(line, column, err.message)
            })?;

        let mut code = output.code;
        for directive in &output.imports_to_strip {
            code = code.replace(directive.as_str(), "");
        }

        Ok(CompiledModule {
            dialect: Dialect::Markup,
            build_mode,
            code,
            result_expr: "JSON.stringify(__expr__)".to_string(),
            factories: Some(output.factories),
        })
    }
}

fn compile_script(source: &str, build_mode: BuildMode) -> CompiledModule {
    let code = if statement_form(source) {
        format!("const __scene__ = (async function () {{\n{}\n}})();", source)
    } else {
        format!(
            "const __scene__ = (async function () {{ return (\n{}\n); }})();",
            source
        )
    };
    CompiledModule {
        dialect: Dialect::Script,
        build_mode,
        code,
        result_expr: "__scene__.then(function (node) { return JSON.stringify(node); })"
            .to_string(),
        factories: None,
    }
}

/// Whether script source reads as a statement body (wrap verbatim) rather
/// than a single expression (wrap behind `return`).
fn statement_form(source: &str) -> bool {
    let trimmed = source.trim_start();
    let first_word: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    matches!(
        first_word.as_str(),
        "return" | "const" | "let" | "var" | "if" | "for" | "while" | "function" | "throw" | "try"
    ) || source.contains(';')
}

/// Best-effort `line:column` extraction from an error message, preferring
/// the trailing occurrence.
fn extract_position(message: &str) -> Option<(u32, u32)> {
    for token in message.split_whitespace().rev() {
        let token = token.trim_matches(|c: char| !c.is_ascii_digit() && c != ':');
        if let Some((line, column)) = token.split_once(':') {
            if let (Ok(line), Ok(column)) = (line.parse(), column.parse()) {
                return Some((line, column));
            }
        }
    }
    None
}
