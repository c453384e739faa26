//! Evaluator: runs a compiled module inside an embedded Boa context.
//!
//! Each attempt gets a fresh context on a dedicated thread, with runtime
//! limits from config and a wall-clock timeout on the host side. The only
//! names user code can see are the ones the dialect harness defines; host
//! capabilities (the style utility and the log sink) are reached through
//! native functions registered against a process-global registry keyed by
//! context address. There is no security isolation here: the evaluator
//! trusts the local user.

use std::collections::HashMap;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use boa_engine::native_function::{NativeFunction, NativeFunctionPointer};
use boa_engine::object::builtins::JsPromise;
use boa_engine::builtins::promise::PromiseState;
use boa_engine::{js_string, Context, JsError, JsResult, JsValue, Source};

use crate::compile::CompiledModule;
use crate::error::{Error, Result};
use crate::logs::{LogLevel, Logger};
use crate::style::StyleUtility;
use crate::{BuildMode, Dialect, PlaygroundConfig};

const HOST_HARNESS: &str = include_str!("harness/host.js");
const MARKUP_HARNESS: &str = include_str!("harness/markup.js");
const SCRIPT_HARNESS: &str = include_str!("harness/script.js");

const PROD_FACTORY_DEFS: &str = r#"function _jsx(type, props) {
  return { type: typeof type === "string" ? type : "$fragment", props: props || {} };
}
var _jsxs = _jsx;"#;

const DEV_FACTORY_DEFS: &str = r#"function _jsxDEV(type, props) {
  return { type: typeof type === "string" ? type : "$fragment", props: props || {} };
}"#;

/// Host capabilities reachable from inside a context
struct HostBindings {
    style: Arc<dyn StyleUtility>,
    logs: Logger,
}

#[allow(clippy::type_complexity)]
static PG_HOST_REG: OnceLock<Mutex<HashMap<usize, Arc<HostBindings>>>> = OnceLock::new();

fn host_registry() -> &'static Mutex<HashMap<usize, Arc<HostBindings>>> {
    PG_HOST_REG.get_or_init(|| Mutex::new(HashMap::new()))
}

fn arg_string(args: &[JsValue], index: usize) -> String {
    args.get(index)
        .and_then(|a| a.as_string())
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_default()
}

fn pg_twj_native(
    _this: &JsValue,
    args: &[JsValue],
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let ptr = ctx as *const _ as usize;
    let classes = arg_string(args, 0);
    let mut style = serde_json::Map::new();
    if let Ok(reg) = host_registry().lock() {
        if let Some(host) = reg.get(&ptr) {
            style = host.style.classes_to_style(&classes);
        }
    }
    let json = serde_json::Value::Object(style).to_string();
    Ok(JsValue::from(boa_engine::JsString::from(json.as_str())))
}

fn pg_log_native(
    _this: &JsValue,
    args: &[JsValue],
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let ptr = ctx as *const _ as usize;
    let level = arg_string(args, 0).parse().unwrap_or(LogLevel::Log);
    let text = arg_string(args, 1);
    if let Ok(reg) = host_registry().lock() {
        if let Some(host) = reg.get(&ptr) {
            host.logs.append(level, text);
        }
    }
    Ok(JsValue::undefined())
}

pub struct Evaluator {
    style: Arc<dyn StyleUtility>,
    timeout_ms: u64,
    loop_limit: u64,
    recursion_limit: usize,
}

impl Evaluator {
    pub fn new(style: Arc<dyn StyleUtility>, config: &PlaygroundConfig) -> Self {
        Self {
            style,
            timeout_ms: config.script_timeout_ms,
            loop_limit: config.script_loop_iteration_limit,
            recursion_limit: config.script_recursion_limit,
        }
    }

    /// Run the module and return its settled value as a JSON tree.
    pub fn evaluate(
        &self,
        module: &CompiledModule,
        width: u32,
        height: u32,
        logs: &Logger,
    ) -> Result<serde_json::Value> {
        let harness = harness_for(module, width, height);
        let code = format!("{}\n{}\n;{}", harness, module.code, module.result_expr);

        let host = Arc::new(HostBindings {
            style: self.style.clone(),
            logs: logs.clone(),
        });
        let loop_limit = self.loop_limit;
        let recursion_limit = self.recursion_limit;

        let (tx, rx) = channel::<Result<serde_json::Value>>();
        thread::spawn(move || {
            let mut ctx = Context::default();
            if loop_limit > 0 {
                ctx.runtime_limits_mut().set_loop_iteration_limit(loop_limit);
            }
            if recursion_limit < usize::MAX {
                ctx.runtime_limits_mut().set_recursion_limit(recursion_limit);
            }

            let ptr = &ctx as *const _ as usize;
            if let Ok(mut reg) = host_registry().lock() {
                reg.insert(ptr, host);
            }
            let twj = NativeFunction::from_fn_ptr(pg_twj_native as NativeFunctionPointer);
            let _ = ctx.register_global_builtin_callable(js_string!("__pg_twj"), 1usize, twj);
            let log = NativeFunction::from_fn_ptr(pg_log_native as NativeFunctionPointer);
            let _ = ctx.register_global_builtin_callable(js_string!("__pg_log"), 2usize, log);

            let result = run_to_json(&code, &mut ctx);

            if let Ok(mut reg) = host_registry().lock() {
                reg.remove(&ptr);
            }
            let _ = tx.send(result);
        });

        match rx.recv_timeout(Duration::from_millis(self.timeout_ms)) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                logs.append(
                    LogLevel::Error,
                    format!("evaluation timed out after {}ms", self.timeout_ms),
                );
                Err(Error::Timeout(self.timeout_ms))
            }
            Err(err) => Err(Error::eval(format!("evaluation worker failed: {}", err))),
        }
    }
}

fn harness_for(module: &CompiledModule, width: u32, height: u32) -> String {
    let dialect_part = match module.dialect {
        Dialect::Markup => {
            let defs = match module.build_mode {
                BuildMode::Production => PROD_FACTORY_DEFS,
                BuildMode::Development => DEV_FACTORY_DEFS,
            };
            MARKUP_HARNESS.replace("__PG_JSX_FACTORY_DEFS__", defs)
        }
        Dialect::Script => SCRIPT_HARNESS
            .replace("__PG_WIDTH__", &width.to_string())
            .replace("__PG_HEIGHT__", &height.to_string()),
    };
    format!("{}\n{}", HOST_HARNESS, dialect_part)
}

fn run_to_json(code: &str, ctx: &mut Context) -> Result<serde_json::Value> {
    let value = ctx
        .eval(Source::from_bytes(code.as_bytes()))
        .map_err(|e| Error::eval(format!("{}", e)))?;
    let settled = settle(value, ctx)?;
    let Some(json) = settled.as_string().map(|s| s.to_std_string_escaped()) else {
        return Err(Error::eval("evaluation produced no renderable value"));
    };
    serde_json::from_str(&json)
        .map_err(|e| Error::eval(format!("result is not a serializable tree: {}", e)))
}

/// Await the value when it is a promise. There is no event loop behind the
/// context, so a promise still pending after the job queue drains can
/// never settle.
fn settle(value: JsValue, ctx: &mut Context) -> Result<JsValue> {
    let Some(obj) = value.as_object() else {
        return Ok(value);
    };
    let Ok(promise) = JsPromise::from_object(obj.clone()) else {
        return Ok(value);
    };
    let _ = ctx.run_jobs();
    match promise.state() {
        PromiseState::Fulfilled(v) => Ok(v),
        PromiseState::Rejected(reason) => {
            Err(Error::eval(format!("{}", JsError::from_opaque(reason))))
        }
        PromiseState::Pending => Err(Error::eval("asynchronous result never settled")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::SourceCompiler;
    use crate::logs::LogSink;
    use crate::style::UtilityClasses;
    use crate::transform::BuiltinTransform;

    fn eval_source(source: &str, dialect: Dialect) -> Result<serde_json::Value> {
        let logs = LogSink::shared();
        let compiler = SourceCompiler::new(Arc::new(BuiltinTransform), 2048);
        let module = compiler.compile(source, dialect, BuildMode::Production, &logs)?;
        let evaluator = Evaluator::new(Arc::new(UtilityClasses), &PlaygroundConfig::default());
        evaluator.evaluate(&module, 640, 480, &logs)
    }

    #[test]
    fn script_constructors_build_scene_shape() {
        let value = eval_source(
            "return container({children: [text('hi', {})]})",
            Dialect::Script,
        )
        .unwrap();
        assert_eq!(value["type"], "container");
        assert_eq!(value["children"][0]["type"], "text");
        assert_eq!(value["children"][0]["text"], "hi");
    }

    #[test]
    fn bare_expression_scripts_evaluate_too() {
        let value = eval_source("text('solo', {})", Dialect::Script).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "solo");
    }

    #[test]
    fn width_and_height_constants_are_injected() {
        let value = eval_source(
            "return container({width: width, height: height})",
            Dialect::Script,
        )
        .unwrap();
        assert_eq!(value["style"]["width"], 640);
        assert_eq!(value["style"]["height"], 480);
    }

    #[test]
    fn awaited_promises_settle_before_returning() {
        let value = eval_source(
            "const node = await Promise.resolve(text('later', {})); return node;",
            Dialect::Script,
        )
        .unwrap();
        assert_eq!(value["text"], "later");
    }

    #[test]
    fn markup_elements_evaluate_to_element_trees() {
        let value = eval_source(r#"<div style={twj("flex")}>hi</div>"#, Dialect::Markup).unwrap();
        assert_eq!(value["type"], "div");
        assert_eq!(value["props"]["style"]["display"], "flex");
        assert_eq!(value["props"]["children"], "hi");
    }

    #[test]
    fn runtime_throws_become_eval_errors() {
        let err = eval_source("return no_such_helper()", Dialect::Script).unwrap_err();
        match err {
            Error::Eval(message) => assert!(message.contains("no_such_helper")),
            other => panic!("expected eval error, got {:?}", other),
        }
    }

    #[test]
    fn console_binding_feeds_the_log_sink() {
        let logs = LogSink::shared();
        let compiler = SourceCompiler::new(Arc::new(BuiltinTransform), 2048);
        let module = compiler
            .compile(
                "console.warn('from-user'); return text('x', {})",
                Dialect::Script,
                BuildMode::Production,
                &logs,
            )
            .unwrap();
        let evaluator = Evaluator::new(Arc::new(UtilityClasses), &PlaygroundConfig::default());
        evaluator.evaluate(&module, 100, 100, &logs).unwrap();
        assert!(logs
            .snapshot()
            .iter()
            .any(|e| e.level == LogLevel::Warn && e.text == "from-user"));
    }

    #[test]
    fn development_mode_markup_uses_dev_factory() {
        let logs = LogSink::shared();
        let compiler = SourceCompiler::new(Arc::new(BuiltinTransform), 2048);
        let module = compiler
            .compile("<span>dev</span>", Dialect::Markup, BuildMode::Development, &logs)
            .unwrap();
        let evaluator = Evaluator::new(Arc::new(UtilityClasses), &PlaygroundConfig::default());
        let value = evaluator.evaluate(&module, 100, 100, &logs).unwrap();
        assert_eq!(value["type"], "span");
    }
}
