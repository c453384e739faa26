//! Scenepad Playground Engine
//!
//! A headless playground engine: it takes user-authored markup (a JSX-like
//! expression dialect) or script source (imperative helper calls), and
//! compiles, evaluates and rasterizes it into a preview image with
//! structured debug logging.
//!
//! # Pipeline
//!
//! compile → evaluate → inline images → build tree → rasterize → encode.
//! Each stage's failure is classified (`CompileError` points at syntax,
//! `EvalError` at logic) and surfaces as a terminal `Failed` state; image
//! and font fetch problems are soft failures that only warn.
//!
//! # Example
//!
//! ```no_run
//! use scenepad::{Dialect, OutputFormat, PlaygroundConfig, RenderRequest};
//!
//! # async fn run(rasterizer: Box<dyn scenepad::Rasterizer>) -> scenepad::Result<()> {
//! let playground = scenepad::Playground::new(PlaygroundConfig::default(), rasterizer).await?;
//! playground.render_now(&RenderRequest {
//!     dialect: Dialect::Script,
//!     source: "return container({children: [text('hi', {})]})".into(),
//!     width: 1200,
//!     height: 630,
//!     format: OutputFormat::Png,
//! });
//! # Ok(())
//! # }
//! ```
//!
//! The evaluator runs arbitrary user code with an enumerated binding set
//! and no ambient scope, but offers **no security isolation**: it trusts
//! the local user.

use sha2::{Digest, Sha256};

pub mod error;
pub use error::{Error, Result};

pub mod logs;
pub use logs::{LogEntry, LogLevel, LogSink, Logger};

pub mod style;
pub mod transform;

pub mod compile;
pub mod eval;

pub mod inline;

pub mod scene;
pub use scene::SceneNode;
pub mod tree;

pub mod raster;
pub use raster::{NullRasterizer, Rasterizer};

pub mod engine;
pub use engine::{PlaygroundEngine, RenderOutput, RenderPhase};

pub mod session;
pub use session::{Playground, RenderState};

/// Authoring dialect of a source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Dialect {
    /// XML-like expression syntax, compiled to factory calls
    Markup,
    /// Imperative code calling the scene-node constructors directly
    Script,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Markup => "markup",
            Dialect::Script => "script",
        }
    }
}

/// Encoded output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Png,
    Webp,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }
}

/// Compilation mode; decides which synthetic factory names the markup
/// transform emits and the evaluator binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BuildMode {
    Development,
    Production,
}

/// Configuration for a playground session
///
/// The defaults match the interactive tool: a ~400ms trailing debounce,
/// the Inter variable font preloaded from its CDN, and evaluation limits
/// that stop runaway user scripts without getting in the way of honest
/// ones.
#[derive(Debug, Clone)]
pub struct PlaygroundConfig {
    /// User agent sent with image and font fetches
    pub user_agent: String,
    /// Timeout for each image/font fetch in milliseconds
    pub fetch_timeout_ms: u64,
    /// Wall-clock evaluation timeout in milliseconds
    pub script_timeout_ms: u64,
    /// Maximum loop iterations before the evaluator throws (0 => disabled)
    pub script_loop_iteration_limit: u64,
    /// Maximum recursion depth before the evaluator throws
    /// (`usize::MAX` => disabled)
    pub script_recursion_limit: usize,
    /// Trailing debounce window for `submit`, in milliseconds
    pub debounce_ms: u64,
    /// Factory naming mode for the markup dialect
    pub build_mode: BuildMode,
    /// Fonts loaded into the rasterizer before the first render
    pub font_urls: Vec<String>,
    /// Transformed-source log lines are truncated to this many bytes
    pub log_truncate: usize,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            user_agent: "scenepad/0.1".to_string(),
            fetch_timeout_ms: 30000,
            script_timeout_ms: 5000,
            script_loop_iteration_limit: 1000000,
            script_recursion_limit: 1024,
            debounce_ms: 400,
            build_mode: BuildMode::Production,
            font_urls: vec![
                "https://cdn.jsdelivr.net/fontsource/fonts/inter:vf@latest/latin-wght-normal.woff2"
                    .to_string(),
            ],
            log_truncate: 2048,
        }
    }
}

/// One render attempt's inputs; its signature decides whether a debounced
/// re-render is necessary.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub dialect: Dialect,
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl RenderRequest {
    /// Stable fingerprint of everything that affects the output
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dialect.as_str());
        hasher.update("|");
        hasher.update(format!("{}x{}", self.width, self.height));
        hasher.update("|");
        hasher.update(self.format.as_str());
        hasher.update("|");
        hasher.update(&self.source);
        hex::encode(hasher.finalize())
    }
}
