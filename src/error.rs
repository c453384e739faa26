//! Error types for the playground engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning user source into a rendered image
#[derive(Error, Debug)]
pub enum Error {
    /// The engine (HTTP client, rasterizer handle) failed to come up
    #[error("Engine initialization failed: {0}")]
    Initialization(String),

    /// User source failed to transform/parse; position is in the user's
    /// original text when the transform reported one
    #[error("{}", compile_display(.line, .column, .message))]
    Compile {
        line: Option<u32>,
        column: Option<u32>,
        message: String,
    },

    /// Compiled code threw while executing
    #[error("Eval error: {0}")]
    Eval(String),

    /// The evaluated value cannot be mapped to a scene node
    #[error("Build error: {0}")]
    Build(String),

    /// The rasterizer rejected the scene
    #[error("Rasterize error: {0}")]
    Rasterize(String),

    /// Network error outside the soft-failure paths
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn compile(line: Option<u32>, column: Option<u32>, message: impl Into<String>) -> Self {
        Error::Compile {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Error::Eval(message.into())
    }

    pub fn build(message: impl Into<String>) -> Self {
        Error::Build(message.into())
    }
}

fn compile_display(line: &Option<u32>, column: &Option<u32>, message: &str) -> String {
    match (line, column) {
        (Some(l), Some(c)) => format!("Compile error at {}:{}: {}", l, c, message),
        _ => format!("Compile error: {}", message),
    }
}
