//! The synchronous render pipeline.
//!
//! One engine owns the HTTP client, the compiler, the evaluator and the
//! rasterizer handle, and runs every stage of a render attempt strictly in
//! order: compile, evaluate, inline images, build the tree, rasterize,
//! encode. The first failing stage short-circuits the rest; every failure
//! is already classified by its `Error` variant. The async facade in
//! `session` drives this engine from a worker thread.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::compile::SourceCompiler;
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::inline::{ImageInliner, MarkupShape, SceneShape};
use crate::logs::{LogLevel, Logger};
use crate::raster::{Rasterizer, RendererHandle};
use crate::scene::{self, SceneNode};
use crate::style::{StyleUtility, UtilityClasses};
use crate::transform::{BuiltinTransform, MarkupTransform};
use crate::tree;
use crate::{Dialect, PlaygroundConfig, RenderRequest};

/// Where a render attempt currently is, or how it ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Compiling,
    Evaluating,
    InliningImages,
    BuildingTree,
    Rasterizing,
    Done,
    Failed,
}

/// A successful render
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Displayable `data:image/…;base64,` URI
    pub image_uri: String,
    pub scene: SceneNode,
    /// Markup-like dump of the final scene, dialect-independent
    pub scene_pretty: String,
}

pub struct PlaygroundEngine {
    config: PlaygroundConfig,
    client: Client,
    compiler: SourceCompiler,
    evaluator: Evaluator,
    raster: RendererHandle,
    logs: Logger,
    phase: RenderPhase,
    fonts_loaded: bool,
}

impl PlaygroundEngine {
    /// Engine with the built-in transform and style utility
    pub fn new(
        config: PlaygroundConfig,
        rasterizer: Box<dyn Rasterizer>,
        logs: Logger,
    ) -> Result<Self> {
        Self::with_services(
            config,
            rasterizer,
            Arc::new(BuiltinTransform),
            Arc::new(UtilityClasses),
            logs,
        )
    }

    /// Engine with caller-provided transform and style services
    pub fn with_services(
        config: PlaygroundConfig,
        rasterizer: Box<dyn Rasterizer>,
        transform: Arc<dyn MarkupTransform>,
        style: Arc<dyn StyleUtility>,
        logs: Logger,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        let mut raster = RendererHandle::new(rasterizer);
        raster.init()?;

        let compiler = SourceCompiler::new(transform, config.log_truncate);
        let evaluator = Evaluator::new(style, &config);

        Ok(Self {
            config,
            client,
            compiler,
            evaluator,
            raster,
            logs,
            phase: RenderPhase::Idle,
            fonts_loaded: false,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.raster.is_ready()
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn logs(&self) -> &Logger {
        &self.logs
    }

    fn set_phase(&mut self, phase: RenderPhase) {
        self.phase = phase;
        log::debug!("render phase: {:?}", phase);
    }

    /// Fetch and install the configured fonts once. Failures are warnings;
    /// loading is retried on later renders until a full pass succeeds.
    fn ensure_fonts(&mut self) {
        if self.fonts_loaded || self.config.font_urls.is_empty() {
            return;
        }
        let mut all_ok = true;
        let urls = self.config.font_urls.clone();
        for url in &urls {
            let loaded = match fetch_bytes(&self.client, url) {
                Ok(bytes) => self.raster.load_font(&bytes).map_err(|e| e.to_string()),
                Err(reason) => Err(reason),
            };
            if let Err(reason) = loaded {
                all_ok = false;
                self.logs.append(
                    LogLevel::Warn,
                    format!("[fonts] failed to load {}: {}", url, reason),
                );
            }
        }
        if all_ok {
            self.fonts_loaded = true;
            self.logs.append(
                LogLevel::Info,
                format!("[fonts] loaded {} font(s)", urls.len()),
            );
        }
    }

    /// Front half of the pipeline: compile, evaluate, inline, build.
    pub fn build_scene(&mut self, request: &RenderRequest) -> Result<(SceneNode, String)> {
        if request.width == 0 || request.height == 0 {
            return Err(Error::Config(format!(
                "render target must be non-empty, got {}x{}",
                request.width, request.height
            )));
        }

        self.set_phase(RenderPhase::Compiling);
        let module = self.compiler.compile(
            &request.source,
            request.dialect,
            self.config.build_mode,
            &self.logs,
        )?;

        self.set_phase(RenderPhase::Evaluating);
        let value = self
            .evaluator
            .evaluate(&module, request.width, request.height, &self.logs)?;

        self.set_phase(RenderPhase::InliningImages);
        let inliner = ImageInliner::new(&self.client, &self.logs);
        let value = match request.dialect {
            Dialect::Markup => inliner.inline::<MarkupShape>(&value),
            Dialect::Script => inliner.inline::<SceneShape>(&value),
        };

        self.set_phase(RenderPhase::BuildingTree);
        let node = tree::build(&value, request.dialect)?;
        let pretty = scene::pretty(&node);
        self.logs
            .append(LogLevel::Info, format!("[scene] final tree:\n{}", pretty));
        Ok((node, pretty))
    }

    /// Run one full render attempt. The log session restarts here.
    pub fn render(&mut self, request: &RenderRequest) -> Result<RenderOutput> {
        self.logs.clear();
        self.ensure_fonts();
        match self.render_stages(request) {
            Ok(output) => {
                self.set_phase(RenderPhase::Done);
                Ok(output)
            }
            Err(err) => {
                self.logs.append_err(LogLevel::Error, &err);
                self.set_phase(RenderPhase::Failed);
                Err(err)
            }
        }
    }

    fn render_stages(&mut self, request: &RenderRequest) -> Result<RenderOutput> {
        let (scene, scene_pretty) = self.build_scene(request)?;
        self.set_phase(RenderPhase::Rasterizing);
        let image_uri =
            self.raster
                .render_to_data_url(&scene, request.width, request.height, request.format)?;
        Ok(RenderOutput {
            image_uri,
            scene,
            scene_pretty,
        })
    }
}

fn fetch_bytes(client: &Client, url: &str) -> std::result::Result<Vec<u8>, String> {
    let response = client.get(url).send().map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status().as_u16()));
    }
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogSink;
    use crate::raster::NullRasterizer;
    use crate::OutputFormat;

    fn request(dialect: Dialect, source: &str) -> RenderRequest {
        RenderRequest {
            dialect,
            source: source.to_string(),
            width: 100,
            height: 100,
            format: OutputFormat::Png,
        }
    }

    fn quiet_config() -> PlaygroundConfig {
        PlaygroundConfig {
            font_urls: Vec::new(),
            ..PlaygroundConfig::default()
        }
    }

    #[test]
    fn build_scene_runs_front_half_of_pipeline() {
        let logs = LogSink::shared();
        let mut engine =
            PlaygroundEngine::new(quiet_config(), Box::new(NullRasterizer), logs.clone()).unwrap();
        let (scene, pretty) = engine
            .build_scene(&request(
                Dialect::Script,
                "return container({children: [text('hi', {})]})",
            ))
            .unwrap();
        assert!(matches!(scene, SceneNode::Container { .. }));
        assert!(pretty.contains("<text>\"hi\"</text>"));
        assert_eq!(engine.phase(), RenderPhase::BuildingTree);
    }

    #[test]
    fn compile_failure_never_reaches_evaluation() {
        let logs = LogSink::shared();
        let mut engine =
            PlaygroundEngine::new(quiet_config(), Box::new(NullRasterizer), logs.clone()).unwrap();
        let err = engine
            .render(&request(Dialect::Markup, "<div>"))
            .unwrap_err();
        assert!(matches!(err, Error::Compile { line: Some(_), .. }));
        assert_eq!(engine.phase(), RenderPhase::Failed);
        // The failure is in the log session too
        assert!(logs
            .snapshot()
            .iter()
            .any(|e| e.level == LogLevel::Error && e.text.contains("Compile error")));
    }

    #[test]
    fn empty_render_target_is_a_config_error() {
        let logs = LogSink::shared();
        let mut engine =
            PlaygroundEngine::new(quiet_config(), Box::new(NullRasterizer), logs).unwrap();
        let mut req = request(Dialect::Script, "return text('x', {})");
        req.width = 0;
        assert!(matches!(
            engine.build_scene(&req).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn render_clears_the_previous_log_session() {
        let logs = LogSink::shared();
        logs.append(LogLevel::Info, "stale entry");
        let mut engine =
            PlaygroundEngine::new(quiet_config(), Box::new(NullRasterizer), logs.clone()).unwrap();
        // NullRasterizer fails at the rasterize stage; earlier stages ran
        let _ = engine.render(&request(Dialect::Script, "return text('x', {})"));
        assert!(!logs.snapshot().iter().any(|e| e.text == "stale entry"));
    }
}
