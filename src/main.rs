use std::io::Read;
use std::path::PathBuf;

use clap::Parser;

use scenepad::{
    BuildMode, Dialect, LogSink, NullRasterizer, OutputFormat, PlaygroundConfig,
    PlaygroundEngine, RenderRequest,
};

/// Compile, evaluate and build a scene from playground source.
///
/// The binary runs the front half of the pipeline and prints the resulting
/// scene; rasterizing to pixels needs an embedding that supplies a real
/// rasterizer backend.
#[derive(Parser)]
#[command(name = "scenepad", version, about)]
struct Cli {
    /// Source file, or `-` for stdin
    input: PathBuf,

    #[arg(long, value_enum, default_value = "markup")]
    dialect: Dialect,

    #[arg(long, default_value_t = 1200)]
    width: u32,

    #[arg(long, default_value_t = 630)]
    height: u32,

    #[arg(long, value_enum, default_value = "png")]
    format: OutputFormat,

    #[arg(long, value_enum, default_value = "production")]
    build_mode: BuildMode,

    /// Print the scene as a markup-like tree instead of JSON
    #[arg(long)]
    pretty: bool,

    /// Suppress the captured pipeline log on stderr
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let source = if cli.input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&cli.input)?
    };

    let config = PlaygroundConfig {
        build_mode: cli.build_mode,
        // No rasterizer backend, so nothing to load fonts into
        font_urls: Vec::new(),
        ..PlaygroundConfig::default()
    };

    let logs = LogSink::shared();
    let mut engine = PlaygroundEngine::new(config, Box::new(NullRasterizer), logs.clone())?;

    let request = RenderRequest {
        dialect: cli.dialect,
        source,
        width: cli.width,
        height: cli.height,
        format: cli.format,
    };

    let outcome = engine.build_scene(&request);

    if !cli.quiet {
        for entry in logs.snapshot() {
            eprintln!("[{}] {}", entry.level.as_str(), entry.text);
        }
    }

    let (scene, pretty) = outcome?;
    if cli.pretty {
        println!("{}", pretty);
    } else {
        println!("{}", serde_json::to_string_pretty(&scene)?);
    }
    Ok(())
}
