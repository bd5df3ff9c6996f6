//! Debug entry point: cover every image (or video) of a folder

use anyhow::Context;
use censor_eye::models::MaskRcnnLoader;
use censor_eye::{load_detector, BatchRunner, CensorConfig, FrameProcessor};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "censor-folder")]
#[command(about = "Detect censor bars and mosaics with Mask R-CNN and cover them", long_about = None)]
struct Cli {
    /// Path to the exported weights (overrides the config file)
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Folder of images or videos to cover
    #[arg(long)]
    input: PathBuf,

    /// Folder receiving covered files
    #[arg(long, default_value = "temp_out/")]
    output: PathBuf,

    /// Process videos instead of images
    #[arg(long)]
    video: bool,

    /// Folder receiving untouched video frames
    #[arg(long)]
    originals: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    #[arg(long, short)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => CensorConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => CensorConfig::default(),
    };
    if let Some(weights) = cli.weights {
        config.weights_path = weights;
    }

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output folder {:?}", cli.output))?;
    if let Some(originals) = &cli.originals {
        std::fs::create_dir_all(originals)
            .with_context(|| format!("Failed to create originals folder {:?}", originals))?;
    }

    info!("Loading weights");
    let model = load_detector(&MaskRcnnLoader, &config.weights_path, &config.inference)?;

    let processor = FrameProcessor::new(model, &config);
    #[cfg(feature = "opencv")]
    let processor = processor.with_video_backend(Box::new(censor_eye::video::OpenCvBackend));
    if cfg!(not(feature = "opencv")) && cli.video {
        anyhow::bail!("Video mode needs the `opencv` feature");
    }

    let mut runner = BatchRunner::from_config(processor, &config);
    info!("Running detection on {:?} -> {:?}", cli.input, cli.output);
    let report = runner.run(&cli.input, &cli.output, cli.video, cli.originals.as_deref())?;

    if cli.json {
        let summary = serde_json::json!({
            "processed": report.processed,
            "unsupported": report.unsupported,
            "ignored": report.ignored,
            "frames": report.frames,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Covered {} file(s)", report.processed.len());
        if report.needs_conversion() {
            println!(
                "{} file(s) must be converted to png and run again",
                runner.unsupported_count()
            );
        }
    }

    Ok(())
}
