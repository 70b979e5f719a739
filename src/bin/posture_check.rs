use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use image::RgbaImage;

use posture_guard::{
    config::Config,
    model_download::ensure_pose_model_ready,
    pipeline::{OrtPoseEstimator, PoseEstimator, annotate},
    posture,
    types::Frame,
};

/// Classify the posture in a single still image.
#[derive(Debug, Parser)]
#[command(name = "posture-check", version)]
struct Args {
    /// Image to classify
    image: PathBuf,

    /// Write the annotated image here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pose model, overrides `model.path`
    #[arg(long)]
    model: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "POSTURE_GUARD_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(model) = args.model {
        config.model.path = model;
    }

    let image = image::open(&args.image)
        .with_context(|| format!("failed to open image {}", args.image.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let mut frame = Frame::new(image.into_raw(), width, height);

    ensure_pose_model_ready(&config.model.path, config.model.url.as_deref(), |_| {})?;
    let mut estimator = OrtPoseEstimator::new(&config.model.path, config.estimator())?;

    let landmarks = estimator
        .estimate(&frame)
        .context("inference failed")?
        .ok_or_else(|| anyhow!("no person detected in {}", args.image.display()))?;

    let slope = posture::posture_slope(&landmarks, frame.width, frame.height)?;
    let state = posture::classify(slope);
    println!("{}", annotate::slope_label(slope));
    println!("{}", annotate::posture_label(state));

    if let Some(output) = args.output {
        annotate::draw_posture_label(&mut frame, slope, state);
        annotate::draw_pose_overlay(&mut frame, &landmarks);
        let canvas = RgbaImage::from_raw(frame.width, frame.height, frame.rgba)
            .ok_or_else(|| anyhow!("annotated frame has the wrong size"))?;
        canvas
            .save(&output)
            .with_context(|| format!("failed to save {}", output.display()))?;
        println!("Wrote {}", output.display());
    }

    Ok(())
}
