use anyhow::{Context, Result};
use clap::Parser;

use posture_guard::{
    alert::AlertController,
    audio::CpalAlertPlayer,
    config::{Args, Config},
    display::WindowDisplay,
    model_download::{ModelDownloadEvent, ensure_pose_model_ready},
    pipeline::{self, FrameSource, OrtPoseEstimator, PosturePipeline},
};

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    if args.list_cameras {
        return list_cameras();
    }

    let config = Config::from_args(&args)?;

    ensure_pose_model_ready(
        &config.model.path,
        config.model.url.as_deref(),
        |event| {
            if event == ModelDownloadEvent::AlreadyPresent {
                log::debug!("pose model found at {}", config.model.path.display());
            }
        },
    )?;
    let estimator = OrtPoseEstimator::new(&config.model.path, config.estimator())?;

    let player = CpalAlertPlayer::open(&config.alert.sound_path)
        .context("failed to prepare alert sound")?;
    let alert = AlertController::new(player, config.alert_mode())
        .with_poll_interval(config.poll_interval());
    let mut posture = PosturePipeline::new(estimator, alert);

    let mut source = open_camera(config.camera.index)?;
    let mut display = WindowDisplay::new(config.display.title.clone(), config.display.target_fps);

    log::info!(
        "watching camera {} ({:?} alerts)",
        config.camera.index,
        config.alert_mode()
    );
    let stats = pipeline::run_session(
        source.as_mut(),
        &mut posture,
        &mut display,
        config.session(),
    )?;
    log::info!(
        "{} frames classified, {} dropped",
        stats.classified,
        stats.dropped
    );
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(pipeline::CameraSource::open(index)?))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(_index: u32) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("built without camera support, enable the camera-nokhwa feature")
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = pipeline::available_cameras()?;
    if cameras.is_empty() {
        println!("no cameras found");
    }
    for camera in cameras {
        println!("{}: {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    anyhow::bail!("built without camera support, enable the camera-nokhwa feature")
}
