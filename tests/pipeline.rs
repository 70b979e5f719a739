use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};

use posture_guard::{
    alert::{AlertController, AlertMode, AlertSink},
    config::Config,
    pipeline::{
        DisplaySink, FrameSource, PipelineError, PoseEstimator, PosturePipeline, SessionOptions,
        annotate, run_session,
    },
    posture::PostureError,
    types::{AlertDecision, BodyLandmark, Frame, Landmark, PoseLandmarks, PostureState},
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const BACKGROUND: [u8; 4] = [40, 40, 40, 255];

/// Hands out a scripted pose per call, `None` once the script runs dry.
struct ScriptedEstimator {
    poses: VecDeque<Option<PoseLandmarks>>,
}

impl ScriptedEstimator {
    fn new(poses: impl IntoIterator<Item = Option<PoseLandmarks>>) -> Self {
        Self {
            poses: poses.into_iter().collect(),
        }
    }
}

impl PoseEstimator for ScriptedEstimator {
    fn estimate(&mut self, _frame: &Frame) -> Result<Option<PoseLandmarks>> {
        Ok(self.poses.pop_front().flatten())
    }
}

struct TimedSink {
    duration: Duration,
    until: Option<Instant>,
    plays: usize,
}

impl TimedSink {
    fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: None,
            plays: 0,
        }
    }
}

impl AlertSink for TimedSink {
    fn play(&mut self) -> Result<()> {
        self.plays += 1;
        self.until = Some(Instant::now() + self.duration);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.until.is_some_and(|until| Instant::now() < until)
    }
}

struct ScriptedSource {
    frames: VecDeque<Result<Frame>>,
}

impl ScriptedSource {
    fn frames(count: usize) -> Self {
        Self {
            frames: (0..count).map(|_| Ok(blank_frame())).collect(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Frame> {
        self.frames
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("camera unplugged")))
    }
}

/// Keeps every shown frame and asks to quit after `limit` of them.
struct RecordingDisplay {
    shown: Vec<Frame>,
    limit: usize,
}

impl RecordingDisplay {
    fn new(limit: usize) -> Self {
        Self {
            shown: Vec::new(),
            limit,
        }
    }
}

impl DisplaySink for RecordingDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        self.shown.push(frame.clone());
        Ok(())
    }

    fn quit_requested(&self) -> bool {
        self.shown.len() >= self.limit
    }
}

fn blank_frame() -> Frame {
    Frame::filled(WIDTH, HEIGHT, BACKGROUND)
}

/// Pose with only the left shoulder and hip visible, given in pixels.
fn torso(hip: (f32, f32), shoulder: (f32, f32)) -> PoseLandmarks {
    let mut points = vec![Landmark::default(); BodyLandmark::COUNT];
    points[BodyLandmark::LeftHip.index()] =
        Landmark::new(hip.0 / WIDTH as f32, hip.1 / HEIGHT as f32, 0.9);
    points[BodyLandmark::LeftShoulder.index()] =
        Landmark::new(shoulder.0 / WIDTH as f32, shoulder.1 / HEIGHT as f32, 0.9);
    PoseLandmarks::new(points)
}

fn slumped() -> PoseLandmarks {
    torso((100.0, 200.0), (150.0, 202.0))
}

fn upright() -> PoseLandmarks {
    torso((100.0, 200.0), (105.0, 260.0))
}

fn build_pipeline(
    poses: impl IntoIterator<Item = Option<PoseLandmarks>>,
    alert_duration: Duration,
) -> PosturePipeline<ScriptedEstimator, TimedSink> {
    let alert = AlertController::new(TimedSink::new(alert_duration), AlertMode::Blocking)
        .with_poll_interval(Duration::from_millis(1));
    PosturePipeline::new(ScriptedEstimator::new(poses), alert)
}

fn full_size() -> SessionOptions {
    SessionOptions {
        resize_factor: 1.0,
        ..SessionOptions::default()
    }
}

#[test]
fn slumped_torso_plays_the_alert() {
    let mut pipeline = build_pipeline([Some(slumped())], Duration::from_millis(10));
    let mut frame = blank_frame();

    let outcome = pipeline.process(&mut frame).unwrap();

    assert!((outcome.slope - 0.04).abs() < 1e-3);
    assert_eq!(outcome.posture, PostureState::Incorrect);
    assert_eq!(outcome.alert, AlertDecision::Played);
    assert_eq!(pipeline.alert().sink().plays, 1);
    assert_eq!(annotate::slope_label(outcome.slope), "Posture Slope: -0.04");
}

#[test]
fn upright_torso_stays_silent_and_is_annotated() {
    let mut pipeline = build_pipeline([Some(upright())], Duration::from_millis(10));
    let mut frame = blank_frame();

    let outcome = pipeline.process(&mut frame).unwrap();

    assert!((outcome.slope - 12.0).abs() < 1e-3);
    assert_eq!(outcome.posture, PostureState::Correct);
    assert_eq!(outcome.alert, AlertDecision::Silent);
    assert_eq!(pipeline.alert().sink().plays, 0);
    assert_eq!(annotate::posture_label(outcome.posture), "Posture: Correct");

    assert_eq!(frame.pixel(100, 1), Some(annotate::PLATE_OUTER_COLOR));
    assert_eq!(frame.pixel(100, 10), Some(annotate::PLATE_INNER_COLOR));
    assert_eq!(frame.pixel(105, 260), Some(annotate::JOINT_COLOR));
    assert_eq!(frame.pixel(100, 200), Some(annotate::JOINT_COLOR));
    assert_eq!(frame.pixel(600, 400), Some(BACKGROUND));
}

#[test]
fn empty_frame_is_passed_through_untouched() {
    let mut pipeline = build_pipeline([None, Some(upright())], Duration::from_millis(10));
    let mut source = ScriptedSource::frames(2);
    let mut display = RecordingDisplay::new(2);

    let stats = run_session(&mut source, &mut pipeline, &mut display, full_size()).unwrap();

    assert_eq!(stats.frames, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.classified, 1);
    assert_eq!(display.shown[0].rgba, blank_frame().rgba);
    assert_ne!(display.shown[1].rgba, blank_frame().rgba);
}

#[test]
fn every_incorrect_frame_blocks_for_the_whole_alert() {
    let duration = Duration::from_millis(30);
    let mut pipeline = build_pipeline([Some(slumped()), Some(slumped())], duration);
    let mut source = ScriptedSource::frames(2);
    let mut display = RecordingDisplay::new(2);

    let started = Instant::now();
    let stats = run_session(&mut source, &mut pipeline, &mut display, full_size()).unwrap();

    assert!(started.elapsed() >= duration * 2);
    assert_eq!(stats.alerts, 2);
    assert_eq!(pipeline.alert().sink().plays, 2);
}

#[test]
fn vertical_torso_is_skipped_without_annotation() {
    let vertical = torso((100.0, 200.0), (100.0, 120.0));
    let mut pipeline = build_pipeline([Some(vertical.clone())], Duration::from_millis(10));
    let mut frame = blank_frame();

    let err = pipeline.process(&mut frame).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Posture(PostureError::DivisionUndefined)
    ));
    assert_eq!(frame.rgba, blank_frame().rgba);
    assert_eq!(pipeline.alert().sink().plays, 0);

    let mut pipeline = build_pipeline([Some(vertical), Some(upright())], Duration::from_millis(10));
    let mut source = ScriptedSource::frames(2);
    let mut display = RecordingDisplay::new(2);
    let stats = run_session(&mut source, &mut pipeline, &mut display, full_size()).unwrap();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.classified, 1);
}

#[test]
fn transient_capture_failures_are_tolerated() {
    let mut pipeline = build_pipeline([Some(upright())], Duration::from_millis(10));
    let mut source = ScriptedSource {
        frames: [
            Err(anyhow!("timeout")),
            Err(anyhow!("timeout")),
            Ok(blank_frame()),
        ]
        .into_iter()
        .collect(),
    };
    let mut display = RecordingDisplay::new(1);

    let stats = run_session(&mut source, &mut pipeline, &mut display, full_size()).unwrap();

    assert_eq!(stats.frames, 1);
    assert_eq!(display.shown.len(), 1);
}

#[test]
fn persistent_capture_failure_ends_the_session() {
    let mut pipeline = build_pipeline([], Duration::from_millis(10));
    let mut source = ScriptedSource::frames(1);
    let mut display = RecordingDisplay::new(10);
    let options = SessionOptions {
        resize_factor: 1.0,
        max_consecutive_failures: 4,
    };

    let err = run_session(&mut source, &mut pipeline, &mut display, options).unwrap_err();

    assert!(matches!(err, PipelineError::Capture { failures: 4, .. }));
    assert_eq!(display.shown.len(), 1);
}

#[test]
fn frames_are_downscaled_before_estimation() {
    let mut pipeline = build_pipeline([None], Duration::from_millis(10));
    let mut source = ScriptedSource::frames(1);
    let mut display = RecordingDisplay::new(1);

    run_session(
        &mut source,
        &mut pipeline,
        &mut display,
        SessionOptions::default(),
    )
    .unwrap();

    assert_eq!(display.shown[0].width, WIDTH / 2);
    assert_eq!(display.shown[0].height, HEIGHT / 2);
}

#[test]
fn config_file_drives_session_and_alert_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posture-guard.toml");
    std::fs::write(
        &path,
        r#"
        [camera]
        index = 1
        resize_factor = 1.0
        max_consecutive_failures = 3

        [alert]
        mode = "cooldown"
        cooldown_ms = 250
        "#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();

    assert_eq!(config.camera.index, 1);
    assert_eq!(
        config.session(),
        SessionOptions {
            resize_factor: 1.0,
            max_consecutive_failures: 3,
        }
    );
    assert_eq!(
        config.alert_mode(),
        AlertMode::Cooldown(Duration::from_millis(250))
    );
}
