use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;

use crate::types::{AlertDecision, PostureState};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Something that can play the single alert sound.
pub trait AlertSink {
    /// Start the alert from the beginning.
    fn play(&mut self) -> Result<()>;
    fn is_playing(&self) -> bool;
}

impl<S: AlertSink + ?Sized> AlertSink for Box<S> {
    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn is_playing(&self) -> bool {
        (**self).is_playing()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertMode {
    /// Stall the caller until the sound finishes, for every incorrect frame.
    Blocking,
    /// Fire and forget; drop alerts while one is playing or within the window.
    Cooldown(Duration),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Playing,
}

pub struct AlertController<S: AlertSink> {
    sink: S,
    mode: AlertMode,
    poll_interval: Duration,
    state: AlertState,
    last_started: Option<Instant>,
}

impl<S: AlertSink> AlertController<S> {
    pub fn new(sink: S, mode: AlertMode) -> Self {
        Self {
            sink,
            mode,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: AlertState::Idle,
            last_started: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn mode(&self) -> AlertMode {
        self.mode
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn handle(&mut self, posture: PostureState) -> Result<AlertDecision> {
        self.refresh();

        if posture == PostureState::Correct {
            return Ok(AlertDecision::Silent);
        }

        match self.mode {
            AlertMode::Blocking => {
                self.start()?;
                self.wait_until_idle();
                Ok(AlertDecision::Played)
            }
            AlertMode::Cooldown(window) => {
                let cooling = self
                    .last_started
                    .is_some_and(|started| started.elapsed() < window);
                if self.state == AlertState::Playing || cooling {
                    return Ok(AlertDecision::Suppressed);
                }
                self.start()?;
                Ok(AlertDecision::Played)
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        log::info!("posture incorrect, playing alert");
        self.sink.play()?;
        self.state = AlertState::Playing;
        self.last_started = Some(Instant::now());
        Ok(())
    }

    // No timeout: a sink that never reports idle stalls the loop.
    fn wait_until_idle(&mut self) {
        while self.sink.is_playing() {
            thread::sleep(self.poll_interval);
        }
        self.state = AlertState::Idle;
    }

    fn refresh(&mut self) {
        if self.state == AlertState::Playing && !self.sink.is_playing() {
            self.state = AlertState::Idle;
        }
    }
}
