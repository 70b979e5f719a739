use anyhow::{Result, anyhow};
use minifb::{Key, Window, WindowOptions};

use crate::{pipeline::DisplaySink, types::Frame};

/// minifb window showing annotated frames. Created on the first frame so it
/// matches the (possibly downscaled) capture size.
pub struct WindowDisplay {
    title: String,
    target_fps: usize,
    window: Option<Window>,
    buffer: Vec<u32>,
}

impl WindowDisplay {
    pub fn new(title: impl Into<String>, target_fps: usize) -> Self {
        Self {
            title: title.into(),
            target_fps,
            window: None,
            buffer: Vec::new(),
        }
    }

    fn window_for(&mut self, width: usize, height: usize) -> Result<&mut Window> {
        let reopen = match &self.window {
            Some(window) => window.get_size() != (width, height),
            None => true,
        };
        if reopen {
            let mut window = Window::new(
                &self.title,
                width,
                height,
                WindowOptions {
                    resize: false,
                    ..WindowOptions::default()
                },
            )
            .map_err(|err| anyhow!("failed to open window: {err}"))?;
            window.set_target_fps(self.target_fps);
            log::info!("display window opened at {width}x{height}");
            self.window = Some(window);
        }
        self.window
            .as_mut()
            .ok_or_else(|| anyhow!("display window unavailable"))
    }
}

impl DisplaySink for WindowDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let (width, height) = (frame.width as usize, frame.height as usize);
        rgba_to_0rgb(&frame.rgba, &mut self.buffer);

        let buffer = std::mem::take(&mut self.buffer);
        let result = self
            .window_for(width, height)
            .and_then(|window| {
                window
                    .update_with_buffer(&buffer, width, height)
                    .map_err(|err| anyhow!("failed to present frame: {err}"))
            });
        self.buffer = buffer;
        result
    }

    fn quit_requested(&self) -> bool {
        match &self.window {
            Some(window) => {
                !window.is_open() || window.is_key_down(Key::Q) || window.is_key_down(Key::Escape)
            }
            None => false,
        }
    }
}

/// Pack RGBA bytes into minifb's 0RGB words.
pub fn rgba_to_0rgb(rgba: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        rgba.chunks_exact(4)
            .map(|px| (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32),
    );
}
