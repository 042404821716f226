use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};

use super::Device;
use crate::logger;
use crate::types::*;

/// Replays fixed screenshots and records every input. Captures come from the
/// front of the queue; the last frame stays on screen once the queue drains
/// to one.
pub struct StubDevice {
    name: String,
    frames: VecDeque<Frame>,
    pub inputs: Vec<InputEvent>,
    /// Advance to the next queued frame after each click.
    pub advance_on_click: bool,
}

impl StubDevice {
    pub fn new(frames: Vec<Frame>) -> Self {
        let mut frames: VecDeque<Frame> = frames.into();
        if frames.is_empty() {
            frames.push_back(Frame::blank(1, 1));
        }
        Self {
            name: "stub".into(),
            frames,
            inputs: Vec::new(),
            advance_on_click: false,
        }
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![Frame::blank(width, height)])
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("loading screenshot {}", path.display()))?
            .to_rgb8();
        let mut device = Self::new(vec![Frame::from_rgb(image)]);
        device.name = format!("stub({})", path.display());
        Ok(device)
    }

    fn current(&self) -> &Frame {
        // never empty: constructor guarantees a frame and `advance` keeps the last
        &self.frames[0]
    }

    pub fn advance(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop_front();
        }
    }

    fn record(&mut self, event: InputEvent) -> bool {
        logger::debug_p("stub", &format!("{:?}", event));
        self.inputs.push(event);
        true
    }
}

impl Device for StubDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self, region: Option<Region>) -> Option<Frame> {
        match region {
            Some(r) => self.current().crop(r),
            None => Some(self.current().clone()),
        }
    }

    fn move_to(&mut self, at: Point) -> bool {
        self.record(InputEvent::Move(at))
    }

    fn click(&mut self, at: Point) -> bool {
        let ok = self.record(InputEvent::Click(at));
        if self.advance_on_click {
            self.advance();
        }
        ok
    }

    fn press_down(&mut self, at: Point) -> bool {
        self.record(InputEvent::Down(at))
    }

    fn release(&mut self, at: Point) -> bool {
        self.record(InputEvent::Up(at))
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> bool {
        self.record(InputEvent::Scroll(dx, dy))
    }
}
