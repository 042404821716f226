use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::game::{Decision, GameSnapshot};

/// Contrast factor applied to text captures before recognition.
const TEXT_CONTRAST: f32 = 1.5;

/// Screen point in frame coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Point { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Rectangle in frame coordinates. Serialized as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.x + self.width / 2) as i32,
            (self.y + self.height / 2) as i32,
        )
    }

    /// Clamp to a `width`x`height` frame. `None` when nothing overlaps.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        if self.width == 0 || self.height == 0 || self.x >= width || self.y >= height {
            return None;
        }
        Some(Region {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        })
    }
}

impl From<[u32; 4]> for Region {
    fn from([x, y, width, height]: [u32; 4]) -> Self {
        Region { x, y, width, height }
    }
}

impl From<Region> for [u32; 4] {
    fn from(r: Region) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

/// One detected occurrence of a template, in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
}

impl MatchCandidate {
    pub fn center(&self) -> Point {
        Point::new(
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    pub fn region(&self) -> Region {
        Region::new(self.x.max(0) as u32, self.y.max(0) as u32, self.width, self.height)
    }

    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..self }
    }
}

/// Immutable RGB screenshot. Every capture produces a new one.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    /// Build from a raw BGRA buffer (CoreGraphics layout).
    pub fn from_bgra(data: &[u8], width: u32, height: u32, bytes_per_row: u32) -> Option<Self> {
        if (bytes_per_row as usize) < width as usize * 4
            || data.len() < bytes_per_row as usize * height as usize
        {
            return None;
        }
        let image = RgbImage::from_fn(width, height, |x, y| {
            let idx = (y * bytes_per_row + x * 4) as usize;
            Rgb([data[idx + 2], data[idx + 1], data[idx]])
        });
        Some(Self { image })
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self { image: RgbImage::new(width, height) }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Crop to `region`, clamped to the frame. `None` when it lies outside.
    pub fn crop(&self, region: Region) -> Option<Frame> {
        let r = region.clamp_to(self.width(), self.height())?;
        let image = imageops::crop_imm(&self.image, r.x, r.y, r.width, r.height).to_image();
        Some(Frame { image })
    }

    /// Resize by `factor` (both axes).
    pub fn scaled(&self, factor: f32) -> Frame {
        let w = ((self.width() as f32 * factor).round() as u32).max(1);
        let h = ((self.height() as f32 * factor).round() as u32).max(1);
        Frame { image: imageops::resize(&self.image, w, h, FilterType::Triangle) }
    }

    pub fn to_gray(&self) -> GrayImage {
        DynamicImage::ImageRgb8(self.image.clone()).into_luma8()
    }

    /// Mean luma in [0, 255].
    pub fn mean_brightness(&self) -> f32 {
        let gray = self.to_gray();
        let n = gray.as_raw().len().max(1) as f64;
        (gray.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n) as f32
    }

    /// OCR pre-enhancement: 2x upscale, grayscale, contrast boost around the mean.
    pub fn enhance_for_text(&self) -> GrayImage {
        let up = imageops::resize(
            &self.image,
            self.width() * 2,
            self.height() * 2,
            FilterType::CatmullRom,
        );
        let mut gray = DynamicImage::ImageRgb8(up).into_luma8();
        let n = gray.as_raw().len().max(1) as f64;
        let mean = (gray.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n).round() as f32;
        for p in gray.pixels_mut() {
            let v = mean + (p[0] as f32 - mean) * TEXT_CONTRAST;
            p[0] = v.round().clamp(0.0, 255.0) as u8;
        }
        gray
    }
}

/// Input sent to a device, recorded by the stub backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Move(Point),
    Click(Point),
    Down(Point),
    Up(Point),
    Scroll(i32, i32),
}

/// Run state shared between the loop controller and the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    Stopping,
    /// Waiting for the user to acknowledge a notice.
    Paused,
}

/// Command from TUI to the loop controller
pub enum Command {
    StartStop,
    Acknowledge,
    Quit,
}

/// What the TUI shows about the running agent.
#[derive(Debug, Clone, Default)]
pub struct AgentStatus {
    pub device: String,
    pub scenario: String,
    pub ticks: u64,
    pub snapshot: Option<GameSnapshot>,
    pub decision: Option<Decision>,
    pub notice: Option<String>,
    pub error: Option<String>,
}
