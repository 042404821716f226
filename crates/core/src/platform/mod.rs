pub mod adb;
pub mod stub;

#[cfg(target_os = "macos")]
pub mod darwin;

use std::path::Path;

use anyhow::Result;
use image::GrayImage;

use crate::config::Config;
use crate::logger;
use crate::types::*;

/// Capture and input backend the agent drives. Inputs are fire-and-forget;
/// the returned flag only reports whether the backend accepted them.
pub trait Device: Send {
    fn name(&self) -> &str;

    /// Whole screen, or the clamped sub-rectangle `region`.
    fn capture(&mut self, region: Option<Region>) -> Option<Frame>;

    /// Capture pre-processed for text recognition.
    fn capture_enhanced(&mut self, region: Region) -> Option<GrayImage> {
        self.capture(Some(region)).map(|f| f.enhance_for_text())
    }

    fn move_to(&mut self, at: Point) -> bool;
    fn click(&mut self, at: Point) -> bool;
    fn press_down(&mut self, at: Point) -> bool;
    fn release(&mut self, at: Point) -> bool;
    fn scroll(&mut self, dx: i32, dy: i32) -> bool;
}

/// Pick the backend for this run: an explicit stub, the phone bridge, or the
/// desktop (macOS only; other hosts fall back to a blank stub).
pub fn create_device(config: &Config, stub: Option<&Path>, force_stub: bool) -> Result<Box<dyn Device>> {
    if force_stub || stub.is_some() {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        let device = match stub {
            Some(path) => stub::StubDevice::from_file(path)?,
            None => stub::StubDevice::blank(1920, 1080),
        };
        return Ok(Box::new(device));
    }
    if config.use_phone {
        logger::register_prefix("adb", logger::COLOR_GRAY);
        return Ok(Box::new(adb::AdbDevice::new(&config.adb_serial)));
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        Ok(Box::new(darwin::DarwinDevice::new()))
    }
    #[cfg(not(target_os = "macos"))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        logger::warn("no desktop backend on this platform, using a blank stub");
        Ok(Box::new(stub::StubDevice::blank(1920, 1080)))
    }
}
