use std::process::{Command as ProcessCommand, Stdio};

use anyhow::{bail, Context, Result};

use super::Device;
use crate::logger;
use crate::types::*;

/// Portrait resolution the phone layouts are drawn for.
const DEFAULT_SIZE: (u32, u32) = (720, 1280);

/// Phone backend driving an emulator or device through the `adb` CLI.
/// The serial must already be connected; discovery is left to the user.
pub struct AdbDevice {
    serial: String,
    name: String,
    size: (u32, u32),
    held: bool,
}

impl AdbDevice {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            name: format!("adb({})", serial),
            size: DEFAULT_SIZE,
            held: false,
        }
    }

    fn adb(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = ProcessCommand::new("adb")
            .arg("-s")
            .arg(&self.serial)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .context("running adb (is it on PATH?)")?;
        if !output.status.success() {
            bail!(
                "adb {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }

    fn input(&self, args: &[&str]) -> bool {
        let mut full = vec!["shell", "input"];
        full.extend_from_slice(args);
        match self.adb(&full) {
            Ok(_) => true,
            Err(e) => {
                logger::warn_p("adb", &format!("{:#}", e));
                false
            }
        }
    }

    fn screenshot(&mut self) -> Result<Frame> {
        let png = self.adb(&["exec-out", "screencap -p"])?;
        let image = image::load_from_memory(&png)
            .context("decoding screencap output")?
            .to_rgb8();
        self.size = image.dimensions();
        Ok(Frame::from_rgb(image))
    }
}

impl Device for AdbDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self, region: Option<Region>) -> Option<Frame> {
        let frame = match self.screenshot() {
            Ok(f) => f,
            Err(e) => {
                logger::warn_p("adb", &format!("capture failed: {:#}", e));
                return None;
            }
        };
        match region {
            Some(r) => frame.crop(r),
            None => Some(frame),
        }
    }

    /// Drags while a touch is held; otherwise touch has no hover, so the
    /// move lands as a tap.
    fn move_to(&mut self, at: Point) -> bool {
        if self.held {
            self.input(&["motionevent", "MOVE", &at.x.to_string(), &at.y.to_string()])
        } else {
            self.click(at)
        }
    }

    fn click(&mut self, at: Point) -> bool {
        self.input(&["tap", &at.x.to_string(), &at.y.to_string()])
    }

    fn press_down(&mut self, at: Point) -> bool {
        self.held = self.input(&["motionevent", "DOWN", &at.x.to_string(), &at.y.to_string()]);
        self.held
    }

    fn release(&mut self, at: Point) -> bool {
        self.held = false;
        self.input(&["motionevent", "UP", &at.x.to_string(), &at.y.to_string()])
    }

    /// Swipe from screen center by (dx, dy); negative dy scrolls content down.
    fn scroll(&mut self, dx: i32, dy: i32) -> bool {
        let (w, h) = self.size;
        let from = Point::new(w as i32 / 2, h as i32 / 2);
        let to = from.offset(dx, dy);
        self.input(&[
            "swipe",
            &from.x.to_string(),
            &from.y.to_string(),
            &to.x.to_string(),
            &to.y.to_string(),
            "300",
        ])
    }
}
