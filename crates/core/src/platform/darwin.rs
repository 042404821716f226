use std::thread;
use std::time::Duration;

use core_graphics::display::CGDisplay;
use core_graphics::event::*;
use core_graphics::event_source::*;
use core_graphics::geometry::*;
use core_graphics::window::*;

use super::Device;
use crate::logger;
use crate::types::*;

/// macOS desktop backend: captures the main display and posts HID mouse
/// events. The game window is expected to be visible already.
pub struct DarwinDevice {
    held: bool,
}

impl DarwinDevice {
    pub fn new() -> Self {
        DarwinDevice { held: false }
    }

    fn source() -> Option<CGEventSource> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState).ok()
    }

    fn post_mouse(&self, kind: CGEventType, at: Point) -> bool {
        let Some(source) = Self::source() else {
            logger::warn_p("darwin", "no event source");
            return false;
        };
        let point = CGPoint::new(at.x as f64, at.y as f64);
        match CGEvent::new_mouse_event(source, kind, point, CGMouseButton::Left) {
            Ok(event) => {
                event.post(CGEventTapLocation::HID);
                thread::sleep(Duration::from_millis(15));
                true
            }
            Err(_) => false,
        }
    }
}

impl Device for DarwinDevice {
    fn name(&self) -> &str {
        "darwin"
    }

    fn capture(&mut self, region: Option<Region>) -> Option<Frame> {
        let bounds = CGDisplay::main().bounds();
        let rect = match region {
            Some(r) => CGRect::new(
                &CGPoint::new(r.x as f64, r.y as f64),
                &CGSize::new(r.width as f64, r.height as f64),
            ),
            None => bounds,
        };

        let image_option = kCGWindowImageBoundsIgnoreFraming | kCGWindowImageNominalResolution;
        let image = create_image(rect, kCGWindowListOptionOnScreenOnly, kCGNullWindowID, image_option)?;

        let bpr = image.bytes_per_row() as u32;
        let width = image.width() as u32;
        let height = image.height() as u32;
        let cf_data = image.data();
        let frame = Frame::from_bgra(cf_data.bytes(), width, height, bpr);
        if frame.is_none() {
            logger::warn_p("darwin", &format!("unexpected capture layout {}x{} bpr {}", width, height, bpr));
        }
        frame
    }

    fn move_to(&mut self, at: Point) -> bool {
        let kind = if self.held { CGEventType::LeftMouseDragged } else { CGEventType::MouseMoved };
        self.post_mouse(kind, at)
    }

    fn click(&mut self, at: Point) -> bool {
        self.post_mouse(CGEventType::LeftMouseDown, at) && self.post_mouse(CGEventType::LeftMouseUp, at)
    }

    fn press_down(&mut self, at: Point) -> bool {
        self.move_to(at);
        self.held = self.post_mouse(CGEventType::LeftMouseDown, at);
        self.held
    }

    fn release(&mut self, at: Point) -> bool {
        self.held = false;
        self.post_mouse(CGEventType::LeftMouseUp, at)
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> bool {
        let Some(source) = Self::source() else { return false };
        match CGEvent::new_scroll_event(source, ScrollEventUnit::PIXEL, 2, dy, dx, 0) {
            Ok(event) => {
                event.post(CGEventTapLocation::HID);
                true
            }
            Err(_) => false,
        }
    }
}
