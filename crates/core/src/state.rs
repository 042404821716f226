//! Builds a `GameSnapshot` from one capture + recognize call per field.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::assets::Assets;
use crate::game::*;
use crate::layout::Layout;
use crate::logger;
use crate::matcher::Matcher;
use crate::ocr::TextRecognizer;
use crate::platform::Device;
use crate::types::*;

/// Match thresholds that differ between desktop and phone captures.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub training_icon: f32,
    pub support_icon: f32,
    pub spirit: f32,
    pub spirit_bomb: f32,
}

impl Thresholds {
    pub fn for_mode(phone: bool) -> Self {
        if phone {
            Self { training_icon: 0.65, support_icon: 0.67, spirit: 0.73, spirit_bomb: 0.65 }
        } else {
            Self { training_icon: 0.8, support_icon: 0.8, spirit: 0.73, spirit_bomb: 0.65 }
        }
    }
}

/// Pointer pressed down for the lifetime of the guard. Dropping it releases
/// at the last point pressed or dragged to, on every exit path.
pub struct PointerHold<'d> {
    device: &'d mut dyn Device,
    at: Point,
}

impl<'d> PointerHold<'d> {
    pub fn press(device: &'d mut dyn Device, at: Point) -> Self {
        device.press_down(at);
        Self { device, at }
    }

    pub fn move_to(&mut self, at: Point) {
        self.device.move_to(at);
        self.at = at;
    }

    pub fn device(&mut self) -> &mut dyn Device {
        &mut *self.device
    }
}

impl Drop for PointerHold<'_> {
    fn drop(&mut self) {
        self.device.release(self.at);
    }
}

pub fn training_icon_name(stat: StatKey) -> String {
    format!("train_{}", stat.key())
}

pub fn support_icon_name(kind: SupportKind) -> String {
    format!("support_card_type_{}", kind.key())
}

const SETTLE: Duration = Duration::from_millis(150);
const HOVER: Duration = Duration::from_millis(200);

pub struct StateAggregator {
    matcher: Matcher,
    ocr: TextRecognizer,
    assets: Arc<Assets>,
    layout: Layout,
    scenario: Scenario,
    thresholds: Thresholds,
    /// Pause for the preview panel to settle before each stat read.
    pub settle: Duration,
    /// Pause after hovering the guts icon before the scan starts.
    pub hover: Duration,
}

impl StateAggregator {
    pub fn new(
        matcher: Matcher,
        ocr: TextRecognizer,
        assets: Arc<Assets>,
        layout: Layout,
        scenario: Scenario,
        phone: bool,
    ) -> Self {
        Self {
            matcher,
            ocr,
            assets,
            layout,
            scenario,
            thresholds: Thresholds::for_mode(phone),
            settle: SETTLE,
            hover: HOVER,
        }
    }

    /// Scale the settle and hover pauses; 0 disables them.
    pub fn set_time_scale(&mut self, scale: f32) {
        let scale = scale.max(0.0);
        self.settle = SETTLE.mul_f32(scale);
        self.hover = HOVER.mul_f32(scale);
    }

    pub fn year(&self, device: &mut dyn Device) -> String {
        self.ocr.text(device, self.layout.year)
    }

    pub fn event_name(&self, device: &mut dyn Device) -> String {
        self.ocr.text(device, self.layout.event_name)
    }

    pub fn criteria(&self, device: &mut dyn Device) -> String {
        self.ocr.text(device, self.layout.criteria)
    }

    pub fn turn(&self, device: &mut dyn Device) -> Turn {
        self.ocr.turn(device, self.layout.turn)
    }

    pub fn mood(&self, device: &mut dyn Device) -> Mood {
        let mood = self.ocr.mood(device, self.layout.mood);
        if mood == Mood::Unknown {
            logger::warn_p("state", "mood not recognized");
        }
        mood
    }

    pub fn skill_points(&self, device: &mut dyn Device) -> u32 {
        self.ocr.number(device, self.layout.skill_points)
    }

    pub fn current_stats(&self, device: &mut dyn Device) -> BTreeMap<StatKey, u32> {
        StatKey::ALL
            .into_iter()
            .map(|stat| {
                let value = self
                    .layout
                    .stat_region(stat)
                    .map_or(0, |r| self.ocr.number(device, r));
                (stat, value)
            })
            .collect()
    }

    /// Every lobby field. Training options are read separately once the
    /// training screen is open.
    pub fn snapshot(&self, device: &mut dyn Device) -> GameSnapshot {
        let snapshot = GameSnapshot {
            year: self.year(device),
            turn: self.turn(device),
            mood: self.mood(device),
            criteria: self.criteria(device),
            event_name: self.event_name(device),
            training_options: TrainingOptions::new(),
            current_stats: self.current_stats(device),
            skill_points: self.skill_points(device),
        };
        logger::info_p(
            "state",
            &format!(
                "year {:?}, turn {}, mood {}, criteria {:?}",
                snapshot.year, snapshot.turn, snapshot.mood, snapshot.criteria
            ),
        );
        snapshot
    }

    pub fn locate_training_icon(&self, device: &mut dyn Device, stat: StatKey) -> Option<Point> {
        let chain = self.assets.chain(&training_icon_name(stat));
        self.matcher
            .locate(device, &chain, None, self.thresholds.training_icon, Duration::ZERO)
            .map(|m| m.center())
    }

    /// Hover the guts icon so the preview panel is open before the scan.
    pub fn pre_position(&self, device: &mut dyn Device) -> bool {
        match self.locate_training_icon(device, StatKey::Guts) {
            Some(at) => {
                device.move_to(at);
                if !self.hover.is_zero() {
                    std::thread::sleep(self.hover);
                }
                true
            }
            None => {
                logger::info_p("state", "guts icon not found, continuing without pre-move");
                false
            }
        }
    }

    /// Scan all five training previews. The pointer is pressed on the first
    /// icon found, dragged across the rest, and released after the last read.
    /// Stats whose icon cannot be found are left out.
    pub fn training_options(&self, device: &mut dyn Device) -> TrainingOptions {
        let mut options = TrainingOptions::new();
        self.pre_position(device);

        let mut remaining = StatKey::ALL.into_iter();
        let (first, at) = loop {
            let Some(stat) = remaining.next() else {
                logger::warn_p("state", "no training icon found");
                return options;
            };
            match self.locate_training_icon(device, stat) {
                Some(at) => break (stat, at),
                None => logger::warn_p("state", &format!("{} icon not found", stat)),
            }
        };

        let mut bonus_pending = self.scenario == Scenario::Aoharu;
        let mut hold = PointerHold::press(device, at);
        let option = self.read_option(hold.device(), first, &mut bonus_pending);
        options.insert(first, option);

        for stat in remaining {
            let Some(at) = self.locate_training_icon(hold.device(), stat) else {
                logger::warn_p("state", &format!("{} icon not found", stat));
                continue;
            };
            hold.move_to(at);
            let option = self.read_option(hold.device(), stat, &mut bonus_pending);
            options.insert(stat, option);
        }
        options
    }

    fn read_option(&self, device: &mut dyn Device, stat: StatKey, bonus_pending: &mut bool) -> TrainingOption {
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        let (support, bonus) = self.support_counts(device, *bonus_pending);
        if bonus.is_some() {
            *bonus_pending = false;
        }
        let failure = self.ocr.failure(device, self.layout.failure);

        let mut option = TrainingOption::new(support, failure);
        option.bonus = bonus;

        let shown: Vec<String> = option
            .support
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(k, n)| format!("{}:{}", k.key(), n))
            .collect();
        let fail = failure.map_or_else(|| "?".to_string(), |f| format!("{}%", f));
        match bonus {
            Some(b) => logger::info_p(
                "state",
                &format!("[{}] {{{}}}, spirit {}, spirit bomb {}, fail {}", stat, shown.join(" "), b.spirit, b.spirit_bomb, fail),
            ),
            None => logger::info_p("state", &format!("[{}] {{{}}}, fail {}", stat, shown.join(" "), fail)),
        }
        option
    }

    /// Support icons by kind on a single capture of the icon column, plus
    /// the scenario-wide markers when `with_bonus` is set.
    pub fn support_counts(
        &self,
        device: &mut dyn Device,
        with_bonus: bool,
    ) -> (BTreeMap<SupportKind, u32>, Option<BonusMarkers>) {
        let mut counts = BTreeMap::new();
        let Some(frame) = device.capture(Some(self.layout.support_icons)) else {
            return (counts, with_bonus.then(BonusMarkers::default));
        };
        let count = |name: &str, threshold: f32| -> Option<u32> {
            let chain = self.assets.chain(name);
            let template = chain.first()?;
            Some(self.matcher.find_counted(&frame, template, threshold).len() as u32)
        };

        for kind in SupportKind::ALL {
            if let Some(n) = count(&support_icon_name(kind), self.thresholds.support_icon) {
                counts.insert(kind, n);
            }
        }
        let bonus = with_bonus.then(|| BonusMarkers {
            spirit: count("spirit", self.thresholds.spirit).unwrap_or(0),
            spirit_bomb: count("spirit-bomb", self.thresholds.spirit_bomb).unwrap_or(0),
        });
        (counts, bonus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::{noise, paste};
    use crate::matcher::Template;
    use crate::ocr::tests::ScriptedEngine;
    use crate::platform::stub::StubDevice;
    use image::{Rgb, RgbImage};
    use std::panic::{self, AssertUnwindSafe};

    const ICON_Y: u32 = 160;

    fn icon_x(stat: StatKey) -> u32 {
        10 + stat as u32 * 36
    }

    /// Small training screen: five icons along the bottom, two speed support
    /// icons in the support column.
    fn training_screen(assets: &mut Assets) -> Frame {
        let mut img = RgbImage::from_pixel(320, 200, Rgb([40, 40, 40]));
        for stat in StatKey::ALL {
            let icon = noise(16, 16, 2, 100 + stat as u64);
            paste(&mut img, &icon, icon_x(stat), ICON_Y);
            assets.insert(Template::from_rgb(&training_icon_name(stat), &icon).unwrap());
        }
        let spd = noise(12, 12, 2, 200);
        paste(&mut img, &spd, 220, 10);
        paste(&mut img, &spd, 220, 70);
        assets.insert(Template::from_rgb(&support_icon_name(SupportKind::Speed), &spd).unwrap());
        assets.insert(Template::from_rgb(&support_icon_name(SupportKind::Wit), &noise(12, 12, 2, 201)).unwrap());
        Frame::from_rgb(img)
    }

    fn compact_layout() -> Layout {
        let mut layout = Layout::builtin(Scenario::Ura, false);
        layout.support_icons = Region::new(200, 0, 120, 140);
        layout.failure = Region::new(0, 100, 100, 20);
        layout
    }

    fn aggregator(assets: Assets, engine: ScriptedEngine, scenario: Scenario) -> StateAggregator {
        let mut agg = StateAggregator::new(
            Matcher::default(),
            TextRecognizer::new(Box::new(engine)),
            Arc::new(assets),
            compact_layout(),
            scenario,
            false,
        );
        agg.set_time_scale(0.0);
        agg
    }

    fn center(stat: StatKey) -> Point {
        Point::new(icon_x(stat) as i32 + 8, ICON_Y as i32 + 8)
    }

    #[test]
    fn pauses_follow_the_time_scale() {
        let mut assets = Assets::empty(false);
        let frame = training_screen(&mut assets);
        let mut agg = aggregator(assets, ScriptedEngine::default(), Scenario::Ura);
        assert_eq!((agg.settle, agg.hover), (Duration::ZERO, Duration::ZERO));

        let mut dev = StubDevice::new(vec![frame]);
        assert!(agg.pre_position(&mut dev));
        assert_eq!(dev.inputs.last(), Some(&InputEvent::Move(center(StatKey::Guts))));

        agg.set_time_scale(0.5);
        assert_eq!(agg.settle, Duration::from_millis(75));
        assert_eq!(agg.hover, Duration::from_millis(100));
    }

    #[test]
    fn scans_all_stats_under_one_hold() {
        let mut assets = Assets::empty(false);
        let frame = training_screen(&mut assets);
        let engine = ScriptedEngine::new(&["Failure 3%", "Failure 129", "nonsense", "Failure 40%", "Failure 0%"]);
        let agg = aggregator(assets, engine, Scenario::Ura);
        let mut dev = StubDevice::new(vec![frame]);

        let options = agg.training_options(&mut dev);
        assert_eq!(options.len(), 5);
        assert_eq!(options[&StatKey::Speed].failure, Some(3));
        assert_eq!(options[&StatKey::Stamina].failure, Some(12));
        assert_eq!(options[&StatKey::Power].failure, None);
        assert_eq!(options[&StatKey::Speed].support[&SupportKind::Speed], 2);
        assert_eq!(options[&StatKey::Speed].total_support, 2);
        assert!(options.values().all(|o| o.bonus.is_none()));

        let downs = dev.inputs.iter().filter(|e| matches!(e, InputEvent::Down(_))).count();
        assert_eq!(downs, 1);
        assert_eq!(dev.inputs[0], InputEvent::Move(center(StatKey::Guts)));
        assert_eq!(dev.inputs[1], InputEvent::Down(center(StatKey::Speed)));
        assert_eq!(dev.inputs.last(), Some(&InputEvent::Up(center(StatKey::Wit))));
    }

    #[test]
    fn bonus_markers_read_once() {
        let mut assets = Assets::empty(false);
        let frame = training_screen(&mut assets);
        let agg = aggregator(assets, ScriptedEngine::new(&[]), Scenario::Aoharu);
        let mut dev = StubDevice::new(vec![frame]);

        let options = agg.training_options(&mut dev);
        assert_eq!(options[&StatKey::Speed].bonus, Some(BonusMarkers::default()));
        assert!(options.iter().filter(|(k, _)| **k != StatKey::Speed).all(|(_, o)| o.bonus.is_none()));
    }

    #[test]
    fn hold_is_released_when_a_read_panics() {
        struct Exploding;
        impl crate::ocr::TextEngine for Exploding {
            fn read(&self, _: &image::GrayImage) -> anyhow::Result<String> {
                panic!("engine crashed");
            }
        }

        let mut assets = Assets::empty(false);
        let frame = training_screen(&mut assets);
        let mut agg = aggregator(assets, ScriptedEngine::new(&[]), Scenario::Ura);
        agg.ocr = TextRecognizer::new(Box::new(Exploding));
        let mut dev = StubDevice::new(vec![frame]);

        let result = panic::catch_unwind(AssertUnwindSafe(|| agg.training_options(&mut dev)));
        assert!(result.is_err());
        assert_eq!(dev.inputs.last(), Some(&InputEvent::Up(center(StatKey::Speed))));
    }

    #[test]
    fn no_icons_means_no_options_and_no_press() {
        let agg = aggregator(Assets::empty(false), ScriptedEngine::new(&[]), Scenario::Ura);
        let mut dev = StubDevice::blank(200, 200);
        assert!(agg.training_options(&mut dev).is_empty());
        assert!(dev.inputs.is_empty());
    }

    #[test]
    fn unreadable_fields_become_sentinels() {
        let agg = aggregator(Assets::empty(false), ScriptedEngine::new(&[]), Scenario::Ura);
        let mut dev = StubDevice::blank(1100, 1100);
        let snap = agg.snapshot(&mut dev);
        assert_eq!(snap.turn, Turn::Unknown);
        assert_eq!(snap.mood, Mood::Unknown);
        assert_eq!(snap.year, "");
        assert_eq!(snap.current_stats[&StatKey::Wit], 0);
    }

    #[test]
    fn snapshot_reads_fields_in_order() {
        let engine = ScriptedEngine::new(&[
            "Classic Year Early Jul",
            "12",
            "GOOD",
            "Fans 5000",
            "",
            "400",
            "310",
            "280",
            "250",
            "300",
            "120",
        ]);
        let agg = aggregator(Assets::empty(false), engine, Scenario::Ura);
        let mut dev = StubDevice::blank(1100, 1100);
        let snap = agg.snapshot(&mut dev);
        assert_eq!(snap.year, "Classic Year Early Jul");
        assert_eq!(snap.turn, Turn::Remaining(12));
        assert_eq!(snap.mood, Mood::Good);
        assert_eq!(snap.current_stats[&StatKey::Speed], 400);
        assert_eq!(snap.current_stats[&StatKey::Wit], 300);
        assert_eq!(snap.skill_points, 120);
    }
}
