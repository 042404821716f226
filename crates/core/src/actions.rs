//! Button flows that carry out a decision on screen.

use std::sync::Arc;
use std::time::Duration;

use crate::assets::Assets;
use crate::game::{Scenario, StatKey};
use crate::layout::Layout;
use crate::logger;
use crate::matcher::Matcher;
use crate::platform::Device;
use crate::sleep;
use crate::state::training_icon_name;
use crate::types::*;

/// Pages scanned in the race list before giving up.
const RACE_LIST_PAGES: usize = 4;
/// Scroll steps per race-list page.
const SCROLLS_PER_PAGE: usize = 4;

pub struct Dispatcher {
    matcher: Matcher,
    assets: Arc<Assets>,
    layout: Layout,
    scenario: Scenario,
    phone: bool,
    /// Multiplier on every pause and search budget; 0 makes each search a
    /// single attempt with no waiting.
    pub time_scale: f32,
}

impl Dispatcher {
    pub fn new(matcher: Matcher, assets: Arc<Assets>, layout: Layout, scenario: Scenario, phone: bool) -> Self {
        Self { matcher, assets, layout, scenario, phone, time_scale: 1.0 }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Threshold for the current device mode.
    fn conf(&self, desktop: f32, phone: f32) -> f32 {
        if self.phone {
            phone
        } else {
            desktop
        }
    }

    fn budget(&self, secs: f32) -> Duration {
        Duration::from_secs_f32((secs * self.time_scale).max(0.0))
    }

    pub fn wait(&self, ms: u64) {
        if self.time_scale > 0.0 {
            sleep::pause_jitter(Duration::from_secs_f32(ms as f32 / 1000.0 * self.time_scale));
        }
    }

    pub fn find(&self, device: &mut dyn Device, name: &str, threshold: f32, secs: f32) -> Option<MatchCandidate> {
        let chain = self.assets.chain(name);
        self.matcher.locate(device, &chain, None, threshold, self.budget(secs))
    }

    pub fn tap(&self, device: &mut dyn Device, at: Point) -> bool {
        device.move_to(at) && device.click(at)
    }

    /// Locate a button and click its center.
    pub fn click_button(&self, device: &mut dyn Device, name: &str, threshold: f32, secs: f32) -> bool {
        match self.find(device, name, threshold, secs) {
            Some(m) => {
                logger::debug_p("agent", &format!("click {}", name));
                self.tap(device, m.center())
            }
            None => false,
        }
    }

    fn click_next(&self, device: &mut dyn Device, name: &str, secs: f32) -> bool {
        self.click_button(device, name, 0.8, secs)
    }

    /// Close popups by tapping a neutral spot.
    pub fn dismiss(&self, device: &mut dyn Device) {
        device.click(self.layout.dismiss);
    }

    /// Pick the `choice`-th option (1-based) of the event on screen, counted
    /// down from the first choice marker.
    pub fn click_event_choice(&self, device: &mut dyn Device, choice: u32, secs: f32) -> bool {
        let Some(first) = self.find(device, "event_choice_1", 0.9, secs) else {
            return false;
        };
        let offset = choice.saturating_sub(1) as i32 * self.layout.event_choice_spacing;
        let target = first.center().offset(0, offset);
        logger::info_p("agent", &format!("event choice {} at {:?}", choice, target));
        self.tap(device, target)
    }

    pub fn go_to_training(&self, device: &mut dyn Device) -> bool {
        let name = format!("training_btn_{}", self.scenario.name());
        self.click_button(device, &name, self.conf(0.8, 0.7), 0.2)
    }

    pub fn back(&self, device: &mut dyn Device) -> bool {
        self.click_button(device, "back_btn", 0.8, 0.2)
    }

    /// Hover the guts icon; wit training is entered from there.
    pub fn hover_guts(&self, device: &mut dyn Device) -> bool {
        match self.find(device, &training_icon_name(StatKey::Guts), self.conf(0.8, 0.65), 0.2) {
            Some(m) => {
                device.move_to(m.center());
                self.wait(200);
                true
            }
            None => false,
        }
    }

    pub fn train(&self, device: &mut dyn Device, stat: StatKey) -> bool {
        if stat == StatKey::Wit {
            logger::info_p("agent", "moving to guts first for wit training");
            self.hover_guts(device);
        }
        let Some(m) = self.find(device, &training_icon_name(stat), self.conf(0.8, 0.7), 0.2) else {
            logger::warn_p("agent", &format!("{} training button not found", stat));
            return false;
        };
        let at = m.center();
        logger::info_p("agent", &format!("training {}", stat));
        device.move_to(at);
        // first press selects, the next confirms
        let presses = if self.phone { 2 } else { 3 };
        for i in 0..presses {
            if i > 0 {
                self.wait(100);
            }
            device.click(at);
        }
        true
    }

    pub fn rest(&self, device: &mut dyn Device) -> bool {
        self.click_button(device, "rest_btn", 0.8, 0.0) || self.click_button(device, "rest_summer_btn", 0.6, 0.0)
    }

    pub fn recreation(&self, device: &mut dyn Device) -> bool {
        let conf = self.conf(0.8, 0.65);
        self.click_button(device, "recreation_btn", conf, 0.0)
            || self.click_button(device, "rest_summer_btn", conf, 0.0)
            || self.click_button(device, "recreation_btn_aoharu", self.conf(0.8, 0.6), 0.0)
    }

    /// Open the race list and run a race from it. `false` when no suitable
    /// race was found; the race list is still open in that case.
    pub fn race(&self, device: &mut dyn Device, prioritize_top_tier: bool) -> bool {
        self.click_button(device, "races_btn", self.conf(0.8, 0.7), 10.0);
        self.click_button(device, "ok_btn", self.conf(0.8, 0.7), 0.7);

        if !self.race_select(device, prioritize_top_tier) {
            logger::info_p("agent", "no race found");
            return false;
        }
        self.race_prep(device);
        self.wait(1000);
        self.after_race(device);
        true
    }

    /// Mandatory race on a race-day turn.
    pub fn race_day(&self, device: &mut dyn Device) {
        self.click_button(device, "race_day_btn", self.conf(0.8, 0.65), 10.0);
        self.click_button(device, "ok_btn", 0.8, 0.7);
        self.wait(500);
        self.confirm_race(device);
        self.race_prep(device);
        self.wait(1000);
        self.after_race(device);
    }

    pub fn finale_race(&self, device: &mut dyn Device) {
        logger::info_p("agent", "URA finale");
        self.click_button(device, "ura_race_btn", self.conf(0.8, 0.7), 0.2);
        self.confirm_race(device);
        self.race_prep(device);
        self.wait(1000);
        self.after_race(device);
    }

    /// The race button appears twice: on the race card and in the confirm popup.
    fn confirm_race(&self, device: &mut dyn Device) {
        for _ in 0..2 {
            if self.click_button(device, "race_btn", 0.8, 2.0) {
                self.wait(500);
            }
        }
    }

    fn scroll_race_list(&self, device: &mut dyn Device) {
        for _ in 0..SCROLLS_PER_PAGE {
            device.scroll(0, self.layout.race_scroll);
        }
    }

    /// Pick a race with matching aptitude. With `prioritize_top_tier` only
    /// G1 cards are considered and the aptitude marker must sit on the card.
    pub fn race_select(&self, device: &mut dyn Device, prioritize_top_tier: bool) -> bool {
        self.wait(200);
        let track = self.assets.chain("match_track");

        if prioritize_top_tier {
            logger::info_p("agent", "looking for a G1 race");
            let g1 = self.assets.chain("g1_race");
            let Some(g1) = g1.first() else { return false };
            let (w, h) = self.layout.race_card_size;
            for _ in 0..2 {
                let cards = self.matcher.locate_all(device, g1, None, 0.85, Duration::ZERO);
                for card in cards {
                    let region = Region::new(card.x.max(0) as u32, card.y.max(0) as u32, w, h);
                    if let Some(m) = self.matcher.locate(device, &track, Some(region), 0.7, self.budget(0.7)) {
                        logger::info_p("agent", "G1 race found");
                        self.tap(device, m.center());
                        self.confirm_race(device);
                        return true;
                    }
                }
                self.scroll_race_list(device);
            }
            return false;
        }

        logger::info_p("agent", "looking for a race");
        for _ in 0..RACE_LIST_PAGES {
            if let Some(m) = self.matcher.locate(device, &track, None, 0.8, self.budget(0.7)) {
                logger::info_p("agent", "race found");
                self.tap(device, m.center());
                self.confirm_race(device);
                return true;
            }
            self.scroll_race_list(device);
        }
        false
    }

    /// Wait for the race to finish and skip through the results.
    pub fn race_prep(&self, device: &mut dyn Device) {
        self.wait(3500);
        let Some(m) = self.find(device, "view_results", self.conf(0.8, 0.6), 12.0) else {
            return;
        };
        device.click(m.center());
        self.wait(1500);
        for _ in 0..2 {
            for _ in 0..3 {
                device.click(self.layout.center);
                self.wait(100);
            }
            self.wait(1500);
        }
    }

    pub fn after_race(&self, device: &mut dyn Device) {
        self.click_next(device, "next_btn", 2.0);
        self.wait(2000);
        self.click_next(device, "next2_btn", 3.0);
        self.wait(2000);
        self.click_next(device, "next_btn_aoharu", 2.0);
    }

    /// Advance past transient screens. `true` when something was clicked.
    pub fn skip_transients(&self, device: &mut dyn Device) -> bool {
        if self.click_button(device, "inspiration_btn", 0.65, 0.2) {
            logger::info_p("agent", "inspiration found");
            return true;
        }
        if self.click_button(device, "next_btn", self.conf(0.8, 0.7), 0.2) {
            return true;
        }
        if self.click_button(device, "next_btn_aoharu", self.conf(0.8, 0.7), 0.2) {
            return true;
        }
        self.click_button(device, "cancel_btn", self.conf(0.8, 0.7), 0.2)
    }

    /// Aoharu team showdown. `true` when the showdown screen was handled.
    pub fn team_showdown(&self, device: &mut dyn Device) -> bool {
        if self.find(device, "aoharu_run_btn", 0.75, 0.0).is_none() {
            return false;
        }
        logger::info_p("agent", "team showdown");
        let (center, bottom) = (self.layout.center, self.layout.bottom_button);
        device.click(bottom);
        self.wait(2000);

        if self.click_button(device, "final_showdown_aoharu", 0.55, 2.0) {
            logger::info_p("agent", "final showdown");
            return true;
        }

        // middle team, then select opponent
        self.wait(1500);
        self.tap(device, center);
        self.wait(1500);
        device.move_to(center);
        device.click(bottom);
        self.wait(2000);
        self.click_button(device, "begin_showdown_aoharu", 0.65, 2.0);

        device.click(center);
        self.wait(1500);
        self.click_button(device, "next_btn_aoharu", self.conf(0.8, 0.65), 0.2);
        self.wait(1500);
        self.click_next(device, "next_btn", 2.0);
        self.wait(3000);
        self.click_button(device, "skip_btn", 0.65, 2.0);
        self.click_button(device, "next_btn_aoharu", 0.6, 2.0);
        self.wait(1500);
        self.click_button(device, "skip_btn", 0.65, 2.0);
        true
    }

    /// Tazuna's hint icon only shows in the career lobby.
    pub fn in_lobby(&self, device: &mut dyn Device) -> bool {
        self.find(device, "tazuna_hint", 0.8, 0.2).is_some()
    }

    /// Click the infirmary when its button is lit.
    pub fn visit_infirmary(&self, device: &mut dyn Device) -> bool {
        let Some(button) = self.find(device, "infirmary_btn2", self.conf(0.8, 0.7), 1.0) else {
            return false;
        };
        let lit = device
            .capture(Some(button.region()))
            .is_some_and(|f| f.mean_brightness() > 150.0);
        if !lit {
            return false;
        }
        logger::info_p("agent", "debuffed, going to the infirmary");
        device.click(button.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::{noise, paste};
    use crate::matcher::Template;
    use crate::platform::stub::StubDevice;
    use image::{Rgb, RgbImage};

    fn dispatcher(assets: Assets) -> Dispatcher {
        let mut d = Dispatcher::new(
            Matcher::default(),
            Arc::new(assets),
            Layout::builtin(Scenario::Ura, true),
            Scenario::Ura,
            true,
        );
        d.time_scale = 0.0;
        d
    }

    /// One screen with the named buttons pasted at the given positions.
    fn screen(buttons: &[(&str, u32, u32, u8)], assets: &mut Assets) -> Frame {
        let mut img = RgbImage::from_pixel(200, 200, Rgb([90, 90, 90]));
        for (i, (name, x, y, fill)) in buttons.iter().enumerate() {
            let mut icon = noise(14, 14, 2, 300 + i as u64);
            if *fill > 0 {
                for p in icon.pixels_mut() {
                    p.0 = [p[0].max(*fill), p[1].max(*fill), p[2].max(*fill)];
                }
            }
            paste(&mut img, &icon, *x, *y);
            assets.insert(Template::from_rgb(name, &icon).unwrap());
        }
        Frame::from_rgb(img)
    }

    fn clicks(dev: &StubDevice) -> Vec<Point> {
        dev.inputs
            .iter()
            .filter_map(|e| match e {
                InputEvent::Click(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn event_choice_counts_down_from_first() {
        let mut assets = Assets::empty(true);
        let frame = screen(&[("event_choice_1", 40, 20, 0)], &mut assets);
        let d = dispatcher(assets);
        let mut dev = StubDevice::new(vec![frame]);
        assert!(d.click_event_choice(&mut dev, 3, 0.0));
        assert_eq!(clicks(&dev), vec![Point::new(47, 27 + 230)]);
    }

    #[test]
    fn rest_falls_back_to_summer_button() {
        let mut assets = Assets::empty(true);
        let frame = screen(&[("rest_summer_btn", 100, 100, 0)], &mut assets);
        assets.insert(Template::from_rgb("rest_btn", &noise(14, 14, 1, 999)).unwrap());
        let d = dispatcher(assets);
        let mut dev = StubDevice::new(vec![frame]);
        assert!(d.rest(&mut dev));
        assert_eq!(clicks(&dev), vec![Point::new(107, 107)]);
    }

    #[test]
    fn phone_training_presses_twice() {
        let mut assets = Assets::empty(true);
        let frame = screen(&[("train_pwr", 60, 150, 0)], &mut assets);
        let d = dispatcher(assets);
        let mut dev = StubDevice::new(vec![frame]);
        assert!(d.train(&mut dev, StatKey::Power));
        assert_eq!(clicks(&dev), vec![Point::new(67, 157); 2]);
        assert!(!d.train(&mut dev, StatKey::Speed));
    }

    #[test]
    fn wit_training_hovers_guts_first() {
        let mut assets = Assets::empty(true);
        let frame = screen(&[("train_guts", 20, 150, 0), ("train_wit", 60, 150, 0)], &mut assets);
        let d = dispatcher(assets);
        let mut dev = StubDevice::new(vec![frame]);
        assert!(d.train(&mut dev, StatKey::Wit));
        assert_eq!(dev.inputs[0], InputEvent::Move(Point::new(27, 157)));
    }

    #[test]
    fn top_tier_race_needs_aptitude_on_the_card() {
        let mut assets = Assets::empty(true);
        // aptitude marker sits inside the card area to the right of the G1 badge
        let frame = screen(&[("g1_race", 10, 40, 0), ("match_track", 120, 60, 0)], &mut assets);
        let d = dispatcher(assets);
        let mut dev = StubDevice::new(vec![frame]);
        assert!(d.race_select(&mut dev, true));
        assert_eq!(clicks(&dev)[0], Point::new(127, 67));
    }

    #[test]
    fn race_select_scrolls_then_gives_up() {
        let mut assets = Assets::empty(true);
        assets.insert(Template::from_rgb("match_track", &noise(10, 10, 1, 5)).unwrap());
        let d = dispatcher(assets);
        let mut dev = StubDevice::blank(200, 200);
        assert!(!d.race_select(&mut dev, false));
        let scrolls = dev.inputs.iter().filter(|e| matches!(e, InputEvent::Scroll(0, -150))).count();
        assert_eq!(scrolls, RACE_LIST_PAGES * SCROLLS_PER_PAGE);
    }

    #[test]
    fn infirmary_only_when_lit() {
        let mut assets = Assets::empty(true);
        let frame = screen(&[("infirmary_btn2", 50, 50, 200)], &mut assets);
        let d = dispatcher(assets);
        let mut dev = StubDevice::new(vec![frame]);
        assert!(d.visit_infirmary(&mut dev));

        let mut assets = Assets::empty(true);
        let frame = screen(&[("infirmary_btn2", 50, 50, 0)], &mut assets);
        let d = dispatcher(assets);
        let mut dev = StubDevice::new(vec![frame]);
        assert!(!d.visit_infirmary(&mut dev));
    }
}
