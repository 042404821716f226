//! Screen geometry per scenario and device mode.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::game::{Scenario, StatKey};
use crate::logger;
use crate::types::*;

/// Where each recognized field and fixed tap target sits on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub year: Region,
    pub turn: Region,
    pub mood: Region,
    pub criteria: Region,
    pub event_name: Region,
    pub failure: Region,
    pub support_icons: Region,
    pub skill_points: Region,
    pub stats: BTreeMap<StatKey, Region>,
    /// Neutral spot that closes popups.
    pub dismiss: Point,
    pub center: Point,
    /// Wide confirm button along the bottom edge.
    pub bottom_button: Point,
    /// Vertical distance between stacked event choices.
    pub event_choice_spacing: i32,
    /// Area right of a race card searched for the aptitude marker.
    pub race_card_size: (u32, u32),
    /// Scroll delta for one race-list page.
    pub race_scroll: i32,
}

fn stats(regions: [(u32, u32, u32, u32); 5]) -> BTreeMap<StatKey, Region> {
    StatKey::ALL
        .into_iter()
        .zip(regions)
        .map(|(k, (x, y, w, h))| (k, Region::new(x, y, w, h)))
        .collect()
}

impl Layout {
    fn desktop() -> Self {
        Self {
            year: Region::new(255, 35, 165, 22),
            turn: Region::new(260, 65, 110, 55),
            mood: Region::new(705, 125, 125, 25),
            criteria: Region::new(455, 85, 285, 30),
            event_name: Region::new(241, 205, 365, 30),
            failure: Region::new(250, 770, 605, 30),
            support_icons: Region::new(845, 155, 180, 700),
            skill_points: Region::new(790, 720, 80, 30),
            stats: stats([
                (310, 723, 55, 20),
                (405, 723, 55, 20),
                (500, 723, 55, 20),
                (595, 723, 55, 20),
                (690, 723, 55, 20),
            ]),
            dismiss: Point::new(550, 220),
            center: Point::new(550, 540),
            bottom_button: Point::new(550, 950),
            event_choice_spacing: 115,
            race_card_size: (310, 90),
            race_scroll: -300,
        }
    }

    fn phone() -> Self {
        Self {
            year: Region::new(20, 40, 260, 30),
            turn: Region::new(20, 75, 150, 70),
            mood: Region::new(545, 195, 150, 40),
            criteria: Region::new(240, 120, 420, 40),
            event_name: Region::new(90, 250, 450, 40),
            failure: Region::new(20, 985, 680, 50),
            support_icons: Region::new(600, 170, 120, 640),
            skill_points: Region::new(600, 855, 110, 35),
            stats: stats([
                (73, 858, 65, 22),
                (188, 858, 60, 22),
                (300, 858, 60, 22),
                (412, 858, 65, 22),
                (522, 858, 65, 22),
            ]),
            dismiss: Point::new(360, 250),
            center: Point::new(360, 640),
            bottom_button: Point::new(360, 1100),
            event_choice_spacing: 115,
            race_card_size: (370, 100),
            race_scroll: -150,
        }
    }

    /// Built-in table for a scenario and device mode.
    pub fn builtin(scenario: Scenario, phone: bool) -> Self {
        let mut layout = if phone { Self::phone() } else { Self::desktop() };
        // Aoharu shifts the header down to make room for the team gauge
        if scenario == Scenario::Aoharu {
            let dy = if phone { 12 } else { 8 };
            for r in [&mut layout.turn, &mut layout.criteria, &mut layout.mood] {
                r.y += dy;
            }
            layout.failure.y -= dy;
        }
        layout
    }

    /// Built-in table, overridden by `config.layout_path` when set. A bad
    /// override is logged and ignored.
    pub fn resolve(config: &Config) -> Self {
        let phone = config.use_phone;
        let builtin = Self::builtin(config.scenario, phone);
        let Some(path) = &config.layout_path else { return builtin };
        match Self::load_override(path, config.scenario, phone, &builtin) {
            Ok(layout) => layout,
            Err(e) => {
                logger::warn(&format!("ignoring layout override: {:#}", e));
                builtin
            }
        }
    }

    /// Overrides are keyed `{"ura": {"desktop": {...}, "phone": {...}}, "aoharu": ...}`;
    /// fields left out keep their built-in value.
    pub fn load_override(path: &Path, scenario: Scenario, phone: bool, base: &Layout) -> Result<Layout> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading layout {}", path.display()))?;
        let doc: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing layout {}", path.display()))?;
        let mode = if phone { "phone" } else { "desktop" };
        let Some(Value::Object(fields)) = doc.get(scenario.name()).and_then(|s| s.get(mode)) else {
            return Ok(base.clone());
        };

        let mut merged = serde_json::to_value(base)?;
        if let Value::Object(target) = &mut merged {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(merged).context("applying layout override")
    }

    pub fn stat_region(&self, stat: StatKey) -> Option<Region> {
        self.stats.get(&stat).copied()
    }
}
