use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::{Mood, Scenario, StatKey};

/// Cap assumed for stats missing from `stat_caps`.
pub const DEFAULT_STAT_CAP: u32 = 1200;

/// Static run configuration, read once from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub priority_stat: Vec<StatKey>,
    pub minimum_mood: Mood,
    pub maximum_failure: u32,
    pub stat_caps: BTreeMap<StatKey, u32>,
    pub min_support: u32,
    pub scenario: Scenario,
    #[serde(rename = "usePhone")]
    pub use_phone: bool,
    pub adb_serial: String,
    pub skill_point_cap: u32,
    pub enable_skill_point_check: bool,
    pub prioritize_g1_race: bool,
    /// Search-frame downscale; defaults per device mode.
    pub match_scale: Option<f32>,
    pub assets_dir: PathBuf,
    pub events_path: PathBuf,
    pub layout_path: Option<PathBuf>,
    /// Directory holding the text detection and recognition models.
    pub ocr_models_dir: PathBuf,
    /// Pause between ticks, in milliseconds.
    pub tick_interval_ms: u64,
    /// Filled from `events_path`, not from config.json.
    #[serde(skip)]
    pub events: BTreeMap<String, EventRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            priority_stat: StatKey::ALL.to_vec(),
            minimum_mood: Mood::Good,
            maximum_failure: 15,
            stat_caps: BTreeMap::new(),
            min_support: 2,
            scenario: Scenario::Ura,
            use_phone: false,
            adb_serial: "127.0.0.1:16384".into(),
            skill_point_cap: 100,
            enable_skill_point_check: true,
            prioritize_g1_race: false,
            match_scale: None,
            assets_dir: PathBuf::from("assets"),
            events_path: PathBuf::from("events.json"),
            layout_path: None,
            ocr_models_dir: PathBuf::from("models"),
            tick_interval_ms: 1000,
            events: BTreeMap::new(),
        }
    }
}

/// A known event and the choice to force for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRule {
    /// Case-insensitive substring of the recognized event name.
    pub key: String,
    /// 1-based choice index.
    pub choice: u32,
}

impl Config {
    /// Load `config.json` and the event list it points to. Relative paths
    /// resolve against the config file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new("."));
        config.assets_dir = base.join(&config.assets_dir);
        config.events_path = base.join(&config.events_path);
        config.layout_path = config.layout_path.map(|p| base.join(p));
        config.ocr_models_dir = base.join(&config.ocr_models_dir);

        config.events = load_events(&config.events_path)?;
        Ok(config)
    }

    pub fn stat_cap(&self, stat: StatKey) -> u32 {
        stat_cap(&self.stat_caps, stat)
    }

    pub fn match_scale(&self) -> f32 {
        self.match_scale
            .unwrap_or(if self.use_phone { 0.8 } else { 1.0 })
            .clamp(0.1, 1.0)
    }

    /// Forced choice for a recognized event name, if configured.
    pub fn event_choice(&self, event_name: &str) -> Option<(&str, u32)> {
        let name = event_name.to_lowercase();
        self.events
            .iter()
            .find(|(_, rule)| !rule.key.is_empty() && name.contains(&rule.key.to_lowercase()))
            .map(|(label, rule)| (label.as_str(), rule.choice))
    }
}

/// Configured cap for `stat`, or `DEFAULT_STAT_CAP`.
pub fn stat_cap(caps: &BTreeMap<StatKey, u32>, stat: StatKey) -> u32 {
    caps.get(&stat).copied().unwrap_or(DEFAULT_STAT_CAP)
}

/// A missing event list is not an error; the loop then always picks choice 1.
fn load_events(path: &Path) -> Result<BTreeMap<String, EventRule>> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading events {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing events {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_keys() {
        let json = r#"{
            "priority_stat": ["spd", "sta", "wit", "pwr", "guts"],
            "minimum_mood": "GREAT",
            "maximum_failure": 20,
            "stat_caps": {"spd": 1100},
            "usePhone": true,
            "scenario": 2,
            "saveDebugImages": false
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.priority_stat[2], StatKey::Wit);
        assert_eq!(config.minimum_mood, Mood::Great);
        assert_eq!(config.stat_cap(StatKey::Speed), 1100);
        assert_eq!(config.stat_cap(StatKey::Guts), DEFAULT_STAT_CAP);
        assert_eq!(config.scenario, Scenario::Aoharu);
        assert_eq!(config.min_support, 2);
        assert!((config.match_scale() - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn event_lookup_is_case_insensitive() {
        let mut config = Config::default();
        config.events.insert(
            "Team at Last".into(),
            EventRule { key: "team at last".into(), choice: 3 },
        );
        assert_eq!(config.event_choice("TEAM AT LAST!"), Some(("Team at Last", 3)));
        assert_eq!(config.event_choice("Extra Training"), None);
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = std::env::temp_dir().join(format!("umapilot-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), r#"{"assets_dir": "icons"}"#).unwrap();
        std::fs::write(
            dir.join("events.json"),
            r#"{"New Year": {"key": "new year", "choice": 2}}"#,
        )
        .unwrap();

        let config = Config::load(&dir.join("config.json")).unwrap();
        assert_eq!(config.assets_dir, dir.join("icons"));
        assert_eq!(config.ocr_models_dir, dir.join("models"));
        assert_eq!(config.events["New Year"].choice, 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}
