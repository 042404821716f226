//! Game-domain vocabulary: stats, moods, turns, snapshots and decisions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Months with no race schedule.
const OFF_SEASON: [&str; 2] = ["Jul", "Aug"];

/// The five trainable stats, in on-screen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatKey {
    #[serde(rename = "spd")]
    Speed,
    #[serde(rename = "sta")]
    Stamina,
    #[serde(rename = "pwr")]
    Power,
    #[serde(rename = "guts")]
    Guts,
    #[serde(rename = "wit")]
    Wit,
}

impl StatKey {
    pub const ALL: [StatKey; 5] = [
        StatKey::Speed,
        StatKey::Stamina,
        StatKey::Power,
        StatKey::Guts,
        StatKey::Wit,
    ];

    pub fn key(self) -> &'static str {
        match self {
            StatKey::Speed => "spd",
            StatKey::Stamina => "sta",
            StatKey::Power => "pwr",
            StatKey::Guts => "guts",
            StatKey::Wit => "wit",
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Support-card categories shown as icons on a training preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SupportKind {
    Speed,
    Stamina,
    Power,
    Guts,
    Wit,
    Friend,
}

impl SupportKind {
    pub const ALL: [SupportKind; 6] = [
        SupportKind::Speed,
        SupportKind::Stamina,
        SupportKind::Power,
        SupportKind::Guts,
        SupportKind::Wit,
        SupportKind::Friend,
    ];

    /// The support type that "matches" a stat for rainbow training.
    pub fn for_stat(stat: StatKey) -> SupportKind {
        match stat {
            StatKey::Speed => SupportKind::Speed,
            StatKey::Stamina => SupportKind::Stamina,
            StatKey::Power => SupportKind::Power,
            StatKey::Guts => SupportKind::Guts,
            StatKey::Wit => SupportKind::Wit,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SupportKind::Friend => "friend",
            SupportKind::Speed => "spd",
            SupportKind::Stamina => "sta",
            SupportKind::Power => "pwr",
            SupportKind::Guts => "guts",
            SupportKind::Wit => "wit",
        }
    }
}

/// Mood levels, worst to best, with `Unknown` ranked last so an unreadable
/// mood never triggers a mood fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mood {
    Awful,
    Bad,
    Normal,
    Good,
    Great,
    #[default]
    Unknown,
}

impl Mood {
    /// Recognizable labels in vocabulary order.
    pub const VOCABULARY: [Mood; 5] = [Mood::Awful, Mood::Bad, Mood::Normal, Mood::Good, Mood::Great];

    pub fn label(self) -> &'static str {
        match self {
            Mood::Awful => "AWFUL",
            Mood::Bad => "BAD",
            Mood::Normal => "NORMAL",
            Mood::Good => "GOOD",
            Mood::Great => "GREAT",
            Mood::Unknown => "UNKNOWN",
        }
    }

    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Turn counter as displayed in the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Turn {
    Remaining(u32),
    RaceDay,
    Goal,
    #[default]
    Unknown,
}

impl Turn {
    pub fn is_race(self) -> bool {
        matches!(self, Turn::RaceDay | Turn::Goal)
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Turn::Remaining(n) => write!(f, "{}", n),
            Turn::RaceDay => f.write_str("Race Day"),
            Turn::Goal => f.write_str("Goal"),
            Turn::Unknown => f.write_str("-1"),
        }
    }
}

/// Scenario-wide marker counts (Aoharu spirit icons).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BonusMarkers {
    pub spirit: u32,
    pub spirit_bomb: u32,
}

/// What the training preview shows for one stat.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingOption {
    pub support: BTreeMap<SupportKind, u32>,
    pub total_support: u32,
    /// Failure percent; `None` when the reading was not trusted.
    pub failure: Option<u32>,
    pub bonus: Option<BonusMarkers>,
}

impl TrainingOption {
    pub fn new(support: BTreeMap<SupportKind, u32>, failure: Option<u32>) -> Self {
        let total_support = support.values().sum();
        Self { support, total_support, failure, bonus: None }
    }

    /// Number of support cards whose type matches `stat`.
    pub fn matching_support(&self, stat: StatKey) -> u32 {
        self.support.get(&SupportKind::for_stat(stat)).copied().unwrap_or(0)
    }

    /// Known failure strictly below `max_failure`.
    pub fn is_safe(&self, max_failure: u32) -> bool {
        self.failure.is_some_and(|f| f < max_failure)
    }
}

pub type TrainingOptions = BTreeMap<StatKey, TrainingOption>;

/// Everything recognized in one tick. Rebuilt from scratch each tick.
#[derive(Debug, Clone, Default)]
pub struct GameSnapshot {
    pub year: String,
    pub turn: Turn,
    pub mood: Mood,
    pub criteria: String,
    pub event_name: String,
    pub training_options: TrainingOptions,
    pub current_stats: BTreeMap<StatKey, u32>,
    pub skill_points: u32,
}

impl GameSnapshot {
    /// Earliest phase of the career.
    pub fn is_junior(&self) -> bool {
        self.year.contains("Junior Year")
    }

    pub fn is_pre_debut(&self) -> bool {
        self.year.trim() == "Junior Year Pre-Debut"
    }

    pub fn is_finale_season(&self) -> bool {
        self.year.trim() == "Finale Season"
    }

    pub fn is_finale_underway(&self) -> bool {
        self.year.trim() == "Finale Underway"
    }

    /// In-game month, e.g. "Jul" from "Classic Year Early Jul".
    pub fn month(&self) -> Option<&str> {
        let last = self.year.split_whitespace().last()?;
        MONTHS.iter().find(|m| **m == last).copied()
    }

    pub fn racing_available(&self) -> bool {
        !self.month().is_some_and(|m| OFF_SEASON.contains(&m))
    }
}

/// Outcome of one policy evaluation. Consumed immediately by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Train(StatKey),
    /// Optional race from the race list.
    Race { prioritize_top_tier: bool },
    /// Mandatory race on a race-day / goal turn.
    RaceDay,
    /// Scenario finale race.
    FinaleRace,
    Rest,
    /// Recreation to raise mood.
    Socialize,
    /// Race instead of a low-value training.
    PrioritizeRace,
    /// Re-read the training screen before deciding.
    RetryPerception,
    /// No decision; the dispatcher rests.
    None,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Train(stat) => write!(f, "train {}", stat),
            Decision::Race { prioritize_top_tier: true } => f.write_str("race (G1)"),
            Decision::Race { .. } => f.write_str("race"),
            Decision::RaceDay => f.write_str("race day"),
            Decision::FinaleRace => f.write_str("finale race"),
            Decision::Rest => f.write_str("rest"),
            Decision::Socialize => f.write_str("recreation"),
            Decision::PrioritizeRace => f.write_str("prioritize race"),
            Decision::RetryPerception => f.write_str("retry perception"),
            Decision::None => f.write_str("none"),
        }
    }
}

/// Career ruleset variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Scenario {
    #[default]
    Ura,
    Aoharu,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Scenario::Ura => "ura",
            Scenario::Aoharu => "aoharu",
        }
    }
}

impl TryFrom<u8> for Scenario {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Scenario::Ura),
            2 => Ok(Scenario::Aoharu),
            other => Err(format!("unknown scenario {}", other)),
        }
    }
}

impl From<Scenario> for u8 {
    fn from(s: Scenario) -> u8 {
        match s {
            Scenario::Ura => 1,
            Scenario::Aoharu => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year(label: &str) -> GameSnapshot {
        GameSnapshot { year: label.into(), ..Default::default() }
    }

    #[test]
    fn month_comes_from_last_word() {
        assert_eq!(year("Classic Year Early Jul").month(), Some("Jul"));
        assert_eq!(year("Junior Year Pre-Debut").month(), None);
        assert!(!year("Senior Year Late Aug").racing_available());
        assert!(year("Senior Year Late Sep").racing_available());
        assert!(year("").racing_available());
    }

    #[test]
    fn unknown_mood_ranks_above_great() {
        assert!(Mood::Unknown.rank() > Mood::Great.rank());
        assert!(Mood::Awful < Mood::Bad);
    }

    #[test]
    fn stat_keys_use_short_names() {
        let key: StatKey = serde_json::from_str("\"guts\"").unwrap();
        assert_eq!(key, StatKey::Guts);
        let mood: Mood = serde_json::from_str("\"GREAT\"").unwrap();
        assert_eq!(mood, Mood::Great);
        assert!(serde_json::from_str::<Scenario>("3").is_err());
    }

    #[test]
    fn unrecognized_failure_is_never_safe() {
        let opt = TrainingOption::new(BTreeMap::new(), None);
        assert!(!opt.is_safe(100));
        assert!(TrainingOption::new(BTreeMap::new(), Some(0)).is_safe(1));
    }
}
