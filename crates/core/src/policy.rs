//! Turn decision rules. Pure: snapshot + config in, one `Decision` out.
//!
//! Rules are evaluated top to bottom and the first that applies wins:
//! finale race, race day, mood fix, optional top-tier race, then training
//! selection with its seasonal and stamina guards.

use std::collections::BTreeMap;

use crate::config::{self, Config};
use crate::game::*;
use crate::logger;

/// Failure ceilings for the rainbow tiers, paired with the matching-support
/// count each one requires.
const RAINBOW_TIERS: [(u32, u32); 3] = [(5, 1), (25, 2), (45, 3)];

/// Failure above which a single-support or wit pick is not worth it.
const LOW_RISK_FAILURE: u32 = 5;

/// Support a lone wit option needs to be picked when nothing else is safe.
const WIT_SOLE_MIN_SUPPORT: u32 = 3;

/// Per-tick flags owned by the loop controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    /// The first lobby turn has been evaluated.
    pub first_turn_done: bool,
    /// The year-start energy event has been answered.
    pub new_year_event_done: bool,
}

/// Result of the rainbow selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rainbow {
    Train(StatKey),
    /// A candidate exists but is not worth the risk.
    Rest,
    /// No stat qualifies under any tier.
    NoCandidate,
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub priority: Vec<StatKey>,
    pub minimum_mood: Mood,
    pub maximum_failure: u32,
    pub stat_caps: BTreeMap<StatKey, u32>,
    pub min_support: u32,
    pub prioritize_g1_race: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PolicyConfig {
    fn from(config: &Config) -> Self {
        Self {
            priority: config.priority_stat.clone(),
            minimum_mood: config.minimum_mood,
            maximum_failure: config.maximum_failure,
            stat_caps: config.stat_caps.clone(),
            min_support: config.min_support,
            prioritize_g1_race: config.prioritize_g1_race,
        }
    }
}

impl PolicyConfig {
    pub fn stat_cap(&self, stat: StatKey) -> u32 {
        config::stat_cap(&self.stat_caps, stat)
    }
}

pub struct Policy {
    config: PolicyConfig,
}

impl Policy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Position in the configured priority list; unlisted stats go last.
    fn priority(&self, stat: StatKey) -> usize {
        self.config.priority.iter().position(|s| *s == stat).unwrap_or(999)
    }

    /// Full decision for one tick.
    pub fn decide(&self, snapshot: &GameSnapshot, session: &Session, retried: bool) -> Decision {
        self.lobby_decision(snapshot, session)
            .unwrap_or_else(|| self.training_decision(snapshot, retried))
    }

    /// Rules that need no training preview: races, mood, top-tier race.
    pub fn lobby_decision(&self, snapshot: &GameSnapshot, session: &Session) -> Option<Decision> {
        let turn = snapshot.turn;
        if (snapshot.is_finale_season() && turn == Turn::RaceDay)
            || (snapshot.is_finale_underway() && turn == Turn::Goal)
        {
            return Some(Decision::FinaleRace);
        }
        if turn.is_race() {
            return Some(Decision::RaceDay);
        }

        let exempt = snapshot.is_pre_debut() && !session.first_turn_done;
        if snapshot.mood.rank() < self.config.minimum_mood.rank() && !exempt {
            logger::info_p(
                "policy",
                &format!("mood {} below {}, recreation", snapshot.mood, self.config.minimum_mood),
            );
            return Some(Decision::Socialize);
        }

        if self.config.prioritize_g1_race && !snapshot.is_junior() && snapshot.racing_available() {
            return Some(Decision::Race { prioritize_top_tier: true });
        }
        None
    }

    /// Training selection on the scanned options, with guards applied.
    pub fn training_decision(&self, snapshot: &GameSnapshot, retried: bool) -> Decision {
        if snapshot.training_options.is_empty() {
            return if retried {
                logger::info_p("policy", "still no training results after retry");
                Decision::None
            } else {
                Decision::RetryPerception
            };
        }

        let filtered = self.filter_by_caps(&snapshot.training_options, &snapshot.current_stats);
        let decision = if snapshot.is_junior() {
            self.most_support_card(&filtered).map_or(Decision::Rest, Decision::Train)
        } else {
            match self.rainbow_training(&filtered) {
                Rainbow::Train(stat) => Decision::Train(stat),
                Rainbow::Rest => Decision::Rest,
                Rainbow::NoCandidate => {
                    if !self.has_sufficient_support(&filtered) {
                        logger::info_p(
                            "policy",
                            &format!("no training has {} supports, prioritizing race", self.config.min_support),
                        );
                        Decision::PrioritizeRace
                    } else {
                        self.most_support_card(&filtered).map_or(Decision::Rest, Decision::Train)
                    }
                }
            }
        };
        self.guard(decision, snapshot)
    }

    /// Downgrade a race-instead-of-training decision when racing is off.
    fn guard(&self, decision: Decision, snapshot: &GameSnapshot) -> Decision {
        if decision != Decision::PrioritizeRace {
            return decision;
        }
        if !snapshot.racing_available() {
            logger::info_p("policy", "no races during the summer break, resting");
            return Decision::Rest;
        }
        if self.stamina_unsafe(&snapshot.training_options) {
            logger::info_p(
                "policy",
                &format!("stamina failure at or above {}%, resting", self.config.maximum_failure),
            );
            return Decision::Rest;
        }
        decision
    }

    /// Training pick once a prioritized race turned out unavailable: rainbow,
    /// then most support, never another race.
    pub fn fallback_training(&self, snapshot: &GameSnapshot) -> Option<StatKey> {
        let filtered = self.filter_by_caps(&snapshot.training_options, &snapshot.current_stats);
        if filtered.is_empty() {
            return None;
        }
        if snapshot.is_junior() {
            return self.most_support_card(&filtered);
        }
        match self.rainbow_training(&filtered) {
            Rainbow::Train(stat) => Some(stat),
            Rainbow::Rest => None,
            Rainbow::NoCandidate => self.most_support_card(&filtered),
        }
    }

    /// Options whose current stat is still below its cap.
    pub fn filter_by_caps(
        &self,
        options: &TrainingOptions,
        current_stats: &BTreeMap<StatKey, u32>,
    ) -> TrainingOptions {
        options
            .iter()
            .filter(|(stat, _)| {
                current_stats.get(*stat).copied().unwrap_or(0) < self.config.stat_cap(**stat)
            })
            .map(|(stat, option)| (*stat, option.clone()))
            .collect()
    }

    /// Any safe option with enough support; wit needs at least two.
    pub fn has_sufficient_support(&self, options: &TrainingOptions) -> bool {
        options.iter().any(|(stat, o)| {
            o.is_safe(self.config.maximum_failure)
                && o.total_support >= self.config.min_support
                && (*stat != StatKey::Wit || o.total_support >= 2)
        })
    }

    /// Stamina failure is known and at or above the maximum.
    pub fn stamina_unsafe(&self, options: &TrainingOptions) -> bool {
        options
            .get(&StatKey::Stamina)
            .and_then(|o| o.failure)
            .is_some_and(|f| f >= self.config.maximum_failure)
    }

    /// Safe option with the most support cards. Wit only wins when it is the
    /// sole safe option and carries at least three supports.
    pub fn most_support_card(&self, options: &TrainingOptions) -> Option<StatKey> {
        let max = self.config.maximum_failure;
        let safe: Vec<(StatKey, &TrainingOption)> = options
            .iter()
            .filter(|(stat, o)| **stat != StatKey::Wit && o.is_safe(max))
            .map(|(stat, o)| (*stat, o))
            .collect();

        if safe.is_empty() {
            let wit_ok = options
                .get(&StatKey::Wit)
                .is_some_and(|o| o.is_safe(max) && o.total_support >= WIT_SOLE_MIN_SUPPORT);
            if wit_ok {
                logger::info_p("policy", "only wit is safe and it has enough support");
                return Some(StatKey::Wit);
            }
            logger::info_p("policy", "no safe training, failure chances too high");
            return None;
        }

        let (stat, best) = safe
            .into_iter()
            .min_by_key(|(stat, o)| (std::cmp::Reverse(o.total_support), self.priority(*stat)))?;

        if best.total_support <= 1 {
            if best.failure == Some(0) {
                logger::info_p("policy", &format!("{} with one support but 0% failure", stat));
                return Some(stat);
            }
            logger::info_p("policy", "low value training, resting");
            return None;
        }
        logger::info_p(
            "policy",
            &format!("most support: {} ({} cards, {:?}% fail)", stat, best.total_support, best.failure),
        );
        Some(stat)
    }

    /// Stat with the most same-type supports under a failure tier.
    pub fn rainbow_training(&self, options: &TrainingOptions) -> Rainbow {
        let qualifies = |stat: StatKey, o: &TrainingOption| {
            let matching = o.matching_support(stat);
            o.failure.is_some_and(|f| RAINBOW_TIERS.iter().any(|(ceiling, need)| f <= *ceiling && matching >= *need))
        };

        let best = options
            .iter()
            .filter(|(stat, o)| qualifies(**stat, *o))
            .min_by_key(|(stat, o)| (std::cmp::Reverse(o.matching_support(**stat)), self.priority(**stat)));
        let Some((&stat, option)) = best else {
            logger::info_p("policy", "no rainbow training under the failure tiers");
            return Rainbow::NoCandidate;
        };

        let failure = option.failure.unwrap_or(0);
        if option.total_support <= 1 && failure > LOW_RISK_FAILURE {
            logger::info_p("policy", "single rainbow support with risky failure, resting");
            return Rainbow::Rest;
        }
        let speed_risky = options
            .get(&StatKey::Speed)
            .and_then(|o| o.failure)
            .is_some_and(|f| f > LOW_RISK_FAILURE);
        if stat == StatKey::Wit && speed_risky {
            logger::info_p("policy", "rainbow is wit while speed is risky, resting");
            return Rainbow::Rest;
        }
        logger::info_p(
            "policy",
            &format!("rainbow: {} ({} matching, {}% fail)", stat, option.matching_support(stat), failure),
        );
        Rainbow::Train(stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STAT_CAP;

    fn opt(support: &[(SupportKind, u32)], failure: Option<u32>) -> TrainingOption {
        TrainingOption::new(support.iter().copied().collect(), failure)
    }

    /// Option whose support is all of one non-matching kind.
    fn plain(total: u32, failure: i32) -> TrainingOption {
        let failure = (failure >= 0).then_some(failure as u32);
        opt(&[(SupportKind::Friend, total)], failure)
    }

    fn policy(max_failure: u32) -> Policy {
        Policy::new(PolicyConfig { maximum_failure: max_failure, ..PolicyConfig::default() })
    }

    fn snapshot(year: &str, options: TrainingOptions) -> GameSnapshot {
        GameSnapshot {
            year: year.into(),
            turn: Turn::Remaining(10),
            mood: Mood::Great,
            training_options: options,
            ..Default::default()
        }
    }

    fn session() -> Session {
        Session { first_turn_done: true, new_year_event_done: false }
    }

    #[test]
    fn most_support_picks_highest_safe_support() {
        let options = TrainingOptions::from([
            (StatKey::Speed, plain(3, 2)),
            (StatKey::Stamina, plain(0, 10)),
            (StatKey::Power, plain(1, 0)),
            (StatKey::Guts, plain(0, 30)),
            (StatKey::Wit, plain(1, 5)),
        ]);
        let p = policy(50);
        assert_eq!(p.most_support_card(&options), Some(StatKey::Speed));
        // same input, same answer
        assert_eq!(p.most_support_card(&options), p.most_support_card(&options));
    }

    #[test]
    fn rainbow_prefers_more_matching_support() {
        let options = TrainingOptions::from([
            (StatKey::Speed, opt(&[(SupportKind::Speed, 2)], Some(20))),
            (StatKey::Wit, opt(&[(SupportKind::Wit, 1)], Some(3))),
        ]);
        assert_eq!(policy(50).rainbow_training(&options), Rainbow::Train(StatKey::Speed));
    }

    #[test]
    fn lone_wit_wins_when_everything_else_is_unsafe() {
        let options = TrainingOptions::from([
            (StatKey::Speed, plain(2, 60)),
            (StatKey::Stamina, plain(1, 55)),
            (StatKey::Power, plain(4, 50)),
            (StatKey::Guts, plain(0, 70)),
            (StatKey::Wit, plain(3, 10)),
        ]);
        assert_eq!(policy(50).most_support_card(&options), Some(StatKey::Wit));
    }

    #[test]
    fn wit_with_two_supports_is_not_enough_alone() {
        let options = TrainingOptions::from([(StatKey::Speed, plain(2, 60)), (StatKey::Wit, plain(2, 10))]);
        assert_eq!(policy(50).most_support_card(&options), None);
    }

    #[test]
    fn empty_options_retry_once_then_give_up() {
        let p = policy(15);
        let snap = snapshot("Classic Year Early Apr", TrainingOptions::new());
        assert_eq!(p.decide(&snap, &session(), false), Decision::RetryPerception);
        assert_eq!(p.decide(&snap, &session(), true), Decision::None);
    }

    #[test]
    fn summer_downgrades_race_to_rest() {
        let options = TrainingOptions::from([(StatKey::Speed, plain(0, 3)), (StatKey::Stamina, plain(1, 2))]);
        let p = policy(15);
        assert_eq!(
            p.training_decision(&snapshot("Classic Year Early Apr", options.clone()), false),
            Decision::PrioritizeRace
        );
        assert_eq!(p.training_decision(&snapshot("Classic Year Early Jul", options), false), Decision::Rest);
    }

    #[test]
    fn unsafe_stamina_downgrades_race_to_rest() {
        let options = TrainingOptions::from([(StatKey::Speed, plain(0, 3)), (StatKey::Stamina, plain(1, 15))]);
        assert_eq!(policy(15).training_decision(&snapshot("Senior Year Late Sep", options), false), Decision::Rest);
    }

    #[test]
    fn unrecognized_failure_is_never_compared() {
        let p = policy(15);
        // -1 read as 0 would make this a rainbow candidate and a safe pick
        let options = TrainingOptions::from([(StatKey::Power, opt(&[(SupportKind::Power, 3)], None))]);
        assert_eq!(p.rainbow_training(&options), Rainbow::NoCandidate);
        assert_eq!(p.most_support_card(&options), None);
        assert!(!p.has_sufficient_support(&options));
        // unknown stamina failure does not block racing
        let options = TrainingOptions::from([(StatKey::Stamina, plain(0, -1))]);
        assert!(!p.stamina_unsafe(&options));
    }

    #[test]
    fn single_support_needs_zero_failure() {
        let p = policy(50);
        let options = TrainingOptions::from([(StatKey::Guts, plain(1, 0)), (StatKey::Power, plain(0, 4))]);
        assert_eq!(p.most_support_card(&options), Some(StatKey::Guts));
        let options = TrainingOptions::from([(StatKey::Power, plain(1, 4))]);
        assert_eq!(p.most_support_card(&options), None);
    }

    #[test]
    fn ties_go_to_priority() {
        let p = Policy::new(PolicyConfig {
            priority: vec![StatKey::Power, StatKey::Speed],
            maximum_failure: 50,
            ..PolicyConfig::default()
        });
        let options = TrainingOptions::from([(StatKey::Speed, plain(2, 0)), (StatKey::Power, plain(2, 0))]);
        assert_eq!(p.most_support_card(&options), Some(StatKey::Power));
        let options = TrainingOptions::from([
            (StatKey::Speed, opt(&[(SupportKind::Speed, 2)], Some(0))),
            (StatKey::Guts, opt(&[(SupportKind::Guts, 2)], Some(0))),
        ]);
        // guts is unlisted and ranks after speed
        assert_eq!(p.rainbow_training(&options), Rainbow::Train(StatKey::Speed));
    }

    #[test]
    fn rainbow_rests_on_risky_single_or_wit() {
        let p = policy(50);
        let options = TrainingOptions::from([(StatKey::Power, opt(&[(SupportKind::Power, 1)], Some(5)))]);
        assert_eq!(p.rainbow_training(&options), Rainbow::Train(StatKey::Power));
        let options = TrainingOptions::from([
            (StatKey::Wit, opt(&[(SupportKind::Wit, 2)], Some(10))),
            (StatKey::Speed, plain(0, 8)),
        ]);
        assert_eq!(p.rainbow_training(&options), Rainbow::Rest);
    }

    #[test]
    fn high_tier_tolerates_failure_with_three_matching() {
        let p = policy(50);
        let options = TrainingOptions::from([(StatKey::Stamina, opt(&[(SupportKind::Stamina, 3)], Some(45)))]);
        assert_eq!(p.rainbow_training(&options), Rainbow::Train(StatKey::Stamina));
        let options = TrainingOptions::from([(StatKey::Stamina, opt(&[(SupportKind::Stamina, 2)], Some(26)))]);
        assert_eq!(p.rainbow_training(&options), Rainbow::NoCandidate);
    }

    #[test]
    fn capped_stats_are_skipped() {
        let p = Policy::new(PolicyConfig {
            stat_caps: BTreeMap::from([(StatKey::Speed, 600)]),
            maximum_failure: 50,
            ..PolicyConfig::default()
        });
        let mut snap = snapshot(
            "Junior Year Late Jun",
            TrainingOptions::from([(StatKey::Speed, plain(4, 0)), (StatKey::Power, plain(2, 0))]),
        );
        snap.current_stats = BTreeMap::from([(StatKey::Speed, 600), (StatKey::Power, 1199)]);
        assert_eq!(p.training_decision(&snap, false), Decision::Train(StatKey::Power));

        snap.current_stats.insert(StatKey::Power, DEFAULT_STAT_CAP);
        let left = p.filter_by_caps(&snap.training_options, &snap.current_stats);
        assert!(left.is_empty());
    }

    #[test]
    fn race_rules_come_first() {
        let p = policy(15);
        let mut snap = snapshot("Finale Season", TrainingOptions::new());
        snap.turn = Turn::RaceDay;
        snap.mood = Mood::Awful;
        assert_eq!(p.decide(&snap, &session(), false), Decision::FinaleRace);
        snap.year = "Finale Underway".into();
        assert_eq!(p.decide(&snap, &session(), false), Decision::RaceDay);
        snap.turn = Turn::Goal;
        assert_eq!(p.decide(&snap, &session(), false), Decision::FinaleRace);
        snap.year = "Classic Year Late Mar".into();
        assert_eq!(p.decide(&snap, &session(), false), Decision::RaceDay);
    }

    #[test]
    fn low_mood_socializes_except_on_debut_first_turn() {
        let p = policy(15);
        let mut snap = snapshot("Junior Year Pre-Debut", TrainingOptions::new());
        snap.mood = Mood::Bad;
        assert_eq!(p.lobby_decision(&snap, &Session::default()), None);
        assert_eq!(p.lobby_decision(&snap, &session()), Some(Decision::Socialize));
        snap.mood = Mood::Unknown;
        assert_eq!(p.lobby_decision(&snap, &session()), None);
    }

    #[test]
    fn top_tier_race_only_outside_junior_and_summer() {
        let p = Policy::new(PolicyConfig { prioritize_g1_race: true, ..PolicyConfig::default() });
        let race = Some(Decision::Race { prioritize_top_tier: true });
        assert_eq!(p.lobby_decision(&snapshot("Classic Year Late Oct", TrainingOptions::new()), &session()), race);
        assert_eq!(p.lobby_decision(&snapshot("Junior Year Late Oct", TrainingOptions::new()), &session()), None);
        assert_eq!(p.lobby_decision(&snapshot("Senior Year Early Aug", TrainingOptions::new()), &session()), None);
    }

    #[test]
    fn fallback_never_races() {
        let p = policy(15);
        let options = TrainingOptions::from([(StatKey::Speed, plain(0, 3)), (StatKey::Stamina, plain(1, 2))]);
        assert_eq!(p.fallback_training(&snapshot("Classic Year Early Apr", options)), None);
        let options = TrainingOptions::from([(StatKey::Speed, plain(2, 3)), (StatKey::Stamina, plain(1, 2))]);
        assert_eq!(p.fallback_training(&snapshot("Classic Year Early Apr", options)), Some(StatKey::Speed));
    }
}
