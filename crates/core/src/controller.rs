use std::fmt;
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::actions::Dispatcher;
use crate::assets::Assets;
use crate::config::Config;
use crate::game::*;
use crate::layout::Layout;
use crate::logger;
use crate::matcher::Matcher;
use crate::ocr::{TextEngine, TextRecognizer};
use crate::platform::Device;
use crate::policy::{Policy, PolicyConfig, Session};
use crate::sleep;
use crate::state::StateAggregator;
use crate::types::*;

/// Year label of the second new-year energy event.
const NEW_YEAR_EVENT_YEAR: &str = "Classic Year Early Jan";
/// Turns left below which an unmet goal raises a notice.
const GOAL_RISK_TURNS: u32 = 7;

/// What a tick ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Event,
    Transient,
    Showdown,
    NotInLobby,
    Infirmary,
    /// Waiting on a notice before acting.
    Notice,
    TrainingUnavailable,
    Acted,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Event => "event",
            Step::Transient => "transient screen",
            Step::Showdown => "team showdown",
            Step::NotInLobby => "not in lobby",
            Step::Infirmary => "infirmary",
            Step::Notice => "notice",
            Step::TrainingUnavailable => "training unavailable",
            Step::Acted => "acted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub step: Step,
    pub snapshot: Option<GameSnapshot>,
    pub decision: Option<Decision>,
    pub notice: Option<String>,
}

impl TickReport {
    fn step(step: Step) -> Self {
        Self { step, snapshot: None, decision: None, notice: None }
    }
}

/// One career run: perception, policy and dispatch over a device.
pub struct Agent {
    device: Box<dyn Device>,
    aggregator: StateAggregator,
    dispatcher: Dispatcher,
    policy: Policy,
    config: Config,
    pub session: Session,
    /// The pending notice was acknowledged; the next tick acts through it.
    acknowledged: bool,
}

impl Agent {
    pub fn new(config: Config, device: Box<dyn Device>, engine: Box<dyn TextEngine>) -> Result<Self> {
        let assets = Arc::new(Assets::load(&config.assets_dir, config.use_phone)?);
        let layout = Layout::resolve(&config);
        Ok(Self::from_parts(config, device, engine, assets, layout))
    }

    pub fn from_parts(
        config: Config,
        device: Box<dyn Device>,
        engine: Box<dyn TextEngine>,
        assets: Arc<Assets>,
        layout: Layout,
    ) -> Self {
        let matcher = Matcher::new(config.match_scale());
        let aggregator = StateAggregator::new(
            matcher.clone(),
            TextRecognizer::new(engine),
            assets.clone(),
            layout.clone(),
            config.scenario,
            config.use_phone,
        );
        let dispatcher = Dispatcher::new(matcher, assets, layout, config.scenario, config.use_phone);
        Self {
            device,
            aggregator,
            dispatcher,
            policy: Policy::new(PolicyConfig::from(&config)),
            config,
            session: Session::default(),
            acknowledged: false,
        }
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    pub fn scenario(&self) -> Scenario {
        self.config.scenario
    }

    /// Scale every pause and search budget (0 for instant, single-shot runs).
    pub fn set_time_scale(&mut self, scale: f32) {
        self.dispatcher.time_scale = scale;
        self.aggregator.set_time_scale(scale);
    }

    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    /// Raise `message` unless the previous one was acknowledged.
    fn notice(&mut self, message: String) -> Option<String> {
        if std::mem::take(&mut self.acknowledged) {
            None
        } else {
            logger::warn_p("agent", &message);
            Some(message)
        }
    }

    pub fn tick(&mut self) -> Result<TickReport> {
        let device = self.device.as_mut();
        self.dispatcher.dismiss(device);

        let year = self.aggregator.year(device);
        let event_name = self.aggregator.event_name(device);
        if !event_name.is_empty() {
            logger::info_p("agent", &format!("event: {}", event_name));
        }
        if self.handle_event(&year, &event_name) {
            return Ok(TickReport::step(Step::Event));
        }

        let device = self.device.as_mut();
        if self.dispatcher.skip_transients(device) {
            return Ok(TickReport::step(Step::Transient));
        }
        if self.config.scenario == Scenario::Aoharu && self.dispatcher.team_showdown(device) {
            return Ok(TickReport::step(Step::Showdown));
        }
        if !self.dispatcher.in_lobby(device) {
            return Ok(TickReport::step(Step::NotInLobby));
        }
        self.dispatcher.wait(500);
        if self.dispatcher.visit_infirmary(device) {
            return Ok(TickReport::step(Step::Infirmary));
        }

        let mut snapshot = self.aggregator.snapshot(device);
        let mut report = TickReport::step(Step::Acted);

        let lobby = self.policy.lobby_decision(&snapshot, &self.session);
        if !matches!(lobby, Some(Decision::Socialize | Decision::RaceDay | Decision::FinaleRace)) {
            self.session.first_turn_done = true;
            if let Some(message) = self.goal_at_risk(&snapshot) {
                report.notice = self.notice(message);
                if report.notice.is_some() {
                    report.step = Step::Notice;
                    report.snapshot = Some(snapshot);
                    return Ok(report);
                }
            }
        }

        if let Some(decision) = lobby {
            report.decision = Some(decision);
            if decision == Decision::RaceDay {
                if let Some(message) = self.skill_points_over_cap(&snapshot) {
                    report.notice = self.notice(message);
                    if report.notice.is_some() {
                        report.step = Step::Notice;
                        report.snapshot = Some(snapshot);
                        return Ok(report);
                    }
                }
            }
            logger::info_p("policy", &format!("decision: {}", decision));
            if self.dispatch(decision, &snapshot) {
                report.snapshot = Some(snapshot);
                return Ok(report);
            }
            logger::info_p("agent", "G1 race not found, proceeding to training");
        }

        let device = self.device.as_mut();
        if !self.dispatcher.go_to_training(device) {
            logger::info_p("agent", "training button not found");
            report.step = Step::TrainingUnavailable;
            report.snapshot = Some(snapshot);
            return Ok(report);
        }
        self.dispatcher.wait(1000);
        snapshot.training_options = self.scan_training();

        let mut decision = self.policy.training_decision(&snapshot, false);
        if decision == Decision::RetryPerception {
            logger::info_p("agent", "no training results, checking training again");
            self.dispatcher.wait(1000);
            decision = if self.dispatcher.go_to_training(self.device.as_mut()) {
                snapshot.training_options = self.scan_training();
                self.policy.training_decision(&snapshot, true)
            } else {
                Decision::None
            };
        }

        logger::info_p("policy", &format!("decision: {}", decision));
        self.dispatch(decision, &snapshot);
        report.decision = Some(decision);
        report.snapshot = Some(snapshot);
        Ok(report)
    }

    /// Answer an event popup. `true` when a choice was clicked.
    fn handle_event(&mut self, year: &str, event_name: &str) -> bool {
        let device = self.device.as_mut();
        if year == NEW_YEAR_EVENT_YEAR && !self.session.new_year_event_done {
            if self.dispatcher.click_event_choice(device, 2, 1.0) {
                logger::info_p("agent", "new year event: energy choice");
                self.session.new_year_event_done = true;
                return true;
            }
            if self.dispatcher.click_event_choice(device, 1, 0.2) {
                logger::info_p("agent", "new year energy choice not found, took choice 1");
                self.session.new_year_event_done = true;
                return true;
            }
            return false;
        }

        if let Some((label, choice)) = self.config.event_choice(event_name) {
            logger::info_p("agent", &format!("'{}' event, choice {}", label, choice));
            if self.dispatcher.click_event_choice(device, choice, 0.1) {
                return true;
            }
        }
        self.dispatcher.click_event_choice(device, 1, 0.1)
    }

    fn scan_training(&mut self) -> TrainingOptions {
        let device = self.device.as_mut();
        let options = self.aggregator.training_options(device);
        self.dispatcher.back(device);
        options
    }

    fn goal_at_risk(&self, snapshot: &GameSnapshot) -> Option<String> {
        let Turn::Remaining(left) = snapshot.turn else { return None };
        let criteria = snapshot.criteria.to_lowercase();
        let at_risk = !snapshot.is_pre_debut()
            && left < GOAL_RISK_TURNS
            && !criteria.is_empty()
            && !criteria.contains("junior")
            && !criteria.contains("met");
        at_risk.then(|| {
            format!(
                "Goal may not be achieved and only {} turns left ({}). Check the goal and handle it manually.",
                left, snapshot.criteria
            )
        })
    }

    fn skill_points_over_cap(&self, snapshot: &GameSnapshot) -> Option<String> {
        if !self.config.enable_skill_point_check {
            return None;
        }
        let cap = self.config.skill_point_cap;
        logger::info_p("agent", &format!("skill points {}, cap {}", snapshot.skill_points, cap));
        (snapshot.skill_points > cap).then(|| {
            format!(
                "Skill points ({}) exceed the cap ({}). Spend them now if you like, then continue.",
                snapshot.skill_points, cap
            )
        })
    }

    /// Carry out `decision`. `false` only when an optional race was not found
    /// and training should be tried instead.
    fn dispatch(&mut self, decision: Decision, snapshot: &GameSnapshot) -> bool {
        let device = self.device.as_mut();
        let d = &self.dispatcher;
        match decision {
            Decision::Train(stat) => {
                d.go_to_training(device);
                d.wait(500);
                d.train(device, stat);
            }
            Decision::Race { prioritize_top_tier } => {
                if !d.race(device, prioritize_top_tier) {
                    d.back(device);
                    d.wait(500);
                    return false;
                }
            }
            Decision::RaceDay => d.race_day(device),
            Decision::FinaleRace => d.finale_race(device),
            Decision::Socialize => {
                d.recreation(device);
            }
            Decision::PrioritizeRace => {
                logger::info_p("agent", "prioritizing race over low-support training");
                if !d.race(device, false) {
                    logger::info_p("agent", "race not found, back to training");
                    d.back(device);
                    d.wait(500);
                    match self.policy.fallback_training(snapshot) {
                        Some(stat) => {
                            d.go_to_training(device);
                            d.wait(500);
                            d.train(device, stat);
                        }
                        None => {
                            d.rest(device);
                        }
                    }
                }
            }
            Decision::Rest | Decision::RetryPerception | Decision::None => {
                d.rest(device);
            }
        }
        true
    }
}

/// Options for `run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// No TUI: notices are logged and acknowledged automatically.
    pub headless: bool,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
    pub tick_interval: Duration,
}

/// Drain pending commands. Returns false on Quit or once the sender is gone.
fn process_commands(
    cmd_rx: &mpsc::Receiver<Command>,
    run_state: &Mutex<RunState>,
    status: &Mutex<AgentStatus>,
    agent: &mut Agent,
) -> bool {
    loop {
        let cmd = match cmd_rx.try_recv() {
            Ok(cmd) => cmd,
            Err(mpsc::TryRecvError::Empty) => return true,
            Err(mpsc::TryRecvError::Disconnected) => return false,
        };
        match cmd {
            Command::Quit => {
                logger::info("shutting down");
                *run_state.lock().unwrap() = RunState::Stopped;
                return false;
            }
            Command::StartStop => match *run_state.lock().unwrap() {
                RunState::Running => logger::info("agent started"),
                RunState::Stopping => logger::info("agent stopping..."),
                RunState::Stopped | RunState::Paused => {}
            },
            Command::Acknowledge => {
                let mut state = run_state.lock().unwrap();
                if *state == RunState::Paused {
                    *state = RunState::Running;
                    drop(state);
                    status.lock().unwrap().notice = None;
                    agent.acknowledge();
                    logger::info("notice acknowledged, resuming");
                }
            }
        }
    }
}

/// Main loop. Runs on a background thread when a TUI is attached.
pub fn run(
    mut agent: Agent,
    status: Arc<Mutex<AgentStatus>>,
    run_state: Arc<Mutex<RunState>>,
    cmd_rx: mpsc::Receiver<Command>,
    options: RunOptions,
) {
    {
        let mut s = status.lock().unwrap();
        s.device = agent.device_name().to_string();
        s.scenario = agent.scenario().name().to_string();
    }
    if agent.scenario() == Scenario::Aoharu {
        logger::info("Aoharu: customize the 'Team at Last' event in events.json for the final skill");
    }

    let mut ticks: u64 = 0;
    let mut next_tick = Instant::now();

    loop {
        if !process_commands(&cmd_rx, &run_state, &status, &mut agent) {
            return;
        }

        let current = *run_state.lock().unwrap();
        if current == RunState::Stopping {
            *run_state.lock().unwrap() = RunState::Stopped;
            logger::info("agent stopped");
            continue;
        }
        if current != RunState::Running || Instant::now() < next_tick {
            std::thread::sleep(Duration::from_millis(100));
            continue;
        }

        let result = agent.tick();
        ticks += 1;
        let mut backoff = sleep::jittered(options.tick_interval);
        let mut pause = false;
        {
            let mut s = status.lock().unwrap();
            s.ticks = ticks;
            match result {
                Ok(report) => {
                    logger::debug_p("agent", &format!("tick {}: {}", ticks, report.step));
                    s.error = None;
                    if report.snapshot.is_some() {
                        s.snapshot = report.snapshot;
                    }
                    if report.decision.is_some() {
                        s.decision = report.decision;
                    }
                    if let Some(notice) = report.notice {
                        if options.headless {
                            logger::warn(&format!("notice (auto-acknowledged): {}", notice));
                            agent.acknowledge();
                        } else {
                            s.notice = Some(notice);
                            pause = true;
                        }
                    }
                }
                Err(e) => {
                    logger::error(&format!("tick error: {:#}", e));
                    s.error = Some(e.to_string());
                    backoff = Duration::from_secs(5);
                }
            }
        }
        if pause {
            *run_state.lock().unwrap() = RunState::Paused;
        }
        next_tick = Instant::now() + backoff;

        if options.max_ticks.is_some_and(|max| ticks >= max) {
            logger::info(&format!("reached {} ticks", ticks));
            *run_state.lock().unwrap() = RunState::Stopped;
            return;
        }
    }
}
