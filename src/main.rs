use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    event::{EnableMouseCapture, DisableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use umapilot_core::config::Config;
use umapilot_core::controller::{self, Agent, RunOptions};
use umapilot_core::logger;
use umapilot_core::ocr::OcrsEngine;
use umapilot_core::platform::create_device;
use umapilot_core::types::{AgentStatus, Command, RunState};

#[derive(Parser)]
#[command(name = "umapilot")]
#[command(about = "Career training agent driven by screen recognition")]
struct Cli {
    /// Path to config.json
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Replay a screenshot instead of a real device (blank screen without a path)
    #[arg(long, value_name = "SCREENSHOT", num_args = 0..=1)]
    stub: Option<Option<PathBuf>>,

    /// Run without the monitor; notices are logged and auto-acknowledged
    #[arg(long)]
    headless: bool,

    /// Stop after N ticks
    #[arg(long, value_name = "N")]
    ticks: Option<u64>,

    /// Directory with text-detection.rten and text-recognition.rten
    /// (overrides ocr_models_dir from the config)
    #[arg(long, value_name = "DIR")]
    models: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let logs_dir = std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("logs");
    logger::init(&logs_dir)?;

    let config = Config::load(&cli.config)?;
    logger::info(&format!(
        "loaded {} ({} mode, scenario {}, {} event rule(s))",
        cli.config.display(),
        if config.use_phone { "phone" } else { "desktop" },
        config.scenario.name(),
        config.events.len()
    ));

    let stub_path = cli.stub.as_ref().and_then(|p| p.as_deref());
    let device = create_device(&config, stub_path, cli.stub.is_some())?;
    let tick_interval = Duration::from_millis(config.tick_interval_ms);
    let models_dir = cli.models.clone().unwrap_or_else(|| config.ocr_models_dir.clone());
    let engine = OcrsEngine::new(&models_dir).context("starting text recognition")?;
    let agent = Agent::new(config, device, Box::new(engine)).context("starting agent")?;

    let status = Arc::new(Mutex::new(AgentStatus::default()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
    let options = RunOptions { headless: cli.headless, max_ticks: cli.ticks, tick_interval };

    if cli.headless {
        logger::set_echo(true);
        let run_state = Arc::new(Mutex::new(RunState::Running));
        logger::info("umapilot started (headless)");
        controller::run(agent, status, run_state, cmd_rx, options);
        drop(cmd_tx);
        return Ok(());
    }

    let run_state = Arc::new(Mutex::new(RunState::Stopped));
    let (log_tx, log_rx) = mpsc::channel::<String>();
    logger::set_tui_sender(log_tx);
    logger::info("umapilot started, press S to start");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = umapilot_tui::App::new(Arc::clone(&status), Arc::clone(&run_state), log_rx, cmd_tx);

    // Spawn the agent loop on a background thread
    let loop_status = Arc::clone(&status);
    let loop_state = Arc::clone(&run_state);
    let handle = thread::spawn(move || {
        controller::run(agent, loop_status, loop_state, cmd_rx, options);
    });

    // Run TUI event loop on main thread
    let result = umapilot_tui::event::run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // Quit was sent by the TUI; an error exit drops the sender instead
    drop(app);
    handle.join().ok();
    result
}
