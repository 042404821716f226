use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};

use anyhow::{Context, Result};
use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: File,
    tui_tx: Option<mpsc::Sender<String>>,
    echo: bool,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for TUI rendering (mapped in ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;
pub const COLOR_MAGENTA: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Initialize the global logger. Truncates `<log_dir>/agent.log`.
pub fn init(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    let log_path = log_dir.join("agent.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    LOGGER
        .set(Mutex::new(Logger {
            file,
            tui_tx: None,
            echo: false,
            prefixes: HashMap::new(),
        }))
        .ok();
    register_defaults();
    Ok(())
}

/// Wire the TUI log channel.
pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    if let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) {
        l.tui_tx = Some(tx);
    }
}

/// Mirror every line to stderr (headless runs).
pub fn set_echo(echo: bool) {
    if let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) {
        l.echo = echo;
    }
}

/// Register a prefix with a color used by the TUI.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) {
        l.prefixes.insert(prefix.to_string(), color);
    }
}

fn register_defaults() {
    register_prefix("match", COLOR_GRAY);
    register_prefix("ocr", COLOR_GRAY);
    register_prefix("state", COLOR_BLUE);
    register_prefix("policy", COLOR_GREEN);
    register_prefix("agent", COLOR_MAGENTA);
}

/// Internal: format for TUI channel uses \x1f as field separator:
/// level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage
fn write_log(level: Level, prefix: &str, msg: &str) {
    // Not initialized (unit tests): drop silently.
    let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) else { return };

    let ts = Local::now().format("%H:%M:%S").to_string();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);

    let file_line = if prefix.is_empty() {
        format!("[{}] [{}] {}", ts, level.tag(), msg)
    } else {
        format!("[{}] [{}] [{}] {}", ts, level.tag(), prefix, msg)
    };

    writeln!(l.file, "{}", file_line).ok();
    if l.echo {
        eprintln!("{}", file_line);
    }
    if level == Level::Debug {
        return;
    }
    let tui_line = format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", level.tag(), prefix, color, ts, msg);
    let closed = l.tui_tx.as_ref().is_some_and(|tx| tx.send(tui_line).is_err());
    if closed {
        l.tui_tx = None;
    }
}

pub fn info(msg: &str) {
    write_log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    write_log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    write_log(Level::Error, "", msg);
}

/// Log under a registered prefix. Debug lines go to the file only.
pub fn debug_p(prefix: &str, msg: &str) {
    write_log(Level::Debug, prefix, msg);
}

pub fn info_p(prefix: &str, msg: &str) {
    write_log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log(Level::Warn, prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log(Level::Error, prefix, msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_land_in_the_log_file_with_their_prefix() {
        let dir = std::env::temp_dir().join(format!("umapilot-logs-{}", std::process::id()));
        init(&dir).unwrap();
        warn_p("agent", "goal at risk");
        info("plain line");

        let text = fs::read_to_string(dir.join("agent.log")).unwrap();
        assert!(text.lines().any(|l| l.ends_with("[WARN] [agent] goal at risk")));
        assert!(text.lines().any(|l| l.ends_with("[INFO] plain line")));
        fs::remove_dir_all(&dir).ok();
    }
}
