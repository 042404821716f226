use std::sync::{Arc, Mutex, mpsc};
use umapilot_core::types::{AgentStatus, Command, RunState};

use crate::confirm::ConfirmDialog;

/// Log lines kept for the panel; older ones are dropped.
const LOG_CAPACITY: usize = 2000;

pub struct App {
    pub status: Arc<Mutex<AgentStatus>>,
    pub run_state: Arc<Mutex<RunState>>,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub cmd_tx: mpsc::Sender<Command>,
    /// Notice waiting for the user, shown over everything else.
    pub dialog: Option<ConfirmDialog>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        status: Arc<Mutex<AgentStatus>>,
        run_state: Arc<Mutex<RunState>>,
        log_rx: mpsc::Receiver<String>,
        cmd_tx: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            status,
            run_state,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            cmd_tx,
            dialog: None,
            should_quit: false,
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
        if self.log_messages.len() > LOG_CAPACITY {
            let excess = self.log_messages.len() - LOG_CAPACITY;
            self.log_messages.drain(..excess);
        }
    }

    /// Open the dialog when the loop has paused on a notice.
    pub fn sync_notice(&mut self) {
        if self.dialog.is_some() {
            return;
        }
        let notice = self.status.lock().unwrap().notice.clone();
        if let Some(message) = notice {
            self.dialog = Some(ConfirmDialog::new(message));
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn start_stop(&mut self) {
        {
            let mut state = self.run_state.lock().unwrap();
            *state = match *state {
                RunState::Stopped => RunState::Running,
                RunState::Running | RunState::Paused => RunState::Stopping,
                RunState::Stopping => return,
            };
        }
        self.cmd_tx.send(Command::StartStop).ok();
    }

    /// Close the notice. Continuing lets the paused turn go ahead; otherwise
    /// the agent is stopped so the user can take over.
    pub fn answer_dialog(&mut self, proceed: bool) {
        if self.dialog.take().is_none() {
            return;
        }
        self.status.lock().unwrap().notice = None;
        if proceed {
            self.cmd_tx.send(Command::Acknowledge).ok();
        } else {
            self.start_stop();
        }
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    pub fn quit(&mut self) {
        self.cmd_tx.send(Command::Quit).ok();
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> (App, mpsc::Sender<String>, mpsc::Receiver<Command>) {
        let (log_tx, log_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let app = App::new(
            Arc::new(Mutex::new(AgentStatus::default())),
            Arc::new(Mutex::new(RunState::Stopped)),
            log_rx,
            cmd_tx,
        );
        (app, log_tx, cmd_rx)
    }

    #[test]
    fn start_stop_cycles_run_state() {
        let (mut app, _, cmd_rx) = app();
        app.start_stop();
        assert_eq!(*app.run_state.lock().unwrap(), RunState::Running);
        app.start_stop();
        assert_eq!(*app.run_state.lock().unwrap(), RunState::Stopping);
        app.start_stop();
        assert_eq!(*app.run_state.lock().unwrap(), RunState::Stopping);
        assert_eq!(cmd_rx.try_iter().count(), 2);
    }

    #[test]
    fn notice_opens_dialog_and_continue_acknowledges() {
        let (mut app, _, cmd_rx) = app();
        app.status.lock().unwrap().notice = Some("skill points".into());
        *app.run_state.lock().unwrap() = RunState::Paused;
        app.sync_notice();
        assert_eq!(app.dialog.as_ref().map(|d| d.message.as_str()), Some("skill points"));

        app.answer_dialog(true);
        assert!(app.dialog.is_none());
        assert!(matches!(cmd_rx.try_recv(), Ok(Command::Acknowledge)));
    }

    #[test]
    fn continued_notice_does_not_reopen_before_the_loop_catches_up() {
        let (mut app, _, _cmd_rx) = app();
        app.status.lock().unwrap().notice = Some("goal".into());
        *app.run_state.lock().unwrap() = RunState::Paused;
        app.sync_notice();
        app.answer_dialog(true);
        app.sync_notice();
        assert!(app.dialog.is_none());
        assert!(app.status.lock().unwrap().notice.is_none());
    }

    #[test]
    fn declining_a_notice_stops_the_agent() {
        let (mut app, _, _cmd_rx) = app();
        app.status.lock().unwrap().notice = Some("goal".into());
        *app.run_state.lock().unwrap() = RunState::Paused;
        app.sync_notice();
        app.answer_dialog(false);
        assert_eq!(*app.run_state.lock().unwrap(), RunState::Stopping);
        assert!(app.status.lock().unwrap().notice.is_none());
    }

    #[test]
    fn log_buffer_is_capped() {
        let (mut app, log_tx, _) = app();
        for i in 0..LOG_CAPACITY + 5 {
            log_tx.send(format!("line {}", i)).unwrap();
        }
        app.drain_logs();
        assert_eq!(app.log_messages.len(), LOG_CAPACITY);
        assert_eq!(app.log_messages[0], "line 5");
    }
}
