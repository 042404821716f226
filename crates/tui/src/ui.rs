use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Modifier},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use umapilot_core::game::{GameSnapshot, StatKey};
use umapilot_core::types::RunState;
use crate::App;

fn label(text: &str) -> Span<'static> {
    Span::styled(format!(" {:<10}", text), Style::default().fg(Color::DarkGray))
}

fn snapshot_lines(snapshot: &GameSnapshot) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(vec![label("year"), Span::raw(snapshot.year.clone())]),
        Line::from(vec![label("turn"), Span::raw(snapshot.turn.to_string())]),
        Line::from(vec![label("mood"), Span::raw(snapshot.mood.to_string())]),
        Line::from(vec![label("goal"), Span::raw(snapshot.criteria.clone())]),
        Line::from(vec![label("skill pts"), Span::raw(snapshot.skill_points.to_string())]),
        Line::from(""),
    ];

    let mut header = vec![Span::styled(format!(" {:<10}", ""), Style::default())];
    for stat in StatKey::ALL {
        header.push(Span::styled(format!("{:>6}", stat.key()), Style::default().fg(Color::Yellow)));
    }
    lines.push(Line::from(header));

    let mut stats = vec![label("stats")];
    for stat in StatKey::ALL {
        let value = snapshot.current_stats.get(&stat).copied().unwrap_or(0);
        stats.push(Span::raw(format!("{:>6}", value)));
    }
    lines.push(Line::from(stats));

    if snapshot.training_options.is_empty() {
        return lines;
    }
    let mut support = vec![label("support")];
    let mut failure = vec![label("fail %")];
    for stat in StatKey::ALL {
        match snapshot.training_options.get(&stat) {
            Some(opt) => {
                let rainbow = opt.matching_support(stat);
                let color = if rainbow > 0 { Color::Green } else { Color::White };
                support.push(Span::styled(format!("{:>4}/{}", opt.total_support, rainbow), Style::default().fg(color)));
                let fail = opt.failure.map_or_else(|| "?".to_string(), |f| f.to_string());
                failure.push(Span::raw(format!("{:>6}", fail)));
            }
            None => {
                support.push(Span::raw(format!("{:>6}", "-")));
                failure.push(Span::raw(format!("{:>6}", "-")));
            }
        }
    }
    lines.push(Line::from(support));
    lines.push(Line::from(failure));
    lines
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    // -- Left panel: agent status --

    let (banner_label, banner_bg) = {
        let run = app.run_state.lock().unwrap();
        match *run {
            RunState::Running => ("RUNNING (Press S to stop)", Color::Green),
            RunState::Stopping => ("STOPPING...", Color::Yellow),
            RunState::Stopped => ("STOPPED (Press S to start)", Color::Red),
            RunState::Paused => ("PAUSED (notice waiting)", Color::Magenta),
        }
    };

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(vec![
        Span::styled(" s", Style::default().fg(Color::Yellow)),
        Span::raw(" start/stop, "),
        Span::styled("l", Style::default().fg(Color::Yellow)),
        Span::raw(" logs, "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ]));
    lines.push(Line::from(""));

    {
        let status = app.status.lock().unwrap();
        lines.push(Line::from(vec![
            label("device"),
            Span::styled(status.device.clone(), Style::default().fg(Color::Cyan)),
        ]));
        lines.push(Line::from(vec![
            label("scenario"),
            Span::styled(status.scenario.clone(), Style::default().fg(Color::Cyan)),
        ]));
        lines.push(Line::from(vec![label("ticks"), Span::raw(status.ticks.to_string())]));
        if let Some(decision) = status.decision {
            lines.push(Line::from(vec![
                label("decision"),
                Span::styled(
                    decision.to_string(),
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ),
            ]));
        }
        if let Some(ref e) = status.error {
            lines.push(Line::from(vec![
                label("error"),
                Span::styled(e.clone(), Style::default().fg(Color::Red)),
            ]));
        }
        if let Some(ref snapshot) = status.snapshot {
            lines.push(Line::from(""));
            lines.extend(snapshot_lines(snapshot));
        }
    } // status lock dropped here

    // Split left panel into banner (1 line) + status (fills space)
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    // Full-width centered banner
    let banner_width = left_chunks[0].width as usize;
    let pad_total = banner_width.saturating_sub(banner_label.len());
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let centered_banner = format!("{}{}{}", " ".repeat(pad_left), banner_label, " ".repeat(pad_right));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered_banner,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left_chunks[0]);

    let status_panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(status_panel, left_chunks[1]);

    // -- Right panel: logs --
    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let max_scroll = total.saturating_sub(visible_height);
        let scroll = app.log_scroll.min(max_scroll);
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end]
            .iter()
            .map(|m| parse_log_line(m))
            .collect();

        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Logs ")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }

    if let Some(dialog) = &app.dialog {
        dialog.render(f);
    }
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line for TUI rendering.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    if parts.len() < 5 {
        // Fallback for unstructured messages
        return Line::from(raw);
    }

    let level = parts[0];
    let prefix = parts[1];
    let color_idx: u8 = parts[2].parse().unwrap_or(0);
    let timestamp = parts[3];
    let message = parts[4];

    let color = match color_idx {
        1 => Color::DarkGray,     // COLOR_GRAY
        2 => Color::LightBlue,    // COLOR_BLUE
        3 => Color::LightGreen,   // COLOR_GREEN
        4 => Color::LightMagenta, // COLOR_MAGENTA
        _ => Color::White,
    };

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];

    // Level tag: only show for warn/error
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }

    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(color)));

    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use umapilot_core::game::{Mood, Turn};

    #[test]
    fn structured_log_line_gets_level_tag() {
        let line = parse_log_line("WARN\x1fagent\x1f4\x1f12:00:00\x1fgoal at risk");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "12:00:00 warn agent goal at risk");
        assert_eq!(parse_log_line("plain").spans.len(), 1);
    }

    #[test]
    fn snapshot_without_training_has_no_support_rows() {
        let snapshot = GameSnapshot {
            year: "Senior Year Early Apr".into(),
            turn: Turn::Remaining(9),
            mood: Mood::Good,
            ..Default::default()
        };
        let lines = snapshot_lines(&snapshot);
        assert_eq!(lines.len(), 8);
        let turn: String = lines[1].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(turn.ends_with("9"));
    }
}
