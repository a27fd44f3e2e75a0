use chrono::Local;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use tailon_core::{ConnectionState, LogEntry};

use crate::app::App;
use crate::config::OutputFormat;

const HEADER_HEIGHT: u16 = 4;

#[derive(Clone, Copy)]
struct ViewerTheme {
    bg: Color,
    surface: Color,
    border: Color,
    title: Color,
    text: Color,
    muted: Color,
    accent: Color,
    ok: Color,
    warn: Color,
    critical: Color,
}

fn viewer_theme() -> ViewerTheme {
    ViewerTheme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(30, 41, 59),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
    }
}

fn split(area: Rect) -> (Rect, Rect) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(HEADER_HEIGHT), Constraint::Min(0)])
        .split(area);
    (layout[0], layout[1])
}

/// Rows available to log entries inside the bordered log pane.
pub fn log_viewport_rows(area: Rect) -> u16 {
    let (_, logs) = split(area);
    logs.height.saturating_sub(2)
}

pub fn render_ui(frame: &mut Frame, app: &App) {
    let theme = viewer_theme();
    let (header, logs) = split(frame.size());
    frame.render_widget(render_header(app, theme), header);
    frame.render_widget(render_log(app, theme), logs);
}

fn connection_label(app: &App) -> (&'static str, Color) {
    let theme = viewer_theme();
    if app.exhausted {
        return ("offline", theme.critical);
    }
    match app.connection {
        ConnectionState::Open => ("open", theme.ok),
        ConnectionState::Connecting => ("connecting", theme.warn),
        ConnectionState::Closed => ("closed", theme.critical),
    }
}

fn render_header(app: &App, theme: ViewerTheme) -> Paragraph<'static> {
    let (state, state_color) = connection_label(app);
    let command = &app.command;
    let source = command.source().unwrap_or("-").to_string();
    let script = command.script().unwrap_or("-").to_string();
    let follow = if app.buffer.auto_scroll()
        && app.buffer.distance_from_bottom() < app.buffer.scroll().threshold
    {
        "on"
    } else {
        "off"
    };
    let capacity = match app.buffer.capacity() {
        0 => "unbounded".to_string(),
        limit => limit.to_string(),
    };

    let since = match app.disconnected_at {
        Some(at) => format!(
            " since {}",
            at.with_timezone(&Local).format("%H:%M:%S")
        ),
        None => String::new(),
    };

    let first = Line::from(vec![
        Span::styled("Socket: ", Style::default().fg(theme.muted)),
        Span::styled(state, Style::default().fg(state_color)),
        Span::styled(since, Style::default().fg(state_color)),
        Span::styled(
            format!(
                "  Source: {source}  Mode: {}  Script: {script}  Last: {}",
                command.mode(),
                command.tail_depth()
            ),
            Style::default().fg(theme.text),
        ),
    ]);
    let detail = match app.status_note.as_deref() {
        Some(note) => note.to_string(),
        None => format!(
            "Lines: {}/{capacity}  Follow: {follow}  Fetch: {}",
            app.buffer.len(),
            command.fetch_path().unwrap_or_else(|| "-".to_string())
        ),
    };
    let second = Line::from(Span::styled(detail, Style::default().fg(theme.muted)));

    Paragraph::new(Text::from(vec![first, second]))
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(
                    "tailon",
                    Style::default()
                        .fg(theme.title)
                        .add_modifier(Modifier::BOLD),
                )),
        )
}

fn render_log(app: &App, theme: ViewerTheme) -> Paragraph<'static> {
    let lines: Vec<Line<'static>> = app
        .buffer
        .visible()
        .map(|entry| entry_line(entry, app.buffer.is_current(entry), theme))
        .collect();
    Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(
                    "Log",
                    Style::default()
                        .fg(theme.title)
                        .add_modifier(Modifier::BOLD),
                )),
        )
}

fn entry_line(entry: &LogEntry, current: bool, theme: ViewerTheme) -> Line<'static> {
    let mut style = if entry.is_notice() {
        Style::default()
            .fg(theme.warn)
            .add_modifier(Modifier::ITALIC)
    } else {
        Style::default().fg(theme.text)
    };
    if current {
        style = style.bg(theme.accent).add_modifier(Modifier::BOLD);
    }
    Line::from(Span::styled(entry.plain_text(), style))
}

/// One entry as a line of plain output.
pub fn format_entry(entry: &LogEntry, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => entry.plain_text(),
        OutputFormat::Html => format!(
            "<span class=\"{}\">{}</span>",
            entry.kind().css_class(),
            entry.rendered()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
use ratatui::{backend::TestBackend, Terminal};
    use std::time::Duration;
    use tailon_core::{LineBuffer, Mode, NewEntry};
    use url::Url;

    use crate::app::ROW_UNITS;
    use crate::config::{Config, SessionConfig};

    fn test_config() -> Config {
        Config {
            session: SessionConfig {
                url: Url::parse("ws://127.0.0.1:9/ws").expect("url"),
                retries: 10,
                retry_delay: Duration::from_millis(1000),
            },
            sources: Vec::new(),
            mode: Mode::Tail,
            script: None,
            tail_depth: 60,
            history: 2000,
            follow_threshold: 40,
            resend_on_reconnect: true,
            plain: false,
            format: OutputFormat::Text,
            log_dir: String::new(),
            log_stderr: false,
        }
    }

    #[test]
    fn html_format_uses_entry_classes() {
        let mut buffer = LineBuffer::new(10);
        buffer.append(vec![
            NewEntry::line("<b>&x</b>\n"),
            NewEntry::notice("2026-01-01T00:00:00+00:00 - /a.log - truncated"),
        ]);
        let formatted: Vec<String> = buffer
            .iter()
            .map(|entry| format_entry(entry, OutputFormat::Html))
            .collect();
        assert_eq!(
            formatted[0],
            "<span class=\"log-entry\">&lt;b&gt;&amp;x&lt;/b&gt;</span>"
        );
        assert_eq!(
            formatted[1],
            "<span class=\"log-entry log-notice\">2026-01-01T00:00:00+00:00 - /a.log - truncated</span>"
        );
    }

    #[test]
    fn text_format_is_terminal_safe() {
        let mut buffer = LineBuffer::new(10);
        buffer.append(vec![NewEntry::line("a < b\u{7}")]);
        let entry = buffer.current().expect("entry");
        assert_eq!(format_entry(entry, OutputFormat::Text), "a < b");
    }

    fn drawn(app: &App, width: u16, height: u16) -> String {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal.draw(|frame| render_ui(frame, app)).expect("draw");
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn header_shows_when_connection_dropped() {
        let mut app = App::new(&test_config());
        let at = chrono::Utc::now();
        app.connection = ConnectionState::Closed;
        app.disconnected_at = Some(at);
        let stamp = at.with_timezone(&Local).format("%H:%M:%S").to_string();
        let rendered = drawn(&app, 100, 8);
        assert!(rendered.contains(&format!("closed since {stamp}")));

        app.connection = ConnectionState::Open;
        app.disconnected_at = None;
        assert!(!drawn(&app, 100, 8).contains("since"));
    }

    #[test]
    fn draws_visible_tail_of_buffer() {
        let mut app = App::new(&test_config());
        let area = Rect::new(0, 0, 60, 12);
        let rows = log_viewport_rows(area);
        assert_eq!(rows, 6);
        app.buffer.set_viewport(u64::from(rows) * ROW_UNITS);
        app.buffer.append(
            (0..20)
                .map(|idx| NewEntry::line(&format!("entry-{idx}")))
                .collect(),
        );

        let rendered = drawn(&app, 60, 12);
        assert!(rendered.contains("entry-19"));
        assert!(rendered.contains("entry-14"));
        assert!(!rendered.contains("entry-13"));
    }
}
