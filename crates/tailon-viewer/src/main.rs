use clap::Parser;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use std::{
    error::Error,
    io::{self, Write},
};
use tailon_viewer::{
    app::{App, ROW_UNITS},
    config::{load_config, Args, Config},
    logging::init_logging,
    render::{format_entry, log_viewport_rows, render_ui},
    transport::{SessionEvent, SessionHandle, TransportSession},
};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config(Args::parse())?;
    let _log_guard = init_logging(&config);
    info!(
        "viewer_start: url={} sources={} mode={}",
        config.session.url,
        config.sources.len(),
        config.mode
    );

    let (mut session, events) = TransportSession::spawn(config.session.clone());
    let mut app = App::new(&config);
    app.change_command(config.initial_changes(), &mut session);

    if config.plain {
        run_plain(&config, &mut app, &mut session, events).await
    } else {
        run_tui(&mut app, &mut session, events).await
    }
}

async fn run_plain(
    config: &Config,
    app: &mut App,
    session: &mut SessionHandle,
    mut events: mpsc::Receiver<SessionEvent>,
) -> Result<(), Box<dyn Error>> {
    let stdout = io::stdout();
    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    break;
                };
                let exhausted = event == SessionEvent::Exhausted;
                if let Some(outcome) = app.apply_session_event(event, session) {
                    let mut out = stdout.lock();
                    for entry in app.buffer.appended(&outcome) {
                        writeln!(out, "{}", format_entry(entry, config.format))?;
                    }
                    out.flush()?;
                }
                if exhausted {
                    eprintln!("tailon-viewer: connection lost, reconnect attempts exhausted");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }
    Ok(())
}

async fn run_tui(
    app: &mut App,
    session: &mut SessionHandle,
    mut events: mpsc::Receiver<SessionEvent>,
) -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut input = EventStream::new();

    let result = async {
        loop {
            let size = terminal.size()?;
            app.buffer
                .set_viewport(u64::from(log_viewport_rows(size)) * ROW_UNITS);
            terminal.draw(|frame| render_ui(frame, app))?;

            tokio::select! {
                Some(event) = events.recv() => {
                    app.apply_session_event(event, session);
                }
                maybe_input = input.next() => {
                    match maybe_input {
                        Some(Ok(event)) => {
                            if handle_input(event, app, session, size) {
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
            }
        }
        Ok::<(), Box<dyn Error>>(())
    }
    .await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn handle_input(event: Event, app: &mut App, session: &mut SessionHandle, size: Rect) -> bool {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, app, session, size),
        _ => false,
    }
}

fn handle_key(key: KeyEvent, app: &mut App, session: &mut SessionHandle, size: Rect) -> bool {
    let page = i64::from(log_viewport_rows(size).max(1)) * ROW_UNITS as i64;
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => true,
        KeyCode::Char('l') if ctrl => {
            app.clear();
            false
        }
        KeyCode::Char('q') => true,
        KeyCode::Down | KeyCode::Char('j') => {
            app.buffer.scroll_by(ROW_UNITS as i64);
            false
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.buffer.scroll_by(-(ROW_UNITS as i64));
            false
        }
        KeyCode::PageDown => {
            app.buffer.scroll_by(page);
            false
        }
        KeyCode::PageUp => {
            app.buffer.scroll_by(-page);
            false
        }
        KeyCode::Home | KeyCode::Char('g') => {
            app.buffer.scroll_to(0);
            false
        }
        KeyCode::End | KeyCode::Char('G') => {
            app.buffer.scroll_to_bottom();
            false
        }
        KeyCode::Char('a') => {
            let enabled = app.buffer.auto_scroll();
            app.buffer.set_auto_scroll(!enabled);
            false
        }
        KeyCode::Char('f') => {
            app.next_source(session);
            false
        }
        KeyCode::Char('m') => {
            app.next_mode(session);
            false
        }
        KeyCode::Enter => {
            app.submit_script("", session);
            false
        }
        _ => false,
    }
}
