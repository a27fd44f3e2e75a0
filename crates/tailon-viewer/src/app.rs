use chrono::{DateTime, Utc};
use tailon_core::{
    decode_inbound, entries_for, malformed_notice, AppendOutcome, CommandChange, CommandLink,
    CommandState, ConnectionState, DispatchOutcome, Dispatcher, LineBuffer, Mode,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::transport::SessionEvent;

/// Terminal rows are measured in these units so the follow threshold keeps
/// its pixel-like meaning (a row is roughly a 16px line).
pub const ROW_UNITS: u64 = 16;

/// Top-level context. Owns the buffer, the command state and the dispatcher;
/// the transport is passed in as a `CommandLink` so every buffer mutation
/// happens on the caller's loop.
pub struct App {
    pub buffer: LineBuffer,
    pub command: CommandState,
    pub dispatcher: Dispatcher,
    pub sources: Vec<String>,
    pub connection: ConnectionState,
    pub retries_remaining: Option<u32>,
    pub exhausted: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub status_note: Option<String>,
    pub dropped_frames: u64,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let buffer = LineBuffer::new(config.history)
            .with_row_height(ROW_UNITS)
            .with_threshold(config.follow_threshold);
        Self {
            buffer,
            command: CommandState::default(),
            dispatcher: Dispatcher::new(config.resend_on_reconnect),
            sources: config.sources.clone(),
            connection: ConnectionState::Connecting,
            retries_remaining: None,
            exhausted: false,
            disconnected_at: None,
            status_note: None,
            dropped_frames: 0,
        }
    }

    /// Applies a batch of command changes; a real change is dispatched once.
    pub fn change_command<L, I>(&mut self, changes: I, link: &mut L) -> Option<DispatchOutcome>
    where
        L: CommandLink + ?Sized,
        I: IntoIterator<Item = CommandChange>,
    {
        if !self.command.apply(changes) {
            return None;
        }
        let outcome = self
            .dispatcher
            .command_changed(&self.command, link, &mut self.buffer);
        self.note_dispatch(&outcome);
        Some(outcome)
    }

    pub fn submit_script<L>(&mut self, input: &str, link: &mut L) -> Option<DispatchOutcome>
    where
        L: CommandLink + ?Sized,
    {
        if !self.command.submit_script(input) {
            return None;
        }
        let outcome = self
            .dispatcher
            .command_changed(&self.command, link, &mut self.buffer);
        self.note_dispatch(&outcome);
        Some(outcome)
    }

    pub fn next_source<L>(&mut self, link: &mut L) -> Option<DispatchOutcome>
    where
        L: CommandLink + ?Sized,
    {
        if self.sources.is_empty() {
            return None;
        }
        let idx = self
            .command
            .source()
            .and_then(|current| self.sources.iter().position(|source| source == current))
            .map(|idx| (idx + 1) % self.sources.len())
            .unwrap_or(0);
        let next = self.sources[idx].clone();
        self.change_command([CommandChange::Source(Some(next))], link)
    }

    pub fn next_mode<L>(&mut self, link: &mut L) -> Option<DispatchOutcome>
    where
        L: CommandLink + ?Sized,
    {
        let mode: Mode = self.command.mode().next();
        self.change_command([CommandChange::Mode(mode)], link)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Folds one session event into the view. Returns the append outcome when
    /// entries were added.
    pub fn apply_session_event<L>(&mut self, event: SessionEvent, link: &mut L) -> Option<AppendOutcome>
    where
        L: CommandLink + ?Sized,
    {
        match event {
            SessionEvent::Connecting { attempt } => {
                self.connection = ConnectionState::Connecting;
                if attempt > 1 {
                    self.status_note = Some(format!("reconnecting (attempt {attempt})"));
                }
                None
            }
            SessionEvent::Opened { epoch } => {
                self.connection = ConnectionState::Open;
                self.disconnected_at = None;
                self.status_note = Some("connected".to_string());
                let outcome =
                    self.dispatcher
                        .connection_opened(epoch, &self.command, link, &mut self.buffer);
                self.note_dispatch(&outcome);
                None
            }
            SessionEvent::Closed { retries_remaining } => {
                self.connection = ConnectionState::Closed;
                self.retries_remaining = Some(retries_remaining);
                if self.disconnected_at.is_none() {
                    self.disconnected_at = Some(Utc::now());
                }
                self.status_note = Some(format!("disconnected; {retries_remaining} retries left"));
                None
            }
            SessionEvent::Exhausted => {
                self.connection = ConnectionState::Closed;
                self.exhausted = true;
                self.status_note = Some("offline; reconnect attempts exhausted".to_string());
                None
            }
            SessionEvent::Message(raw) => {
                let entries = match decode_inbound(&raw) {
                    Ok(inbound) => entries_for(inbound),
                    Err(err) => {
                        warn!("ws_decode_error: {err}");
                        self.dropped_frames += 1;
                        vec![malformed_notice(&err)]
                    }
                };
                if entries.is_empty() {
                    return None;
                }
                Some(self.buffer.append(entries))
            }
        }
    }

    fn note_dispatch(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent(request) => {
                info!(
                    "command_sent: mode={} source={} last={}",
                    request.mode, request.source, request.last
                );
                self.status_note = None;
            }
            DispatchOutcome::Deferred => {
                debug!("command_deferred: transport not open");
            }
            DispatchOutcome::AwaitingScript => {
                self.status_note = Some(format!(
                    "mode \"{}\" needs a script (Enter uses the default)",
                    self.command.mode()
                ));
            }
            DispatchOutcome::Cleared => {
                self.status_note = Some("no source selected".to_string());
            }
            DispatchOutcome::Idle => {}
        }
    }
}
