use crate::buffer::LineBuffer;
use crate::command::{CommandRequest, CommandState};
use crate::error::TransportError;

/// The outbound half of a transport, as seen by the dispatcher.
pub trait CommandLink {
    fn is_open(&self) -> bool;
    /// Queues the request on the open connection and returns that
    /// connection's epoch. Epochs grow by one per successful open.
    fn send(&mut self, request: &CommandRequest) -> Result<u64, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No source selected; the buffer was cleared and nothing was sent.
    Cleared,
    /// Transport not open; the command is parked until it opens.
    Deferred,
    /// Scripted mode without a script yet.
    AwaitingScript,
    Sent(CommandRequest),
    /// Nothing to flush.
    Idle,
}

/// Turns command state changes into requests on the link.
///
/// While the link is down only a "pending" flag is kept; the state that is
/// current when the link opens is what gets sent, so intermediate changes
/// coalesce into a single request.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pending: bool,
    last_sent: Option<CommandRequest>,
    sent_epoch: Option<u64>,
    resend_on_reconnect: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Dispatcher {
    pub fn new(resend_on_reconnect: bool) -> Self {
        Self {
            pending: false,
            last_sent: None,
            sent_epoch: None,
            resend_on_reconnect,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn last_sent(&self) -> Option<&CommandRequest> {
        self.last_sent.as_ref()
    }

    pub fn command_changed<L>(
        &mut self,
        state: &CommandState,
        link: &mut L,
        buffer: &mut LineBuffer,
    ) -> DispatchOutcome
    where
        L: CommandLink + ?Sized,
    {
        if state.source().is_none() {
            self.pending = false;
            buffer.clear();
            return DispatchOutcome::Cleared;
        }
        if !link.is_open() {
            self.pending = true;
            return DispatchOutcome::Deferred;
        }
        self.pending = false;
        let Some(request) = state.request() else {
            return DispatchOutcome::AwaitingScript;
        };

        buffer.clear();
        match link.send(&request) {
            Ok(epoch) => {
                self.last_sent = Some(request.clone());
                self.sent_epoch = Some(epoch);
                DispatchOutcome::Sent(request)
            }
            Err(_) => {
                self.pending = true;
                DispatchOutcome::Deferred
            }
        }
    }

    /// Flushes the parked command when connection `epoch` opens. Without a
    /// parked command, the last sent one is replayed when resend is enabled
    /// and it went out on an earlier connection; a command already sent on
    /// this connection is not sent again.
    pub fn connection_opened<L>(
        &mut self,
        epoch: u64,
        state: &CommandState,
        link: &mut L,
        buffer: &mut LineBuffer,
    ) -> DispatchOutcome
    where
        L: CommandLink + ?Sized,
    {
        let sent_earlier = self.sent_epoch.is_some_and(|sent| sent < epoch);
        if self.pending || (self.resend_on_reconnect && sent_earlier) {
            return self.command_changed(state, link, buffer);
        }
        DispatchOutcome::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandChange, Mode};
    use crate::entry::NewEntry;
    use crate::reconnect::ConnectionState;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingLink {
        open: bool,
        epoch: u64,
        fail_sends: bool,
        sent: Vec<CommandRequest>,
    }

    impl CommandLink for RecordingLink {
        fn is_open(&self) -> bool {
            self.open
        }

        fn send(&mut self, request: &CommandRequest) -> Result<u64, TransportError> {
            if !self.open || self.fail_sends {
                return Err(TransportError::InvalidState {
                    state: ConnectionState::Closed,
                });
            }
            self.sent.push(request.clone());
            Ok(self.epoch)
        }
    }

    fn filled_buffer() -> LineBuffer {
        let mut buffer = LineBuffer::new(100);
        buffer.append(vec![NewEntry::line("stale-1"), NewEntry::line("stale-2")]);
        buffer
    }

    fn source(path: &str) -> CommandChange {
        CommandChange::Source(Some(path.to_string()))
    }

    #[test]
    fn open_tail_command_clears_then_sends_once() {
        let mut state = CommandState::default();
        state.apply([source("/var/log/a.log")]);
        let mut link = RecordingLink {
            open: true,
            ..Default::default()
        };
        let mut buffer = filled_buffer();
        let mut dispatcher = Dispatcher::default();

        let outcome = dispatcher.command_changed(&state, &mut link, &mut buffer);
        assert!(matches!(outcome, DispatchOutcome::Sent(_)));
        assert!(buffer.is_empty());
        assert_eq!(link.sent.len(), 1);
        assert_eq!(
            serde_json::to_value(&link.sent[0]).expect("serialize"),
            json!({"tail": "/var/log/a.log", "last": 60})
        );
    }

    #[test]
    fn unset_source_clears_without_sending() {
        let state = CommandState::default();
        let mut link = RecordingLink {
            open: true,
            ..Default::default()
        };
        let mut buffer = filled_buffer();
        let mut dispatcher = Dispatcher::default();

        assert_eq!(
            dispatcher.command_changed(&state, &mut link, &mut buffer),
            DispatchOutcome::Cleared
        );
        assert!(buffer.is_empty());
        assert!(link.sent.is_empty());
    }

    #[test]
    fn scripted_mode_waits_for_script() {
        let mut state = CommandState::default();
        state.apply([source("/var/log/a.log"), CommandChange::Mode(Mode::Grep)]);
        let mut link = RecordingLink {
            open: true,
            ..Default::default()
        };
        let mut buffer = filled_buffer();
        let mut dispatcher = Dispatcher::default();

        assert_eq!(
            dispatcher.command_changed(&state, &mut link, &mut buffer),
            DispatchOutcome::AwaitingScript
        );
        assert!(link.sent.is_empty());
        assert_eq!(buffer.len(), 2);

        state.submit_script("");
        let outcome = dispatcher.command_changed(&state, &mut link, &mut buffer);
        assert!(matches!(outcome, DispatchOutcome::Sent(_)));
        assert_eq!(link.sent[0].script.as_deref(), Some(".*"));
    }

    #[test]
    fn closed_link_defers_and_flushes_latest_only() {
        let mut state = CommandState::default();
        let mut link = RecordingLink::default();
        let mut buffer = filled_buffer();
        let mut dispatcher = Dispatcher::default();

        for (path, depth) in [("/a.log", 10), ("/b.log", 20), ("/c.log", 30)] {
            state.apply([source(path), CommandChange::TailDepth(depth)]);
            assert_eq!(
                dispatcher.command_changed(&state, &mut link, &mut buffer),
                DispatchOutcome::Deferred
            );
        }
        assert!(dispatcher.has_pending());
        assert_eq!(buffer.len(), 2);

        link.open = true;
        link.epoch = 1;
        let outcome = dispatcher.connection_opened(1, &state, &mut link, &mut buffer);
        assert!(matches!(outcome, DispatchOutcome::Sent(_)));
        assert_eq!(link.sent.len(), 1);
        assert_eq!(link.sent[0].source, "/c.log");
        assert_eq!(link.sent[0].last, 30);
        assert!(!dispatcher.has_pending());
        assert!(buffer.is_empty());
    }

    #[test]
    fn reconnect_replays_command_from_previous_connection() {
        let mut state = CommandState::default();
        state.apply([source("/var/log/a.log")]);
        let mut link = RecordingLink {
            open: true,
            epoch: 1,
            ..Default::default()
        };
        let mut buffer = LineBuffer::new(10);
        let mut dispatcher = Dispatcher::new(true);
        dispatcher.command_changed(&state, &mut link, &mut buffer);

        link.epoch = 2;
        buffer.append(vec![NewEntry::line("from-first-connection")]);
        let outcome = dispatcher.connection_opened(2, &state, &mut link, &mut buffer);
        assert!(matches!(outcome, DispatchOutcome::Sent(_)));
        assert_eq!(link.sent.len(), 2);
        assert_eq!(link.sent[0], link.sent[1]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn open_after_send_on_same_connection_is_idle() {
        let mut state = CommandState::default();
        state.apply([source("/var/log/a.log")]);
        let mut link = RecordingLink {
            open: true,
            epoch: 1,
            ..Default::default()
        };
        let mut buffer = LineBuffer::new(10);
        let mut dispatcher = Dispatcher::new(true);
        dispatcher.command_changed(&state, &mut link, &mut buffer);
        buffer.append(vec![NewEntry::line("history")]);

        assert_eq!(
            dispatcher.connection_opened(1, &state, &mut link, &mut buffer),
            DispatchOutcome::Idle
        );
        assert_eq!(link.sent.len(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn late_open_of_older_connection_does_not_resend() {
        let mut state = CommandState::default();
        state.apply([source("/var/log/a.log")]);
        let mut link = RecordingLink {
            open: true,
            epoch: 3,
            ..Default::default()
        };
        let mut buffer = LineBuffer::new(10);
        let mut dispatcher = Dispatcher::new(true);
        dispatcher.command_changed(&state, &mut link, &mut buffer);

        for epoch in [2, 3] {
            assert_eq!(
                dispatcher.connection_opened(epoch, &state, &mut link, &mut buffer),
                DispatchOutcome::Idle
            );
        }
        assert_eq!(link.sent.len(), 1);
    }

    #[test]
    fn reconnect_without_resend_is_idle() {
        let mut state = CommandState::default();
        state.apply([source("/var/log/a.log")]);
        let mut link = RecordingLink {
            open: true,
            ..Default::default()
        };
        let mut buffer = LineBuffer::new(10);
        let mut dispatcher = Dispatcher::new(false);
        dispatcher.command_changed(&state, &mut link, &mut buffer);

        link.epoch = 1;
        assert_eq!(
            dispatcher.connection_opened(1, &state, &mut link, &mut buffer),
            DispatchOutcome::Idle
        );
        assert_eq!(link.sent.len(), 1);
    }

    #[test]
    fn first_open_without_command_is_idle() {
        let state = CommandState::default();
        let mut link = RecordingLink {
            open: true,
            ..Default::default()
        };
        let mut buffer = filled_buffer();
        let mut dispatcher = Dispatcher::default();
        assert_eq!(
            dispatcher.connection_opened(1, &state, &mut link, &mut buffer),
            DispatchOutcome::Idle
        );
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn failed_send_is_parked_not_dropped() {
        let mut state = CommandState::default();
        state.apply([source("/var/log/a.log")]);
        let mut link = RecordingLink {
            open: true,
            fail_sends: true,
            ..Default::default()
        };
        let mut buffer = LineBuffer::new(10);
        let mut dispatcher = Dispatcher::default();

        assert_eq!(
            dispatcher.command_changed(&state, &mut link, &mut buffer),
            DispatchOutcome::Deferred
        );
        assert!(dispatcher.has_pending());

        link.fail_sends = false;
        let outcome = dispatcher.connection_opened(1, &state, &mut link, &mut buffer);
        assert!(matches!(outcome, DispatchOutcome::Sent(_)));
        assert_eq!(link.sent.len(), 1);
    }

    #[test]
    fn rapid_changes_while_open_send_in_order() {
        let mut state = CommandState::default();
        let mut link = RecordingLink {
            open: true,
            ..Default::default()
        };
        let mut buffer = LineBuffer::new(10);
        let mut dispatcher = Dispatcher::default();

        for path in ["/1.log", "/2.log", "/3.log"] {
            state.apply([source(path)]);
            dispatcher.command_changed(&state, &mut link, &mut buffer);
            buffer.append(vec![NewEntry::line(path)]);
        }
        let order: Vec<&str> = link.sent.iter().map(|req| req.source.as_str()).collect();
        assert_eq!(order, vec!["/1.log", "/2.log", "/3.log"]);
        assert_eq!(buffer.len(), 1);
    }
}
