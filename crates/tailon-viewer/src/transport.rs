use futures_util::{SinkExt, StreamExt};
use tailon_core::{
    encode_request, CommandLink, CommandRequest, ConnectionState, ReconnectPolicy, TransportError,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;

const OUTBOUND_QUEUE_CAPACITY: usize = 64;
const EVENT_QUEUE_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Notifications from the session task, delivered in transport order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connecting { attempt: u32 },
    /// Connection `epoch` is open; epochs start at 1 and grow per open.
    Opened { epoch: u64 },
    Closed { retries_remaining: u32 },
    Message(String),
    /// Retry budget spent; the session stays closed.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionStatus {
    state: ConnectionState,
    epoch: u64,
}

impl SessionStatus {
    fn new(state: ConnectionState, epoch: u64) -> Self {
        Self { state, epoch }
    }
}

enum PumpExit {
    Disconnected,
    Shutdown,
}

/// Handle to a long-lived logical session. Reconnects replace the socket
/// underneath without changing the handle or the event receiver.
pub struct SessionHandle {
    status_rx: watch::Receiver<SessionStatus>,
    outbound_tx: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

pub struct TransportSession;

impl TransportSession {
    pub fn spawn(config: SessionConfig) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (status_tx, status_rx) = watch::channel(SessionStatus::new(ConnectionState::Connecting, 0));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let task = tokio::spawn(async move {
            session_loop(config, status_tx, event_tx, outbound_rx).await;
        });
        (
            SessionHandle {
                status_rx,
                outbound_tx,
                task,
            },
            event_rx,
        )
    }
}

impl SessionHandle {
    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    /// Queues a text frame on the open socket and returns the epoch of the
    /// connection it was queued on. Fails when the session is not open;
    /// nothing is buffered for a later connection.
    pub fn send_text(&self, text: String) -> Result<u64, TransportError> {
        let status = *self.status_rx.borrow();
        if !status.state.is_open() {
            return Err(TransportError::InvalidState {
                state: status.state,
            });
        }
        self.outbound_tx.try_send(text).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })?;
        Ok(status.epoch)
    }
}

impl CommandLink for SessionHandle {
    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    fn send(&mut self, request: &CommandRequest) -> Result<u64, TransportError> {
        let text = encode_request(request)?;
        self.send_text(text)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn session_loop(
    config: SessionConfig,
    status_tx: watch::Sender<SessionStatus>,
    event_tx: mpsc::Sender<SessionEvent>,
    mut outbound_rx: mpsc::Receiver<String>,
) {
    let mut policy = ReconnectPolicy::new(config.retries, config.retry_delay);
    let mut attempt = 0u32;
    let mut epoch = 0u64;

    loop {
        attempt += 1;
        status_tx.send_replace(SessionStatus::new(ConnectionState::Connecting, epoch));
        let _ = event_tx.send(SessionEvent::Connecting { attempt }).await;

        match connect_async(config.url.as_str()).await {
            Ok((socket, _)) => {
                let stale = discard_stale(&mut outbound_rx);
                if stale > 0 {
                    debug!("ws_outbound_discarded: count={stale}");
                }
                epoch += 1;
                info!("ws_open: url={} attempt={attempt} epoch={epoch}", config.url);
                status_tx.send_replace(SessionStatus::new(ConnectionState::Open, epoch));
                let _ = event_tx.send(SessionEvent::Opened { epoch }).await;
                if let PumpExit::Shutdown = pump(socket, &event_tx, &mut outbound_rx).await {
                    status_tx.send_replace(SessionStatus::new(ConnectionState::Closed, epoch));
                    return;
                }
                info!("ws_closed: url={}", config.url);
            }
            Err(err) => {
                warn!("ws_connect_error: {err}");
            }
        }

        status_tx.send_replace(SessionStatus::new(ConnectionState::Closed, epoch));
        match policy.on_closed() {
            Some(delay) => {
                let _ = event_tx
                    .send(SessionEvent::Closed {
                        retries_remaining: policy.retries_remaining(),
                    })
                    .await;
                tokio::time::sleep(delay).await;
            }
            None => {
                warn!("ws_retries_exhausted: attempts={attempt}");
                let _ = event_tx
                    .send(SessionEvent::Closed {
                        retries_remaining: 0,
                    })
                    .await;
                let _ = event_tx.send(SessionEvent::Exhausted).await;
                return;
            }
        }
    }
}

async fn pump(
    socket: Socket,
    event_tx: &mpsc::Sender<SessionEvent>,
    outbound_rx: &mut mpsc::Receiver<String>,
) -> PumpExit {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx.send(SessionEvent::Message(text)).await.is_err() {
                            let _ = sink.close().await;
                            return PumpExit::Shutdown;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if event_tx.send(SessionEvent::Message(text)).await.is_err() {
                                let _ = sink.close().await;
                                return PumpExit::Shutdown;
                            }
                        }
                        Err(err) => warn!("ws_binary_frame_dropped: {err}"),
                    },
                    Some(Ok(Message::Close(_))) | None => return PumpExit::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("ws_read_error: {err}");
                        return PumpExit::Disconnected;
                    }
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(text) => {
                        debug!("ws_send: {text}");
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            warn!("ws_send_error: {err}");
                            return PumpExit::Disconnected;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        return PumpExit::Shutdown;
                    }
                }
            }
        }
    }
}

fn discard_stale(outbound_rx: &mut mpsc::Receiver<String>) -> usize {
    let mut count = 0;
    while outbound_rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tailon_core::{CommandChange, CommandState};
    use url::Url;

    fn closed_port_config(retries: u32) -> SessionConfig {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        SessionConfig {
            url: Url::parse(&format!("ws://127.0.0.1:{port}/ws")).expect("url"),
            retries,
            retry_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn reconnects_are_bounded_by_retry_budget() {
        let (handle, mut events) = TransportSession::spawn(closed_port_config(3));
        let mut attempts = 0;
        let mut exhausted = false;
        while let Some(event) = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("session event")
        {
            match event {
                SessionEvent::Connecting { .. } => attempts += 1,
                SessionEvent::Exhausted => {
                    exhausted = true;
                }
                SessionEvent::Opened { .. } => panic!("nothing listens on this port"),
                _ => {}
            }
        }
        assert!(exhausted);
        assert_eq!(attempts, 4);
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_while_not_open_is_invalid_state() {
        let (mut handle, _events) = TransportSession::spawn(closed_port_config(0));
        let mut state = CommandState::default();
        state.apply([CommandChange::Source(Some("/var/log/a.log".to_string()))]);
        let request = state.request().expect("request");
        let result = handle.send(&request);
        assert!(matches!(result, Err(TransportError::InvalidState { .. })));
    }
}
