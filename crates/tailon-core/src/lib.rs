pub mod buffer;
pub mod command;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod protocol;
pub mod reconnect;
pub mod sanitize;

pub use buffer::{AppendOutcome, LineBuffer, ScrollAnchor, DEFAULT_CAPACITY, DEFAULT_FOLLOW_THRESHOLD};
pub use command::{CommandChange, CommandRequest, CommandState, Mode, DEFAULT_TAIL_DEPTH};
pub use dispatch::{CommandLink, DispatchOutcome, Dispatcher};
pub use entry::{EntryKind, LogEntry, NewEntry};
pub use error::{ProtocolError, TransportError, ViewerError};
pub use protocol::{decode_inbound, encode_request, entries_at, entries_for, malformed_notice, Inbound};
pub use reconnect::{ConnectionState, ReconnectPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MS};
