pub mod app;
pub mod config;
pub mod logging;
pub mod render;
pub mod transport;

pub use app::App;
pub use config::{load_config, Args, Config, OutputFormat, SessionConfig};
pub use transport::{SessionEvent, SessionHandle, TransportSession};
