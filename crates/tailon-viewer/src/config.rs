use clap::{Parser, ValueEnum};
use std::time::Duration;
use tailon_core::{
    CommandChange, Mode, ViewerError, DEFAULT_CAPACITY, DEFAULT_FOLLOW_THRESHOLD,
    DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_TAIL_DEPTH,
};
use url::Url;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "tailon-viewer", about = "Stream filtered log output from a tailon server")]
pub struct Args {
    /// Full WebSocket URL; overrides --server and --relative-root.
    #[arg(long, default_value = "")]
    pub url: String,
    #[arg(long, default_value = "")]
    pub server: String,
    #[arg(long, default_value = "/")]
    pub relative_root: String,
    /// Append the raw-websocket suffix used by SockJS endpoints.
    #[arg(long, default_value_t = false)]
    pub sockjs: bool,
    /// Log source to stream; repeat to cycle between several.
    #[arg(long = "file")]
    pub files: Vec<String>,
    #[arg(long, default_value = "tail")]
    pub mode: String,
    #[arg(long, default_value = "")]
    pub script: String,
    #[arg(long, default_value_t = DEFAULT_TAIL_DEPTH)]
    pub lines: u32,
    /// Lines of history kept in the view; 0 keeps everything.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub history: usize,
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,
    #[arg(long, default_value_t = DEFAULT_FOLLOW_THRESHOLD)]
    pub follow_threshold: u64,
    /// Print new lines to stdout instead of running the terminal UI.
    #[arg(long, default_value_t = false)]
    pub plain: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Do not replay the active command after a reconnect.
    #[arg(long, default_value_t = false)]
    pub no_resend: bool,
    #[arg(long, default_value = "")]
    pub log_dir: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Html,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub url: Url,
    pub retries: u32,
    pub retry_delay: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub session: SessionConfig,
    pub sources: Vec<String>,
    pub mode: Mode,
    pub script: Option<String>,
    pub tail_depth: u32,
    pub history: usize,
    pub follow_threshold: u64,
    pub resend_on_reconnect: bool,
    pub plain: bool,
    pub format: OutputFormat,
    pub log_dir: String,
    pub log_stderr: bool,
}

impl Config {
    /// Changes that seed the command state at startup.
    pub fn initial_changes(&self) -> Vec<CommandChange> {
        let mut changes = vec![
            CommandChange::TailDepth(self.tail_depth),
            CommandChange::Mode(self.mode),
        ];
        if let Some(script) = &self.script {
            changes.push(CommandChange::Script(Some(script.clone())));
        }
        changes.push(CommandChange::Source(self.sources.first().cloned()));
        changes
    }
}

pub fn load_config(args: Args) -> Result<Config, ViewerError> {
    let url = resolve_ws_url(&args.url, &args.server, &args.relative_root, args.sockjs)?;
    let mode = args.mode.parse::<Mode>().map_err(ViewerError::Config)?;
    let script = if args.script.trim().is_empty() {
        None
    } else {
        Some(args.script)
    };
    let sources = resolve_sources(args.files);
    let log_dir = resolve_log_dir(&args.log_dir);
    let log_stderr = args.plain && resolve_log_stderr();
    Ok(Config {
        session: SessionConfig {
            url,
            retries: args.retries,
            retry_delay: Duration::from_millis(args.retry_delay_ms),
        },
        sources,
        mode,
        script,
        tail_depth: args.lines,
        history: args.history,
        follow_threshold: args.follow_threshold,
        resend_on_reconnect: !args.no_resend,
        plain: args.plain,
        format: args.format,
        log_dir,
        log_stderr,
    })
}

fn resolve_ws_url(
    flag_url: &str,
    flag_server: &str,
    relative_root: &str,
    sockjs: bool,
) -> Result<Url, ViewerError> {
    if !flag_url.trim().is_empty() {
        return parse_url(flag_url);
    }
    if let Ok(value) = std::env::var("TAILON_URL") {
        if !value.trim().is_empty() {
            return parse_url(&value);
        }
    }
    let server = if !flag_server.trim().is_empty() {
        flag_server.to_string()
    } else {
        match std::env::var("TAILON_SERVER") {
            Ok(value) if !value.trim().is_empty() => value,
            _ => DEFAULT_SERVER.to_string(),
        }
    };
    derive_ws_url(&server, relative_root, sockjs)
}

fn parse_url(raw: &str) -> Result<Url, ViewerError> {
    Url::parse(raw.trim()).map_err(|err| ViewerError::Config(format!("invalid url '{raw}': {err}")))
}

/// Builds the socket URL the way the web client does: `<root>ws` when the
/// root ends in a slash, `<root>/ws` otherwise.
pub fn derive_ws_url(server: &str, relative_root: &str, sockjs: bool) -> Result<Url, ViewerError> {
    let mut url = parse_url(server)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ViewerError::Config(format!(
                "unsupported server scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ViewerError::Config(format!("cannot use scheme {scheme} for {server}")))?;

    let root = if relative_root.starts_with('/') {
        relative_root.to_string()
    } else {
        format!("/{relative_root}")
    };
    let mut path = if root.ends_with('/') {
        format!("{root}ws")
    } else {
        format!("{root}/ws")
    };
    if sockjs {
        path.push_str("/websocket");
    }
    url.set_path(&path);
    Ok(url)
}

fn resolve_sources(flag_files: Vec<String>) -> Vec<String> {
    let mut sources: Vec<String> = flag_files
        .into_iter()
        .filter(|file| !file.trim().is_empty())
        .collect();
    if sources.is_empty() {
        if let Ok(value) = std::env::var("TAILON_FILES") {
            sources = value
                .split(',')
                .map(str::trim)
                .filter(|file| !file.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    sources
}

fn resolve_log_dir(log_dir_flag: &str) -> String {
    if !log_dir_flag.trim().is_empty() {
        return log_dir_flag.to_string();
    }
    if let Ok(value) = std::env::var("TAILON_LOG_DIR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    ".tailon/logs".to_string()
}

fn resolve_log_stderr() -> bool {
    std::env::var("TAILON_LOG_STDERR")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
