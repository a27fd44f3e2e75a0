use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TAIL_DEPTH: u32 = 60;

/// Filter discipline applied by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Tail,
    Grep,
    Sed,
    Awk,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Tail, Mode::Grep, Mode::Sed, Mode::Awk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Tail => "tail",
            Mode::Grep => "grep",
            Mode::Sed => "sed",
            Mode::Awk => "awk",
        }
    }

    /// Every mode except plain tail needs a script before anything is sent.
    pub fn requires_script(&self) -> bool {
        !matches!(self, Mode::Tail)
    }

    /// Script used when the user submits empty input.
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            Mode::Tail => None,
            Mode::Grep => Some(".*"),
            Mode::Sed => Some("s|.*|&,"),
            Mode::Awk => Some("{print $0; fflush()}"),
        }
    }

    pub fn next(&self) -> Mode {
        let idx = Mode::ALL.iter().position(|mode| mode == self).unwrap_or(0);
        Mode::ALL[(idx + 1) % Mode::ALL.len()]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "tail" => Ok(Mode::Tail),
            "grep" => Ok(Mode::Grep),
            "sed" => Ok(Mode::Sed),
            "awk" => Ok(Mode::Awk),
            other => Err(format!("Unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandChange {
    Source(Option<String>),
    Mode(Mode),
    Script(Option<String>),
    TailDepth(u32),
}

/// What the viewer currently wants streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandState {
    source: Option<String>,
    mode: Mode,
    script: Option<String>,
    tail_depth: u32,
}

impl Default for CommandState {
    fn default() -> Self {
        Self {
            source: None,
            mode: Mode::Tail,
            script: None,
            tail_depth: DEFAULT_TAIL_DEPTH,
        }
    }
}

impl CommandState {
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref().filter(|script| !script.is_empty())
    }

    pub fn tail_depth(&self) -> u32 {
        self.tail_depth
    }

    /// Applies a batch of changes as one transition. Returns true when any
    /// attribute changed, which is the single "command changed" signal.
    pub fn apply<I>(&mut self, changes: I) -> bool
    where
        I: IntoIterator<Item = CommandChange>,
    {
        let mut changed = false;
        for change in changes {
            changed |= self.apply_one(change);
        }
        changed
    }

    fn apply_one(&mut self, change: CommandChange) -> bool {
        match change {
            CommandChange::Source(source) => {
                if self.source == source {
                    return false;
                }
                self.source = source;
                true
            }
            CommandChange::Mode(mode) => {
                if self.mode == mode {
                    return false;
                }
                self.mode = mode;
                self.script = None;
                true
            }
            CommandChange::Script(script) => {
                if self.script == script {
                    return false;
                }
                self.script = script;
                true
            }
            CommandChange::TailDepth(depth) => {
                if self.tail_depth == depth {
                    return false;
                }
                self.tail_depth = depth;
                true
            }
        }
    }

    /// Sets the script from user input; empty input falls back to the mode's
    /// placeholder.
    pub fn submit_script(&mut self, input: &str) -> bool {
        let value = if input.trim().is_empty() {
            self.mode.placeholder().unwrap_or_default()
        } else {
            input
        };
        let script = if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        };
        self.apply([CommandChange::Script(script)])
    }

    /// Relative download path for the selected source.
    pub fn fetch_path(&self) -> Option<String> {
        self.source().map(|source| format!("fetch/{source}"))
    }

    /// The request to send for this state, if it is complete.
    pub fn request(&self) -> Option<CommandRequest> {
        let source = self.source.clone()?;
        let script = if self.mode.requires_script() {
            Some(self.script()?.to_string())
        } else {
            None
        };
        Some(CommandRequest {
            mode: self.mode,
            source,
            last: self.tail_depth,
            script,
        })
    }
}

/// Outbound request. Serialized as `{"<mode>": source, "last": n, "script": s?}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub mode: Mode,
    pub source: String,
    pub last: u32,
    pub script: Option<String>,
}

impl Serialize for CommandRequest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.script.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(self.mode.as_str(), &self.source)?;
        map.serialize_entry("last", &self.last)?;
        if let Some(script) = &self.script {
            map.serialize_entry("script", script)?;
        }
        map.end()
    }
}
