
use crate::sanitize::{escape_html, terminal_text, unescape_html};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Line,
    Notice,
}

impl EntryKind {
    pub fn css_class(&self) -> &'static str {
        match self {
            EntryKind::Line => "log-entry",
            EntryKind::Notice => "log-entry log-notice",
        }
    }
}

/// An entry that has not been appended to a buffer yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub content: String,
    pub kind: EntryKind,
}

impl NewEntry {
    /// Builds a log line from raw remote text. The text is escaped and at most
    /// one trailing newline is removed.
    pub fn line(raw: &str) -> Self {
        let trimmed = raw.strip_suffix('\n').unwrap_or(raw);
        Self {
            content: escape_html(trimmed),
            kind: EntryKind::Line,
        }
    }

    pub fn notice(message: &str) -> Self {
        Self {
            content: escape_html(message),
            kind: EntryKind::Notice,
        }
    }
}

/// A rendered line owned by a `LineBuffer`. Fields are fixed once the buffer
/// assigns the sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    seq: u64,
    content: String,
    kind: EntryKind,
}

impl LogEntry {
    pub(crate) fn from_new(seq: u64, entry: NewEntry) -> Self {
        Self {
            seq,
            content: entry.content,
            kind: entry.kind,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Markup-safe content, escaped with the full `& < > /` mapping.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content as an HTML serializer emits it once placed in a text node.
    /// Slashes need no escaping there, everything else stays escaped.
    pub fn rendered(&self) -> String {
        self.content.replace("&#x2F;", "/")
    }

    /// Content for a terminal: entities decoded, control characters removed.
    pub fn plain_text(&self) -> String {
        terminal_text(&unescape_html(&self.content))
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_notice(&self) -> bool {
        self.kind == EntryKind::Notice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_strips_single_trailing_newline() {
        assert_eq!(NewEntry::line("line1\n").content, "line1");
        assert_eq!(NewEntry::line("line2").content, "line2");
        assert_eq!(NewEntry::line("double\n\n").content, "double\n");
    }

    #[test]
    fn line_content_is_escaped() {
        let entry = NewEntry::line("<b>&x</b>");
        assert_eq!(entry.content, "&lt;b&gt;&amp;x&lt;&#x2F;b&gt;");
        assert_eq!(entry.kind, EntryKind::Line);
    }

    #[test]
    fn rendered_form_keeps_slashes_readable() {
        let entry = LogEntry::from_new(1, NewEntry::line("<b>&x</b>"));
        assert_eq!(entry.rendered(), "&lt;b&gt;&amp;x&lt;/b&gt;");

        let notice = LogEntry::from_new(2, NewEntry::notice("/var/log/a.log - truncated"));
        assert!(notice.is_notice());
        assert_eq!(notice.rendered(), "/var/log/a.log - truncated");
    }

    #[test]
    fn plain_text_decodes_markup_and_drops_control_chars() {
        let entry = LogEntry::from_new(1, NewEntry::line("<a href=\"/x\">\u{1b}[31mred</a>\n"));
        assert_eq!(entry.plain_text(), "<a href=\"/x\">[31mred</a>");
    }
}
