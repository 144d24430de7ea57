//! Pipeline diagnostics.
//!
//! Every step of a batch records a [`LogEntry`]. Entries go straight to the
//! `log` facade and are also kept in a [`Diagnostics`] list that travels back
//! with the batch report, so skipped variables are never silent.

use serde::{Deserialize, Serialize};

/// Log level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single diagnostic entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting depth, for per-variable lines under a batch line
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    /// Emit through the `log` facade.
    pub fn emit(&self) {
        let indent = "  ".repeat(self.indent as usize);
        match self.level {
            LogLevel::Info => log::info!("{}{}", indent, self.message),
            LogLevel::Success => log::info!("{}✓ {}", indent, self.message),
            LogLevel::Warning => log::warn!("{}{}", indent, self.message),
            LogLevel::Error => log::error!("{}{}", indent, self.message),
        }
    }
}

/// Ordered diagnostics of one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<LogEntry>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and emit an entry.
    pub fn push(&mut self, entry: LogEntry) {
        entry.emit();
        self.entries.push(entry);
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        self.push(LogEntry::info(msg));
    }

    pub fn success(&mut self, msg: impl Into<String>) {
        self.push(LogEntry::success(msg));
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.push(LogEntry::warning(msg));
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.push(LogEntry::error(msg));
    }

    pub fn info_indent(&mut self, msg: impl Into<String>, indent: u8) {
        self.push(LogEntry::info(msg).with_indent(indent));
    }

    pub fn warning_indent(&mut self, msg: impl Into<String>, indent: u8) {
        self.push(LogEntry::warning(msg).with_indent(indent));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries at `level`, in order.
    pub fn at_level(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.level == level)
    }

    pub fn has_warnings(&self) -> bool {
        self.at_level(LogLevel::Warning).next().is_some()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_keep_order_and_levels() {
        let mut diag = Diagnostics::new();
        diag.info("Reading sheet");
        diag.warning_indent("PHTD skipped", 1);
        diag.success("done");

        assert_eq!(diag.len(), 3);
        assert!(diag.has_warnings());
        let warnings: Vec<_> = diag.at_level(LogLevel::Warning).collect();
        assert_eq!(warnings[0].message, "PHTD skipped");
        assert_eq!(warnings[0].indent, 1);
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(LogEntry::warning("x").with_indent(2)).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["indent"], 2);
    }
}
