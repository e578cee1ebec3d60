//! Execute parsed commands against the dated log store

use std::io;
use std::path::Path;

use chrono::NaiveDate;
use logrelay_core::command::HELP_LINES;
use logrelay_core::{DisplayEntry, LogDay, ParsedCommand};
use tracing::warn;

use crate::logs::dated::{self, DatedLogStore};

/// Marker shown after the lines of a dated log
pub const END_OF_FILE: &str = "end of file----";

/// Default number of lines shown by `get log --<day>`
pub const DEFAULT_LINE_CAP: usize = 4000;

/// Turns parsed commands into display entries
///
/// Filesystem failures are reported as entries rather than returned, so a bad
/// command can never take the endpoint down.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    store: DatedLogStore,
    line_cap: usize,
    verbose: bool,
}

impl CommandExecutor {
    pub fn new(store: DatedLogStore, line_cap: usize, verbose: bool) -> Self {
        Self {
            store,
            line_cap,
            verbose,
        }
    }

    /// Execute a command relative to today's date
    pub fn execute(&self, command: &ParsedCommand) -> Vec<DisplayEntry> {
        self.execute_on(command, dated::today())
    }

    /// Execute a command as if today were `today`
    pub fn execute_on(&self, command: &ParsedCommand, today: NaiveDate) -> Vec<DisplayEntry> {
        let texts = match command {
            ParsedCommand::Help => {
                let mut texts = vec![String::new()];
                texts.extend(HELP_LINES.iter().map(|s| s.to_string()));
                texts.push(String::new());
                texts
            }
            ParsedCommand::ShowCurrent | ParsedCommand::NoAction => Vec::new(),
            ParsedCommand::GetLog(day) => self.get_log(day, today),
            ParsedCommand::ClearLog(day) => self.clear_log(&day.label(today)),
            ParsedCommand::ClearLogs => self.clear_logs(),
            ParsedCommand::BadDate => vec!["incorrect date format".to_string()],
            ParsedCommand::Unrecognized(raw) => vec![format!("'{raw}'")],
        };
        texts.into_iter().map(DisplayEntry::now).collect()
    }

    fn get_log(&self, day: &LogDay, today: NaiveDate) -> Vec<String> {
        let label = day.label(today);
        match self.store.read(&label, self.line_cap) {
            Ok(Some(mut lines)) => {
                lines.push(END_OF_FILE.to_string());
                lines
            }
            Ok(None) => match self.store.create_empty(&label) {
                Ok(_) if day.is_today() => {
                    vec!["no previous logs from today, blank file created".to_string()]
                }
                Ok(_) => vec!["no previous logs from that day, blank file created".to_string()],
                Err(e) => self.io_failure(&self.store.path_for(&label), &e),
            },
            Err(e) => self.io_failure(&self.store.path_for(&label), &e),
        }
    }

    fn clear_log(&self, label: &str) -> Vec<String> {
        let path = self.store.path_for(label);
        match self.store.delete(label) {
            Ok(true) => vec![format!("log file at {} deleted", path.display())],
            Ok(false) => vec![format!("no log file found at {}", path.display())],
            Err(e) => self.io_failure(&path, &e),
        }
    }

    fn clear_logs(&self) -> Vec<String> {
        match self.store.delete_all() {
            Ok(_) => vec!["all log files deleted".to_string()],
            Err(e) => self.io_failure(self.store.dir(), &e),
        }
    }

    fn io_failure(&self, path: &Path, err: &io::Error) -> Vec<String> {
        warn!(path = %path.display(), error = %err, "log file access failed");
        let mut texts = vec![format!("unable to access log file at {}", path.display())];
        if self.verbose {
            texts.push(format!("---> {err}"));
        }
        texts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logrelay_core::parse;
    use tempfile::TempDir;

    fn executor(tmp: &TempDir) -> CommandExecutor {
        CommandExecutor::new(DatedLogStore::new(tmp.path()), DEFAULT_LINE_CAP, false)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn texts(entries: Vec<DisplayEntry>) -> Vec<String> {
        entries.into_iter().map(|e| e.text).collect()
    }

    #[test]
    fn test_help_has_eight_entries() {
        let tmp = TempDir::new().unwrap();
        let out = texts(executor(&tmp).execute_on(&parse("?"), day()));
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], "");
        assert_eq!(out[1], "get log: request current log from unity");
        assert_eq!(out[6], "clear log --00-01-2000: clear log of specific day");
        assert_eq!(out[7], "");
    }

    #[test]
    fn test_show_current_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let out = executor(&tmp).execute_on(&parse("get log"), day());
        assert!(out.is_empty());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_incomplete_commands_are_silent() {
        let tmp = TempDir::new().unwrap();
        let exec = executor(&tmp);
        for raw in ["get", "clear", "get logs", "getlogs--today"] {
            assert!(exec.execute_on(&parse(raw), day()).is_empty(), "input {raw:?}");
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_get_log_missing_today_creates_blank_file() {
        let tmp = TempDir::new().unwrap();
        let exec = executor(&tmp);
        let out = texts(exec.execute_on(&parse("get log --today"), day()));
        assert_eq!(out, vec!["no previous logs from today, blank file created"]);
        assert!(exec.store.path_for("05-03-2024").exists());
    }

    #[test]
    fn test_get_log_missing_other_day() {
        let tmp = TempDir::new().unwrap();
        let out = texts(executor(&tmp).execute_on(&parse("get log --01-01-2000"), day()));
        assert_eq!(out, vec!["no previous logs from that day, blank file created"]);
    }

    #[test]
    fn test_get_log_lists_lines_then_marker() {
        let tmp = TempDir::new().unwrap();
        let exec = executor(&tmp);
        exec.store
            .append("05-03-2024", &["one".to_string(), "two".to_string()])
            .unwrap();
        let out = texts(exec.execute_on(&parse("get log --05/03/2024"), day()));
        assert_eq!(out, vec!["one", "two", END_OF_FILE]);
    }

    #[test]
    fn test_get_log_respects_line_cap() {
        let tmp = TempDir::new().unwrap();
        let exec = CommandExecutor::new(DatedLogStore::new(tmp.path()), 2, false);
        let lines: Vec<String> = (0..5).map(|n| n.to_string()).collect();
        exec.store.append("05-03-2024", &lines).unwrap();
        let out = texts(exec.execute_on(&parse("get log --today"), day()));
        assert_eq!(out, vec!["0", "1", END_OF_FILE]);
    }

    #[test]
    fn test_clear_log_twice() {
        let tmp = TempDir::new().unwrap();
        let exec = executor(&tmp);
        exec.store.create_empty("07-07-2023").unwrap();
        let path = exec.store.path_for("07-07-2023");

        let first = texts(exec.execute_on(&parse("clear log --07-07-2023"), day()));
        assert_eq!(first, vec![format!("log file at {} deleted", path.display())]);

        let second = texts(exec.execute_on(&parse("clear log --07/07/2023"), day()));
        assert_eq!(second, vec![format!("no log file found at {}", path.display())]);
    }

    #[test]
    fn test_clear_logs_then_get_today() {
        let tmp = TempDir::new().unwrap();
        let exec = executor(&tmp);
        exec.store
            .append("05-03-2024", &["old".to_string()])
            .unwrap();

        let out = texts(exec.execute_on(&parse("clear logs"), day()));
        assert_eq!(out, vec!["all log files deleted"]);

        let out = texts(exec.execute_on(&parse("get log --today"), day()));
        assert_eq!(out, vec!["no previous logs from today, blank file created"]);
    }

    #[test]
    fn test_bad_date_and_unrecognized() {
        let tmp = TempDir::new().unwrap();
        let exec = executor(&tmp);
        assert_eq!(
            texts(exec.execute_on(&parse("get log --someday"), day())),
            vec!["incorrect date format"]
        );
        assert_eq!(
            texts(exec.execute_on(&parse("Make Coffee"), day())),
            vec!["'Make Coffee'"]
        );
    }

    #[test]
    fn test_io_failure_becomes_entries() {
        let tmp = TempDir::new().unwrap();
        // A regular file where the log directory should be
        let blocker = tmp.path().join("logs");
        std::fs::write(&blocker, "not a dir").unwrap();
        let exec = CommandExecutor::new(DatedLogStore::new(&blocker), DEFAULT_LINE_CAP, true);

        let out = texts(exec.execute_on(&parse("get log --today"), day()));
        assert_eq!(out.len(), 2);
        assert!(out[0].starts_with("unable to access log file at"));
        assert!(out[1].starts_with("---> "));
    }
}
