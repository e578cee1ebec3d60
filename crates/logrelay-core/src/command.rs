//! Command grammar shared by both endpoints
//!
//! Commands are typed by a user, normalized (lowercased, all whitespace
//! removed) and matched against a small grammar:
//!
//! ```text
//! command   := '?' | verb noun? qualifier?
//! verb      := 'get' | 'clear'
//! noun      := 'log' | 'logs'
//! qualifier := '--today' | '--' DD ('-'|'/') DD ('-'|'/') YYYY
//! ```
//!
//! Parsing is pure. Executing a parsed command against dated log files is the
//! caller's job.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(get|clear)(logs?)?(?:--(.*))?$").unwrap());
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})[-/](\d{2})[-/](\d{4})$").unwrap());

/// Descriptions shown for `?`, in display order
pub const HELP_LINES: [&str; 6] = [
    "get log: request current log from unity",
    "get log --today: get all logs from today",
    "get log --00-01-2000: get all logs from specific day on day-month-year",
    "clear logs: delete all temporary logs",
    "clear log --today: clear all logs from today",
    "clear log --00-01-2000: clear log of specific day",
];

/// The day a dated log command refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDay {
    Today,
    /// A day written as `DD-MM-YYYY`, separators already normalized
    Date(String),
}

impl LogDay {
    /// The `DD-MM-YYYY` label used in dated file names
    pub fn label(&self, today: NaiveDate) -> String {
        match self {
            LogDay::Today => today.format("%d-%m-%Y").to_string(),
            LogDay::Date(date) => date.clone(),
        }
    }

    pub fn is_today(&self) -> bool {
        matches!(self, LogDay::Today)
    }
}

/// Outcome of parsing one raw command string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// `?`: list the available commands
    Help,
    /// `get log` with no qualifier: ask the peer for its current log
    ShowCurrent,
    GetLog(LogDay),
    ClearLog(LogDay),
    ClearLogs,
    /// A dated command whose qualifier is not a valid day
    BadDate,
    /// Input that fits the grammar but names no action, such as `get` or
    /// `get logs --today`
    NoAction,
    /// Input that does not match the grammar, kept verbatim
    Unrecognized(String),
}

impl ParsedCommand {
    /// Whether the input is a complete, valid command
    ///
    /// Selects the `kc:>` or `uc:>` tag when the command is forwarded. A bad
    /// date or an input that names no action goes out as `uc:>`.
    pub fn is_known(&self) -> bool {
        matches!(
            self,
            ParsedCommand::Help
                | ParsedCommand::ShowCurrent
                | ParsedCommand::GetLog(_)
                | ParsedCommand::ClearLog(_)
                | ParsedCommand::ClearLogs
        )
    }
}

/// Lowercase and strip every whitespace character
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parse a raw command string
pub fn parse(raw: &str) -> ParsedCommand {
    let normalized = normalize(raw);
    if normalized == "?" {
        return ParsedCommand::Help;
    }

    let Some(caps) = COMMAND.captures(&normalized) else {
        return ParsedCommand::Unrecognized(raw.to_string());
    };
    let verb = caps.get(1).map_or("", |m| m.as_str());
    let noun = caps.get(2).map(|m| m.as_str());
    let qualifier = caps.get(3).map(|m| m.as_str());

    match (verb, noun, qualifier) {
        ("get", Some("log"), None) => ParsedCommand::ShowCurrent,
        ("get", Some("log"), Some(q)) => match parse_day(q) {
            Some(day) => ParsedCommand::GetLog(day),
            None => ParsedCommand::BadDate,
        },
        ("clear", Some("log"), None) => ParsedCommand::BadDate,
        ("clear", Some("log"), Some(q)) => match parse_day(q) {
            Some(day) => ParsedCommand::ClearLog(day),
            None => ParsedCommand::BadDate,
        },
        ("clear", Some("logs"), None) => ParsedCommand::ClearLogs,
        (_, _, None) => ParsedCommand::NoAction,
        (_, _, Some(q)) if parse_day(q).is_some() => ParsedCommand::NoAction,
        _ => ParsedCommand::Unrecognized(raw.to_string()),
    }
}

fn parse_day(qualifier: &str) -> Option<LogDay> {
    if qualifier == "today" {
        return Some(LogDay::Today);
    }
    DATE.captures(qualifier)
        .map(|caps| LogDay::Date(format!("{}-{}-{}", &caps[1], &caps[2], &caps[3])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> LogDay {
        LogDay::Date(s.to_string())
    }

    #[test]
    fn test_help() {
        assert_eq!(parse("?"), ParsedCommand::Help);
        assert_eq!(parse("  ? "), ParsedCommand::Help);
    }

    #[test]
    fn test_get_log_variants() {
        assert_eq!(parse("get log"), ParsedCommand::ShowCurrent);
        assert_eq!(parse("GET   LOG"), ParsedCommand::ShowCurrent);
        assert_eq!(parse("get log --today"), ParsedCommand::GetLog(LogDay::Today));
        assert_eq!(
            parse("get log --05-03-2024"),
            ParsedCommand::GetLog(date("05-03-2024"))
        );
    }

    #[test]
    fn test_slash_and_dash_dates_are_equivalent() {
        assert_eq!(parse("get log --05/03/2024"), parse("get log --05-03-2024"));
        assert_eq!(
            parse("clear log --05/03-2024"),
            ParsedCommand::ClearLog(date("05-03-2024"))
        );
    }

    #[test]
    fn test_clear_variants() {
        assert_eq!(parse("clear logs"), ParsedCommand::ClearLogs);
        assert_eq!(parse("clearlogs"), ParsedCommand::ClearLogs);
        assert_eq!(
            parse("clear log --today"),
            ParsedCommand::ClearLog(LogDay::Today)
        );
        assert_eq!(
            parse("clear log -- 01-01-2000"),
            ParsedCommand::ClearLog(date("01-01-2000"))
        );
    }

    #[test]
    fn test_bad_dates() {
        assert_eq!(parse("get log --yesterday"), ParsedCommand::BadDate);
        assert_eq!(parse("get log --1-1-2000"), ParsedCommand::BadDate);
        assert_eq!(parse("get log --01-01-20"), ParsedCommand::BadDate);
        assert_eq!(parse("get log --"), ParsedCommand::BadDate);
        assert_eq!(parse("clear log --tomorrow"), ParsedCommand::BadDate);
        assert_eq!(parse("clear log"), ParsedCommand::BadDate);
    }

    #[test]
    fn test_unrecognized_keeps_raw_input() {
        assert_eq!(
            parse("Hello There"),
            ParsedCommand::Unrecognized("Hello There".to_string())
        );
        assert_eq!(
            parse("get logs --someday"),
            ParsedCommand::Unrecognized("get logs --someday".to_string())
        );
        assert_eq!(
            parse("get --x"),
            ParsedCommand::Unrecognized("get --x".to_string())
        );
        assert_eq!(parse("getter"), ParsedCommand::Unrecognized("getter".to_string()));
        assert_eq!(parse(""), ParsedCommand::Unrecognized(String::new()));
    }

    #[test]
    fn test_grammar_matches_without_action() {
        for raw in [
            "get",
            "clear",
            "get logs",
            "get --today",
            "getlogs--today",
            "clear --01-01-2000",
            "clear logs --today",
        ] {
            assert_eq!(parse(raw), ParsedCommand::NoAction, "input {raw:?}");
        }
    }

    #[test]
    fn test_is_known() {
        assert!(parse("get log").is_known());
        assert!(parse("?").is_known());
        assert!(parse("get log --today").is_known());
        assert!(parse("clear log --05/03/2024").is_known());
        assert!(parse("clear logs").is_known());
        assert!(!parse("make coffee").is_known());
    }

    #[test]
    fn test_bad_dates_and_no_action_are_not_known() {
        assert!(!parse("get log --yesterday").is_known());
        assert!(!parse("clear log").is_known());
        assert!(!parse("get").is_known());
        assert!(!parse("get logs --today").is_known());
    }

    #[test]
    fn test_day_label() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(LogDay::Today.label(today), "05-03-2024");
        assert_eq!(date("31-12-1999").label(today), "31-12-1999");
        assert!(LogDay::Today.is_today());
        assert!(!date("31-12-1999").is_today());
    }

    #[test]
    fn test_help_lines_count() {
        assert_eq!(HELP_LINES.len(), 6);
    }
}
