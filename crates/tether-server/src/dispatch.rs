//! Command line validation and dispatch

use crate::commands::{Command, CommandTable};
use crate::handlers::{self, Session};
use regex::bytes::Regex;
use tether_types::{Error, Result};
use tracing::debug;

/// Optional leading spaces, a keyword, optionally spaces and an argument, then LF or CRLF.
/// Matched byte-wise, so the argument may hold any byte but LF.
const GRAMMAR: &str = r"(?-u)^ *([A-Za-z0-9_]+)(?: +.+)?(?:\r\n|\n)$";

/// Reply prefix for lines that do not match the grammar; the raw line follows
pub const INVALID_FORMAT_PREFIX: &[u8] = b"invalid command format \"";

/// Reply for well-formed lines naming no known command
pub const UNKNOWN_COMMAND: &[u8] = b"unknown command";

/// Words that close the connection when they appear anywhere in a line
const CLOSING_WORDS: [&str; 3] = ["quit", "exit", "close"];

/// A line that matched the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine<'l> {
    /// The command keyword
    pub keyword: &'l str,
    /// Everything after the keyword, separator spaces and terminator included, as sent
    pub argument: &'l [u8],
}

/// What happened to one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The line did not match the grammar
    Malformed,
    /// The keyword is not in the command table
    Unknown,
    /// The bound handler ran
    Handled(Command),
}

/// Validates lines and runs the handler they name
#[derive(Debug, Clone)]
pub struct Dispatcher {
    grammar: Regex,
    table: CommandTable,
}

impl Dispatcher {
    /// Compile the grammar and build the command table
    pub fn new() -> Result<Self> {
        let grammar = Regex::new(GRAMMAR)
            .map_err(|e| Error::other(format!("invalid command grammar: {}", e)))?;

        Ok(Self {
            grammar,
            table: CommandTable::new(),
        })
    }

    /// Match a raw line against the grammar; the argument bytes are left untouched
    pub fn parse<'l>(&self, line: &'l [u8]) -> Option<ParsedLine<'l>> {
        let keyword = self.grammar.captures(line)?.get(1)?;
        // The keyword class is ASCII only
        let name = std::str::from_utf8(keyword.as_bytes()).ok()?;
        Some(ParsedLine {
            keyword: name,
            argument: &line[keyword.end()..],
        })
    }

    /// Validate a line and run its handler for the session's client
    pub fn dispatch(&self, session: &mut Session<'_>, line: &[u8]) -> DispatchOutcome {
        let Some(parsed) = self.parse(line) else {
            debug!("Client {} sent a malformed line", session.active());
            let mut reply = INVALID_FORMAT_PREFIX.to_vec();
            reply.extend_from_slice(line);
            session.reply(&reply);
            return DispatchOutcome::Malformed;
        };

        let Some(command) = self.table.lookup(parsed.keyword) else {
            debug!(
                "Client {} sent unknown command {:?}",
                session.active(),
                parsed.keyword
            );
            session.reply(UNKNOWN_COMMAND);
            return DispatchOutcome::Unknown;
        };

        debug!("Client {} runs {}", session.active(), command);
        handlers::run(command, session, parsed.argument);
        DispatchOutcome::Handled(command)
    }
}

/// Whether the client that sent `line` must be removed once the line is processed
pub fn requests_close(line: &[u8]) -> bool {
    CLOSING_WORDS
        .iter()
        .any(|word| line.windows(word.len()).any(|window| window == word.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new().unwrap()
    }

    fn outcome(line: &[u8]) -> DispatchOutcome {
        let dispatcher = dispatcher();
        match dispatcher.parse(line) {
            None => DispatchOutcome::Malformed,
            Some(parsed) => dispatcher
                .table
                .lookup(parsed.keyword)
                .map_or(DispatchOutcome::Unknown, DispatchOutcome::Handled),
        }
    }

    #[rstest]
    #[case(b"echo hello\n", "echo", b" hello\n")]
    #[case(b"echo  hello\r\n", "echo", b"  hello\r\n")]
    #[case(b"   time\n", "time", b"\n")]
    #[case(b"download_udp  a b.txt\n", "download_udp", b"  a b.txt\n")]
    #[case(b"foo bar\n", "foo", b" bar\n")]
    #[case(b"echo \xff\xfe\n", "echo", b" \xff\xfe\n")]
    fn test_parse_valid(#[case] line: &[u8], #[case] keyword: &str, #[case] argument: &[u8]) {
        let parsed = dispatcher().parse(line).unwrap();
        assert_eq!(parsed.keyword, keyword);
        assert_eq!(parsed.argument, argument);
    }

    #[rstest]
    #[case(b"echo hello")]
    #[case(b"bad!!\n")]
    #[case(b"\n")]
    #[case(b"echo\thello\n")]
    #[case(b"echo \n")]
    #[case(b"echo hi\nthere\n")]
    #[case(b"\xffecho hi\n")]
    fn test_parse_malformed(#[case] line: &[u8]) {
        assert!(dispatcher().parse(line).is_none());
    }

    #[rstest]
    #[case(b"echo hi\n", DispatchOutcome::Handled(Command::Echo))]
    #[case(b"upload x\r\n", DispatchOutcome::Handled(Command::Upload))]
    #[case(b" foo bar\n", DispatchOutcome::Unknown)]
    #[case(b"Echo hi\n", DispatchOutcome::Unknown)]
    #[case(b"bad!!\n", DispatchOutcome::Malformed)]
    fn test_keyword_lookup(#[case] line: &[u8], #[case] expected: DispatchOutcome) {
        assert_eq!(outcome(line), expected);
    }

    #[rstest]
    #[case(b"quit\n", true)]
    #[case(b"echo please exit\n", true)]
    #[case(b"download closet.txt\n", true)]
    #[case(b"bad!! quit\n", true)]
    #[case(b"echo QUIT\n", false)]
    #[case(b"echo \xffexit\n", true)]
    #[case(b"time\n", false)]
    fn test_requests_close(#[case] line: &[u8], #[case] expected: bool) {
        assert_eq!(requests_close(line), expected);
    }
}
