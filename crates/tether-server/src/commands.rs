//! Keyword to handler mapping

use std::collections::HashMap;
use std::fmt;

/// Commands the server understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Send the argument back
    Echo,
    /// Send the current local time
    Time,
    /// Close the connection
    Quit,
    /// Send a file to the client over TCP
    Download,
    /// Receive a file from the client over TCP
    Upload,
    /// Send a file to the client over UDP
    DownloadUdp,
    /// Receive a file from the client over UDP
    UploadUdp,
}

impl Command {
    /// Every command, in keyword order
    pub const ALL: [Command; 7] = [
        Command::Echo,
        Command::Time,
        Command::Quit,
        Command::Download,
        Command::Upload,
        Command::DownloadUdp,
        Command::UploadUdp,
    ];

    /// Keyword that selects the command
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Time => "time",
            Self::Quit => "quit",
            Self::Download => "download",
            Self::Upload => "upload",
            Self::DownloadUdp => "download_udp",
            Self::UploadUdp => "upload_udp",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Read-only keyword table, built once at startup
#[derive(Debug, Clone)]
pub struct CommandTable {
    commands: HashMap<&'static str, Command>,
}

impl CommandTable {
    /// Build the table of all known commands
    pub fn new() -> Self {
        Self {
            commands: Command::ALL
                .iter()
                .map(|command| (command.keyword(), *command))
                .collect(),
        }
    }

    /// Find the command bound to `keyword`; keywords are case-sensitive
    pub fn lookup(&self, keyword: &str) -> Option<Command> {
        self.commands.get(keyword).copied()
    }

    /// Number of known commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}
