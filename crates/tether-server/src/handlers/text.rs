//! Conversational commands

use super::Session;
use chrono::Local;
use tracing::{debug, warn};

/// ctime(3) layout, trailing newline included
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y\n";

pub(super) fn echo(session: &mut Session<'_>, argument: &[u8]) {
    let start = argument
        .iter()
        .position(|byte| *byte != b' ')
        .unwrap_or(argument.len());
    session.reply(&argument[start..]);
}

pub(super) fn time(session: &mut Session<'_>, _argument: &[u8]) {
    let now = Local::now().format(CTIME_FORMAT).to_string();
    session.reply(now.as_bytes());
}

pub(super) fn quit(session: &mut Session<'_>, _argument: &[u8]) {
    let handle = session.active();
    if let Some(client) = session.client() {
        match client.shutdown() {
            Ok(()) => debug!("Client {} shut down", handle),
            Err(e) => warn!("Shutting down client {} failed: {}", handle, e),
        }
    }
}
