//! File transfers over the client's own TCP connection

use super::Session;
use crate::reconnect::TcpReconnector;
use std::path::Path;
use tether_transfer::TcpChannel;
use tether_types::{Error, Result, TransferStats};
use tracing::{info, warn};

pub(crate) const DOWNLOADED: &[u8] = b"file downloaded\n";
pub(crate) const DOWNLOAD_FAILED: &[u8] = b"fail to download the file\n";
pub(crate) const UPLOADED: &[u8] = b"file uploaded\n";
pub(crate) const UPLOAD_FAILED: &[u8] = b"fail to upload the file\n";

#[derive(Clone, Copy)]
pub(super) enum Direction {
    Send,
    Receive,
}

pub(super) fn download(session: &mut Session<'_>, argument: &[u8]) {
    let path = session.settings.resolve(argument);
    let outcome = run_over_tcp(session, &path, Direction::Send);
    let acked = session.read_ack();

    let succeeded = report("Download", &path, session, &outcome) && acked;
    session.reply(if succeeded { DOWNLOADED } else { DOWNLOAD_FAILED });
}

pub(super) fn upload(session: &mut Session<'_>, argument: &[u8]) {
    let path = session.settings.resolve(argument);
    let outcome = run_over_tcp(session, &path, Direction::Receive);

    let succeeded = report("Upload", &path, session, &outcome);
    session.reply(if succeeded { UPLOADED } else { UPLOAD_FAILED });
}

fn run_over_tcp(
    session: &mut Session<'_>,
    path: &Path,
    direction: Direction,
) -> Result<TransferStats> {
    let stream = session
        .client()
        .ok_or_else(|| Error::network("client vanished"))?
        .try_clone_stream()
        .map_err(|e| Error::from_link(&e))?;
    let channel = Box::new(TcpChannel::new(stream).map_err(|e| Error::from_link(&e))?);

    let engine = session.engine;
    let mut reconnector = TcpReconnector::new(&mut *session.state);
    let outcome = match direction {
        Direction::Send => engine.send_file(channel, path, &mut reconnector),
        Direction::Receive => engine.receive_file(channel, path, &mut reconnector),
    };

    if let Some(handle) = reconnector.resumed() {
        session.set_active(handle);
    }
    outcome
}

/// Log how a transfer ended; true when it succeeded
pub(super) fn report(
    what: &str,
    path: &Path,
    session: &Session<'_>,
    outcome: &Result<TransferStats>,
) -> bool {
    match outcome {
        Ok(stats) => {
            info!(
                "{} of {} for client {} finished: {} bytes, {} reconnects, {} retransmits",
                what,
                path.display(),
                session.active(),
                stats.total_bytes,
                stats.reconnects,
                stats.retransmits
            );
            true
        }
        Err(e) => {
            warn!(
                "{} of {} for client {} failed: {}",
                what,
                path.display(),
                session.active(),
                e
            );
            false
        }
    }
}
