//! File transfers over the shared UDP socket
//!
//! The command, the download acknowledgement and the final reply still travel over the
//! client's TCP connection; only the file content goes through UDP.

use super::transfer::{
    report, Direction, DOWNLOADED, DOWNLOAD_FAILED, UPLOADED, UPLOAD_FAILED,
};
use super::Session;
use crate::reconnect::UdpReconnector;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;
use std::time::Duration;
use tether_transfer::{UdpChannel, RENDEZVOUS_SIGNAL};
use tether_types::{Error, Result, TransferStats};
use tracing::{debug, trace};

pub(super) fn download(session: &mut Session<'_>, argument: &[u8]) {
    let path = session.settings.resolve(argument);
    let outcome = run_over_udp(session, &path, Direction::Send);
    let acked = session.read_ack();

    let succeeded = report("UDP download", &path, session, &outcome) && acked;
    session.reply(if succeeded { DOWNLOADED } else { DOWNLOAD_FAILED });
}

pub(super) fn upload(session: &mut Session<'_>, argument: &[u8]) {
    let path = session.settings.resolve(argument);
    let outcome = run_over_udp(session, &path, Direction::Receive);

    let succeeded = report("UDP upload", &path, session, &outcome);
    session.reply(if succeeded { UPLOADED } else { UPLOAD_FAILED });
}

fn run_over_udp(
    session: &mut Session<'_>,
    path: &Path,
    direction: Direction,
) -> Result<TransferStats> {
    let udp = &session.state.udp;
    let peer =
        rendezvous(udp, session.settings.client_timeout).map_err(|e| Error::from_link(&e))?;
    debug!("Client {} transfers over UDP from {}", session.active(), peer);

    let socket = udp.try_clone().map_err(|e| Error::from_link(&e))?;
    let channel = Box::new(UdpChannel::new(socket, peer));

    let engine = session.engine;
    let mut reconnector = UdpReconnector::new(&mut *session.state);
    match direction {
        Direction::Send => engine.send_file(channel, path, &mut reconnector),
        Direction::Receive => engine.receive_file(channel, path, &mut reconnector),
    }
}

/// Wait for the one-byte signal that tells us where the client's datagrams come from
fn rendezvous(udp: &UdpSocket, timeout: Option<Duration>) -> io::Result<SocketAddr> {
    udp.set_read_timeout(timeout)?;

    let mut buf = [0u8; 64];
    let found = loop {
        match udp.recv_from(&mut buf) {
            Ok((1, peer)) if buf[0] == RENDEZVOUS_SIGNAL => break Ok(peer),
            Ok((len, from)) => {
                trace!("Skipping {} byte datagram from {} before rendezvous", len, from);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => break Err(e),
        }
    };

    udp.set_read_timeout(None)?;
    found
}
