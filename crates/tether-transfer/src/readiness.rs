//! Readiness waiting over raw socket descriptors
//!
//! The server rebuilds its interest set on every turn, so sources are registered right
//! before a poll and deregistered right after it. Nothing stays registered between turns,
//! which keeps the semantics level-triggered even though the OS queue is edge-triggered.

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// Reusable poller for one-shot readiness waits
pub struct ReadinessSet {
    poll: Poll,
    events: Events,
}

impl std::fmt::Debug for ReadinessSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessSet").finish_non_exhaustive()
    }
}

impl ReadinessSet {
    /// Create a new poller
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(64),
        })
    }

    /// Wait until at least one of `fds` is readable and return the readable ones, in the
    /// order they were given.
    ///
    /// `None` waits indefinitely. An elapsed timeout yields an empty list.
    pub fn wait(&mut self, fds: &[RawFd], timeout: Option<Duration>) -> io::Result<Vec<RawFd>> {
        if self.events.capacity() < fds.len() {
            self.events = Events::with_capacity(fds.len());
        }

        for (index, fd) in fds.iter().enumerate() {
            if let Err(e) = self
                .poll
                .registry()
                .register(&mut SourceFd(fd), Token(index), Interest::READABLE)
            {
                self.deregister(&fds[..index]);
                return Err(e);
            }
        }

        let outcome = self.poll.poll(&mut self.events, timeout);
        self.deregister(fds);
        outcome?;

        let mut readable = vec![false; fds.len()];
        for event in self.events.iter() {
            if let Some(slot) = readable.get_mut(event.token().0) {
                *slot = true;
            }
        }

        Ok(fds
            .iter()
            .zip(readable)
            .filter_map(|(fd, ready)| ready.then_some(*fd))
            .collect())
    }

    fn deregister(&self, fds: &[RawFd]) {
        for fd in fds {
            let _ = self.poll.registry().deregister(&mut SourceFd(fd));
        }
    }
}

/// Wait up to `timeout` for `fd` to become readable.
///
/// Interrupted waits resume with whatever time is left.
pub fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut set = ReadinessSet::new()?;
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match set.wait(&[fd], Some(remaining)) {
            Ok(ready) => return Ok(!ready.is_empty()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
