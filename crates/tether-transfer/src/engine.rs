//! Chunked, resumable transfer engine
//!
//! The engine is stop-and-wait: every frame it sends is answered by exactly one frame
//! from the peer, and an unanswered frame is retransmitted after the I/O timeout. A
//! session always starts with `META` from the sender and `OFFSET` from the receiver, so
//! when the link breaks and the [`Reconnect`] capability provides a new channel, both
//! sides simply start a new session and the receiver's offset says where to continue.

use crate::frame::Frame;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;
use tether_config::TransferConfig;
use tether_types::{Channel, Error, Reconnect, Result, TransferEngine, TransferStats};
use tracing::{debug, info, trace, warn};

/// Tuning knobs of the [`ChunkedEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Payload bytes per data frame
    pub chunk_size: usize,
    /// Read timeout before a frame is retransmitted
    pub io_timeout: Duration,
    /// Retransmissions of one frame before the link counts as broken
    pub max_retries: u32,
    /// How long to wait for the peer to come back after the link broke
    pub reconnect_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&TransferConfig::default())
    }
}

impl From<&TransferConfig> for EngineOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            io_timeout: config.io_timeout(),
            max_retries: config.max_retries,
            reconnect_timeout: config.reconnect_timeout(),
        }
    }
}

/// Stop-and-wait engine that resumes from the receiver's offset after a reconnection
#[derive(Debug, Clone, Default)]
pub struct ChunkedEngine {
    options: EngineOptions,
}

impl ChunkedEngine {
    /// Create an engine with the given options
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Engine options
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn send_session(
        &self,
        channel: &mut dyn Channel,
        file: &mut File,
        path: &Path,
        size: u64,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let meta = Frame::Meta { size }.encode();
        let mut position = self.exchange(channel, Some(&meta[..]), stats, |frame| match frame {
            Frame::Offset { offset } => Some(offset),
            _ => None,
        })?;

        if position > size {
            return Err(Error::other(format!(
                "peer claims {} bytes of a {} byte file",
                position, size
            )));
        }
        if position > 0 {
            info!("Peer already holds {} of {} bytes", position, size);
        }

        let mut chunk = vec![0u8; self.options.chunk_size];
        while position < size {
            let len = (size - position).min(self.options.chunk_size as u64) as usize;
            file.seek(SeekFrom::Start(position))
                .and_then(|_| file.read_exact(&mut chunk[..len]))
                .map_err(|e| Error::from_file(e, path))?;

            let data = Frame::Data {
                offset: position,
                payload: chunk[..len].to_vec(),
            }
            .encode();
            let next = self.exchange(channel, Some(&data[..]), stats, |frame| match frame {
                Frame::Ack { next } if next > position => Some(next),
                _ => None,
            })?;

            if next > size {
                return Err(Error::other(format!(
                    "peer acknowledged {} bytes of a {} byte file",
                    next, size
                )));
            }
            stats.bytes_sent += len as u64;
            position = next;
        }

        Ok(())
    }

    fn receive_session(
        &self,
        channel: &mut dyn Channel,
        file: &mut File,
        path: &Path,
        written: &mut u64,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let size = self.exchange(channel, None, stats, |frame| match frame {
            Frame::Meta { size } => Some(size),
            _ => None,
        })?;

        if size < *written {
            return Err(Error::other(format!(
                "peer announced {} bytes but {} are already stored",
                size, written
            )));
        }
        stats.total_bytes = size;

        let mut reply = Frame::Offset { offset: *written }.encode();
        while *written < size {
            let frame = self.exchange(channel, Some(&reply[..]), stats, |frame| match frame {
                Frame::Data { .. } | Frame::Meta { .. } => Some(frame),
                _ => None,
            })?;

            match frame {
                Frame::Data { offset, payload } => {
                    if offset == *written {
                        let end = *written + payload.len() as u64;
                        if end > size {
                            return Err(Error::other(format!(
                                "chunk at {} runs past the announced {} bytes",
                                offset, size
                            )));
                        }
                        file.write_all(&payload)
                            .map_err(|e| Error::from_file(e, path))?;
                        *written = end;
                        stats.bytes_sent += payload.len() as u64;
                    }
                    reply = Frame::Ack { next: *written }.encode();
                }
                // The sender restarted its session without us noticing the break
                _ => reply = Frame::Offset { offset: *written }.encode(),
            }
        }

        channel.send_frame(&reply)?;
        file.flush().map_err(|e| Error::from_file(e, path))
    }

    /// Send `request` (if any) and wait for a frame `accept` takes, retransmitting on timeout
    fn exchange<T>(
        &self,
        channel: &mut dyn Channel,
        request: Option<&[u8]>,
        stats: &mut TransferStats,
        mut accept: impl FnMut(Frame) -> Option<T>,
    ) -> Result<T> {
        if let Some(request) = request {
            channel.send_frame(request)?;
        }

        let mut attempts = 0;
        loop {
            match channel.recv_frame() {
                Ok(raw) => match Frame::decode(&raw) {
                    Ok(Frame::Abort { reason }) => return Err(Error::Aborted { reason }),
                    Ok(frame) => {
                        trace!("Received {} from {}", frame, channel.describe());
                        if let Some(value) = accept(frame) {
                            return Ok(value);
                        }
                    }
                    Err(e) => debug!("Ignoring frame from {}: {}", channel.describe(), e),
                },
                Err(Error::Timeout) if attempts < self.options.max_retries => {
                    attempts += 1;
                    if let Some(request) = request {
                        debug!(
                            "No answer from {}, retransmitting ({}/{})",
                            channel.describe(),
                            attempts,
                            self.options.max_retries
                        );
                        stats.retransmits += 1;
                        channel.send_frame(request)?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Decide whether a failed session may continue on a new channel
    fn recover(
        &self,
        link: &mut Link,
        error: Error,
        reconnect: &mut dyn Reconnect,
        stats: &mut TransferStats,
    ) -> Result<()> {
        if !error.is_recoverable() {
            if !matches!(error, Error::Aborted { .. }) {
                abort(link.channel.as_mut(), &error);
            }
            return Err(error);
        }

        warn!(
            "Link to {} broke: {}; waiting up to {:?} for the peer",
            link.channel.describe(),
            error,
            self.options.reconnect_timeout
        );

        match reconnect.reconnect(self.options.reconnect_timeout) {
            Some(channel) => {
                stats.reconnects += 1;
                link.replace(channel, self.options.io_timeout)?;
                info!("Resuming transfer on {}", link.channel.describe());
                Ok(())
            }
            None => Err(error),
        }
    }
}

impl TransferEngine for ChunkedEngine {
    fn send_file(
        &self,
        channel: Box<dyn Channel>,
        path: &Path,
        reconnect: &mut dyn Reconnect,
    ) -> Result<TransferStats> {
        let mut link = Link::open(channel, self.options.io_timeout)?;

        let opened = File::open(path).and_then(|file| {
            let size = file.metadata()?.len();
            Ok((file, size))
        });
        let (mut file, size) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                let error = Error::from_file(e, path);
                abort(link.channel.as_mut(), &error);
                return Err(error);
            }
        };

        debug!(
            "Sending {} ({} bytes) to {}",
            path.display(),
            size,
            link.channel.describe()
        );

        let mut stats = TransferStats::new(size);
        loop {
            match self.send_session(link.channel.as_mut(), &mut file, path, size, &mut stats) {
                Ok(()) => return Ok(stats),
                Err(error) => self.recover(&mut link, error, reconnect, &mut stats)?,
            }
        }
    }

    fn receive_file(
        &self,
        channel: Box<dyn Channel>,
        path: &Path,
        reconnect: &mut dyn Reconnect,
    ) -> Result<TransferStats> {
        let mut link = Link::open(channel, self.options.io_timeout)?;

        let mut file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                let error = Error::from_file(e, path);
                abort(link.channel.as_mut(), &error);
                return Err(error);
            }
        };

        debug!(
            "Receiving {} from {}",
            path.display(),
            link.channel.describe()
        );

        let mut written = 0;
        let mut stats = TransferStats::default();
        loop {
            match self.receive_session(
                link.channel.as_mut(),
                &mut file,
                path,
                &mut written,
                &mut stats,
            ) {
                Ok(()) => return Ok(stats),
                Err(error) => self.recover(&mut link, error, reconnect, &mut stats)?,
            }
        }
    }
}

/// The channel a transfer currently runs on; its read timeout is cleared when it is let go
struct Link {
    channel: Box<dyn Channel>,
}

impl Link {
    fn open(channel: Box<dyn Channel>, io_timeout: Duration) -> Result<Self> {
        let mut link = Self { channel };
        link.channel.set_read_timeout(Some(io_timeout))?;
        Ok(link)
    }

    fn replace(&mut self, channel: Box<dyn Channel>, io_timeout: Duration) -> Result<()> {
        let _ = self.channel.set_read_timeout(None);
        self.channel = channel;
        self.channel.set_read_timeout(Some(io_timeout))
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        let _ = self.channel.set_read_timeout(None);
    }
}

fn abort(channel: &mut dyn Channel, error: &Error) {
    let frame = Frame::Abort {
        reason: error.to_string(),
    }
    .encode();
    if let Err(e) = channel.send_frame(&frame) {
        debug!("Could not deliver abort to {}: {}", channel.describe(), e);
    }
}
