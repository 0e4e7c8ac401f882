//! The streaming state machine: wake the controller, stream commands under
//! the receive-buffer window, then drain outstanding acknowledgments.
//!
//! Per command the order is stage, throttle, transmit, poll: the window
//! reserves the command's bytes before the capacity check so the check and
//! the write stay atomic around the throttle wait, and one opportunistic
//! poll after each write picks up acknowledgments without waiting for the
//! next command to discover them.

use tokio::io::AsyncBufRead;
use tokio::time::{Instant, sleep};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::framing::{FrameError, LineReader, MAX_LINE_LEN, frame_command};
use crate::source::CommandSource;
use crate::transport::Transport;
use crate::window::FlowWindow;

/// Sent once before streaming to prod the controller, which may still be
/// booting or may have been up for hours.
pub const WAKE_SEQUENCE: &[u8] = b"\r\n\r\n";

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub lines_read: u64,
    pub commands_sent: u64,
    pub bytes_sent: u64,
    pub comments_skipped: u64,
    pub partial_writes: u64,
    pub acks_ok: u64,
    pub acks_error: u64,
    pub acks_other: u64,
}

impl StreamStats {
    pub fn acks_total(&self) -> u64 {
        self.acks_ok + self.acks_error + self.acks_other
    }
}

/// What a response line looked like. Any non-empty line frees exactly one
/// window entry no matter its kind; the kind only selects the log level and
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckKind {
    Ok,
    Error,
    Other,
}

fn classify(line: &str) -> AckKind {
    if line.eq_ignore_ascii_case("ok") {
        AckKind::Ok
    } else if line.len() >= 5 && line[..5].eq_ignore_ascii_case("error") {
        AckKind::Error
    } else {
        AckKind::Other
    }
}

pub struct StreamController<T: Transport> {
    transport: T,
    config: StreamConfig,
    window: FlowWindow,
    reader: LineReader,
    stats: StreamStats,
}

impl<T: Transport> StreamController<T> {
    pub fn new(transport: T, config: StreamConfig) -> Self {
        Self {
            transport,
            config,
            window: FlowWindow::new(),
            reader: LineReader::new(),
            stats: StreamStats::default(),
        }
    }

    /// Commands still unacknowledged.
    pub fn pending(&self) -> usize {
        self.window.pending_count()
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Drive the whole session: wake, stream to end-of-input, drain.
    pub async fn run<R>(
        &mut self,
        source: &mut CommandSource<R>,
    ) -> Result<StreamStats, StreamError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.wake().await?;
        self.stream(source).await?;
        self.drain().await?;
        Ok(self.stats.clone())
    }

    /// Send the wake sequence and give the firmware its boot grace period.
    /// Nothing is read here; a boot banner arriving later is consumed as an
    /// ordinary response.
    async fn wake(&mut self) -> Result<(), StreamError> {
        tracing::info!("waking controller");
        let written = self.transport.send(WAKE_SEQUENCE).await?;
        if written != WAKE_SEQUENCE.len() {
            tracing::error!("wrote {} of {} wake bytes", written, WAKE_SEQUENCE.len());
            self.stats.partial_writes += 1;
        }
        sleep(self.config.wake_delay()).await;
        Ok(())
    }

    async fn stream<R>(&mut self, source: &mut CommandSource<R>) -> Result<(), StreamError>
    where
        R: AsyncBufRead + Unpin,
    {
        tracing::info!(
            "streaming commands, window capacity {} bytes",
            self.config.capacity
        );
        while let Some(raw) = source.next_line().await? {
            self.stats.lines_read += 1;
            let command = raw.trim();
            if command.is_empty() {
                continue;
            }
            if command.starts_with(';') {
                self.stats.comments_skipped += 1;
                tracing::trace!("skipping comment at line {}", source.line_number());
                continue;
            }

            let len = command.len();
            let max = (self.config.capacity - 1).min(MAX_LINE_LEN);
            if len > max {
                return Err(StreamError::CommandTooLong {
                    line: source.line_number(),
                    len,
                    max,
                });
            }

            self.window.stage(len);
            self.throttle().await?;
            self.transmit(command).await?;
            self.poll_ack().await?;
        }
        tracing::info!(
            "end of input: {} lines read, {} commands sent",
            self.stats.lines_read,
            self.stats.commands_sent
        );
        Ok(())
    }

    /// Consume acknowledgments until the staged total fits under the
    /// capacity threshold. Aborts if the controller stays silent past the
    /// ack deadline.
    async fn throttle(&mut self) -> Result<(), StreamError> {
        let mut last_ack = Instant::now();
        while self.window.total() >= self.config.capacity {
            if self.poll_ack().await? {
                last_ack = Instant::now();
            } else if last_ack.elapsed() >= self.config.ack_deadline() {
                return Err(StreamError::AckTimeout {
                    waited: self.config.ack_deadline(),
                    pending: self.window.pending_count(),
                });
            }
        }
        Ok(())
    }

    async fn transmit(&mut self, command: &str) -> Result<(), StreamError> {
        let frame = frame_command(command);
        let written = self.transport.send(&frame).await?;
        if written != frame.len() {
            // Not retried; the window keeps accounting for the full length,
            // which is the documented desync risk of a short write.
            tracing::error!(
                "partial write: {} of {} bytes for '{}'",
                written,
                frame.len(),
                command
            );
            self.stats.partial_writes += 1;
        }
        self.stats.commands_sent += 1;
        self.stats.bytes_sent += written as u64;
        tracing::debug!(
            "sent '{}' ({} bytes / {} commands in flight)",
            command,
            self.window.total(),
            self.window.pending_count()
        );
        Ok(())
    }

    /// After end-of-input, wait out the in-flight commands. Stops at the
    /// configured residual since the final responses are often missed, and
    /// writes the rest off if the controller goes quiet past the drain
    /// deadline. Never fails the run.
    async fn drain(&mut self) -> Result<(), StreamError> {
        let residual = self.config.drain_residual;
        if self.window.pending_count() > residual {
            tracing::info!(
                "draining {} outstanding commands (stopping at {})",
                self.window.pending_count(),
                residual
            );
        }
        let mut last_ack = Instant::now();
        while self.window.pending_count() > residual {
            if self.poll_ack().await? {
                last_ack = Instant::now();
            } else if last_ack.elapsed() >= self.config.drain_deadline() {
                tracing::warn!(
                    "gave up waiting for the last {} acknowledgments",
                    self.window.pending_count()
                );
                break;
            }
        }
        tracing::info!(
            "drain complete, {} unacknowledged",
            self.window.pending_count()
        );
        Ok(())
    }

    /// One bounded-wait poll. Returns true when a response line was
    /// consumed. Empty lines and timeouts are not responses; an oversized
    /// firmware line is discarded with a warning.
    async fn poll_ack(&mut self) -> Result<bool, StreamError> {
        let polled = self
            .reader
            .poll_line(&self.transport, self.config.read_timeout())
            .await;
        let line = match polled {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(false),
            Err(FrameError::LineTooLong { len }) => {
                tracing::warn!("discarding oversized firmware line ({} bytes)", len);
                return Ok(false);
            }
            Err(FrameError::Io(e)) => return Err(StreamError::Io(e)),
        };
        if line.is_empty() {
            return Ok(false);
        }

        match classify(&line) {
            AckKind::Ok => {
                self.stats.acks_ok += 1;
                tracing::trace!("ack '{}'", line);
            }
            AckKind::Error => {
                self.stats.acks_error += 1;
                tracing::warn!("controller reported '{}'", line);
            }
            AckKind::Other => {
                self.stats.acks_other += 1;
                tracing::debug!("controller said '{}'", line);
            }
        }
        if self.window.acknowledge().is_none() {
            // Chatter with nothing outstanding (status reports, banners).
            tracing::debug!("response with no command in flight");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_grbl_responses() {
        assert_eq!(classify("ok"), AckKind::Ok);
        assert_eq!(classify("OK"), AckKind::Ok);
        assert_eq!(classify("error:20"), AckKind::Error);
        assert_eq!(classify("error: Unsupported command"), AckKind::Error);
        assert_eq!(classify("Grbl 1.1f ['$' for help]"), AckKind::Other);
        assert_eq!(classify("ALARM:1"), AckKind::Other);
        assert_eq!(classify("err"), AckKind::Other);
    }
}
