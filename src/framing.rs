//! Line framing for the serial wire: newline-delimited both ways.
//!
//! Outbound, a command becomes its bytes plus a single `\n`. Inbound,
//! [`LineReader`] reassembles whatever the port hands back into complete
//! lines: every `\r` is dropped, `\n` terminates. Partial lines and surplus
//! bytes are carried across calls, so a response split over two reads still
//! counts as one line.

use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use crate::transport::Transport;

/// Structural bound on a single line in either direction.
pub const MAX_LINE_LEN: usize = 255;

/// The only byte that delimits commands and responses on the wire.
pub const LINE_TERMINATOR: u8 = b'\n';

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("firmware line exceeded {MAX_LINE_LEN} bytes ({len} accumulated, discarded)")]
    LineTooLong { len: usize },
    #[error("serial read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Command bytes followed by exactly one terminator. No `\r` is ever
/// emitted.
pub fn frame_command(command: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(command.len() + 1);
    frame.extend_from_slice(command.as_bytes());
    frame.push(LINE_TERMINATOR);
    frame
}

/// Inbound line assembler over a bounded-wait transport.
#[derive(Debug, Default)]
pub struct LineReader {
    /// Received bytes not yet consumed by a complete line.
    buffered: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// One bounded-wait poll for a complete line.
    ///
    /// Returns `Ok(None)` when no full line materialized within `wait`;
    /// callers must treat that as "no line yet", never as end-of-stream.
    /// The returned line excludes the terminator and may be empty (a bare
    /// `\n`), which does not count as an acknowledgment.
    pub async fn poll_line<T: Transport>(
        &mut self,
        transport: &T,
        wait: Duration,
    ) -> Result<Option<String>, FrameError> {
        if let Some(line) = self.take_line()? {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; 64];
        let received = match timeout(wait, transport.recv(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(FrameError::Io(e)),
            Err(_) => return Ok(None),
        };
        if received == 0 {
            return Ok(None);
        }

        for &byte in &chunk[..received] {
            // A CR is not stored, not counted, and never ends the line; the
            // real terminator follows it.
            if byte != b'\r' {
                self.buffered.push(byte);
            }
        }
        self.take_line()
    }

    /// Extract the first complete line from the carry-over buffer, keeping
    /// everything after the terminator for the next call.
    fn take_line(&mut self) -> Result<Option<String>, FrameError> {
        if let Some(pos) = self.buffered.iter().position(|&b| b == LINE_TERMINATOR) {
            let rest = self.buffered.split_off(pos + 1);
            self.buffered.pop();
            let line = String::from_utf8_lossy(&self.buffered).into_owned();
            self.buffered = rest;
            return Ok(Some(line));
        }
        if self.buffered.len() > MAX_LINE_LEN {
            let len = self.buffered.len();
            self.buffered.clear();
            return Err(FrameError::LineTooLong { len });
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_millis(5);

    /// Hands back one scripted chunk per read; stalls forever once empty so
    /// the bounded wait is what returns control.
    struct ChunkTransport {
        chunks: Mutex<VecDeque<Vec<u8>>>,
    }

    impl ChunkTransport {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: Mutex::new(chunks.iter().map(|c| c.to_vec()).collect()),
            }
        }
    }

    #[async_trait]
    impl Transport for ChunkTransport {
        async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let next = self.chunks.lock().unwrap().pop_front();
            match next {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(0)
                }
            }
        }

        async fn send(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
    }

    #[test]
    fn frame_appends_single_terminator() {
        assert_eq!(frame_command("G1 X10"), b"G1 X10\n");
        assert_eq!(frame_command(""), b"\n");
    }

    #[tokio::test]
    async fn crlf_and_lf_decode_identically() {
        for raw in [&b"ok\r\n"[..], &b"ok\n"[..]] {
            let transport = ChunkTransport::new(&[raw]);
            let mut reader = LineReader::new();
            let line = reader.poll_line(&transport, WAIT).await.unwrap();
            assert_eq!(line.as_deref(), Some("ok"));
        }
    }

    #[tokio::test]
    async fn line_split_across_reads_reassembles() {
        let transport = ChunkTransport::new(&[b"o", b"k\r", b"\n"]);
        let mut reader = LineReader::new();
        assert_eq!(reader.poll_line(&transport, WAIT).await.unwrap(), None);
        assert_eq!(reader.poll_line(&transport, WAIT).await.unwrap(), None);
        let line = reader.poll_line(&transport, WAIT).await.unwrap();
        assert_eq!(line.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn two_lines_in_one_read_come_out_separately() {
        let transport = ChunkTransport::new(&[b"ok\nerror:9\n"]);
        let mut reader = LineReader::new();
        let first = reader.poll_line(&transport, WAIT).await.unwrap();
        assert_eq!(first.as_deref(), Some("ok"));
        // Second line was already buffered; no further read needed.
        let second = reader.poll_line(&transport, WAIT).await.unwrap();
        assert_eq!(second.as_deref(), Some("error:9"));
    }

    #[tokio::test]
    async fn quiet_wire_yields_no_line() {
        let transport = ChunkTransport::new(&[]);
        let mut reader = LineReader::new();
        assert_eq!(reader.poll_line(&transport, WAIT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn bare_terminator_is_an_empty_line() {
        let transport = ChunkTransport::new(&[b"\n"]);
        let mut reader = LineReader::new();
        let line = reader.poll_line(&transport, WAIT).await.unwrap();
        assert_eq!(line.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn oversized_line_is_discarded_and_decoding_resumes() {
        let noise = [b'x'; 64];
        let transport = ChunkTransport::new(&[&noise, &noise, &noise, &noise, b"\nok\n"]);
        let mut reader = LineReader::new();

        let mut overflowed = false;
        for _ in 0..8 {
            match reader.poll_line(&transport, WAIT).await {
                Err(FrameError::LineTooLong { len }) => {
                    assert!(len > MAX_LINE_LEN);
                    overflowed = true;
                }
                Ok(None) => {}
                Ok(Some(line)) => {
                    // The tail of the discarded line ends at its terminator;
                    // the next real line still decodes.
                    if line == "ok" {
                        assert!(overflowed);
                        return;
                    }
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        panic!("never recovered an 'ok' line after the oversized one");
    }
}
