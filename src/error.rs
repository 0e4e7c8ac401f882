//! Errors surfaced by the streaming pipeline.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The command file could not be opened. Fatal before any byte is sent.
    #[error("error opening {}: {source}", path.display())]
    OpenSource { path: PathBuf, source: io::Error },

    /// The serial device could not be opened or configured. Fatal before
    /// any byte is sent.
    #[error("error opening {path}: {source}")]
    OpenDevice { path: String, source: io::Error },

    /// A hard transport failure mid-stream (device gone, not a timeout).
    #[error("serial I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A command that could never fit under the capacity threshold. Refused
    /// outright rather than truncated or left to stall the window forever.
    #[error("command at line {line} is {len} bytes, over the {max} byte limit")]
    CommandTooLong { line: u64, len: usize, max: usize },

    /// The controller went silent while transmission was throttled.
    #[error("no response from the controller for {waited:?} with {pending} commands outstanding")]
    AckTimeout { waited: Duration, pending: usize },

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
