//! Serial G-code streamer for GRBL-class motion controllers.
//!
//! The firmware on the other end of the wire holds incoming commands in a
//! small fixed-size receive buffer and answers each processed line with a
//! response line. This crate keeps that buffer as full as possible without
//! overflowing it: every sent command's byte length is recorded in a FIFO
//! window ([`FlowWindow`]), transmission stalls while the window total sits
//! at the capacity threshold, and each response line frees the oldest entry.
//! Sends are pipelined ahead of acknowledgments instead of waiting one
//! command at a time.

pub mod config;
pub mod controller;
pub mod error;
pub mod framing;
pub mod source;
pub mod transport;
pub mod window;

pub use config::StreamConfig;
pub use controller::{StreamController, StreamStats};
pub use error::StreamError;
pub use transport::Transport;
pub use window::FlowWindow;
