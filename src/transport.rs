//! The duplex byte stream to the controller, behind a trait so tests can
//! script the firmware side.

use std::io;

use async_trait::async_trait;
use serial2_tokio::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

use crate::config::StreamConfig;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Read whatever bytes have arrived into `buf`. Blocks until at least
    /// one byte is available; callers impose the bounded wait.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `buf`, returning how many bytes the device accepted. A short
    /// count is the caller's problem to report.
    async fn send(&self, buf: &[u8]) -> io::Result<usize>;
}

#[async_trait]
impl Transport for SerialPort {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf).await
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf).await
    }
}

/// Open and configure the serial device: raw mode, 8 data bits, 1 stop bit,
/// no flow control in either direction, baud and parity from the config.
pub fn open_port(path: &str, config: &StreamConfig) -> io::Result<SerialPort> {
    let baud = config.baud;
    let parity = match config.parity.as_str() {
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        // validate() has already rejected anything else
        _ => Parity::None,
    };
    SerialPort::open(path, move |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(baud)?;
        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::One);
        settings.set_parity(parity);
        settings.set_flow_control(FlowControl::None);
        Ok(settings)
    })
}
