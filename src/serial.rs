use std::io;

use anyhow::Context;
use rppal::uart::{Parity, Uart};

pub const BAUD_RATE: u32 = 9600;
pub const PARITY: Parity = Parity::None;
pub const DATA_BITS: u8 = 8;
pub const STOP_BITS: u8 = 1;

/// Outbound line stream to the host.
#[derive(Debug)]
pub struct SerialPort {
    uart: Uart,
}

impl SerialPort {
    pub fn new() -> Result<SerialPort, anyhow::Error> {
        let mut uart = Uart::new(BAUD_RATE, PARITY, DATA_BITS, STOP_BITS)
            .context("Failed to initialize UART")?;
        uart.set_write_mode(true)
            .context("Failed to set write mode")?;

        Ok(SerialPort { uart })
    }
}

impl io::Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.uart.write(buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.uart.drain().map_err(io::Error::other)
    }
}
