use std::io::ErrorKind;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::debug;
use uart_capture::{LineSource, ReaderLineSource, SourceError, SourceLine};

/// Serial port as a [`LineSource`], 8N1.
pub struct SerialLineSource {
    lines: ReaderLineSource<Box<dyn SerialPort>>,
    read_timeout: Duration,
}

impl SerialLineSource {
    pub fn open(path: &str, baud: u32, read_timeout: Duration) -> Result<Self, serialport::Error> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(read_timeout)
            .open()?;

        // Stale bytes from before the capture started are not worth failing over.
        if let Err(err) = port.clear(ClearBuffer::Input) {
            debug!("could not clear serial input buffer: {err}");
        }

        Ok(Self {
            lines: ReaderLineSource::new(port),
            read_timeout,
        })
    }
}

impl LineSource for SerialLineSource {
    fn next_line(&mut self, timeout: Duration) -> Result<SourceLine, SourceError> {
        if timeout != self.read_timeout && !timeout.is_zero() {
            self.lines
                .get_mut()
                .set_timeout(timeout)
                .map_err(|err| SourceError::Io(err.into()))?;
            self.read_timeout = timeout;
        }
        match self.lines.next_line(timeout) {
            // A serial port has no end of stream; zero bytes means the device went away.
            Ok(SourceLine::End) => Err(SourceError::Disconnected),
            Err(SourceError::Io(err))
                if matches!(err.kind(), ErrorKind::BrokenPipe | ErrorKind::NotConnected) =>
            {
                Err(SourceError::Disconnected)
            }
            other => other,
        }
    }

    fn oversized_lines(&self) -> u64 {
        self.lines.oversized_lines()
    }
}
