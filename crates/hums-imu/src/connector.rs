//! Serial device access

use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::error::ImuError;

/// Opens the sensor's serial stream
pub trait SerialConnector: Send + Sync {
    /// Whether the device node exists
    fn is_present(&self) -> bool;

    /// Open the device; reads time out with `ErrorKind::TimedOut` when idle
    fn open(&self) -> Result<Box<dyn Read + Send>, ImuError>;
}

/// Serial port connector backed by the `serialport` crate
pub struct SerialPortConnector {
    path: PathBuf,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialPortConnector {
    pub fn new(path: impl Into<PathBuf>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
        }
    }
}

impl SerialConnector for SerialPortConnector {
    fn is_present(&self) -> bool {
        self.path.exists()
    }

    fn open(&self) -> Result<Box<dyn Read + Send>, ImuError> {
        let path = self.path.to_string_lossy();
        let port = serialport::new(path.as_ref(), self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| ImuError::Connection(format!("{}: {}", path, e)))?;

        // Drop whatever queued up while nobody was reading
        if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
            debug!(port = %path, error = %e, "Could not clear serial input buffer");
        }
        Ok(Box::new(port))
    }
}

/// Assembles complete lines from a serial stream with read timeouts
///
/// Bytes received before a timeout are kept until the rest of the line
/// arrives.
pub struct LineAssembler<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read> LineAssembler<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
        }
    }

    /// Next complete line (trimmed), or `None` if the read timed out first
    ///
    /// End of stream means the device went away.
    pub fn next_line(&mut self) -> Result<Option<String>, ImuError> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Err(ImuError::Connection("serial stream closed".to_string())),
            Ok(_) if self.pending.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                Ok(Some(line))
            }
            Ok(_) => Ok(None),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(ImuError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Serves one chunk per read, then times out
    struct Chunks(VecDeque<Vec<u8>>);

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
            }
        }
    }

    #[test]
    fn test_line_split_across_timeouts() {
        let chunks = Chunks(VecDeque::from(vec![b"1,2,3,".to_vec()]));
        let mut lines = LineAssembler::new(chunks);
        assert_eq!(lines.next_line().unwrap(), None);

        lines.reader.get_mut().0.push_back(b"4,5,6,7,8\r\n9".to_vec());
        assert_eq!(
            lines.next_line().unwrap().as_deref(),
            Some("1,2,3,4,5,6,7,8")
        );
        assert_eq!(lines.next_line().unwrap(), None);
    }

    #[test]
    fn test_end_of_stream_is_connection_error() {
        let mut lines = LineAssembler::new(io::Cursor::new(b"a,b\n".to_vec()));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("a,b"));
        assert!(matches!(lines.next_line(), Err(ImuError::Connection(_))));
    }
}
