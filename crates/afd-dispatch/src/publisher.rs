//! Message FIFO writer.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use afd_config::FifoMode;

/// Sink for encoded batch messages
pub trait Publisher {
    /// Hand one complete message to the daemon.
    fn publish(&mut self, message: &[u8]) -> io::Result<()>;
}

/// The daemon's message FIFO
#[derive(Debug)]
pub struct FifoPublisher {
    writer: File,
    /// Keeps the FIFO open for reading so the write side never sees `ENXIO`.
    _reader: Option<File>,
}

impl FifoPublisher {
    pub fn open(path: &Path, mode: FifoMode) -> io::Result<Self> {
        match mode {
            FifoMode::ReadWrite => {
                let writer = OpenOptions::new().read(true).write(true).open(path)?;
                Ok(Self {
                    writer,
                    _reader: None,
                })
            }
            FifoMode::ReadThenWrite => {
                let reader = OpenOptions::new()
                    .read(true)
                    .custom_flags(libc::O_NONBLOCK)
                    .open(path)?;
                let writer = OpenOptions::new().write(true).open(path)?;
                Ok(Self {
                    writer,
                    _reader: Some(reader),
                })
            }
        }
    }
}

impl Publisher for FifoPublisher {
    /// Messages are below `PIPE_BUF`, so a single `write` is atomic with
    /// respect to other writers. A short write is reported as an error.
    fn publish(&mut self, message: &[u8]) -> io::Result<()> {
        loop {
            match self.writer.write(message) {
                Ok(n) if n == message.len() => return Ok(()),
                Ok(n) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("short FIFO write: {} of {} bytes", n, message.len()),
                    ))
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Collects messages in memory.
impl Publisher for Vec<Vec<u8>> {
    fn publish(&mut self, message: &[u8]) -> io::Result<()> {
        self.push(message.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;
    use std::io::Read;
    use tempfile::tempdir;

    fn roundtrip(mode: FifoMode) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("msg.fifo");
        mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();

        let mut publisher = FifoPublisher::open(&path, mode).unwrap();
        publisher.publish(&[7u8; 40]).unwrap();

        let mut reader = File::open(&path).unwrap();
        let mut buf = [0u8; 40];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [7u8; 40]);
    }

    #[test]
    fn test_read_write_mode() {
        roundtrip(FifoMode::ReadWrite);
    }

    #[test]
    fn test_read_then_write_mode() {
        roundtrip(FifoMode::ReadThenWrite);
    }

    #[test]
    fn test_missing_fifo() {
        let dir = tempdir().unwrap();
        let err = FifoPublisher::open(&dir.path().join("nope"), FifoMode::ReadWrite).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_vec_collects() {
        let mut sink: Vec<Vec<u8>> = Vec::new();
        sink.publish(b"abc").unwrap();
        assert_eq!(sink, vec![b"abc".to_vec()]);
    }
}
