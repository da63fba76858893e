//! Kernel log device handle.
//!
//! `/dev/kmsg` is opened read-only and non-blocking and registered with the
//! tokio reactor for read readiness only. Every `read(2)` on it returns at
//! most one record, so the read buffer must be large enough for the longest
//! record the kernel produces.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tokio::io::unix::AsyncFd;

/// Outcome of a single non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// The reader position was overwritten in the ring buffer (`EPIPE`).
    /// The next read continues with the oldest available record.
    Overrun,
    /// Zero-length read: the writer side is gone.
    EndOfStream,
    /// Nothing left to read until the next readiness notification.
    WouldBlock,
}

/// Non-blocking, reactor-registered kernel log reader.
#[derive(Debug)]
pub struct KmsgDevice {
    fd: AsyncFd<File>,
    path: PathBuf,
}

impl KmsgDevice {
    /// Open the device `O_RDONLY | O_NONBLOCK`.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        Self::from_file(file, path)
    }

    /// Wrap an already opened, non-blocking descriptor.
    ///
    /// The descriptor must be pollable (character device, pipe or socket).
    /// Regular files are rejected by epoll.
    pub fn from_file(file: File, path: impl Into<PathBuf>) -> io::Result<Self> {
        // SAFETY: the `File` is owned by the `AsyncFd`, so its descriptor stays
        // open and unchanged until the `AsyncFd` is dropped
        let fd = unsafe { AsyncFd::register_with_interest(file, tokio::io::Interest::READABLE)? };
        Ok(Self {
            fd,
            path: path.into(),
        })
    }

    /// Device path (for diagnostics).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the reactor reports the device readable.
    pub async fn readable(&self) -> io::Result<ReadGuard<'_>> {
        let guard = self.fd.readable().await?;
        Ok(ReadGuard { guard })
    }
}

/// Readiness guard from [`KmsgDevice::readable`].
pub struct ReadGuard<'a> {
    guard: tokio::io::unix::AsyncFdReadyGuard<'a, File>,
}

impl ReadGuard<'_> {
    /// Perform one non-blocking read.
    ///
    /// When the read would block the readiness flag is cleared so the next
    /// [`KmsgDevice::readable`] waits for the reactor again.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        loop {
            let result = self.guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(buf)
            });
            match result {
                Err(_would_block) => return Ok(ReadOutcome::WouldBlock),
                Ok(Ok(0)) => return Ok(ReadOutcome::EndOfStream),
                Ok(Ok(n)) => return Ok(ReadOutcome::Data(n)),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) if e.raw_os_error() == Some(libc::EPIPE) => {
                    return Ok(ReadOutcome::Overrun);
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    fn socket_device() -> (KmsgDevice, UnixStream) {
        let (reader, writer) = UnixStream::pair().unwrap();
        reader.set_nonblocking(true).unwrap();
        let file = File::from(std::os::fd::OwnedFd::from(reader));
        (KmsgDevice::from_file(file, "<socketpair>").unwrap(), writer)
    }

    #[tokio::test]
    async fn reads_data_then_would_block() {
        let (device, mut writer) = socket_device();
        writer.write_all(b"6,0,0,-;hello\n").unwrap();

        let mut buf = [0u8; 64];
        let mut guard = device.readable().await.unwrap();
        assert_eq!(guard.read(&mut buf).unwrap(), ReadOutcome::Data(14));
        assert_eq!(&buf[..14], b"6,0,0,-;hello\n");
        assert_eq!(guard.read(&mut buf).unwrap(), ReadOutcome::WouldBlock);
    }

    #[tokio::test]
    async fn closed_writer_is_end_of_stream() {
        let (device, writer) = socket_device();
        drop(writer);

        let mut buf = [0u8; 64];
        let mut guard = device.readable().await.unwrap();
        assert_eq!(guard.read(&mut buf).unwrap(), ReadOutcome::EndOfStream);
    }

    #[tokio::test]
    async fn open_missing_device_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(KmsgDevice::open(dir.path().join("kmsg")).is_err());
    }

    #[tokio::test]
    async fn regular_file_is_not_pollable() {
        let file = tempfile::tempfile().unwrap();
        assert!(KmsgDevice::from_file(file, "<tempfile>").is_err());
    }
}
