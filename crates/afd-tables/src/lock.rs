//! One-byte advisory `fcntl` locks.
//!
//! AFD serialises writers of a shared table entry by locking a single byte at
//! a fixed offset inside that entry. The guard releases the byte on every
//! exit path, including early returns through `?`.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Kind of advisory lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Read,
    Write,
}

/// Held byte-range lock; released on drop.
#[derive(Debug)]
pub struct RegionLock<'a> {
    fd: RawFd,
    offset: u64,
    _file: std::marker::PhantomData<&'a File>,
}

impl<'a> RegionLock<'a> {
    /// Block until the byte at `offset` is locked.
    pub fn acquire(file: &'a File, offset: u64, kind: LockKind) -> io::Result<Self> {
        set_lock(file.as_raw_fd(), offset, lock_type(kind), true)?;
        Ok(Self {
            fd: file.as_raw_fd(),
            offset,
            _file: std::marker::PhantomData,
        })
    }

    /// Lock the byte at `offset` without waiting.
    ///
    /// Returns `ErrorKind::WouldBlock` when another process holds it.
    pub fn try_acquire(file: &'a File, offset: u64, kind: LockKind) -> io::Result<Self> {
        match set_lock(file.as_raw_fd(), offset, lock_type(kind), false) {
            Ok(()) => Ok(Self {
                fd: file.as_raw_fd(),
                offset,
                _file: std::marker::PhantomData,
            }),
            Err(e) if is_contention(&e) => Err(io::Error::new(io::ErrorKind::WouldBlock, e)),
            Err(e) => Err(e),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Drop for RegionLock<'_> {
    fn drop(&mut self) {
        let _ = set_lock(self.fd, self.offset, libc::F_UNLCK as libc::c_short, false);
    }
}

fn lock_type(kind: LockKind) -> libc::c_short {
    match kind {
        LockKind::Read => libc::F_RDLCK as libc::c_short,
        LockKind::Write => libc::F_WRLCK as libc::c_short,
    }
}

/// EAGAIN / EACCES are what F_SETLK reports for a conflicting lock.
fn is_contention(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EAGAIN) | Some(libc::EACCES))
}

fn set_lock(fd: RawFd, offset: u64, l_type: libc::c_short, wait: bool) -> io::Result<()> {
    // Safety: flock is plain data; zeroed is a valid starting value.
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = l_type;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = offset as libc::off_t;
    fl.l_len = 1;

    let cmd = if wait { libc::F_SETLKW } else { libc::F_SETLK };
    loop {
        let ret = unsafe { libc::fcntl(fd, cmd, &fl as *const libc::flock) };
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(err);
    }
}
