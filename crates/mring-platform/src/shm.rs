//! POSIX named shared memory objects.

use std::os::fd::OwnedFd;

use rustix::fs::Mode;
use rustix::io::Errno;
use rustix::shm::{self, ShmOFlags};

use mring_core::{RingError, RingResult};

use crate::Access;

/// Shared memory names carry a leading `/` and no interior `/`.
pub(crate) fn validate_name(name: &str) -> RingResult<()> {
    if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
        return Err(RingError::Platform(format!(
            "Invalid shared memory name: {name}"
        )));
    }
    Ok(())
}

/// Creates the backing object with create-exclusive semantics, mode 0666,
/// sized to `total` bytes.
pub(crate) fn create(name: &str, total: usize) -> RingResult<OwnedFd> {
    validate_name(name)?;
    let fd = shm::shm_open(
        name,
        ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
        Mode::from_bits_truncate(0o666),
    )
    .map_err(|e| map_errno(e, name))?;
    rustix::fs::ftruncate(&fd, total as u64).map_err(|e| map_errno(e, name))?;
    Ok(fd)
}

pub(crate) fn open(name: &str, access: Access) -> RingResult<OwnedFd> {
    validate_name(name)?;
    let flags = match access {
        Access::ReadWrite => ShmOFlags::RDWR,
        Access::ReadOnly => ShmOFlags::RDONLY,
    };
    shm::shm_open(name, flags, Mode::empty()).map_err(|e| map_errno(e, name))
}

pub(crate) fn exists(name: &str) -> bool {
    shm::shm_open(name, ShmOFlags::RDONLY, Mode::empty()).is_ok()
}

/// Removes the name from the shm namespace. An already-unlinked object is
/// not an error.
pub(crate) fn unlink(name: &str) -> RingResult<()> {
    match shm::shm_unlink(name) {
        Ok(()) | Err(Errno::NOENT) => Ok(()),
        Err(e) => Err(map_errno(e, name)),
    }
}

pub(crate) fn map_errno(e: Errno, name: &str) -> RingError {
    match e {
        Errno::EXIST => RingError::AlreadyExists(name.to_string()),
        Errno::NOENT => RingError::DoesNotExist(name.to_string()),
        Errno::ACCESS => RingError::AccessDenied(name.to_string()),
        Errno::NAMETOOLONG => RingError::NameTooLong(name.to_string()),
        Errno::MFILE | Errno::NFILE => RingError::FdQuotaExceeded,
        other => RingError::Platform(format!("{name}: errno {}", other.raw_os_error())),
    }
}
