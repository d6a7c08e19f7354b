//! Anonymous memfd-backed objects.
//!
//! The name is only a label. Same-process opens resolve it through a
//! process-global registry; other processes open the mapping by its
//! `/proc/<pid>/fd/<n>` path. Either way the second opener gets a
//! read-only descriptor.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use rustix::fs::{MemfdFlags, Mode, OFlags};

use mring_core::{RingError, RingResult};

/// Registry tracking labels created by this process.
static REGISTRY: Lazy<Mutex<HashMap<String, RawFd>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn create(label: &str, total: usize) -> RingResult<OwnedFd> {
    if exists(label) {
        return Err(RingError::AlreadyExists(label.to_string()));
    }
    let fd = rustix::fs::memfd_create(label, MemfdFlags::CLOEXEC)
        .map_err(|e| crate::shm::map_errno(e, label))?;
    rustix::fs::ftruncate(&fd, total as u64).map_err(|e| crate::shm::map_errno(e, label))?;

    let mut registry = REGISTRY.lock().unwrap();
    registry.insert(label.to_string(), fd.as_raw_fd());
    Ok(fd)
}

/// Opens a label created by this process. The descriptor is read-only;
/// secondary memfd openers never get write access.
pub(crate) fn open_label(label: &str) -> RingResult<OwnedFd> {
    let raw = {
        let registry = REGISTRY.lock().unwrap();
        registry
            .get(label)
            .copied()
            .ok_or_else(|| RingError::DoesNotExist(label.to_string()))?
    };
    open_path(&proc_fd_path(std::process::id(), raw))
}

/// Opens a `/proc/<pid>/fd/<n>` path exported by the creating process.
pub(crate) fn open_path(path: &str) -> RingResult<OwnedFd> {
    rustix::fs::open(path, OFlags::RDONLY, Mode::empty())
        .map_err(|e| crate::shm::map_errno(e, path))
}

pub(crate) fn exists(label: &str) -> bool {
    REGISTRY.lock().unwrap().contains_key(label)
}

pub(crate) fn forget(label: &str) {
    if let Ok(mut registry) = REGISTRY.lock() {
        registry.remove(label);
    }
}

/// Path under which other processes can open descriptor `fd` of process
/// `pid`. The object stays alive as long as the creating process holds the
/// descriptor.
pub fn proc_fd_path(pid: u32, fd: RawFd) -> String {
    format!("/proc/{pid}/fd/{fd}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_lifecycle() {
        let label = format!("mring-memfd-test-{}", std::process::id());
        assert!(!exists(&label));
        let fd = create(&label, 4096).unwrap();
        assert!(exists(&label));
        assert!(matches!(
            create(&label, 4096),
            Err(RingError::AlreadyExists(_))
        ));
        forget(&label);
        assert!(!exists(&label));
        drop(fd);
    }

    #[test]
    fn test_open_unknown_label() {
        assert!(matches!(
            open_label("mring-memfd-test-unknown"),
            Err(RingError::DoesNotExist(_))
        ));
    }

    #[test]
    fn test_proc_fd_path_format() {
        assert_eq!(proc_fd_path(123, 4), "/proc/123/fd/4");
    }
}
