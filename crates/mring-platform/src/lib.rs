//! Platform mappers for mirrored ring buffers.
//!
//! A [`RingMapping`] is a named backing object whose buffer region is
//! mapped twice into one contiguous virtual reservation: header, primary
//! buffer, and a mirror view whose first byte immediately follows the
//! primary's last byte. One implementation per platform family is selected
//! by conditional compilation:
//!
//! - **POSIX shm** (all unix): names with a leading `/` and no interior
//!   `/`, created with `shm_open` and aliased with a `MAP_FIXED` mapping.
//! - **memfd** (Linux, Android, FreeBSD): any other name is an anonymous
//!   object's label. Same-process opens resolve the label through a
//!   process-global registry; other processes open the mapping by its
//!   `/proc/<pid>/fd/<n>` path. Secondary memfd openers are always
//!   read-only.
//! - **Windows**: named page-backed sections, mirrored by splitting a
//!   NOACCESS placeholder reservation and replacing each piece with a
//!   `MapViewOfFile3` view.
//!
//! # Supported Platforms
//!
//! - **Linux / Android / FreeBSD**: memfd and POSIX shm
//! - **Other unix** (macOS, ...): POSIX shm only
//! - **Windows**: placeholder-based file mappings

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub(crate) mod memfd;
#[cfg(unix)]
pub(crate) mod shm;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use once_cell::sync::Lazy;

/// Access mode requested when opening an existing backing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[cfg(unix)]
fn probe_page_size() -> usize {
    rustix::param::page_size()
}

// On POSIX the allocation granularity for mapping base addresses is the
// page size.
#[cfg(unix)]
fn probe_allocation_granularity() -> usize {
    rustix::param::page_size()
}

#[cfg(windows)]
fn probe_page_size() -> usize {
    use ::windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
    let mut info = SYSTEM_INFO::default();
    unsafe { GetSystemInfo(&mut info) };
    info.dwPageSize as usize
}

#[cfg(windows)]
fn probe_allocation_granularity() -> usize {
    use ::windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
    let mut info = SYSTEM_INFO::default();
    unsafe { GetSystemInfo(&mut info) };
    info.dwAllocationGranularity as usize
}

static PAGE_SIZE: Lazy<usize> = Lazy::new(probe_page_size);
static ALLOCATION_GRANULARITY: Lazy<usize> = Lazy::new(probe_allocation_granularity);

/// Size of virtual memory pages.
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Minimum alignment the platform accepts for file-mapping base addresses.
/// Equal to the page size on POSIX, typically 64 KiB on Windows.
pub fn allocation_granularity() -> usize {
    *ALLOCATION_GRANULARITY
}

/// The alignment unit for ring layouts: whichever of page size and
/// allocation granularity is stricter.
pub fn mirror_granularity() -> usize {
    page_size().max(allocation_granularity())
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub use memfd::proc_fd_path;
#[cfg(unix)]
pub use unix::RingMapping;
#[cfg(windows)]
pub use self::windows::RingMapping;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probes_are_sane() {
        assert!(page_size().is_power_of_two());
        assert!(allocation_granularity().is_power_of_two());
        assert!(mirror_granularity() >= page_size());
        assert!(mirror_granularity() >= allocation_granularity());
    }
}
