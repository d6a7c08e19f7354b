//! Unix ring mappings: one shared mapping of the whole backing object plus
//! a `MAP_FIXED` mirror of the buffer region.

use std::ffi::c_void;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;

use rustix::mm::{MapFlags, ProtFlags};

use mring_core::{RingError, RingLayout, RingResult};

use crate::{Access, allocation_granularity, page_size};

enum Backing {
    /// Named POSIX shm object. The creating handle unlinks the name on
    /// close.
    Shm { fd: OwnedFd, owner: bool },
    /// Anonymous memfd. `registered` is set on the creating handle, whose
    /// close drops the label from the process registry.
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    Memfd { fd: OwnedFd, registered: bool },
}

impl Backing {
    fn fd(&self) -> &OwnedFd {
        match self {
            Backing::Shm { fd, .. } => fd,
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
            Backing::Memfd { fd, .. } => fd,
        }
    }
}

/// A named backing object mapped as header + primary + mirror, with the
/// mirror's first byte immediately following the primary's last byte.
pub struct RingMapping {
    name: String,
    backing: Backing,
    base: NonNull<u8>,
    layout: RingLayout,
    writable: bool,
    closed: bool,
}

// SAFETY: the mapping is plain shared memory valid for the lifetime of the
// struct; the base pointer carries no thread affinity.
unsafe impl Send for RingMapping {}
unsafe impl Sync for RingMapping {}

impl RingMapping {
    /// Creates the backing object and maps it. Names with a leading `/`
    /// select POSIX shm; anything else is a memfd label.
    pub fn create(name: &str, layout: &RingLayout) -> RingResult<Self> {
        let backing = Self::create_backing(name, layout.total_size)?;
        let base = match map_views(backing.fd(), layout, true, name) {
            Ok(base) => base,
            Err(e) => {
                // The object was created but never became usable; take the
                // name back out of the namespace.
                match &backing {
                    Backing::Shm { .. } => {
                        let _ = crate::shm::unlink(name);
                    }
                    #[cfg(any(
                        target_os = "linux",
                        target_os = "android",
                        target_os = "freebsd"
                    ))]
                    Backing::Memfd { .. } => crate::memfd::forget(name),
                }
                return Err(e);
            }
        };
        tracing::debug!(name, total = layout.total_size, "created ring mapping");
        Ok(Self {
            name: name.to_string(),
            backing,
            base,
            layout: *layout,
            writable: true,
            closed: false,
        })
    }

    /// Opens an existing backing object and rebuilds its layout from the
    /// object's size. Memfd labels and `/proc/<pid>/fd/<n>` paths always
    /// map read-only.
    pub fn open(
        name: &str,
        element_size: usize,
        header_size: usize,
        access: Access,
    ) -> RingResult<Self> {
        let (backing, writable) = Self::open_backing(name, access)?;
        let stat = rustix::fs::fstat(backing.fd()).map_err(|e| crate::shm::map_errno(e, name))?;
        let layout = RingLayout::reconstruct(
            element_size,
            header_size,
            stat.st_size as usize,
            page_size(),
            allocation_granularity(),
        )?;
        let base = map_views(backing.fd(), &layout, writable, name)?;
        tracing::debug!(name, total = layout.total_size, writable, "opened ring mapping");
        Ok(Self {
            name: name.to_string(),
            backing,
            base,
            layout,
            writable,
            closed: false,
        })
    }

    /// True if a backing object with this name is present.
    pub fn exists(name: &str) -> bool {
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        {
            if name.starts_with("/proc/") {
                return std::path::Path::new(name).exists();
            }
            if !name.starts_with('/') {
                return crate::memfd::exists(name);
            }
        }
        if !name.starts_with('/') {
            return false;
        }
        crate::shm::exists(name)
    }

    /// Unmaps the views, closes the descriptor, and removes the name from
    /// its namespace if this handle created it.
    pub fn close(mut self) -> RingResult<()> {
        self.teardown()
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Start of the mapped header block.
    pub fn header_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Start of the primary buffer.
    pub fn buffer_ptr(&self) -> *mut u8 {
        // SAFETY: buffer_offset < total_size of the live mapping.
        unsafe { self.base.as_ptr().add(self.layout.buffer_offset) }
    }

    /// Start of the mirror view: `buffer_ptr() + buffer_size`.
    pub fn mirror_ptr(&self) -> *mut u8 {
        // SAFETY: mirror_offset < total_size of the live mapping.
        unsafe { self.base.as_ptr().add(self.layout.mirror_offset) }
    }

    /// Name another process can use to reach this object: the shm name
    /// itself, or the creator's `/proc/<pid>/fd/<n>` path for memfd.
    pub fn backing_path(&self) -> String {
        match &self.backing {
            Backing::Shm { .. } => self.name.clone(),
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
            Backing::Memfd { fd, .. } => {
                use std::os::fd::AsRawFd;
                crate::memfd::proc_fd_path(std::process::id(), fd.as_raw_fd())
            }
        }
    }

    fn create_backing(name: &str, total: usize) -> RingResult<Backing> {
        if name.starts_with('/') {
            return Ok(Backing::Shm {
                fd: crate::shm::create(name, total)?,
                owner: true,
            });
        }
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        {
            Ok(Backing::Memfd {
                fd: crate::memfd::create(name, total)?,
                registered: true,
            })
        }
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        {
            Err(RingError::Platform(format!(
                "Names without a leading '/' need memfd support: {name}"
            )))
        }
    }

    fn open_backing(name: &str, access: Access) -> RingResult<(Backing, bool)> {
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        {
            if name.starts_with("/proc/") {
                let fd = crate::memfd::open_path(name)?;
                return Ok((Backing::Memfd { fd, registered: false }, false));
            }
            if !name.starts_with('/') {
                let fd = crate::memfd::open_label(name)?;
                return Ok((Backing::Memfd { fd, registered: false }, false));
            }
        }
        if !name.starts_with('/') {
            return Err(RingError::DoesNotExist(name.to_string()));
        }
        let fd = crate::shm::open(name, access)?;
        Ok((
            Backing::Shm { fd, owner: false },
            access == Access::ReadWrite,
        ))
    }

    fn teardown(&mut self) -> RingResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // SAFETY: both ranges come from map_views and are unmapped exactly
        // once; the second call tolerates the hole left by the first.
        unsafe {
            rustix::mm::munmap(self.mirror_ptr().cast::<c_void>(), self.layout.buffer_size)
                .map_err(|e| crate::shm::map_errno(e, &self.name))?;
            rustix::mm::munmap(self.base.as_ptr().cast::<c_void>(), self.layout.total_size)
                .map_err(|e| crate::shm::map_errno(e, &self.name))?;
        }
        match &self.backing {
            Backing::Shm { owner: true, .. } => crate::shm::unlink(&self.name)?,
            Backing::Shm { .. } => {}
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
            Backing::Memfd { registered, .. } => {
                if *registered {
                    crate::memfd::forget(&self.name);
                }
            }
        }
        tracing::debug!(name = %self.name, "closed ring mapping");
        Ok(())
    }
}

impl Drop for RingMapping {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

/// Maps the whole object, then aliases the buffer region into the address
/// right after the primary: same object, file offset `buffer_offset`,
/// fixed placement.
fn map_views(
    fd: &OwnedFd,
    layout: &RingLayout,
    writable: bool,
    name: &str,
) -> RingResult<NonNull<u8>> {
    let prot = if writable {
        ProtFlags::READ | ProtFlags::WRITE
    } else {
        ProtFlags::READ
    };

    // SAFETY: fresh range chosen by the kernel, fully backed by the object.
    let base = unsafe {
        rustix::mm::mmap(
            std::ptr::null_mut(),
            layout.total_size,
            prot,
            MapFlags::SHARED,
            fd,
            0,
        )
    }
    .map_err(|e| crate::shm::map_errno(e, name))?
    .cast::<u8>();

    let expected = unsafe { base.add(layout.mirror_offset) };
    // SAFETY: the fixed range lies inside the reservation made above and
    // atomically replaces its tail half.
    let mirror = unsafe {
        rustix::mm::mmap(
            expected.cast::<c_void>(),
            layout.buffer_size,
            prot,
            MapFlags::SHARED | MapFlags::FIXED,
            fd,
            layout.buffer_offset as u64,
        )
    };
    match mirror {
        Ok(ptr) if ptr == expected.cast::<c_void>() => NonNull::new(base)
            .ok_or_else(|| RingError::Platform("mmap returned null".to_string())),
        Ok(ptr) => {
            // SAFETY: unmapping only what this function mapped.
            unsafe {
                let _ = rustix::mm::munmap(ptr, layout.buffer_size);
                let _ = rustix::mm::munmap(base.cast::<c_void>(), layout.total_size);
            }
            Err(RingError::MapsNotAdjacent)
        }
        Err(e) => {
            // SAFETY: unmapping only what this function mapped.
            unsafe {
                let _ = rustix::mm::munmap(base.cast::<c_void>(), layout.total_size);
            }
            Err(crate::shm::map_errno(e, name))
        }
    }
}
