//! Windows ring mappings using placeholder splitting.
//!
//! Windows has no `mmap(MAP_FIXED)`; instead one NOACCESS placeholder
//! reservation covering the whole layout is split into three adjacent
//! placeholders, and each is replaced by a `MapViewOfFile3` view of the
//! section. The primary and the mirror views both map file offset
//! `header_size`, which is what makes the mirror alias the primary.

use std::ffi::{OsStr, c_void};
use std::os::windows::ffi::OsStrExt;
use std::ptr::NonNull;

use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_ALREADY_EXISTS, ERROR_FILE_NOT_FOUND, GetLastError,
    HANDLE, INVALID_HANDLE_VALUE,
};
use windows::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, FILE_MAP_READ, MEM_PRESERVE_PLACEHOLDER, MEM_RELEASE,
    MEM_REPLACE_PLACEHOLDER, MEM_RESERVE, MEM_RESERVE_PLACEHOLDER, MEMORY_BASIC_INFORMATION,
    MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, MapViewOfFile3, OpenFileMappingW, PAGE_NOACCESS,
    PAGE_READONLY, PAGE_READWRITE, UnmapViewOfFile, VirtualAlloc2, VirtualFree, VirtualQuery,
};
use windows::core::PCWSTR;

use mring_core::{RingError, RingLayout, RingResult};

use crate::{Access, allocation_granularity, page_size};

/// A named section mapped as header + primary + mirror, with the mirror's
/// first byte immediately following the primary's last byte.
pub struct RingMapping {
    name: String,
    section: HANDLE,
    base: NonNull<u8>,
    layout: RingLayout,
    writable: bool,
    closed: bool,
}

// SAFETY: the views are plain shared memory valid for the lifetime of the
// struct; the handle and base pointer carry no thread affinity.
unsafe impl Send for RingMapping {}
unsafe impl Sync for RingMapping {}

/// UTF-16 with a trailing NUL, as the wide-string APIs want it.
fn wide_name(name: &str) -> Vec<u16> {
    OsStr::new(name)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

impl RingMapping {
    /// Creates the page-backed section and maps it.
    pub fn create(name: &str, layout: &RingLayout) -> RingResult<Self> {
        check_granularity(layout)?;
        let wide = wide_name(name);

        let section = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                ((layout.total_size as u64) >> 32) as u32,
                layout.total_size as u32,
                PCWSTR::from_raw(wide.as_ptr()),
            )
        }
        .map_err(|e| RingError::Platform(format!("CreateFileMappingW failed: {e:?}")))?;

        // CreateFileMappingW hands back a handle to the existing section
        // instead of failing; the spec here is create-exclusive.
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            unsafe {
                let _ = CloseHandle(section);
            }
            return Err(RingError::AlreadyExists(name.to_string()));
        }

        let base = match map_views(section, layout, true) {
            Ok(base) => base,
            Err(e) => {
                unsafe {
                    let _ = CloseHandle(section);
                }
                return Err(e);
            }
        };

        tracing::debug!(name, total = layout.total_size, "created ring mapping");
        Ok(Self {
            name: name.to_string(),
            section,
            base,
            layout: *layout,
            writable: true,
            closed: false,
        })
    }

    /// Opens an existing section by name. The section size is discovered
    /// by querying a throwaway whole-section view, since sections cannot
    /// be fstat'ed.
    pub fn open(
        name: &str,
        element_size: usize,
        header_size: usize,
        access: Access,
    ) -> RingResult<Self> {
        let wide = wide_name(name);
        let desired = match access {
            Access::ReadWrite => FILE_MAP_ALL_ACCESS.0,
            Access::ReadOnly => FILE_MAP_READ.0,
        };
        let section =
            unsafe { OpenFileMappingW(desired, false, PCWSTR::from_raw(wide.as_ptr())) }
                .map_err(|e| map_open_error(e, name))?;

        let total = match section_size(section) {
            Ok(total) => total,
            Err(e) => {
                unsafe {
                    let _ = CloseHandle(section);
                }
                return Err(e);
            }
        };
        let layout = RingLayout::reconstruct(
            element_size,
            header_size,
            total,
            page_size(),
            allocation_granularity(),
        )?;

        let writable = access == Access::ReadWrite;
        let base = match map_views(section, &layout, writable) {
            Ok(base) => base,
            Err(e) => {
                unsafe {
                    let _ = CloseHandle(section);
                }
                return Err(e);
            }
        };

        tracing::debug!(name, total, writable, "opened ring mapping");
        Ok(Self {
            name: name.to_string(),
            section,
            base,
            layout,
            writable,
            closed: false,
        })
    }

    /// True if a section with this name can be opened.
    pub fn exists(name: &str) -> bool {
        let wide = wide_name(name);
        match unsafe { OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR::from_raw(wide.as_ptr())) }
        {
            Ok(handle) => {
                unsafe {
                    let _ = CloseHandle(handle);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Unmaps the three views and closes the section handle. The section
    /// itself vanishes with its last handle.
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

    /// Name another process can use to reach this object.
    pub fn backing_path(&self) -> String {
        self.name.clone()
    }

    fn teardown(&mut self) -> RingResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Mirror, primary, header, in that order.
        let views = [
            self.mirror_ptr(),
            self.buffer_ptr(),
            self.header_ptr(),
        ];
        for ptr in views {
            let addr = MEMORY_MAPPED_VIEW_ADDRESS {
                Value: ptr as *mut c_void,
            };
            unsafe { UnmapViewOfFile(addr) }
                .map_err(|e| RingError::Platform(format!("UnmapViewOfFile failed: {e:?}")))?;
        }
        unsafe { CloseHandle(self.section) }
            .map_err(|e| RingError::Platform(format!("CloseHandle failed: {e:?}")))?;
        tracing::debug!(name = %self.name, "closed ring mapping");
        Ok(())
    }
}

impl Drop for RingMapping {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

/// The placeholder machinery only accepts granularity-multiple sizes.
fn check_granularity(layout: &RingLayout) -> RingResult<()> {
    let granularity = allocation_granularity();
    for size in [layout.header_size, layout.buffer_size] {
        if size % granularity != 0 {
            return Err(RingError::AllocationGranularity { size, granularity });
        }
    }
    Ok(())
}

fn map_open_error(e: windows::core::Error, name: &str) -> RingError {
    if e.code() == ERROR_FILE_NOT_FOUND.to_hresult() {
        RingError::DoesNotExist(name.to_string())
    } else if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
        RingError::AccessDenied(name.to_string())
    } else {
        RingError::Platform(format!("OpenFileMappingW failed: {e:?}"))
    }
}

/// Total size of a section, read off a throwaway whole-section view.
fn section_size(section: HANDLE) -> RingResult<usize> {
    let probe = unsafe { MapViewOfFile(section, FILE_MAP_READ, 0, 0, 0) };
    if probe.Value.is_null() {
        return Err(RingError::Platform("MapViewOfFile failed".to_string()));
    }
    let mut info = MEMORY_BASIC_INFORMATION::default();
    let written = unsafe {
        VirtualQuery(
            Some(probe.Value as *const c_void),
            &mut info,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };
    unsafe {
        let _ = UnmapViewOfFile(probe);
    }
    if written == 0 {
        return Err(RingError::Platform("VirtualQuery failed".to_string()));
    }
    Ok(info.RegionSize)
}

/// Reserves one placeholder for the whole layout, splits it into header /
/// primary / mirror placeholders, and replaces each with a section view.
fn map_views(section: HANDLE, layout: &RingLayout, writable: bool) -> RingResult<NonNull<u8>> {
    let protection = if writable { PAGE_READWRITE } else { PAGE_READONLY };

    let base = unsafe {
        VirtualAlloc2(
            None,
            None,
            layout.total_size,
            MEM_RESERVE | MEM_RESERVE_PLACEHOLDER,
            PAGE_NOACCESS.0,
            None,
        )
    };
    if base.is_null() {
        return Err(RingError::Platform("VirtualAlloc2 failed".to_string()));
    }
    let base = base as *mut u8;

    let header_addr = base as *mut c_void;
    let buffer_addr = unsafe { base.add(layout.buffer_offset) } as *mut c_void;
    let mirror_addr = unsafe { base.add(layout.mirror_offset) } as *mut c_void;

    // Carve off the header and primary placeholders; the remainder is the
    // mirror placeholder.
    for (addr, size) in [
        (header_addr, layout.header_size),
        (buffer_addr, layout.buffer_size),
    ] {
        if let Err(e) =
            unsafe { VirtualFree(addr, size, MEM_RELEASE | MEM_PRESERVE_PLACEHOLDER) }
        {
            release_placeholders(base, layout, 0);
            return Err(RingError::Platform(format!(
                "VirtualFree placeholder split failed: {e:?}"
            )));
        }
    }

    // Header maps file offset 0; primary and mirror both map file offset
    // header_size. The shared offset is the aliasing.
    let pieces = [
        (header_addr, 0u64, layout.header_size),
        (buffer_addr, layout.buffer_offset as u64, layout.buffer_size),
        (mirror_addr, layout.buffer_offset as u64, layout.buffer_size),
    ];
    for (index, (addr, offset, size)) in pieces.into_iter().enumerate() {
        let view = unsafe {
            MapViewOfFile3(
                section,
                None,
                Some(addr as *const c_void),
                offset,
                size,
                MEM_REPLACE_PLACEHOLDER,
                protection.0,
                None,
            )
        };
        if view.Value.is_null() {
            unmap_views(base, layout, index);
            release_placeholders(base, layout, index);
            return Err(RingError::Platform("MapViewOfFile3 failed".to_string()));
        }
        if view.Value != addr {
            unmap_views(base, layout, index + 1);
            release_placeholders(base, layout, index + 1);
            return Err(RingError::MapsNotAdjacent);
        }
    }

    NonNull::new(base).ok_or_else(|| RingError::Platform("VirtualAlloc2 returned null".to_string()))
}

/// Unmaps the first `mapped` views of the header/primary/mirror sequence.
fn unmap_views(base: *mut u8, layout: &RingLayout, mapped: usize) {
    let offsets = [0, layout.buffer_offset, layout.mirror_offset];
    for &offset in offsets.iter().take(mapped) {
        let addr = MEMORY_MAPPED_VIEW_ADDRESS {
            Value: unsafe { base.add(offset) } as *mut c_void,
        };
        unsafe {
            let _ = UnmapViewOfFile(addr);
        }
    }
}

/// Releases whatever placeholders remain after `mapped` views were
/// replaced (and have just been unmapped again).
fn release_placeholders(base: *mut u8, layout: &RingLayout, mapped: usize) {
    let offsets = [0, layout.buffer_offset, layout.mirror_offset];
    for &offset in offsets.iter().skip(mapped) {
        unsafe {
            let _ = VirtualFree(base.add(offset) as *mut c_void, 0, MEM_RELEASE);
        }
    }
    // Views that were mapped and unmapped above turned back into separate
    // regions; release those too.
    for &offset in offsets.iter().take(mapped) {
        unsafe {
            let _ = VirtualFree(base.add(offset) as *mut c_void, 0, MEM_RELEASE);
        }
    }
}
