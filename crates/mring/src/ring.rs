//! The typed ring: a mirrored buffer of `T` behind an in-band state header.
//!
//! A [`Ring<T, H>`] owns a platform mapping and views it under three types:
//! the state header [`RingState<H>`] at offset 0, the primary buffer of `L`
//! elements, and the combined view of `2L` elements whose second half
//! aliases the first. The combined view is a virtual-memory trick, not a
//! container: writing `ring[i]` is immediately visible at `combined[i + L]`
//! and vice versa, which is what makes every window of up to `L` elements
//! contiguous.
//!
//! A ring is single-producer: exactly one writable handle may mutate it at
//! a time. Readers in other processes may race the writer and observe
//! partially updated header fields; callers that need stronger guarantees
//! layer their own synchronisation over the user header `H`.

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;

use mring_core::{RingError, RingLayout, RingResult, RingState, STATE_PREFIX_SIZE, StateSnapshot};
use mring_platform::{Access, RingMapping, allocation_granularity, page_size};

use crate::config::RingConfig;

/// A named, shared-memory circular buffer of `T` with user header `H`.
///
/// `T` and `H` must be [`Pod`]: the buffer and header live in a shared
/// mapping where any bit pattern must be a valid value.
pub struct Ring<T: Pod, H: Pod = ()> {
    mapping: RingMapping,
    name: String,
    len: u64,
    _marker: PhantomData<(T, H)>,
}

impl<T: Pod, H: Pod> Ring<T, H> {
    /// Creates the backing object for at least `requested` elements and
    /// maps it. The actual capacity [`len`](Self::len) is rounded up so the
    /// buffer fills whole granularity units.
    pub fn create(name: &str, requested: u64) -> RingResult<Self> {
        if requested == 0 || size_of::<T>() == 0 {
            return Err(RingError::InvalidCapacity);
        }
        if RingMapping::exists(name) {
            return Err(RingError::AlreadyExists(name.to_string()));
        }
        let layout = RingLayout::compute(
            size_of::<T>(),
            requested,
            size_of::<RingState<H>>(),
            page_size(),
            allocation_granularity(),
        );
        let mapping = RingMapping::create(name, &layout)?;
        // Fresh pages are zeroed by the platform; writing the prefix makes
        // the empty state explicit. H fields keep their zero content.
        // SAFETY: the header block spans at least the prefix.
        unsafe {
            std::ptr::write_bytes(mapping.header_ptr(), 0, STATE_PREFIX_SIZE);
        }
        tracing::debug!(name, len = layout.element_count, "created ring");
        Ok(Self {
            mapping,
            name: name.to_string(),
            len: layout.element_count,
            _marker: PhantomData,
        })
    }

    /// Opens an existing ring read-write. The header is left as the writer
    /// last set it.
    ///
    /// Memfd-backed rings (names without a leading `/`, or `/proc` paths)
    /// always open read-only regardless.
    pub fn open(name: &str) -> RingResult<Self> {
        Self::open_with(name, Access::ReadWrite)
    }

    /// Opens an existing ring read-only.
    pub fn open_read_only(name: &str) -> RingResult<Self> {
        Self::open_with(name, Access::ReadOnly)
    }

    fn open_with(name: &str, access: Access) -> RingResult<Self> {
        if size_of::<T>() == 0 {
            return Err(RingError::InvalidCapacity);
        }
        let mapping = RingMapping::open(name, size_of::<T>(), size_of::<RingState<H>>(), access)?;
        let len = mapping.layout().element_count;
        Ok(Self {
            mapping,
            name: name.to_string(),
            len,
            _marker: PhantomData,
        })
    }

    /// True if a backing object with this name is present.
    pub fn exists(name: &str) -> bool {
        RingMapping::exists(name)
    }

    /// Unmaps the views and removes the name from its namespace if this
    /// handle created it. Dropping the ring does the same, swallowing
    /// errors.
    pub fn close(self) -> RingResult<()> {
        self.mapping.close()
    }

    /// Actual element capacity `L`. At least the requested count.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True until the first push.
    pub fn is_empty(&self) -> bool {
        self.state().count == 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False for secondary memfd handles and explicit read-only opens.
    pub fn is_writable(&self) -> bool {
        self.mapping.is_writable()
    }

    pub fn layout(&self) -> &RingLayout {
        self.mapping.layout()
    }

    /// Name another process can use to open this ring: the shm name, the
    /// section name, or the creator's `/proc/<pid>/fd/<n>` path for memfd.
    pub fn backing_path(&self) -> String {
        self.mapping.backing_path()
    }

    /// Fills in the persistent configuration document for this ring.
    pub fn config(&self, project_name: &str) -> RingConfig {
        RingConfig {
            project_name: project_name.to_string(),
            name: self.name.clone(),
            shm_path: self.backing_path(),
            num_connections: 1,
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            shm_size: self.mapping.layout().total_size as u64,
            element_size: size_of::<T>() as u64,
            element_type: std::any::type_name::<T>().to_string(),
        }
    }

    /// Snapshot of the count/head/tail prefix.
    pub fn state(&self) -> StateSnapshot {
        self.ring_state().snapshot()
    }

    /// The caller's header fields, living right after the fixed prefix.
    pub fn header(&self) -> &H {
        &self.ring_state().user
    }

    pub fn header_mut(&mut self) -> RingResult<&mut H> {
        self.ensure_writable()?;
        Ok(&mut self.ring_state_mut().user)
    }

    /// Sets count, head, and tail back to zero. Header fields and buffer
    /// contents are untouched.
    pub fn reset(&mut self) -> RingResult<()> {
        self.ensure_writable()?;
        self.ring_state_mut().reset();
        Ok(())
    }

    /// Element at logical index `index`, which must be below `count`.
    pub fn value_at(&self, index: u64) -> RingResult<T> {
        let count = self.ring_state().count;
        if index >= count {
            return Err(RingError::IndexOutOfRange { index, count });
        }
        Ok(self.ring()[(index % self.len) as usize])
    }

    /// Appends one element, overwriting the oldest once the ring is full.
    /// Returns the new count.
    pub fn push(&mut self, value: T) -> RingResult<u64> {
        self.ensure_writable()?;
        let slot = (self.ring_state().count % self.len) as usize;
        self.combined_mut()[slot] = value;
        let len = self.len;
        let state = self.ring_state_mut();
        state.advance(1, len);
        Ok(state.count)
    }

    /// Appends a run of up to `L` elements in one contiguous copy. The
    /// mirror guarantees the destination never wraps. Returns the new
    /// count.
    pub fn push_values(&mut self, values: &[T]) -> RingResult<u64> {
        self.ensure_writable()?;
        let n = values.len() as u64;
        if n > self.len {
            return Err(RingError::InvalidCapacity);
        }
        if n == 0 {
            return Ok(self.ring_state().count);
        }
        let start = (self.ring_state().count % self.len) as usize;
        self.combined_mut()[start..start + values.len()].copy_from_slice(values);
        let len = self.len;
        let state = self.ring_state_mut();
        state.advance(n, len);
        Ok(state.count)
    }

    /// Overwrites the element at logical index `index` in place. The index
    /// must be below `count` and not behind the tail; head does not move.
    pub fn insert(&mut self, value: T, index: u64) -> RingResult<()> {
        self.ensure_writable()?;
        let state = self.ring_state().snapshot();
        if index >= state.count {
            return Err(RingError::IndexOutOfRange {
                index,
                count: state.count,
            });
        }
        let tail = state.count.saturating_sub(self.len);
        if index < tail {
            return Err(RingError::WindowCrossesTail { start: index, tail });
        }
        let slot = (index % self.len) as usize;
        self.combined_mut()[slot] = value;
        Ok(())
    }

    /// Overwrites a run of elements starting at logical index `index`. The
    /// whole run must lie inside the live window; head does not move.
    pub fn insert_values(&mut self, values: &[T], index: u64) -> RingResult<()> {
        self.ensure_writable()?;
        let n = values.len() as u64;
        if n > self.len {
            return Err(RingError::InvalidCapacity);
        }
        let state = self.ring_state().snapshot();
        if index + n > state.count {
            return Err(RingError::IndexOutOfRange {
                index: index + n,
                count: state.count,
            });
        }
        let tail = state.count.saturating_sub(self.len);
        if index < tail {
            return Err(RingError::WindowCrossesTail { start: index, tail });
        }
        let begin = (index % self.len) as usize;
        self.combined_mut()[begin..begin + values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Contiguous view of the logical window `[start, stop)`. The window
    /// may span the seam; the mirror keeps it contiguous. `stop - start`
    /// must not exceed `L`, and `start` must not be behind the logical
    /// tail.
    pub fn slice(&self, start: u64, stop: u64) -> RingResult<&[T]> {
        if start > stop || stop - start > self.len {
            return Err(RingError::IndexOutOfRange {
                index: stop,
                count: self.ring_state().count,
            });
        }
        let tail = self.ring_state().logical_tail(self.len);
        if start < tail {
            return Err(RingError::WindowCrossesTail { start, tail });
        }
        let begin = (start % self.len) as usize;
        Ok(&self.combined()[begin..begin + (stop - start) as usize])
    }

    /// The `k` oldest live elements, `k <= L`.
    pub fn slice_from_tail(&self, k: u64) -> RingResult<&[T]> {
        if k > self.len {
            return Err(RingError::IndexOutOfRange {
                index: k,
                count: self.len,
            });
        }
        let begin = (self.ring_state().logical_tail(self.len) % self.len) as usize;
        Ok(&self.combined()[begin..begin + k as usize])
    }

    /// The `k` most recently pushed elements, `k <= min(count, L)`.
    pub fn slice_to_head(&self, k: u64) -> RingResult<&[T]> {
        let count = self.ring_state().count;
        if k > count || k > self.len {
            return Err(RingError::IndexOutOfRange { index: k, count });
        }
        let begin = ((count - k) % self.len) as usize;
        Ok(&self.combined()[begin..begin + k as usize])
    }

    /// The primary buffer: `L` elements indexed by `logical mod L`.
    pub fn ring(&self) -> &[T] {
        &self.combined()[..self.len as usize]
    }

    /// The combined view: `2L` elements, of which the second half aliases
    /// the first. Useful for wrap-free inspection; not a 2L container.
    pub fn combined(&self) -> &[T] {
        // SAFETY: the mapping keeps buffer + mirror alive and adjacent for
        // the lifetime of self; both halves refer to the same physical
        // bytes, which is fine under a shared reference. T is Pod, the
        // region is zero-initialised at creation, and the page-aligned
        // buffer offset satisfies T's alignment.
        unsafe {
            std::slice::from_raw_parts(
                self.mapping.buffer_ptr() as *const T,
                2 * self.len as usize,
            )
        }
    }

    fn combined_mut(&mut self) -> &mut [T] {
        debug_assert!(self.mapping.is_writable());
        // SAFETY: as in combined(), plus exclusivity: &mut self is the
        // only in-process handle to these bytes, and the mapping is
        // writable (checked by every mutating caller).
        unsafe {
            std::slice::from_raw_parts_mut(
                self.mapping.buffer_ptr() as *mut T,
                2 * self.len as usize,
            )
        }
    }

    fn ring_state(&self) -> &RingState<H> {
        // SAFETY: the header block starts at a page-aligned address and is
        // at least size_of::<RingState<H>>() bytes; H is Pod, so whatever
        // the mapping holds is a valid value.
        unsafe { &*(self.mapping.header_ptr() as *const RingState<H>) }
    }

    fn ring_state_mut(&mut self) -> &mut RingState<H> {
        debug_assert!(self.mapping.is_writable());
        // SAFETY: as in ring_state(), plus exclusivity via &mut self on a
        // writable mapping.
        unsafe { &mut *(self.mapping.header_ptr() as *mut RingState<H>) }
    }

    fn ensure_writable(&self) -> RingResult<()> {
        if self.mapping.is_writable() {
            Ok(())
        } else {
            Err(RingError::AccessDenied(self.name.clone()))
        }
    }
}
