//! Page-aligned layout calculation for mirrored ring buffers.
//!
//! A ring occupies one contiguous virtual reservation:
//!
//! ```text
//! ┌────────────────────┬──────────────────────┬──────────────────────┐
//! │  header (aligned)  │  primary buffer      │  mirror view         │
//! │  offset 0          │  offset buffer_off   │  offset mirror_off   │
//! └────────────────────┴──────────────────────┴──────────────────────┘
//! ```
//!
//! The mirror maps the same backing bytes as the primary, so any window of
//! up to `element_count` elements is contiguous in virtual memory. The
//! layout calculator is a pure function; it never talks to the platform.

use crate::error::{RingError, RingResult};

/// All sizes and offsets derived from an element size, a requested element
/// count, and a raw header size.
///
/// The alignment unit is `max(page_size, granularity)`. On POSIX the
/// allocation granularity equals the page size; on Windows it is the system
/// allocation granularity (typically 64 KiB), which file-mapping base
/// addresses must honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    /// Virtual memory page size.
    pub page_size: usize,
    /// Platform allocation granularity for mapping base addresses.
    pub granularity: usize,
    /// Header size as requested by the caller, before alignment.
    pub header_size_raw: usize,
    /// Buffer size before alignment: `element_size * requested_count`.
    pub buffer_size_raw: usize,
    /// Size of one element in bytes.
    pub element_size: usize,
    /// Element count as requested by the caller.
    pub requested_count: u64,
    /// Header size aligned up to the alignment unit.
    pub header_size: usize,
    /// Buffer size aligned up to the alignment unit and to a whole number
    /// of elements.
    pub buffer_size: usize,
    /// Actual element count: `buffer_size / element_size`. Never less than
    /// the requested count.
    pub element_count: u64,
    /// Pages covered by the aligned header.
    pub header_pages: usize,
    /// Pages covered by the aligned buffer.
    pub buffer_pages: usize,
    /// Total virtual reservation: `header_size + 2 * buffer_size`.
    pub total_size: usize,
    /// Offset of the header block. Always zero.
    pub header_offset: usize,
    /// Offset of the primary buffer: `header_size`.
    pub buffer_offset: usize,
    /// Offset of the mirror view: `header_size + buffer_size`.
    pub mirror_offset: usize,
}

impl RingLayout {
    /// Computes the layout for `requested_count` elements of
    /// `element_size` bytes behind a raw header of `header_size` bytes.
    ///
    /// Callers validate inputs: a zero element size or element count is
    /// rejected before this is invoked.
    pub fn compute(
        element_size: usize,
        requested_count: u64,
        header_size: usize,
        page_size: usize,
        granularity: usize,
    ) -> Self {
        debug_assert!(element_size > 0);
        debug_assert!(requested_count > 0);
        debug_assert!(page_size.is_power_of_two());
        debug_assert!(granularity.is_power_of_two());

        let align = page_size.max(granularity);
        let header_aligned = align_up(header_size, align);

        // The buffer must be a whole number of alignment units and a whole
        // number of elements at the same time, so it is rounded up to a
        // multiple of lcm(align, element_size).
        let buffer_raw = element_size * requested_count as usize;
        let unit = align / gcd(align, element_size) * element_size;
        let buffer_aligned = buffer_raw.div_ceil(unit) * unit;
        let element_count = (buffer_aligned / element_size) as u64;

        RingLayout {
            page_size,
            granularity,
            header_size_raw: header_size,
            buffer_size_raw: buffer_raw,
            element_size,
            requested_count,
            header_size: header_aligned,
            buffer_size: buffer_aligned,
            element_count,
            header_pages: header_aligned / page_size,
            buffer_pages: buffer_aligned / page_size,
            total_size: header_aligned + 2 * buffer_aligned,
            header_offset: 0,
            buffer_offset: header_aligned,
            mirror_offset: header_aligned + buffer_aligned,
        }
    }

    /// Rebuilds the layout of an existing backing object from its total
    /// size. Used on open, where the element count is not known up front.
    pub fn reconstruct(
        element_size: usize,
        header_size: usize,
        total_size: usize,
        page_size: usize,
        granularity: usize,
    ) -> RingResult<Self> {
        if element_size == 0 {
            return Err(RingError::InvalidCapacity);
        }
        let align = page_size.max(granularity);
        let header_aligned = align_up(header_size, align);

        if total_size <= header_aligned {
            return Err(RingError::Platform(format!(
                "Backing object of {} bytes is too small for a {} byte header",
                total_size, header_aligned
            )));
        }
        let remainder = total_size - header_aligned;
        let buffer_aligned = remainder / 2;
        if remainder % 2 != 0 || buffer_aligned % align != 0 {
            return Err(RingError::AllocationGranularity {
                size: total_size,
                granularity: align,
            });
        }
        if buffer_aligned % element_size != 0 {
            return Err(RingError::Platform(format!(
                "Buffer of {} bytes is not a whole number of {} byte elements",
                buffer_aligned, element_size
            )));
        }
        let element_count = (buffer_aligned / element_size) as u64;

        Ok(RingLayout {
            page_size,
            granularity,
            header_size_raw: header_size,
            buffer_size_raw: buffer_aligned,
            element_size,
            requested_count: element_count,
            header_size: header_aligned,
            buffer_size: buffer_aligned,
            element_count,
            header_pages: header_aligned / page_size,
            buffer_pages: buffer_aligned / page_size,
            total_size,
            header_offset: 0,
            buffer_offset: header_aligned,
            mirror_offset: header_aligned + buffer_aligned,
        })
    }
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
#[inline]
pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 4096;
    const WIN_GRAN: usize = 64 * 1024;

    fn check_invariants(l: &RingLayout) {
        let align = l.page_size.max(l.granularity);
        assert_eq!(l.header_size % align, 0);
        assert_eq!(l.buffer_size % align, 0);
        assert_eq!(l.element_count as usize * l.element_size, l.buffer_size);
        assert!(l.element_count >= l.requested_count);
        assert!(l.header_offset + l.header_size_raw <= l.buffer_offset);
        assert_eq!(l.mirror_offset - l.buffer_offset, l.buffer_size);
        assert_eq!(l.total_size, l.header_size + 2 * l.buffer_size);
    }

    #[test]
    fn test_u32_ring() {
        let l = RingLayout::compute(4, 1024, 24, PAGE, PAGE);
        assert_eq!(l.header_size, PAGE);
        assert_eq!(l.buffer_size, PAGE);
        assert_eq!(l.element_count, 1024);
        assert_eq!(l.buffer_offset, PAGE);
        assert_eq!(l.mirror_offset, 2 * PAGE);
        assert_eq!(l.total_size, 3 * PAGE);
        check_invariants(&l);
    }

    #[test]
    fn test_windows_granularity() {
        let l = RingLayout::compute(4, 1024, 24, PAGE, WIN_GRAN);
        assert_eq!(l.header_size, WIN_GRAN);
        assert_eq!(l.buffer_size, WIN_GRAN);
        assert_eq!(l.element_count, (WIN_GRAN / 4) as u64);
        assert_eq!(l.total_size, 3 * WIN_GRAN);
        check_invariants(&l);
    }

    #[test]
    fn test_element_size_not_dividing_page() {
        // 24 byte elements never divide a 4096 byte page; the buffer grows
        // until it is both page-aligned and a whole number of elements.
        let l = RingLayout::compute(24, 10, 24, PAGE, PAGE);
        assert_eq!(l.buffer_size % PAGE, 0);
        assert_eq!(l.buffer_size % 24, 0);
        check_invariants(&l);
    }

    #[test]
    fn test_large_header() {
        let l = RingLayout::compute(8, 10, 1000, PAGE, PAGE);
        assert!(l.header_size >= 1000);
        assert_eq!(l.header_size % PAGE, 0);
        assert!(l.element_count >= 10);
        check_invariants(&l);
    }

    #[test]
    fn test_reconstruct_roundtrip() {
        let l = RingLayout::compute(8, 1000, 24, PAGE, PAGE);
        let r = RingLayout::reconstruct(8, 24, l.total_size, PAGE, PAGE).unwrap();
        assert_eq!(r.element_count, l.element_count);
        assert_eq!(r.buffer_size, l.buffer_size);
        assert_eq!(r.buffer_offset, l.buffer_offset);
        assert_eq!(r.mirror_offset, l.mirror_offset);
        check_invariants(&r);
    }

    #[test]
    fn test_reconstruct_rejects_truncated_object() {
        assert!(matches!(
            RingLayout::reconstruct(8, 24, PAGE, PAGE, PAGE),
            Err(RingError::Platform(_))
        ));
        assert!(matches!(
            RingLayout::reconstruct(8, 24, 2 * PAGE + 512, PAGE, PAGE),
            Err(RingError::AllocationGranularity { .. })
        ));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, PAGE), 0);
        assert_eq!(align_up(1, PAGE), PAGE);
        assert_eq!(align_up(PAGE, PAGE), PAGE);
        assert_eq!(align_up(PAGE + 1, PAGE), 2 * PAGE);
    }
}
